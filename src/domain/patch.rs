//! Tri-state PATCH fields.
//!
//! JSON PATCH bodies distinguish a field that is absent, a field explicitly
//! set to `null`, and a field carrying a value. `Patch<T>` models all three;
//! combined with `#[serde(default)]` an absent field deserializes to
//! `Unspecified` and an explicit `null` to `Null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    /// Field was not present in the request body.
    #[default]
    Unspecified,
    /// Field was present as an explicit `null`.
    Null,
    /// Field was present with a value.
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Patch::Unspecified)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Unspecified => Patch::Unspecified,
            Patch::Null => Patch::Null,
            Patch::Value(v) => Patch::Value(f(v)),
        }
    }

    /// Apply this patch to an optional field: `Null` clears it, `Value` sets
    /// it, `Unspecified` leaves it alone.
    pub fn apply_to(self, dst: &mut Option<T>) {
        match self {
            Patch::Unspecified => {}
            Patch::Null => *dst = None,
            Patch::Value(v) => *dst = Some(v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

// Serialized only for canonical body hashing; `Unspecified` fields are
// skipped at the struct level via `skip_serializing_if`.
impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Unspecified | Patch::Null => serializer.serialize_none(),
            Patch::Value(v) => serializer.serialize_some(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        name: Patch<String>,
    }

    #[test]
    fn absent_field_is_unspecified() {
        let b: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(b.name, Patch::Unspecified);
    }

    #[test]
    fn explicit_null_is_null() {
        let b: Body = serde_json::from_str(r#"{"name":null}"#).unwrap();
        assert_eq!(b.name, Patch::Null);
    }

    #[test]
    fn value_is_value() {
        let b: Body = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(b.name, Patch::Value("x".to_string()));
    }

    #[test]
    fn apply_to_semantics() {
        let mut dst = Some("a".to_string());
        Patch::<String>::Unspecified.apply_to(&mut dst);
        assert_eq!(dst.as_deref(), Some("a"));
        Patch::Value("b".to_string()).apply_to(&mut dst);
        assert_eq!(dst.as_deref(), Some("b"));
        Patch::<String>::Null.apply_to(&mut dst);
        assert_eq!(dst, None);
    }
}
