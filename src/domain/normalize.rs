//! Text normalization and validation helpers shared across use cases.

/// Trim leading/trailing whitespace and collapse internal whitespace runs to
/// single spaces. Used for display names and trip names.
pub fn normalize_human_name(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate a bare email address (no `Name <addr>` display form).
///
/// Intentionally conservative: exactly one `@`, non-empty local and domain
/// parts, dotted domain, and a restricted character set. Returns the reason
/// for rejection so validation errors can name it.
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.is_empty() {
        return Err("must be non-empty");
    }
    if email.len() > 255 {
        return Err("must be at most 255 characters");
    }
    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(l), Some(d), None) => (l, d),
        _ => return Err("must contain exactly one @"),
    };
    if local.is_empty() || domain.is_empty() {
        return Err("must have a local part and a domain");
    }
    let local_ok = local
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
    if !local_ok {
        return Err("local part contains invalid characters");
    }
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err("domain must be a dotted name");
    }
    let domain_ok = domain
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-'));
    if !domain_ok {
        return Err("domain contains invalid characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_runs() {
        assert_eq!(normalize_human_name("  Snow   Run  "), "Snow Run");
        assert_eq!(normalize_human_name("Alice\t B.\n Smith"), "Alice B. Smith");
        assert_eq!(normalize_human_name("   "), "");
    }

    #[test]
    fn valid_emails_pass() {
        assert!(validate_email("alice@x.io").is_ok());
        assert!(validate_email("user+tag@sub.example.com").is_ok());
    }

    #[test]
    fn invalid_emails_fail() {
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@nodot").is_err());
        // Display-name form is not a bare address.
        assert!(validate_email("Alice <alice@x.io>").is_err());
        assert!(validate_email("a@b@c.io").is_err());
    }
}
