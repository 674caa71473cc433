//! Domain model: entities, value enums, and pure invariant logic.
//!
//! Nothing in this module performs I/O; services compose these pieces on top
//! of the storage ports.

mod member;
mod normalize;
mod patch;
mod trip;

pub use member::*;
pub use normalize::*;
pub use patch::*;
pub use trip::*;

use uuid::Uuid;

/// Opaque member identifier.
pub type MemberId = Uuid;

/// Opaque trip identifier.
pub type TripId = Uuid;

/// The authenticated subject identifier (JWT `sub`). Bound to a member once,
/// immutably.
pub type Subject = String;
