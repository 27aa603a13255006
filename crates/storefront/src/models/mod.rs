//! Domain models for the storefront.
//!
//! - [`session`] - identity-provider sessions, users and change notifications
//! - [`profile`] - the per-user profile row

pub mod profile;
pub mod session;

pub use profile::{Profile, ProfileUpdate};
pub use session::{AuthChange, AuthUser, Session, SignUpMetadata, SignUpOutcome, session_keys};
