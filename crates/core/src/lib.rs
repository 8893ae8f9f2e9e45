//! Identity, text and error primitives shared by the rule engine crates.

#![forbid(unsafe_code)]

/// Actor identity primitives shared across services.
pub mod actor;
mod error;
mod ids;

pub use actor::Actor;
pub use error::{AppError, AppResult};
pub use ids::{AppId, NonEmptyString};
