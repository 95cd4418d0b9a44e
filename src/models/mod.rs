//! Data models for the Team Sport Finder application.
//!
//! Field names are serialized in camelCase to match the web frontend.

mod join_request;
mod profile;
mod team;
mod tournament;
mod user;

pub use join_request::*;
pub use profile::*;
pub use team::*;
pub use tournament::*;
pub use user::*;
