//! Keyed resource cache: loads each key at most once and memoizes the outcome.
//! Reads never block; a pending key hands back a [`Suspension`] to wait on.

pub mod error;
pub mod loader;
pub mod resource;
mod slot;

pub use error::{LoadFailure, ReadError};
pub use loader::Loader;
pub use resource::{EntryState, ResourceCache};
pub use slot::Suspension;
