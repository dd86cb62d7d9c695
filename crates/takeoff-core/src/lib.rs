//! Takeoff spreadsheet versioning and BTX tool generation.
//!
//! The [`engine::TakeoffEngine`] facade is what the server and CLI call. It
//! sits on top of two collaborator traits, [`sheets::SpreadsheetService`]
//! and [`project::ProjectStore`], so every operation can be exercised against
//! the in-memory doubles in `testing`.

pub mod a1;
pub mod cache;
pub mod cell;
pub mod config;
pub mod engine;
pub mod error;
pub mod google;
pub mod io;
pub mod layout;
pub mod ledger;
pub mod materialize;
pub mod naming;
pub mod project;
pub mod setup;
pub mod sheets;
pub mod toggles;
pub mod tools;
pub mod tracker;
pub mod versions;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ErrorKind, Result, TakeoffError};
