//! # groupsnap-store
//!
//! SQLite persistence for group photo sessions.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for sessions,
//! members, contributions and composed results. Callers share it behind an
//! async mutex and keep every lock scope free of network and image work.

pub mod contributions;
pub mod database;
pub mod members;
pub mod migrations;
pub mod results;
pub mod sessions;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
