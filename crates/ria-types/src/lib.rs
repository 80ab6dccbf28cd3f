//! Foundation types for RIA (remote indexed archive) stores.
//!
//! This crate provides the identifiers every other RIA crate works with.
//! Both are opaque to the store: it never interprets a key's hash or a
//! repository's identity beyond what is needed to lay out paths.
//!
//! # Key Types
//!
//! - [`ContentKey`]: immutable content identifier, optionally encoding size and chunking
//! - [`RepositoryId`]: identity of one dataset's object space inside a shared store

pub mod error;
pub mod key;
pub mod repo;

pub use error::TypeError;
pub use key::ContentKey;
pub use repo::RepositoryId;
