//! Core types and trait definitions for Mailroom.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! It holds the record and identity data types, the storage traits, and the
//! conditional patch engine that runs on top of any [`store::RecordStore`].

pub mod entity;
pub mod error;
pub mod identity;
pub mod patch;
pub mod store;

pub use error::{Error, Result};
