//! Core building blocks for the projectstore storage layer.
//!
//! Everything in this crate is free of I/O: the entity model, the key scheme,
//! the record codec, the update-expression builder and the traits that
//! storage backends and callers program against.

pub mod clock;
pub mod entity;
pub mod storage;
