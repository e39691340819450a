//! Shared helpers for the cpiofs crates.
//!
//! Currently this is the UNIX path toolkit used by both the archive codec
//! (entry-name validation) and the in-memory filesystem (traversal and
//! display paths).

pub mod path;

pub use path::PathError;
