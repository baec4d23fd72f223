//! Recursive file discovery and metadata extraction.
//!
//! - [`walk`] lazily traverses a directory tree and yields one
//!   [`FileRecord`] per regular file (or an error for the entry it could not
//!   read),
//! - [`extract`] produces a [`FileRecord`] for a single path,
//! - [`FileRecord`] is also the JSON wire message handed to publishers.

pub mod error;
mod extract;
mod record;
mod walk;

pub use crate::extract::extract;
pub use crate::record::FileRecord;
pub use crate::walk::{RecordStream, walk};
