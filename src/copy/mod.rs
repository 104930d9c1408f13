//! Copy engine behind replicate.
//!
//! Files are written atomically (temp file + rename) and directories are
//! merged recursively with parallel file copies.

mod dir;
mod file;
mod utils;

pub use dir::{CopyStats, copy_dir};
pub use file::copy_file;

pub(crate) use utils::remove_existing;
