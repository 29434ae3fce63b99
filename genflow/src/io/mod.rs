//! File system adapters for the collaborator ports.

mod fs;

pub use fs::{DirectorySink, FileSourceReader};
