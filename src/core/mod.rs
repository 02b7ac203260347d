pub mod build;
pub mod config;
pub mod deploy;
pub mod env_patch;
pub mod error;
pub mod interrupt;
pub mod local_files;
pub mod pipeline;
pub mod release_note;
pub mod remote;
pub mod target;
pub mod upload;
pub mod version_path;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
