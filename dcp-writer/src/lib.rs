//! DCP Writer Library
//!
//! This library writes picture, sound and subtitle essence into containers
//! frame by frame, recording a frame index as it goes, and hands back the
//! finished [`dcp_core::Asset`].

pub mod asset_writer;

pub use asset_writer::{AssetWriter, WriterState};

use std::path::PathBuf;

/// Result type for dcp-writer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dcp-writer operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("DCP core error: {0}")]
    Core(#[from] dcp_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot {operation}: {reason}")]
    State {
        operation: &'static str,
        reason: String,
    },

    #[error("Frames must not be empty")]
    EmptyFrame,

    #[error("Refusing to overwrite existing file: {}", .0.display())]
    Exists(PathBuf),
}

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Replace an essence file that already exists
    pub overwrite: bool,
    /// Persist the frame index next to the essence as `<file>.idx`
    pub write_index: bool,
    /// Frames between progress log lines
    pub report_interval: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            overwrite: false,
            write_index: true,
            report_interval: 100,
        }
    }
}
