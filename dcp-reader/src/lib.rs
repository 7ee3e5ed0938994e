//! DCP Reader Library
//!
//! This library reads frames back out of DCP assets, decrypting them when a
//! key is supplied and checking them against the frame index written
//! alongside the essence.

pub mod asset_reader;

pub use asset_reader::{AssetReader, Frame};

use std::path::PathBuf;

/// Result type for dcp-reader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dcp-reader operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("DCP core error: {0}")]
    Core(#[from] dcp_core::Error),

    #[error("Frame {frame} is outside the asset's {duration} frames")]
    FrameOutOfRange { frame: u64, duration: u64 },

    #[error("Key error: {0}")]
    Key(String),

    #[error("No frame index for {}", .0.display())]
    NoIndex(PathBuf),
}
