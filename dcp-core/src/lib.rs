//! DCP Core Library
//!
//! This library provides the composition metadata graph (AssetMap, PackingList,
//! CPL, Reel, Asset), per-frame integrity indices, the essence codec seam and
//! the structural equality engine for Digital Cinema Packages.

pub mod asset;
pub mod asset_map;
pub mod cpl;
pub mod crypto;
pub mod dcp;
pub mod equality;
pub mod essence;
pub mod frame_index;
pub mod identity;
pub mod metadata;
pub mod packing_list;
pub mod progress_tracker;
pub mod reel;
pub mod types;
pub mod xml;

pub use asset::{Asset, Essence, PictureMode};
pub use asset_map::{AssetMap, AssetMapEntry, Chunk};
pub use cpl::{ContentKind, Cpl, CplState, EssencePolicy};
pub use crypto::{CipherContext, ContentKey};
pub use dcp::Dcp;
pub use equality::{EqualityOptions, Note, NoteCollector, NoteType};
pub use essence::{
    EssenceCodec, EssenceDescriptor, EssenceHeader, EssenceKind, EssenceRead, EssenceWrite,
    FileCodec,
};
pub use frame_index::{FrameIndex, FrameInfo};
pub use identity::{make_digest, make_digest_with_progress, make_uuid};
pub use metadata::XmlMetadata;
pub use packing_list::{PackingList, PackingListEntry};
pub use progress_tracker::ProgressTracker;
pub use reel::Reel;
pub use types::{Fraction, Size};

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Result type for dcp-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dcp-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}: {}", path.display())]
    File {
        message: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid magic bytes, expected {expected:?}")]
    InvalidMagic { expected: [u8; 4] },

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Missing XML element: {0}")]
    MissingElement(String),

    #[error("Invalid UUID: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Asset not found in asset map: {0}")]
    AssetNotFound(Uuid),

    #[error("Wrong asset kind for {slot}: found {found}")]
    AssetKind { slot: &'static str, found: EssenceKind },

    #[error("Invalid trim: entry point {entry_point} + duration {duration} exceeds intrinsic duration {intrinsic_duration}")]
    InvalidTrim {
        entry_point: u64,
        duration: u64,
        intrinsic_duration: u64,
    },

    #[error("Frame index error: {0}")]
    FrameIndex(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Invalid equality options: {0}")]
    Options(String),
}

impl Error {
    /// Builds a [`Error::File`] carrying the offending path
    pub fn file(
        message: impl Into<String>,
        path: impl AsRef<Path>,
        source: std::io::Error,
    ) -> Self {
        Self::File {
            message: message.into(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True when this error means a referenced essence file could not be
    /// resolved or opened, which permissive CPL parsing tolerates.
    pub fn is_missing_essence(&self) -> bool {
        matches!(
            self,
            Error::File { .. }
                | Error::Codec(_)
                | Error::InvalidMagic { .. }
                | Error::UnsupportedVersion(_)
                | Error::AssetNotFound(_)
        )
    }
}
