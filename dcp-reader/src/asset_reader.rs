//! Random access to the frames of one asset

use crate::{Error, Result};
use dcp_core::{
    Asset, CipherContext, ContentKey, Essence, EssenceCodec, EssenceRead, FrameIndex,
    PictureMode, ProgressTracker,
};
use std::sync::Arc;
use uuid::Uuid;

/// Frames between progress log lines
const REPORT_INTERVAL: u64 = 100;

/// One edit unit of an asset, already decrypted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Mono(Vec<u8>),
    Stereo { left: Vec<u8>, right: Vec<u8> },
    Sound(Vec<u8>),
    Subtitle(Vec<u8>),
}

impl Frame {
    /// Payloads in container order
    pub fn payloads(&self) -> Vec<&[u8]> {
        match self {
            Frame::Mono(data) | Frame::Sound(data) | Frame::Subtitle(data) => vec![data.as_slice()],
            Frame::Stereo { left, right } => vec![left.as_slice(), right.as_slice()],
        }
    }
}

/// Reads frames of an asset within its trimming window
///
/// Frame numbers are relative to the asset's entry point.
pub struct AssetReader {
    asset: Arc<Asset>,
    input: Box<dyn EssenceRead>,
    cipher: Option<CipherContext>,
    index: Option<FrameIndex>,
    progress: ProgressTracker,
}

impl AssetReader {
    /// Opens the asset's essence; the frame index is loaded if one was written
    pub fn open(asset: Arc<Asset>, codec: &dyn EssenceCodec) -> Result<Self> {
        let path = asset.file_path();
        let input = codec.open_read(&path)?;
        if input.header().uuid != asset.uuid() {
            tracing::warn!(
                "{} contains essence {} but the asset is {}",
                path.display(),
                input.header().uuid,
                asset.uuid()
            );
        }

        let sidecar = FrameIndex::sidecar_path(&path);
        let index = if sidecar.is_file() {
            Some(FrameIndex::read_file(&sidecar)?)
        } else {
            tracing::debug!("no frame index for {}", path.display());
            None
        };

        let label = format!("Reading {}", asset.file_name());
        let progress = ProgressTracker::new(asset.duration(), &label);
        Ok(Self {
            asset,
            input,
            cipher: None,
            index,
            progress,
        })
    }

    /// Binds the decryption key; its id must match the asset's key id
    pub fn with_key(mut self, key_id: Uuid, key: ContentKey) -> Result<Self> {
        let cipher = CipherContext::new(key_id, key);
        cipher.check_binding(self.asset.key_id())?;
        self.cipher = Some(cipher);
        Ok(self)
    }

    /// Calls `observer` after every frame read with the fraction of the
    /// asset's duration covered
    pub fn with_progress(mut self, observer: impl FnMut(f32) + Send + 'static) -> Self {
        self.progress = self.progress.with_observer(observer);
        self
    }

    pub fn asset(&self) -> &Arc<Asset> {
        &self.asset
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Container frame numbers holding edit unit `n`
    fn physical_frames(&self, n: u64) -> Result<Vec<u64>> {
        let duration = self.asset.duration();
        if n >= duration {
            return Err(Error::FrameOutOfRange { frame: n, duration });
        }
        let unit = self.asset.entry_point() + n;
        Ok(match self.asset.picture_mode() {
            Some(PictureMode::Stereo) => vec![unit * 2, unit * 2 + 1],
            _ => vec![unit],
        })
    }

    fn payload(&mut self, physical: u64) -> Result<Vec<u8>> {
        if self.asset.encrypted() && self.cipher.is_none() {
            return Err(Error::Key(format!(
                "{} is encrypted and no key was given",
                self.asset.file_name()
            )));
        }
        let data = self.input.read_frame(physical)?;
        match &self.cipher {
            Some(cipher) => Ok(cipher.decrypt_frame(&data)?),
            None => Ok(data),
        }
    }

    /// Returns edit unit `n`, counted from the entry point
    pub fn get_frame(&mut self, n: u64) -> Result<Frame> {
        let asset = Arc::clone(&self.asset);
        let physical = self.physical_frames(n)?;
        let frame = match (asset.essence(), physical.as_slice()) {
            (Essence::Picture { .. }, &[left, right]) => Frame::Stereo {
                left: self.payload(left)?,
                right: self.payload(right)?,
            },
            (Essence::Picture { .. }, &[unit]) => Frame::Mono(self.payload(unit)?),
            (Essence::Sound { .. }, &[unit]) => Frame::Sound(self.payload(unit)?),
            (Essence::Subtitle { .. }, &[unit]) => Frame::Subtitle(self.payload(unit)?),
            (essence, frames) => {
                return Err(Error::Core(dcp_core::Error::Codec(format!(
                    "{} edit unit spans {} container frames",
                    essence.kind(),
                    frames.len()
                ))))
            }
        };
        self.progress.increment_and_report(REPORT_INTERVAL);
        Ok(frame)
    }

    /// Checks edit unit `n` against the hashes recorded when it was written
    ///
    /// Placeholder frames never verify.
    pub fn verify_frame(&mut self, n: u64) -> Result<bool> {
        if self.index.is_none() {
            return Err(Error::NoIndex(self.asset.file_path()));
        }
        for physical in self.physical_frames(n)? {
            let data = self.payload(physical)?;
            let matches = self
                .index
                .as_ref()
                .is_some_and(|index| index.verify(physical as usize, &data));
            if !matches {
                tracing::debug!(frame = n, physical, "frame does not match its index entry");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
