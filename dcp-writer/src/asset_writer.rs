//! Frame-by-frame essence writer
//!
//! ```text
//! NotStarted --write/fake_write--> Writing --finalize--> Finalized
//! ```
//!
//! The container is only created on the first frame, so a writer that never
//! receives one leaves nothing on disk.

use crate::{Error, Result, WriterConfig};
use dcp_core::identity::frame_hash;
use dcp_core::{
    make_uuid, Asset, CipherContext, ContentKey, EssenceCodec, EssenceHeader, EssenceWrite,
    Essence, FileCodec, FrameIndex, FrameInfo, Fraction, PictureMode, ProgressTracker, Size,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Where a writer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    NotStarted,
    Writing,
    Finalized,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterState::NotStarted => write!(f, "not started"),
            WriterState::Writing => write!(f, "writing"),
            WriterState::Finalized => write!(f, "finalized"),
        }
    }
}

/// Writes one essence file and produces its [`Asset`]
pub struct AssetWriter {
    directory: PathBuf,
    file_name: String,
    uuid: Uuid,
    essence: Essence,
    edit_rate: Fraction,
    codec: Arc<dyn EssenceCodec>,
    config: WriterConfig,
    cipher: Option<CipherContext>,
    output: Option<Box<dyn EssenceWrite>>,
    index: FrameIndex,
    frames: u64,
    progress: ProgressTracker,
    state: WriterState,
}

impl AssetWriter {
    /// Creates a writer for `directory/file_name` using the reference container
    pub fn new(
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        essence: Essence,
        edit_rate: Fraction,
    ) -> Self {
        let file_name = file_name.into();
        let progress = ProgressTracker::new(0, &format!("Writing {file_name}"));
        Self {
            directory: directory.into(),
            file_name,
            uuid: make_uuid(),
            essence,
            edit_rate,
            codec: Arc::new(FileCodec),
            config: WriterConfig::default(),
            cipher: None,
            output: None,
            index: FrameIndex::new(),
            frames: 0,
            progress,
            state: WriterState::NotStarted,
        }
    }

    pub fn picture(
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        edit_rate: Fraction,
        size: Size,
        mode: PictureMode,
    ) -> Self {
        Self::new(directory, file_name, Essence::Picture { mode, size }, edit_rate)
    }

    pub fn sound(
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        edit_rate: Fraction,
        channels: u16,
        sampling_rate: u32,
    ) -> Self {
        let essence = Essence::Sound {
            channels,
            sampling_rate,
        };
        Self::new(directory, file_name, essence, edit_rate)
    }

    pub fn subtitle(
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        edit_rate: Fraction,
        language: Option<String>,
    ) -> Self {
        Self::new(directory, file_name, Essence::Subtitle { language }, edit_rate)
    }

    pub fn with_config(mut self, config: WriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses another container implementation
    pub fn with_codec(mut self, codec: Arc<dyn EssenceCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Encrypts every frame; `key_id` becomes the asset's key id
    pub fn with_key(mut self, key_id: Uuid, key: ContentKey) -> Self {
        self.cipher = Some(CipherContext::new(key_id, key));
        self
    }

    /// Calls `observer` after every frame with the fraction of
    /// `expected_frames` written so far
    pub fn with_progress(
        mut self,
        expected_frames: u64,
        observer: impl FnMut(f32) + Send + 'static,
    ) -> Self {
        self.progress.set_total(expected_frames);
        self.progress = self.progress.with_observer(observer);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Bitstream frames written so far, both eyes counted for stereo
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    fn is_stereo(&self) -> bool {
        matches!(
            self.essence,
            Essence::Picture {
                mode: PictureMode::Stereo,
                ..
            }
        )
    }

    /// Writes one frame; for stereo pictures calls alternate left and right eye
    pub fn write(&mut self, data: &[u8]) -> Result<FrameInfo> {
        if data.is_empty() {
            return Err(Error::EmptyFrame);
        }
        let payload = match &self.cipher {
            Some(cipher) => cipher.encrypt_frame(data),
            None => data.to_vec(),
        };
        self.append("write", &payload, frame_hash(data))
    }

    /// Reserves a zero-filled frame of `size` bytes without real content
    ///
    /// The recorded [`FrameInfo`] has no hash, so the frame never verifies.
    /// On an encrypted writer the placeholder is encrypted like any other
    /// frame, so it reads back as `size` zero bytes with the key.
    pub fn fake_write(&mut self, size: u64) -> Result<FrameInfo> {
        if size == 0 {
            return Err(Error::EmptyFrame);
        }
        let placeholder = vec![0u8; size as usize];
        let payload = match &self.cipher {
            Some(cipher) => cipher.encrypt_frame(&placeholder),
            None => placeholder,
        };
        self.append("fake_write", &payload, String::new())
    }

    fn append(
        &mut self,
        operation: &'static str,
        payload: &[u8],
        hash: String,
    ) -> Result<FrameInfo> {
        let output = self.start(operation)?;
        let (offset, size) = output.write_frame(payload)?;

        let info = FrameInfo::new(offset, size, hash);
        self.index.push(info.clone())?;
        self.frames += 1;
        self.progress.increment_and_report(self.config.report_interval);
        Ok(info)
    }

    /// Opens the container on the first frame
    fn start(&mut self, operation: &'static str) -> Result<&mut Box<dyn EssenceWrite>> {
        if self.state == WriterState::Finalized {
            return Err(Error::State {
                operation,
                reason: format!("{} is already finalized", self.file_name),
            });
        }

        if self.output.is_none() {
            let path = self.path();
            if path.exists() && !self.config.overwrite {
                return Err(Error::Exists(path));
            }

            let header = EssenceHeader::new(
                self.uuid,
                self.edit_rate,
                self.cipher.as_ref().map(CipherContext::key_id),
                self.essence.to_descriptor(),
            );
            tracing::debug!(asset = %self.uuid, "creating {}", path.display());
            self.output = Some(self.codec.open_write(&path, &header)?);
            self.state = WriterState::Writing;
        }

        self.output.as_mut().ok_or_else(|| Error::State {
            operation,
            reason: "no open container".into(),
        })
    }

    /// Closes the container, writes the frame index and returns the asset
    #[tracing::instrument(skip(self), fields(file = %self.file_name))]
    pub fn finalize(&mut self) -> Result<Asset> {
        match self.state {
            WriterState::NotStarted => {
                return Err(Error::State {
                    operation: "finalize",
                    reason: "no frames have been written".into(),
                })
            }
            WriterState::Finalized => {
                return Err(Error::State {
                    operation: "finalize",
                    reason: format!("{} is already finalized", self.file_name),
                })
            }
            WriterState::Writing => {}
        }

        let intrinsic_duration = if self.is_stereo() {
            if self.frames % 2 != 0 {
                return Err(Error::State {
                    operation: "finalize",
                    reason: format!("right eye missing for frame {}", self.frames / 2),
                });
            }
            self.frames / 2
        } else {
            self.frames
        };

        let output = self.output.as_mut().ok_or_else(|| Error::State {
            operation: "finalize",
            reason: "no open container".into(),
        })?;
        output.finalize(intrinsic_duration)?;
        self.output = None;
        self.state = WriterState::Finalized;

        let path = self.path();
        if self.config.write_index {
            self.index.write_file(FrameIndex::sidecar_path(&path))?;
        }

        tracing::info!(
            asset = %self.uuid,
            intrinsic_duration,
            "finalized {}",
            path.display()
        );
        Ok(Asset::new(
            self.uuid,
            self.directory.clone(),
            self.file_name.clone(),
            self.essence.clone(),
            self.edit_rate,
            intrinsic_duration,
            self.cipher.as_ref().map(CipherContext::key_id),
        ))
    }
}
