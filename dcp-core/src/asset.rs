//! Asset model: one wrapped essence file as seen by a composition

use crate::asset_map::{AssetMap, AssetMapEntry, Chunk};
use crate::equality::{report, EqualityOptions, NoteHandler, NoteType};
use crate::essence::{EssenceCodec, EssenceDescriptor, EssenceHeader, EssenceKind};
use crate::identity::make_digest;
use crate::packing_list::{PackingList, PackingListEntry};
use crate::types::{Fraction, Size};
use crate::xml::Element;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

/// Namespace of the stereoscopic picture extension to the CPL schema
pub const STEREO_PICTURE_NAMESPACE: &str =
    "http://www.smpte-ra.org/schemas/429-10/2008/Main-Stereo-Picture-CPL";

/// MIME type listed in the PackingList for essence files
pub const ESSENCE_MIME_TYPE: &str = "application/mxf";

/// 2D or 3D picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureMode {
    Mono,
    /// Left and right eyes interleaved at twice the edit rate
    Stereo,
}

/// Kind-specific part of an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Essence {
    Picture { mode: PictureMode, size: Size },
    Sound { channels: u16, sampling_rate: u32 },
    Subtitle { language: Option<String> },
}

impl Essence {
    pub fn kind(&self) -> EssenceKind {
        match self {
            Essence::Picture { .. } => EssenceKind::Picture,
            Essence::Sound { .. } => EssenceKind::Sound,
            Essence::Subtitle { .. } => EssenceKind::Subtitle,
        }
    }

    pub fn from_descriptor(descriptor: &EssenceDescriptor) -> Self {
        match descriptor {
            EssenceDescriptor::Picture { size, stereo } => Essence::Picture {
                mode: if *stereo {
                    PictureMode::Stereo
                } else {
                    PictureMode::Mono
                },
                size: *size,
            },
            EssenceDescriptor::Sound {
                channels,
                sampling_rate,
            } => Essence::Sound {
                channels: *channels,
                sampling_rate: *sampling_rate,
            },
            EssenceDescriptor::Subtitle { language } => Essence::Subtitle {
                language: language.clone(),
            },
        }
    }

    pub fn to_descriptor(&self) -> EssenceDescriptor {
        match self {
            Essence::Picture { mode, size } => EssenceDescriptor::Picture {
                size: *size,
                stereo: *mode == PictureMode::Stereo,
            },
            Essence::Sound {
                channels,
                sampling_rate,
            } => EssenceDescriptor::Sound {
                channels: *channels,
                sampling_rate: *sampling_rate,
            },
            Essence::Subtitle { language } => EssenceDescriptor::Subtitle {
                language: language.clone(),
            },
        }
    }

    fn cpl_node_name(&self) -> &'static str {
        match self {
            Essence::Picture {
                mode: PictureMode::Mono,
                ..
            } => "MainPicture",
            Essence::Picture {
                mode: PictureMode::Stereo,
                ..
            } => "msp-cpl:MainStereoscopicPicture",
            Essence::Sound { .. } => "MainSound",
            Essence::Subtitle { .. } => "MainSubtitle",
        }
    }
}

/// An asset backed by one essence file
///
/// The UUID never changes once constructed. The digest is computed from the
/// essence file the first time it is asked for and is frozen from then on.
/// Assets are shared between reels as `Arc<Asset>`, so the trimming window
/// is set before an asset is handed to a reel.
#[derive(Debug, Clone)]
pub struct Asset {
    uuid: Uuid,
    directory: PathBuf,
    file_name: String,
    essence: Essence,
    edit_rate: Fraction,
    intrinsic_duration: u64,
    entry_point: u64,
    duration: u64,
    key_id: Option<Uuid>,
    digest: OnceLock<String>,
}

impl Asset {
    /// Creates an asset exposing the whole of its essence
    pub fn new(
        uuid: Uuid,
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        essence: Essence,
        edit_rate: Fraction,
        intrinsic_duration: u64,
        key_id: Option<Uuid>,
    ) -> Self {
        Self {
            uuid,
            directory: directory.into(),
            file_name: file_name.into(),
            essence,
            edit_rate,
            intrinsic_duration,
            entry_point: 0,
            duration: intrinsic_duration,
            key_id,
            digest: OnceLock::new(),
        }
    }

    /// Builds an asset from a container header
    pub fn from_header(
        directory: impl Into<PathBuf>,
        file_name: impl Into<String>,
        header: &EssenceHeader,
    ) -> Self {
        Self::new(
            header.uuid,
            directory,
            file_name,
            Essence::from_descriptor(&header.descriptor),
            header.edit_rate,
            header.intrinsic_duration,
            header.key_id,
        )
    }

    /// Opens the essence at `directory/file_name` and reads its header
    pub fn open(
        directory: impl AsRef<Path>,
        file_name: &str,
        codec: &dyn EssenceCodec,
    ) -> Result<Self> {
        let directory = directory.as_ref();
        let reader = codec.open_read(&directory.join(file_name))?;
        Ok(Self::from_header(directory, file_name, reader.header()))
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn essence(&self) -> &Essence {
        &self.essence
    }

    pub fn kind(&self) -> EssenceKind {
        self.essence.kind()
    }

    /// `Some` for picture assets
    pub fn picture_mode(&self) -> Option<PictureMode> {
        match self.essence {
            Essence::Picture { mode, .. } => Some(mode),
            _ => None,
        }
    }

    /// Reclassifies a picture asset; used by the CPL reader's 3D detection
    pub fn set_picture_mode(&mut self, new_mode: PictureMode) {
        if let Essence::Picture { mode, .. } = &mut self.essence {
            *mode = new_mode;
        }
    }

    pub fn edit_rate(&self) -> Fraction {
        self.edit_rate
    }

    pub fn intrinsic_duration(&self) -> u64 {
        self.intrinsic_duration
    }

    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn key_id(&self) -> Option<Uuid> {
        self.key_id
    }

    pub fn encrypted(&self) -> bool {
        self.key_id.is_some()
    }

    /// Moves the start of the trimming window; the duration shrinks if it
    /// would otherwise run past the end of the essence.
    pub fn set_entry_point(&mut self, entry_point: u64) -> Result<()> {
        if entry_point > self.intrinsic_duration {
            return Err(Error::InvalidTrim {
                entry_point,
                duration: 0,
                intrinsic_duration: self.intrinsic_duration,
            });
        }
        self.entry_point = entry_point;
        self.duration = self.duration.min(self.intrinsic_duration - entry_point);
        Ok(())
    }

    pub fn set_duration(&mut self, duration: u64) -> Result<()> {
        let end = self.entry_point.checked_add(duration);
        if end.map_or(true, |end| end > self.intrinsic_duration) {
            return Err(Error::InvalidTrim {
                entry_point: self.entry_point,
                duration,
                intrinsic_duration: self.intrinsic_duration,
            });
        }
        self.duration = duration;
        Ok(())
    }

    /// Base64 SHA-1 of the essence file, computed once
    pub fn digest(&self) -> Result<&str> {
        if let Some(digest) = self.digest.get() {
            return Ok(digest);
        }
        let computed = make_digest(self.file_path())?;
        Ok(self.digest.get_or_init(|| computed))
    }

    /// Size of the essence file in bytes
    pub fn file_size(&self) -> Result<u64> {
        let path = self.file_path();
        std::fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| Error::file("could not stat essence file", &path, e))
    }

    /// Emits this asset's entry into a reel's `AssetList`
    pub fn write_to_cpl(&self, asset_list: &mut Element) {
        let node = asset_list.add_child(self.essence.cpl_node_name());
        if let Essence::Picture {
            mode: PictureMode::Stereo,
            ..
        } = self.essence
        {
            node.set_attribute("xmlns:msp-cpl", STEREO_PICTURE_NAMESPACE);
        }

        node.add_text_child("Id", format!("urn:uuid:{}", self.uuid));
        node.add_text_child("AnnotationText", &self.file_name);
        node.add_text_child("EditRate", self.edit_rate);
        node.add_text_child("IntrinsicDuration", self.intrinsic_duration);
        if self.entry_point != 0 {
            node.add_text_child("EntryPoint", self.entry_point);
        }
        if self.duration != self.intrinsic_duration - self.entry_point {
            node.add_text_child("Duration", self.duration);
        }
        if let Some(key_id) = self.key_id {
            node.add_text_child("KeyId", format!("urn:uuid:{key_id}"));
        }

        if let Essence::Picture { mode, size } = self.essence {
            let frame_rate = match mode {
                PictureMode::Mono => self.edit_rate,
                PictureMode::Stereo => self.edit_rate.scaled(2),
            };
            node.add_text_child("FrameRate", frame_rate);
            node.add_text_child("ScreenAspectRatio", size.aspect_ratio());
        }
    }

    /// Adds this asset's PackingList entry
    pub fn write_to_pkl(&self, pkl: &mut PackingList) -> Result<()> {
        pkl.add(PackingListEntry {
            id: self.uuid,
            annotation_text: self.file_name.clone(),
            hash: self.digest()?.to_string(),
            size: self.file_size()?,
            mime_type: ESSENCE_MIME_TYPE.to_string(),
        });
        Ok(())
    }

    /// Adds this asset's AssetMap entry: one chunk covering the whole file
    pub fn write_to_assetmap(&self, asset_map: &mut AssetMap) -> Result<()> {
        asset_map.add(AssetMapEntry {
            id: self.uuid,
            packing_list: false,
            chunks: vec![Chunk::whole_file(&self.file_name, self.file_size()?)],
        });
        Ok(())
    }

    /// Compares two assets, reporting each difference through `note`
    pub fn equals(&self, other: &Asset, opt: &EqualityOptions, note: NoteHandler<'_>) -> bool {
        if self.kind() != other.kind() {
            note(
                NoteType::Error,
                format!("asset types differ ({} vs {})", self.kind(), other.kind()),
            );
            return false;
        }

        if let (Some(a), Some(b)) = (self.picture_mode(), other.picture_mode()) {
            if a != b {
                note(
                    NoteType::Error,
                    format!(
                        "picture assets differ in stereoscopy ({:?} vs {:?}): {} vs {}",
                        a, b, self.file_name, other.file_name
                    ),
                );
                return false;
            }
        }

        let mut equal = true;

        if self.file_name != other.file_name
            && report(
                opt.mxf_names_can_differ,
                note,
                format!("MXF names differ: {} vs {}", self.file_name, other.file_name),
            )
        {
            equal = false;
        }

        if self.essence != other.essence {
            note(
                NoteType::Error,
                format!(
                    "essence descriptors differ ({:?} vs {:?})",
                    self.essence, other.essence
                ),
            );
            equal = false;
        }

        if self.edit_rate != other.edit_rate {
            note(
                NoteType::Error,
                format!(
                    "edit rates differ ({} vs {})",
                    self.edit_rate, other.edit_rate
                ),
            );
            equal = false;
        }

        if self.intrinsic_duration != other.intrinsic_duration {
            note(
                NoteType::Error,
                format!(
                    "intrinsic durations differ ({} vs {})",
                    self.intrinsic_duration, other.intrinsic_duration
                ),
            );
            equal = false;
        }

        if self.entry_point != other.entry_point {
            note(
                NoteType::Error,
                format!(
                    "entry points differ ({} vs {})",
                    self.entry_point, other.entry_point
                ),
            );
            equal = false;
        }

        if self.duration != other.duration {
            note(
                NoteType::Error,
                format!("durations differ ({} vs {})", self.duration, other.duration),
            );
            equal = false;
        }

        if self.key_id != other.key_id
            && report(
                opt.key_ids_can_differ,
                note,
                format!(
                    "key ids differ ({} vs {})",
                    describe_key(self.key_id),
                    describe_key(other.key_id)
                ),
            )
        {
            equal = false;
        }

        // Digests are only computed when a difference would matter
        if !opt.digests_can_differ {
            match (self.digest(), other.digest()) {
                (Ok(a), Ok(b)) if a == b => {}
                (Ok(a), Ok(b)) => {
                    note(
                        NoteType::Error,
                        format!(
                            "digests differ for {} ({} vs {})",
                            self.file_name, a, b
                        ),
                    );
                    equal = false;
                }
                (Err(e), _) | (_, Err(e)) => {
                    note(NoteType::Error, format!("could not compare digests: {e}"));
                    equal = false;
                }
            }
        }

        equal
    }
}

fn describe_key(key_id: Option<Uuid>) -> String {
    key_id.map_or_else(|| "unencrypted".to_string(), |k| k.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::NoteCollector;

    fn picture(mode: PictureMode, duration: u64) -> Asset {
        Asset::new(
            Uuid::new_v4(),
            "/nonexistent",
            "video.mxf",
            Essence::Picture {
                mode,
                size: Size::new(1998, 1080),
            },
            Fraction::new(24, 1),
            duration,
            None,
        )
    }

    fn no_digests() -> EqualityOptions {
        EqualityOptions {
            digests_can_differ: true,
            ..EqualityOptions::default()
        }
    }

    #[test]
    fn test_trimming_window() {
        let mut asset = picture(PictureMode::Mono, 100);
        assert_eq!(asset.duration(), 100);
        asset.set_entry_point(10).unwrap();
        assert_eq!(asset.duration(), 90);
        asset.set_duration(50).unwrap();
        assert!(matches!(
            asset.set_duration(91),
            Err(Error::InvalidTrim { .. })
        ));
        assert!(matches!(
            asset.set_duration(u64::MAX),
            Err(Error::InvalidTrim { .. })
        ));
        assert!(asset.set_entry_point(101).is_err());
        assert_eq!((asset.entry_point(), asset.duration()), (10, 50));
    }

    #[test]
    fn test_equal_to_itself() {
        let asset = picture(PictureMode::Mono, 100);
        let mut collector = NoteCollector::new();
        assert!(asset.equals(&asset.clone(), &no_digests(), &mut collector.sink()));
        assert!(collector.notes.is_empty());
    }

    #[test]
    fn test_mono_stereo_mismatch_is_hard_error() {
        let mono = picture(PictureMode::Mono, 100);
        let mut stereo = mono.clone();
        stereo.set_picture_mode(PictureMode::Stereo);

        let lenient = EqualityOptions {
            cpl_names_can_differ: true,
            mxf_names_can_differ: true,
            digests_can_differ: true,
            key_ids_can_differ: true,
        };
        let mut collector = NoteCollector::new();
        assert!(!mono.equals(&stereo, &lenient, &mut collector.sink()));
        assert_eq!(collector.errors().count(), 1);
        assert!(collector.notes[0].message.contains("stereoscopy"));
    }

    #[test]
    fn test_each_mismatch_gets_its_own_note() {
        let a = picture(PictureMode::Mono, 100);
        let mut b = picture(PictureMode::Mono, 120);
        b.set_entry_point(5).unwrap();

        let mut collector = NoteCollector::new();
        assert!(!a.equals(&b, &no_digests(), &mut collector.sink()));
        // intrinsic duration, entry point, duration
        assert_eq!(collector.errors().count(), 3);
    }

    #[test]
    fn test_type_mismatch_short_circuits() {
        let a = picture(PictureMode::Mono, 100);
        let b = Asset::new(
            Uuid::new_v4(),
            "/nonexistent",
            "audio.mxf",
            Essence::Sound {
                channels: 6,
                sampling_rate: 48_000,
            },
            Fraction::new(24, 1),
            100,
            None,
        );
        let mut collector = NoteCollector::new();
        assert!(!a.equals(&b, &EqualityOptions::default(), &mut collector.sink()));
        assert_eq!(collector.notes.len(), 1);
    }

    #[test]
    fn test_tolerated_name_difference_is_warning() {
        let a = picture(PictureMode::Mono, 100);
        let mut b = a.clone();
        b.file_name = "other.mxf".into();

        let mut collector = NoteCollector::new();
        let opt = EqualityOptions {
            mxf_names_can_differ: true,
            ..no_digests()
        };
        assert!(a.equals(&b, &opt, &mut collector.sink()));
        assert_eq!(collector.warnings().count(), 1);

        let mut collector = NoteCollector::new();
        assert!(!a.equals(&b, &no_digests(), &mut collector.sink()));
    }

    #[test]
    fn test_unreadable_digest_is_a_mismatch() {
        let a = picture(PictureMode::Mono, 100);
        let mut collector = NoteCollector::new();
        assert!(!a.equals(&a.clone(), &EqualityOptions::default(), &mut collector.sink()));
        assert!(collector.notes[0].message.contains("digest"));
    }

    #[test]
    fn test_write_to_cpl_omits_defaults() {
        let mut asset = picture(PictureMode::Stereo, 100);
        let mut list = Element::new("AssetList");
        asset.write_to_cpl(&mut list);
        let node = list.child("MainStereoscopicPicture").unwrap();
        assert!(node.child("EntryPoint").is_none());
        assert!(node.child("Duration").is_none());
        assert_eq!(node.string_child("FrameRate").unwrap(), "48 1");
        assert_eq!(node.attribute("xmlns:msp-cpl"), Some(STEREO_PICTURE_NAMESPACE));

        asset.set_entry_point(24).unwrap();
        asset.set_duration(48).unwrap();
        let mut list = Element::new("AssetList");
        asset.write_to_cpl(&mut list);
        let node = list.child("MainStereoscopicPicture").unwrap();
        assert_eq!(node.string_child("EntryPoint").unwrap(), "24");
        assert_eq!(node.string_child("Duration").unwrap(), "48");
    }
}
