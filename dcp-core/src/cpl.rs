//! Composition Playlist: an ordered list of reels
//!
//! A CPL is built either fresh ([`Cpl::new`] + [`Cpl::add_reel`]) or by
//! parsing an existing document ([`Cpl::read`]), which resolves every asset
//! id through the package's AssetMap and opens the essence header.
//!
//! Its own digest and size only exist once the XML file has been written,
//! which [`CplState`] makes explicit.

use crate::asset::{Asset, PictureMode};
use crate::asset_map::{parse_urn_uuid, AssetMap, AssetMapEntry, Chunk};
use crate::equality::{report, EqualityOptions, NoteHandler, NoteType};
use crate::essence::{EssenceCodec, EssenceKind};
use crate::identity::{make_digest, make_uuid};
use crate::metadata::XmlMetadata;
use crate::packing_list::{PackingList, PackingListEntry};
use crate::reel::Reel;
use crate::types::Fraction;
use crate::xml::Element;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// SMPTE CPL namespace
pub const CPL_NAMESPACE: &str = "http://www.smpte-ra.org/schemas/429-7/2006/CPL";

/// MIME type of a CPL in the PackingList
pub const CPL_MIME_TYPE: &str = "text/xml";

/// What sort of program a composition is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContentKind {
    Feature,
    Short,
    Trailer,
    Test,
    Transitional,
    Rating,
    Teaser,
    Policy,
    PublicServiceAnnouncement,
    Advertisement,
}

impl ContentKind {
    pub const ALL: [ContentKind; 10] = [
        ContentKind::Feature,
        ContentKind::Short,
        ContentKind::Trailer,
        ContentKind::Test,
        ContentKind::Transitional,
        ContentKind::Rating,
        ContentKind::Teaser,
        ContentKind::Policy,
        ContentKind::PublicServiceAnnouncement,
        ContentKind::Advertisement,
    ];

    /// The value written in `ContentKind`
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Feature => "feature",
            ContentKind::Short => "short",
            ContentKind::Trailer => "trailer",
            ContentKind::Test => "test",
            ContentKind::Transitional => "transitional",
            ContentKind::Rating => "rating",
            ContentKind::Teaser => "teaser",
            ContentKind::Policy => "policy",
            ContentKind::PublicServiceAnnouncement => "psa",
            ContentKind::Advertisement => "advertisement",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        ContentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| Error::Xml(format!("unknown content kind '{s}'")))
    }
}

/// What [`Cpl::read`] does when a referenced essence cannot be opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EssencePolicy {
    /// Fail the whole parse
    #[default]
    Strict,
    /// Leave the asset out of its reel
    Permissive,
}

/// Whether the CPL's own XML file exists yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CplState {
    Draft,
    Written {
        /// File name relative to the CPL directory
        file_name: String,
        /// Base64 SHA-1 of the written file
        digest: String,
        size: u64,
    },
}

#[derive(Debug, Clone)]
pub struct Cpl {
    uuid: Uuid,
    directory: PathBuf,
    name: String,
    content_kind: ContentKind,
    target_length: u64,
    length: u64,
    fps: u32,
    reels: Vec<Reel>,
    state: CplState,
}

impl Cpl {
    /// Starts an empty composition; `target_length` is the expected total
    /// picture duration in frames.
    pub fn new(
        directory: impl Into<PathBuf>,
        name: impl Into<String>,
        content_kind: ContentKind,
        target_length: u64,
        fps: u32,
    ) -> Self {
        Self {
            uuid: make_uuid(),
            directory: directory.into(),
            name: name.into(),
            content_kind,
            target_length,
            length: 0,
            fps,
            reels: Vec::new(),
            state: CplState::Draft,
        }
    }

    /// Appends a reel; its picture duration counts towards [`length`](Self::length)
    pub fn add_reel(&mut self, reel: Reel) {
        if let Some(picture) = reel.main_picture() {
            let rate = picture.edit_rate().numerator;
            if rate != self.fps {
                tracing::warn!(
                    cpl = %self.uuid,
                    reel = %reel.uuid(),
                    "picture edit rate {} does not match composition fps {}",
                    rate,
                    self.fps
                );
            }
            self.length = self.length.saturating_add(picture.duration());
        }
        self.reels.push(reel);
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_kind(&self) -> ContentKind {
        self.content_kind
    }

    /// Sum of the picture durations of all reels
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn reels(&self) -> &[Reel] {
        &self.reels
    }

    pub fn state(&self) -> &CplState {
        &self.state
    }

    /// `<uuid>_cpl.xml`, the name [`write_xml`](Self::write_xml) uses
    pub fn file_name(&self) -> String {
        format!("{}_cpl.xml", self.uuid)
    }

    /// Every present asset, reel by reel, in picture, sound, subtitle order
    pub fn assets(&self) -> Vec<Arc<Asset>> {
        self.reels
            .iter()
            .flat_map(|r| r.assets().cloned())
            .collect()
    }

    /// Parses a CPL document, resolving assets through `asset_map`
    ///
    /// Asset paths in the map are relative to the directory holding the CPL.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display(), policy = ?policy))]
    pub fn read(
        path: impl AsRef<Path>,
        asset_map: &AssetMap,
        codec: &dyn EssenceCodec,
        policy: EssencePolicy,
    ) -> Result<Self> {
        let path = path.as_ref();
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let root = Element::read_file(path)?;
        if root.local_name() != "CompositionPlaylist" {
            return Err(Error::Xml(format!(
                "expected CompositionPlaylist, found {}",
                root.local_name()
            )));
        }

        let uuid = parse_urn_uuid(&root.string_child("Id")?)?;
        let name = root
            .optional_string_child("ContentTitleText")
            .or_else(|| root.optional_string_child("AnnotationText"))
            .unwrap_or_default();
        let content_kind: ContentKind = root.parsed_child("ContentKind")?;

        let mut resolver = AssetResolver {
            directory: &directory,
            asset_map,
            codec,
            policy,
            cache: HashMap::new(),
        };

        let mut reels = Vec::new();
        let mut length: u64 = 0;
        let mut fps: Option<u32> = None;
        for reel_node in root.required_child("ReelList")?.children_named("Reel") {
            let reel_uuid = parse_urn_uuid(&reel_node.string_child("Id")?)?;
            let asset_list = reel_node.required_child("AssetList")?;

            let mut picture = None;
            let mut sound = None;
            let mut subtitle = None;
            for node in asset_list.elements() {
                let slot = match node.local_name() {
                    "MainPicture" | "MainStereoscopicPicture" => &mut picture,
                    "MainSound" => &mut sound,
                    "MainSubtitle" => &mut subtitle,
                    other => {
                        tracing::debug!("ignoring unsupported reel asset {}", other);
                        continue;
                    }
                };
                let declared = DeclaredAsset::from_xml(node)?;

                if declared.kind == EssenceKind::Picture {
                    length = length.checked_add(declared.duration).ok_or_else(|| {
                        Error::Xml(format!("CPL {uuid}: total picture duration overflows"))
                    })?;
                    match fps {
                        None => fps = Some(declared.edit_rate.numerator),
                        Some(f) if f != declared.edit_rate.numerator => {
                            tracing::warn!(
                                cpl = %uuid,
                                "picture edit rate {} differs from the first reel's {}",
                                declared.edit_rate,
                                f
                            );
                        }
                        Some(_) => {}
                    }
                }

                *slot = resolver.resolve(&declared)?;
            }

            reels.push(Reel::with_uuid(reel_uuid, picture, sound, subtitle)?);
        }

        let fps = fps
            .or_else(|| {
                reels
                    .iter()
                    .flat_map(Reel::assets)
                    .next()
                    .map(|a| a.edit_rate().numerator)
            })
            .unwrap_or(0);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(path)
            .map_err(|e| Error::file("could not stat CPL", path, e))?
            .len();
        let state = CplState::Written {
            file_name,
            digest: make_digest(path)?,
            size,
        };

        tracing::debug!(reels = reels.len(), length, fps, "parsed CPL");
        Ok(Self {
            uuid,
            directory,
            name,
            content_kind,
            target_length: length,
            length,
            fps,
            reels,
            state,
        })
    }

    /// Builds the CPL document
    pub fn to_xml(&self, metadata: &XmlMetadata) -> Element {
        let mut root = Element::with_namespace("CompositionPlaylist", CPL_NAMESPACE);
        root.add_text_child("Id", format!("urn:uuid:{}", self.uuid));
        root.add_text_child("AnnotationText", &self.name);
        root.add_text_child("IssueDate", &metadata.issue_date);
        root.add_text_child("Issuer", &metadata.issuer);
        root.add_text_child("Creator", &metadata.creator);
        root.add_text_child("ContentTitleText", &self.name);
        root.add_text_child("ContentKind", self.content_kind);

        let label = format!("{}_{}", self.uuid, metadata.issue_date);
        let version = root.add_child("ContentVersion");
        version.add_text_child("Id", format!("urn:uri:{label}"));
        version.add_text_child("LabelText", label);

        root.add_child("RatingList");

        let reel_list = root.add_child("ReelList");
        for reel in &self.reels {
            reel.write_to_cpl(reel_list);
        }
        root
    }

    /// Writes `<uuid>_cpl.xml` into the CPL directory and records its digest
    /// and size; returns the file path.
    #[tracing::instrument(skip(self, metadata), fields(cpl = %self.uuid))]
    pub fn write_xml(&mut self, metadata: &XmlMetadata) -> Result<PathBuf> {
        if self.length != self.target_length {
            tracing::warn!(
                "CPL length {} does not match the expected {}",
                self.length,
                self.target_length
            );
        }

        let file_name = self.file_name();
        let path = self.directory.join(&file_name);
        self.to_xml(metadata).write_to_file(&path)?;

        let size = std::fs::metadata(&path)
            .map_err(|e| Error::file("could not stat CPL", &path, e))?
            .len();
        self.state = CplState::Written {
            file_name,
            digest: make_digest(&path)?,
            size,
        };
        tracing::info!(reels = self.reels.len(), length = self.length, "wrote CPL");
        Ok(path)
    }

    fn written(&self) -> Result<(&str, &str, u64)> {
        match &self.state {
            CplState::Written {
                file_name,
                digest,
                size,
            } => Ok((file_name, digest, *size)),
            CplState::Draft => Err(Error::State(format!(
                "CPL {} has not been written yet",
                self.uuid
            ))),
        }
    }

    /// Adds this CPL's own PackingList entry
    pub fn write_to_pkl(&self, pkl: &mut PackingList) -> Result<()> {
        let (_, digest, size) = self.written()?;
        pkl.add(PackingListEntry {
            id: self.uuid,
            annotation_text: self.name.clone(),
            hash: digest.to_string(),
            size,
            mime_type: CPL_MIME_TYPE.to_string(),
        });
        Ok(())
    }

    /// Adds this CPL's own AssetMap entry
    pub fn write_to_assetmap(&self, asset_map: &mut AssetMap) -> Result<()> {
        let (file_name, _, size) = self.written()?;
        asset_map.add(AssetMapEntry {
            id: self.uuid,
            packing_list: false,
            chunks: vec![Chunk::whole_file(file_name, size)],
        });
        Ok(())
    }

    /// Structural comparison; identities are not compared
    pub fn equals(&self, other: &Cpl, opt: &EqualityOptions, note: NoteHandler<'_>) -> bool {
        if self.name != other.name
            && report(
                opt.cpl_names_can_differ,
                note,
                format!("CPL names differ: {} vs {}", self.name, other.name),
            )
        {
            return false;
        }

        if self.content_kind != other.content_kind {
            note(
                NoteType::Error,
                format!(
                    "content kinds differ ({} vs {})",
                    self.content_kind, other.content_kind
                ),
            );
            return false;
        }

        if self.fps != other.fps {
            note(
                NoteType::Error,
                format!("frames per second differ ({} vs {})", self.fps, other.fps),
            );
            return false;
        }

        if self.length != other.length {
            note(
                NoteType::Error,
                format!("lengths differ ({} vs {})", self.length, other.length),
            );
            return false;
        }

        if self.reels.len() != other.reels.len() {
            note(
                NoteType::Error,
                format!(
                    "reel counts differ ({} vs {})",
                    self.reels.len(),
                    other.reels.len()
                ),
            );
            return false;
        }

        let mut equal = true;
        for (a, b) in self.reels.iter().zip(&other.reels) {
            if !a.equals(b, opt, note) {
                equal = false;
            }
        }
        equal
    }
}

/// What a reel's asset element says about the asset it references
struct DeclaredAsset {
    id: Uuid,
    kind: EssenceKind,
    mode: Option<PictureMode>,
    edit_rate: Fraction,
    intrinsic_duration: u64,
    entry_point: u64,
    duration: u64,
}

impl DeclaredAsset {
    fn from_xml(node: &Element) -> Result<Self> {
        let edit_rate: Fraction = node.parsed_child("EditRate")?;
        let intrinsic_duration: u64 = node.parsed_child("IntrinsicDuration")?;
        let entry_point: u64 = node.optional_parsed_child("EntryPoint")?.unwrap_or(0);
        let duration = node
            .optional_parsed_child("Duration")?
            .unwrap_or(intrinsic_duration.saturating_sub(entry_point));
        if entry_point.checked_add(duration).is_none() {
            return Err(Error::InvalidTrim {
                entry_point,
                duration,
                intrinsic_duration,
            });
        }

        let (kind, mode) = match node.local_name() {
            "MainStereoscopicPicture" => (EssenceKind::Picture, Some(PictureMode::Stereo)),
            "MainPicture" => {
                // 3D material is sometimes declared as plain MainPicture with
                // a frame rate of twice the edit rate
                let frame_rate: Fraction = node
                    .optional_parsed_child("FrameRate")?
                    .unwrap_or(edit_rate);
                let mode = if frame_rate.is_double_of(&edit_rate) {
                    PictureMode::Stereo
                } else {
                    PictureMode::Mono
                };
                (EssenceKind::Picture, Some(mode))
            }
            "MainSound" => (EssenceKind::Sound, None),
            _ => (EssenceKind::Subtitle, None),
        };

        Ok(Self {
            id: parse_urn_uuid(&node.string_child("Id")?)?,
            kind,
            mode,
            edit_rate,
            intrinsic_duration,
            entry_point,
            duration,
        })
    }
}

/// Identity of a reference: id, trimming window and declared picture mode
type ResolverKey = (Uuid, u64, u64, Option<PictureMode>);

/// Opens referenced essences once per (id, trimming window, picture mode)
struct AssetResolver<'a> {
    directory: &'a Path,
    asset_map: &'a AssetMap,
    codec: &'a dyn EssenceCodec,
    policy: EssencePolicy,
    cache: HashMap<ResolverKey, Arc<Asset>>,
}

impl AssetResolver<'_> {
    /// `Ok(None)` means the essence is missing and the policy allows that
    fn resolve(&mut self, declared: &DeclaredAsset) -> Result<Option<Arc<Asset>>> {
        let key = (
            declared.id,
            declared.entry_point,
            declared.duration,
            declared.mode,
        );
        if let Some(asset) = self.cache.get(&key) {
            return Ok(Some(Arc::clone(asset)));
        }

        let mut asset = match self.open(declared.id) {
            Ok(asset) => asset,
            Err(e) if self.policy == EssencePolicy::Permissive && e.is_missing_essence() => {
                tracing::debug!(asset = %declared.id, "omitting missing essence: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if asset.uuid() != declared.id {
            tracing::warn!(
                "essence {} has id {} but the CPL refers to it as {}",
                asset.file_name(),
                asset.uuid(),
                declared.id
            );
        }
        if asset.intrinsic_duration() != declared.intrinsic_duration {
            tracing::warn!(
                "essence {} has {} frames but the CPL declares {}",
                asset.file_name(),
                asset.intrinsic_duration(),
                declared.intrinsic_duration
            );
        }
        if let Some(mode) = declared.mode {
            asset.set_picture_mode(mode);
        }
        asset.set_entry_point(declared.entry_point)?;
        asset.set_duration(declared.duration)?;

        let asset = Arc::new(asset);
        self.cache.insert(key, Arc::clone(&asset));
        Ok(Some(asset))
    }

    fn open(&self, id: Uuid) -> Result<Asset> {
        let entry = self.asset_map.asset_from_id(id)?;
        Asset::open(self.directory, entry.path()?, self.codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Essence;
    use crate::equality::NoteCollector;
    use crate::types::Size;

    fn picture(duration: u64) -> Arc<Asset> {
        Arc::new(Asset::new(
            Uuid::new_v4(),
            "/nonexistent",
            "video.mxf",
            Essence::Picture {
                mode: PictureMode::Mono,
                size: Size::new(1998, 1080),
            },
            Fraction::new(24, 1),
            duration,
            None,
        ))
    }

    fn sound(duration: u64) -> Arc<Asset> {
        Arc::new(Asset::new(
            Uuid::new_v4(),
            "/nonexistent",
            "audio.mxf",
            Essence::Sound {
                channels: 6,
                sampling_rate: 48_000,
            },
            Fraction::new(24, 1),
            duration,
            None,
        ))
    }

    fn lenient() -> EqualityOptions {
        EqualityOptions {
            digests_can_differ: true,
            ..EqualityOptions::default()
        }
    }

    fn declared(xml: &str) -> DeclaredAsset {
        DeclaredAsset::from_xml(&Element::parse(xml).unwrap()).unwrap()
    }

    #[test]
    fn test_content_kind_strings() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
        assert_eq!("Feature".parse::<ContentKind>().unwrap(), ContentKind::Feature);
        assert!("documentary".parse::<ContentKind>().is_err());
    }

    #[test]
    fn test_length_is_sum_of_picture_durations() {
        let mut cpl = Cpl::new("/tmp", "film", ContentKind::Feature, 2500, 24);
        cpl.add_reel(Reel::new(Some(picture(1000)), Some(sound(1000)), None).unwrap());
        cpl.add_reel(Reel::new(Some(picture(1500)), None, None).unwrap());
        assert_eq!(cpl.length(), 2500);
        assert_eq!(cpl.assets().len(), 3);
    }

    #[test]
    fn test_frame_rate_double_edit_rate_is_stereo() {
        let d = declared(
            "<MainPicture><Id>urn:uuid:8a3c2fd1-5e2b-4b43-a3c7-0bd1c0b6e7f0</Id>\
             <EditRate>24 1</EditRate><IntrinsicDuration>48</IntrinsicDuration>\
             <FrameRate>48 1</FrameRate></MainPicture>",
        );
        assert_eq!(d.mode, Some(PictureMode::Stereo));

        let d = declared(
            "<MainPicture><Id>urn:uuid:8a3c2fd1-5e2b-4b43-a3c7-0bd1c0b6e7f0</Id>\
             <EditRate>24 1</EditRate><IntrinsicDuration>48</IntrinsicDuration>\
             <FrameRate>24 1</FrameRate></MainPicture>",
        );
        assert_eq!(d.mode, Some(PictureMode::Mono));
    }

    #[test]
    fn test_missing_frame_rate_is_mono() {
        let d = declared(
            "<MainPicture><Id>urn:uuid:8a3c2fd1-5e2b-4b43-a3c7-0bd1c0b6e7f0</Id>\
             <EditRate>24 1</EditRate><IntrinsicDuration>48</IntrinsicDuration>\
             <EntryPoint>8</EntryPoint></MainPicture>",
        );
        assert_eq!(d.mode, Some(PictureMode::Mono));
        assert_eq!(d.duration, 40);
    }

    #[test]
    fn test_overflowing_trim_is_rejected() {
        let node = Element::parse(
            "<MainPicture><Id>urn:uuid:8a3c2fd1-5e2b-4b43-a3c7-0bd1c0b6e7f0</Id>\
             <EditRate>24 1</EditRate><IntrinsicDuration>48</IntrinsicDuration>\
             <EntryPoint>1</EntryPoint><Duration>18446744073709551615</Duration>\
             </MainPicture>",
        )
        .unwrap();
        assert!(matches!(
            DeclaredAsset::from_xml(&node),
            Err(Error::InvalidTrim { entry_point: 1, .. })
        ));
    }

    #[test]
    fn test_explicit_stereo_element() {
        let d = declared(
            "<msp-cpl:MainStereoscopicPicture xmlns:msp-cpl=\"urn:x\">\
             <Id>urn:uuid:8a3c2fd1-5e2b-4b43-a3c7-0bd1c0b6e7f0</Id>\
             <EditRate>24 1</EditRate><IntrinsicDuration>48</IntrinsicDuration>\
             </msp-cpl:MainStereoscopicPicture>",
        );
        assert_eq!(d.mode, Some(PictureMode::Stereo));
    }

    #[test]
    fn test_equal_to_itself() {
        let mut cpl = Cpl::new("/tmp", "film", ContentKind::Feature, 100, 24);
        cpl.add_reel(Reel::new(Some(picture(100)), None, None).unwrap());
        let mut collector = NoteCollector::new();
        assert!(cpl.equals(&cpl.clone(), &lenient(), &mut collector.sink()));
        assert!(collector.notes.is_empty());
    }

    #[test]
    fn test_name_difference_tolerance() {
        let pic = picture(100);
        let mut a = Cpl::new("/tmp", "film", ContentKind::Feature, 100, 24);
        a.add_reel(Reel::new(Some(pic.clone()), None, None).unwrap());
        let mut b = Cpl::new("/tmp", "film v2", ContentKind::Feature, 100, 24);
        b.add_reel(Reel::new(Some(pic), None, None).unwrap());

        let mut collector = NoteCollector::new();
        assert!(!a.equals(&b, &lenient(), &mut collector.sink()));
        assert_eq!(collector.errors().count(), 1);

        let opt = EqualityOptions {
            cpl_names_can_differ: true,
            ..lenient()
        };
        let mut collector = NoteCollector::new();
        assert!(a.equals(&b, &opt, &mut collector.sink()));
        assert_eq!(collector.warnings().count(), 1);
        assert_eq!(collector.errors().count(), 0);
    }

    #[test]
    fn test_one_fewer_reel_is_single_error() {
        let pic = picture(1000);
        let mut a = Cpl::new("/tmp", "film", ContentKind::Feature, 1000, 24);
        a.add_reel(Reel::new(Some(pic.clone()), None, None).unwrap());
        a.add_reel(Reel::new(None, Some(sound(1000)), None).unwrap());
        let mut b = Cpl::new("/tmp", "film", ContentKind::Feature, 1000, 24);
        b.add_reel(Reel::new(Some(pic), None, None).unwrap());
        assert_eq!(a.length(), b.length());

        let mut collector = NoteCollector::new();
        assert!(!a.equals(&b, &lenient(), &mut collector.sink()));
        assert_eq!(collector.notes.len(), 1);
        assert!(collector.notes[0].message.contains("reel counts"));
    }

    #[test]
    fn test_reel_failures_do_not_stop_comparison() {
        let mut a = Cpl::new("/tmp", "film", ContentKind::Feature, 200, 24);
        a.add_reel(Reel::new(Some(picture(100)), Some(sound(100)), None).unwrap());
        a.add_reel(Reel::new(Some(picture(100)), Some(sound(100)), None).unwrap());
        let mut b = Cpl::new("/tmp", "film", ContentKind::Feature, 200, 24);
        b.add_reel(Reel::new(Some(picture(100)), None, None).unwrap());
        b.add_reel(Reel::new(Some(picture(100)), None, None).unwrap());

        let mut collector = NoteCollector::new();
        assert!(!a.equals(&b, &lenient(), &mut collector.sink()));
        assert_eq!(collector.errors().count(), 2);
    }

    #[test]
    fn test_draft_has_no_manifest_entries() {
        let cpl = Cpl::new("/tmp", "film", ContentKind::Short, 0, 24);
        let mut pkl = PackingList::new(Uuid::new_v4(), "x", &XmlMetadata::default());
        assert!(matches!(cpl.write_to_pkl(&mut pkl), Err(Error::State(_))));
        let mut map = AssetMap::new(Uuid::new_v4(), &XmlMetadata::default());
        assert!(matches!(cpl.write_to_assetmap(&mut map), Err(Error::State(_))));
    }

    #[test]
    fn test_write_xml_moves_to_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut cpl = Cpl::new(dir.path(), "film", ContentKind::Trailer, 100, 24);
        cpl.add_reel(Reel::new(Some(picture(100)), None, None).unwrap());
        let path = cpl.write_xml(&XmlMetadata::default()).unwrap();
        assert_eq!(path, dir.path().join(cpl.file_name()));

        match cpl.state() {
            CplState::Written { digest, size, .. } => {
                assert_eq!(*size, std::fs::metadata(&path).unwrap().len());
                assert_eq!(*digest, make_digest(&path).unwrap());
            }
            CplState::Draft => panic!("still draft"),
        }

        let root = Element::read_file(&path).unwrap();
        assert_eq!(root.attribute("xmlns"), Some(CPL_NAMESPACE));
        assert_eq!(root.string_child("ContentKind").unwrap(), "trailer");
        let label = root
            .required_child("ContentVersion")
            .unwrap()
            .string_child("LabelText")
            .unwrap();
        assert!(label.starts_with(&cpl.uuid().to_string()));

        let mut map = AssetMap::new(Uuid::new_v4(), &XmlMetadata::default());
        cpl.write_to_assetmap(&mut map).unwrap();
        assert_eq!(map.assets[0].path().unwrap(), cpl.file_name());
    }
}
