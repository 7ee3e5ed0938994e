//! AssetMap: where on disk each asset UUID lives

use crate::metadata::XmlMetadata;
use crate::xml::Element;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// SMPTE AssetMap namespace
pub const ASSETMAP_NAMESPACE: &str = "http://www.smpte-ra.org/schemas/429-9/2007/AM";

/// File names an AssetMap may have at the package root
pub const ASSETMAP_FILE_NAMES: [&str; 2] = ["ASSETMAP.xml", "ASSETMAP"];

/// File name of the volume index written next to the AssetMap
pub const VOLINDEX_FILE_NAME: &str = "VOLINDEX.xml";

/// A contiguous byte range of one file on one volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Path relative to the package root
    pub path: String,
    pub volume_index: u32,
    pub offset: u64,
    pub length: u64,
}

impl Chunk {
    /// The usual single chunk spanning a whole file on volume 1
    pub fn whole_file(path: impl Into<String>, length: u64) -> Self {
        Self {
            path: path.into(),
            volume_index: 1,
            offset: 0,
            length,
        }
    }
}

/// One `Asset` of the AssetMap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMapEntry {
    pub id: Uuid,
    /// True for the entry describing the PackingList itself
    pub packing_list: bool,
    pub chunks: Vec<Chunk>,
}

impl AssetMapEntry {
    /// Path of the first chunk, which is where the asset's file starts
    pub fn path(&self) -> Result<&str> {
        self.chunks
            .first()
            .map(|c| c.path.as_str())
            .ok_or_else(|| Error::Xml(format!("asset {} has an empty chunk list", self.id)))
    }
}

/// The AssetMap of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMap {
    pub id: Uuid,
    pub annotation_text: Option<String>,
    pub creator: String,
    pub volume_count: u32,
    pub issue_date: String,
    pub issuer: String,
    pub assets: Vec<AssetMapEntry>,
}

impl AssetMap {
    pub fn new(id: Uuid, metadata: &XmlMetadata) -> Self {
        Self {
            id,
            annotation_text: None,
            creator: metadata.creator.clone(),
            volume_count: 1,
            issue_date: metadata.issue_date.clone(),
            issuer: metadata.issuer.clone(),
            assets: Vec::new(),
        }
    }

    /// Adds an entry unless one with the same id is already present
    pub fn add(&mut self, entry: AssetMapEntry) {
        if !self.assets.iter().any(|a| a.id == entry.id) {
            self.assets.push(entry);
        }
    }

    /// Looks up an asset by id
    pub fn asset_from_id(&self, id: Uuid) -> Result<&AssetMapEntry> {
        self.assets
            .iter()
            .find(|a| a.id == id)
            .ok_or(Error::AssetNotFound(id))
    }

    /// Finds the AssetMap file in a package directory
    pub fn find_in(directory: impl AsRef<Path>) -> Result<PathBuf> {
        let directory = directory.as_ref();
        ASSETMAP_FILE_NAMES
            .iter()
            .map(|name| directory.join(name))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                Error::file(
                    "could not find ASSETMAP",
                    directory,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                )
            })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_xml(&Element::read_file(path)?)
    }

    pub fn from_xml(root: &Element) -> Result<Self> {
        if root.local_name() != "AssetMap" {
            return Err(Error::Xml(format!(
                "expected AssetMap, found {}",
                root.local_name()
            )));
        }

        let mut assets = Vec::new();
        for asset in root.required_child("AssetList")?.children_named("Asset") {
            let mut chunks = Vec::new();
            for chunk in asset.required_child("ChunkList")?.children_named("Chunk") {
                chunks.push(Chunk {
                    path: chunk.string_child("Path")?,
                    volume_index: chunk.optional_parsed_child("VolumeIndex")?.unwrap_or(1),
                    offset: chunk.optional_parsed_child("Offset")?.unwrap_or(0),
                    length: chunk.optional_parsed_child("Length")?.unwrap_or(0),
                });
            }
            assets.push(AssetMapEntry {
                id: parse_urn_uuid(&asset.string_child("Id")?)?,
                packing_list: asset
                    .optional_string_child("PackingList")
                    .is_some_and(|v| v == "true"),
                chunks,
            });
        }

        Ok(Self {
            id: parse_urn_uuid(&root.string_child("Id")?)?,
            annotation_text: root.optional_string_child("AnnotationText"),
            creator: root.optional_string_child("Creator").unwrap_or_default(),
            volume_count: root.optional_parsed_child("VolumeCount")?.unwrap_or(1),
            issue_date: root.optional_string_child("IssueDate").unwrap_or_default(),
            issuer: root.optional_string_child("Issuer").unwrap_or_default(),
            assets,
        })
    }

    pub fn to_xml(&self) -> Element {
        let mut root = Element::with_namespace("AssetMap", ASSETMAP_NAMESPACE);
        root.add_text_child("Id", format!("urn:uuid:{}", self.id));
        if let Some(text) = &self.annotation_text {
            root.add_text_child("AnnotationText", text);
        }
        root.add_text_child("Creator", &self.creator);
        root.add_text_child("VolumeCount", self.volume_count);
        root.add_text_child("IssueDate", &self.issue_date);
        root.add_text_child("Issuer", &self.issuer);

        let list = root.add_child("AssetList");
        for entry in &self.assets {
            let asset = list.add_child("Asset");
            asset.add_text_child("Id", format!("urn:uuid:{}", entry.id));
            if entry.packing_list {
                asset.add_text_child("PackingList", "true");
            }
            let chunk_list = asset.add_child("ChunkList");
            for chunk in &entry.chunks {
                let node = chunk_list.add_child("Chunk");
                node.add_text_child("Path", &chunk.path);
                node.add_text_child("VolumeIndex", chunk.volume_index);
                node.add_text_child("Offset", chunk.offset);
                node.add_text_child("Length", chunk.length);
            }
        }
        root
    }

    /// Writes `ASSETMAP.xml` and `VOLINDEX.xml` into `directory`
    pub fn write(&self, directory: impl AsRef<Path>) -> Result<PathBuf> {
        let directory = directory.as_ref();
        let path = directory.join(ASSETMAP_FILE_NAMES[0]);
        self.to_xml().write_to_file(&path)?;

        let mut volindex = Element::with_namespace("VolumeIndex", ASSETMAP_NAMESPACE);
        volindex.add_text_child("Index", 1);
        volindex.write_to_file(directory.join(VOLINDEX_FILE_NAME))?;

        Ok(path)
    }
}

/// Parses `urn:uuid:xxxxxxxx-...` (or a bare UUID)
pub fn parse_urn_uuid(text: &str) -> Result<Uuid> {
    let bare = text.trim().strip_prefix("urn:uuid:").unwrap_or(text.trim());
    Ok(Uuid::parse_str(bare)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssetMap {
        let mut map = AssetMap::new(Uuid::new_v4(), &XmlMetadata::default());
        let pkl = Uuid::new_v4();
        map.add(AssetMapEntry {
            id: pkl,
            packing_list: true,
            chunks: vec![Chunk::whole_file(format!("pkl_{pkl}.xml"), 812)],
        });
        map.add(AssetMapEntry {
            id: Uuid::new_v4(),
            packing_list: false,
            chunks: vec![Chunk::whole_file("video.mxf", 1_048_576)],
        });
        map
    }

    #[test]
    fn test_xml_roundtrip() {
        let map = sample();
        let text = map.to_xml().to_document_string().unwrap();
        let parsed = AssetMap::from_xml(&Element::parse(&text).unwrap()).unwrap();
        assert_eq!(parsed, map);
    }

    #[test]
    fn test_asset_from_id() {
        let map = sample();
        let id = map.assets[1].id;
        assert_eq!(map.asset_from_id(id).unwrap().path().unwrap(), "video.mxf");
        let unknown = Uuid::new_v4();
        assert!(matches!(
            map.asset_from_id(unknown),
            Err(Error::AssetNotFound(u)) if u == unknown
        ));
    }

    #[test]
    fn test_duplicate_ids_are_ignored() {
        let mut map = sample();
        let again = map.assets[1].clone();
        map.add(again);
        assert_eq!(map.assets.len(), 2);
    }

    #[test]
    fn test_write_and_find() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AssetMap::find_in(dir.path()).is_err());
        let map = sample();
        let path = map.write(dir.path()).unwrap();
        assert_eq!(AssetMap::find_in(dir.path()).unwrap(), path);
        assert!(dir.path().join(VOLINDEX_FILE_NAME).is_file());
        assert_eq!(AssetMap::read(&path).unwrap(), map);
    }

    #[test]
    fn test_parse_urn_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_urn_uuid(&format!("urn:uuid:{id}")).unwrap(), id);
        assert_eq!(parse_urn_uuid(&id.to_string()).unwrap(), id);
        assert!(parse_urn_uuid("urn:uuid:nope").is_err());
    }
}
