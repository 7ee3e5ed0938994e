//! PackingList: digest, size and type of every package member

use crate::asset_map::parse_urn_uuid;
use crate::equality::{NoteHandler, NoteType};
use crate::identity::make_digest;
use crate::metadata::XmlMetadata;
use crate::xml::Element;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// SMPTE PackingList namespace
pub const PKL_NAMESPACE: &str = "http://www.smpte-ra.org/schemas/429-8/2007/PKL";

/// One `Asset` of the PackingList
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingListEntry {
    pub id: Uuid,
    pub annotation_text: String,
    /// Base64 SHA-1 of the file
    pub hash: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingList {
    pub id: Uuid,
    pub annotation_text: String,
    pub issue_date: String,
    pub issuer: String,
    pub creator: String,
    pub assets: Vec<PackingListEntry>,
}

impl PackingList {
    pub fn new(id: Uuid, annotation_text: impl Into<String>, metadata: &XmlMetadata) -> Self {
        Self {
            id,
            annotation_text: annotation_text.into(),
            issue_date: metadata.issue_date.clone(),
            issuer: metadata.issuer.clone(),
            creator: metadata.creator.clone(),
            assets: Vec::new(),
        }
    }

    /// Adds an entry unless one with the same id is already present
    pub fn add(&mut self, entry: PackingListEntry) {
        if !self.assets.iter().any(|a| a.id == entry.id) {
            self.assets.push(entry);
        }
    }

    pub fn entry(&self, id: Uuid) -> Option<&PackingListEntry> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// File name used when writing: `pkl_<uuid>.xml`
    pub fn file_name(&self) -> String {
        format!("pkl_{}.xml", self.id)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_xml(&Element::read_file(path)?)
    }

    pub fn from_xml(root: &Element) -> Result<Self> {
        if root.local_name() != "PackingList" {
            return Err(Error::Xml(format!(
                "expected PackingList, found {}",
                root.local_name()
            )));
        }

        let mut assets = Vec::new();
        for asset in root.required_child("AssetList")?.children_named("Asset") {
            assets.push(PackingListEntry {
                id: parse_urn_uuid(&asset.string_child("Id")?)?,
                annotation_text: asset.optional_string_child("AnnotationText").unwrap_or_default(),
                hash: asset.string_child("Hash")?,
                size: asset.parsed_child("Size")?,
                mime_type: asset.string_child("Type")?,
            });
        }

        Ok(Self {
            id: parse_urn_uuid(&root.string_child("Id")?)?,
            annotation_text: root.optional_string_child("AnnotationText").unwrap_or_default(),
            issue_date: root.optional_string_child("IssueDate").unwrap_or_default(),
            issuer: root.optional_string_child("Issuer").unwrap_or_default(),
            creator: root.optional_string_child("Creator").unwrap_or_default(),
            assets,
        })
    }

    pub fn to_xml(&self) -> Element {
        let mut root = Element::with_namespace("PackingList", PKL_NAMESPACE);
        root.add_text_child("Id", format!("urn:uuid:{}", self.id));
        root.add_text_child("AnnotationText", &self.annotation_text);
        root.add_text_child("IssueDate", &self.issue_date);
        root.add_text_child("Issuer", &self.issuer);
        root.add_text_child("Creator", &self.creator);

        let list = root.add_child("AssetList");
        for entry in &self.assets {
            let asset = list.add_child("Asset");
            asset.add_text_child("Id", format!("urn:uuid:{}", entry.id));
            asset.add_text_child("AnnotationText", &entry.annotation_text);
            asset.add_text_child("Hash", &entry.hash);
            asset.add_text_child("Size", entry.size);
            asset.add_text_child("Type", &entry.mime_type);
        }
        root
    }

    /// Writes `pkl_<uuid>.xml` into `directory`; returns its path
    pub fn write(&self, directory: impl AsRef<Path>) -> Result<PathBuf> {
        let path = directory.as_ref().join(self.file_name());
        self.to_xml().write_to_file(&path)?;
        Ok(path)
    }

    /// Checks every member against its recorded size and digest
    ///
    /// `resolve` maps an entry id to the file on disk (normally through the
    /// AssetMap). Each problem is reported as an ERROR; returns true when all
    /// members check out.
    pub fn verify(
        &self,
        directory: &Path,
        resolve: impl Fn(Uuid) -> Result<String>,
        note: NoteHandler<'_>,
    ) -> bool {
        let mut ok = true;
        for entry in &self.assets {
            let path = match resolve(entry.id) {
                Ok(relative) => directory.join(relative),
                Err(e) => {
                    note(NoteType::Error, format!("{}: {e}", entry.id));
                    ok = false;
                    continue;
                }
            };

            match std::fs::metadata(&path) {
                Ok(m) if m.len() != entry.size => {
                    note(
                        NoteType::Error,
                        format!(
                            "{} has size {} but the packing list says {}",
                            path.display(),
                            m.len(),
                            entry.size
                        ),
                    );
                    ok = false;
                    continue;
                }
                Ok(_) => {}
                Err(_) => {
                    note(NoteType::Error, format!("{} is missing", path.display()));
                    ok = false;
                    continue;
                }
            }

            match make_digest(&path) {
                Ok(digest) if digest == entry.hash => {}
                Ok(digest) => {
                    note(
                        NoteType::Error,
                        format!(
                            "{} has digest {} but the packing list says {}",
                            path.display(),
                            digest,
                            entry.hash
                        ),
                    );
                    ok = false;
                }
                Err(e) => {
                    note(NoteType::Error, e.to_string());
                    ok = false;
                }
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::NoteCollector;

    #[test]
    fn test_xml_roundtrip() {
        let mut pkl = PackingList::new(Uuid::new_v4(), "My Film", &XmlMetadata::default());
        pkl.add(PackingListEntry {
            id: Uuid::new_v4(),
            annotation_text: "video.mxf".into(),
            hash: "2jmj7l5rSw0yVb/vlWAYkK/YBwk=".into(),
            size: 0,
            mime_type: "application/mxf".into(),
        });
        let text = pkl.to_xml().to_document_string().unwrap();
        let parsed = PackingList::from_xml(&Element::parse(&text).unwrap()).unwrap();
        assert_eq!(parsed, pkl);
    }

    #[test]
    fn test_verify_detects_size_and_digest_changes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, b"hello cinema").unwrap();

        let id = Uuid::new_v4();
        let mut pkl = PackingList::new(Uuid::new_v4(), "t", &XmlMetadata::default());
        pkl.add(PackingListEntry {
            id,
            annotation_text: "data.bin".into(),
            hash: make_digest(&file).unwrap(),
            size: 12,
            mime_type: "application/octet-stream".into(),
        });
        let resolve = |_: Uuid| -> Result<String> { Ok("data.bin".to_string()) };

        let mut collector = NoteCollector::new();
        assert!(pkl.verify(dir.path(), resolve, &mut collector.sink()));
        assert!(collector.notes.is_empty());

        // Same size, one byte changed
        std::fs::write(&file, b"hello cinemA").unwrap();
        let mut collector = NoteCollector::new();
        assert!(!pkl.verify(dir.path(), resolve, &mut collector.sink()));
        assert!(collector.notes[0].message.contains("digest"));

        std::fs::write(&file, b"short").unwrap();
        let mut collector = NoteCollector::new();
        assert!(!pkl.verify(dir.path(), resolve, &mut collector.sink()));
        assert!(collector.notes[0].message.contains("size"));

        std::fs::remove_file(&file).unwrap();
        let mut collector = NoteCollector::new();
        assert!(!pkl.verify(dir.path(), resolve, &mut collector.sink()));
        assert!(collector.notes[0].message.contains("missing"));
    }
}
