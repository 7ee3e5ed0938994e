//! A whole package: CPLs plus the PackingList and AssetMap that index them

use crate::asset_map::{AssetMap, AssetMapEntry, Chunk};
use crate::cpl::{Cpl, EssencePolicy};
use crate::equality::{EqualityOptions, NoteHandler, NoteType};
use crate::essence::EssenceCodec;
use crate::identity::make_uuid;
use crate::metadata::XmlMetadata;
use crate::packing_list::PackingList;
use crate::xml::Element;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// A Digital Cinema Package rooted at one directory
#[derive(Debug, Clone)]
pub struct Dcp {
    directory: PathBuf,
    cpls: Vec<Cpl>,
    packing_list: Option<PackingList>,
    asset_map: Option<AssetMap>,
}

impl Dcp {
    /// An empty package; CPLs added to it should live in `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            cpls: Vec::new(),
            packing_list: None,
            asset_map: None,
        }
    }

    pub fn add_cpl(&mut self, cpl: Cpl) {
        self.cpls.push(cpl);
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn cpls(&self) -> &[Cpl] {
        &self.cpls
    }

    /// The PackingList, once the package has been written or read
    pub fn packing_list(&self) -> Option<&PackingList> {
        self.packing_list.as_ref()
    }

    pub fn asset_map(&self) -> Option<&AssetMap> {
        self.asset_map.as_ref()
    }

    /// Writes every CPL, then the PackingList, then the AssetMap
    ///
    /// Assets shared between CPLs appear once in each manifest. Returns the
    /// path of the AssetMap.
    #[tracing::instrument(skip(self, metadata), fields(directory = %self.directory.display()))]
    pub fn write_xml(&mut self, metadata: &XmlMetadata) -> Result<PathBuf> {
        for cpl in &mut self.cpls {
            cpl.write_xml(metadata)?;
        }

        let annotation = self
            .cpls
            .first()
            .map(|c| c.name().to_string())
            .unwrap_or_default();
        let mut pkl = PackingList::new(make_uuid(), annotation, metadata);
        for cpl in &self.cpls {
            for asset in cpl.assets() {
                asset.write_to_pkl(&mut pkl)?;
            }
            cpl.write_to_pkl(&mut pkl)?;
        }
        let pkl_path = pkl.write(&self.directory)?;
        let pkl_size = std::fs::metadata(&pkl_path)
            .map_err(|e| Error::file("could not stat packing list", &pkl_path, e))?
            .len();

        let mut asset_map = AssetMap::new(make_uuid(), metadata);
        asset_map.add(AssetMapEntry {
            id: pkl.id,
            packing_list: true,
            chunks: vec![Chunk::whole_file(pkl.file_name(), pkl_size)],
        });
        for cpl in &self.cpls {
            cpl.write_to_assetmap(&mut asset_map)?;
            for asset in cpl.assets() {
                asset.write_to_assetmap(&mut asset_map)?;
            }
        }
        let path = asset_map.write(&self.directory)?;

        tracing::info!(
            cpls = self.cpls.len(),
            assets = asset_map.assets.len(),
            "wrote package"
        );
        self.packing_list = Some(pkl);
        self.asset_map = Some(asset_map);
        Ok(path)
    }

    /// Reads the package in `directory`, starting from its AssetMap
    ///
    /// XML members are classified by their root element; anything else in the
    /// AssetMap is essence, opened only when a CPL refers to it.
    #[tracing::instrument(skip_all, fields(directory = %directory.as_ref().display()))]
    pub fn read(
        directory: impl AsRef<Path>,
        codec: &dyn EssenceCodec,
        policy: EssencePolicy,
    ) -> Result<Self> {
        let directory = directory.as_ref();
        let asset_map = AssetMap::read(AssetMap::find_in(directory)?)?;

        let mut packing_list = None;
        let mut cpl_paths = Vec::new();
        for entry in &asset_map.assets {
            let relative = entry.path()?;
            if !entry.packing_list && !relative.to_ascii_lowercase().ends_with(".xml") {
                continue;
            }
            let path = directory.join(relative);
            let root = Element::read_file(&path)?;
            match root.local_name() {
                "CompositionPlaylist" => cpl_paths.push(path),
                "PackingList" => {
                    if packing_list.is_some() {
                        tracing::warn!("ignoring extra packing list {}", path.display());
                    } else {
                        packing_list = Some(PackingList::from_xml(&root)?);
                    }
                }
                other => tracing::debug!("skipping {} ({})", path.display(), other),
            }
        }

        let mut cpls = Vec::with_capacity(cpl_paths.len());
        for path in cpl_paths {
            cpls.push(Cpl::read(&path, &asset_map, codec, policy)?);
        }
        tracing::debug!(cpls = cpls.len(), "read package");

        Ok(Self {
            directory: directory.to_path_buf(),
            cpls,
            packing_list,
            asset_map: Some(asset_map),
        })
    }

    /// Compares CPL counts, then each CPL pair in order
    pub fn equals(&self, other: &Dcp, opt: &EqualityOptions, note: NoteHandler<'_>) -> bool {
        if self.cpls.len() != other.cpls.len() {
            note(
                NoteType::Error,
                format!(
                    "CPL counts differ ({} vs {})",
                    self.cpls.len(),
                    other.cpls.len()
                ),
            );
            return false;
        }

        let mut equal = true;
        for (a, b) in self.cpls.iter().zip(&other.cpls) {
            if !a.equals(b, opt, note) {
                equal = false;
            }
        }
        equal
    }

    /// Re-digests every PackingList member, reporting problems as ERRORs
    ///
    /// Fails with a state error when the package has neither been written
    /// nor read, since there is no PackingList to check against.
    pub fn verify(&self, note: NoteHandler<'_>) -> Result<bool> {
        let (Some(pkl), Some(asset_map)) = (&self.packing_list, &self.asset_map) else {
            return Err(Error::State(
                "package has no packing list to verify against".into(),
            ));
        };
        let resolve = |id| {
            asset_map
                .asset_from_id(id)
                .and_then(|entry| entry.path().map(str::to_string))
        };
        Ok(pkl.verify(&self.directory, resolve, note))
    }
}
