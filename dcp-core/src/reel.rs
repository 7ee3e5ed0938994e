//! Reel: one segment of a composition

use crate::asset::Asset;
use crate::equality::{EqualityOptions, NoteHandler, NoteType};
use crate::essence::EssenceKind;
use crate::identity::make_uuid;
use crate::xml::Element;
use crate::{Error, Result};
use std::sync::Arc;
use uuid::Uuid;

/// At most one picture, one sound and one subtitle asset, shared by reference
#[derive(Debug, Clone)]
pub struct Reel {
    uuid: Uuid,
    main_picture: Option<Arc<Asset>>,
    main_sound: Option<Arc<Asset>>,
    main_subtitle: Option<Arc<Asset>>,
}

impl Reel {
    /// Creates a reel, checking each asset sits in the slot of its kind
    pub fn new(
        main_picture: Option<Arc<Asset>>,
        main_sound: Option<Arc<Asset>>,
        main_subtitle: Option<Arc<Asset>>,
    ) -> Result<Self> {
        Self::with_uuid(make_uuid(), main_picture, main_sound, main_subtitle)
    }

    /// Like [`new`](Self::new) with a known identity, as when parsing a CPL
    pub fn with_uuid(
        uuid: Uuid,
        main_picture: Option<Arc<Asset>>,
        main_sound: Option<Arc<Asset>>,
        main_subtitle: Option<Arc<Asset>>,
    ) -> Result<Self> {
        check_slot("main picture", &main_picture, EssenceKind::Picture)?;
        check_slot("main sound", &main_sound, EssenceKind::Sound)?;
        check_slot("main subtitle", &main_subtitle, EssenceKind::Subtitle)?;
        Ok(Self {
            uuid,
            main_picture,
            main_sound,
            main_subtitle,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn main_picture(&self) -> Option<&Arc<Asset>> {
        self.main_picture.as_ref()
    }

    pub fn main_sound(&self) -> Option<&Arc<Asset>> {
        self.main_sound.as_ref()
    }

    pub fn main_subtitle(&self) -> Option<&Arc<Asset>> {
        self.main_subtitle.as_ref()
    }

    /// Present assets in picture, sound, subtitle order
    pub fn assets(&self) -> impl Iterator<Item = &Arc<Asset>> {
        self.main_picture
            .iter()
            .chain(self.main_sound.iter())
            .chain(self.main_subtitle.iter())
    }

    /// Emits `<Reel>` into a CPL's `ReelList`
    pub fn write_to_cpl(&self, reel_list: &mut Element) {
        let reel = reel_list.add_child("Reel");
        reel.add_text_child("Id", format!("urn:uuid:{}", self.uuid));
        let asset_list = reel.add_child("AssetList");
        for asset in self.assets() {
            asset.write_to_cpl(asset_list);
        }
    }

    /// Compares slot by slot; a presence mismatch is always an error
    pub fn equals(&self, other: &Reel, opt: &EqualityOptions, note: NoteHandler<'_>) -> bool {
        let slots = [
            ("picture", &self.main_picture, &other.main_picture),
            ("sound", &self.main_sound, &other.main_sound),
            ("subtitle", &self.main_subtitle, &other.main_subtitle),
        ];

        let mut equal = true;
        for (name, a, b) in slots {
            match (a, b) {
                (Some(a), Some(b)) => {
                    if !a.equals(b, opt, note) {
                        equal = false;
                    }
                }
                (None, None) => {}
                (a, _) => {
                    let (has, lacks) = if a.is_some() {
                        ("first", "second")
                    } else {
                        ("second", "first")
                    };
                    note(
                        NoteType::Error,
                        format!("reel has {name} in the {has} DCP but not in the {lacks}"),
                    );
                    equal = false;
                }
            }
        }
        equal
    }
}

fn check_slot(slot: &'static str, asset: &Option<Arc<Asset>>, expected: EssenceKind) -> Result<()> {
    match asset {
        Some(a) if a.kind() != expected => Err(Error::AssetKind {
            slot,
            found: a.kind(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Essence, PictureMode};
    use crate::equality::NoteCollector;
    use crate::types::{Fraction, Size};

    fn picture(duration: u64) -> Arc<Asset> {
        Arc::new(Asset::new(
            Uuid::new_v4(),
            "/nonexistent",
            "video.mxf",
            Essence::Picture {
                mode: PictureMode::Mono,
                size: Size::new(2048, 858),
            },
            Fraction::new(24, 1),
            duration,
            None,
        ))
    }

    fn subtitle() -> Arc<Asset> {
        Arc::new(Asset::new(
            Uuid::new_v4(),
            "/nonexistent",
            "subs.mxf",
            Essence::Subtitle {
                language: Some("en".into()),
            },
            Fraction::new(24, 1),
            100,
            None,
        ))
    }

    fn lenient() -> EqualityOptions {
        EqualityOptions {
            digests_can_differ: true,
            ..EqualityOptions::default()
        }
    }

    #[test]
    fn test_wrong_slot_is_rejected() {
        let err = Reel::new(None, Some(picture(10)), None).unwrap_err();
        assert!(matches!(
            err,
            Error::AssetKind {
                slot: "main sound",
                found: EssenceKind::Picture
            }
        ));
    }

    #[test]
    fn test_shared_asset_is_not_duplicated() {
        let shared = picture(100);
        let a = Reel::new(Some(shared.clone()), None, None).unwrap();
        let b = Reel::new(Some(shared.clone()), None, None).unwrap();
        assert!(Arc::ptr_eq(a.main_picture().unwrap(), b.main_picture().unwrap()));
        assert_eq!(Arc::strong_count(&shared), 3);
        assert_ne!(a.uuid(), b.uuid());
    }

    #[test]
    fn test_presence_mismatch_is_error_regardless_of_options() {
        let pic = picture(100);
        let a = Reel::new(Some(pic.clone()), None, Some(subtitle())).unwrap();
        let b = Reel::new(Some(pic), None, None).unwrap();

        let everything = EqualityOptions {
            cpl_names_can_differ: true,
            mxf_names_can_differ: true,
            digests_can_differ: true,
            key_ids_can_differ: true,
        };
        let mut collector = NoteCollector::new();
        assert!(!a.equals(&b, &everything, &mut collector.sink()));
        assert_eq!(collector.errors().count(), 1);
        assert!(collector.notes[0].message.contains("subtitle"));
    }

    #[test]
    fn test_delegates_to_asset_equality() {
        let a = Reel::new(Some(picture(100)), None, None).unwrap();
        let b = Reel::new(Some(picture(100)), None, None).unwrap();
        let c = Reel::new(Some(picture(90)), None, None).unwrap();
        let mut collector = NoteCollector::new();
        assert!(a.equals(&b, &lenient(), &mut collector.sink()));
        assert!(!a.equals(&c, &lenient(), &mut collector.sink()));
    }

    #[test]
    fn test_write_to_cpl() {
        let reel = Reel::new(Some(picture(100)), None, Some(subtitle())).unwrap();
        let mut list = Element::new("ReelList");
        reel.write_to_cpl(&mut list);
        let node = list.child("Reel").unwrap();
        let assets = node.required_child("AssetList").unwrap();
        let names: Vec<_> = assets.elements().map(|e| e.local_name().to_string()).collect();
        assert_eq!(names, ["MainPicture", "MainSubtitle"]);
    }
}
