//! Document-level metadata written into CPL, PackingList and AssetMap

use chrono::{DateTime, Local};

/// Issuer/creator/issue-date triple stamped onto every XML document
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct XmlMetadata {
    pub issuer: String,
    pub creator: String,
    /// xs:dateTime, e.g. `2013-01-01T12:00:00+00:00`
    pub issue_date: String,
}

impl XmlMetadata {
    /// Metadata stamped with the current local time
    pub fn now(issuer: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            creator: creator.into(),
            issue_date: format_issue_date(&Local::now()),
        }
    }
}

impl Default for XmlMetadata {
    fn default() -> Self {
        let creator = format!("dcp {}", env!("CARGO_PKG_VERSION"));
        Self::now(creator.clone(), creator)
    }
}

/// Formats a timestamp as an xs:dateTime with a numeric UTC offset
pub fn format_issue_date(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
