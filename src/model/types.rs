//! Entity structs returned by the facades.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A response document from the remote index, kept as an open JSON tree.
pub type Document = serde_json::Value;

/// Field holding a video's own URI, or a segment's parent video URI.
pub const VIDEO_URI_FIELD: &str = "videoUri";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetKind {
    Video,
    Segment,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Video => "Video",
            AssetKind::Segment => "Segment",
        }
    }
}

/// A URI resolved to either a video or a segment with its parent video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub uri: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub video: Option<Document>,
    /// Always `None` for a video asset.
    pub segment: Option<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub major_version: u32,
    pub minor_version: u32,
    pub revision: u32,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.major_version, self.minor_version, self.revision
        )
    }
}
