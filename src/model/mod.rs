pub mod types;

pub use types::{Asset, AssetKind, Document, VersionInfo};
