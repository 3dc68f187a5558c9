//! Client side of the remote index.
//!
//! ## Usage
//!
//! ```ignore
//! use remote_index_cache::remote::{FacadeSettings, HttpTransportConfig, RemoteFacade};
//!
//! let facade = RemoteFacade::over_http(
//!     HttpTransportConfig::new("http://localhost:8080/json-rpc"),
//!     FacadeSettings::default(),
//!     RegexPostprocessor::default(),
//! );
//! let video = facade.lookup_video("/video/123", &Options::new())?;
//! ```

pub mod client;
pub mod facade;
pub mod postprocess;
pub mod protocol;

pub use client::{HttpTransport, HttpTransportConfig};
pub use facade::{Connector, FacadeSettings, RemoteFacade, fix_uri, merge_options};
pub use postprocess::{RegexPostprocessor, RuleSet};
pub use protocol::{Transport, method};
