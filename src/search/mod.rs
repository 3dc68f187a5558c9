//! Query layer.
//!
//! - **[`query`]**: Structured query records, validation, and the encoded
//!   form sent to the remote index (including cache keys).
//! - **[`encoder`]**: Translation into the remote index mini-language.

pub mod encoder;
pub mod query;

pub use encoder::{QueryEncoder, encode_query};
pub use query::{EncodedQuery, Options, QueryData, StructuredQuery};
