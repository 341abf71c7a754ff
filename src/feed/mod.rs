//! Catalog feed fetching and parsing.
//!
//! This module turns the Bloom Library OPDS catalog into content records:
//!
//! - **Fetching**: one parameterized GET against the catalog endpoint
//! - **Parsing**: namespace-aware walk over the Atom entries
//! - **Normalization**: license codes, rights holders, thumbnail URLs
//!
//! # Architecture
//!
//! - [`fetcher`] - HTTP retrieval with timeout and body size limit
//! - [`parser`] - Streaming `quick-xml` parse, per-entry extraction, deduplication
//! - [`normalize`] - Pure field normalization used by the parser
//!
//! # Example
//!
//! ```ignore
//! use bloom_opds::feed::{parse_feed, FeedQuery, OpdsClient};
//!
//! let client = OpdsClient::new(reqwest::Client::new(), DEFAULT_BASE_URL)?;
//! let bytes = client.fetch(&FeedQuery::default()).await?;
//! let records = parse_feed(&bytes)?;
//! ```

mod fetcher;
pub mod normalize;
mod parser;

pub use fetcher::{FeedQuery, FetchError, OpdsClient, DEFAULT_BASE_URL};
pub use parser::{
    parse_feed, parse_feed_with_stats, ContentRecord, ParseError, ParseOutcome, ParseStats,
    ATOM_NS, BLOOM_NS, DCTERMS_NS, OPDS_NS,
};
