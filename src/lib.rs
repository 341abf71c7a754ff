//! Bloom Library OPDS catalog ingestion.
//!
//! Fetches the catalog feed, normalizes its entries into
//! [`ContentRecord`](feed::ContentRecord)s and builds a channel manifest
//! from them.

pub mod channel;
pub mod config;
pub mod feed;
