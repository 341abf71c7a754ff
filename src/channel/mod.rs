//! Channel construction from normalized content records.
//!
//! Each [`ContentRecord`] becomes a [`DocumentNode`] carrying a resolved
//! license and a reference to its BloomPub package. A record that cannot be
//! turned into a node is logged and skipped; the rest of the batch is
//! unaffected.

mod license;

pub use license::{License, LicenseKind, UnknownLicense};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feed::ContentRecord;

/// Why a single record could not become a channel node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("Unknown license: {0}")]
    UnknownLicense(String),
    #[error("Record has no license code")]
    MissingLicense,
    #[error("Record has no title")]
    MissingTitle,
    #[error("Record has no language")]
    MissingLanguage,
}

impl From<UnknownLicense> for NodeError {
    fn from(err: UnknownLicense) -> Self {
        NodeError::UnknownLicense(err.0)
    }
}

/// Channel metadata, configurable under `[channel]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelInfo {
    pub title: String,
    pub source_domain: String,
    pub source_id: String,
    pub language: String,
    pub description: String,
}

impl Default for ChannelInfo {
    fn default() -> Self {
        Self {
            title: "OPDS Bloom Channel".to_string(),
            source_domain: "https://bloomlibrary.org/".to_string(),
            source_id: "OPDS_BLOOM_CHANNEL".to_string(),
            language: "en".to_string(),
            description: "Channel for uploading bloom content to Kolibri from Bloom Library"
                .to_string(),
        }
    }
}

/// Reference to a remote BloomPub package. The file is never downloaded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BloomPubFile {
    pub path: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentNode {
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub license: License,
    pub language: String,
    pub files: Vec<BloomPubFile>,
    pub thumbnail: Option<String>,
}

impl TryFrom<&ContentRecord> for DocumentNode {
    type Error = NodeError;

    fn try_from(record: &ContentRecord) -> Result<Self, Self::Error> {
        let title = record.title.clone().ok_or(NodeError::MissingTitle)?;
        let kind: LicenseKind = record
            .license_code
            .as_deref()
            .ok_or(NodeError::MissingLicense)?
            .parse()?;
        let language = record.language.clone().ok_or(NodeError::MissingLanguage)?;

        Ok(DocumentNode {
            source_id: format!("{}-{}", record.id.as_deref().unwrap_or_default(), title),
            title,
            description: record.description.clone(),
            license: License {
                kind,
                copyright_holder: record.rights_holder.clone(),
            },
            files: vec![BloomPubFile {
                path: record.download_url.clone(),
                language: language.clone(),
            }],
            language,
            thumbnail: record.thumbnail.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    #[serde(flatten)]
    pub info: ChannelInfo,
    pub generated_at: DateTime<Utc>,
    pub nodes: Vec<DocumentNode>,
}

/// Result of [`build_channel`]: the channel plus how many records were dropped.
#[derive(Debug, Clone)]
pub struct ChannelBuild {
    pub channel: Channel,
    pub failed: usize,
}

/// Builds a channel from records, in order.
///
/// Failures are isolated per record: an unknown license or missing field is
/// logged at warn level and the record is skipped.
pub fn build_channel(info: &ChannelInfo, records: &[ContentRecord]) -> ChannelBuild {
    let mut nodes = Vec::with_capacity(records.len());
    let mut failed = 0;

    for record in records {
        match DocumentNode::try_from(record) {
            Ok(node) => nodes.push(node),
            Err(NodeError::UnknownLicense(code)) => {
                failed += 1;
                tracing::warn!(
                    id = ?record.id,
                    license = %code,
                    "Unknown license, skipping record"
                );
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(id = ?record.id, error = %e, "Failed to build channel node");
            }
        }
    }

    tracing::info!(
        channel = %info.source_id,
        nodes = nodes.len(),
        failed = failed,
        "Built channel"
    );

    ChannelBuild {
        channel: Channel {
            info: info.clone(),
            generated_at: Utc::now(),
            nodes,
        },
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: &str, license: Option<&str>) -> ContentRecord {
        ContentRecord {
            id: Some(id.to_string()),
            title: Some(format!("Book {id}")),
            thumbnail: Some(format!("https://img.example/{id}.jpg")),
            download_url: format!("https://books.example/{id}.bloompub"),
            license_code: license.map(str::to_string),
            rights_holder: "Example Org".to_string(),
            language: Some("en".to_string()),
            description: Some("Stories".to_string()),
        }
    }

    #[test]
    fn test_node_from_record() {
        let node = DocumentNode::try_from(&record("abc", Some("CC BY-SA"))).unwrap();
        assert_eq!(
            node,
            DocumentNode {
                source_id: "abc-Book abc".to_string(),
                title: "Book abc".to_string(),
                description: Some("Stories".to_string()),
                license: License {
                    kind: LicenseKind::CcBySa,
                    copyright_holder: "Example Org".to_string(),
                },
                language: "en".to_string(),
                files: vec![BloomPubFile {
                    path: "https://books.example/abc.bloompub".to_string(),
                    language: "en".to_string(),
                }],
                thumbnail: Some("https://img.example/abc.jpg".to_string()),
            }
        );
    }

    #[test]
    fn test_node_errors() {
        assert_eq!(
            DocumentNode::try_from(&record("a", Some("CC "))),
            Err(NodeError::UnknownLicense("CC ".to_string()))
        );
        assert_eq!(
            DocumentNode::try_from(&record("a", None)),
            Err(NodeError::MissingLicense)
        );

        let mut untitled = record("a", Some("CC BY"));
        untitled.title = None;
        assert_eq!(
            DocumentNode::try_from(&untitled),
            Err(NodeError::MissingTitle)
        );

        let mut no_language = record("a", Some("CC BY"));
        no_language.language = None;
        assert_eq!(
            DocumentNode::try_from(&no_language),
            Err(NodeError::MissingLanguage)
        );
    }

    #[test]
    fn test_source_id_without_record_id() {
        let mut anon = record("x", Some("CC BY"));
        anon.id = None;
        let node = DocumentNode::try_from(&anon).unwrap();
        assert_eq!(node.source_id, "-Book x");
    }

    #[test]
    fn test_build_channel_isolates_failures() {
        let records = vec![
            record("one", Some("CC BY")),
            record("two", Some("CC-UNKNOWN")),
            record("three", None),
            record("four", Some("CC BY-NC")),
        ];

        let build = build_channel(&ChannelInfo::default(), &records);
        assert_eq!(build.failed, 2);
        let ids: Vec<_> = build
            .channel
            .nodes
            .iter()
            .map(|n| n.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["one-Book one", "four-Book four"]);
    }

    #[test]
    fn test_channel_serializes_flat_info() {
        let build = build_channel(&ChannelInfo::default(), &[record("a", Some("CC BY"))]);
        let json = serde_json::to_value(&build.channel).unwrap();

        assert_eq!(json["source_id"], "OPDS_BLOOM_CHANNEL");
        assert_eq!(json["title"], "OPDS Bloom Channel");
        assert_eq!(json["nodes"][0]["license"]["kind"], "CC BY");
        assert_eq!(json["nodes"][0]["license"]["copyright_holder"], "Example Org");
        assert!(json["generated_at"].is_string());
    }
}
