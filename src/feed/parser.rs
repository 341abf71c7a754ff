use quick_xml::encoding::Decoder;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

use super::normalize;

/// Atom syndication namespace.
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
/// Dublin Core terms namespace (rights, license, language, subject).
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
/// Bloom Library vendor namespace.
pub const BLOOM_NS: &str = "https://bloomlibrary.org/opds";
/// OPDS catalog namespace.
pub const OPDS_NS: &str = "http://opds-spec.org/2010/catalog";

/// `rel` of the link pointing at an entry's cover image.
const IMAGE_REL: &str = "http://opds-spec.org/image";
/// `type` of the link pointing at the downloadable book package.
const BLOOMPUB_TYPE: &str = "application/bloompub+zip";

/// Errors that abort a whole parse. No partial results are returned.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed XML attribute: {0}")]
    Attribute(#[from] AttrError),

    /// Input ended while elements were still open.
    #[error("Unexpected end of document: {0} element(s) left open")]
    UnexpectedEof(usize),

    #[error("Document has no root element")]
    NoRootElement,

    /// A second element started after the root element closed.
    #[error("Element found after the document element")]
    TrailingElement,

    #[error("Text found outside the document element")]
    TextOutsideRoot,
}

/// One publication extracted from the catalog, normalized and ready for the
/// channel builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRecord {
    /// `atom:id` of the entry. Also the deduplication key.
    pub id: Option<String>,
    pub title: Option<String>,
    /// Cover image URL without its query string.
    pub thumbnail: Option<String>,
    /// URL of the `application/bloompub+zip` package.
    pub download_url: String,
    /// License code reformatted to `CC BY-SA` style.
    pub license_code: Option<String>,
    pub rights_holder: String,
    pub language: Option<String>,
    /// Sourced from `dcterms:subject`.
    pub description: Option<String>,
}

/// Per-parse counters, logged at debug level and returned to callers that
/// want them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Entry elements encountered.
    pub entries: usize,
    /// Records emitted.
    pub emitted: usize,
    /// Entries without a bloompub download link.
    pub missing_download: usize,
    /// Entries whose rights string has no holder segment.
    pub missing_rights_holder: usize,
    /// Entries whose id was already emitted.
    pub duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub records: Vec<ContentRecord>,
    pub stats: ParseStats,
}

/// Parses an OPDS feed into deduplicated content records, in document order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ContentRecord>, ParseError> {
    parse_feed_with_stats(bytes).map(|outcome| outcome.records)
}

/// Like [`parse_feed`], also returning skip counters.
///
/// # Errors
///
/// Any XML well-formedness problem (syntax errors, mismatched or unclosed
/// tags, malformed attributes, unknown entities, empty input, content outside
/// the root element) is returned as a [`ParseError`] and no records are
/// produced.
///
/// Entries are collected at any depth, including inside other entries, and
/// are deduplicated in start-tag order.
///
/// # Security
///
/// Entity declarations in a DOCTYPE are never expanded; references to them
/// fail with [`ParseError::Xml`].
pub fn parse_feed_with_stats(bytes: &[u8]) -> Result<ParseOutcome, ParseError> {
    let mut reader = NsReader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut saw_root = false;
    let mut root_closed = false;
    // Innermost entry last
    let mut open: Vec<OpenEntry> = Vec::new();
    // Entry fields indexed by start-tag order, filled in as entries close
    let mut finished: Vec<Option<EntryFields>> = Vec::new();

    loop {
        let (ns, event) = {
            let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
            (Ns::classify(&resolved), event)
        };
        let decoder = reader.decoder();

        match event {
            Event::Start(e) => {
                if root_closed {
                    return Err(ParseError::TrailingElement);
                }
                depth += 1;
                saw_root = true;
                for entry in open.iter_mut() {
                    entry.start_child(ns, &e, depth, decoder)?;
                }
                if is_entry(ns, &e) {
                    open.push(OpenEntry::new(depth, finished.len()));
                    finished.push(None);
                }
            }
            Event::Empty(e) => {
                if root_closed {
                    return Err(ParseError::TrailingElement);
                }
                saw_root = true;
                root_closed = depth == 0;
                for entry in open.iter_mut() {
                    entry.empty_child(ns, &e, depth + 1, decoder)?;
                }
                if is_entry(ns, &e) {
                    finished.push(Some(EntryFields::default()));
                }
            }
            Event::Text(t) => {
                if depth == 0 {
                    if !t.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
                        return Err(ParseError::TextOutsideRoot);
                    }
                } else {
                    let text = t.unescape()?;
                    for entry in open.iter_mut() {
                        entry.text(&text, depth);
                    }
                }
            }
            Event::CData(c) => {
                if depth == 0 {
                    return Err(ParseError::TextOutsideRoot);
                }
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                for entry in open.iter_mut() {
                    entry.text(&text, depth);
                }
            }
            Event::End(_) => {
                for entry in open.iter_mut() {
                    entry.end_child(depth);
                }
                if open.last().is_some_and(|entry| entry.depth == depth) {
                    if let Some(entry) = open.pop() {
                        if let Some(slot) = finished.get_mut(entry.order) {
                            *slot = Some(entry.fields);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
                root_closed = depth == 0;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth > 0 {
        return Err(ParseError::UnexpectedEof(depth));
    }
    if !saw_root {
        return Err(ParseError::NoRootElement);
    }

    let mut records = Vec::new();
    let mut seen: HashSet<Option<String>> = HashSet::new();
    let mut stats = ParseStats::default();
    for fields in finished.into_iter().flatten() {
        finish_entry(fields, &mut records, &mut seen, &mut stats);
    }

    stats.emitted = records.len();
    tracing::debug!(
        entries = stats.entries,
        emitted = stats.emitted,
        missing_download = stats.missing_download,
        missing_rights_holder = stats.missing_rights_holder,
        duplicates = stats.duplicates,
        "Parsed OPDS feed"
    );

    Ok(ParseOutcome { records, stats })
}

fn is_entry(ns: Ns, e: &BytesStart<'_>) -> bool {
    ns == Ns::Atom && e.local_name().as_ref() == b"entry"
}

fn finish_entry(
    fields: EntryFields,
    records: &mut Vec<ContentRecord>,
    seen: &mut HashSet<Option<String>>,
    stats: &mut ParseStats,
) {
    stats.entries += 1;
    match fields.into_record() {
        Ok(record) => {
            if seen.insert(record.id.clone()) {
                records.push(record);
            } else {
                tracing::debug!(id = ?record.id, "Skipping duplicate entry");
                stats.duplicates += 1;
            }
        }
        Err(EntrySkip::NoDownloadLink { id }) => {
            tracing::debug!(id = ?id, "Skipping entry without bloompub link");
            stats.missing_download += 1;
        }
        Err(EntrySkip::NoRightsHolder { id }) => {
            tracing::debug!(id = ?id, "Skipping entry without rights holder");
            stats.missing_rights_holder += 1;
        }
    }
}

/// Namespaces the catalog uses. Elements are matched on resolved URI, so the
/// prefix a feed chooses is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Atom,
    DcTerms,
    Other,
}

impl Ns {
    fn classify(resolved: &ResolveResult<'_>) -> Self {
        let ResolveResult::Bound(ns) = resolved else {
            return Ns::Other;
        };
        let uri = ns.as_ref();
        if uri == ATOM_NS.as_bytes() {
            Ns::Atom
        } else if uri == DCTERMS_NS.as_bytes() {
            Ns::DcTerms
        } else {
            Ns::Other
        }
    }
}

/// Direct children of an entry whose text we keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Id,
    Title,
    Rights,
    License,
    Language,
    Subject,
}

impl TextField {
    fn lookup(ns: Ns, local: &[u8]) -> Option<Self> {
        match (ns, local) {
            (Ns::Atom, b"id") => Some(TextField::Id),
            (Ns::Atom, b"title") => Some(TextField::Title),
            (Ns::DcTerms, b"rights") => Some(TextField::Rights),
            (Ns::DcTerms, b"license") => Some(TextField::License),
            (Ns::DcTerms, b"language") => Some(TextField::Language),
            (Ns::DcTerms, b"subject") => Some(TextField::Subject),
            _ => None,
        }
    }
}

/// Holds the value of the first matching element only. A matching element
/// without a value still claims the slot, so a later sibling cannot replace it.
#[derive(Debug, Default)]
struct FirstMatch(Option<Option<String>>);

impl FirstMatch {
    fn is_claimed(&self) -> bool {
        self.0.is_some()
    }

    fn claim(&mut self, value: Option<String>) {
        if self.0.is_none() {
            self.0 = Some(value);
        }
    }

    fn into_value(self) -> Option<String> {
        self.0.flatten()
    }
}

#[derive(Debug, Default)]
struct EntryFields {
    id: FirstMatch,
    title: FirstMatch,
    rights: FirstMatch,
    license: FirstMatch,
    language: FirstMatch,
    subject: FirstMatch,
    thumbnail: FirstMatch,
    download: FirstMatch,
}

enum EntrySkip {
    NoDownloadLink { id: Option<String> },
    NoRightsHolder { id: Option<String> },
}

impl EntryFields {
    fn slot(&mut self, field: TextField) -> &mut FirstMatch {
        match field {
            TextField::Id => &mut self.id,
            TextField::Title => &mut self.title,
            TextField::Rights => &mut self.rights,
            TextField::License => &mut self.license,
            TextField::Language => &mut self.language,
            TextField::Subject => &mut self.subject,
        }
    }

    fn link(&mut self, link: Link) {
        if link.rel.as_deref() == Some(IMAGE_REL) {
            self.thumbnail.claim(link.href.clone());
        }
        if link.media_type.as_deref() == Some(BLOOMPUB_TYPE) {
            self.download.claim(link.href);
        }
    }

    fn into_record(self) -> Result<ContentRecord, EntrySkip> {
        let id = self.id.into_value();

        let download_url = match self.download.into_value() {
            Some(url) if !url.is_empty() => url,
            _ => return Err(EntrySkip::NoDownloadLink { id }),
        };

        let Some(rights_holder) = normalize::rights_holder(self.rights.into_value().as_deref())
        else {
            return Err(EntrySkip::NoRightsHolder { id });
        };

        Ok(ContentRecord {
            id,
            title: self.title.into_value(),
            thumbnail: normalize::thumbnail(self.thumbnail.into_value()),
            download_url,
            license_code: normalize::license_code(self.license.into_value()),
            rights_holder,
            language: self.language.into_value(),
            description: self.subject.into_value(),
        })
    }
}

struct Link {
    rel: Option<String>,
    media_type: Option<String>,
    href: Option<String>,
}

impl Link {
    fn read(e: &BytesStart<'_>, decoder: Decoder) -> Result<Self, ParseError> {
        let mut link = Link {
            rel: None,
            media_type: None,
            href: None,
        };
        for attr in e.attributes() {
            let attr = attr?;
            let target = match attr.key.as_ref() {
                b"rel" => &mut link.rel,
                b"type" => &mut link.media_type,
                b"href" => &mut link.href,
                _ => continue,
            };
            *target = Some(attr.decode_and_unescape_value(decoder)?.into_owned());
        }
        Ok(link)
    }
}

/// Text being collected for a direct child of the entry. Only text before
/// the element's first child counts.
struct Capture {
    field: TextField,
    depth: usize,
    text: String,
    closed: bool,
}

/// An entry whose end tag has not been seen yet. Entries may nest, so every
/// open entry sees every event and decides by depth what belongs to it.
struct OpenEntry {
    depth: usize,
    /// Position among all entries in start-tag order.
    order: usize,
    fields: EntryFields,
    capture: Option<Capture>,
}

impl OpenEntry {
    fn new(depth: usize, order: usize) -> Self {
        Self {
            depth,
            order,
            fields: EntryFields::default(),
            capture: None,
        }
    }

    fn start_child(
        &mut self,
        ns: Ns,
        e: &BytesStart<'_>,
        depth: usize,
        decoder: Decoder,
    ) -> Result<(), ParseError> {
        if let Some(capture) = self.capture.as_mut() {
            capture.closed = true;
        } else if depth == self.depth + 1 {
            if let Some(field) = TextField::lookup(ns, e.local_name().as_ref()) {
                if !self.fields.slot(field).is_claimed() {
                    self.capture = Some(Capture {
                        field,
                        depth,
                        text: String::new(),
                        closed: false,
                    });
                }
            }
        }

        if ns == Ns::Atom && e.local_name().as_ref() == b"link" {
            self.fields.link(Link::read(e, decoder)?);
        }
        Ok(())
    }

    fn empty_child(
        &mut self,
        ns: Ns,
        e: &BytesStart<'_>,
        depth: usize,
        decoder: Decoder,
    ) -> Result<(), ParseError> {
        if let Some(capture) = self.capture.as_mut() {
            capture.closed = true;
        } else if depth == self.depth + 1 {
            if let Some(field) = TextField::lookup(ns, e.local_name().as_ref()) {
                self.fields.slot(field).claim(None);
            }
        }

        if ns == Ns::Atom && e.local_name().as_ref() == b"link" {
            self.fields.link(Link::read(e, decoder)?);
        }
        Ok(())
    }

    fn text(&mut self, text: &str, depth: usize) {
        if let Some(capture) = self.capture.as_mut() {
            if !capture.closed && capture.depth == depth {
                capture.text.push_str(text);
            }
        }
    }

    fn end_child(&mut self, depth: usize) {
        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                let value = (!capture.text.is_empty()).then_some(capture.text);
                self.fields.slot(capture.field).claim(value);
            }
        }
    }
}
