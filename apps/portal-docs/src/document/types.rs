//! Core document record types
//!
//! One record shape is shared by the newsletter, brochure and regulation
//! collections. The collection decides which fields are meaningful and how
//! the record gets its rendered content.

use std::fmt;
use std::str::FromStr;

use std::cmp::Reverse;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::error::{DocumentError, Result};

// ============================================================================
// Collections
// ============================================================================

/// An independently keyed group of records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Newsletters,
    Brochures,
    Regulations,
}

impl Collection {
    /// Every collection, in the order they were introduced to the store
    pub const ALL: [Collection; 3] = [
        Collection::Newsletters,
        Collection::Brochures,
        Collection::Regulations,
    ];

    /// Table name in the cache store
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Newsletters => "newsletters",
            Collection::Brochures => "brochures",
            Collection::Regulations => "regulations",
        }
    }

    /// Schema version that introduced this collection
    pub fn introduced_in(self) -> u32 {
        match self {
            Collection::Newsletters => 1,
            Collection::Brochures => 2,
            Collection::Regulations => 3,
        }
    }

    /// Kind of identifier records in this collection carry
    pub fn id_kind(self) -> IdKind {
        match self {
            Collection::Newsletters | Collection::Brochures => IdKind::Numeric,
            Collection::Regulations => IdKind::Text,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for Collection {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "newsletters" | "newsletter" => Ok(Collection::Newsletters),
            "brochures" | "brochure" => Ok(Collection::Brochures),
            "regulations" | "regulation" => Ok(Collection::Regulations),
            other => Err(DocumentError::UnknownCollection(other.to_string())),
        }
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier shape expected by a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Numeric,
    Text,
}

/// Record identifier
///
/// Numeric for newsletters and brochures (creation timestamp or a small seed
/// value for built-in entries), text for regulations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Numeric(i64),
    Text(String),
}

impl RecordId {
    /// Canonical key used by the store
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn kind(&self) -> IdKind {
        match self {
            RecordId::Numeric(_) => IdKind::Numeric,
            RecordId::Text(_) => IdKind::Text,
        }
    }

    /// Parse an id from a path segment for the given collection
    pub fn parse_for(collection: Collection, raw: &str) -> Result<Self> {
        match collection.id_kind() {
            IdKind::Numeric => raw
                .parse::<i64>()
                .map(RecordId::Numeric)
                .map_err(|_| DocumentError::InvalidId(raw.to_string())),
            IdKind::Text if raw.trim().is_empty() => {
                Err(DocumentError::InvalidId(raw.to_string()))
            }
            IdKind::Text => Ok(RecordId::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Numeric(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Numeric(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

// ============================================================================
// Records
// ============================================================================

/// One document's metadata and rendered content
///
/// Serialized with the date under `lastUpdated` for text-keyed records
/// (regulations) and under `date` otherwise. Both names are accepted on
/// input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: RecordId,
    pub title: String,
    /// ISO date used for descending display order
    #[serde(alias = "lastUpdated")]
    pub date: String,
    /// Inline-encoded thumbnail of page 1, empty until generated
    #[serde(default)]
    pub cover: String,
    /// Inline-encoded page images, empty until rasterized
    #[serde(default)]
    pub pages: Vec<String>,
    /// Static/remote file to rasterize lazily
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    /// Already-encoded document blob from an upload
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordRepr<'a> {
    id: &'a RecordId,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<&'a str>,
    cover: &'a str,
    #[serde(skip_serializing_if = "no_pages")]
    pages: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pdf_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<&'a str>,
    is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keywords: Option<&'a [String]>,
}

fn no_pages(pages: &&[String]) -> bool {
    pages.is_empty()
}

impl Serialize for DocumentRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let (date, last_updated) = match self.id {
            RecordId::Text(_) => (None, Some(self.date.as_str())),
            RecordId::Numeric(_) => (Some(self.date.as_str()), None),
        };
        RecordRepr {
            id: &self.id,
            title: &self.title,
            date,
            last_updated,
            cover: &self.cover,
            pages: &self.pages,
            pdf_path: self.pdf_path.as_deref(),
            file_url: self.file_url.as_deref(),
            file_data: self.file_data.as_deref(),
            is_new: self.is_new,
            description: self.description.as_deref(),
            doc_type: self.doc_type.as_deref(),
            keywords: self.keywords.as_deref(),
        }
        .serialize(serializer)
    }
}

impl DocumentRecord {
    /// Create a bare record with no content
    pub fn new(id: RecordId, title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            date: date.into(),
            cover: String::new(),
            pages: Vec::new(),
            pdf_path: None,
            file_url: None,
            file_data: None,
            is_new: false,
            description: None,
            doc_type: None,
            keywords: None,
        }
    }

    /// Record keyed by a numeric id (newsletters, brochures)
    pub fn numeric(id: i64, title: impl Into<String>, date: impl Into<String>) -> Self {
        Self::new(RecordId::Numeric(id), title, date)
    }

    /// Record keyed by a text id (regulations)
    pub fn text(id: &str, title: impl Into<String>, date: impl Into<String>) -> Self {
        Self::new(RecordId::Text(id.to_string()), title, date)
    }

    pub fn with_pdf_path(mut self, path: impl Into<String>) -> Self {
        self.pdf_path = Some(path.into());
        self
    }

    pub fn with_file_url(mut self, url: impl Into<String>) -> Self {
        self.file_url = Some(url.into());
        self
    }

    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        self.cover = pages.first().cloned().unwrap_or_default();
        self.pages = pages;
        self
    }

    /// Source to rasterize from: `pdfPath`, then `fileData`, then `fileUrl`
    pub fn source(&self) -> Option<&str> {
        [&self.pdf_path, &self.file_data, &self.file_url]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .find(|s| !s.trim().is_empty())
    }

    /// Processing state under the given ingestion mode
    pub fn state(&self, mode: IngestionMode) -> ProcessingState {
        let has_source = self.source().is_some();
        let needs_work = match mode {
            IngestionMode::Pages => self.pages.is_empty(),
            IngestionMode::Cover => self.cover.is_empty(),
            IngestionMode::None => false,
        };

        if has_source && needs_work {
            ProcessingState::Unprocessed
        } else {
            ProcessingState::Ready
        }
    }

    /// Case-sensitive substring match against any of the given patterns
    pub fn title_matches_any<S: AsRef<str>>(&self, patterns: &[S]) -> bool {
        patterns
            .iter()
            .map(AsRef::as_ref)
            .any(|p| !p.is_empty() && self.title.contains(p))
    }

    /// Validate a decoded record before it is allowed into a collection
    pub fn validate(&self, collection: Collection) -> Result<()> {
        if self.id.kind() != collection.id_kind() {
            return Err(DocumentError::InvalidRecord {
                id: self.id.key(),
                reason: format!("id kind does not match collection {}", collection),
            });
        }
        if self.title.trim().is_empty() {
            return Err(DocumentError::InvalidRecord {
                id: self.id.key(),
                reason: "title is empty".to_string(),
            });
        }
        if !is_iso_date(&self.date) {
            return Err(DocumentError::InvalidRecord {
                id: self.id.key(),
                reason: format!("date '{}' is not ISO formatted", self.date),
            });
        }
        if !self.pages.is_empty() && self.cover.is_empty() {
            return Err(DocumentError::InvalidRecord {
                id: self.id.key(),
                reason: "pages present without a cover".to_string(),
            });
        }
        Ok(())
    }

    /// Decode untrusted JSON into validated records for a collection
    pub fn decode_list(collection: Collection, json: &str) -> Result<Vec<DocumentRecord>> {
        let records: Vec<DocumentRecord> = serde_json::from_str(json)?;
        for record in &records {
            record.validate(collection)?;
        }
        Ok(records)
    }

    /// Decode and validate a single untrusted JSON value
    pub fn decode_value(collection: Collection, value: serde_json::Value) -> Result<DocumentRecord> {
        let record: DocumentRecord = serde_json::from_value(value)?;
        record.validate(collection)?;
        Ok(record)
    }
}

fn is_iso_date(value: &str) -> bool {
    parse_instant(value).is_some()
}

/// Instant a date string denotes; a bare date is midnight UTC
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|midnight| Utc.from_utc_datetime(&midnight));
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Sort records for display: newest instant first, stable for ties.
/// Records with an unparseable date go last.
pub fn sort_for_display(records: &mut [DocumentRecord]) {
    records.sort_by_cached_key(|record| Reverse(parse_instant(&record.date)));
}

// ============================================================================
// Processing
// ============================================================================

/// How a collection obtains rendered content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionMode {
    /// Rasterize every page; cover is page 1
    Pages,
    /// Render only a cover thumbnail
    Cover,
    /// Never rasterized
    None,
}

/// Per-record ingestion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Unprocessed,
    Ready,
}
