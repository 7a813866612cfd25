//! Collection manifests and policies
//!
//! A manifest is the fixed list of documents a collection must always
//! contain. Together with the deprecation list and the ingestion mode it
//! forms the collection's policy, which the coordinator applies on every
//! reconcile pass.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::document::{Collection, DocumentError, DocumentRecord, IngestionMode};

/// Errors loading a manifest file
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed manifest file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid manifest entry: {0}")]
    Invalid(#[from] DocumentError),
}

/// What a collection must contain and how its records get rendered
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPolicy {
    /// Documents reinserted whenever missing
    pub manifest: Vec<DocumentRecord>,
    /// Records whose title contains any of these are removed
    pub deprecated_titles: Vec<String>,
    pub mode: IngestionMode,
}

impl CollectionPolicy {
    /// Empty policy with the collection's natural ingestion mode
    pub fn empty(collection: Collection) -> Self {
        Self {
            manifest: Vec::new(),
            deprecated_titles: Vec::new(),
            mode: default_mode(collection),
        }
    }
}

/// Ingestion mode used when a policy does not name one
pub fn default_mode(collection: Collection) -> IngestionMode {
    match collection {
        Collection::Newsletters => IngestionMode::Pages,
        Collection::Brochures => IngestionMode::Cover,
        Collection::Regulations => IngestionMode::None,
    }
}

/// Policies shipped with the portal
pub fn builtin_policies() -> BTreeMap<Collection, CollectionPolicy> {
    let newsletters = CollectionPolicy {
        manifest: vec![
            DocumentRecord::numeric(13, "2022 사내보", "2022-12-31")
                .with_pdf_path("/pdfs/newsletter-2022.pdf"),
            DocumentRecord::numeric(14, "2023 사내보", "2023-12-31")
                .with_pdf_path("/pdfs/newsletter-2023.pdf"),
            DocumentRecord {
                is_new: true,
                ..DocumentRecord::numeric(15, "2024 사내보", "2024-12-31")
                    .with_pdf_path("/pdfs/newsletter-2024.pdf")
            },
        ],
        deprecated_titles: vec!["신년사".to_string()],
        mode: IngestionMode::Pages,
    };

    let brochures = CollectionPolicy {
        manifest: vec![DocumentRecord {
            description: Some("회사 소개 브로슈어".to_string()),
            ..DocumentRecord::numeric(1, "회사 소개서", "2024-01-15")
                .with_pdf_path("/pdfs/company-brochure.pdf")
        }],
        deprecated_titles: Vec::new(),
        mode: IngestionMode::Cover,
    };

    let regulations = CollectionPolicy {
        manifest: vec![
            DocumentRecord {
                doc_type: Some("규정".to_string()),
                keywords: Some(vec!["근무".to_string(), "휴가".to_string()]),
                ..DocumentRecord::text("reg-employment", "취업규칙", "2024-03-01")
                    .with_file_url("/pdfs/regulations/employment-rules.pdf")
            },
            DocumentRecord {
                doc_type: Some("지침".to_string()),
                keywords: Some(vec!["보안".to_string()]),
                ..DocumentRecord::text("reg-security", "정보보안 지침", "2023-11-20")
                    .with_file_url("/pdfs/regulations/security-guideline.pdf")
            },
        ],
        deprecated_titles: Vec::new(),
        mode: IngestionMode::None,
    };

    BTreeMap::from([
        (Collection::Newsletters, newsletters),
        (Collection::Brochures, brochures),
        (Collection::Regulations, regulations),
    ])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyFile {
    #[serde(default)]
    mode: Option<IngestionMode>,
    #[serde(default)]
    deprecated_titles: Vec<String>,
    #[serde(default)]
    documents: serde_json::Value,
}

/// Decode a manifest document
///
/// Top-level keys are collection names; every listed document is validated
/// against its collection before it is accepted.
///
/// ```json
/// { "newsletters": { "mode": "pages", "deprecatedTitles": ["신년사"], "documents": [] } }
/// ```
pub fn parse_policies(json: &str) -> Result<BTreeMap<Collection, CollectionPolicy>, ManifestError> {
    let raw: BTreeMap<String, PolicyFile> = serde_json::from_str(json)?;
    let mut policies = BTreeMap::new();

    for (name, file) in raw {
        let collection: Collection = name.parse()?;
        let documents = match file.documents {
            serde_json::Value::Null => Vec::new(),
            value => DocumentRecord::decode_list(collection, &value.to_string())?,
        };

        policies.insert(
            collection,
            CollectionPolicy {
                manifest: documents,
                deprecated_titles: file.deprecated_titles,
                mode: file.mode.unwrap_or_else(|| default_mode(collection)),
            },
        );
    }

    Ok(policies)
}

/// Read and decode a manifest file
pub async fn load_policies(
    path: impl AsRef<Path>,
) -> Result<BTreeMap<Collection, CollectionPolicy>, ManifestError> {
    let json = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_policies(&json)
}
