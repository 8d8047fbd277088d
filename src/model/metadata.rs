//! EntityMetadata: the fixed set of descriptive fields supplied at registration.

use serde::{Deserialize, Serialize};

use super::EntityKind;
use crate::{Error, Result};

/// Latest metadata layout understood by this crate.
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Registration metadata.
///
/// Unknown fields are rejected on deserialization; every optional field
/// that is present must be non-blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

fn default_schema_version() -> u32 {
    METADATA_SCHEMA_VERSION
}

impl EntityMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION,
            name: name.into(),
            kind: EntityKind::default(),
            description: None,
            author: None,
            license: None,
            source_url: None,
        }
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Parse metadata from a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let meta: EntityMetadata = serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("unreadable metadata: {e}")))?;
        meta.validate()?;
        Ok(meta)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version == 0 || self.schema_version > METADATA_SCHEMA_VERSION {
            return Err(Error::Validation(format!(
                "unsupported metadata schema version {} (latest is {METADATA_SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Validation("metadata field 'name' is required".into()));
        }
        let optional = [
            ("description", &self.description),
            ("author", &self.author),
            ("license", &self.license),
            ("source_url", &self.source_url),
        ];
        for (field, value) in optional {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(Error::Validation(format!("metadata field '{field}' is present but blank")));
            }
        }
        if let Some(url) = &self.source_url {
            if !url.contains("://") {
                return Err(Error::Validation(format!("metadata field 'source_url' is not a URL: {url}")));
            }
        }
        Ok(())
    }
}
