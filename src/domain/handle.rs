//! Social handles as typed by users, and the artifact names derived from them.

use std::fmt;

use serde::Serialize;

use super::error::DomainError;

const ARTIFACT_PREFIX: &str = "ritual-card-";
const ARTIFACT_FALLBACK: &str = "card";

/// A normalized social handle: trimmed, without the leading `@`, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Normalize raw user input into a handle.
    ///
    /// Surrounding whitespace and a single leading `@` are removed. An input
    /// that is empty after normalization is rejected.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        let stripped = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
        if stripped.is_empty() {
            return Err(DomainError::EmptyHandle);
        }
        Ok(Self(stripped.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First character, upper-cased, for avatar placeholders.
    pub fn initial(&self) -> String {
        self.0
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_string())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// File name of an exported card, e.g. `ritual-card-alice.png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn for_handle(handle: Option<&Handle>) -> Self {
        let stem: String = handle
            .map(|h| {
                h.as_str()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
                    .collect()
            })
            .unwrap_or_default();
        let stem = stem.trim_matches('.');
        let stem = if stem.is_empty() {
            ARTIFACT_FALLBACK
        } else {
            stem
        };
        Self(format!("{ARTIFACT_PREFIX}{stem}.png"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
