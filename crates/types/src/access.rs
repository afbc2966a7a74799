//! Grants and stored-document records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorMode {
    Rgb,
    Cmyk,
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorMode::Rgb => write!(f, "RGB"),
            ColorMode::Cmyk => write!(f, "CMYK"),
        }
    }
}

/// A user's grant against a document. `(document_id, user_id)` is unique in
/// the store. Revocation is a flag; grants are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAccess {
    pub document_id: String,
    pub user_id: String,
    /// Authoritative cap. `None` means not yet backfilled.
    pub print_quota: Option<i64>,
    /// Canonical consumption counter, monotonically >= 0.
    pub prints_used: Option<i64>,
    /// Legacy counter. Read-only: consulted for backfill only, never written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_prints: Option<i64>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_print_at: Option<DateTime<Utc>>,
}

impl DocumentAccess {
    /// Remaining prints as derived for cache seeding:
    /// `max(0, printQuota - max(printsUsed, usedPrints))` with null backfill.
    pub fn derived_remaining(&self) -> i64 {
        let quota = self.print_quota.unwrap_or(0);
        let used = self.prints_used.unwrap_or(0).max(self.used_prints.unwrap_or(0));
        (quota - used).max(0)
    }
}

/// Metadata about a stored artifact. `export_version` increments whenever the
/// materialized export becomes stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub blob_key: String,
    pub mime: String,
    pub color_mode: ColorMode,
    pub export_version: u64,
}
