//! Validation requests
//!
//! A validation request asks the staff to promote one specific version of a
//! content to public. At most one request per content is open (`Pending` or
//! `PendingValidator`) at any time; asking again cancels the previous one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validation request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    /// Waiting for a validator to claim it
    #[serde(rename = "PENDING")]
    Pending,
    /// Claimed by a validator, review in progress
    #[serde(rename = "PENDING_V")]
    PendingValidator,
    /// Terminal: version published
    #[serde(rename = "ACCEPT")]
    Accepted,
    /// Terminal: version refused
    #[serde(rename = "REJECT")]
    Rejected,
    /// Terminal: withdrawn by the author or superseded by a newer request
    #[serde(rename = "CANCEL")]
    Canceled,
}

impl ValidationStatus {
    /// Whether the request still needs someone to act on it
    pub fn is_open(&self) -> bool {
        matches!(self, ValidationStatus::Pending | ValidationStatus::PendingValidator)
    }
}

/// A request to promote a version to public
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Request identifier, unique within one content
    pub id: u64,

    /// Version identifier the request is bound to
    pub version: String,

    pub status: ValidationStatus,

    /// Author's comment to the validators (never empty)
    pub author_comment: String,

    /// External source URL, when the content adapts existing material
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Validator who reserved the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<u64>,

    /// Validator's comment on accept/reject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator_comment: Option<String>,

    /// Whether the accepted publication is a major version
    #[serde(default)]
    pub is_major: bool,

    pub requested_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ValidationRequest {
    /// Open a new pending request
    pub fn new(id: u64, version: impl Into<String>, comment: impl Into<String>, source: Option<String>) -> Self {
        ValidationRequest {
            id,
            version: version.into(),
            status: ValidationStatus::Pending,
            author_comment: comment.into(),
            source,
            validator: None,
            validator_comment: None,
            is_major: false,
            requested_at: Utc::now(),
            resolved_at: None,
        }
    }
}
