//! Report encoding
//!
//! Wraps engine results in a versioned envelope carrying producer metadata,
//! so consumers can tell which build and which instance produced a report.

use crate::error::EngineError;
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report envelope version
pub const REPORT_VERSION: &str = "1.0.0";

/// What a report body contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Streak,
    Analytics,
    Level,
    Badges,
    CheckIn,
    Habit,
    Profile,
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Versioned envelope around a report body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope<T> {
    pub report_version: String,
    pub kind: ReportKind,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub body: T,
}

/// Report encoder
#[derive(Debug, Clone)]
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap `body` in an envelope stamped with the current time
    pub fn encode<T>(&self, kind: ReportKind, body: T) -> ReportEnvelope<T> {
        ReportEnvelope {
            report_version: REPORT_VERSION.to_string(),
            kind,
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            body,
        }
    }

    /// Encode to a pretty JSON string
    pub fn encode_to_json<T: Serialize>(&self, kind: ReportKind, body: &T) -> Result<String, EngineError> {
        let envelope = self.encode(kind, body);
        serde_json::to_string_pretty(&envelope).map_err(EngineError::JsonError)
    }
}
