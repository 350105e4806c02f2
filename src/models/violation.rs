// src/models/violation.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Signal as reported by the client-side monitor, before classification.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RawProctorSignal {
    /// Client-assigned, increasing per attempt. Used as idempotency key.
    pub sequence_number: u64,

    /// Free-form type tag such as "tab-switch" or "multiple_faces".
    #[serde(default, rename = "type")]
    #[validate(length(max = 100))]
    pub kind: Option<String>,

    /// Client clock at the moment of observation.
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    TabSwitch,
    WebcamAbsent,
    MultiFace,
    CopyPaste,
    DevtoolsOpen,
    NetworkLoss,
    Other,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::TabSwitch => "tab-switch",
            ViolationKind::WebcamAbsent => "webcam-absent",
            ViolationKind::MultiFace => "multi-face",
            ViolationKind::CopyPaste => "copy-paste",
            ViolationKind::DevtoolsOpen => "devtools-open",
            ViolationKind::NetworkLoss => "network-loss",
            ViolationKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Severity buckets, ordered from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

/// A classified integrity signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub attempt_id: Uuid,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub observed_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub sequence_number: u64,

    /// Tag exactly as the client sent it.
    pub raw_kind: Option<String>,
    pub detail: serde_json::Value,
}
