// src/engine/classifier.rs

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::violation::{RawProctorSignal, Severity, ViolationEvent, ViolationKind};

/// Normalized tag -> (kind, severity).
const CLASSIFICATION_TABLE: &[(&str, ViolationKind, Severity)] = &[
    ("tab-switch", ViolationKind::TabSwitch, Severity::Minor),
    ("visibility-hidden", ViolationKind::TabSwitch, Severity::Minor),
    ("window-blur", ViolationKind::TabSwitch, Severity::Minor),
    ("focus-lost", ViolationKind::TabSwitch, Severity::Minor),
    ("webcam-absent", ViolationKind::WebcamAbsent, Severity::Major),
    ("no-face", ViolationKind::WebcamAbsent, Severity::Major),
    ("face-absent", ViolationKind::WebcamAbsent, Severity::Major),
    ("camera-off", ViolationKind::WebcamAbsent, Severity::Major),
    ("multi-face", ViolationKind::MultiFace, Severity::Critical),
    ("multiple-faces", ViolationKind::MultiFace, Severity::Critical),
    ("extra-person", ViolationKind::MultiFace, Severity::Critical),
    ("copy-paste", ViolationKind::CopyPaste, Severity::Major),
    ("copy", ViolationKind::CopyPaste, Severity::Major),
    ("paste", ViolationKind::CopyPaste, Severity::Major),
    ("clipboard", ViolationKind::CopyPaste, Severity::Major),
    ("devtools-open", ViolationKind::DevtoolsOpen, Severity::Major),
    ("devtools", ViolationKind::DevtoolsOpen, Severity::Major),
    ("network-loss", ViolationKind::NetworkLoss, Severity::Minor),
    ("offline", ViolationKind::NetworkLoss, Severity::Minor),
    ("disconnect", ViolationKind::NetworkLoss, Severity::Minor),
];

/// Lowercases, trims and folds `_` and whitespace into `-`.
fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| {
            if c == '_' || c.is_whitespace() {
                '-'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// Looks up the `(kind, severity)` pair for a raw tag.
/// Unknown or missing tags land in `Other` / `Minor`.
pub fn lookup(tag: Option<&str>) -> (ViolationKind, Severity) {
    let Some(tag) = tag else {
        return (ViolationKind::Other, Severity::Minor);
    };
    let normalized = normalize_tag(tag);
    CLASSIFICATION_TABLE
        .iter()
        .find(|(name, _, _)| *name == normalized)
        .map(|&(_, kind, severity)| (kind, severity))
        .unwrap_or((ViolationKind::Other, Severity::Minor))
}

/// Classifies a raw client signal. Never fails.
pub fn classify(
    attempt_id: Uuid,
    raw: RawProctorSignal,
    received_at: DateTime<Utc>,
) -> ViolationEvent {
    let (kind, severity) = lookup(raw.kind.as_deref());

    if kind == ViolationKind::Other {
        tracing::debug!(
            attempt = %attempt_id,
            tag = ?raw.kind,
            "Unrecognised proctor signal, classified as other/minor"
        );
    }

    ViolationEvent {
        attempt_id,
        kind,
        severity,
        observed_at: raw.observed_at.unwrap_or(received_at),
        received_at,
        sequence_number: raw.sequence_number,
        raw_kind: raw.kind,
        detail: raw.payload,
    }
}
