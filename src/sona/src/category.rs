//! Category label classification
//!
//! Scene resources label each audio concern with free-form text such as
//! `Annie_Base_VO` or `Map11_MUS_Theme`. Labels are split into tokens on
//! `_` and other separators and matched case-insensitively against marker
//! sets. A label with no marker is bucketed as SFX and flagged so it shows
//! up in the logs for review.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Audio concern a category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioKind {
    Sfx,
    /// Read from the localized container
    Voice,
    Music,
}

impl std::fmt::Display for AudioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioKind::Sfx => write!(f, "sfx"),
            AudioKind::Voice => write!(f, "vo"),
            AudioKind::Music => write!(f, "music"),
        }
    }
}

/// Result of classifying one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: AudioKind,
    /// No marker matched; `kind` is the default bucket
    pub flagged: bool,
}

/// Marker tokens for each audio kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    pub voice: Vec<String>,
    pub music: Vec<String>,
    pub sfx: Vec<String>,
    /// Token marking a category only the base sub-entity may own
    pub base_only: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            voice: vec!["VO".into()],
            music: vec!["MUS".into(), "MUSIC".into()],
            sfx: vec!["SFX".into()],
            base_only: vec!["BASE".into()],
        }
    }
}

fn tokens(label: &str) -> impl Iterator<Item = String> + '_ {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_uppercase())
}

fn has_marker(label: &str, markers: &[String]) -> bool {
    tokens(label).any(|t| markers.iter().any(|m| m.eq_ignore_ascii_case(&t)))
}

/// Classify a category label
///
/// Voice wins over music, music over SFX, when a label carries several markers.
pub fn classify(label: &str, rules: &ClassifierRules) -> Classification {
    let kind = if has_marker(label, &rules.voice) {
        Some(AudioKind::Voice)
    } else if has_marker(label, &rules.music) {
        Some(AudioKind::Music)
    } else if has_marker(label, &rules.sfx) {
        Some(AudioKind::Sfx)
    } else {
        None
    };

    match kind {
        Some(kind) => Classification {
            kind,
            flagged: false,
        },
        None => {
            warn!(category = label, "unrecognized category label, treating as sfx");
            Classification {
                kind: AudioKind::Sfx,
                flagged: true,
            }
        }
    }
}

/// Whether a category may only be owned by the base sub-entity
pub fn is_base_only(label: &str, rules: &ClassifierRules) -> bool {
    has_marker(label, &rules.base_only)
}
