//! Scene resource boundary: bank groups and events per category
//!
//! A scene resource (a skin's or map's `.bin`) lists, per logical audio
//! group, a category label, the bank-path-groups it loads, the symbolic
//! events it plays, and for maps some embedded music metadata. The binary
//! scene format is decoded elsewhere; [`JsonSceneParser`] takes its JSON
//! rendering, optionally produced on the fly by an external converter.

use serde::{Deserialize, Serialize};
use sona_bank::ExecCommand;
use std::collections::{BTreeMap, HashSet};

use crate::registry::{BankPathGroup, CategoryBanks};

/// Errors from scene parsing
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    #[error("Invalid scene JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scene converter failed: {0}")]
    Converter(String),

    #[error("Binary scene resource and no converter configured")]
    NoConverter,
}

/// Free-form music metadata embedded in map scenes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicMetadata {
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl MusicMetadata {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One logical audio group of a scene resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGroup {
    pub category: String,
    #[serde(default)]
    pub bank_paths: Vec<Vec<String>>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicMetadata>,
}

/// Parsed scene resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneResource {
    #[serde(default)]
    pub groups: Vec<SceneGroup>,
}

/// Trait for parsing scene resources
pub trait SceneParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<SceneResource, SceneError>;
}

/// Parses the JSON rendering of a scene resource
///
/// Payloads that are not JSON are handed to the converter command (invoked
/// as `<command> to-json`, binary on stdin, JSON on stdout) when one is set.
#[derive(Debug, Clone, Default)]
pub struct JsonSceneParser {
    converter: Option<ExecCommand>,
}

impl JsonSceneParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_converter(converter: ExecCommand) -> Self {
        Self {
            converter: Some(converter),
        }
    }
}

fn looks_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|&b| b == b'{')
        .unwrap_or(false)
}

impl SceneParser for JsonSceneParser {
    fn parse(&self, bytes: &[u8]) -> Result<SceneResource, SceneError> {
        if looks_like_json(bytes) {
            return Ok(serde_json::from_slice(bytes)?);
        }

        let converter = self.converter.as_ref().ok_or(SceneError::NoConverter)?;
        let output = converter
            .run(&["to-json"], bytes)
            .map_err(|e| SceneError::Converter(e.to_string()))?;
        if !output.status.success() {
            return Err(SceneError::Converter(format!(
                "exit code {:?}: {}",
                output.status.code(),
                output.stderr
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Symbolic event ids per category, in scene order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecords {
    categories: Vec<(String, Vec<String>)>,
}

impl EventRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add events to a category, skipping ids already present
    pub fn extend<I, S>(&mut self, category: &str, events: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let idx = match self.categories.iter().position(|(c, _)| c == category) {
            Some(i) => i,
            None => {
                self.categories.push((category.to_string(), Vec::new()));
                self.categories.len() - 1
            }
        };
        let list = &mut self.categories[idx].1;
        for event in events {
            let event = event.into();
            if !list.contains(&event) {
                list.push(event);
            }
        }
    }

    pub fn get(&self, category: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, e)| e.as_slice())
    }

    /// Known ids for a category, used to bound decompiler work
    pub fn known(&self, category: &str) -> HashSet<String> {
        self.get(category)
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories
            .iter()
            .map(|(c, e)| (c.as_str(), e.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(|(_, e)| e.is_empty())
    }
}

/// Category -> bank-path-groups, in scene order
///
/// A category that appears in several groups accumulates all their bank
/// paths.
pub fn extract_bank_groups(resource: &SceneResource) -> CategoryBanks {
    let mut banks = CategoryBanks::new();
    for group in &resource.groups {
        for paths in &group.bank_paths {
            if paths.is_empty() {
                continue;
            }
            banks.push_group(&group.category, BankPathGroup::new(paths.clone()));
        }
    }
    banks
}

/// Category -> symbolic events; categories without events are kept empty
pub fn extract_events(resource: &SceneResource) -> EventRecords {
    let mut records = EventRecords::new();
    for group in &resource.groups {
        records.extend(&group.category, group.events.iter().cloned());
    }
    records
}

/// Music metadata from all groups, merged in scene order
pub fn extract_music(resource: &SceneResource) -> Option<MusicMetadata> {
    let mut merged = MusicMetadata::default();
    for music in resource.groups.iter().filter_map(|g| g.music.as_ref()) {
        merged
            .fields
            .extend(music.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    (!merged.is_empty()).then_some(merged)
}
