//! Per-entity JSON artifacts
//!
//! ```text
//! <out>/catalog.json
//! <out>/banks/champions/1.json     ownership, sharing, music metadata
//! <out>/events/champions/1.json    forward mappings
//! <out>/events/maps/11.json
//! ```
//!
//! Champion artifacts carry a `skins` object keyed by skin id, map
//! artifacts a single `map` object. Sub-entities and categories with
//! nothing in them are left out, and an entity with nothing at all gets no
//! file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::catalog::{Catalog, Entity, EntityKind, SubEntityId};
use crate::registry::{BankPathGroup, OwnershipRecord, Sharing, SharingRecord};
use crate::resolver::{EntityMapping, ForwardMapping};
use crate::scene::MusicMetadata;
use crate::{EntityError, SCHEMA_VERSION};

/// Header stamped on every artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub game_version: String,
    pub schema_version: u32,
    pub languages: Vec<String>,
}

impl Metadata {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            game_version: catalog.game_version.clone(),
            schema_version: SCHEMA_VERSION,
            languages: catalog.languages.clone(),
        }
    }
}

/// Banks owned and shared by one sub-entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubEntityBanks {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub banks: BTreeMap<String, Vec<BankPathGroup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing: Option<Sharing>,
}

impl SubEntityBanks {
    fn is_empty(&self) -> bool {
        self.banks.is_empty() && self.sharing.is_none()
    }
}

/// Forward mapping of one sub-entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubEntityEvents {
    pub events: ForwardMapping,
}

/// `banks/<kind>/<id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanksArtifact {
    pub metadata: Metadata,
    pub entity_id: u32,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skins: Option<BTreeMap<SubEntityId, SubEntityBanks>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<SubEntityBanks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicMetadata>,
}

/// `events/<kind>/<id>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsArtifact {
    pub metadata: Metadata,
    pub entity_id: u32,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skins: Option<BTreeMap<SubEntityId, SubEntityEvents>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<SubEntityEvents>,
}

/// Writes artifacts under one output root
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
    metadata: Metadata,
}

impl OutputWriter {
    pub fn new<P: Into<PathBuf>>(root: P, catalog: &Catalog) -> Self {
        Self {
            root: root.into(),
            metadata: Metadata::new(catalog),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.json")
    }

    pub fn banks_path(&self, entity: &Entity) -> PathBuf {
        self.root
            .join("banks")
            .join(entity.kind.dir_name())
            .join(format!("{}.json", entity.id))
    }

    pub fn events_path(&self, entity: &Entity) -> PathBuf {
        self.root
            .join("events")
            .join(entity.kind.dir_name())
            .join(format!("{}.json", entity.id))
    }

    pub fn write_catalog(&self, catalog: &Catalog) -> crate::Result<PathBuf> {
        let path = self.catalog_path();
        catalog.save(&path)?;
        Ok(path)
    }

    /// Write the banks artifact; `None` when the entity has no banks
    pub fn write_banks(
        &self,
        entity: &Entity,
        ownership: &OwnershipRecord,
        sharing: &SharingRecord,
        music: Option<&MusicMetadata>,
    ) -> Result<Option<PathBuf>, EntityError> {
        let mut subs = BTreeMap::new();
        for sub in &entity.sub_entities {
            let entry = SubEntityBanks {
                banks: ownership
                    .banks_of(sub.id)
                    .map(|banks| {
                        banks
                            .iter()
                            .filter(|e| !e.groups.is_empty())
                            .map(|e| (e.category.clone(), e.groups.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
                sharing: sharing.get(sub.id).cloned(),
            };
            if !entry.is_empty() {
                subs.insert(sub.id, entry);
            }
        }

        if subs.is_empty() && music.is_none() {
            debug!(entity = entity.id, "no banks, skipping artifact");
            return Ok(None);
        }

        let (skins, map) = split_by_kind(entity.kind, subs);
        let artifact = BanksArtifact {
            metadata: self.metadata.clone(),
            entity_id: entity.id,
            alias: entity.alias.clone(),
            skins,
            map,
            music: music.cloned(),
        };

        let path = self.banks_path(entity);
        write_json(&path, &artifact)?;
        Ok(Some(path))
    }

    /// Write the events artifact; `None` when nothing resolved
    pub fn write_events(
        &self,
        entity: &Entity,
        mapping: &EntityMapping,
    ) -> Result<Option<PathBuf>, EntityError> {
        let subs: BTreeMap<SubEntityId, SubEntityEvents> = mapping
            .sub_entities
            .iter()
            .filter(|(_, forward)| !forward.is_empty())
            .map(|(id, forward)| {
                (
                    *id,
                    SubEntityEvents {
                        events: forward.clone(),
                    },
                )
            })
            .collect();

        if subs.is_empty() {
            debug!(entity = entity.id, "no resolved events, skipping artifact");
            return Ok(None);
        }

        let (skins, map) = split_by_kind(entity.kind, subs);
        let artifact = EventsArtifact {
            metadata: self.metadata.clone(),
            entity_id: entity.id,
            alias: entity.alias.clone(),
            skins,
            map,
        };

        let path = self.events_path(entity);
        write_json(&path, &artifact)?;
        Ok(Some(path))
    }
}

/// Champions keep the id-keyed map; a map entity has exactly one sub-entity
fn split_by_kind<T>(
    kind: EntityKind,
    mut subs: BTreeMap<SubEntityId, T>,
) -> (Option<BTreeMap<SubEntityId, T>>, Option<T>) {
    match kind {
        EntityKind::Champion => ((!subs.is_empty()).then_some(subs), None),
        EntityKind::Map => (None, subs.pop_first().map(|(_, v)| v)),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EntityError> {
    let to_output = |e: String| EntityError::Output(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| to_output(e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| to_output(e.to_string()))?;
    fs::write(path, json).map_err(|e| to_output(e.to_string()))
}
