//! Per-entity pipeline and the parallel runner
//!
//! One entity is one task: read its scene resources, fold ownership, then
//! either extract the owned banks or resolve forward mappings, and write
//! the artifacts. Tasks share nothing but the read-only collaborators, so
//! they run on a rayon pool; a failing entity is logged and counted, never
//! propagated.

use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveReader;
use crate::catalog::{Entity, SubEntityId};
use crate::category::ClassifierRules;
use crate::extract::BankExtractor;
use crate::output::OutputWriter;
use crate::registry::{register, CategoryBanks, OwnershipRecord, SharingRecord};
use crate::resolver::Resolver;
use crate::scene::{extract_bank_groups, extract_events, extract_music, EventRecords};
use crate::scene::{MusicMetadata, SceneParser};
use crate::{EntityError, Error, Result};
use sona_bank::BankDecoder;

/// Run-wide settings
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    /// Preference order for localized containers
    pub languages: Vec<String>,
    /// Entity ids to process; empty means all
    pub ids: Vec<u32>,
    pub rules: ClassifierRules,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            languages: vec!["en_US".to_string()],
            ids: Vec::new(),
            rules: ClassifierRules::default(),
        }
    }
}

/// What to do with each entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Write owned bank files and the banks artifact
    Extract,
    /// Resolve forward mappings and write the events artifact
    Mapping,
}

/// Scene contents and ownership for one entity
#[derive(Debug, Clone, Default)]
pub struct EntityScan {
    pub ownership: OwnershipRecord,
    pub sharing: SharingRecord,
    pub references: HashMap<SubEntityId, CategoryBanks>,
    pub events: HashMap<SubEntityId, EventRecords>,
    pub music: Option<MusicMetadata>,
    /// Sub-entities whose scene resource was missing or unreadable
    pub scenes_skipped: usize,
}

/// Counters for one successful entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityStats {
    pub owned_groups: usize,
    pub categories_resolved: usize,
    pub groups_failed: usize,
    pub collisions: usize,
    pub files_written: usize,
}

/// Result of one entity task
#[derive(Debug)]
pub struct EntityOutcome {
    pub entity_id: u32,
    pub alias: String,
    pub result: std::result::Result<EntityStats, EntityError>,
}

/// Totals across a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub entities_ok: usize,
    pub entities_failed: usize,
    pub categories_resolved: usize,
    pub groups_failed: usize,
    pub collisions: usize,
    pub files_written: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[EntityOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match &outcome.result {
                Ok(stats) => {
                    summary.entities_ok += 1;
                    summary.categories_resolved += stats.categories_resolved;
                    summary.groups_failed += stats.groups_failed;
                    summary.collisions += stats.collisions;
                    summary.files_written += stats.files_written;
                }
                Err(_) => summary.entities_failed += 1,
            }
        }
        summary
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entities: {} ok, {} failed | Categories resolved: {} | Groups failed: {} | Collisions: {} | Files written: {}",
            self.entities_ok,
            self.entities_failed,
            self.categories_resolved,
            self.groups_failed,
            self.collisions,
            self.files_written
        )
    }
}

/// The collaborators and settings shared by every entity task
pub struct Pipeline<'a> {
    archive: &'a dyn ArchiveReader,
    scenes: &'a dyn SceneParser,
    decoder: &'a dyn BankDecoder,
    output: &'a OutputWriter,
    options: &'a RunOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        archive: &'a dyn ArchiveReader,
        scenes: &'a dyn SceneParser,
        decoder: &'a dyn BankDecoder,
        output: &'a OutputWriter,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            archive,
            scenes,
            decoder,
            output,
            options,
        }
    }

    /// Read every sub-entity's scene resource and fold ownership
    pub fn scan_entity(&self, entity: &Entity) -> std::result::Result<EntityScan, EntityError> {
        if !self.archive.exists(&entity.root.path) {
            return Err(EntityError::MissingRootContainer(entity.root.path.clone()));
        }

        let keys: Vec<&str> = entity
            .sub_entities
            .iter()
            .map(|s| s.scene_path.as_str())
            .collect();
        let payloads = self
            .archive
            .extract(&entity.root.path, &keys)
            .map_err(|e| EntityError::Archive {
                path: entity.root.path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut scan = EntityScan::default();
        for (sub, payload) in entity.sub_entities.iter().zip(payloads) {
            let Some(bytes) = payload else {
                debug!(entity = entity.id, sub_entity = sub.id, path = %sub.scene_path, "no scene resource");
                scan.scenes_skipped += 1;
                continue;
            };
            let resource = match self.scenes.parse(&bytes) {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(
                        entity = entity.id,
                        sub_entity = sub.id,
                        path = %sub.scene_path,
                        error = %e,
                        "unreadable scene resource"
                    );
                    scan.scenes_skipped += 1;
                    continue;
                }
            };

            scan.references.insert(sub.id, extract_bank_groups(&resource));
            scan.events.insert(sub.id, extract_events(&resource));
            if scan.music.is_none() {
                scan.music = extract_music(&resource);
            }
        }

        let (ownership, sharing) = register(entity, &scan.references, &self.options.rules);
        debug!(
            entity = entity.id,
            owned = ownership.len(),
            sharing = sharing.len(),
            "ownership assigned"
        );
        scan.ownership = ownership;
        scan.sharing = sharing;
        Ok(scan)
    }

    /// Run one task for one entity
    pub fn process_entity(
        &self,
        entity: &Entity,
        task: Task,
    ) -> std::result::Result<EntityStats, EntityError> {
        let scan = self.scan_entity(entity)?;
        let mut stats = EntityStats {
            owned_groups: scan.ownership.len(),
            ..EntityStats::default()
        };

        match task {
            Task::Extract => {
                self.output.write_banks(
                    entity,
                    &scan.ownership,
                    &scan.sharing,
                    scan.music.as_ref(),
                )?;
                let extracted = BankExtractor::new(
                    self.archive,
                    &self.options.rules,
                    &self.options.languages,
                    self.output.root(),
                )
                .extract_owned(entity, &scan.ownership)?;
                stats.files_written = extracted.files_written;
                stats.groups_failed = extracted.groups_failed;
            }
            Task::Mapping => {
                let report = Resolver::new(
                    self.archive,
                    self.decoder,
                    &self.options.rules,
                    &self.options.languages,
                )
                .resolve(
                    entity,
                    &scan.ownership,
                    &scan.sharing,
                    &scan.references,
                    &scan.events,
                )?;
                self.output.write_events(entity, &report.mapping)?;
                stats.categories_resolved = report.categories_resolved;
                stats.groups_failed = report.failures.len();
                stats.collisions = report.collisions.len();
            }
        }

        Ok(stats)
    }

    /// Process `entities` on a pool of `options.workers` threads
    ///
    /// `on_done` is called from the worker threads as each entity finishes.
    /// Only a pool that cannot be built is an error.
    pub fn run<F>(
        &self,
        entities: &[&Entity],
        task: Task,
        on_done: F,
    ) -> Result<(Vec<EntityOutcome>, RunSummary)>
    where
        F: Fn(&EntityOutcome) + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .build()
            .map_err(|e| Error::Config(format!("failed to build worker pool: {}", e)))?;

        info!(entities = entities.len(), workers = self.options.workers, ?task, "starting run");

        let outcomes: Vec<EntityOutcome> = pool.install(|| {
            entities
                .par_iter()
                .map(|entity| {
                    let result = self.process_entity(entity, task);
                    if let Err(ref e) = result {
                        error!(entity = entity.id, alias = %entity.alias, error = %e, "entity failed");
                    }
                    let outcome = EntityOutcome {
                        entity_id: entity.id,
                        alias: entity.alias.clone(),
                        result,
                    };
                    on_done(&outcome);
                    outcome
                })
                .collect()
        });

        let summary = RunSummary::from_outcomes(&outcomes);
        info!(%summary, "run complete");
        Ok((outcomes, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ContainerRef, EntityKind, SubEntity};
    use crate::mock::{MemoryArchive, MockDecoder};
    use crate::scene::JsonSceneParser;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn champion(id: u32, alias: &str, skins: &[(u32, bool)]) -> Entity {
        Entity {
            id,
            alias: alias.into(),
            name: alias.into(),
            kind: EntityKind::Champion,
            names: BTreeMap::new(),
            sub_entities: skins
                .iter()
                .map(|&(skin, is_base)| SubEntity {
                    id: skin,
                    name: format!("{} {}", alias, skin),
                    scene_path: crate::catalog::skin_scene_path(alias, skin % 1000),
                    is_base,
                    parent: None,
                })
                .collect(),
            root: ContainerRef {
                path: PathBuf::from(format!("{}.wad.client", alias)),
                present: true,
            },
            localized: BTreeMap::from([(
                "en_US".to_string(),
                ContainerRef {
                    path: PathBuf::from(format!("{}.en_US.wad.client", alias)),
                    present: true,
                },
            )]),
        }
    }

    fn scene(category: &str, paths: &[&str], events: &[&str]) -> Vec<u8> {
        serde_json::json!({
            "groups": [{
                "category": category,
                "bankPaths": [paths],
                "events": events,
            }]
        })
        .to_string()
        .into_bytes()
    }

    fn fixture() -> (MemoryArchive, MockDecoder, Vec<Entity>) {
        let annie = champion(1, "Annie", &[(1000, true), (1001, false)]);
        let olaf = champion(2, "Olaf", &[(2000, true)]);

        let mut archive = MemoryArchive::new();
        let group = ["sounds/a_events.bnk", "sounds/a_audio.wpk"];
        archive.insert(
            "Annie.wad.client",
            &annie.sub_entities[0].scene_path,
            scene("CHAR_SFX", &group, &["Play_Q", "Play_W"]),
        );
        archive.insert(
            "Annie.wad.client",
            &annie.sub_entities[1].scene_path,
            scene("CHAR_SFX", &group, &["Play_Q"]),
        );
        archive.insert("Annie.wad.client", group[0], b"A-EVENTS".to_vec());
        archive.insert("Annie.wad.client", group[1], b"A-AUDIO".to_vec());
        // Olaf's root container is not there at all

        let decoder = MockDecoder::new()
            .with_events(b"A-EVENTS", &[("Play_Q", 1), ("Play_W", 2)])
            .with_samples(b"A-AUDIO", &[(1, 100), (2, 200)]);

        (archive, decoder, vec![annie, olaf])
    }

    fn catalog(entities: Vec<Entity>) -> Catalog {
        Catalog {
            game_version: "14.20".into(),
            languages: vec!["en_US".into()],
            entities,
        }
    }

    #[test]
    fn test_scan_entity() {
        let (archive, decoder, entities) = fixture();
        let cat = catalog(entities);
        let out = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(out.path(), &cat);
        let options = RunOptions::default();
        let parser = JsonSceneParser::new();
        let pipeline = Pipeline::new(&archive, &parser, &decoder, &writer, &options);

        let scan = pipeline.scan_entity(&cat.entities[0]).unwrap();
        assert_eq!(scan.ownership.len(), 1);
        assert_eq!(
            scan.sharing.get(1001),
            Some(&crate::registry::Sharing::Full(1000))
        );
        assert_eq!(scan.events[&1000].get("CHAR_SFX").map(<[String]>::len), Some(2));
        assert_eq!(scan.scenes_skipped, 0);

        assert!(matches!(
            pipeline.scan_entity(&cat.entities[1]),
            Err(EntityError::MissingRootContainer(_))
        ));
    }

    #[test]
    fn test_unreadable_scene_skips_sub_entity() {
        let (mut archive, decoder, entities) = fixture();
        archive.insert(
            "Annie.wad.client",
            &entities[0].sub_entities[1].scene_path,
            b"not json, no converter".to_vec(),
        );
        let cat = catalog(entities);
        let out = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(out.path(), &cat);
        let options = RunOptions::default();
        let parser = JsonSceneParser::new();
        let pipeline = Pipeline::new(&archive, &parser, &decoder, &writer, &options);

        let scan = pipeline.scan_entity(&cat.entities[0]).unwrap();
        assert_eq!(scan.scenes_skipped, 1);
        assert!(scan.sharing.is_empty());
    }

    #[test]
    fn test_run_mapping_isolates_failures() {
        let (archive, decoder, entities) = fixture();
        let cat = catalog(entities);
        let out = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(out.path(), &cat);
        let options = RunOptions {
            workers: 2,
            ..RunOptions::default()
        };
        let parser = JsonSceneParser::new();
        let pipeline = Pipeline::new(&archive, &parser, &decoder, &writer, &options);

        let done = AtomicUsize::new(0);
        let selected = cat.select(&[]);
        let (outcomes, summary) = pipeline
            .run(&selected, Task::Mapping, |_| {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(summary.entities_ok, 1);
        assert_eq!(summary.entities_failed, 1);
        assert_eq!(summary.categories_resolved, 2);
        assert_eq!(summary.groups_failed, 0);

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(out.path().join("events/champions/1.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["skins"]["1000"]["events"]["CHAR_SFX"]["Play_W"], 200);
        assert_eq!(json["skins"]["1001"]["events"]["CHAR_SFX"]["Play_Q"], 100);
        assert!(json["skins"]["1001"]["events"]["CHAR_SFX"].get("Play_W").is_none());
        assert!(!out.path().join("events/champions/2.json").exists());
    }

    #[test]
    fn test_run_extract_writes_owned_banks() {
        let (archive, decoder, entities) = fixture();
        let cat = catalog(entities);
        let out = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(out.path(), &cat);
        let options = RunOptions {
            workers: 1,
            ids: vec![1],
            ..RunOptions::default()
        };
        let parser = JsonSceneParser::new();
        let pipeline = Pipeline::new(&archive, &parser, &decoder, &writer, &options);

        let selected = cat.select(&options.ids);
        let (_, summary) = pipeline.run(&selected, Task::Extract, |_| {}).unwrap();

        assert_eq!(summary.entities_ok, 1);
        assert_eq!(summary.files_written, 2);
        assert!(out.path().join("banks/champions/1.json").exists());
        assert!(out
            .path()
            .join("audio/champions/Annie/1000/CHAR_SFX/a_events.bnk")
            .exists());
        // Nothing resolved in extract mode
        assert_eq!(decoder.events_calls(), 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            entities_ok: 3,
            entities_failed: 1,
            ..RunSummary::default()
        };
        let text = summary.to_string();
        assert!(text.contains("3 ok"));
        assert!(text.contains("1 failed"));
    }
}
