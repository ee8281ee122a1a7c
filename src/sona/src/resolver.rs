//! Event-to-Asset Resolver
//!
//! For every (sub-entity, category) with symbolic events, finds the groups
//! that carry its audio (its own, or its owner's through sharing), decodes
//! each group's events container into a name -> hash table and its sample
//! containers into hash -> sample id, and joins the two:
//!
//! ```text
//! Play_sfx_Annie_Q  --events.bnk-->  0x1A2B3C4D  --audio.wpk-->  812345678
//! ```
//!
//! A group that cannot be decoded contributes nothing. It is logged with
//! its path and recorded on the [`ResolveReport`]; sibling groups and
//! categories carry on.

use serde::{Deserialize, Serialize};
use sona_bank::{BankDecoder, DecodeError, EventTable, SampleMap};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveReader, Payload};
use crate::catalog::{Entity, SubEntityId};
use crate::category::{classify, ClassifierRules};
use crate::registry::{
    BankPathGroup, CategoryBanks, Fingerprint, OwnershipRecord, Sharing, SharingRecord,
};
use crate::scene::EventRecords;
use crate::EntityError;

/// Category -> event name -> sample id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForwardMapping {
    categories: BTreeMap<String, BTreeMap<String, u32>>,
}

impl ForwardMapping {
    /// Add a category; empty mappings are dropped
    pub fn insert(&mut self, category: &str, events: BTreeMap<String, u32>) {
        if !events.is_empty() {
            self.categories.insert(category.to_string(), events);
        }
    }

    pub fn get(&self, category: &str) -> Option<&BTreeMap<String, u32>> {
        self.categories.get(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, u32>)> {
        self.categories.iter().map(|(c, m)| (c.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Forward mappings of every sub-entity that resolved any audio
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMapping {
    pub entity_id: u32,
    pub sub_entities: BTreeMap<SubEntityId, ForwardMapping>,
}

impl EntityMapping {
    pub fn is_empty(&self) -> bool {
        self.sub_entities.is_empty()
    }
}

/// A group that contributed nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFailure {
    pub sub_entity: SubEntityId,
    pub category: String,
    pub path: String,
    pub reason: String,
}

/// Two groups of one category mapped the same event to different samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCollision {
    pub sub_entity: SubEntityId,
    pub category: String,
    pub event: String,
    pub kept: u32,
    pub dropped: u32,
}

/// Result of resolving one entity
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub mapping: EntityMapping,
    pub failures: Vec<GroupFailure>,
    pub collisions: Vec<MergeCollision>,
    /// Categories with a non-empty mapping
    pub categories_resolved: usize,
}

/// Per-group failure before it is attributed to a sub-entity
#[derive(Debug)]
struct GroupError {
    path: String,
    reason: String,
}

impl GroupError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Resolves forward mappings against one archive and decoder
pub struct Resolver<'a> {
    archive: &'a dyn ArchiveReader,
    decoder: &'a dyn BankDecoder,
    rules: &'a ClassifierRules,
    languages: &'a [String],
}

impl<'a> Resolver<'a> {
    pub fn new(
        archive: &'a dyn ArchiveReader,
        decoder: &'a dyn BankDecoder,
        rules: &'a ClassifierRules,
        languages: &'a [String],
    ) -> Self {
        Self {
            archive,
            decoder,
            rules,
            languages,
        }
    }

    /// Resolve every sub-entity of `entity`
    ///
    /// `references` are the groups each sub-entity's scene names, `events`
    /// its symbolic events. Only redirect cycles (and chains longer than one
    /// hop) fail the entity; everything else is absorbed per group.
    pub fn resolve(
        &self,
        entity: &Entity,
        ownership: &OwnershipRecord,
        sharing: &SharingRecord,
        references: &HashMap<SubEntityId, CategoryBanks>,
        events: &HashMap<SubEntityId, EventRecords>,
    ) -> Result<ResolveReport, EntityError> {
        let mut report = ResolveReport {
            mapping: EntityMapping {
                entity_id: entity.id,
                ..EntityMapping::default()
            },
            ..ResolveReport::default()
        };
        let empty = CategoryBanks::new();

        for sub in entity.evaluation_order() {
            let Some(records) = events.get(&sub.id) else {
                continue;
            };
            let referenced = references.get(&sub.id).unwrap_or(&empty);
            let mut forward = ForwardMapping::default();

            for (category, event_ids) in records.iter() {
                if event_ids.is_empty() {
                    continue;
                }
                let owners = effective_owners(sub.id, category, ownership, sharing)?;
                let groups = collect_groups(&owners, category, ownership, referenced);
                if groups.is_empty() {
                    debug!(
                        entity = entity.id,
                        sub_entity = sub.id,
                        category,
                        "no bank groups for category"
                    );
                    continue;
                }

                let merged = self.resolve_category(
                    entity,
                    sub.id,
                    category,
                    &groups,
                    records,
                    &mut report,
                );
                if !merged.is_empty() {
                    report.categories_resolved += 1;
                }
                forward.insert(category, merged);
            }

            if !forward.is_empty() {
                report.mapping.sub_entities.insert(sub.id, forward);
            }
        }

        Ok(report)
    }

    fn resolve_category(
        &self,
        entity: &Entity,
        sub: SubEntityId,
        category: &str,
        groups: &[&BankPathGroup],
        records: &EventRecords,
        report: &mut ResolveReport,
    ) -> BTreeMap<String, u32> {
        let mut merged = BTreeMap::new();

        let container = match self.container_for(entity, category) {
            Ok(container) => container,
            Err(reason) => {
                warn!(entity = entity.id, sub_entity = sub, category, %reason, "skipping category");
                for group in groups {
                    let path = group.paths().first().map(String::as_str).unwrap_or("");
                    report.failures.push(GroupFailure {
                        sub_entity: sub,
                        category: category.to_string(),
                        path: path.to_string(),
                        reason: reason.clone(),
                    });
                }
                return merged;
            }
        };

        let known = records.known(category);
        for group in groups {
            let contribution = match self.resolve_group(container, group, &known) {
                Ok(contribution) => contribution,
                Err(e) => {
                    warn!(
                        entity = entity.id,
                        sub_entity = sub,
                        category,
                        path = %e.path,
                        reason = %e.reason,
                        "bank group contributed nothing"
                    );
                    report.failures.push(GroupFailure {
                        sub_entity: sub,
                        category: category.to_string(),
                        path: e.path,
                        reason: e.reason,
                    });
                    continue;
                }
            };

            for (event, sample) in contribution {
                if let Some(previous) = merged.insert(event.clone(), sample) {
                    if previous != sample {
                        warn!(
                            entity = entity.id,
                            sub_entity = sub,
                            category,
                            event = %event,
                            kept = sample,
                            dropped = previous,
                            "event mapped by two groups, keeping the later one"
                        );
                        report.collisions.push(MergeCollision {
                            sub_entity: sub,
                            category: category.to_string(),
                            event,
                            kept: sample,
                            dropped: previous,
                        });
                    }
                }
            }
        }

        merged
    }

    fn container_for<'e>(&self, entity: &'e Entity, category: &str) -> Result<&'e Path, String> {
        entity
            .container_for(classify(category, self.rules).kind, self.languages)
            .ok_or_else(|| "no localized container for voice category".to_string())
    }

    fn resolve_group(
        &self,
        container: &Path,
        group: &BankPathGroup,
        known: &HashSet<String>,
    ) -> Result<BTreeMap<String, u32>, GroupError> {
        let events_paths = group.events_paths();
        let events_path = match events_paths.as_slice() {
            [one] => *one,
            [] => {
                let first = group.paths().first().map(String::as_str).unwrap_or("");
                return Err(GroupError::new(first, "no events container in group"));
            }
            [first, ..] => {
                return Err(GroupError::new(first, "more than one events container in group"));
            }
        };
        let sample_paths = group.sample_paths();

        let mut keys = vec![events_path];
        keys.extend(sample_paths.iter().copied());
        let payloads = self
            .archive
            .extract(container, &keys)
            .map_err(|e| GroupError::new(events_path, format!("archive read failed: {}", e)))?;

        let mut payloads = payloads.into_iter();
        let events_bytes = payloads
            .next()
            .flatten()
            .ok_or_else(|| GroupError::new(events_path, "missing from container"))?;

        let mut samples: Vec<(&str, Payload)> = Vec::new();
        for (path, payload) in sample_paths.iter().zip(payloads) {
            match payload {
                Some(bytes) => samples.push((*path, bytes)),
                None => debug!(path = *path, "sample missing from container"),
            }
        }

        let (table, samples) = self.decode_table(events_path, events_bytes, samples)?;
        let table = table.filtered(known);
        if table.is_empty() {
            return Ok(BTreeMap::new());
        }

        let resolved = self.decode_sample_sources(&table, &samples)?;
        Ok(table
            .iter()
            .filter_map(|e| resolved.get(&e.hash).map(|&s| (e.name.clone(), s)))
            .collect())
    }

    /// Decode the events table, swapping roles once on a wrong-shape failure
    ///
    /// Returns the table and the payloads left to search for samples. With
    /// no separate sample container the events payload itself is searched
    /// (banks with embedded media).
    fn decode_table<'p>(
        &self,
        events_path: &'p str,
        events_bytes: Payload,
        samples: Vec<(&'p str, Payload)>,
    ) -> Result<(EventTable, Vec<(&'p str, Payload)>), GroupError> {
        match self.decoder.decode_events(events_path, &events_bytes) {
            Ok(table) => {
                let sources = if samples.is_empty() {
                    vec![(events_path, events_bytes)]
                } else {
                    samples
                };
                Ok((table, sources))
            }
            Err(e) if e.is_wrong_shape() => {
                debug!(path = events_path, error = %e, "events payload has the wrong shape, trying role swap");
                for (i, (path, bytes)) in samples.iter().enumerate() {
                    match self.decoder.decode_events(path, bytes) {
                        Ok(table) => {
                            info!(events = *path, samples = events_path, "swapped bank roles");
                            let mut rest: Vec<(&str, Payload)> = samples
                                .iter()
                                .enumerate()
                                .filter(|(j, _)| *j != i)
                                .map(|(_, (p, b))| (*p, b.clone()))
                                .collect();
                            rest.push((events_path, events_bytes.clone()));
                            return Ok((table, rest));
                        }
                        Err(swap_err) => {
                            debug!(path = *path, error = %swap_err, "not an events payload either");
                        }
                    }
                }
                Err(GroupError::new(
                    events_path,
                    format!("{} (no payload parses as events)", e),
                ))
            }
            Err(e) => Err(GroupError::new(events_path, e.to_string())),
        }
    }

    fn decode_sample_sources(
        &self,
        table: &EventTable,
        sources: &[(&str, Payload)],
    ) -> Result<SampleMap, GroupError> {
        let mut resolved = SampleMap::new();
        let mut decoded_any = false;
        let mut last_shape_error: Option<(String, DecodeError)> = None;

        for (path, bytes) in sources {
            match self.decoder.decode_samples(path, table, bytes) {
                Ok(map) => {
                    decoded_any = true;
                    resolved.extend(map);
                }
                Err(e) if e.is_wrong_shape() => {
                    debug!(path = *path, error = %e, "not a sample container");
                    last_shape_error = Some((path.to_string(), e));
                }
                Err(e) => return Err(GroupError::new(path, e.to_string())),
            }
        }

        match (decoded_any, last_shape_error) {
            (false, Some((path, e))) => Err(GroupError::new(&path, e.to_string())),
            _ => Ok(resolved),
        }
    }
}

/// Sub-entities whose banks serve (sub, category)
fn effective_owners(
    sub: SubEntityId,
    category: &str,
    ownership: &OwnershipRecord,
    sharing: &SharingRecord,
) -> Result<Vec<SubEntityId>, EntityError> {
    match sharing.get(sub) {
        Some(Sharing::Full(owner)) => {
            if *owner == sub {
                return Err(EntityError::RedirectCycle {
                    sub_entity: sub,
                    category: category.to_string(),
                });
            }
            match sharing.get(*owner) {
                Some(Sharing::Full(next)) if *next == sub => Err(EntityError::RedirectCycle {
                    sub_entity: sub,
                    category: category.to_string(),
                }),
                Some(Sharing::Full(_)) => Err(EntityError::RedirectTooDeep {
                    sub_entity: sub,
                    category: category.to_string(),
                }),
                _ => Ok(vec![*owner]),
            }
        }
        Some(partial) => {
            let mut owners = Vec::new();
            if !ownership.groups(sub, category).is_empty() {
                owners.push(sub);
            }
            for owner in partial.owners_for(category) {
                if owner == sub {
                    return Err(EntityError::RedirectCycle {
                        sub_entity: sub,
                        category: category.to_string(),
                    });
                }
                owners.push(owner);
            }
            Ok(owners)
        }
        None => Ok(vec![sub]),
    }
}

/// The owners' groups for a category, then any referenced group held by
/// one of those owners under another label, de-duplicated by fingerprint
fn collect_groups<'r>(
    owners: &[SubEntityId],
    category: &str,
    ownership: &'r OwnershipRecord,
    referenced: &'r CategoryBanks,
) -> Vec<&'r BankPathGroup> {
    let mut seen: Vec<Fingerprint> = Vec::new();
    let mut groups = Vec::new();

    let owned = owners.iter().flat_map(|&o| ownership.groups(o, category));
    let borrowed = referenced.groups(category).iter().filter(|g| {
        ownership
            .owner_of(&g.fingerprint())
            .map(|o| owners.contains(&o))
            .unwrap_or(false)
    });

    for group in owned.chain(borrowed) {
        let fingerprint = group.fingerprint();
        if !seen.contains(&fingerprint) {
            seen.push(fingerprint);
            groups.push(group);
        }
    }
    groups
}
