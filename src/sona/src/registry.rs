//! Bank Ownership Registry
//!
//! Content-addressed dedup of bank-path-groups within one entity. The
//! registry is a sequential fold over the entity's sub-entities in
//! evaluation order (base first, then ascending id): the first sub-entity
//! to reference a group owns it, every later referencer records a sharing
//! entry naming that owner.
//!
//! ```text
//! skin 1000 (base)  CHAR_SFX  [a_events.bnk, a_audio.wpk]   -> owner
//! skin 1001         CHAR_SFX  [a_audio.wpk, a_events.bnk]   -> shares with 1000
//! ```
//!
//! A registry never outlives its entity, so there is nothing to lock.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::catalog::{Entity, SubEntityId};
use crate::category::{is_base_only, ClassifierRules};

/// An ordered set of container paths forming one audio bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankPathGroup {
    paths: Vec<String>,
}

impl BankPathGroup {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.paths)
    }

    /// Paths whose file name marks them as an events container
    pub fn events_paths(&self) -> Vec<&str> {
        self.paths
            .iter()
            .map(String::as_str)
            .filter(|p| is_events_path(p))
            .collect()
    }

    /// Every path that is not an events container
    pub fn sample_paths(&self) -> Vec<&str> {
        self.paths
            .iter()
            .map(String::as_str)
            .filter(|p| !is_events_path(p))
            .collect()
    }
}

fn is_events_path(path: &str) -> bool {
    file_name(path).to_ascii_lowercase().contains("events")
}

/// Last component of an archive path, either separator
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Identity of a bank-path-group: its sorted, de-duplicated paths
///
/// Comparison is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Vec<String>);

impl Fingerprint {
    pub fn of(paths: &[String]) -> Self {
        let mut sorted = paths.to_vec();
        sorted.sort();
        sorted.dedup();
        Self(sorted)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

/// Groups of one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEntry {
    pub category: String,
    pub groups: Vec<BankPathGroup>,
}

/// Ordered category -> bank-path-groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryBanks {
    entries: Vec<CategoryEntry>,
}

impl CategoryBanks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group to a category, creating the category at the end if new
    pub fn push_group(&mut self, category: &str, group: BankPathGroup) {
        match self.entries.iter_mut().find(|e| e.category == category) {
            Some(entry) => entry.groups.push(group),
            None => self.entries.push(CategoryEntry {
                category: category.to_string(),
                groups: vec![group],
            }),
        }
    }

    pub fn groups(&self, category: &str) -> &[BankPathGroup] {
        self.entries
            .iter()
            .find(|e| e.category == category)
            .map(|e| e.groups.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, category: &str, fingerprint: &Fingerprint) -> bool {
        self.groups(category)
            .iter()
            .any(|g| &g.fingerprint() == fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryEntry> {
        self.entries.iter()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.category.as_str())
    }

    pub fn group_count(&self) -> usize {
        self.entries.iter().map(|e| e.groups.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.group_count() == 0
    }

    /// Check labels and paths are non-empty
    pub fn validate(&self) -> Result<(), String> {
        for entry in &self.entries {
            if entry.category.trim().is_empty() {
                return Err("empty category label".to_string());
            }
            for group in &entry.groups {
                if group.is_empty() {
                    return Err(format!("empty bank-path-group in {}", entry.category));
                }
                if group.paths().iter().any(|p| p.trim().is_empty()) {
                    return Err(format!("empty bank path in {}", entry.category));
                }
            }
        }
        Ok(())
    }
}

/// Fingerprint -> owner, plus each owner's bank list per category
#[derive(Debug, Clone, Default)]
pub struct OwnershipRecord {
    owners: HashMap<Fingerprint, SubEntityId>,
    banks: BTreeMap<SubEntityId, CategoryBanks>,
}

impl OwnershipRecord {
    pub fn owner_of(&self, fingerprint: &Fingerprint) -> Option<SubEntityId> {
        self.owners.get(fingerprint).copied()
    }

    pub fn banks_of(&self, sub: SubEntityId) -> Option<&CategoryBanks> {
        self.banks.get(&sub)
    }

    pub fn groups(&self, sub: SubEntityId, category: &str) -> &[BankPathGroup] {
        self.banks
            .get(&sub)
            .map(|b| b.groups(category))
            .unwrap_or(&[])
    }

    pub fn owns_any(&self, sub: SubEntityId) -> bool {
        self.banks.get(&sub).map(|b| !b.is_empty()).unwrap_or(false)
    }

    /// Number of distinct fingerprints owned in this entity
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Owners and their banks, ascending by sub-entity id
    pub fn iter(&self) -> impl Iterator<Item = (SubEntityId, &CategoryBanks)> {
        self.banks.iter().map(|(id, b)| (*id, b))
    }

    fn append(&mut self, owner: SubEntityId, category: &str, group: &BankPathGroup) {
        let fingerprint = group.fingerprint();
        let banks = self.banks.entry(owner).or_default();
        if !banks.contains(category, &fingerprint) {
            banks.push_group(category, group.clone());
        }
        self.owners.entry(fingerprint).or_insert(owner);
    }
}

/// Where a sub-entity gets the banks it does not own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sharing {
    /// Owns nothing and every category points at this one owner
    Full(SubEntityId),
    /// Category -> owners, in first-reference order
    Partial(BTreeMap<String, Vec<SubEntityId>>),
}

impl Sharing {
    /// Owners this sharing names for a category
    pub fn owners_for(&self, category: &str) -> Vec<SubEntityId> {
        match self {
            Sharing::Full(owner) => vec![*owner],
            Sharing::Partial(map) => map.get(category).cloned().unwrap_or_default(),
        }
    }

    fn add(&mut self, category: &str, owner: SubEntityId) {
        if let Sharing::Partial(map) = self {
            let owners = map.entry(category.to_string()).or_default();
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }
    }

    /// The single owner every category names, if there is one
    fn sole_owner(&self) -> Option<SubEntityId> {
        match self {
            Sharing::Full(owner) => Some(*owner),
            Sharing::Partial(map) => {
                let mut all = map.values().flatten();
                let first = *all.next()?;
                all.all(|&o| o == first).then_some(first)
            }
        }
    }
}

/// Sharing entries by sub-entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharingRecord {
    entries: BTreeMap<SubEntityId, Sharing>,
}

impl SharingRecord {
    pub fn get(&self, sub: SubEntityId) -> Option<&Sharing> {
        self.entries.get(&sub)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubEntityId, &Sharing)> {
        self.entries.iter().map(|(id, s)| (*id, s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry as-is; no collapse or validation
    pub fn insert(&mut self, sub: SubEntityId, sharing: Sharing) {
        self.entries.insert(sub, sharing);
    }

    fn record(&mut self, sub: SubEntityId, category: &str, owner: SubEntityId) {
        self.entries
            .entry(sub)
            .or_insert_with(|| Sharing::Partial(BTreeMap::new()))
            .add(category, owner);
    }
}

/// Assign an owner to every distinct bank-path-group of an entity
///
/// `references` holds each sub-entity's scene bank groups. Sub-entities are
/// folded in [`Entity::evaluation_order`]; categories and groups in the
/// order the scene extractor produced them. A sub-entity whose map fails
/// [`CategoryBanks::validate`] is logged and skipped.
pub fn register(
    entity: &Entity,
    references: &HashMap<SubEntityId, CategoryBanks>,
    rules: &ClassifierRules,
) -> (OwnershipRecord, SharingRecord) {
    let mut ownership = OwnershipRecord::default();
    let mut sharing = SharingRecord::default();
    let base = entity.base().map(|b| b.id);

    for sub in entity.evaluation_order() {
        let Some(banks) = references.get(&sub.id) else {
            continue;
        };
        if let Err(reason) = banks.validate() {
            warn!(
                entity = entity.id,
                sub_entity = sub.id,
                %reason,
                "skipping malformed category map"
            );
            continue;
        }

        for entry in banks.iter() {
            for group in &entry.groups {
                let fingerprint = group.fingerprint();

                match ownership.owner_of(&fingerprint) {
                    Some(owner) if owner != sub.id => {
                        sharing.record(sub.id, &entry.category, owner);
                    }
                    Some(_) => ownership.append(sub.id, &entry.category, group),
                    None => {
                        let holder = match base {
                            Some(base)
                                if base != sub.id && is_base_only(&entry.category, rules) =>
                            {
                                debug!(
                                    entity = entity.id,
                                    sub_entity = sub.id,
                                    category = %entry.category,
                                    "base-only group assigned to base"
                                );
                                base
                            }
                            _ => sub.id,
                        };
                        ownership.append(holder, &entry.category, group);
                        if holder != sub.id {
                            sharing.record(sub.id, &entry.category, holder);
                        }
                    }
                }
            }
        }
    }

    collapse(&mut sharing, &ownership);
    (ownership, sharing)
}

/// Collapse sharing to a scalar redirect where the sub-entity owns nothing
/// and all its categories name the same owner
fn collapse(sharing: &mut SharingRecord, ownership: &OwnershipRecord) {
    for (sub, entry) in sharing.entries.iter_mut() {
        if ownership.owns_any(*sub) {
            continue;
        }
        if let Some(owner) = entry.sole_owner() {
            if !matches!(entry, Sharing::Full(_)) {
                debug!(sub_entity = *sub, owner, "collapsing to full redirect");
                *entry = Sharing::Full(owner);
            }
        }
    }
}
