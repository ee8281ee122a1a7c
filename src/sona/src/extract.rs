//! Owned bank file extraction
//!
//! Copies the raw container files of every owned bank-path-group out of the
//! game containers, untouched:
//!
//! ```text
//! <out>/audio/champions/Annie/1000/CHAR_SFX/a_events.bnk
//! <out>/audio/champions/Annie/1000/CHAR_SFX/a_audio.wpk
//! ```
//!
//! Only owners are written, so a bundle shared by forty skins lands on disk
//! once. A group whose container read fails is skipped; its siblings are
//! still written.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::archive::{normalize_key, ArchiveReader};
use crate::catalog::Entity;
use crate::category::{classify, ClassifierRules};
use crate::registry::{file_name, OwnershipRecord};
use crate::EntityError;

/// Counts for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub groups: usize,
    pub groups_failed: usize,
    pub files_written: usize,
    pub files_missing: usize,
}

/// Replace anything but alphanumerics, `_` and `-` so labels are safe path
/// components
fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Archive key as a relative path with only plain components
fn relative_key(key: &str) -> PathBuf {
    let normalized = normalize_key(key);
    Path::new(&normalized)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Writes owned bank files under `<out>/audio`
pub struct BankExtractor<'a> {
    archive: &'a dyn ArchiveReader,
    rules: &'a ClassifierRules,
    languages: &'a [String],
    out_root: &'a Path,
}

impl<'a> BankExtractor<'a> {
    pub fn new(
        archive: &'a dyn ArchiveReader,
        rules: &'a ClassifierRules,
        languages: &'a [String],
        out_root: &'a Path,
    ) -> Self {
        Self {
            archive,
            rules,
            languages,
            out_root,
        }
    }

    pub fn entity_dir(&self, entity: &Entity) -> PathBuf {
        self.out_root
            .join("audio")
            .join(entity.kind.dir_name())
            .join(&entity.alias)
    }

    /// Extract every group the entity's sub-entities own
    pub fn extract_owned(
        &self,
        entity: &Entity,
        ownership: &OwnershipRecord,
    ) -> Result<ExtractStats, EntityError> {
        let mut stats = ExtractStats::default();
        let entity_dir = self.entity_dir(entity);

        for (owner, banks) in ownership.iter() {
            for entry in banks.iter() {
                let kind = classify(&entry.category, self.rules).kind;
                let Some(container) = entity.container_for(kind, self.languages) else {
                    let missing: usize = entry.groups.iter().map(|g| g.paths().len()).sum();
                    warn!(
                        entity = entity.id,
                        sub_entity = owner,
                        category = %entry.category,
                        "no localized container, skipping voice banks"
                    );
                    stats.files_missing += missing;
                    continue;
                };

                let dir = entity_dir
                    .join(owner.to_string())
                    .join(sanitize(&entry.category));
                // Target path -> archive key written there, per category
                let mut written: HashMap<PathBuf, String> = HashMap::new();

                for group in &entry.groups {
                    stats.groups += 1;
                    let keys: Vec<&str> = group.paths().iter().map(String::as_str).collect();
                    let payloads = match self.archive.extract(container, &keys) {
                        Ok(payloads) => payloads,
                        Err(e) => {
                            warn!(
                                entity = entity.id,
                                sub_entity = owner,
                                category = %entry.category,
                                container = %container.display(),
                                error = %e,
                                "bank group read failed, skipping"
                            );
                            stats.groups_failed += 1;
                            stats.files_missing += keys.len();
                            continue;
                        }
                    };

                    for (key, payload) in keys.iter().zip(payloads) {
                        let Some(bytes) = payload else {
                            warn!(entity = entity.id, path = *key, "bank file missing from container");
                            stats.files_missing += 1;
                            continue;
                        };

                        let normalized = normalize_key(key);
                        let mut target = dir.join(file_name(key));
                        match written.get(&target) {
                            Some(previous) if *previous == normalized => {
                                debug!(path = *key, "bank file already written");
                                continue;
                            }
                            Some(previous) => {
                                warn!(
                                    path = *key,
                                    clashes_with = %previous,
                                    "bank file name clash, keeping archive directories"
                                );
                                target = dir.join(relative_key(key));
                            }
                            None => {}
                        }

                        write_file(&target, &bytes)?;
                        debug!(path = %target.display(), size = bytes.len(), "wrote bank file");
                        written.insert(target, normalized);
                        stats.files_written += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), EntityError> {
    let to_output = |e: std::io::Error| EntityError::Output(format!("{}: {}", path.display(), e));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_output)?;
    }
    fs::write(path, bytes).map_err(to_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContainerRef, EntityKind, SubEntity};
    use crate::mock::MemoryArchive;
    use crate::registry::{register, BankPathGroup, CategoryBanks};
    use std::collections::{BTreeMap, HashMap};

    const ROOT: &str = "Annie.wad.client";
    const LOCAL: &str = "Annie.en_US.wad.client";

    fn entity() -> Entity {
        Entity {
            id: 1,
            alias: "Annie".into(),
            name: "Annie".into(),
            kind: EntityKind::Champion,
            names: BTreeMap::new(),
            sub_entities: vec![
                SubEntity {
                    id: 1000,
                    name: "Annie".into(),
                    scene_path: String::new(),
                    is_base: true,
                    parent: None,
                },
                SubEntity {
                    id: 1001,
                    name: "Goth Annie".into(),
                    scene_path: String::new(),
                    is_base: false,
                    parent: None,
                },
            ],
            root: ContainerRef {
                path: PathBuf::from(ROOT),
                present: true,
            },
            localized: BTreeMap::from([(
                "en_US".to_string(),
                ContainerRef {
                    path: PathBuf::from(LOCAL),
                    present: true,
                },
            )]),
        }
    }

    fn group(paths: &[&str]) -> BankPathGroup {
        BankPathGroup::new(paths.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Annie_Base_SFX"), "Annie_Base_SFX");
        assert_eq!(sanitize("../VO x"), "___VO_x");
    }

    #[test]
    fn test_extract_owned_writes_each_group_once() {
        let mut archive = MemoryArchive::new();
        archive.insert(ROOT, "sounds/a_events.bnk", b"EVENTS".to_vec());
        archive.insert(ROOT, "sounds/a_audio.wpk", b"AUDIO".to_vec());
        archive.insert(LOCAL, "sounds/vo_events.bnk", b"VO".to_vec());

        let mut base = CategoryBanks::new();
        base.push_group("CHAR_SFX", group(&["sounds/a_events.bnk", "sounds/a_audio.wpk"]));
        base.push_group("CHAR_VO", group(&["sounds/vo_events.bnk", "sounds/vo_audio.wpk"]));
        let mut skin = CategoryBanks::new();
        skin.push_group("CHAR_SFX", group(&["sounds/a_audio.wpk", "sounds/a_events.bnk"]));

        let e = entity();
        let rules = ClassifierRules::default();
        let (ownership, _) = register(&e, &HashMap::from([(1000, base), (1001, skin)]), &rules);

        let out = tempfile::tempdir().unwrap();
        let languages = vec!["en_US".to_string()];
        let extractor = BankExtractor::new(&archive, &rules, &languages, out.path());
        let stats = extractor.extract_owned(&e, &ownership).unwrap();

        assert_eq!(stats.groups, 2);
        assert_eq!(stats.files_written, 3);
        assert_eq!(stats.files_missing, 1);

        let sfx = out.path().join("audio/champions/Annie/1000/CHAR_SFX");
        assert_eq!(fs::read(sfx.join("a_events.bnk")).unwrap(), b"EVENTS");
        assert_eq!(fs::read(sfx.join("a_audio.wpk")).unwrap(), b"AUDIO");
        assert!(out
            .path()
            .join("audio/champions/Annie/1000/CHAR_VO/vo_events.bnk")
            .exists());
        assert!(!out.path().join("audio/champions/Annie/1001").exists());
    }

    #[test]
    fn test_failed_group_read_skips_only_that_group() {
        let mut archive = MemoryArchive::new();
        archive.insert(ROOT, "sounds/a_events.bnk", b"EVENTS".to_vec());
        archive.insert(ROOT, "sounds/a_audio.wpk", b"AUDIO".to_vec());
        archive.insert(ROOT, "sounds/b_events.bnk", b"B".to_vec());
        archive.fail_on("sounds/b_events.bnk");

        let mut base = CategoryBanks::new();
        base.push_group("CHAR_SFX", group(&["sounds/b_events.bnk", "sounds/b_audio.wpk"]));
        base.push_group("CHAR_SFX", group(&["sounds/a_events.bnk", "sounds/a_audio.wpk"]));

        let e = entity();
        let rules = ClassifierRules::default();
        let (ownership, _) = register(&e, &HashMap::from([(1000, base)]), &rules);

        let out = tempfile::tempdir().unwrap();
        let languages = vec!["en_US".to_string()];
        let stats = BankExtractor::new(&archive, &rules, &languages, out.path())
            .extract_owned(&e, &ownership)
            .unwrap();

        assert_eq!(stats.groups, 2);
        assert_eq!(stats.groups_failed, 1);
        assert_eq!(stats.files_missing, 2);
        assert_eq!(stats.files_written, 2);
        let sfx = out.path().join("audio/champions/Annie/1000/CHAR_SFX");
        assert!(sfx.join("a_events.bnk").exists());
        assert!(!sfx.join("b_events.bnk").exists());
    }

    #[test]
    fn test_same_file_name_in_two_directories() {
        let mut archive = MemoryArchive::new();
        archive.insert(ROOT, "sounds/q/events.bnk", b"Q".to_vec());
        archive.insert(ROOT, "sounds/w/events.bnk", b"W".to_vec());
        archive.insert(ROOT, "sounds/shared_audio.wpk", b"AUDIO".to_vec());

        let mut base = CategoryBanks::new();
        base.push_group("CHAR_SFX", group(&["sounds/q/events.bnk", "sounds/shared_audio.wpk"]));
        base.push_group("CHAR_SFX", group(&["sounds/w/events.bnk", "sounds/shared_audio.wpk"]));

        let e = entity();
        let rules = ClassifierRules::default();
        let (ownership, _) = register(&e, &HashMap::from([(1000, base)]), &rules);

        let out = tempfile::tempdir().unwrap();
        let languages = vec!["en_US".to_string()];
        let stats = BankExtractor::new(&archive, &rules, &languages, out.path())
            .extract_owned(&e, &ownership)
            .unwrap();

        let sfx = out.path().join("audio/champions/Annie/1000/CHAR_SFX");
        assert_eq!(fs::read(sfx.join("events.bnk")).unwrap(), b"Q");
        assert_eq!(fs::read(sfx.join("sounds/w/events.bnk")).unwrap(), b"W");
        assert_eq!(fs::read(sfx.join("shared_audio.wpk")).unwrap(), b"AUDIO");
        assert_eq!(stats.files_written, 3);
    }

    #[test]
    fn test_relative_key_drops_parent_components() {
        assert_eq!(relative_key("../Sounds/A.bnk"), PathBuf::from("sounds/a.bnk"));
    }

    #[test]
    fn test_voice_without_localized_container() {
        let mut e = entity();
        e.localized.clear();
        let archive = MemoryArchive::new();

        let mut base = CategoryBanks::new();
        base.push_group("CHAR_VO", group(&["vo_events.bnk", "vo_audio.wpk"]));
        let rules = ClassifierRules::default();
        let (ownership, _) = register(&e, &HashMap::from([(1000, base)]), &rules);

        let out = tempfile::tempdir().unwrap();
        let languages = vec!["en_US".to_string()];
        let stats = BankExtractor::new(&archive, &rules, &languages, out.path())
            .extract_owned(&e, &ownership)
            .unwrap();
        assert_eq!(stats.files_missing, 2);
        assert_eq!(stats.files_written, 0);
        assert_eq!(archive.reads(), 0);
    }
}
