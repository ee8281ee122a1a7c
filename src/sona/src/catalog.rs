//! Entity and sub-entity catalog
//!
//! Builds the canonical list of audio-bearing entities (champions and maps)
//! from raw per-language summaries and detail records. Each skin and chroma
//! becomes a sub-entity whose scene resource path is derived from its id:
//!
//! ```text
//! entity 1, skin 1004  ->  data/characters/annie/skins/skin4.bin
//! ```
//!
//! A wrong path here silently produces empty results downstream, so ids that
//! do not follow the convention are rejected instead of guessed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::category::AudioKind;

pub type SubEntityId = u32;

/// Skin ids are `entity_id * SKIN_ID_STRIDE + skin_number`
pub const SKIN_ID_STRIDE: u32 = 1000;

/// Errors while building the catalog; always fatal for the run
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("Missing game version metadata")]
    MissingVersion,

    #[error("No languages configured")]
    NoLanguages,

    #[error("No summaries for language {0}")]
    MissingSummaries(String),

    #[error("Missing detail record for entity {0}")]
    MissingDetail(u32),

    #[error("Skin id {skin} does not belong to entity {entity}")]
    SkinIdMismatch { entity: u32, skin: u32 },

    #[error("Invalid alias: {0:?}")]
    InvalidAlias(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Duplicate entity id {0}")]
    DuplicateEntity(u32),
}

/// Entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Champion,
    Map,
}

impl EntityKind {
    /// Directory name used for artifacts
    pub fn dir_name(self) -> &'static str {
        match self {
            EntityKind::Champion => "champions",
            EntityKind::Map => "maps",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Champion => write!(f, "champion"),
            EntityKind::Map => write!(f, "map"),
        }
    }
}

/// A container path candidate and whether it was found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub path: PathBuf,
    pub present: bool,
}

impl ContainerRef {
    fn probe(path: PathBuf) -> Self {
        let present = path.exists();
        Self { path, present }
    }
}

/// A skin, chroma, or the map itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubEntity {
    pub id: SubEntityId,
    pub name: String,
    pub scene_path: String,
    #[serde(default)]
    pub is_base: bool,
    /// Skin a chroma belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<SubEntityId>,
}

/// A champion or map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: u32,
    pub alias: String,
    pub name: String,
    pub kind: EntityKind,
    /// Display names by language
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub names: BTreeMap<String, String>,
    /// Sorted by id
    pub sub_entities: Vec<SubEntity>,
    pub root: ContainerRef,
    #[serde(default)]
    pub localized: BTreeMap<String, ContainerRef>,
}

impl Entity {
    pub fn base(&self) -> Option<&SubEntity> {
        self.sub_entities.iter().find(|s| s.is_base)
    }

    pub fn sub_entity(&self, id: SubEntityId) -> Option<&SubEntity> {
        self.sub_entities.iter().find(|s| s.id == id)
    }

    /// Order in which ownership is assigned: base first, then ascending id
    pub fn evaluation_order(&self) -> Vec<&SubEntity> {
        let mut order: Vec<&SubEntity> = self.sub_entities.iter().collect();
        order.sort_by_key(|s| (!s.is_base, s.id));
        order
    }

    /// First language (in preference order) whose localized container exists
    pub fn voice_container(&self, languages: &[String]) -> Option<(&str, &Path)> {
        languages.iter().find_map(|lang| {
            self.localized
                .get_key_value(lang)
                .filter(|(_, c)| c.present)
                .map(|(lang, c)| (lang.as_str(), c.path.as_path()))
        })
    }

    /// Container a category of this kind is read from
    ///
    /// Voice comes from the localized container, everything else from root.
    pub fn container_for(&self, kind: AudioKind, languages: &[String]) -> Option<&Path> {
        match kind {
            AudioKind::Voice => self.voice_container(languages).map(|(_, path)| path),
            AudioKind::Sfx | AudioKind::Music => Some(self.root.path.as_path()),
        }
    }
}

/// The full catalog for one game version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub game_version: String,
    pub languages: Vec<String>,
    pub entities: Vec<Entity>,
}

impl Catalog {
    /// Load a catalog previously written with [`Catalog::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Entities matching `ids`, or all entities when `ids` is empty
    pub fn select(&self, ids: &[u32]) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| ids.is_empty() || ids.contains(&e.id))
            .collect()
    }
}

// ============================================================================
// Raw source records
// ============================================================================

/// One row of a per-language champion summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionSummary {
    /// Negative ids are placeholder rows
    pub id: i64,
    pub alias: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromaRecord {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub is_base: bool,
    #[serde(default)]
    pub chromas: Vec<ChromaRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionDetail {
    pub id: u32,
    pub alias: String,
    #[serde(default)]
    pub skins: Vec<SkinRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRecord {
    pub id: u32,
    pub name: String,
    pub map_string_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceMeta {
    game_version: Option<String>,
    #[serde(default)]
    languages: Vec<String>,
}

/// Raw inputs to [`build`]
#[derive(Debug, Clone, Default)]
pub struct CatalogSource {
    pub game_version: Option<String>,
    /// Preference order; the first language supplies display names
    pub languages: Vec<String>,
    pub summaries: BTreeMap<String, Vec<ChampionSummary>>,
    pub details: HashMap<u32, ChampionDetail>,
    pub maps: Vec<MapRecord>,
}

impl CatalogSource {
    /// Load raw records from a directory
    ///
    /// ```text
    /// meta.json                      {"gameVersion": "...", "languages": [...]}
    /// <lang>/champion-summary.json   [{id, alias, name}]
    /// champions/<id>.json            {id, alias, skins: [...]}
    /// maps.json                      [{id, name, mapStringId}]   (optional)
    /// ```
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        let dir = dir.as_ref();
        let meta: SourceMeta = serde_json::from_str(&fs::read_to_string(dir.join("meta.json"))?)?;

        let mut summaries = BTreeMap::new();
        for lang in &meta.languages {
            let path = dir.join(lang).join("champion-summary.json");
            if !path.exists() {
                warn!(language = %lang, "no champion summary for language");
                continue;
            }
            let rows: Vec<ChampionSummary> = serde_json::from_str(&fs::read_to_string(&path)?)?;
            summaries.insert(lang.clone(), rows);
        }

        let mut details = HashMap::new();
        let champions_dir = dir.join("champions");
        if champions_dir.is_dir() {
            for entry in walkdir::WalkDir::new(&champions_dir)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
                    continue;
                }
                let detail: ChampionDetail = serde_json::from_str(&fs::read_to_string(path)?)?;
                details.insert(detail.id, detail);
            }
        }

        let maps_path = dir.join("maps.json");
        let maps = if maps_path.exists() {
            serde_json::from_str(&fs::read_to_string(&maps_path)?)?
        } else {
            Vec::new()
        };

        Ok(Self {
            game_version: meta.game_version,
            languages: meta.languages,
            summaries,
            details,
            maps,
        })
    }
}

// ============================================================================
// Building
// ============================================================================

/// Skin number within its entity: skin 1004 of entity 1 is skin 4
pub fn skin_number(entity_id: u32, skin_id: u32) -> Result<u32, CatalogError> {
    if skin_id / SKIN_ID_STRIDE != entity_id {
        return Err(CatalogError::SkinIdMismatch {
            entity: entity_id,
            skin: skin_id,
        });
    }
    Ok(skin_id % SKIN_ID_STRIDE)
}

pub fn skin_scene_path(alias: &str, number: u32) -> String {
    format!(
        "data/characters/{}/skins/skin{}.bin",
        alias.to_lowercase(),
        number
    )
}

pub fn map_scene_path(map_string_id: &str) -> String {
    let lower = map_string_id.to_lowercase();
    format!("data/maps/shipping/{}/{}.bin", lower, lower)
}

fn validate_alias(alias: &str) -> Result<(), CatalogError> {
    if alias.is_empty() || !alias.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CatalogError::InvalidAlias(alias.to_string()));
    }
    Ok(())
}

fn containers(
    dir: &Path,
    alias: &str,
    languages: &[String],
) -> (ContainerRef, BTreeMap<String, ContainerRef>) {
    let root = ContainerRef::probe(dir.join(format!("{}.wad.client", alias)));
    let localized = languages
        .iter()
        .map(|lang| {
            let candidate = ContainerRef::probe(dir.join(format!("{}.{}.wad.client", alias, lang)));
            if !candidate.present {
                debug!(alias, language = %lang, "localized container absent");
            }
            (lang.clone(), candidate)
        })
        .collect();
    (root, localized)
}

fn build_sub_entities(detail: &ChampionDetail) -> Result<Vec<SubEntity>, CatalogError> {
    let mut subs = Vec::new();

    for skin in &detail.skins {
        let number = skin_number(detail.id, skin.id)?;
        subs.push(SubEntity {
            id: skin.id,
            name: skin.name.clone(),
            scene_path: skin_scene_path(&detail.alias, number),
            is_base: skin.is_base || number == 0,
            parent: None,
        });

        for chroma in &skin.chromas {
            let number = skin_number(detail.id, chroma.id)?;
            subs.push(SubEntity {
                id: chroma.id,
                name: chroma.name.clone(),
                scene_path: skin_scene_path(&detail.alias, number),
                is_base: false,
                parent: Some(skin.id),
            });
        }
    }

    subs.sort_by_key(|s| s.id);
    subs.dedup_by_key(|s| s.id);

    // Only one dedup root per entity: keep the lowest-id base
    let mut seen_base = false;
    for sub in subs.iter_mut().filter(|s| s.is_base) {
        if seen_base {
            warn!(entity = detail.id, skin = sub.id, "extra base skin demoted");
            sub.is_base = false;
        }
        seen_base = true;
    }

    Ok(subs)
}

/// Build the catalog from raw records, probing containers under `game_root`
pub fn build(source: &CatalogSource, game_root: &Path) -> Result<Catalog, CatalogError> {
    let game_version = source
        .game_version
        .clone()
        .filter(|v| !v.trim().is_empty())
        .ok_or(CatalogError::MissingVersion)?;
    let primary = source.languages.first().ok_or(CatalogError::NoLanguages)?;
    let summaries = source
        .summaries
        .get(primary)
        .ok_or_else(|| CatalogError::MissingSummaries(primary.clone()))?;

    let final_dir = game_root.join("Game").join("DATA").join("FINAL");
    let champions_dir = final_dir.join("Champions");
    let maps_dir = final_dir.join("Maps").join("Shipping");

    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for summary in summaries.iter().filter(|s| s.id > 0) {
        let id =
            u32::try_from(summary.id).map_err(|_| CatalogError::InvalidId(summary.id.to_string()))?;
        if !seen.insert((EntityKind::Champion, id)) {
            return Err(CatalogError::DuplicateEntity(id));
        }

        let detail = source.details.get(&id).ok_or(CatalogError::MissingDetail(id))?;
        validate_alias(&detail.alias)?;

        let names = source
            .summaries
            .iter()
            .filter_map(|(lang, rows)| {
                rows.iter()
                    .find(|r| r.id == summary.id)
                    .map(|r| (lang.clone(), r.name.clone()))
            })
            .collect();

        let (root, localized) = containers(&champions_dir, &detail.alias, &source.languages);
        entities.push(Entity {
            id,
            alias: detail.alias.clone(),
            name: summary.name.clone(),
            kind: EntityKind::Champion,
            names,
            sub_entities: build_sub_entities(detail)?,
            root,
            localized,
        });
    }

    for map in &source.maps {
        validate_alias(&map.map_string_id)?;
        if !seen.insert((EntityKind::Map, map.id)) {
            return Err(CatalogError::DuplicateEntity(map.id));
        }

        let (root, localized) = containers(&maps_dir, &map.map_string_id, &source.languages);
        entities.push(Entity {
            id: map.id,
            alias: map.map_string_id.clone(),
            name: map.name.clone(),
            kind: EntityKind::Map,
            names: BTreeMap::new(),
            sub_entities: vec![SubEntity {
                id: map.id,
                name: map.name.clone(),
                scene_path: map_scene_path(&map.map_string_id),
                is_base: false,
                parent: None,
            }],
            root,
            localized,
        });
    }

    entities.sort_by_key(|e| (e.kind, e.id));

    Ok(Catalog {
        game_version,
        languages: source.languages.clone(),
        entities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annie_source() -> CatalogSource {
        let mut summaries = BTreeMap::new();
        summaries.insert(
            "en_US".to_string(),
            vec![
                ChampionSummary {
                    id: -1,
                    alias: "None".into(),
                    name: "None".into(),
                },
                ChampionSummary {
                    id: 1,
                    alias: "Annie".into(),
                    name: "Annie".into(),
                },
            ],
        );
        summaries.insert(
            "ko_KR".to_string(),
            vec![ChampionSummary {
                id: 1,
                alias: "Annie".into(),
                name: "애니".into(),
            }],
        );

        let mut details = HashMap::new();
        details.insert(
            1,
            ChampionDetail {
                id: 1,
                alias: "Annie".into(),
                skins: vec![
                    SkinRecord {
                        id: 1004,
                        name: "Frostfire Annie".into(),
                        is_base: false,
                        chromas: vec![],
                    },
                    SkinRecord {
                        id: 1000,
                        name: "Annie".into(),
                        is_base: true,
                        chromas: vec![],
                    },
                    SkinRecord {
                        id: 1031,
                        name: "Fright Night Annie".into(),
                        is_base: false,
                        chromas: vec![ChromaRecord {
                            id: 1032,
                            name: "Fright Night Annie (Ruby)".into(),
                        }],
                    },
                ],
            },
        );

        CatalogSource {
            game_version: Some("14.20".into()),
            languages: vec!["en_US".into(), "ko_KR".into()],
            summaries,
            details,
            maps: vec![MapRecord {
                id: 11,
                name: "Summoner's Rift".into(),
                map_string_id: "Map11".into(),
            }],
        }
    }

    #[test]
    fn test_skin_number() {
        assert_eq!(skin_number(1, 1004).unwrap(), 4);
        assert_eq!(skin_number(1, 1000).unwrap(), 0);
        assert_eq!(skin_number(103, 103086).unwrap(), 86);
        assert!(matches!(
            skin_number(1, 10004),
            Err(CatalogError::SkinIdMismatch {
                entity: 1,
                skin: 10004
            })
        ));
        assert!(skin_number(2, 1004).is_err());
    }

    #[test]
    fn test_scene_paths() {
        assert_eq!(
            skin_scene_path("Annie", 4),
            "data/characters/annie/skins/skin4.bin"
        );
        assert_eq!(
            map_scene_path("Map11"),
            "data/maps/shipping/map11/map11.bin"
        );
    }

    #[test]
    fn test_build_catalog() {
        let root = tempfile::tempdir().unwrap();
        let champions = root.path().join("Game/DATA/FINAL/Champions");
        fs::create_dir_all(champions.join("Annie.wad.client")).unwrap();
        fs::create_dir_all(champions.join("Annie.en_US.wad.client")).unwrap();

        let catalog = build(&annie_source(), root.path()).unwrap();
        assert_eq!(catalog.game_version, "14.20");
        assert_eq!(catalog.entities.len(), 2);

        let annie = &catalog.entities[0];
        assert_eq!(annie.kind, EntityKind::Champion);
        assert_eq!(annie.names.get("ko_KR").map(String::as_str), Some("애니"));

        let ids: Vec<u32> = annie.sub_entities.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1000, 1004, 1031, 1032]);
        assert_eq!(annie.base().unwrap().id, 1000);
        assert_eq!(
            annie.sub_entity(1004).unwrap().scene_path,
            "data/characters/annie/skins/skin4.bin"
        );
        assert_eq!(annie.sub_entity(1032).unwrap().parent, Some(1031));

        assert!(annie.root.present);
        assert!(annie.localized["en_US"].present);
        // Absence is recorded, not an error
        assert!(!annie.localized["ko_KR"].present);

        let map = &catalog.entities[1];
        assert_eq!(map.kind, EntityKind::Map);
        assert_eq!(map.sub_entities.len(), 1);
        assert!(!map.root.present);
    }

    #[test]
    fn test_build_rejects_foreign_skin_id() {
        let mut source = annie_source();
        source.details.get_mut(&1).unwrap().skins.push(SkinRecord {
            id: 2001,
            name: "Olaf skin".into(),
            is_base: false,
            chromas: vec![],
        });

        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            build(&source, root.path()),
            Err(CatalogError::SkinIdMismatch {
                entity: 1,
                skin: 2001
            })
        ));
    }

    #[test]
    fn test_build_requires_version() {
        let mut source = annie_source();
        source.game_version = Some("  ".into());
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            build(&source, root.path()),
            Err(CatalogError::MissingVersion)
        ));
    }

    #[test]
    fn test_build_requires_detail() {
        let mut source = annie_source();
        source.details.clear();
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            build(&source, root.path()),
            Err(CatalogError::MissingDetail(1))
        ));
    }

    #[test]
    fn test_build_rejects_bad_alias() {
        let mut source = annie_source();
        source.details.get_mut(&1).unwrap().alias = "../Annie".into();
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            build(&source, root.path()),
            Err(CatalogError::InvalidAlias(_))
        ));
    }

    #[test]
    fn test_evaluation_order_base_first() {
        let entity = Entity {
            id: 1,
            alias: "Annie".into(),
            name: "Annie".into(),
            kind: EntityKind::Champion,
            names: BTreeMap::new(),
            sub_entities: vec![
                SubEntity {
                    id: 1001,
                    name: "Goth Annie".into(),
                    scene_path: skin_scene_path("Annie", 1),
                    is_base: false,
                    parent: None,
                },
                SubEntity {
                    id: 1005,
                    name: "Annie in Wonderland".into(),
                    scene_path: skin_scene_path("Annie", 5),
                    is_base: true,
                    parent: None,
                },
                SubEntity {
                    id: 1002,
                    name: "Red Riding Annie".into(),
                    scene_path: skin_scene_path("Annie", 2),
                    is_base: false,
                    parent: None,
                },
            ],
            root: ContainerRef {
                path: PathBuf::from("Annie.wad.client"),
                present: true,
            },
            localized: BTreeMap::new(),
        };

        let order: Vec<u32> = entity.evaluation_order().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![1005, 1001, 1002]);
    }

    #[test]
    fn test_source_load_dir_and_catalog_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("meta.json"),
            r#"{"gameVersion": "14.20", "languages": ["en_US"]}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("en_US")).unwrap();
        fs::write(
            dir.path().join("en_US/champion-summary.json"),
            r#"[{"id": 1, "alias": "Annie", "name": "Annie"}]"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("champions")).unwrap();
        fs::write(
            dir.path().join("champions/1.json"),
            r#"{"id": 1, "alias": "Annie", "skins": [{"id": 1000, "name": "Annie", "isBase": true}]}"#,
        )
        .unwrap();

        let source = CatalogSource::load_dir(dir.path()).unwrap();
        assert_eq!(source.details.len(), 1);
        assert!(source.maps.is_empty());

        let catalog = build(&source, dir.path()).unwrap();
        let path = dir.path().join("out/catalog.json");
        catalog.save(&path).unwrap();
        let loaded = Catalog::load(&path).unwrap();
        assert_eq!(loaded, catalog);
        assert_eq!(loaded.select(&[1]).len(), 1);
        assert!(loaded.select(&[99]).is_empty());
        assert_eq!(loaded.select(&[]).len(), 1);
    }

    #[test]
    fn test_source_missing_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("meta.json"), r#"{"languages": ["en_US"]}"#).unwrap();
        fs::create_dir_all(dir.path().join("en_US")).unwrap();
        fs::write(dir.path().join("en_US/champion-summary.json"), "[]").unwrap();

        let source = CatalogSource::load_dir(dir.path()).unwrap();
        assert!(matches!(
            build(&source, dir.path()),
            Err(CatalogError::MissingVersion)
        ));
    }
}
