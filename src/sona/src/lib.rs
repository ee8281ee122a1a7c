//! Audio bank deduplication and event-to-sample resolution
//!
//! Every champion skin, chroma and map references its audio through scene
//! resources: per category (SFX, VO, music) a list of bank-path-groups, and
//! the symbolic events the game plays. Skins reuse each other's banks
//! heavily, so the same bundle is referenced dozens of times.
//!
//! The pipeline per entity:
//!
//! 1. [`catalog`] builds entities and sub-entities with their scene paths
//! 2. [`scene`] reads each sub-entity's scene resource into bank groups and events
//! 3. [`registry`] assigns exactly one owner per distinct bank group and
//!    records who shares with whom
//! 4. [`resolver`] decodes the owner's banks and maps event names to sample ids
//! 5. [`output`] and [`extract`] write artifacts and owned bank files
//!
//! [`runner`] drives that per entity across a worker pool. Entities never
//! share state; within one entity sub-entities are folded strictly in order
//! because ownership is first-writer-wins.

pub mod archive;
pub mod catalog;
pub mod category;
pub mod extract;
#[cfg(test)]
mod mock;
pub mod output;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod scene;

pub use archive::{ArchiveReader, CachedArchive, DirectoryArchive};
pub use catalog::{
    Catalog, CatalogError, CatalogSource, ContainerRef, Entity, EntityKind, SubEntity,
    SubEntityId,
};
pub use category::{classify, AudioKind, Classification, ClassifierRules};
pub use extract::{BankExtractor, ExtractStats};
pub use output::{BanksArtifact, EventsArtifact, Metadata, OutputWriter};
pub use registry::{
    register, BankPathGroup, CategoryBanks, Fingerprint, OwnershipRecord, Sharing,
    SharingRecord,
};
pub use resolver::{
    EntityMapping, ForwardMapping, GroupFailure, MergeCollision, ResolveReport, Resolver,
};
pub use runner::{
    EntityOutcome, EntityScan, EntityStats, Pipeline, RunOptions, RunSummary, Task,
};
pub use scene::{
    EventRecords, JsonSceneParser, MusicMetadata, SceneError, SceneParser, SceneResource,
};

pub use sona_bank::{BankDecoder, DecodeError, EventTable};

use std::path::PathBuf;

/// Version of the JSON artifact layout written by [`output`]
pub const SCHEMA_VERSION: u32 = 2;

/// Errors that abort a single entity; the run continues with the next one
#[derive(thiserror::Error, Debug)]
pub enum EntityError {
    #[error("Root container missing: {0}")]
    MissingRootContainer(PathBuf),

    #[error("Sharing redirect cycle at sub-entity {sub_entity} (category {category})")]
    RedirectCycle { sub_entity: u32, category: String },

    #[error("Sharing redirect chain too deep at sub-entity {sub_entity} (category {category})")]
    RedirectTooDeep { sub_entity: u32, category: String },

    #[error("Failed to read {path}: {reason}")]
    Archive { path: String, reason: String },

    #[error("Output error: {0}")]
    Output(String),
}

/// Errors surfaced to the caller: configuration and catalog problems
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EntityError::MissingRootContainer(PathBuf::from("Champions/Annie.wad.client"));
        assert!(err.to_string().contains("Root container missing"));

        let err = EntityError::RedirectCycle {
            sub_entity: 1001,
            category: "Annie_Skin01_SFX".into(),
        };
        assert!(err.to_string().contains("cycle"));
        assert!(err.to_string().contains("1001"));

        let err = Error::Config("game root not set".into());
        assert!(err.to_string().contains("Configuration error"));

        let err: Error = CatalogError::MissingVersion.into();
        assert!(err.to_string().contains("version"));
    }
}
