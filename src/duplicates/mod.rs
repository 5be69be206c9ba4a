//! Duplicate detection and resolution.
//!
//! This module provides functionality for:
//! - Reservoir sampling of the record stream
//! - Pairwise similarity scoring and near-duplicate clustering
//! - Merging exact and near groups into one decision per record
//! - The detect pass that ties scanning, indexing and resolution together

pub mod cluster;
pub mod finder;
pub mod groups;
pub mod resolver;
pub mod sampler;
pub mod similarity;
pub mod union_find;

pub use cluster::{cluster_near_duplicates, ClusterStats};
pub use finder::{DetectSummary, Detection, DuplicateFinder, FinderConfig, FinderError};
pub use groups::{DuplicateGroup, GroupKind};
pub use resolver::{Decision, DuplicateResolver, ResolvedGroup, Resolution};
pub use sampler::{ReservoirSampler, SampleEntry, DEFAULT_SAMPLE_SIZE};
pub use similarity::{
    JaroWinkler, NormalizedLevenshtein, Similarity, SimilarityAlgorithm, SorensenDice,
    DEFAULT_THRESHOLD,
};
pub use union_find::UnionFind;
