//! Near-duplicate clustering over a sample.
//!
//! Every unordered pair of sampled records is compared once. Pairs scoring
//! at or above the threshold are linked, and the connected components of the
//! link graph (via [`UnionFind`]) become near-duplicate groups. Clustering is
//! therefore transitive: if A~B and B~C then A, B and C share a group even
//! when A and C alone would not pass.
//!
//! Pairs with equal fingerprints are exact duplicates the index already
//! reports, so they are skipped rather than linked. The pass is quadratic in
//! the sample size; the row loop runs on the rayon pool.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use super::groups::DuplicateGroup;
use super::sampler::SampleEntry;
use super::similarity::Similarity;
use super::union_find::UnionFind;

/// Counters from one clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Records in the sample
    pub sample_size: usize,
    /// Pairs skipped because they share a fingerprint
    pub exact_pairs: u64,
    /// Pairs rejected by the length bound without scoring
    pub pruned: u64,
    /// Pairs actually scored
    pub comparisons: u64,
    /// Pairs at or above the threshold
    pub links: u64,
    /// Near-duplicate groups emitted
    pub clusters: usize,
    /// The pass stopped early on a shutdown request
    pub interrupted: bool,
}

#[derive(Default)]
struct RowResult {
    links: Vec<(usize, usize)>,
    exact_pairs: u64,
    pruned: u64,
    comparisons: u64,
    skipped: bool,
}

/// Cluster a sample into near-duplicate groups.
///
/// Entries are ordered by location first, so group ids (`near-000001`, ...)
/// follow the `(file, line)` order of each group's first member regardless
/// of reservoir slot order. Only groups of two or more members are returned.
///
/// When `shutdown` is raised part way the remaining rows are skipped, the
/// groups found so far are returned and [`ClusterStats::interrupted`] is set.
pub fn cluster_near_duplicates(
    mut entries: Vec<SampleEntry>,
    similarity: &dyn Similarity,
    threshold: f64,
    shutdown: Option<&AtomicBool>,
) -> (Vec<DuplicateGroup>, ClusterStats) {
    entries.sort_by(|a, b| a.location.cmp(&b.location));
    entries.dedup_by(|a, b| a.location == b.location);

    let mut stats = ClusterStats {
        sample_size: entries.len(),
        ..ClusterStats::default()
    };
    if entries.len() < 2 {
        return (Vec::new(), stats);
    }

    let lengths: Vec<usize> = entries.iter().map(|e| e.text.chars().count()).collect();
    let is_shutdown = || shutdown.is_some_and(|f| f.load(Ordering::SeqCst));

    let rows: Vec<RowResult> = (0..entries.len())
        .into_par_iter()
        .map(|i| {
            if is_shutdown() {
                return RowResult {
                    skipped: true,
                    ..RowResult::default()
                };
            }

            let mut row = RowResult::default();
            let a = &entries[i];
            for j in (i + 1)..entries.len() {
                let b = &entries[j];
                if a.fingerprint == b.fingerprint {
                    row.exact_pairs += 1;
                    continue;
                }
                if similarity.upper_bound(lengths[i], lengths[j]) < threshold {
                    row.pruned += 1;
                    continue;
                }
                row.comparisons += 1;
                if similarity.score(&a.text, &b.text) >= threshold {
                    row.links.push((i, j));
                }
            }
            row
        })
        .collect();

    let mut uf = UnionFind::new(entries.len());
    for row in &rows {
        stats.exact_pairs += row.exact_pairs;
        stats.pruned += row.pruned;
        stats.comparisons += row.comparisons;
        stats.interrupted |= row.skipped;
        for &(i, j) in &row.links {
            stats.links += 1;
            uf.union(i, j);
        }
    }

    let groups: Vec<DuplicateGroup> = uf
        .sets()
        .into_iter()
        .filter(|set| set.len() > 1)
        .enumerate()
        .map(|(n, set)| {
            let members = set.into_iter().map(|i| entries[i].location.clone()).collect();
            DuplicateGroup::near(DuplicateGroup::near_id(n + 1), members)
        })
        .collect();

    stats.clusters = groups.len();
    if stats.interrupted {
        log::info!("Clustering interrupted by shutdown signal");
    }
    log::debug!(
        "Clustered {} sampled records: {} scored, {} pruned, {} exact pairs, {} links, {} clusters",
        stats.sample_size,
        stats.comparisons,
        stats.pruned,
        stats.exact_pairs,
        stats.links,
        stats.clusters
    );

    (groups, stats)
}
