//! Uniform reservoir sampling over the record stream.
//!
//! [`ReservoirSampler`] implements Algorithm R: the first `k` records fill the
//! reservoir, and the `i`-th record after that replaces a random slot with
//! probability `k / i`. After `n` records every one of them is in the sample
//! with probability `min(1, k / n)`, independently of where it appeared.
//!
//! The sampler holds a single global counter, so it must see the records of
//! every file through one instance. Parallel ingest wraps it in a `Mutex`;
//! the sample is then uniform but only reproducible with one I/O thread.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::scanner::{Fingerprint, LocationRef};

/// Default reservoir capacity.
pub const DEFAULT_SAMPLE_SIZE: usize = 2000;

/// A sampled record: its location, fingerprint and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    /// Where the record lives
    pub location: LocationRef,
    /// Fingerprint of the (normalized) text
    pub fingerprint: Fingerprint,
    /// Extracted text, compared by the similarity pass
    pub text: String,
}

/// Fixed-capacity uniform sample of a stream of unknown length.
#[derive(Debug)]
pub struct ReservoirSampler {
    capacity: usize,
    seen: u64,
    entries: Vec<SampleEntry>,
    rng: StdRng,
    seed: Option<u64>,
}

impl ReservoirSampler {
    /// Create a sampler holding at most `capacity` entries.
    ///
    /// With a seed the replacement decisions are deterministic for a given
    /// record order; without one the generator is seeded from the OS.
    #[must_use]
    pub fn new(capacity: usize, seed: Option<u64>) -> Self {
        Self {
            capacity,
            seen: 0,
            entries: Vec::with_capacity(capacity.min(DEFAULT_SAMPLE_SIZE * 4)),
            rng: Self::make_rng(seed),
            seed,
        }
    }

    fn make_rng(seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Offer the next record of the stream. Returns `true` if it entered
    /// the reservoir.
    pub fn offer(&mut self, entry: SampleEntry) -> bool {
        self.seen += 1;
        if self.capacity == 0 {
            return false;
        }

        if self.entries.len() < self.capacity {
            self.entries.push(entry);
            return true;
        }

        let slot = self.rng.gen_range(0..self.seen);
        match usize::try_from(slot) {
            Ok(slot) if slot < self.capacity => {
                self.entries[slot] = entry;
                true
            }
            _ => false,
        }
    }

    /// Offer several records in stream order.
    pub fn offer_all<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = SampleEntry>,
    {
        for entry in entries {
            self.offer(entry);
        }
    }

    /// Number of records offered so far.
    #[must_use]
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Reservoir capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been sampled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current sample, in reservoir slot order.
    #[must_use]
    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    /// Consume the sampler and return the sample.
    #[must_use]
    pub fn into_entries(self) -> Vec<SampleEntry> {
        self.entries
    }

    /// Empty the reservoir and restart the stream. A seeded sampler
    /// restarts its generator too, so the next pass repeats the last one.
    pub fn reset(&mut self) {
        self.seen = 0;
        self.entries.clear();
        self.rng = Self::make_rng(self.seed);
    }
}
