use super::common::{detect, rec, write_jsonl};
use jsondupe::duplicates::{FinderConfig, ReservoirSampler, SampleEntry};
use jsondupe::scanner::{Hasher, LocationRef};
use tempfile::tempdir;

fn entry(i: u64) -> SampleEntry {
    let text = format!("record {i}");
    SampleEntry {
        location: LocationRef::new("a.jsonl", i + 1),
        fingerprint: Hasher::default().fingerprint(&text),
        text,
    }
}

#[test]
fn test_reservoir_inclusion_is_uniform() {
    const N: u64 = 20;
    const K: usize = 5;
    const TRIALS: u64 = 4000;

    let mut hits = [0u32; N as usize];
    for seed in 0..TRIALS {
        let mut sampler = ReservoirSampler::new(K, Some(seed));
        for i in 0..N {
            sampler.offer(entry(i));
        }
        for e in sampler.entries() {
            hits[(e.location.line - 1) as usize] += 1;
        }
    }

    // Each record is kept with probability K/N; the expected count is 1000
    // with a standard deviation of about 27.
    let expected = TRIALS as f64 * K as f64 / N as f64;
    for (i, &h) in hits.iter().enumerate() {
        let deviation = (f64::from(h) - expected).abs();
        assert!(
            deviation < 150.0,
            "record {i} sampled {h} times, expected about {expected}"
        );
    }
}

#[test]
fn test_seeded_detection_is_reproducible() {
    let dir = tempdir().unwrap();
    let lines: Vec<String> = (0..200)
        .map(|i| rec(&format!("a fairly long shared prefix for record number {i:04}")))
        .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_jsonl(dir.path(), "a.jsonl", &refs);

    let config = || {
        FinderConfig::default()
            .with_seed(Some(99))
            .with_io_threads(1)
            .with_sample_size(20)
    };
    let first = detect(dir.path(), config());
    let second = detect(dir.path(), config().with_fresh(true));

    assert_eq!(first.summary.cluster.sample_size, 20);
    assert_eq!(first.resolution, second.resolution);
    assert_eq!(first.summary.cluster.comparisons, second.summary.cluster.comparisons);
}
