//! Bounded rayon pools for file I/O.
//!
//! Ingestion and rewriting read and write whole files, so they run on a
//! dedicated pool limited to the configured number of I/O threads instead of
//! one thread per core.

/// Run `f` on a pool of `threads` workers.
///
/// If the pool cannot be built the work runs on the global pool instead,
/// with a warning.
pub fn run_with_io_threads<R, F>(threads: usize, f: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
    {
        Ok(pool) => pool.install(f),
        Err(e) => {
            log::warn!(
                "Failed to create custom thread pool ({}), using global pool with {} threads",
                e,
                rayon::current_num_threads()
            );
            f()
        }
    }
}
