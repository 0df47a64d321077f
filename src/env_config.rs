//! Shared environment configuration for the abxlab binaries, plus the
//! run-scoped knobs of the marginal-effects engine.
//!
//! Consolidates the `ABXLAB_BASE_PATH` and `RAYON_NUM_THREADS` reads shared
//! by both binaries.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::constants::{AME_SAMPLE_SEED, AME_SAMPLE_TARGET, MAX_GRID_CELLS};

/// Read `ABXLAB_BASE_PATH` (default `"."`) and chdir into it.
pub fn init_base_path() -> std::io::Result<PathBuf> {
    let base_path = std::env::var("ABXLAB_BASE_PATH").unwrap_or_else(|_| ".".to_string());
    let path = PathBuf::from(&base_path);
    std::env::set_current_dir(&path)?;
    info!(base_path = %path.display(), "working directory set");
    Ok(path)
}

fn thread_count() -> usize {
    std::env::var("RAYON_NUM_THREADS")
        .or_else(|_| std::env::var("OMP_NUM_THREADS"))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8)
}

/// Build the rayon global pool from `RAYON_NUM_THREADS` (fallback
/// `OMP_NUM_THREADS`, default 8). Tolerates an already-initialized pool.
pub fn init_rayon_threads_lenient() -> usize {
    let num_threads = thread_count();
    if rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .is_err()
    {
        warn!("rayon pool already initialized");
    }
    info!(num_threads, "rayon threads");
    num_threads
}

/// Knobs of one marginal-effects run, passed explicitly to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// AME subsample size; panels at or below it are used whole.
    pub ame_sample_target: usize,
    pub sample_seed: u64,
    /// Largest reference grid the EMM path will build.
    pub max_grid_cells: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            ame_sample_target: AME_SAMPLE_TARGET,
            sample_seed: AME_SAMPLE_SEED,
            max_grid_cells: MAX_GRID_CELLS,
        }
    }
}
