//! Concurrent write helpers.
//!
//! These drive many threads against one engine to check that writes to
//! the same document serialize and that facets stay consistent.

use crate::fixtures::{body, TEAM, TEAMS};
use facetdb_core::{DocumentId, Engine};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressResult {
    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.successful_ops + self.failed_ops) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations per thread.
    pub ops_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            ops_per_thread: 50,
        }
    }
}

/// Has every thread add distinct skills to the same document.
///
/// With serialized writes the document ends up with exactly
/// `threads * ops_per_thread` skills.
pub fn concurrent_patches(engine: Arc<Engine>, id: DocumentId, config: &StressConfig) -> StressResult {
    run_threads(config, move |t, i| {
        engine
            .patch_property(TEAM, id, "skills", &format!("skill-{t}-{i}"))
            .is_ok()
    })
}

/// Mixes creates, team changes and deletes across threads.
pub fn mixed_workload(engine: Arc<Engine>, config: &StressConfig) -> StressResult {
    run_threads(config, move |t, i| {
        let team = TEAMS[(t + i) % TEAMS.len()];
        let member = body(json!({ "name": format!("m{t}-{i}"), "team": [team] }));
        let Ok(doc) = engine.create(TEAM, &member) else {
            return false;
        };
        let other = TEAMS[(t * 3 + i) % TEAMS.len()];
        if engine.patch_property(TEAM, doc.id(), "team", other).is_err() {
            return false;
        }
        if i % 3 == 0 {
            return engine.delete(TEAM, doc.id()).is_ok();
        }
        true
    })
}

fn run_threads<F>(config: &StressConfig, op: F) -> StressResult
where
    F: Fn(usize, usize) -> bool + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let ok = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let op = Arc::clone(&op);
            let ok = Arc::clone(&ok);
            let failed = Arc::clone(&failed);
            let ops = config.ops_per_thread;
            thread::spawn(move || {
                for i in 0..ops {
                    if op(t, i) {
                        ok.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("stress thread panicked");
    }

    StressResult {
        successful_ops: ok.load(Ordering::Relaxed),
        failed_ops: failed.load(Ordering::Relaxed),
        duration: start.elapsed(),
    }
}
