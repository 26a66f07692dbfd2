//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{Cache, Codec};

// == Sweeper ==
/// Runs TTL sweeps, never more than one at a time.
///
/// Clones share the in-progress flag, so the timer task and manual triggers
/// skip instead of overlapping.
#[derive(Debug, Clone, Default)]
pub struct Sweeper {
    running: Arc<AtomicBool>,
}

/// Clears the in-progress flag when a sweep ends, including on cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Sweeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a sweep holds the flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Removes expired entries from `cache`.
    ///
    /// Returns `None` without touching the cache if another sweep is in progress.
    pub async fn sweep<T, C>(&self, cache: &RwLock<Cache<T, C>>) -> Option<usize>
    where
        C: Codec<T>,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("TTL cleanup: sweep already in progress, skipping");
            return None;
        }
        let _guard = RunningGuard(&self.running);

        let removed = cache.write().await.cleanup_expired();
        Some(removed)
    }
}

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between cleanup runs.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task<T, C>(
    cache: Arc<RwLock<Cache<T, C>>>,
    sweeper: Sweeper,
    cleanup_interval_secs: u64,
) -> JoinHandle<()>
where
    T: 'static,
    C: Codec<T> + 'static,
{
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match sweeper.sweep(&cache).await {
                Some(removed) if removed > 0 => {
                    info!("TTL cleanup: removed {} expired entries", removed)
                }
                Some(_) => debug!("TTL cleanup: no expired entries found"),
                None => {}
            }
        }
    })
}
