//! Persistence Module
//!
//! Durable mirror of the cache across restarts. The in-memory store stays
//! authoritative: every failure here is logged, recorded in
//! [`PersistenceStatus`], and otherwise ignored.
//!
//! Writes travel through a bounded queue to a single writer task. Each queued
//! operation carries a version from one monotonic counter; the writer drains
//! whatever is queued, keeps only the highest version per key, and applies the
//! batch on the blocking pool.

mod backend;
mod file;
mod record;
mod sqlite;

pub use backend::{MemoryBackend, PersistenceBackend};
pub use file::FileBackend;
pub use record::PersistedRecord;
pub use sqlite::SqliteBackend;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheEntry;
use crate::error::Result;

/// Most operations applied per writer batch.
const MAX_BATCH: usize = 256;

// == Persistence Kind ==
/// Backend selection from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceKind {
    #[default]
    None,
    Memory,
    File,
    Sqlite,
}

impl FromStr for PersistenceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(PersistenceKind::None),
            "memory" => Ok(PersistenceKind::Memory),
            "file" => Ok(PersistenceKind::File),
            "sqlite" => Ok(PersistenceKind::Sqlite),
            other => Err(format!("unknown persistence backend: {}", other)),
        }
    }
}

// == Persistence Status ==
/// Observable state of the persistence mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistenceStatus {
    /// Backend name
    pub backend: String,
    /// Operations accepted into the queue
    pub enqueued: u64,
    /// Operations written to the backend
    pub applied: u64,
    /// Operations replaced by a newer version before being written
    pub superseded: u64,
    /// Operations rejected because the queue was full or closed
    pub dropped: u64,
    /// Operations the backend failed to apply
    pub failed: u64,
    /// Most recent failure, cleared by the next fully successful batch
    pub last_sync_error: Option<String>,
}

#[derive(Debug)]
enum PersistOp {
    Save {
        version: u64,
        key: String,
        body: String,
    },
    Remove {
        version: u64,
        key: String,
    },
    Clear {
        version: u64,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Shared {
    version: AtomicU64,
    status: Mutex<PersistenceStatus>,
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut PersistenceStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// == Persistence Handle ==
/// Sending side of the persistence queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<PersistOp>,
    shared: Arc<Shared>,
}

impl PersistenceHandle {
    /// Queues a write of `entry`.
    pub fn save(&self, entry: &CacheEntry) {
        match PersistedRecord::from(entry).to_json() {
            Ok(body) => {
                let version = self.shared.next_version();
                self.enqueue(PersistOp::Save {
                    version,
                    key: entry.key.clone(),
                    body,
                });
            }
            Err(e) => {
                warn!("Failed to serialize record for key '{}': {}", entry.key, e);
                self.shared.update(|s| {
                    s.failed += 1;
                    s.last_sync_error = Some(e.to_string());
                });
            }
        }
    }

    /// Queues removal of `key`.
    pub fn remove(&self, key: &str) {
        let version = self.shared.next_version();
        self.enqueue(PersistOp::Remove {
            version,
            key: key.to_string(),
        });
    }

    /// Queues removal of every record.
    pub fn clear(&self) {
        let version = self.shared.next_version();
        self.enqueue(PersistOp::Clear { version });
    }

    /// Waits until everything queued before this call has been applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(tx)).await.is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Snapshot of the mirror's state.
    pub fn status(&self) -> PersistenceStatus {
        self.shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn enqueue(&self, op: PersistOp) {
        match self.tx.try_send(op) {
            Ok(()) => self.shared.update(|s| s.enqueued += 1),
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "persistence queue full",
                    mpsc::error::TrySendError::Closed(_) => "persistence writer stopped",
                };
                warn!("Dropping persistence operation: {}", reason);
                self.shared.update(|s| {
                    s.dropped += 1;
                    s.last_sync_error = Some(reason.to_string());
                });
            }
        }
    }
}

// == Persistence Adapter ==
/// Loads persisted entries and runs the writer for a backend.
#[derive(Clone)]
pub struct PersistenceAdapter {
    backend: Arc<dyn PersistenceBackend>,
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl PersistenceAdapter {
    pub fn new(backend: impl PersistenceBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self { backend }
    }

    /// Builds the adapter selected by configuration, or None when disabled.
    pub fn from_kind(kind: PersistenceKind, path: &Path) -> Result<Option<Self>> {
        let adapter = match kind {
            PersistenceKind::None => return Ok(None),
            PersistenceKind::Memory => Self::new(MemoryBackend::new()),
            PersistenceKind::File => Self::new(FileBackend::open(path)?),
            PersistenceKind::Sqlite => Self::new(SqliteBackend::open(path)?),
        };
        Ok(Some(adapter))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // == Load ==
    /// Reads every persisted entry still live at `now`.
    ///
    /// Corrupt records are skipped; an unreadable backend yields an empty map.
    pub fn load(&self, now: u64) -> HashMap<String, CacheEntry> {
        let bodies = match self.backend.load_all() {
            Ok(bodies) => bodies,
            Err(e) => {
                warn!(
                    "Persistence backend '{}' unavailable, starting cold: {}",
                    self.backend.name(),
                    e
                );
                return HashMap::new();
            }
        };

        let mut entries = HashMap::new();
        let (mut corrupt, mut expired) = (0usize, 0usize);
        for body in bodies {
            let entry = match PersistedRecord::from_json(&body) {
                Ok(record) => record.into_entry(),
                Err(e) => {
                    warn!("Skipping corrupt persisted record: {}", e);
                    corrupt += 1;
                    continue;
                }
            };
            if entry.is_expired(now) {
                expired += 1;
                continue;
            }
            entries.insert(entry.key.clone(), entry);
        }

        info!(
            "Loaded {} persisted entries from '{}' ({} corrupt, {} expired skipped)",
            entries.len(),
            self.backend.name(),
            corrupt,
            expired
        );
        entries
    }

    // == Writer ==
    /// Starts the writer task with a queue of `capacity` operations.
    ///
    /// The task ends once every handle has been dropped.
    pub fn spawn_writer(&self, capacity: usize) -> (PersistenceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(Shared::default());
        shared.update(|s| s.backend = self.backend.name().to_string());

        let handle = PersistenceHandle {
            tx,
            shared: shared.clone(),
        };
        let task = tokio::spawn(run_writer(self.backend.clone(), rx, shared));
        (handle, task)
    }
}

// == Writer Task ==
#[derive(Debug)]
enum KeyOp {
    Save { version: u64, body: String },
    Remove { version: u64 },
}

impl KeyOp {
    fn version(&self) -> u64 {
        match self {
            KeyOp::Save { version, .. } | KeyOp::Remove { version } => *version,
        }
    }
}

#[derive(Debug, Default)]
struct WritePlan {
    clear: bool,
    ops: HashMap<String, KeyOp>,
    superseded: u64,
}

impl WritePlan {
    fn push(&mut self, key: String, op: KeyOp) {
        match self.ops.get(&key) {
            Some(existing) if existing.version() > op.version() => self.superseded += 1,
            Some(_) => {
                self.superseded += 1;
                self.ops.insert(key, op);
            }
            None => {
                self.ops.insert(key, op);
            }
        }
    }

    fn len(&self) -> usize {
        self.ops.len() + usize::from(self.clear)
    }
}

#[derive(Debug, Default)]
struct WriteOutcome {
    applied: u64,
    errors: Vec<String>,
}

async fn run_writer(
    backend: Arc<dyn PersistenceBackend>,
    mut rx: mpsc::Receiver<PersistOp>,
    shared: Arc<Shared>,
) {
    debug!("Persistence writer started for '{}'", backend.name());

    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(op) => batch.push(op),
                Err(_) => break,
            }
        }

        let mut plan = WritePlan::default();
        let mut waiters = Vec::new();
        for op in batch {
            match op {
                PersistOp::Save { version, key, body } => {
                    plan.push(key, KeyOp::Save { version, body })
                }
                PersistOp::Remove { version, key } => plan.push(key, KeyOp::Remove { version }),
                PersistOp::Clear { .. } => {
                    plan.superseded += plan.ops.len() as u64;
                    plan.ops.clear();
                    plan.clear = true;
                }
                PersistOp::Flush(waiter) => waiters.push(waiter),
            }
        }

        let superseded = plan.superseded;
        let outcome = if plan.len() == 0 {
            WriteOutcome::default()
        } else {
            let backend = backend.clone();
            match tokio::task::spawn_blocking(move || apply_plan(backend.as_ref(), plan)).await {
                Ok(outcome) => outcome,
                Err(e) => WriteOutcome {
                    applied: 0,
                    errors: vec![format!("persistence batch panicked: {}", e)],
                },
            }
        };

        shared.update(|s| {
            s.applied += outcome.applied;
            s.superseded += superseded;
            s.failed += outcome.errors.len() as u64;
            if let Some(last) = outcome.errors.last() {
                s.last_sync_error = Some(last.clone());
            } else if outcome.applied > 0 {
                s.last_sync_error = None;
            }
        });

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    debug!("Persistence writer stopped for '{}'", backend.name());
}

fn apply_plan(backend: &dyn PersistenceBackend, plan: WritePlan) -> WriteOutcome {
    let mut outcome = WriteOutcome::default();
    let mut record = |result: Result<()>, what: &str| match result {
        Ok(()) => outcome.applied += 1,
        Err(e) => {
            warn!("Persistence {} failed: {}", what, e);
            outcome.errors.push(e.to_string());
        }
    };

    if plan.clear {
        record(backend.clear(), "clear");
    }

    let mut ops: Vec<(String, KeyOp)> = plan.ops.into_iter().collect();
    ops.sort_by_key(|(_, op)| op.version());
    for (key, op) in ops {
        match op {
            KeyOp::Save { body, .. } => record(backend.save(&key, &body), "save"),
            KeyOp::Remove { .. } => record(backend.remove(&key), "remove"),
        }
    }

    outcome
}

/// Unique scratch directory for tests that touch the filesystem.
#[cfg(test)]
pub(crate) fn test_dir(label: &str) -> std::path::PathBuf {
    use std::sync::atomic::AtomicUsize;
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let dir = std::env::temp_dir().join(format!(
        "dash_cache-{}-{}-{}-{}",
        label,
        std::process::id(),
        crate::cache::current_timestamp_ms(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
