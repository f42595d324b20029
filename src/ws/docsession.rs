use loro::{ExportMode, LoroDoc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::lorodoc::{canonical_to_loro, loro_to_canonical};
use crate::models::{BroadcastMessage, CanonicalDoc};
use crate::state::AppState;
use crate::ws::presence::PresenceEntry;

const BROADCAST_CAPACITY: usize = 256;

/// Lifecycle of a document session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Active,
    Closing,
}

/// Connection and save statistics for one session.
pub struct SessionStats {
    pub connections: usize,
    pub dirty: bool,
}

/// All live state for one open document. At most one of these exists per
/// document id per process; every mutation goes through the inner mutex, so
/// updates apply under a single-writer discipline.
pub struct DocSession {
    pub doc_id: String,
    pub broadcast: broadcast::Sender<BroadcastMessage>,
    loaded: OnceCell<()>,
    pub(crate) inner: Mutex<DocSessionInner>,
}

pub(crate) struct DocSessionInner {
    pub doc: LoroDoc,
    pub state: SessionState,
    pub connections: HashSet<Uuid>,
    pub presence: HashMap<Uuid, PresenceEntry>,
    pub dirty: bool,
    pub edit_seq: u64,
    pub saved_seq: u64,
    pub first_dirty_at: Option<Instant>,
    pub save_task: Option<JoinHandle<()>>,
}

impl DocSession {
    pub fn new(doc_id: String) -> Arc<Self> {
        let (broadcast, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(Self {
            doc_id,
            broadcast,
            loaded: OnceCell::new(),
            inner: Mutex::new(DocSessionInner {
                doc: LoroDoc::new(),
                state: SessionState::Loading,
                connections: HashSet::new(),
                presence: HashMap::new(),
                dirty: false,
                edit_seq: 0,
                saved_seq: 0,
                first_dirty_at: None,
                save_task: None,
            }),
        })
    }

    /// Run the one-time load for this session. Every attaching connection
    /// awaits the same load; it runs outside the mutation lock so the
    /// per-document critical section never spans network I/O. A store failure
    /// degrades to an empty document rather than failing the session.
    pub async fn ensure_loaded(self: &Arc<Self>, state: &Arc<AppState>) {
        self.loaded
            .get_or_init(|| async {
                match state.store.load_document(&self.doc_id).await {
                    Ok(Some(canonical)) => {
                        self.seed_from_canonical(&canonical).await;
                        info!("Loaded stored content for document {}", self.doc_id);
                    }
                    Ok(None) => {
                        info!("No stored content for document {}, starting empty", self.doc_id);
                    }
                    Err(e) => {
                        warn!("Load failed for document {}, starting empty: {}", self.doc_id, e);
                    }
                }
                let mut guard = self.inner.lock().await;
                guard.state = SessionState::Active;
            })
            .await;
    }

    async fn seed_from_canonical(&self, canonical: &CanonicalDoc) {
        let seeded = canonical_to_loro(canonical);
        match seeded.export(ExportMode::Snapshot) {
            Ok(snapshot) => {
                let guard = self.inner.lock().await;
                if let Err(e) = guard.doc.import(&snapshot) {
                    warn!("Failed to seed document {}: {}", self.doc_id, e);
                }
            }
            Err(e) => {
                warn!("Failed to export seed snapshot for document {}: {}", self.doc_id, e);
            }
        }
    }

    /// Import one binary update into the shared state and mark the session
    /// dirty. A malformed payload is rejected without touching the document.
    pub(crate) async fn import_update(&self, delta: &[u8]) -> Result<(), String> {
        let mut guard = self.inner.lock().await;
        guard
            .doc
            .import(delta)
            .map_err(|e| format!("Malformed update payload: {}", e))?;
        guard.dirty = true;
        guard.edit_seq += 1;
        if guard.first_dirty_at.is_none() {
            guard.first_dirty_at = Some(Instant::now());
        }
        Ok(())
    }

    /// (Re)start the trailing debounce timer for this session's save. The
    /// window restarts on every edit but the deadline never moves past
    /// `save_max_wait` from the first unsaved edit, so a continuously edited
    /// document is never starved of saves.
    pub(crate) async fn schedule_save(self: &Arc<Self>, state: &Arc<AppState>) {
        let mut guard = self.inner.lock().await;
        if let Some(task) = guard.save_task.take() {
            task.abort();
        }
        let deadline = save_deadline(
            Instant::now(),
            guard.first_dirty_at,
            state.config.save_debounce(),
            state.config.save_max_wait(),
        );
        let session = self.clone();
        let state = state.clone();
        guard.save_task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            session.perform_save(&state).await;
        }));
    }

    /// Convert the live state to canonical form and write it to the store.
    /// One outbound write per invocation; a failure leaves the dirty flag set
    /// so the next edit schedules another attempt.
    pub async fn perform_save(&self, state: &Arc<AppState>) {
        let (canonical, seq) = {
            let mut guard = self.inner.lock().await;
            guard.save_task = None;
            if !guard.dirty {
                return;
            }
            let canonical = match loro_to_canonical(&guard.doc) {
                Ok(canonical) => canonical,
                Err(e) => {
                    warn!("Save skipped for document {}: {}", self.doc_id, e);
                    return;
                }
            };
            (canonical, guard.edit_seq)
        };

        match state.store.save_document(&self.doc_id, &canonical).await {
            Ok(()) => {
                let mut guard = self.inner.lock().await;
                guard.saved_seq = seq;
                if guard.edit_seq == seq {
                    guard.dirty = false;
                    guard.first_dirty_at = None;
                }
            }
            Err(e) => {
                warn!(
                    "Save failed for document {}, will retry on next edit: {}",
                    self.doc_id, e
                );
            }
        }
    }

    /// Cancel any pending timer and save synchronously. Used on graceful
    /// shutdown and when the last connection detaches.
    pub async fn flush(&self, state: &Arc<AppState>) {
        {
            let mut guard = self.inner.lock().await;
            if let Some(task) = guard.save_task.take() {
                task.abort();
            }
        }
        self.perform_save(state).await;
    }

    /// Relay a serialized message to every attached connection except the
    /// origin (the send loops skip their own sender id).
    pub fn relay(&self, sender_id: &Uuid, content: String) {
        let _ = self.broadcast.send(BroadcastMessage {
            sender_id: sender_id.to_string(),
            content,
        });
    }

    pub async fn export_snapshot(&self) -> Result<Vec<u8>, String> {
        let guard = self.inner.lock().await;
        guard
            .doc
            .export(ExportMode::Snapshot)
            .map_err(|e| format!("Failed to export snapshot: {}", e))
    }

    pub async fn canonical(&self) -> Result<CanonicalDoc, String> {
        let guard = self.inner.lock().await;
        loro_to_canonical(&guard.doc)
    }

    pub async fn session_state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn stats(&self) -> SessionStats {
        let guard = self.inner.lock().await;
        SessionStats {
            connections: guard.connections.len(),
            dirty: guard.dirty,
        }
    }
}

/// Deadline for the next save: the trailing debounce window, capped at
/// `max_wait` after the first unsaved edit.
pub(crate) fn save_deadline(
    now: Instant,
    first_dirty_at: Option<Instant>,
    debounce: Duration,
    max_wait: Duration,
) -> Instant {
    let debounced = now + debounce;
    match first_dirty_at {
        Some(first_dirty) => debounced.min(first_dirty + max_wait),
        None => debounced,
    }
}
