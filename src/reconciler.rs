//! Keeps the local store, the offline queue and the backend in step.
//!
//! Network failures never leave this module as errors: they are recorded
//! as a [`SyncStatus`] (plus the last error message) and the push is queued.
//! Only local storage failures propagate to the caller.

use crate::backend::{AccessStatus, SyncBackend};
use crate::config::SyncConfig;
use crate::error::{StorageError, SyncError};
use crate::model::{UserSnapshot, UserState};
use crate::queue::SyncQueue;
use crate::storage::{load_queue, load_state, save_queue, save_state, LocalStore};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
    Offline,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
            SyncStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Backend accepted the push; carries the authoritative state if it sent one.
    Synced(Option<UserState>),
    Queued,
    Rejected(String),
    /// No backend configured; the state was only written locally.
    LocalOnly,
}

/// What the backend reported awarding for the last accepted push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerAward {
    pub xp_added: Option<i64>,
    pub streak_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub replayed: usize,
    /// Items the backend refused; they are dropped, not retried.
    pub rejected: usize,
    pub remaining: usize,
    pub replayed_owners: Vec<i64>,
    /// Server state returned for each replayed owner, latest reply wins.
    pub server_states: BTreeMap<i64, UserState>,
}

pub struct Reconciler<B, S> {
    backend: Option<B>,
    store: S,
    queue: SyncQueue,
    status: SyncStatus,
    online: bool,
    last_error: Option<String>,
    last_award: Option<ServerAward>,
}

impl<B: SyncBackend, S: LocalStore> Reconciler<B, S> {
    pub fn new(backend: Option<B>, store: S, config: &SyncConfig, online: bool) -> Result<Self, StorageError> {
        let items = load_queue(&store)?;
        let queue = SyncQueue::from_items(items, config.queue_max_items, config.queue_retention_days);
        Ok(Self {
            backend,
            store,
            queue,
            status: if online { SyncStatus::Idle } else { SyncStatus::Offline },
            online,
            last_error: None,
            last_award: None,
        })
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn last_award(&self) -> Option<ServerAward> {
        self.last_award
    }

    #[cfg(test)]
    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn set_status(&mut self, status: SyncStatus) {
        if self.status != status {
            log::info!("sync status {} -> {}", self.status.as_str(), status.as_str());
            self.status = status;
        }
    }

    fn fail(&mut self, status: SyncStatus, err: &SyncError) {
        log::warn!("sync failed: {}", err);
        self.last_error = Some(err.to_string());
        self.set_status(status);
    }

    pub fn load_local(&self) -> Result<Option<UserSnapshot>, StorageError> {
        load_state(&self.store)
    }

    pub fn persist_local(&mut self, state: &UserState) -> Result<(), StorageError> {
        save_state(&mut self.store, state)
    }

    fn persist_queue(&mut self) -> Result<(), StorageError> {
        save_queue(&mut self.store, self.queue.items())
    }

    fn enqueue(&mut self, state: &UserState, now_ms: i64, err: SyncError) -> Result<PushOutcome, StorageError> {
        let status = if err == SyncError::Offline {
            SyncStatus::Offline
        } else {
            SyncStatus::Error
        };
        self.fail(status, &err);
        self.queue.enqueue(state.id, state.clone(), now_ms);
        self.persist_queue()?;
        log::info!("queued sync for user {} ({} pending)", state.id, self.queue.len());
        Ok(PushOutcome::Queued)
    }

    /// Writes `state` locally, then pushes it. Offline clients and network
    /// failures queue the snapshot for replay. A backend that answers with
    /// `success: false` is not retried. An accepted push supersedes the
    /// owner's queued snapshot.
    pub fn push(&mut self, state: &UserState, now_ms: i64) -> Result<PushOutcome, StorageError> {
        self.persist_local(state)?;

        if self.backend.is_none() {
            return Ok(PushOutcome::LocalOnly);
        }
        if !self.online {
            return self.enqueue(state, now_ms, SyncError::Offline);
        }

        self.set_status(SyncStatus::Syncing);
        let result = match self.backend.as_ref() {
            Some(backend) => backend.push_sync(state.id, state),
            None => return Ok(PushOutcome::LocalOnly),
        };

        match result {
            Ok(response) if response.success => {
                self.last_error = None;
                self.set_status(SyncStatus::Success);
                self.last_award = Some(ServerAward {
                    xp_added: response.xp_added,
                    streak_multiplier: response.streak_multiplier,
                })
                .filter(|a| a.xp_added.is_some() || a.streak_multiplier.is_some());
                if self.queue.remove_owner(state.id) {
                    self.persist_queue()?;
                }
                if let Some(data) = response.data.as_ref() {
                    self.persist_local(data)?;
                }
                Ok(PushOutcome::Synced(response.data))
            }
            Ok(response) => {
                let message = response.error.unwrap_or_else(|| "unknown error".to_string());
                self.fail(SyncStatus::Error, &SyncError::Rejected(message.clone()));
                Ok(PushOutcome::Rejected(message))
            }
            Err(SyncError::Rejected(message)) => {
                self.fail(SyncStatus::Error, &SyncError::Rejected(message.clone()));
                Ok(PushOutcome::Rejected(message))
            }
            Err(e) => self.enqueue(state, now_ms, e),
        }
    }

    /// Replays the queue in enqueue order. Items the backend accepts or
    /// rejects are dropped; network failures stay queued. Expired items are
    /// pruned even offline.
    pub fn replay_queue(&mut self, now_ms: i64) -> Result<ReplayReport, StorageError> {
        let mut report = ReplayReport::default();
        if self.queue.prune_expired(now_ms) > 0 {
            log::info!("dropped expired queued syncs");
            self.persist_queue()?;
        }
        if !self.online {
            self.set_status(SyncStatus::Offline);
            report.remaining = self.queue.len();
            return Ok(report);
        }
        let backend = match self.backend.as_ref() {
            Some(b) => b,
            None => {
                report.remaining = self.queue.len();
                return Ok(report);
            }
        };
        if self.queue.is_empty() {
            return Ok(report);
        }

        let mut server_states = BTreeMap::new();
        let mut owners = Vec::new();
        let mut rejected = 0usize;
        let mut last_err: Option<SyncError> = None;
        let processed = self.queue.process_queue(now_ms, |item| {
            let refusal = match backend.push_sync(item.owner_id, &item.payload) {
                Ok(resp) if resp.success => {
                    owners.push(item.owner_id);
                    if let Some(data) = resp.data {
                        server_states.insert(item.owner_id, data);
                    }
                    return Ok(());
                }
                Ok(resp) => resp.error.unwrap_or_else(|| "unknown error".to_string()),
                Err(SyncError::Rejected(message)) => message,
                Err(e) => {
                    last_err = Some(e.clone());
                    return Err(e);
                }
            };
            let err = SyncError::Rejected(refusal);
            log::warn!("dropping queued sync for user {}: {}", item.owner_id, err);
            rejected += 1;
            last_err = Some(err);
            Ok(())
        });

        report.replayed = processed - rejected;
        report.rejected = rejected;
        report.remaining = self.queue.len();
        report.replayed_owners = owners;
        report.server_states = server_states;
        self.persist_queue()?;

        match last_err {
            Some(e) => self.fail(SyncStatus::Error, &e),
            None if report.replayed > 0 => {
                self.last_error = None;
                self.set_status(SyncStatus::Success);
            }
            None => {}
        }
        if processed > 0 || report.remaining > 0 {
            log::info!(
                "replayed {} queued sync(s), {} rejected, {} remaining",
                report.replayed,
                rejected,
                report.remaining
            );
        }
        Ok(report)
    }

    /// Going online replays the queue; going offline only flips the status.
    pub fn set_online(&mut self, online: bool, now_ms: i64) -> Result<Option<ReplayReport>, StorageError> {
        let was_online = self.online;
        self.online = online;
        if !online {
            self.set_status(SyncStatus::Offline);
            return Ok(None);
        }
        if was_online {
            return Ok(None);
        }
        log::info!("back online");
        self.set_status(SyncStatus::Idle);
        self.replay_queue(now_ms).map(Some)
    }

    pub fn fetch_server(&mut self, user_id: i64) -> Option<UserSnapshot> {
        if self.backend.is_none() {
            return None;
        }
        if !self.online {
            self.set_status(SyncStatus::Offline);
            return None;
        }
        self.set_status(SyncStatus::Syncing);
        let result = self.backend.as_ref().map(|b| b.fetch_full(user_id));
        match result {
            Some(Ok(snapshot)) => {
                self.last_error = None;
                self.set_status(SyncStatus::Success);
                Some(snapshot)
            }
            Some(Err(e)) => {
                self.fail(SyncStatus::Error, &e);
                None
            }
            None => None,
        }
    }

    pub fn check_access(&mut self, user_id: i64) -> Option<AccessStatus> {
        if !self.online {
            self.set_status(SyncStatus::Offline);
            return None;
        }
        let result = self.backend.as_ref().map(|b| b.fetch_access(user_id))?;
        match result {
            Ok(access) => Some(access),
            Err(e) => {
                self.fail(SyncStatus::Error, &e);
                None
            }
        }
    }
}
