//! Subscriber registry.
//!
//! In-memory cache of the subscriber store. Two locks cooperate:
//! - `write_gate` (async) serializes `add`/`remove`, including their store
//!   round-trip, so the order of writes reaching the store matches the order
//!   of mutations in memory.
//! - `members` (sync) guards the container itself and is only ever held for
//!   a push/remove/clone, so broadcast snapshots never wait on store I/O.
//!
//! A mutation whose store write fails is undone in memory before the gate is
//! released; memory and store never disagree once a call has returned.
//!
//! Each mutation runs on its own task holding the gate, so a caller that is
//! dropped mid-write (shutdown, timeout) cannot leave memory ahead of or
//! behind the store. The write finishes and the next mutation waits for it.

use crate::db::{StoreError, SubscriberStore};
use crate::state::SubscriberId;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a successful [`SubscriberRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The identity was not registered before.
    Added,
    /// The identity was already registered; the full set was re-persisted.
    AlreadyRegistered,
}

type Members = Arc<RwLock<Vec<SubscriberId>>>;

pub struct SubscriberRegistry {
    members: Members,
    write_gate: Arc<Mutex<()>>,
    store: Arc<dyn SubscriberStore>,
}

impl SubscriberRegistry {
    /// Create a registry over `store` seeded with `initial` (duplicates dropped,
    /// first occurrence wins).
    pub fn new(store: Arc<dyn SubscriberStore>, initial: Vec<SubscriberId>) -> Self {
        let mut members: Vec<SubscriberId> = Vec::with_capacity(initial.len());
        for id in initial {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        crate::metrics::set_subscribers(members.len());

        Self {
            members: Arc::new(RwLock::new(members)),
            write_gate: Arc::new(Mutex::new(())),
            store,
        }
    }

    /// Load the registry from the store.
    ///
    /// An unreachable store is not fatal: the registry starts empty and the
    /// next successful registration rewrites the store.
    pub async fn load(store: Arc<dyn SubscriberStore>) -> Self {
        let initial = match store.load_all().await {
            Ok(ids) => {
                info!(count = ids.len(), backend = store.backend(), "Loaded subscribers from store");
                ids
            }
            Err(e) => {
                warn!(error = %e, backend = store.backend(), "Failed to load subscribers, starting empty");
                Vec::new()
            }
        };
        Self::new(store, initial)
    }

    /// Register `id` and persist the full current set.
    ///
    /// On store failure a newly inserted identity is rolled back out of memory
    /// and the error is returned for the caller to report.
    pub async fn add(&self, id: SubscriberId) -> Result<AddOutcome, StoreError> {
        let gate = Arc::clone(&self.write_gate).lock_owned().await;
        let members = Arc::clone(&self.members);
        let store = Arc::clone(&self.store);

        join_write(tokio::spawn(async move {
            let _gate = gate;
            add_locked(&members, store.as_ref(), id).await
        }))
        .await
    }

    /// Unregister `id`.
    ///
    /// Returns `Ok(false)` without touching the store if `id` is not
    /// registered. On store failure the identity is restored at its previous
    /// position.
    pub async fn remove(&self, id: &SubscriberId) -> Result<bool, StoreError> {
        let gate = Arc::clone(&self.write_gate).lock_owned().await;
        let members = Arc::clone(&self.members);
        let store = Arc::clone(&self.store);
        let id = id.clone();

        join_write(tokio::spawn(async move {
            let _gate = gate;
            remove_locked(&members, store.as_ref(), id).await
        }))
        .await
    }

    /// Snapshot of the in-memory set, in registration order.
    pub fn list_live(&self) -> Vec<SubscriberId> {
        self.members.read().clone()
    }

    /// Re-read the store, bypassing the cache.
    pub async fn list_persisted(&self) -> Result<Vec<SubscriberId>, StoreError> {
        self.store.load_all().await
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.members.read().contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

async fn join_write<T>(write: JoinHandle<Result<T, StoreError>>) -> Result<T, StoreError> {
    match write.await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Subscriber write task failed");
            Err(StoreError::Interrupted(e.to_string()))
        }
    }
}

async fn add_locked(
    members: &RwLock<Vec<SubscriberId>>,
    store: &dyn SubscriberStore,
    id: SubscriberId,
) -> Result<AddOutcome, StoreError> {
    let (snapshot, inserted) = {
        let mut members = members.write();
        let inserted = !members.contains(&id);
        if inserted {
            members.push(id.clone());
        }
        (members.clone(), inserted)
    };

    match store.save_all(&snapshot).await {
        Ok(()) => {
            crate::metrics::set_subscribers(snapshot.len());
            if inserted {
                info!(subscriber = %id, total = snapshot.len(), "Subscriber registered");
                Ok(AddOutcome::Added)
            } else {
                debug!(subscriber = %id, "Subscriber already registered");
                Ok(AddOutcome::AlreadyRegistered)
            }
        }
        Err(e) => {
            if inserted {
                members.write().retain(|m| m != &id);
            }
            warn!(subscriber = %id, error = %e, code = e.code(), "Failed to persist registration");
            Err(e)
        }
    }
}

async fn remove_locked(
    members: &RwLock<Vec<SubscriberId>>,
    store: &dyn SubscriberStore,
    id: SubscriberId,
) -> Result<bool, StoreError> {
    let position = {
        let mut members = members.write();
        match members.iter().position(|m| m == &id) {
            Some(pos) => {
                members.remove(pos);
                pos
            }
            None => return Ok(false),
        }
    };

    match store.delete(&id).await {
        Ok(()) => {
            let total = members.read().len();
            crate::metrics::set_subscribers(total);
            info!(subscriber = %id, total, "Subscriber removed");
            Ok(true)
        }
        Err(e) => {
            let mut members = members.write();
            let pos = position.min(members.len());
            members.insert(pos, id.clone());
            warn!(subscriber = %id, error = %e, code = e.code(), "Failed to persist removal");
            Err(e)
        }
    }
}
