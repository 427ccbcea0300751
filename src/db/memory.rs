//! In-memory subscriber store.
//!
//! Used when persistence is explicitly disabled and as the store double in
//! tests. Availability can be toggled to simulate an outage, and writes can
//! be slowed down to simulate a busy server.

use super::{StoreError, SubscriberStore};
use crate::state::SubscriberId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeSet<SubscriberId>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
    write_delay: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, as if the rows were left by an earlier run.
    pub fn with_rows<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SubscriberId>,
    {
        let store = Self::new();
        store.rows.lock().extend(ids.into_iter().map(Into::into));
        store
    }

    /// While unavailable every operation fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make every `save_all`/`delete` take at least `delay`.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    /// Number of successful `save_all`/`delete` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current rows, bypassing the availability switch.
    pub fn rows(&self) -> Vec<SubscriberId> {
        self.rows.lock().iter().cloned().collect()
    }

    async fn delay_write(&self) {
        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn load_all(&self) -> Result<Vec<SubscriberId>, StoreError> {
        self.check_available()?;
        Ok(self.rows())
    }

    async fn save_all(&self, ids: &[SubscriberId]) -> Result<(), StoreError> {
        self.delay_write().await;
        self.check_available()?;
        self.rows.lock().extend(ids.iter().cloned());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: &SubscriberId) -> Result<(), StoreError> {
        self.delay_write().await;
        self.check_available()?;
        self.rows.lock().remove(id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
