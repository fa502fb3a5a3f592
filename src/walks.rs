//! Walk submission client: where finished walks are handed off.

use std::future::Future;

use anyhow::Result;

use crate::db::{Database, NewWalk, WalkRecord};

pub trait WalkClient: Send + Sync + 'static {
    fn create(&self, walk: NewWalk) -> impl Future<Output = Result<WalkRecord>> + Send;

    fn update(
        &self,
        walk_id: String,
        walk: NewWalk,
    ) -> impl Future<Output = Result<WalkRecord>> + Send;

    fn delete(&self, walk_id: String) -> impl Future<Output = Result<()>> + Send;

    fn list_by_pet(&self, pet_id: String) -> impl Future<Output = Result<Vec<WalkRecord>>> + Send;
}

impl WalkClient for Database {
    async fn create(&self, walk: NewWalk) -> Result<WalkRecord> {
        self.insert_walk(&walk).await
    }

    async fn update(&self, walk_id: String, walk: NewWalk) -> Result<WalkRecord> {
        self.update_walk(&walk_id, &walk).await
    }

    async fn delete(&self, walk_id: String) -> Result<()> {
        self.delete_walk(&walk_id).await
    }

    async fn list_by_pet(&self, pet_id: String) -> Result<Vec<WalkRecord>> {
        self.list_walks_for_pet(&pet_id).await
    }
}

#[cfg(test)]
pub use flaky::FlakyWalkClient;

#[cfg(test)]
mod flaky {
    use super::*;
    use anyhow::anyhow;
    use std::{
        sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
        time::Duration,
    };

    /// Fails the next `n` creates with a simulated network error, optionally
    /// after a delay.
    pub struct FlakyWalkClient {
        inner: Database,
        failures_left: AtomicU32,
        delay_ms: AtomicU64,
        pub create_calls: AtomicUsize,
    }

    impl FlakyWalkClient {
        pub fn new(inner: Database, failures: u32) -> Self {
            Self {
                inner,
                failures_left: AtomicU32::new(failures),
                delay_ms: AtomicU64::new(0),
                create_calls: AtomicUsize::new(0),
            }
        }

        pub fn fail_next(&self, failures: u32) {
            self.failures_left.store(failures, Ordering::SeqCst);
        }

        pub fn set_delay(&self, delay: Duration) {
            self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl WalkClient for FlakyWalkClient {
        async fn create(&self, walk: NewWalk) -> Result<WalkRecord> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let should_fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(anyhow!("simulated network error"));
            }
            self.inner.create(walk).await
        }

        async fn update(&self, walk_id: String, walk: NewWalk) -> Result<WalkRecord> {
            self.inner.update(walk_id, walk).await
        }

        async fn delete(&self, walk_id: String) -> Result<()> {
            self.inner.delete(walk_id).await
        }

        async fn list_by_pet(&self, pet_id: String) -> Result<Vec<WalkRecord>> {
            self.inner.list_by_pet(pet_id).await
        }
    }
}
