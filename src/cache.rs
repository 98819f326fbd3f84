//! Latest-snapshot and token cache
//!
//! Both slots are replaced by swapping an `Arc`, never mutated in place, so
//! a reader holds either the old value or the new one in full.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{CachedToken, DashboardSnapshot};

#[derive(Default)]
pub struct SnapshotCache {
    snapshot: ArcSwapOption<DashboardSnapshot>,
    token: ArcSwapOption<CachedToken>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot
    pub fn publish(&self, snapshot: Arc<DashboardSnapshot>) {
        self.snapshot.store(Some(snapshot));
    }

    /// Latest published snapshot; `None` until the first successful build
    pub fn current(&self) -> Option<Arc<DashboardSnapshot>> {
        self.snapshot.load_full()
    }

    /// Token if it is still inside its validity window at `now`
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<Arc<CachedToken>> {
        self.token
            .load_full()
            .filter(|token| token.is_valid_at(now))
    }

    pub fn store_token(&self, token: CachedToken) {
        self.token.store(Some(Arc::new(token)));
    }

    pub fn clear_token(&self) {
        self.token.store(None);
    }
}
