// Storage contracts for draft state and captain priority lists, plus
// in-memory implementations used by tests and single-process deployments.
//
// All draft-state writes are compare-and-swap on a version counter. A
// writer reads a `Versioned` snapshot, computes the successor state, and
// commits against the version it read; a `Conflict` means someone else
// committed first and the writer must re-read.

use crate::draft::player::{PlayerId, TeamId};
use crate::draft::state::DraftState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("draft `{0}` not found")]
    NotFound(String),

    #[error("draft `{0}` already exists")]
    AlreadyExists(String),

    #[error("stale write to draft `{draft_id}`: expected version {expected}, found {found}")]
    Conflict {
        draft_id: String,
        expected: u64,
        found: u64,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A draft state snapshot plus the version token to commit against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub state: T,
}

/// Versioned draft-state storage with change notifications.
#[async_trait]
pub trait DraftStateStore: Send + Sync {
    async fn get(&self, draft_id: &str) -> Result<Versioned<DraftState>, StoreError>;

    /// Create a draft at version 1. Fails if the id is taken.
    async fn create(&self, draft_id: &str, state: DraftState) -> Result<Versioned<DraftState>, StoreError>;

    /// Commit `state` if the stored version still equals
    /// `expected_version`; returns the new snapshot on success and
    /// [`StoreError::Conflict`] if another writer got there first.
    async fn compare_and_update(
        &self,
        draft_id: &str,
        expected_version: u64,
        state: DraftState,
    ) -> Result<Versioned<DraftState>, StoreError>;

    /// Subscribe to committed snapshots of one draft. Receivers that fall
    /// behind observe `Lagged` and should re-read via [`get`](Self::get).
    fn subscribe(&self, draft_id: &str) -> broadcast::Receiver<Versioned<DraftState>>;
}

/// Read access to captains' ordered wishlists. A missing list is an empty
/// list, not an error.
#[async_trait]
pub trait PriorityListStore: Send + Sync {
    async fn get(&self, team_id: TeamId) -> Result<Vec<PlayerId>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<String, Versioned<DraftState>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<Versioned<DraftState>>>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, draft_id: &str) -> broadcast::Sender<Versioned<DraftState>> {
        let mut channels = lock_unpoisoned(&self.channels);
        channels
            .entry(draft_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl DraftStateStore for MemoryDraftStore {
    async fn get(&self, draft_id: &str) -> Result<Versioned<DraftState>, StoreError> {
        let drafts = lock_unpoisoned(&self.drafts);
        drafts
            .get(draft_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(draft_id.to_string()))
    }

    async fn create(
        &self,
        draft_id: &str,
        state: DraftState,
    ) -> Result<Versioned<DraftState>, StoreError> {
        let snapshot = {
            let mut drafts = lock_unpoisoned(&self.drafts);
            if drafts.contains_key(draft_id) {
                return Err(StoreError::AlreadyExists(draft_id.to_string()));
            }
            let snapshot = Versioned { version: 1, state };
            drafts.insert(draft_id.to_string(), snapshot.clone());
            snapshot
        };
        // Send fails only when nobody is subscribed yet.
        let _ = self.sender_for(draft_id).send(snapshot.clone());
        Ok(snapshot)
    }

    async fn compare_and_update(
        &self,
        draft_id: &str,
        expected_version: u64,
        state: DraftState,
    ) -> Result<Versioned<DraftState>, StoreError> {
        let snapshot = {
            let mut drafts = lock_unpoisoned(&self.drafts);
            let current = drafts
                .get_mut(draft_id)
                .ok_or_else(|| StoreError::NotFound(draft_id.to_string()))?;
            if current.version != expected_version {
                return Err(StoreError::Conflict {
                    draft_id: draft_id.to_string(),
                    expected: expected_version,
                    found: current.version,
                });
            }
            *current = Versioned {
                version: expected_version + 1,
                state,
            };
            current.clone()
        };
        let _ = self.sender_for(draft_id).send(snapshot.clone());
        Ok(snapshot)
    }

    fn subscribe(&self, draft_id: &str) -> broadcast::Receiver<Versioned<DraftState>> {
        self.sender_for(draft_id).subscribe()
    }
}

#[derive(Default)]
pub struct MemoryPriorityListStore {
    lists: Mutex<HashMap<TeamId, Vec<PlayerId>>>,
}

impl MemoryPriorityListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, team_id: TeamId, players: Vec<PlayerId>) {
        let mut lists = lock_unpoisoned(&self.lists);
        lists.insert(team_id, players);
    }
}

#[async_trait]
impl PriorityListStore for MemoryPriorityListStore {
    async fn get(&self, team_id: TeamId) -> Result<Vec<PlayerId>, StoreError> {
        let lists = lock_unpoisoned(&self.lists);
        Ok(lists.get(&team_id).cloned().unwrap_or_default())
    }
}

/// A poisoned lock means a writer panicked mid-update; the guarded maps
/// are updated atomically per entry, so the data is still usable.
fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::state::PickSlot;
    use std::collections::BTreeMap;

    fn state(pick_index: usize) -> DraftState {
        DraftState {
            teams: vec![],
            pick_order: vec![PickSlot::Team { team_id: 1 }, PickSlot::Team { team_id: 2 }],
            available_players: vec![],
            completed_picks: BTreeMap::new(),
            current_pick_index: pick_index,
            pick_ends_at: None,
            active_timer_task: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryDraftStore::new();
        let created = store.create("d1", state(0)).await.unwrap();
        assert_eq!(created.version, 1);
        let fetched = store.get("d1").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryDraftStore::new();
        store.create("d1", state(0)).await.unwrap();
        assert!(matches!(
            store.create("d1", state(0)).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_draft() {
        let store = MemoryDraftStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cas_commits_and_bumps_version() {
        let store = MemoryDraftStore::new();
        store.create("d1", state(0)).await.unwrap();
        let updated = store.compare_and_update("d1", 1, state(1)).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.state.current_pick_index, 1);
    }

    #[tokio::test]
    async fn test_cas_conflict_on_stale_version() {
        let store = MemoryDraftStore::new();
        store.create("d1", state(0)).await.unwrap();
        store.compare_and_update("d1", 1, state(1)).await.unwrap();

        // A second writer still holding version 1 loses.
        let err = store.compare_and_update("d1", 1, state(2)).await.unwrap_err();
        match err {
            StoreError::Conflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The losing write left no trace.
        let current = store.get("d1").await.unwrap();
        assert_eq!(current.state.current_pick_index, 1);
    }

    #[tokio::test]
    async fn test_subscribe_sees_commits() {
        let store = MemoryDraftStore::new();
        let mut rx = store.subscribe("d1");
        store.create("d1", state(0)).await.unwrap();
        store.compare_and_update("d1", 1, state(1)).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.version, 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.state.current_pick_index, 1);
    }

    #[tokio::test]
    async fn test_priority_list_defaults_empty() {
        let lists = MemoryPriorityListStore::new();
        assert_eq!(lists.get(7).await.unwrap(), Vec::<PlayerId>::new());
        lists.set(7, vec![3, 1, 2]);
        assert_eq!(lists.get(7).await.unwrap(), vec![3, 1, 2]);
    }
}
