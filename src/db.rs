// SQLite persistence layer for draft state and priority lists.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;

use crate::draft::player::{PlayerId, TeamId};
use crate::draft::state::DraftState;
use crate::store::{DraftStateStore, PriorityListStore, StoreError, Versioned};

const CHANNEL_CAPACITY: usize = 64;

/// SQLite-backed draft storage. The whole draft state is stored as one
/// JSON document per draft with a version column; compare-and-swap writes
/// are a conditional `UPDATE` on that column.
pub struct SqliteDraftStore {
    conn: Mutex<Connection>,
    channels: Mutex<HashMap<String, broadcast::Sender<Versioned<DraftState>>>>,
}

impl SqliteDraftStore {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database
    /// (useful for tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Backend(format!("failed to open database at {path}: {e}")))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| StoreError::Backend(format!("failed to set database pragmas: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS drafts (
                draft_id   TEXT PRIMARY KEY,
                version    INTEGER NOT NULL,
                state      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS draft_boards (
                team_id    INTEGER PRIMARY KEY,
                player_ids TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| StoreError::Backend(format!("failed to create database schema: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            channels: Mutex::new(HashMap::new()),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn sender_for(&self, draft_id: &str) -> broadcast::Sender<Versioned<DraftState>> {
        let mut channels = self.channels.lock().expect("channel mutex poisoned");
        channels
            .entry(draft_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Replace a team's priority wishlist.
    pub fn set_priority_list(
        &self,
        team_id: TeamId,
        players: &[PlayerId],
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(players)
            .map_err(|e| StoreError::Backend(format!("failed to serialize priority list: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO draft_boards (team_id, player_ids) VALUES (?1, ?2)
                 ON CONFLICT(team_id) DO UPDATE SET player_ids = excluded.player_ids",
                params![team_id, json],
            )
            .map_err(|e| StoreError::Backend(format!("failed to store priority list: {e}")))?;
        Ok(())
    }

    fn encode(state: &DraftState) -> Result<String, StoreError> {
        serde_json::to_string(state)
            .map_err(|e| StoreError::Backend(format!("failed to serialize draft state: {e}")))
    }

    fn decode(json: &str) -> Result<DraftState, StoreError> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Backend(format!("failed to deserialize draft state: {e}")))
    }
}

#[async_trait]
impl DraftStateStore for SqliteDraftStore {
    async fn get(&self, draft_id: &str) -> Result<Versioned<DraftState>, StoreError> {
        let row: Option<(u64, String)> = self
            .conn()
            .query_row(
                "SELECT version, state FROM drafts WHERE draft_id = ?1",
                params![draft_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::Backend(format!("failed to load draft: {e}")))?;

        match row {
            Some((version, json)) => Ok(Versioned {
                version,
                state: Self::decode(&json)?,
            }),
            None => Err(StoreError::NotFound(draft_id.to_string())),
        }
    }

    async fn create(
        &self,
        draft_id: &str,
        state: DraftState,
    ) -> Result<Versioned<DraftState>, StoreError> {
        let json = Self::encode(&state)?;
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO drafts (draft_id, version, state) VALUES (?1, 1, ?2)",
                params![draft_id, json],
            )
            .map_err(|e| StoreError::Backend(format!("failed to create draft: {e}")))?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(draft_id.to_string()));
        }

        let snapshot = Versioned { version: 1, state };
        let _ = self.sender_for(draft_id).send(snapshot.clone());
        Ok(snapshot)
    }

    async fn compare_and_update(
        &self,
        draft_id: &str,
        expected_version: u64,
        state: DraftState,
    ) -> Result<Versioned<DraftState>, StoreError> {
        let json = Self::encode(&state)?;
        {
            let conn = self.conn();
            let changed = conn
                .execute(
                    "UPDATE drafts
                     SET version = version + 1,
                         state = ?3,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE draft_id = ?1 AND version = ?2",
                    params![draft_id, expected_version, json],
                )
                .map_err(|e| StoreError::Backend(format!("failed to update draft: {e}")))?;

            if changed == 0 {
                // Distinguish a missing draft from a lost race.
                let found: Option<u64> = conn
                    .query_row(
                        "SELECT version FROM drafts WHERE draft_id = ?1",
                        params![draft_id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| StoreError::Backend(format!("failed to re-check draft: {e}")))?;
                return match found {
                    Some(found) => Err(StoreError::Conflict {
                        draft_id: draft_id.to_string(),
                        expected: expected_version,
                        found,
                    }),
                    None => Err(StoreError::NotFound(draft_id.to_string())),
                };
            }
        }

        let snapshot = Versioned {
            version: expected_version + 1,
            state,
        };
        let _ = self.sender_for(draft_id).send(snapshot.clone());
        Ok(snapshot)
    }

    fn subscribe(&self, draft_id: &str) -> broadcast::Receiver<Versioned<DraftState>> {
        self.sender_for(draft_id).subscribe()
    }
}

#[async_trait]
impl PriorityListStore for SqliteDraftStore {
    async fn get(&self, team_id: TeamId) -> Result<Vec<PlayerId>, StoreError> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT player_ids FROM draft_boards WHERE team_id = ?1",
                params![team_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Backend(format!("failed to load priority list: {e}")))?;

        match json {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                StoreError::Backend(format!("failed to deserialize priority list: {e}"))
            }),
            None => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::state::PickSlot;
    use std::collections::BTreeMap;

    /// Helper: create a fresh in-memory store for each test.
    fn test_store() -> SqliteDraftStore {
        SqliteDraftStore::open(":memory:").expect("in-memory database should open")
    }

    fn sample_state(pick_index: usize) -> DraftState {
        DraftState {
            teams: vec![],
            pick_order: vec![PickSlot::Team { team_id: 1 }, PickSlot::Team { team_id: 2 }],
            available_players: vec![],
            completed_picks: BTreeMap::new(),
            current_pick_index: pick_index,
            pick_ends_at: None,
            active_timer_task: Some("task-1".to_string()),
        }
    }

    #[test]
    fn open_creates_tables() {
        let store = test_store();
        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(tables.contains(&"drafts".to_string()));
        assert!(tables.contains(&"draft_boards".to_string()));
    }

    #[tokio::test]
    async fn create_and_get_round_trips_state() {
        let store = test_store();
        let created = store.create("d1", sample_state(0)).await.unwrap();
        assert_eq!(created.version, 1);

        let fetched = DraftStateStore::get(&store, "d1").await.unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.state, sample_state(0));
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = test_store();
        store.create("d1", sample_state(0)).await.unwrap();
        assert!(matches!(
            store.create("d1", sample_state(0)).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn cas_bumps_version_on_success() {
        let store = test_store();
        store.create("d1", sample_state(0)).await.unwrap();
        let updated = store
            .compare_and_update("d1", 1, sample_state(1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        let fetched = DraftStateStore::get(&store, "d1").await.unwrap();
        assert_eq!(fetched.state.current_pick_index, 1);
    }

    #[tokio::test]
    async fn cas_stale_version_conflicts_without_writing() {
        let store = test_store();
        store.create("d1", sample_state(0)).await.unwrap();
        store
            .compare_and_update("d1", 1, sample_state(1))
            .await
            .unwrap();

        let err = store
            .compare_and_update("d1", 1, sample_state(2))
            .await
            .unwrap_err();
        match err {
            StoreError::Conflict {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let fetched = DraftStateStore::get(&store, "d1").await.unwrap();
        assert_eq!(fetched.state.current_pick_index, 1);
    }

    #[tokio::test]
    async fn cas_on_missing_draft_is_not_found() {
        let store = test_store();
        assert!(matches!(
            store.compare_and_update("nope", 1, sample_state(0)).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn subscribers_see_committed_snapshots() {
        let store = test_store();
        let mut rx = store.subscribe("d1");
        store.create("d1", sample_state(0)).await.unwrap();
        store
            .compare_and_update("d1", 1, sample_state(1))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().version, 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.state.current_pick_index, 1);
    }

    #[tokio::test]
    async fn priority_list_round_trip() {
        let store = test_store();
        assert_eq!(
            PriorityListStore::get(&store, 3).await.unwrap(),
            Vec::<PlayerId>::new()
        );
        store.set_priority_list(3, &[9, 7, 8]).unwrap();
        assert_eq!(PriorityListStore::get(&store, 3).await.unwrap(), vec![9, 7, 8]);
        store.set_priority_list(3, &[1]).unwrap();
        assert_eq!(PriorityListStore::get(&store, 3).await.unwrap(), vec![1]);
    }
}
