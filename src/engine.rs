// Draft engine: the long-lived event loop that owns a draft's lifecycle,
// plus the entry points for creating drafts and submitting human picks.
//
// The loop multiplexes two event sources with `tokio::select!`: committed
// state changes from the store's broadcast channel (which re-arm the pick
// timer) and fired deadlines from the scheduler (which run the auto-pick
// path, with bounded retries).

use crate::config::Config;
use crate::draft::advance::{advance_checked, PickError};
use crate::draft::order::{build_draft, SetupError};
use crate::draft::player::{Player, PlayerId, TeamId};
use crate::draft::state::DraftState;
use crate::scheduler::FiredTask;
use crate::store::{DraftStateStore, StoreError, Versioned};
use crate::trigger::{DraftTimerTrigger, TriggerError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid pick: {0}")]
    InvalidPick(#[from] PickError),

    #[error("pick already made for this slot")]
    PickAlreadyMade,

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

pub struct DraftEngine {
    store: Arc<dyn DraftStateStore>,
    trigger: Arc<DraftTimerTrigger>,
    config: Config,
}

impl DraftEngine {
    pub fn new(
        store: Arc<dyn DraftStateStore>,
        trigger: Arc<DraftTimerTrigger>,
        config: Config,
    ) -> Self {
        Self {
            store,
            trigger,
            config,
        }
    }

    /// Build and persist a new draft from the player pool. Returns the
    /// created snapshot and any setup warnings.
    pub async fn create_draft(
        &self,
        draft_id: &str,
        players: Vec<Player>,
    ) -> Result<(Versioned<DraftState>, Vec<String>), EngineError> {
        let outcome = build_draft(players, &self.config.draft, Utc::now())?;
        for warning in &outcome.warnings {
            warn!(%draft_id, "{warning}");
        }
        let created = self.store.create(draft_id, outcome.state).await?;
        info!(
            %draft_id,
            teams = created.state.teams.len(),
            slots = created.state.pick_order.len(),
            "draft created"
        );
        Ok((created, outcome.warnings))
    }

    /// Commit a pick on behalf of a captain.
    ///
    /// Validates against the freshest snapshot and commits with a
    /// compare-and-swap. Losing the swap means somebody else (usually the
    /// auto-pick timer) committed this slot first.
    pub async fn submit_pick(
        &self,
        draft_id: &str,
        team_id: TeamId,
        player_id: PlayerId,
    ) -> Result<Versioned<DraftState>, EngineError> {
        let snapshot = self.store.get(draft_id).await?;
        let mut next = advance_checked(
            &snapshot.state,
            team_id,
            player_id,
            Utc::now(),
            self.config.draft.pick_time_limit(),
        )?;
        // The armed timer belongs to the slot we just filled; the run
        // loop cancels it and arms a fresh one when this commit lands.
        next.active_timer_task = None;

        match self
            .store
            .compare_and_update(draft_id, snapshot.version, next)
            .await
        {
            Ok(committed) => {
                info!(
                    %draft_id,
                    team_id,
                    player_id,
                    pick_index = snapshot.state.current_pick_index,
                    "pick committed"
                );
                Ok(committed)
            }
            Err(StoreError::Conflict { .. }) => Err(EngineError::PickAlreadyMade),
            Err(e) => Err(e.into()),
        }
    }

    /// Drive one draft to completion.
    ///
    /// `fired_rx` is the delivery side of the scheduler feeding this
    /// engine. Returns once the draft completes or both event sources
    /// close.
    pub async fn run(
        &self,
        draft_id: &str,
        mut fired_rx: mpsc::Receiver<FiredTask>,
    ) -> Result<(), EngineError> {
        let mut updates = self.store.subscribe(draft_id);
        let mut last = self.store.get(draft_id).await?;
        self.trigger.on_pick_changed(draft_id, None, &last).await?;

        if last.state.is_complete() {
            info!(%draft_id, "draft already complete");
            return Ok(());
        }

        loop {
            tokio::select! {
                update = updates.recv() => {
                    match update {
                        Ok(snapshot) => {
                            if self.handle_update(draft_id, &mut last, snapshot).await? {
                                return Ok(());
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(%draft_id, missed, "update stream lagged; re-reading");
                            let snapshot = self.store.get(draft_id).await?;
                            if self.handle_update(draft_id, &mut last, snapshot).await? {
                                return Ok(());
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!(%draft_id, "update stream closed; stopping");
                            return Ok(());
                        }
                    }
                }
                fired = fired_rx.recv() => {
                    match fired {
                        Some(task) => self.deliver_fired(draft_id, task).await,
                        None => {
                            info!(%draft_id, "scheduler channel closed; stopping");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Fold one committed snapshot into the loop state, re-arming the
    /// timer when the current pick actually changed. Returns `true` once
    /// the draft is complete.
    async fn handle_update(
        &self,
        draft_id: &str,
        last: &mut Versioned<DraftState>,
        snapshot: Versioned<DraftState>,
    ) -> Result<bool, EngineError> {
        if snapshot.version < last.version {
            return Ok(false);
        }
        let pick_changed = snapshot.state.current_pick_index != last.state.current_pick_index
            || snapshot.state.pick_ends_at != last.state.pick_ends_at;
        let previous_task = last.state.active_timer_task.clone();
        *last = snapshot;

        if !pick_changed {
            // Handle-only writes (the trigger recording its own task)
            // carry nothing to reschedule.
            return Ok(false);
        }

        self.trigger
            .on_pick_changed(draft_id, previous_task.as_ref(), last)
            .await?;

        if last.state.is_complete() {
            info!(
                %draft_id,
                picks = last.state.completed_picks.len(),
                "draft complete"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// At-least-once processing of a fired deadline: retry transient
    /// failures with a growing backoff before giving up on this firing.
    async fn deliver_fired(&self, draft_id: &str, task: FiredTask) {
        let max_attempts = self.config.scheduler.max_attempts;
        let min_backoff = std::time::Duration::from_secs(self.config.scheduler.min_backoff_secs);

        for attempt in 1..=max_attempts {
            match self.trigger.on_deadline_fired(draft_id, Utc::now()).await {
                Ok(outcome) => {
                    info!(
                        %draft_id,
                        handle = %task.handle,
                        pick_index = task.pick_index,
                        ?outcome,
                        "fired deadline processed"
                    );
                    return;
                }
                // An empty pool cannot heal on retry.
                Err(TriggerError::AutoPick(e)) => {
                    error!(%draft_id, handle = %task.handle, error = %e, "auto-pick impossible");
                    return;
                }
                Err(e) => {
                    warn!(
                        %draft_id,
                        handle = %task.handle,
                        attempt,
                        max_attempts,
                        error = %e,
                        "auto-pick attempt failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(min_backoff * attempt).await;
                    }
                }
            }
        }
        error!(
            %draft_id,
            handle = %task.handle,
            "auto-pick abandoned after {max_attempts} attempts"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DraftConfig;
    use crate::draft::player::{Rank, RankTier, Role};
    use crate::scheduler::TokioScheduler;
    use crate::store::{MemoryDraftStore, MemoryPriorityListStore};

    fn player(id: PlayerId, role: Role, tier: RankTier, is_captain: bool) -> Player {
        Player {
            id,
            name: format!("p{id}"),
            role,
            secondary_roles: vec![],
            is_captain,
            team_id: None,
            peak_rank: Rank::new(tier, 2),
            solo_rank: Rank::UNRANKED,
            flex_rank: Rank::UNRANKED,
        }
    }

    fn pool() -> Vec<Player> {
        vec![
            player(1, Role::Top, RankTier::Diamond, true),
            player(2, Role::Jungle, RankTier::Emerald, true),
            player(10, Role::Mid, RankTier::Platinum, false),
            player(11, Role::Adc, RankTier::Gold, false),
            player(12, Role::Support, RankTier::Silver, false),
            player(13, Role::Mid, RankTier::Bronze, false),
        ]
    }

    fn engine() -> (DraftEngine, mpsc::Receiver<FiredTask>) {
        let store = Arc::new(MemoryDraftStore::new());
        let lists = Arc::new(MemoryPriorityListStore::new());
        let (tx, rx) = mpsc::channel(16);
        let scheduler = Arc::new(TokioScheduler::new(tx));
        let config = Config {
            draft: DraftConfig {
                num_rounds: 2,
                pick_time_limit_secs: 600,
                skip_percentile_buckets: vec![0.5, 1.0],
                quiet_hours: None,
            },
            scheduler: Default::default(),
            database: Default::default(),
            data: Default::default(),
        };
        let trigger = Arc::new(DraftTimerTrigger::new(
            store.clone(),
            scheduler,
            lists,
            config.draft.clone(),
        ));
        (DraftEngine::new(store, trigger, config), rx)
    }

    #[tokio::test]
    async fn test_create_draft_persists_state() {
        let (engine, _rx) = engine();
        let (created, warnings) = engine.create_draft("d1", pool()).await.unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.state.teams.len(), 2);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_submit_pick_happy_path() {
        let (engine, _rx) = engine();
        let (created, _) = engine.create_draft("d1", pool()).await.unwrap();
        let team_id = created.state.current_team_id().unwrap();

        let committed = engine.submit_pick("d1", team_id, 11).await.unwrap();
        assert_eq!(committed.version, 2);
        assert!(committed
            .state
            .team(team_id)
            .unwrap()
            .players
            .iter()
            .any(|p| p.id == 11));
        assert_eq!(committed.state.active_timer_task, None);
    }

    #[tokio::test]
    async fn test_submit_pick_wrong_team() {
        let (engine, _rx) = engine();
        let (created, _) = engine.create_draft("d1", pool()).await.unwrap();
        let on_clock = created.state.current_team_id().unwrap();
        let other = created
            .state
            .teams
            .iter()
            .map(|t| t.id)
            .find(|id| *id != on_clock)
            .unwrap();

        let err = engine.submit_pick("d1", other, 11).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidPick(PickError::WrongTeam { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_pick_unavailable_player() {
        let (engine, _rx) = engine();
        let (created, _) = engine.create_draft("d1", pool()).await.unwrap();
        let team_id = created.state.current_team_id().unwrap();

        let err = engine.submit_pick("d1", team_id, 999).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidPick(PickError::PlayerUnavailable(999))
        ));
    }

    #[tokio::test]
    async fn test_submit_pick_missing_draft() {
        let (engine, _rx) = engine();
        assert!(matches!(
            engine.submit_pick("nope", 1, 11).await,
            Err(EngineError::Store(StoreError::NotFound(_)))
        ));
    }
}
