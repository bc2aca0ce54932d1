// Timer lifecycle around pick changes, and the auto-pick path that runs
// when a deadline fires.
//
// Correctness never rests on the timers themselves: a fired task first
// re-reads the draft and checks the stored deadline, and every write is a
// compare-and-swap. Duplicate or orphaned firings fall out as no-ops.

use crate::config::DraftConfig;
use crate::draft::advance::{advance, PickError};
use crate::draft::autopick::{select_auto_pick, AutoPickError};
use crate::draft::player::PlayerId;
use crate::draft::state::DraftState;
use crate::scheduler::{AutoPickScheduler, ScheduleError, TaskHandle};
use crate::store::{DraftStateStore, PriorityListStore, StoreError, Versioned};
use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    AutoPick(#[from] AutoPickError),

    #[error(transparent)]
    Pick(#[from] PickError),
}

/// What a fired deadline amounted to once the draft was re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoPickOutcome {
    /// The stored deadline is gone or not yet due; the firing was for an
    /// older pick.
    Stale,
    /// Quiet hours are in effect; the timer was pushed to `until`.
    Deferred { until: DateTime<Utc> },
    /// The clock was sitting on a forfeited slot; the draft was advanced
    /// past it without picking.
    AdvancedPastSkip,
    /// An automatic pick was committed.
    Picked { player_id: PlayerId },
    /// A human pick committed between the firing and our write.
    LostRace,
}

pub struct DraftTimerTrigger {
    store: Arc<dyn DraftStateStore>,
    scheduler: Arc<dyn AutoPickScheduler>,
    priority_lists: Arc<dyn PriorityListStore>,
    config: DraftConfig,
}

impl DraftTimerTrigger {
    pub fn new(
        store: Arc<dyn DraftStateStore>,
        scheduler: Arc<dyn AutoPickScheduler>,
        priority_lists: Arc<dyn PriorityListStore>,
        config: DraftConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            priority_lists,
            config,
        }
    }

    /// React to a committed change of the current pick: drop the previous
    /// timer and arm a new one for the new deadline.
    ///
    /// The new handle is written back with a compare-and-swap against the
    /// snapshot that triggered us. Losing that write is fine: a newer
    /// commit exists, its own trigger run reschedules, and the orphaned
    /// task dies against the staleness check when it fires.
    pub async fn on_pick_changed(
        &self,
        draft_id: &str,
        previous_task: Option<&TaskHandle>,
        current: &Versioned<DraftState>,
    ) -> Result<Option<TaskHandle>, TriggerError> {
        if let Some(prev) = previous_task {
            if let Err(e) = self.scheduler.cancel(prev).await {
                // Expected when the timer fired first.
                debug!(%draft_id, handle = %prev, error = %e, "previous timer not cancelled");
            }
        }

        let deadline = match current.state.pick_ends_at {
            Some(deadline) if !current.state.is_complete() => deadline,
            _ => {
                info!(%draft_id, "no further deadline; draft complete or clock stopped");
                return Ok(None);
            }
        };

        let handle = self
            .scheduler
            .enqueue(draft_id, deadline, current.state.current_pick_index)
            .await?;

        let mut with_handle = current.state.clone();
        with_handle.active_timer_task = Some(handle.clone());
        match self
            .store
            .compare_and_update(draft_id, current.version, with_handle)
            .await
        {
            Ok(_) => {}
            Err(StoreError::Conflict { .. }) => {
                // A newer commit exists and will reschedule on its own.
                debug!(%draft_id, %handle, "timer handle write lost the race");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Some(handle))
    }

    /// Process a fired deadline for `draft_id`. `now` is the delivery
    /// time; the staleness and quiet-hours checks both key off it.
    pub async fn on_deadline_fired(
        &self,
        draft_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AutoPickOutcome, TriggerError> {
        let snapshot = self.store.get(draft_id).await?;
        let state = &snapshot.state;

        // Staleness guard: only act when the stored deadline exists and
        // has actually passed. Anything else means this firing belongs to
        // an earlier pick or an already-finished draft.
        match state.pick_ends_at {
            Some(deadline) if deadline <= now => {}
            _ => {
                debug!(%draft_id, "fired timer is stale; ignoring");
                return Ok(AutoPickOutcome::Stale);
            }
        }
        if state.is_complete() {
            return Ok(AutoPickOutcome::Stale);
        }

        if let Some(quiet) = &self.config.quiet_hours {
            if quiet.contains(now.hour()) {
                let until = next_hour_after(now, quiet.end_hour);
                info!(%draft_id, %until, "quiet hours; deferring auto-pick");
                let handle = self
                    .scheduler
                    .enqueue(draft_id, until, state.current_pick_index)
                    .await?;
                let mut deferred = state.clone();
                deferred.active_timer_task = Some(handle);
                match self
                    .store
                    .compare_and_update(draft_id, snapshot.version, deferred)
                    .await
                {
                    Ok(_) | Err(StoreError::Conflict { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                return Ok(AutoPickOutcome::Deferred { until });
            }
        }

        // The order builder never leaves the clock on a forfeited slot,
        // but a hand-edited draft could. Advance past it instead of
        // failing forever.
        let team_id = match state.current_team_id() {
            Some(team_id) => team_id,
            None => {
                let mut fixed = state.clone();
                fixed.current_pick_index = fixed.next_live_index(fixed.current_pick_index);
                fixed.pick_ends_at = if fixed.is_complete() {
                    None
                } else {
                    Some(now + self.config.pick_time_limit())
                };
                fixed.active_timer_task = None;
                warn!(%draft_id, "clock was on a forfeited slot; advancing");
                match self
                    .store
                    .compare_and_update(draft_id, snapshot.version, fixed)
                    .await
                {
                    Ok(_) => return Ok(AutoPickOutcome::AdvancedPastSkip),
                    Err(StoreError::Conflict { .. }) => return Ok(AutoPickOutcome::LostRace),
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let team = state.team(team_id).ok_or_else(|| {
            StoreError::Backend(format!(
                "draft `{draft_id}` references unknown team {team_id}"
            ))
        })?;
        let priority = self.priority_lists.get(team_id).await?;
        let player_id = select_auto_pick(&priority, team, &state.available_players)?;

        let mut next = advance(state, player_id, now, self.config.pick_time_limit())?;
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
                    version = committed.version,
                    "auto-pick committed"
                );
                Ok(AutoPickOutcome::Picked { player_id })
            }
            Err(StoreError::Conflict { .. }) => {
                debug!(%draft_id, "auto-pick lost the race to a human pick");
                Ok(AutoPickOutcome::LostRace)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Next instant at `hour:00` UTC strictly after `now`.
fn next_hour_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let mut candidate = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .unwrap_or_else(|| now.naive_utc())
        .and_utc();
    if candidate <= now {
        candidate += Duration::days(1);
    }
    candidate
}
