use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::db::ReviewStore;
use crate::error::{AppError, Result, SchedulerError};
use crate::models::{ReviewState, ReviewableItem};
use crate::scheduler;

/// How the next problem is chosen from the loaded window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    MostDue,
    Weighted { top_k: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct NextProblem {
    pub item: ReviewableItem,
    pub score: f64,
    pub interval_days: f64,
}

/// Loads up to `limit` problems and picks one. `None` means nothing to review.
pub fn next_item<S, R>(
    store: &S,
    strategy: Strategy,
    limit: usize,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Option<NextProblem>>
where
    S: ReviewStore + ?Sized,
    R: Rng + ?Sized,
{
    let items = store.list_items(limit)?;
    debug!(loaded = items.len(), ?strategy, "choosing next problem");

    let picked = match strategy {
        Strategy::MostDue => scheduler::pick_most_due(&items, now),
        Strategy::Weighted { top_k } => scheduler::pick_due_with_randomness(&items, now, top_k, rng),
    };

    Ok(picked.map(|p| NextProblem {
        interval_days: scheduler::interval_days(p.item.times_reviewed),
        item: p.item.clone(),
        score: p.score,
    }))
}

/// Marks problem `id` reviewed at `now` and persists the new state.
pub fn complete_review<S>(store: &S, id: i64, now: DateTime<Utc>) -> Result<ReviewState>
where
    S: ReviewStore + ?Sized,
{
    if id <= 0 {
        return Err(SchedulerError::InvalidItem(id).into());
    }

    let item = store.get_item(id)?.ok_or(AppError::NotFound(id))?;
    let state = scheduler::mark_reviewed(&item, now)?;

    if !store.persist_review_state(state.id, state.times_reviewed, state.last_reviewed)? {
        return Err(AppError::NotFound(id));
    }

    debug!(id, times_reviewed = state.times_reviewed, "review recorded");
    Ok(state)
}
