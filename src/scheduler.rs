//! Due-date scoring and review selection.
//!
//! Every item has a review interval of `2^times_reviewed` days. Its due score is
//! the elapsed time since the last review divided by that interval, so a score
//! of 1.0 means "exactly due" and anything above is overdue. Items that were
//! never reviewed get a large stand-in elapsed time and always rank first.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::cmp::Ordering;
use tracing::debug;

use crate::error::SchedulerError;
use crate::models::{ReviewState, ReviewableItem};

/// Stand-in "days since last review" for items that were never reviewed.
pub const NEVER_REVIEWED_DAYS: f64 = 10_000.0;

/// Floor applied to sampling weights so a fully caught-up due set can still be drawn from.
pub const MIN_WEIGHT: f64 = 0.0001;

pub const DEFAULT_TOP_K: usize = 10;

// 2^1023 is the largest power of two an f64 holds
const MAX_INTERVAL_EXPONENT: i64 = 1023;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Review interval in days: `2^times_reviewed`. Negative counts are treated as 0.
pub fn interval_days(times_reviewed: i64) -> f64 {
    let exponent = times_reviewed.clamp(0, MAX_INTERVAL_EXPONENT);
    2f64.powi(exponent as i32)
}

/// Days elapsed since the last review, clamped at zero for timestamps in the future.
pub fn days_since(last_reviewed: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_reviewed {
        Some(last) => {
            let elapsed = now.signed_duration_since(last).num_milliseconds() as f64 / MILLIS_PER_DAY;
            elapsed.max(0.0)
        }
        None => NEVER_REVIEWED_DAYS,
    }
}

/// How overdue an item is at `now`. Always finite and non-negative.
pub fn due_score(times_reviewed: i64, last_reviewed: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    days_since(last_reviewed, now) / interval_days(times_reviewed)
}

pub fn item_score(item: &ReviewableItem, now: DateTime<Utc>) -> f64 {
    due_score(item.times_reviewed, item.last_reviewed, now)
}

pub fn is_due(item: &ReviewableItem, now: DateTime<Utc>) -> bool {
    item_score(item, now) >= 1.0
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredItem<'a> {
    pub item: &'a ReviewableItem,
    pub score: f64,
}

// Greater means "review first": higher score, then more reviews, then lower id
fn priority(a: &ScoredItem<'_>, b: &ScoredItem<'_>) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.item.times_reviewed.max(0).cmp(&b.item.times_reviewed.max(0)))
        .then_with(|| b.item.id.cmp(&a.item.id))
}

pub fn score_all(items: &[ReviewableItem], now: DateTime<Utc>) -> Vec<ScoredItem<'_>> {
    items
        .iter()
        .map(|item| ScoredItem {
            item,
            score: item_score(item, now),
        })
        .collect()
}

/// Scores every item and returns them highest priority first.
pub fn rank(items: &[ReviewableItem], now: DateTime<Utc>) -> Vec<ScoredItem<'_>> {
    let mut scored = score_all(items, now);
    scored.sort_by(|a, b| priority(b, a));
    scored
}

/// Deterministic selection of the most overdue item.
pub fn pick_most_due(items: &[ReviewableItem], now: DateTime<Utc>) -> Option<ScoredItem<'_>> {
    let picked = score_all(items, now).into_iter().max_by(priority);
    if let Some(p) = &picked {
        debug!(id = p.item.id, score = p.score, candidates = items.len(), "picked most due");
    }
    picked
}

/// Weighted random draw among the `top_k` most overdue items.
///
/// Each candidate's weight is its due score floored at [`MIN_WEIGHT`]. Items ranked
/// below `top_k` are never returned. A `top_k` of zero is treated as one.
pub fn pick_due_with_randomness<'a, R: Rng + ?Sized>(
    items: &'a [ReviewableItem],
    now: DateTime<Utc>,
    top_k: usize,
    rng: &mut R,
) -> Option<ScoredItem<'a>> {
    let mut due_set = rank(items, now);
    due_set.truncate(top_k.max(1));

    let weights: Vec<f64> = due_set.iter().map(|s| s.score.max(MIN_WEIGHT)).collect();
    let total_weight: f64 = weights.iter().sum();
    let mut random_point = rng.gen::<f64>() * total_weight;

    for (candidate, weight) in due_set.iter().zip(&weights) {
        random_point -= weight;
        if random_point <= 0.0 {
            debug!(
                id = candidate.item.id,
                score = candidate.score,
                due_set = due_set.len(),
                "picked weighted"
            );
            return Some(*candidate);
        }
    }

    // Rounding can leave a sliver of weight unspent
    due_set.last().copied()
}

/// Review state after completing a review of `item` at `now`.
pub fn mark_reviewed(item: &ReviewableItem, now: DateTime<Utc>) -> Result<ReviewState, SchedulerError> {
    if item.id <= 0 {
        return Err(SchedulerError::InvalidItem(item.id));
    }

    Ok(ReviewState {
        id: item.id,
        times_reviewed: item.times_reviewed.max(0).saturating_add(1),
        last_reviewed: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use chrono::{Duration, TimeZone};
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn item(id: i64, times_reviewed: i64, days_ago: Option<i64>) -> ReviewableItem {
        ReviewableItem {
            id,
            text: format!("Problem {}", id),
            difficulty: Difficulty::Unknown,
            link: None,
            created_at: "2024-01-01 00:00:00".to_string(),
            times_reviewed,
            last_reviewed: days_ago.map(|d| now() - Duration::days(d)),
        }
    }

    mod interval_tests {
        use super::*;

        #[test]
        fn interval_is_power_of_two() {
            for n in 0..20 {
                assert_eq!(interval_days(n), (1u64 << n) as f64);
            }
        }

        #[test]
        fn interval_strictly_increases() {
            for n in 0..100 {
                assert!(interval_days(n + 1) > interval_days(n));
            }
        }

        #[test]
        fn interval_negative_count_is_one_day() {
            assert_eq!(interval_days(-5), 1.0);
        }

        #[test]
        fn interval_huge_count_stays_finite() {
            assert!(interval_days(i64::MAX).is_finite());
            assert!(interval_days(i64::MAX) > 0.0);
        }
    }

    mod due_score_tests {
        use super::*;

        #[test]
        fn never_reviewed_uses_sentinel() {
            assert_eq!(due_score(0, None, now()), NEVER_REVIEWED_DAYS);
        }

        #[test]
        fn never_reviewed_beats_just_reviewed() {
            let fresh = due_score(0, Some(now()), now());
            assert!(due_score(0, None, now()) > fresh);
        }

        #[test]
        fn never_reviewed_beats_long_overdue() {
            let ten_years = Some(now() - Duration::days(3650));
            assert!(due_score(0, None, now()) > due_score(0, ten_years, now()));
        }

        #[test]
        fn score_is_days_over_interval() {
            let last = Some(now() - Duration::days(6));
            assert_eq!(due_score(0, last, now()), 6.0);
            assert_eq!(due_score(1, last, now()), 3.0);
            assert_eq!(due_score(2, last, now()), 1.5);
        }

        #[test]
        fn partial_days_count() {
            let last = Some(now() - Duration::hours(12));
            assert!((due_score(0, last, now()) - 0.5).abs() < 1e-9);
        }

        #[test]
        fn future_timestamp_clamps_to_zero() {
            let future = Some(now() + Duration::days(3));
            assert_eq!(due_score(0, future, now()), 0.0);
        }

        #[test]
        fn negative_count_treated_as_zero() {
            let last = Some(now() - Duration::days(4));
            assert_eq!(due_score(-7, last, now()), due_score(0, last, now()));
        }

        #[test]
        fn monotonic_in_elapsed_time() {
            let last = Some(now());
            let mut previous = 0.0;
            for hours in 0..500 {
                let at = now() + Duration::hours(hours);
                let score = due_score(3, last, at);
                assert!(score >= previous);
                previous = score;
            }
        }

        #[test]
        fn decreasing_in_review_count() {
            let last = Some(now() - Duration::days(30));
            for n in 0..10 {
                assert!(due_score(n, last, now()) > due_score(n + 1, last, now()));
            }
        }

        #[test]
        fn always_finite_and_non_negative() {
            let cases = [
                (i64::MIN, None),
                (i64::MAX, None),
                (0, Some(now() + Duration::days(10_000))),
                (5000, Some(now() - Duration::days(1))),
            ];
            for (count, last) in cases {
                let score = due_score(count, last, now());
                assert!(score.is_finite());
                assert!(score >= 0.0);
            }
        }

        #[test]
        fn is_due_at_interval_boundary() {
            assert!(is_due(&item(1, 1, Some(2)), now()));
            assert!(!is_due(&item(2, 2, Some(2)), now()));
            assert!(is_due(&item(3, 8, None), now()));
        }
    }

    mod most_due_tests {
        use super::*;

        #[test]
        fn empty_batch_is_none() {
            assert!(pick_most_due(&[], now()).is_none());
        }

        #[test]
        fn picks_highest_score() {
            let items = vec![item(1, 0, Some(3)), item(2, 0, Some(5)), item(3, 0, Some(1))];
            let picked = pick_most_due(&items, now()).unwrap();
            assert_eq!(picked.item.id, 2);
            assert_eq!(picked.score, 5.0);
        }

        #[test]
        fn ties_prefer_more_reviews() {
            // 4 days / 2^1 == 32 days / 2^4 == 2.0
            let items = vec![item(1, 1, Some(4)), item(2, 4, Some(32))];
            let picked = pick_most_due(&items, now()).unwrap();
            assert_eq!(picked.item.id, 2);
            assert_eq!(picked.score, 2.0);

            let reversed: Vec<_> = items.into_iter().rev().collect();
            assert_eq!(pick_most_due(&reversed, now()).unwrap().item.id, 2);
        }

        #[test]
        fn full_ties_prefer_lower_id() {
            let items = vec![item(9, 0, None), item(4, 0, None), item(6, 0, None)];
            assert_eq!(pick_most_due(&items, now()).unwrap().item.id, 4);
        }

        #[test]
        fn never_reviewed_wins() {
            let items = vec![item(1, 0, Some(400)), item(2, 0, None), item(3, 0, Some(900))];
            assert_eq!(pick_most_due(&items, now()).unwrap().item.id, 2);
        }

        #[test]
        fn single_item() {
            let items = vec![item(5, 2, Some(0))];
            let picked = pick_most_due(&items, now()).unwrap();
            assert_eq!(picked.item.id, 5);
            assert_eq!(picked.score, 0.0);
        }
    }

    mod weighted_tests {
        use super::*;

        #[test]
        fn empty_batch_is_none() {
            let mut rng = StdRng::seed_from_u64(1);
            assert!(pick_due_with_randomness(&[], now(), DEFAULT_TOP_K, &mut rng).is_none());
        }

        #[test]
        fn same_seed_same_pick() {
            let items: Vec<_> = (1..=3).map(|i| item(i, 0, Some(i * 2))).collect();
            for seed in 0..20 {
                let mut a = StdRng::seed_from_u64(seed);
                let mut b = StdRng::seed_from_u64(seed);
                let first = pick_due_with_randomness(&items, now(), 10, &mut a).unwrap();
                let second = pick_due_with_randomness(&items, now(), 10, &mut b).unwrap();
                assert_eq!(first.item.id, second.item.id);
            }
        }

        #[test]
        fn small_batch_considers_every_item() {
            let items = vec![item(1, 0, Some(3)), item(2, 0, Some(3)), item(3, 0, Some(3))];
            let mut rng = StdRng::seed_from_u64(7);
            let seen: HashSet<i64> = (0..300)
                .map(|_| pick_due_with_randomness(&items, now(), 10, &mut rng).unwrap().item.id)
                .collect();
            assert_eq!(seen.len(), 3);
        }

        #[test]
        fn never_leaves_top_k() {
            let items: Vec<_> = (1..=20).map(|i| item(i, 0, Some(i))).collect();
            let top: HashSet<i64> = [20, 19, 18].into_iter().collect();
            let mut rng = StdRng::seed_from_u64(99);
            for _ in 0..500 {
                let picked = pick_due_with_randomness(&items, now(), 3, &mut rng).unwrap();
                assert!(top.contains(&picked.item.id));
            }
        }

        #[test]
        fn zero_draw_picks_highest_ranked() {
            let items = vec![item(1, 0, Some(2)), item(2, 0, Some(8)), item(3, 0, Some(4))];
            let mut rng = StepRng::new(0, 0);
            let picked = pick_due_with_randomness(&items, now(), 10, &mut rng).unwrap();
            assert_eq!(picked.item.id, 2);
        }

        #[test]
        fn maximal_draw_stays_inside_due_set() {
            let items: Vec<_> = (1..=6).map(|i| item(i, 0, Some(i * 10))).collect();
            let mut rng = StepRng::new(u64::MAX, 0);
            let picked = pick_due_with_randomness(&items, now(), 2, &mut rng).unwrap();
            assert_eq!(picked.item.id, 5);
        }

        #[test]
        fn all_zero_scores_still_sample() {
            let items: Vec<_> = (1..=3).map(|i| item(i, 1, Some(0))).collect();
            let mut rng = StdRng::seed_from_u64(3);
            let seen: HashSet<i64> = (0..300)
                .map(|_| {
                    let picked = pick_due_with_randomness(&items, now(), 10, &mut rng).unwrap();
                    assert_eq!(picked.score, 0.0);
                    picked.item.id
                })
                .collect();
            assert_eq!(seen.len(), 3);
        }

        #[test]
        fn heavier_items_win_more_often() {
            let items = vec![item(1, 0, None), item(2, 5, Some(1))];
            let mut rng = StdRng::seed_from_u64(11);
            let heavy = (0..1000)
                .filter(|_| pick_due_with_randomness(&items, now(), 10, &mut rng).unwrap().item.id == 1)
                .count();
            assert!(heavy > 950);
        }

        #[test]
        fn zero_top_k_behaves_like_one() {
            let items = vec![item(1, 0, Some(1)), item(2, 0, Some(9))];
            let mut rng = StdRng::seed_from_u64(5);
            for _ in 0..50 {
                let picked = pick_due_with_randomness(&items, now(), 0, &mut rng).unwrap();
                assert_eq!(picked.item.id, 2);
            }
        }

        #[test]
        fn rank_orders_by_priority() {
            let items = vec![item(1, 1, Some(4)), item(2, 0, Some(1)), item(3, 4, Some(32)), item(4, 0, None)];
            let ids: Vec<i64> = rank(&items, now()).iter().map(|s| s.item.id).collect();
            assert_eq!(ids, vec![4, 3, 1, 2]);
        }
    }

    mod mark_reviewed_tests {
        use super::*;

        #[test]
        fn increments_count_and_sets_timestamp() {
            let t1 = now() + Duration::days(1);
            let state = mark_reviewed(&item(7, 2, Some(10)), t1).unwrap();
            assert_eq!(
                state,
                ReviewState {
                    id: 7,
                    times_reviewed: 3,
                    last_reviewed: t1,
                }
            );
        }

        #[test]
        fn first_review() {
            let state = mark_reviewed(&item(1, 0, None), now()).unwrap();
            assert_eq!(state.times_reviewed, 1);
            assert_eq!(state.last_reviewed, now());
        }

        #[test]
        fn negative_count_restarts_at_one() {
            let state = mark_reviewed(&item(1, -4, None), now()).unwrap();
            assert_eq!(state.times_reviewed, 1);
        }

        #[test]
        fn non_positive_id_is_invalid() {
            assert_eq!(
                mark_reviewed(&item(0, 1, None), now()),
                Err(SchedulerError::InvalidItem(0))
            );
            assert_eq!(
                mark_reviewed(&item(-2, 1, None), now()),
                Err(SchedulerError::InvalidItem(-2))
            );
        }

        #[test]
        fn score_after_review_is_zero() {
            let before = item(3, 2, Some(40));
            let state = mark_reviewed(&before, now()).unwrap();
            let after = ReviewableItem {
                times_reviewed: state.times_reviewed,
                last_reviewed: Some(state.last_reviewed),
                ..before
            };
            assert!(item_score(&after, now()).abs() < 1e-9);
        }
    }
}
