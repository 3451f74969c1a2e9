//! Points computation for correct answers
//!
//! A correct answer earns a base value plus a time bonus that decays
//! linearly over the round's time limit, plus a bonus for being among the
//! first submissions; the sum is then scaled by a streak multiplier. The
//! full breakdown is kept on the answer so the recap can show players where
//! their points came from.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::constants::score;

/// Itemized points for one evaluated answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    /// Flat value for a correct answer
    pub base: u64,
    /// Linear decay bonus: full when answering instantly, zero at the deadline
    pub time_bonus: u64,
    /// Bonus for submission rank; earlier submissions earn more
    pub order_bonus: u64,
    /// Streak multiplier applied to the sum, in percent (100 = no bonus)
    pub streak_percent: u32,
    /// Final points awarded
    pub total: u64,
}

impl PointsBreakdown {
    /// A zero breakdown, used for incorrect answers and disabled points mode
    pub fn zero() -> Self {
        Self {
            streak_percent: 100,
            ..Self::default()
        }
    }
}

/// Computes the points for a correct answer
///
/// # Arguments
///
/// * `elapsed` - time from round start to submission
/// * `time_limit` - the round's limit, or `None` for untimed rounds (which
///   earn no time bonus)
/// * `submission_order` - zero-based rank of this submission in the round
/// * `streak` - consecutive correct answers including this one
pub fn correct_answer(
    elapsed: Duration,
    time_limit: Option<Duration>,
    submission_order: usize,
    streak: u32,
) -> PointsBreakdown {
    let time_bonus = match time_limit {
        Some(limit) if !limit.is_zero() => {
            let remaining = 1. - (elapsed.as_secs_f64() / limit.as_secs_f64()).min(1.);
            (score::TIME_BONUS_MAX as f64 * remaining) as u64
        }
        _ => 0,
    };

    let order_bonus = score::ORDER_BONUS_MAX
        .saturating_sub(score::ORDER_BONUS_STEP.saturating_mul(submission_order as u64));

    // The first correct answer of a streak carries no multiplier
    let streak_percent =
        100 + score::STREAK_STEP_PERCENT * streak.saturating_sub(1).min(score::STREAK_CAP);

    let subtotal = score::BASE_POINTS + time_bonus + order_bonus;
    let total = subtotal * u64::from(streak_percent) / 100;

    PointsBreakdown {
        base: score::BASE_POINTS,
        time_bonus,
        order_bonus,
        streak_percent,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_first_answer_gets_full_bonuses() {
        let breakdown = correct_answer(
            Duration::from_secs(0),
            Some(Duration::from_secs(30)),
            0,
            1,
        );

        assert_eq!(breakdown.base, score::BASE_POINTS);
        assert_eq!(breakdown.time_bonus, score::TIME_BONUS_MAX);
        assert_eq!(breakdown.order_bonus, score::ORDER_BONUS_MAX);
        assert_eq!(breakdown.streak_percent, 100);
        assert_eq!(
            breakdown.total,
            score::BASE_POINTS + score::TIME_BONUS_MAX + score::ORDER_BONUS_MAX
        );
    }

    #[test]
    fn test_time_bonus_decays_linearly() {
        let limit = Some(Duration::from_secs(30));

        let halfway = correct_answer(Duration::from_secs(15), limit, 0, 1);
        assert_eq!(halfway.time_bonus, score::TIME_BONUS_MAX / 2);

        let at_deadline = correct_answer(Duration::from_secs(30), limit, 0, 1);
        assert_eq!(at_deadline.time_bonus, 0);

        // Submissions after the deadline (host leniency) never go negative
        let late = correct_answer(Duration::from_secs(45), limit, 0, 1);
        assert_eq!(late.time_bonus, 0);
    }

    #[test]
    fn test_untimed_round_has_no_time_bonus() {
        let breakdown = correct_answer(Duration::from_secs(3), None, 0, 1);
        assert_eq!(breakdown.time_bonus, 0);
    }

    #[test]
    fn test_order_bonus_steps_down_to_zero() {
        let limit = Some(Duration::from_secs(30));

        let ranks: Vec<u64> = (0..5)
            .map(|order| correct_answer(Duration::ZERO, limit, order, 1).order_bonus)
            .collect();
        assert_eq!(ranks, vec![30, 20, 10, 0, 0]);
    }

    #[test]
    fn test_streak_multiplier_caps() {
        let limit = Some(Duration::from_secs(30));

        assert_eq!(correct_answer(Duration::ZERO, limit, 0, 1).streak_percent, 100);
        assert_eq!(correct_answer(Duration::ZERO, limit, 0, 2).streak_percent, 110);
        assert_eq!(correct_answer(Duration::ZERO, limit, 0, 6).streak_percent, 150);
        // Beyond the cap the multiplier stops growing
        assert_eq!(correct_answer(Duration::ZERO, limit, 0, 60).streak_percent, 150);
    }

    #[test]
    fn test_total_applies_multiplier() {
        let breakdown = correct_answer(
            Duration::from_secs(0),
            Some(Duration::from_secs(30)),
            0,
            2,
        );
        let subtotal = score::BASE_POINTS + score::TIME_BONUS_MAX + score::ORDER_BONUS_MAX;
        assert_eq!(breakdown.total, subtotal * 110 / 100);
    }

    #[test]
    fn test_zero_breakdown() {
        let zero = PointsBreakdown::zero();
        assert_eq!(zero.total, 0);
        assert_eq!(zero.streak_percent, 100);
    }
}
