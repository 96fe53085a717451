//! Spaced-repetition interval and ease calculation.
//!
//! Intervals come from two short fixed ladders rather than an ease-scaled
//! formula, so "next review in N days" is always one of a handful of values.
//! Ease is tracked and persisted but does not influence the interval.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ReviewItem;

pub const MASTERY_LADDER: [i64; 4] = [1, 4, 10, 21];
pub const CRASH_LADDER: [i64; 3] = [0, 1, 3];

pub const EASE_START: i64 = 250;
pub const EASE_MAX: i64 = 300;
pub const EASE_MIN: i64 = 130;
pub const EASE_STEP_UP: i64 = 10;
pub const EASE_STEP_DOWN: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ladder {
    Mastery,
    Crash,
}

impl Ladder {
    pub fn steps(&self) -> &'static [i64] {
        match self {
            Ladder::Mastery => &MASTERY_LADDER,
            Ladder::Crash => &CRASH_LADDER,
        }
    }

    pub fn first(&self) -> i64 {
        self.steps()[0]
    }
}

/// Next interval in days. A lapse, or a previous value that is not on the
/// ladder, restarts at the first rung; the last rung is sticky.
pub fn next_interval(ladder: Ladder, prev_interval: i64, lapse: bool) -> i64 {
    let steps = ladder.steps();
    if lapse {
        return steps[0];
    }
    match steps.iter().position(|&s| s == prev_interval) {
        Some(i) => steps[(i + 1).min(steps.len() - 1)],
        None => steps[0],
    }
}

pub fn next_ease(prev_ease: i64, correct: bool) -> i64 {
    if correct {
        (prev_ease + EASE_STEP_UP).min(EASE_MAX)
    } else {
        (prev_ease - EASE_STEP_DOWN).max(EASE_MIN)
    }
}

pub fn due_at(now: DateTime<Utc>, interval_days: i64) -> DateTime<Utc> {
    now + Duration::days(interval_days)
}

/// Apply one answer to a review item, creating the item if it does not exist yet.
pub fn apply_answer(
    current: Option<&ReviewItem>,
    user_id: &str,
    question_id: &str,
    correct: bool,
    ladder: Ladder,
    now: DateTime<Utc>,
) -> ReviewItem {
    let (prev_interval, prev_ease, prev_lapses) = match current {
        Some(item) => (item.interval_days, item.ease, item.lapses),
        None => (0, EASE_START, 0),
    };

    let interval_days = next_interval(ladder, prev_interval, !correct);

    ReviewItem {
        user_id: user_id.to_string(),
        question_id: question_id.to_string(),
        due_at: due_at(now, interval_days),
        interval_days,
        ease: next_ease(prev_ease, correct),
        lapses: if correct { prev_lapses } else { prev_lapses + 1 },
    }
}

/// Queue entry for a question missed during a diagnostic: due immediately on the
/// first MASTERY rung whatever mode governs later scheduling. An existing row keeps
/// its history and takes the miss like any wrong answer.
pub fn seed_missed(
    current: Option<&ReviewItem>,
    user_id: &str,
    question_id: &str,
    now: DateTime<Utc>,
) -> ReviewItem {
    let (ease, lapses) = match current {
        Some(prev) => (next_ease(prev.ease, false), prev.lapses + 1),
        None => (EASE_START, 1),
    };
    ReviewItem {
        user_id: user_id.to_string(),
        question_id: question_id.to_string(),
        due_at: now,
        interval_days: Ladder::Mastery.first(),
        ease,
        lapses,
    }
}
