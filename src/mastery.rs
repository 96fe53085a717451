use serde::{Deserialize, Serialize};

use crate::models::MasteryRecord;

pub const MASTERY_LEVEL_CUTOFF: i64 = 85;

/// Fold one completed task into the rolling aggregate for its skill.
///
/// Below the 85% threshold the level collapses to 0, so a skill at 84% and one
/// at 10% look the same to the planner. Callers that need the gradient should
/// use [`MasteryRecord::accuracy`] or [`MasteryBand`].
pub fn apply_completion(
    current: Option<&MasteryRecord>,
    user_id: &str,
    skill_id: &str,
    task_size: i64,
    accuracy: f64,
    median_time_ms: i64,
) -> MasteryRecord {
    let base = current
        .cloned()
        .unwrap_or_else(|| MasteryRecord::empty(user_id, skill_id));

    let size = task_size.max(0);
    let seen = base.seen + size;
    let gained = (accuracy.clamp(0.0, 1.0) * size as f64).round() as i64;
    let correct = (base.correct + gained).min(seen);

    MasteryRecord {
        seen,
        correct,
        mastery_level: mastery_level(correct, seen),
        median_time_ms,
        ..base
    }
}

pub fn mastery_level(correct: i64, seen: i64) -> i64 {
    if seen <= 0 {
        return 0;
    }
    // integer form of accuracy >= 0.85, floor(accuracy * 100)
    if correct * 100 >= MASTERY_LEVEL_CUTOFF * seen {
        correct * 100 / seen
    } else {
        0
    }
}

pub fn median(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

// Display banding over raw accuracy, independent of the binary level above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MasteryBand {
    NotStarted,
    Beginner,
    Learning,
    Proficient,
    Mastered,
}

impl MasteryBand {
    pub fn from_counts(correct: i64, seen: i64) -> Self {
        if seen <= 0 {
            return MasteryBand::NotStarted;
        }
        let pct = correct as f64 * 100.0 / seen as f64;
        if pct >= 90.0 {
            MasteryBand::Mastered
        } else if pct >= 75.0 {
            MasteryBand::Proficient
        } else if pct >= 60.0 {
            MasteryBand::Learning
        } else {
            MasteryBand::Beginner
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MasteryBand::NotStarted => "Not Started",
            MasteryBand::Beginner => "Beginner",
            MasteryBand::Learning => "Learning",
            MasteryBand::Proficient => "Proficient",
            MasteryBand::Mastered => "Mastered",
        }
    }
}
