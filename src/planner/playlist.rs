// Greedy first-fit over priority order. Never reorders to pack leftover minutes.

use crate::planner::Candidate;

pub const MAX_TASKS_PER_DAY: usize = 3;

pub fn select(candidates: Vec<Candidate>, cap_minutes: i64) -> Vec<Candidate> {
    let mut remaining = cap_minutes;
    let mut picked = Vec::new();

    if remaining <= 0 {
        return picked;
    }

    for candidate in candidates {
        if picked.len() >= MAX_TASKS_PER_DAY {
            break;
        }
        if candidate.estimated_minutes <= remaining {
            remaining -= candidate.estimated_minutes;
            picked.push(candidate);
        }
    }

    picked
}
