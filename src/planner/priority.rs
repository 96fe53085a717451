//! Candidate generation and prioritization.
//!
//! Candidates are scored as:
//! - Category band: `(PRECEDENCE_CEILING - weight) * CATEGORY_SCALE`, where a
//!   lower mode weight means an earlier category (review 1, drill 2, learn 3/4)
//! - Within-category slot: `slot_base - rank`, rank 0 being the most urgent
//!
//! The band always dominates the slot, so reviews precede drills and drills
//! precede new learning regardless of how many candidates each produces.

use std::collections::HashMap;

use crate::mode::{ModeWeights, StudyMode};
use crate::models::{MasteryRecord, ReviewItem, Skill, TaskType};
use crate::planner::{Candidate, PlanInputs, PlannerLimits};

pub const CATEGORY_SCALE: i64 = 1000;
const PRECEDENCE_CEILING: i64 = 5;

pub const REVIEW_SLOT_BASE: i64 = 100;
pub const DRILL_SLOT_BASE: i64 = 50;
pub const LEARN_SLOT_BASE: i64 = 25;

/// Size and estimated minutes per candidate type.
pub const REVIEW_SHAPE: (i64, i64) = (1, 2);
pub const DRILL_SHAPE: (i64, i64) = (5, 8);
pub const LEARN_SHAPE: (i64, i64) = (3, 12);

pub fn category_priority(weight: i64, slot_base: i64, rank: usize) -> i64 {
    let band = (PRECEDENCE_CEILING - weight) * CATEGORY_SCALE;
    let slot = slot_base.saturating_sub(rank as i64).max(0);
    band + slot
}

/// Build every candidate for today, sorted by descending priority (stable).
pub fn build_candidates(
    mode: StudyMode,
    inputs: &PlanInputs<'_>,
    limits: &PlannerLimits,
) -> Vec<Candidate> {
    let weights = mode.weights();
    let mut out = Vec::new();

    for (rank, item) in due_reviews(inputs).into_iter().enumerate() {
        out.push(Candidate {
            task_type: TaskType::Review,
            skill_id: None,
            question_id: Some(item.question_id.clone()),
            size: REVIEW_SHAPE.0,
            estimated_minutes: REVIEW_SHAPE.1,
            priority: category_priority(weights.review, REVIEW_SLOT_BASE, rank),
        });
    }

    for (rank, record) in weakest_skills(inputs.mastery, inputs.skills, limits.drill)
        .into_iter()
        .enumerate()
    {
        out.push(Candidate {
            task_type: TaskType::Drill,
            skill_id: Some(record.skill_id.clone()),
            question_id: None,
            size: DRILL_SHAPE.0,
            estimated_minutes: DRILL_SHAPE.1,
            priority: category_priority(weights.drill, DRILL_SLOT_BASE, rank),
        });
    }

    let learnable = learnable_skills(mode, &weights, inputs.skills, inputs.mastery);
    for (rank, skill) in learnable.into_iter().take(limits.learn).enumerate() {
        out.push(Candidate {
            task_type: TaskType::Learn,
            skill_id: Some(skill.id.clone()),
            question_id: None,
            size: LEARN_SHAPE.0,
            estimated_minutes: LEARN_SHAPE.1,
            priority: category_priority(weights.learn, LEARN_SLOT_BASE, rank),
        });
    }

    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

/// Review items due at or before `now`, oldest first.
pub fn due_reviews<'a>(inputs: &PlanInputs<'a>) -> Vec<&'a ReviewItem> {
    let mut due: Vec<&ReviewItem> = inputs
        .reviews
        .iter()
        .filter(|r| r.due_at <= inputs.now)
        .collect();
    due.sort_by_key(|r| r.due_at);
    due
}

/// Up to `limit` attempted skills, lowest mastery first.
pub fn weakest_skills<'a>(
    mastery: &'a [MasteryRecord],
    skills: &[Skill],
    limit: usize,
) -> Vec<&'a MasteryRecord> {
    let order: HashMap<&str, i64> = skills
        .iter()
        .map(|s| (s.id.as_str(), s.order_index))
        .collect();

    let mut attempted: Vec<&MasteryRecord> = mastery.iter().filter(|m| m.seen > 0).collect();
    attempted.sort_by(|a, b| {
        a.mastery_level
            .cmp(&b.mastery_level)
            .then(a.accuracy().total_cmp(&b.accuracy()))
            .then_with(|| {
                let oa = order.get(a.skill_id.as_str()).copied().unwrap_or(i64::MAX);
                let ob = order.get(b.skill_id.as_str()).copied().unwrap_or(i64::MAX);
                oa.cmp(&ob)
            })
    });
    attempted.truncate(limit);
    attempted
}

/// Skills with no mastery record whose prerequisites are all mastered, in curriculum order.
///
/// A prerequisite id that is missing from `mastery` (including ids that are
/// not in the graph at all) counts as unmet.
pub fn frontier<'a>(skills: &'a [Skill], mastery: &[MasteryRecord]) -> Vec<&'a Skill> {
    let by_skill: HashMap<&str, &MasteryRecord> = mastery
        .iter()
        .map(|m| (m.skill_id.as_str(), m))
        .collect();

    let mut out: Vec<&Skill> = skills
        .iter()
        .filter(|s| !by_skill.contains_key(s.id.as_str()))
        .filter(|s| {
            s.prerequisite_ids.iter().all(|p| {
                by_skill
                    .get(p.as_str())
                    .map(|m| m.is_mastered())
                    .unwrap_or(false)
            })
        })
        .collect();
    out.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
    out
}

/// True when some other skill lists `skill` as a prerequisite.
/// Skills eligible for LEARN today. Weights that forbid learning still let
/// CRASH pick up frontier skills that unlock others.
pub fn learnable_skills<'a>(
    mode: StudyMode,
    weights: &ModeWeights,
    skills: &'a [Skill],
    mastery: &[MasteryRecord],
) -> Vec<&'a Skill> {
    if weights.allow_learn {
        frontier(skills, mastery)
    } else if mode == StudyMode::Crash {
        frontier(skills, mastery)
            .into_iter()
            .filter(|s| unlocks_something(s, skills))
            .collect()
    } else {
        Vec::new()
    }
}

pub fn unlocks_something(skill: &Skill, skills: &[Skill]) -> bool {
    skills
        .iter()
        .any(|other| other.id != skill.id && other.prerequisite_ids.contains(&skill.id))
}
