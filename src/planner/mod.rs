//! Daily plan construction.
//!
//! The final week before the test follows a fixed taper ([`test_week`]).
//! Every other day runs candidates through [`priority`] and then fills the
//! time budget with [`playlist`].

pub mod playlist;
pub mod priority;
pub mod test_week;

use chrono::{DateTime, Utc};

use crate::mode::StudyMode;
use crate::models::{MasteryRecord, PlanTask, ReviewItem, Skill, TaskType};

pub const DEFAULT_DRILL_LIMIT: usize = 5;
pub const DEFAULT_LEARN_LIMIT: usize = 2;

// An unscheduled unit of work competing for today's budget
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub task_type: TaskType,
    pub skill_id: Option<String>,
    pub question_id: Option<String>,
    pub size: i64,
    pub estimated_minutes: i64,
    pub priority: i64,
}

impl Candidate {
    pub fn into_plan_task(self) -> PlanTask {
        PlanTask {
            task_type: self.task_type,
            skill_id: self.skill_id,
            question_id: self.question_id,
            section: None,
            size: self.size,
            estimated_minutes: self.estimated_minutes,
            task_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerLimits {
    pub drill: usize,
    pub learn: usize,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            drill: DEFAULT_DRILL_LIMIT,
            learn: DEFAULT_LEARN_LIMIT,
        }
    }
}

pub struct PlanInputs<'a> {
    pub skills: &'a [Skill],
    pub mastery: &'a [MasteryRecord],
    pub reviews: &'a [ReviewItem],
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    pub mode: StudyMode,
    pub tasks: Vec<PlanTask>,
    pub candidates_considered: usize,
    pub overridden: bool,
}

pub fn plan_day(
    days_left: Option<i64>,
    cap_minutes: i64,
    inputs: &PlanInputs<'_>,
    limits: &PlannerLimits,
) -> DayPlan {
    let mode = StudyMode::for_days_left(days_left);

    if let Some(task) = test_week::override_for(days_left) {
        return DayPlan {
            mode,
            tasks: vec![task],
            candidates_considered: 0,
            overridden: true,
        };
    }

    let candidates = priority::build_candidates(mode, inputs, limits);
    let considered = candidates.len();
    let tasks = playlist::select(candidates, cap_minutes)
        .into_iter()
        .map(Candidate::into_plan_task)
        .collect();

    DayPlan {
        mode,
        tasks,
        candidates_considered: considered,
        overridden: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn skill(id: &str, prereqs: &[&str], order: i64) -> Skill {
        Skill {
            id: id.to_string(),
            name: id.to_uppercase(),
            subject: "math".to_string(),
            cluster: "algebra".to_string(),
            prerequisite_ids: prereqs.iter().map(|p| p.to_string()).collect(),
            order_index: order,
        }
    }

    fn mastery(skill_id: &str, level: i64, seen: i64, correct: i64) -> MasteryRecord {
        MasteryRecord {
            seen,
            correct,
            mastery_level: level,
            ..MasteryRecord::empty("u1", skill_id)
        }
    }

    mod plan_day_tests {
        use super::*;

        #[test]
        fn sim_days_bypass_candidates() {
            let skills = vec![skill("a", &[], 0)];
            let reviews = vec![ReviewItem {
                user_id: "u1".into(),
                question_id: "q1".into(),
                due_at: now(),
                interval_days: 1,
                ease: 250,
                lapses: 0,
            }];
            let inputs = PlanInputs {
                skills: &skills,
                mastery: &[],
                reviews: &reviews,
                now: now(),
            };
            for d in [7, 5, 3] {
                let plan = plan_day(Some(d), 60, &inputs, &PlannerLimits::default());
                assert!(plan.overridden);
                assert_eq!(plan.candidates_considered, 0);
                assert_eq!(plan.tasks.len(), 1);
                assert_eq!(plan.tasks[0].task_type, TaskType::Sim);
            }
        }

        #[test]
        fn weak_skills_fill_the_budget_before_learning() {
            let skills = vec![
                skill("s40", &[], 0),
                skill("s55", &[], 1),
                skill("s60", &[], 2),
                skill("new1", &[], 3),
                skill("new2", &[], 4),
                skill("new3", &[], 5),
            ];
            let rows = vec![
                mastery("s60", 60, 10, 6),
                mastery("s40", 40, 10, 4),
                mastery("s55", 55, 10, 5),
            ];
            let inputs = PlanInputs {
                skills: &skills,
                mastery: &rows,
                reviews: &[],
                now: now(),
            };
            let plan = plan_day(None, 30, &inputs, &PlannerLimits::default());

            assert_eq!(plan.mode, StudyMode::Mastery);
            // 3 drills + 2 learn candidates
            assert_eq!(plan.candidates_considered, 5);
            let picked: Vec<(TaskType, Option<&str>)> = plan
                .tasks
                .iter()
                .map(|t| (t.task_type, t.skill_id.as_deref()))
                .collect();
            assert_eq!(
                picked,
                vec![
                    (TaskType::Drill, Some("s40")),
                    (TaskType::Drill, Some("s55")),
                    (TaskType::Drill, Some("s60")),
                ]
            );
            let minutes: i64 = plan.tasks.iter().map(|t| t.estimated_minutes).sum();
            assert_eq!(minutes, 24);
        }

        #[test]
        fn nothing_to_do_is_empty_plan() {
            let inputs = PlanInputs {
                skills: &[],
                mastery: &[],
                reviews: &[],
                now: now(),
            };
            let plan = plan_day(Some(20), 30, &inputs, &PlannerLimits::default());
            assert_eq!(plan.mode, StudyMode::Accel);
            assert!(plan.tasks.is_empty());
            assert!(!plan.overridden);
        }
    }
}
