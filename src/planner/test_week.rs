// Fixed taper for the last week: one deterministic task on selected days.

use crate::models::{PlanTask, TaskType};

pub const SIM_SECTION: &str = "english";

fn fixed(task_type: TaskType, section: Option<&str>, size: i64, minutes: i64) -> PlanTask {
    PlanTask {
        task_type,
        skill_id: None,
        question_id: None,
        section: section.map(String::from),
        size,
        estimated_minutes: minutes,
        task_id: None,
    }
}

pub fn override_for(days_left: Option<i64>) -> Option<PlanTask> {
    match days_left? {
        7 | 5 | 3 => Some(fixed(TaskType::Sim, Some(SIM_SECTION), 75, 45)),
        2 => Some(fixed(TaskType::Review, None, 10, 20)),
        1 => Some(fixed(TaskType::Warmup, None, 5, 15)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_days() {
        for d in [7, 5, 3] {
            let task = override_for(Some(d)).unwrap();
            assert_eq!(task.task_type, TaskType::Sim);
            assert_eq!(task.section.as_deref(), Some("english"));
            assert_eq!(task.size, 75);
            assert_eq!(task.estimated_minutes, 45);
        }
    }

    #[test]
    fn two_days_out_is_review() {
        let task = override_for(Some(2)).unwrap();
        assert_eq!(task.task_type, TaskType::Review);
        assert_eq!((task.size, task.estimated_minutes), (10, 20));
        assert!(task.section.is_none());
    }

    #[test]
    fn day_before_is_warmup() {
        let task = override_for(Some(1)).unwrap();
        assert_eq!(task.task_type, TaskType::Warmup);
        assert_eq!((task.size, task.estimated_minutes), (5, 15));
    }

    #[test]
    fn other_days_have_no_override() {
        for d in [None, Some(0), Some(4), Some(6), Some(8), Some(30), Some(-2)] {
            assert!(override_for(d).is_none(), "days_left={:?}", d);
        }
    }
}
