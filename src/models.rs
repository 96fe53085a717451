use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::mastery::{self, MasteryBand};
use crate::mode::StudyMode;

// Reference data: one node of the skill DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub cluster: String,
    pub prerequisite_ids: Vec<String>,
    pub order_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub test_date: Option<NaiveDate>,
    pub daily_time_cap_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub user_id: String,
    pub skill_id: String,
    pub seen: i64,
    pub correct: i64,
    pub mastery_level: i64,
    pub median_time_ms: i64,
}

impl MasteryRecord {
    pub fn empty(user_id: &str, skill_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            skill_id: skill_id.to_string(),
            seen: 0,
            correct: 0,
            mastery_level: 0,
            median_time_ms: 0,
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.correct as f64 / self.seen as f64
        }
    }

    pub fn is_mastered(&self) -> bool {
        self.mastery_level >= mastery::MASTERY_LEVEL_CUTOFF
    }

    pub fn band(&self) -> MasteryBand {
        MasteryBand::from_counts(self.correct, self.seen)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub user_id: String,
    pub question_id: String,
    pub due_at: DateTime<Utc>,
    pub interval_days: i64,
    pub ease: i64,
    pub lapses: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Review,
    Drill,
    Learn,
    Sim,
    Warmup,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Review => "REVIEW",
            TaskType::Drill => "DRILL",
            TaskType::Learn => "LEARN",
            TaskType::Sim => "SIM",
            TaskType::Warmup => "WARMUP",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "REVIEW" => Some(TaskType::Review),
            "DRILL" => Some(TaskType::Drill),
            "LEARN" => Some(TaskType::Learn),
            "SIM" => Some(TaskType::Sim),
            "WARMUP" => Some(TaskType::Warmup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(TaskStatus::Pending),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "COMPLETED" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

// One entry of a day's plan snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub skill_id: Option<String>,
    pub question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub size: i64,
    pub estimated_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
}

impl PlanTask {
    /// Reference part of the task upsert key. Empty for unreferenced tasks.
    pub fn ref_key(&self) -> &str {
        self.skill_id
            .as_deref()
            .or(self.question_id.as_deref())
            .or(self.section.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyTask {
    pub id: i64,
    pub user_id: String,
    pub the_date: NaiveDate,
    pub task_type: TaskType,
    pub skill_id: Option<String>,
    pub question_id: Option<String>,
    pub section: Option<String>,
    pub size: i64,
    pub status: TaskStatus,
    pub accuracy: Option<f64>,
    pub median_time_ms: Option<i64>,
    pub reward_cents: i64,
}

impl StudyTask {
    pub fn ref_key(&self) -> &str {
        self.skill_id
            .as_deref()
            .or(self.question_id.as_deref())
            .or(self.section.as_deref())
            .unwrap_or("")
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlanDay {
    pub user_id: String,
    pub date: NaiveDate,
    pub mode: StudyMode,
    pub days_left: Option<i64>,
    pub tasks: Vec<PlanTask>,
    pub generated_at: DateTime<Utc>,
}

// Output shape for "generate today's plan"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPlan {
    pub date: NaiveDate,
    pub mode_name: &'static str,
    pub days_left: Option<i64>,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<PlanTask>,
}

impl DailyPlan {
    pub fn total_minutes(&self) -> i64 {
        self.tasks.iter().map(|t| t.estimated_minutes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub id: i64,
    pub user_id: String,
    pub section: String,
    pub block: i64,
    pub responses: serde_json::Value,
    pub score: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub question_id: String,
    pub correct: bool,
    #[serde(default)]
    pub time_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_id: i64,
    pub accuracy: f64,
    pub time_ms: i64,
    #[serde(default)]
    pub answers: Option<Vec<AnswerEvent>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub task: StudyTask,
    pub mastery: Option<MasteryRecord>,
    pub reviews: Vec<ReviewItem>,
    pub already_completed: bool,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod mastery_record_tests {
        use super::*;

        fn make_record(seen: i64, correct: i64, mastery_level: i64) -> MasteryRecord {
            MasteryRecord {
                seen,
                correct,
                mastery_level,
                ..MasteryRecord::empty("u1", "s1")
            }
        }

        #[test]
        fn accuracy_zero_seen() {
            assert_eq!(make_record(0, 0, 0).accuracy(), 0.0);
        }

        #[test]
        fn accuracy_partial() {
            assert_eq!(make_record(4, 3, 0).accuracy(), 0.75);
        }

        #[test]
        fn mastered_at_cutoff() {
            assert!(make_record(20, 17, 85).is_mastered());
            assert!(!make_record(20, 16, 0).is_mastered());
        }

        #[test]
        fn band_reflects_raw_accuracy() {
            assert_eq!(make_record(0, 0, 0).band(), MasteryBand::NotStarted);
            assert_eq!(make_record(10, 7, 0).band(), MasteryBand::Learning);
        }
    }

    mod task_type_tests {
        use super::*;

        #[test]
        fn as_str_returns_correct_values() {
            assert_eq!(TaskType::Review.as_str(), "REVIEW");
            assert_eq!(TaskType::Drill.as_str(), "DRILL");
            assert_eq!(TaskType::Learn.as_str(), "LEARN");
            assert_eq!(TaskType::Sim.as_str(), "SIM");
            assert_eq!(TaskType::Warmup.as_str(), "WARMUP");
        }

        #[test]
        fn from_str_case_insensitive() {
            assert_eq!(TaskType::from_str("drill"), Some(TaskType::Drill));
            assert_eq!(TaskType::from_str("Warmup"), Some(TaskType::Warmup));
            assert_eq!(TaskType::from_str("flash"), None);
        }

        #[test]
        fn serializes_uppercase() {
            let json = serde_json::to_string(&TaskType::Sim).unwrap();
            assert_eq!(json, "\"SIM\"");
        }
    }

    mod task_status_tests {
        use super::*;

        #[test]
        fn round_trips_names() {
            for s in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed] {
                assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
            }
        }

        #[test]
        fn serde_matches_as_str() {
            let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
            assert_eq!(json, "\"IN_PROGRESS\"");
        }

        #[test]
        fn from_str_invalid_returns_none() {
            assert_eq!(TaskStatus::from_str("DONE"), None);
        }
    }

    mod plan_task_tests {
        use super::*;

        fn task(skill: Option<&str>, question: Option<&str>, section: Option<&str>) -> PlanTask {
            PlanTask {
                task_type: TaskType::Drill,
                skill_id: skill.map(String::from),
                question_id: question.map(String::from),
                section: section.map(String::from),
                size: 5,
                estimated_minutes: 8,
                task_id: None,
            }
        }

        #[test]
        fn ref_key_prefers_skill() {
            assert_eq!(task(Some("s1"), Some("q1"), None).ref_key(), "s1");
        }

        #[test]
        fn ref_key_falls_back_to_question_then_section() {
            assert_eq!(task(None, Some("q1"), None).ref_key(), "q1");
            assert_eq!(task(None, None, Some("english")).ref_key(), "english");
            assert_eq!(task(None, None, None).ref_key(), "");
        }

        #[test]
        fn serializes_type_field_and_hides_empty_extras() {
            let json = serde_json::to_value(task(Some("s1"), None, None)).unwrap();
            assert_eq!(json["type"], "DRILL");
            assert!(json.get("section").is_none());
            assert!(json.get("task_id").is_none());
            assert!(json["question_id"].is_null());
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_with_number() {
            let output = JsonOutput::ok(42);
            assert!(output.success);
            assert_eq!(output.data, Some(42));
            assert!(output.error.is_none());
        }

        #[test]
        fn err_with_string() {
            let output = JsonOutput::<()>::err("something went wrong");
            assert!(!output.success);
            assert!(output.data.is_none());
            assert_eq!(output.error, Some("something went wrong".to_string()));
        }

        #[test]
        fn serializes_err_correctly() {
            let output = JsonOutput::<()>::err("error");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":false"));
            assert!(json.contains("\"data\":null"));
            assert!(json.contains("\"error\":\"error\""));
        }
    }
}
