//! Orchestration over the store.
//!
//! Each operation resolves "now" and "today" once, loads what the pure
//! planners need, and writes the results back. Multi-row writes run inside a
//! single `BEGIN IMMEDIATE` transaction so they land all-or-nothing.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::clock::{days_until, Clock, TimeContext};
use crate::db::{Database, Stats};
use crate::diagnostic::{self, DiagnosticResult, DiagnosticSubmission};
use crate::error::{Result, StudyError};
use crate::mastery;
use crate::mode::StudyMode;
use crate::models::{
    CompletionOutcome, DailyPlan, DiagnosticRecord, MasteryRecord, PlanTask, Profile,
    ReviewItem, Skill, StudyPlanDay, StudyTask, TaskCompletion, TaskType,
};
use crate::planner::{self, PlanInputs, PlannerLimits};
use crate::review::{self, Ladder};

/// A REVIEW task completed without per-question answers counts as correct at or above this.
pub const REVIEW_PASS_ACCURACY: f64 = 0.5;

pub struct StudyService<'a, C: Clock> {
    db: &'a Database,
    clock: C,
    time: TimeContext,
    limits: PlannerLimits,
}

impl<'a, C: Clock> StudyService<'a, C> {
    pub fn new(db: &'a Database, clock: C, time: TimeContext, limits: PlannerLimits) -> Self {
        Self {
            db,
            clock,
            time,
            limits,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.time.today(self.clock.now())
    }

    // Profile and skill graph

    pub fn set_profile(
        &self,
        user_id: &str,
        test_date: Option<NaiveDate>,
        daily_time_cap_minutes: i64,
    ) -> Result<Profile> {
        check_user(user_id)?;
        if daily_time_cap_minutes < 0 {
            return Err(StudyError::invalid("daily time cap must not be negative"));
        }
        let profile = Profile {
            user_id: user_id.to_string(),
            test_date,
            daily_time_cap_minutes,
        };
        self.db.upsert_profile(&profile)?;
        info!(user_id, ?test_date, daily_time_cap_minutes, "profile saved");
        Ok(profile)
    }

    pub fn profile(&self, user_id: &str) -> Result<Profile> {
        check_user(user_id)?;
        require_profile(self.db, user_id)
    }

    pub fn add_skill(&self, skill: Skill) -> Result<Skill> {
        if skill.id.trim().is_empty() || skill.name.trim().is_empty() {
            return Err(StudyError::invalid("skill id and name are required"));
        }
        if skill.prerequisite_ids.iter().any(|p| p == &skill.id) {
            return Err(StudyError::invalid(format!(
                "skill '{}' cannot be its own prerequisite",
                skill.id
            )));
        }
        self.db.immediate(|db| db.upsert_skill(&skill))?;
        debug!(skill_id = %skill.id, prerequisites = skill.prerequisite_ids.len(), "skill saved");
        Ok(skill)
    }

    pub fn skills(&self) -> Result<Vec<Skill>> {
        self.db.list_skills()
    }

    // Read helpers

    pub fn days_left(&self, user_id: &str) -> Result<Option<i64>> {
        let profile = self.profile(user_id)?;
        Ok(days_until(profile.test_date, self.today()))
    }

    pub fn due_reviews(&self, user_id: &str) -> Result<Vec<ReviewItem>> {
        check_user(user_id)?;
        self.db.due_reviews(user_id, self.clock.now())
    }

    pub fn mastery(&self, user_id: &str) -> Result<Vec<MasteryRecord>> {
        check_user(user_id)?;
        self.db.list_mastery(user_id)
    }

    pub fn diagnostics(&self, user_id: &str) -> Result<Vec<DiagnosticRecord>> {
        check_user(user_id)?;
        self.db.list_diagnostics(user_id)
    }

    pub fn stats(&self, user_id: &str) -> Result<Stats> {
        check_user(user_id)?;
        self.db.get_stats(user_id, self.clock.now())
    }

    // Planning

    /// Today's plan for `user_id`, generated at most once per (user, date).
    ///
    /// A repeat call returns the stored snapshot even if mastery or the
    /// review queue changed in between.
    pub fn generate_plan(&self, user_id: &str) -> Result<DailyPlan> {
        check_user(user_id)?;
        let now = self.clock.now();
        let today = self.time.today(now);

        let (day, stored, created) = self.db.immediate(|db| {
            let profile = require_profile(db, user_id)?;

            if let Some(existing) = db.get_plan_day(user_id, today)? {
                let stored = db.list_tasks(user_id, today)?;
                return Ok((existing, stored, false));
            }

            let days_left = days_until(profile.test_date, today);
            let skills = db.list_skills()?;
            let mastery = db.list_mastery(user_id)?;
            let reviews = db.due_reviews(user_id, now)?;
            let inputs = PlanInputs {
                skills: &skills,
                mastery: &mastery,
                reviews: &reviews,
                now,
            };
            let plan = planner::plan_day(
                days_left,
                profile.daily_time_cap_minutes,
                &inputs,
                &self.limits,
            );
            debug!(
                user_id,
                mode = plan.mode.as_str(),
                candidates = plan.candidates_considered,
                overridden = plan.overridden,
                "planned day"
            );

            let day = StudyPlanDay {
                user_id: user_id.to_string(),
                date: today,
                mode: plan.mode,
                days_left,
                tasks: plan.tasks,
                generated_at: now,
            };
            db.insert_plan_day(&day)?;
            for task in &day.tasks {
                db.insert_task(user_id, today, task)?;
            }
            let stored = db.list_tasks(user_id, today)?;
            Ok((day, stored, true))
        })?;

        if created {
            info!(
                user_id,
                date = %today,
                mode = day.mode.as_str(),
                tasks = day.tasks.len(),
                "generated plan"
            );
        } else {
            debug!(user_id, date = %today, "returning stored plan");
        }

        Ok(DailyPlan {
            date: day.date,
            mode_name: day.mode.as_str(),
            days_left: day.days_left,
            generated_at: day.generated_at,
            tasks: attach_task_ids(day.tasks, &stored),
        })
    }

    // Completion

    /// Marks a pending task as started. Started or completed tasks come back unchanged.
    pub fn start_task(&self, user_id: &str, task_id: i64) -> Result<StudyTask> {
        check_user(user_id)?;
        let (task, started) = self.db.immediate(|db| {
            let task = db
                .get_task(task_id)?
                .filter(|t| t.user_id == user_id)
                .ok_or_else(|| StudyError::not_found(format!("task {}", task_id)))?;
            if !db.mark_task_started(task.id)? {
                return Ok((task, false));
            }
            let task = db
                .get_task(task_id)?
                .ok_or_else(|| StudyError::not_found(format!("task {}", task_id)))?;
            Ok((task, true))
        })?;

        if started {
            info!(user_id, task_id, "task started");
        } else {
            debug!(user_id, task_id, status = task.status.as_str(), "task not pending");
        }
        Ok(task)
    }

    pub fn complete_task(&self, user_id: &str, event: &TaskCompletion) -> Result<CompletionOutcome> {
        check_user(user_id)?;
        validate_completion(event)?;
        let now = self.clock.now();
        let ladder = self.current_mode(user_id, now)?.ladder();

        let outcome = self.db.immediate(|db| {
            let task = db
                .get_task(event.task_id)?
                .filter(|t| t.user_id == user_id)
                .ok_or_else(|| StudyError::not_found(format!("task {}", event.task_id)))?;

            if task.is_completed() {
                let mastery = match task.skill_id.as_deref() {
                    Some(skill_id) => db.get_mastery(user_id, skill_id)?,
                    None => None,
                };
                return Ok(CompletionOutcome {
                    task,
                    mastery,
                    reviews: vec![],
                    already_completed: true,
                });
            }

            let answers = event.answers.as_deref().unwrap_or(&[]);
            let times: Vec<i64> = answers
                .iter()
                .map(|a| a.time_ms)
                .filter(|t| *t > 0)
                .collect();
            let median_time_ms = mastery::median(&times).unwrap_or(event.time_ms);

            db.mark_task_completed(task.id, event.accuracy, median_time_ms)?;

            let mastery = match task.skill_id.as_deref() {
                Some(skill_id) => {
                    let current = db.get_mastery(user_id, skill_id)?;
                    let updated = mastery::apply_completion(
                        current.as_ref(),
                        user_id,
                        skill_id,
                        task.size,
                        event.accuracy,
                        median_time_ms,
                    );
                    db.upsert_mastery(&updated)?;
                    Some(updated)
                }
                None => None,
            };

            let mut reviews = Vec::with_capacity(answers.len());
            for answer in answers {
                reviews.push(record_answer(
                    db,
                    user_id,
                    &answer.question_id,
                    answer.correct,
                    ladder,
                    now,
                )?);
            }
            if answers.is_empty() && task.task_type == TaskType::Review {
                if let Some(question_id) = task.question_id.as_deref() {
                    let correct = event.accuracy >= REVIEW_PASS_ACCURACY;
                    reviews.push(record_answer(db, user_id, question_id, correct, ladder, now)?);
                }
            }

            let task = db
                .get_task(task.id)?
                .ok_or_else(|| StudyError::not_found(format!("task {}", event.task_id)))?;

            Ok(CompletionOutcome {
                task,
                mastery,
                reviews,
                already_completed: false,
            })
        })?;

        if outcome.already_completed {
            debug!(user_id, task_id = event.task_id, "task already completed");
        } else {
            info!(
                user_id,
                task_id = event.task_id,
                accuracy = event.accuracy,
                reviews = outcome.reviews.len(),
                "task completed"
            );
        }
        Ok(outcome)
    }

    // Reviews

    pub fn answer_review(&self, user_id: &str, question_id: &str, correct: bool) -> Result<ReviewItem> {
        check_user(user_id)?;
        check_question(question_id)?;
        let now = self.clock.now();
        let ladder = self.current_mode(user_id, now)?.ladder();

        let item = self
            .db
            .immediate(|db| record_answer(db, user_id, question_id, correct, ladder, now))?;
        debug!(
            user_id,
            question_id,
            correct,
            interval_days = item.interval_days,
            "review answered"
        );
        Ok(item)
    }

    // Diagnostics

    pub fn submit_diagnostic(
        &self,
        user_id: &str,
        submission: &DiagnosticSubmission,
    ) -> Result<DiagnosticResult> {
        check_user(user_id)?;
        diagnostic::validate(submission)?;
        let now = self.clock.now();

        let scored = diagnostic::score(&submission.blocks);
        let responses = serde_json::to_value(&submission.blocks)?;
        let diagnostic_id = self.db.insert_diagnostic(
            user_id,
            &submission.section,
            submission.block,
            &responses,
            scored.score,
            now,
        )?;

        // Best-effort: a row the queue cannot take is logged and skipped
        let mut seen = HashSet::new();
        let mut seeded_reviews = 0;
        for question_id in &scored.missed_question_ids {
            if !seen.insert(question_id.as_str()) {
                continue;
            }
            if !diagnostic::is_canonical_question_id(question_id) {
                warn!(user_id, question_id = %question_id, "skipping review seed for non-canonical question id");
                continue;
            }
            let seeded = self.db.immediate(|db| {
                let current = db.get_review(user_id, question_id)?;
                db.upsert_review(&review::seed_missed(current.as_ref(), user_id, question_id, now))
            });
            match seeded {
                Ok(()) => seeded_reviews += 1,
                Err(e) => {
                    warn!(user_id, question_id = %question_id, error = %e, "failed to seed review")
                }
            }
        }

        info!(
            user_id,
            diagnostic_id,
            section = %submission.section,
            score = scored.score,
            correct = scored.total_correct,
            questions = scored.total_questions,
            seeded_reviews,
            "diagnostic recorded"
        );

        Ok(DiagnosticResult {
            diagnostic_id,
            predicted_score: scored.score,
            scaled_score: scored.scaled_score,
            weak_skills: scored.weak_skills,
            seeded_reviews,
        })
    }

    // Mode that governs review ladders right now. No profile means no test date.
    fn current_mode(&self, user_id: &str, now: DateTime<Utc>) -> Result<StudyMode> {
        let test_date = self.db.get_profile(user_id)?.and_then(|p| p.test_date);
        Ok(StudyMode::for_days_left(days_until(
            test_date,
            self.time.today(now),
        )))
    }
}

fn require_profile(db: &Database, user_id: &str) -> Result<Profile> {
    db.get_profile(user_id)?
        .ok_or_else(|| StudyError::not_found(format!("profile for user '{}'", user_id)))
}

fn record_answer(
    db: &Database,
    user_id: &str,
    question_id: &str,
    correct: bool,
    ladder: Ladder,
    now: DateTime<Utc>,
) -> Result<ReviewItem> {
    let current = db.get_review(user_id, question_id)?;
    let next = review::apply_answer(current.as_ref(), user_id, question_id, correct, ladder, now);
    db.upsert_review(&next)?;
    Ok(next)
}

fn attach_task_ids(tasks: Vec<PlanTask>, stored: &[StudyTask]) -> Vec<PlanTask> {
    tasks
        .into_iter()
        .map(|mut task| {
            task.task_id = stored
                .iter()
                .find(|s| s.task_type == task.task_type && s.ref_key() == task.ref_key())
                .map(|s| s.id);
            task
        })
        .collect()
}

fn check_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(StudyError::invalid("user id is required"));
    }
    Ok(())
}

fn check_question(question_id: &str) -> Result<()> {
    if !diagnostic::is_canonical_question_id(question_id) {
        return Err(StudyError::invalid(format!(
            "question id '{}' must be 1-64 characters of letters, digits, '-' or '_'",
            question_id
        )));
    }
    Ok(())
}

fn validate_completion(event: &TaskCompletion) -> Result<()> {
    if !event.accuracy.is_finite() || !(0.0..=1.0).contains(&event.accuracy) {
        return Err(StudyError::invalid(format!(
            "accuracy {} must be within 0..=1",
            event.accuracy
        )));
    }
    if event.time_ms < 0 {
        return Err(StudyError::invalid("time_ms must not be negative"));
    }
    for answer in event.answers.iter().flatten() {
        check_question(&answer.question_id)?;
        if answer.time_ms < 0 {
            return Err(StudyError::invalid(format!(
                "answer for '{}' has negative time_ms",
                answer.question_id
            )));
        }
    }
    Ok(())
}
