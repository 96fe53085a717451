use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;

use crate::error::Result;
use crate::mastery::MASTERY_LEVEL_CUTOFF;
use crate::mode::StudyMode;
use crate::models::{
    DiagnosticRecord, MasteryRecord, PlanTask, Profile, ReviewItem, Skill, StudyPlanDay,
    StudyTask, TaskStatus, TaskType,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                test_date TEXT,
                daily_time_cap_minutes INTEGER NOT NULL DEFAULT 30,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Reference data: skill DAG
            CREATE TABLE IF NOT EXISTS skills (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                subject TEXT NOT NULL,
                cluster TEXT NOT NULL DEFAULT '',
                order_index INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS skill_prerequisites (
                skill_id TEXT NOT NULL,
                prerequisite_id TEXT NOT NULL,
                PRIMARY KEY (skill_id, prerequisite_id),
                FOREIGN KEY (skill_id) REFERENCES skills(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS mastery (
                user_id TEXT NOT NULL,
                skill_id TEXT NOT NULL,
                seen INTEGER NOT NULL DEFAULT 0 CHECK(seen >= 0),
                correct INTEGER NOT NULL DEFAULT 0 CHECK(correct >= 0 AND correct <= seen),
                mastery_level INTEGER NOT NULL DEFAULT 0,
                median_time_ms INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, skill_id)
            );

            CREATE TABLE IF NOT EXISTS review_queue (
                user_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                due_at TEXT NOT NULL,
                interval_days INTEGER NOT NULL,
                ease INTEGER NOT NULL DEFAULT 250 CHECK(ease BETWEEN 130 AND 300),
                lapses INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, question_id)
            );

            -- One row per (user, date, type, ref); ref_key is the skill, question or section
            CREATE TABLE IF NOT EXISTS study_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                the_date TEXT NOT NULL,
                task_type TEXT NOT NULL CHECK(task_type IN ('REVIEW', 'DRILL', 'LEARN', 'SIM', 'WARMUP')),
                skill_id TEXT,
                question_id TEXT,
                section TEXT,
                ref_key TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL,
                estimated_minutes INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING' CHECK(status IN ('PENDING', 'IN_PROGRESS', 'COMPLETED')),
                accuracy REAL,
                median_time_ms INTEGER,
                reward_cents INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, the_date, task_type, ref_key)
            );

            CREATE TABLE IF NOT EXISTS study_plan_days (
                user_id TEXT NOT NULL,
                the_date TEXT NOT NULL,
                mode TEXT NOT NULL,
                days_left INTEGER,
                tasks_json TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, the_date)
            );

            -- Append-only
            CREATE TABLE IF NOT EXISTS diagnostics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                section TEXT NOT NULL,
                block INTEGER NOT NULL DEFAULT 0,
                responses_json TEXT NOT NULL,
                score INTEGER NOT NULL,
                completed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_review_queue_due ON review_queue(user_id, due_at);
            CREATE INDEX IF NOT EXISTS idx_study_tasks_day ON study_tasks(user_id, the_date);
            CREATE INDEX IF NOT EXISTS idx_diagnostics_user ON diagnostics(user_id, section, block);
            CREATE INDEX IF NOT EXISTS idx_skill_prereqs_prereq ON skill_prerequisites(prerequisite_id);
            "#,
        )?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction. The write lock is taken
    /// up front, so two writers for the same user serialize instead of racing.
    /// Any error rolls everything back.
    pub fn immediate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // Profile operations
    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO profiles (user_id, test_date, daily_time_cap_minutes, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(user_id) DO UPDATE SET
                test_date = excluded.test_date,
                daily_time_cap_minutes = excluded.daily_time_cap_minutes,
                updated_at = excluded.updated_at
            "#,
            params![
                profile.user_id,
                profile.test_date.map(fmt_date),
                profile.daily_time_cap_minutes
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT user_id, test_date, daily_time_cap_minutes FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let test_date: Option<String> = row.get(1)?;
                    Ok(Profile {
                        user_id: row.get(0)?,
                        test_date: test_date.map(|d| parse_date(1, &d)).transpose()?,
                        daily_time_cap_minutes: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    // Skill graph operations
    pub fn upsert_skill(&self, skill: &Skill) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO skills (id, name, subject, cluster, order_index)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                subject = excluded.subject,
                cluster = excluded.cluster,
                order_index = excluded.order_index
            "#,
            params![skill.id, skill.name, skill.subject, skill.cluster, skill.order_index],
        )?;

        self.conn.execute(
            "DELETE FROM skill_prerequisites WHERE skill_id = ?1",
            params![skill.id],
        )?;
        for prereq in &skill.prerequisite_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO skill_prerequisites (skill_id, prerequisite_id) VALUES (?1, ?2)",
                params![skill.id, prereq],
            )?;
        }
        Ok(())
    }

    pub fn list_skills(&self) -> Result<Vec<Skill>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, subject, cluster, order_index FROM skills ORDER BY order_index, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Skill {
                id: row.get(0)?,
                name: row.get(1)?,
                subject: row.get(2)?,
                cluster: row.get(3)?,
                prerequisite_ids: vec![],
                order_index: row.get(4)?,
            })
        })?;
        let mut skills = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        // Fill in prerequisites
        let mut stmt = self.conn.prepare(
            "SELECT prerequisite_id FROM skill_prerequisites WHERE skill_id = ?1 ORDER BY prerequisite_id",
        )?;
        for skill in &mut skills {
            let prereqs = stmt.query_map(params![skill.id], |row| row.get(0))?;
            skill.prerequisite_ids = prereqs.collect::<rusqlite::Result<Vec<String>>>()?;
        }

        Ok(skills)
    }

    // Mastery operations
    pub fn get_mastery(&self, user_id: &str, skill_id: &str) -> Result<Option<MasteryRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT user_id, skill_id, seen, correct, mastery_level, median_time_ms
                FROM mastery WHERE user_id = ?1 AND skill_id = ?2
                "#,
                params![user_id, skill_id],
                row_to_mastery,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_mastery(&self, user_id: &str) -> Result<Vec<MasteryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, skill_id, seen, correct, mastery_level, median_time_ms
            FROM mastery WHERE user_id = ?1
            ORDER BY skill_id
            "#,
        )?;
        let rows = stmt.query_map(params![user_id], row_to_mastery)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn upsert_mastery(&self, record: &MasteryRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO mastery (user_id, skill_id, seen, correct, mastery_level, median_time_ms, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
            ON CONFLICT(user_id, skill_id) DO UPDATE SET
                seen = excluded.seen,
                correct = excluded.correct,
                mastery_level = excluded.mastery_level,
                median_time_ms = excluded.median_time_ms,
                updated_at = excluded.updated_at
            "#,
            params![
                record.user_id,
                record.skill_id,
                record.seen,
                record.correct,
                record.mastery_level,
                record.median_time_ms
            ],
        )?;
        Ok(())
    }

    // Review queue operations
    pub fn get_review(&self, user_id: &str, question_id: &str) -> Result<Option<ReviewItem>> {
        let item = self
            .conn
            .query_row(
                r#"
                SELECT user_id, question_id, due_at, interval_days, ease, lapses
                FROM review_queue WHERE user_id = ?1 AND question_id = ?2
                "#,
                params![user_id, question_id],
                row_to_review,
            )
            .optional()?;
        Ok(item)
    }

    /// Last write wins on (user, question).
    pub fn upsert_review(&self, item: &ReviewItem) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO review_queue (user_id, question_id, due_at, interval_days, ease, lapses)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, question_id) DO UPDATE SET
                due_at = excluded.due_at,
                interval_days = excluded.interval_days,
                ease = excluded.ease,
                lapses = excluded.lapses
            "#,
            params![
                item.user_id,
                item.question_id,
                fmt_ts(item.due_at),
                item.interval_days,
                item.ease,
                item.lapses
            ],
        )?;
        Ok(())
    }

    pub fn due_reviews(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<ReviewItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, question_id, due_at, interval_days, ease, lapses
            FROM review_queue
            WHERE user_id = ?1 AND due_at <= ?2
            ORDER BY due_at ASC, question_id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, fmt_ts(now)], row_to_review)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // Plan operations
    pub fn get_plan_day(&self, user_id: &str, date: NaiveDate) -> Result<Option<StudyPlanDay>> {
        let raw = self
            .conn
            .query_row(
                r#"
                SELECT user_id, the_date, mode, days_left, tasks_json, generated_at
                FROM study_plan_days WHERE user_id = ?1 AND the_date = ?2
                "#,
                params![user_id, fmt_date(date)],
                |row| {
                    let the_date: String = row.get(1)?;
                    let mode: String = row.get(2)?;
                    let generated_at: String = row.get(5)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        parse_date(1, &the_date)?,
                        StudyMode::from_str(&mode).ok_or_else(|| bad_column(2, &mode))?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, String>(4)?,
                        parse_ts(5, &generated_at)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            Some((user_id, date, mode, days_left, tasks_json, generated_at)) => {
                Ok(Some(StudyPlanDay {
                    user_id,
                    date,
                    mode,
                    days_left,
                    tasks: serde_json::from_str(&tasks_json)?,
                    generated_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Returns false when a plan for (user, date) already existed.
    pub fn insert_plan_day(&self, plan: &StudyPlanDay) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO study_plan_days (user_id, the_date, mode, days_left, tasks_json, generated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                plan.user_id,
                fmt_date(plan.date),
                plan.mode.as_str(),
                plan.days_left,
                serde_json::to_string(&plan.tasks)?,
                fmt_ts(plan.generated_at)
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Insert a task row unless one already exists for the same upsert key.
    pub fn insert_task(&self, user_id: &str, date: NaiveDate, task: &PlanTask) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO study_tasks
                (user_id, the_date, task_type, skill_id, question_id, section, ref_key, size, estimated_minutes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                user_id,
                fmt_date(date),
                task.task_type.as_str(),
                task.skill_id,
                task.question_id,
                task.section,
                task.ref_key(),
                task.size,
                task.estimated_minutes
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn get_task(&self, task_id: i64) -> Result<Option<StudyTask>> {
        let sql = format!("SELECT {} FROM study_tasks WHERE id = ?1", TASK_COLUMNS);
        let task = self
            .conn
            .query_row(&sql, params![task_id], row_to_task)
            .optional()?;
        Ok(task)
    }

    pub fn list_tasks(&self, user_id: &str, date: NaiveDate) -> Result<Vec<StudyTask>> {
        let sql = format!(
            "SELECT {} FROM study_tasks WHERE user_id = ?1 AND the_date = ?2 ORDER BY id",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, fmt_date(date)], row_to_task)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Moves a PENDING task to IN_PROGRESS. Any other status is left alone.
    pub fn mark_task_started(&self, task_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE study_tasks SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                TaskStatus::InProgress.as_str(),
                task_id,
                TaskStatus::Pending.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_task_completed(
        &self,
        task_id: i64,
        accuracy: f64,
        median_time_ms: i64,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE study_tasks
            SET status = ?1, accuracy = ?2, median_time_ms = ?3
            WHERE id = ?4
            "#,
            params![TaskStatus::Completed.as_str(), accuracy, median_time_ms, task_id],
        )?;
        Ok(())
    }

    // Diagnostic operations
    pub fn insert_diagnostic(
        &self,
        user_id: &str,
        section: &str,
        block: i64,
        responses: &serde_json::Value,
        score: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO diagnostics (user_id, section, block, responses_json, score, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user_id,
                section,
                block,
                serde_json::to_string(responses)?,
                score,
                fmt_ts(completed_at)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_diagnostics(&self, user_id: &str) -> Result<Vec<DiagnosticRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, section, block, responses_json, score, completed_at
            FROM diagnostics WHERE user_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let responses: String = row.get(4)?;
            let completed_at: String = row.get(6)?;
            Ok(DiagnosticRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                section: row.get(2)?,
                block: row.get(3)?,
                responses: serde_json::from_str(&responses).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                })?,
                score: row.get(5)?,
                completed_at: parse_ts(6, &completed_at)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_stats(&self, user_id: &str, now: DateTime<Utc>) -> Result<Stats> {
        let total_skills: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM skills", [], |row| row.get(0))?;

        let attempted: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM mastery WHERE user_id = ?1 AND seen > 0",
            params![user_id],
            |row| row.get(0),
        )?;

        let mastered: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM mastery WHERE user_id = ?1 AND mastery_level >= ?2",
            params![user_id, MASTERY_LEVEL_CUTOFF],
            |row| row.get(0),
        )?;

        let due_now: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM review_queue WHERE user_id = ?1 AND due_at <= ?2",
            params![user_id, fmt_ts(now)],
            |row| row.get(0),
        )?;

        let completed_tasks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM study_tasks WHERE user_id = ?1 AND status = 'COMPLETED'",
            params![user_id],
            |row| row.get(0),
        )?;

        let diagnostics: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM diagnostics WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        Ok(Stats {
            total_skills,
            attempted,
            mastered,
            due_now,
            completed_tasks,
            diagnostics,
        })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Stats {
    pub total_skills: i64,
    pub attempted: i64,
    pub mastered: i64,
    pub due_now: i64,
    pub completed_tasks: i64,
    pub diagnostics: i64,
}

const TASK_COLUMNS: &str = "id, user_id, the_date, task_type, skill_id, question_id, section, \
     size, status, accuracy, median_time_ms, reward_cents";

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<StudyTask> {
    let the_date: String = row.get(2)?;
    let task_type: String = row.get(3)?;
    let status: String = row.get(8)?;
    Ok(StudyTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        the_date: parse_date(2, &the_date)?,
        task_type: TaskType::from_str(&task_type).ok_or_else(|| bad_column(3, &task_type))?,
        skill_id: row.get(4)?,
        question_id: row.get(5)?,
        section: row.get(6)?,
        size: row.get(7)?,
        status: TaskStatus::from_str(&status).ok_or_else(|| bad_column(8, &status))?,
        accuracy: row.get(9)?,
        median_time_ms: row.get(10)?,
        reward_cents: row.get(11)?,
    })
}

fn row_to_mastery(row: &Row<'_>) -> rusqlite::Result<MasteryRecord> {
    Ok(MasteryRecord {
        user_id: row.get(0)?,
        skill_id: row.get(1)?,
        seen: row.get(2)?,
        correct: row.get(3)?,
        mastery_level: row.get(4)?,
        median_time_ms: row.get(5)?,
    })
}

fn row_to_review(row: &Row<'_>) -> rusqlite::Result<ReviewItem> {
    let due_at: String = row.get(2)?;
    Ok(ReviewItem {
        user_id: row.get(0)?,
        question_id: row.get(1)?,
        due_at: parse_ts(2, &due_at)?,
        interval_days: row.get(3)?,
        ease: row.get(4)?,
        lapses: row.get(5)?,
    })
}

// Fixed-width UTC so timestamps compare correctly as text
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn bad_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, value.to_string(), Type::Text)
}
