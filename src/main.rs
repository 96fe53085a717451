mod clock;
mod config;
mod db;
mod diagnostic;
mod error;
mod logging;
mod mastery;
mod mode;
mod models;
mod planner;
mod review;
mod service;

use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use clock::{parse_date, SystemClock};
use config::Config;
use db::Database;
use diagnostic::DiagnosticSubmission;
use error::{Result, StudyError};
use models::{AnswerEvent, JsonOutput, PlanTask, Skill, TaskCompletion};
use service::StudyService;

const DEFAULT_DAILY_CAP_MINUTES: i64 = 30;

#[derive(Parser)]
#[command(name = "studyplan")]
#[command(about = "Daily exam-prep study planner with spaced-repetition reviews")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Learner to act as (defaults to `default_user` from config)
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage the learner profile
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Manage the skill graph
    #[command(subcommand)]
    Skill(SkillCommands),

    /// Show today's plan, generating it on first request
    Plan,

    /// Days until the test date
    DaysLeft,

    /// Mark a planned task as in progress
    Start {
        /// Task ID from `plan`
        task_id: i64,
    },

    /// Record the result of a planned task
    Complete {
        /// Task ID from `plan`
        task_id: i64,

        /// Fraction answered correctly, 0..=1
        #[arg(long, short)]
        accuracy: f64,

        /// Time spent in milliseconds
        #[arg(long, default_value_t = 0)]
        time_ms: i64,

        /// JSON file with per-question answers
        #[arg(long)]
        answers: Option<PathBuf>,
    },

    /// Score a diagnostic submission from a JSON file
    Diagnostic {
        /// Path to the submission
        file: PathBuf,
    },

    /// List past diagnostic results
    Diagnostics,

    /// Record a single review answer
    #[command(group(ArgGroup::new("verdict").required(true).args(["correct", "wrong"])))]
    Review {
        /// Question ID
        question_id: String,

        /// The answer was correct
        #[arg(long)]
        correct: bool,

        /// The answer was wrong
        #[arg(long)]
        wrong: bool,
    },

    /// List review items due now
    Due,

    /// Show per-skill mastery
    Mastery,

    /// Show study statistics
    Stats,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create or update the profile
    Set {
        /// Test date as YYYY-MM-DD, or "none" to clear
        #[arg(long)]
        test_date: Option<String>,

        /// Daily study budget in minutes
        #[arg(long)]
        cap: Option<i64>,
    },

    /// Show the profile
    Show,
}

#[derive(Subcommand)]
enum SkillCommands {
    /// Add or replace a skill
    Add {
        /// Skill ID
        id: String,

        /// Display name
        name: String,

        /// Subject, e.g. math or english
        #[arg(long, short)]
        subject: String,

        /// Cluster within the subject
        #[arg(long, short, default_value = "")]
        cluster: String,

        /// Comma-separated prerequisite skill IDs
        #[arg(long, short)]
        prereqs: Option<String>,

        /// Curriculum position
        #[arg(long, short, default_value_t = 0)]
        order: i64,
    },

    /// List all skills
    List,
}

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            println!(
                "{}",
                serde_json::to_string(&JsonOutput::<()>::err(e.to_string())).unwrap_or_default()
            );
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    logging::init(&config.log_level);

    let db_path = config.db_path();
    let db = Database::open(&db_path)?;
    db.init()?;

    let user = cli
        .user
        .clone()
        .unwrap_or_else(|| config.default_user.clone());
    let svc = StudyService::new(&db, SystemClock, config.time_context()?, config.limits());

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(())?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Profile(profile_cmd) => match profile_cmd {
            ProfileCommands::Set { test_date, cap } => {
                let existing = db.get_profile(&user)?;
                let test_date = match test_date.as_deref() {
                    Some("none") => None,
                    Some(raw) => Some(parse_date(raw)?),
                    None => existing.as_ref().and_then(|p| p.test_date),
                };
                let cap = cap
                    .or(existing.map(|p| p.daily_time_cap_minutes))
                    .unwrap_or(DEFAULT_DAILY_CAP_MINUTES);

                let profile = svc.set_profile(&user, test_date, cap)?;
                if cli.json {
                    print_json(&profile)?;
                } else {
                    println!("Profile saved for '{}'.", profile.user_id);
                }
            }

            ProfileCommands::Show => {
                let profile = svc.profile(&user)?;
                let days_left = svc.days_left(&user)?;
                if cli.json {
                    print_json(&profile)?;
                } else {
                    println!("User: {}", profile.user_id);
                    println!(
                        "Test date: {}",
                        profile
                            .test_date
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                    println!("Daily cap: {} min", profile.daily_time_cap_minutes);
                    println!("Status: {}", describe_days_left(days_left));
                }
            }
        },

        Commands::Skill(skill_cmd) => match skill_cmd {
            SkillCommands::Add {
                id,
                name,
                subject,
                cluster,
                prereqs,
                order,
            } => {
                let skill = svc.add_skill(Skill {
                    id,
                    name,
                    subject,
                    cluster,
                    prerequisite_ids: prereqs.as_deref().map(split_list).unwrap_or_default(),
                    order_index: order,
                })?;
                if cli.json {
                    print_json(&skill)?;
                } else {
                    println!("Saved skill '{}' ({}).", skill.name, skill.id);
                }
            }

            SkillCommands::List => {
                let skills = svc.skills()?;
                if cli.json {
                    print_json(&skills)?;
                } else if skills.is_empty() {
                    println!("No skills found.");
                } else {
                    println!("{:<16} {:<30} {:<10} PREREQS", "ID", "NAME", "SUBJECT");
                    println!("{}", "-".repeat(72));
                    for skill in skills {
                        let prereqs = if skill.prerequisite_ids.is_empty() {
                            String::from("-")
                        } else {
                            skill.prerequisite_ids.join(", ")
                        };
                        println!(
                            "{:<16} {:<30} {:<10} {}",
                            truncate(&skill.id, 15),
                            truncate(&skill.name, 28),
                            skill.subject,
                            prereqs
                        );
                    }
                }
            }
        },

        Commands::Plan => {
            let plan = svc.generate_plan(&user)?;
            if cli.json {
                print_json(&plan)?;
            } else {
                println!(
                    "=== Plan for {} ({}, {}) ===",
                    plan.date,
                    plan.mode_name,
                    describe_days_left(plan.days_left)
                );
                if plan.tasks.is_empty() {
                    println!("Nothing scheduled today.");
                } else {
                    println!(
                        "{:<6} {:<8} {:<24} {:>5} {:>5}",
                        "ID", "TYPE", "TARGET", "SIZE", "MIN"
                    );
                    println!("{}", "-".repeat(52));
                    for task in &plan.tasks {
                        println!(
                            "{:<6} {:<8} {:<24} {:>5} {:>5}",
                            task.task_id.map(|id| id.to_string()).unwrap_or_default(),
                            task.task_type.as_str(),
                            truncate(target(task), 22),
                            task.size,
                            task.estimated_minutes
                        );
                    }
                    println!();
                    println!("Total: {} min", plan.total_minutes());
                }
            }
        }

        Commands::DaysLeft => {
            let days_left = svc.days_left(&user)?;
            if cli.json {
                print_json(serde_json::json!({ "days_left": days_left }))?;
            } else {
                println!("{}", describe_days_left(days_left));
            }
        }

        Commands::Start { task_id } => {
            let task = svc.start_task(&user, task_id)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!("Task {} is {}.", task.id, task.status.as_str());
            }
        }

        Commands::Complete {
            task_id,
            accuracy,
            time_ms,
            answers,
        } => {
            let answers: Option<Vec<AnswerEvent>> = match answers {
                Some(path) => Some(read_json(&path)?),
                None => None,
            };
            let outcome = svc.complete_task(
                &user,
                &TaskCompletion {
                    task_id,
                    accuracy,
                    time_ms,
                    answers,
                },
            )?;

            if cli.json {
                print_json(&outcome)?;
            } else if outcome.already_completed {
                println!("Task {} was already completed.", task_id);
            } else {
                println!("Task {} completed.", task_id);
                if let Some(m) = &outcome.mastery {
                    println!(
                        "Skill {}: {}/{} correct, {} (level {})",
                        m.skill_id,
                        m.correct,
                        m.seen,
                        m.band().label(),
                        m.mastery_level
                    );
                }
                for item in &outcome.reviews {
                    println!("Review {} next due {}", item.question_id, item.due_at);
                }
            }
        }

        Commands::Diagnostic { file } => {
            let submission: DiagnosticSubmission = read_json(&file)?;
            let result = svc.submit_diagnostic(&user, &submission)?;
            if cli.json {
                print_json(&result)?;
            } else {
                println!("Diagnostic #{} recorded.", result.diagnostic_id);
                println!(
                    "Score: {}% (scaled {}/36)",
                    result.predicted_score, result.scaled_score
                );
                if !result.weak_skills.is_empty() {
                    println!("Weak skills:");
                    for weak in &result.weak_skills {
                        println!(
                            "  {:<24} {:>3.0}% of {}",
                            weak.skill,
                            weak.accuracy * 100.0,
                            weak.total
                        );
                    }
                }
                println!("Queued {} missed question(s) for review.", result.seeded_reviews);
            }
        }

        Commands::Diagnostics => {
            let history = svc.diagnostics(&user)?;
            if cli.json {
                print_json(&history)?;
            } else if history.is_empty() {
                println!("No diagnostics taken yet.");
            } else {
                println!("{:<5} {:<12} {:>5} {:>6}  COMPLETED", "ID", "SECTION", "BLOCK", "SCORE");
                println!("{}", "-".repeat(56));
                for record in history {
                    println!(
                        "{:<5} {:<12} {:>5} {:>5}%  {}",
                        record.id,
                        truncate(&record.section, 11),
                        record.block,
                        record.score,
                        db::fmt_ts(record.completed_at)
                    );
                }
            }
        }

        Commands::Review {
            question_id,
            correct,
            ..
        } => {
            let item = svc.answer_review(&user, &question_id, correct)?;
            if cli.json {
                print_json(&item)?;
            } else {
                println!(
                    "Review recorded for {}. Next due {} (interval {} day(s), ease {}).",
                    item.question_id, item.due_at, item.interval_days, item.ease
                );
            }
        }

        Commands::Due => {
            let due = svc.due_reviews(&user)?;
            if cli.json {
                print_json(&due)?;
            } else if due.is_empty() {
                println!("No reviews due.");
            } else {
                println!("{:<24} {:<22} {:>8} {:>6}", "QUESTION", "DUE", "INTERVAL", "LAPSES");
                println!("{}", "-".repeat(64));
                for item in due {
                    println!(
                        "{:<24} {:<22} {:>8} {:>6}",
                        truncate(&item.question_id, 22),
                        db::fmt_ts(item.due_at),
                        item.interval_days,
                        item.lapses
                    );
                }
            }
        }

        Commands::Mastery => {
            let rows = svc.mastery(&user)?;
            if cli.json {
                print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No mastery recorded yet.");
            } else {
                println!(
                    "{:<16} {:>6} {:>8} {:>6}  BAND",
                    "SKILL", "SEEN", "CORRECT", "LEVEL"
                );
                println!("{}", "-".repeat(56));
                for m in rows {
                    println!(
                        "{:<16} {:>6} {:>8} {:>6}  {}",
                        truncate(&m.skill_id, 15),
                        m.seen,
                        m.correct,
                        m.mastery_level,
                        m.band().label()
                    );
                }
            }
        }

        Commands::Stats => {
            let stats = svc.stats(&user)?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("=== Study Statistics ===");
                println!("Skills: {}", stats.total_skills);
                println!("Attempted: {}", stats.attempted);
                println!("Mastered: {}", stats.mastered);
                println!("Reviews due: {}", stats.due_now);
                println!("Tasks completed: {}", stats.completed_tasks);
                println!("Diagnostics taken: {}", stats.diagnostics);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(data: T) -> Result<()> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| StudyError::invalid(format!("{}: {}", path.display(), e)))
}

fn target(task: &PlanTask) -> &str {
    match task.ref_key() {
        "" => "-",
        key => key,
    }
}

fn describe_days_left(days_left: Option<i64>) -> String {
    match days_left {
        None => "no test date".to_string(),
        Some(d) if d < 0 => "test date passed".to_string(),
        Some(0) => "test day".to_string(),
        Some(1) => "1 day left".to_string(),
        Some(d) => format!("{} days left", d),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    mod truncate_tests {
        use super::*;

        #[test]
        fn truncate_short_string() {
            assert_eq!(truncate("hello", 10), "hello");
        }

        #[test]
        fn truncate_exact_length() {
            assert_eq!(truncate("hello", 5), "hello");
        }

        #[test]
        fn truncate_long_string() {
            assert_eq!(truncate("hello world", 8), "hello...");
        }

        #[test]
        fn truncate_counts_chars_not_bytes() {
            assert_eq!(truncate("ééééé", 5), "ééééé");
            assert_eq!(truncate("éééééé", 5), "éé...");
        }
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn describe_days_left_wording() {
            assert_eq!(describe_days_left(None), "no test date");
            assert_eq!(describe_days_left(Some(-2)), "test date passed");
            assert_eq!(describe_days_left(Some(0)), "test day");
            assert_eq!(describe_days_left(Some(1)), "1 day left");
            assert_eq!(describe_days_left(Some(12)), "12 days left");
        }

        #[test]
        fn split_list_trims_and_drops_blanks() {
            assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
            assert!(split_list("").is_empty());
        }

        #[test]
        fn read_json_reports_bad_content_as_invalid_input() {
            let path = std::env::temp_dir().join(format!("studyplan-bad-{}.json", std::process::id()));
            std::fs::write(&path, "{not json").unwrap();
            let err = read_json::<DiagnosticSubmission>(&path).unwrap_err();
            std::fs::remove_file(&path).ok();
            assert!(matches!(err, StudyError::InvalidInput(_)));
        }

        #[test]
        fn read_json_missing_file_is_io_error() {
            let err = read_json::<Vec<AnswerEvent>>(Path::new("/no/such/answers.json")).unwrap_err();
            assert!(matches!(err, StudyError::Io(_)));
        }
    }

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn parse_init_command() {
            let cli = Cli::try_parse_from(["studyplan", "init"]).unwrap();
            assert!(!cli.json);
            assert!(cli.user.is_none());
            assert!(matches!(cli.command, Commands::Init));
        }

        #[test]
        fn parse_global_flags_after_subcommand() {
            let cli = Cli::try_parse_from(["studyplan", "plan", "--json", "--user", "sam"]).unwrap();
            assert!(cli.json);
            assert_eq!(cli.user.as_deref(), Some("sam"));
            assert!(matches!(cli.command, Commands::Plan));
        }

        #[test]
        fn parse_profile_set() {
            let cli = Cli::try_parse_from([
                "studyplan",
                "profile",
                "set",
                "--test-date",
                "2024-09-06",
                "--cap",
                "45",
            ])
            .unwrap();
            match cli.command {
                Commands::Profile(ProfileCommands::Set { test_date, cap }) => {
                    assert_eq!(test_date.as_deref(), Some("2024-09-06"));
                    assert_eq!(cap, Some(45));
                }
                _ => panic!("Expected Profile Set command"),
            }
        }

        #[test]
        fn parse_skill_add_with_prereqs() {
            let cli = Cli::try_parse_from([
                "studyplan",
                "skill",
                "add",
                "linear-eq",
                "Linear equations",
                "-s",
                "math",
                "-p",
                "arith,fractions",
                "-o",
                "3",
            ])
            .unwrap();
            match cli.command {
                Commands::Skill(SkillCommands::Add {
                    id,
                    name,
                    subject,
                    cluster,
                    prereqs,
                    order,
                }) => {
                    assert_eq!(id, "linear-eq");
                    assert_eq!(name, "Linear equations");
                    assert_eq!(subject, "math");
                    assert_eq!(cluster, "");
                    assert_eq!(prereqs.as_deref(), Some("arith,fractions"));
                    assert_eq!(order, 3);
                }
                _ => panic!("Expected Skill Add command"),
            }
        }

        #[test]
        fn parse_skill_add_requires_subject() {
            assert!(Cli::try_parse_from(["studyplan", "skill", "add", "a", "A"]).is_err());
        }

        #[test]
        fn parse_complete() {
            let cli = Cli::try_parse_from([
                "studyplan",
                "complete",
                "7",
                "--accuracy",
                "0.8",
                "--time-ms",
                "90000",
                "--answers",
                "answers.json",
            ])
            .unwrap();
            match cli.command {
                Commands::Complete {
                    task_id,
                    accuracy,
                    time_ms,
                    answers,
                } => {
                    assert_eq!(task_id, 7);
                    assert_eq!(accuracy, 0.8);
                    assert_eq!(time_ms, 90000);
                    assert_eq!(answers, Some(PathBuf::from("answers.json")));
                }
                _ => panic!("Expected Complete command"),
            }
        }

        #[test]
        fn parse_start() {
            let cli = Cli::try_parse_from(["studyplan", "start", "12"]).unwrap();
            match cli.command {
                Commands::Start { task_id } => assert_eq!(task_id, 12),
                _ => panic!("Expected Start command"),
            }
        }

        #[test]
        fn parse_complete_requires_accuracy() {
            assert!(Cli::try_parse_from(["studyplan", "complete", "7"]).is_err());
        }

        #[test]
        fn parse_review_correct() {
            let cli = Cli::try_parse_from(["studyplan", "review", "q-17", "--correct"]).unwrap();
            match cli.command {
                Commands::Review {
                    question_id,
                    correct,
                    wrong,
                } => {
                    assert_eq!(question_id, "q-17");
                    assert!(correct);
                    assert!(!wrong);
                }
                _ => panic!("Expected Review command"),
            }
        }

        #[test]
        fn parse_review_needs_exactly_one_verdict() {
            assert!(Cli::try_parse_from(["studyplan", "review", "q1"]).is_err());
            assert!(
                Cli::try_parse_from(["studyplan", "review", "q1", "--correct", "--wrong"]).is_err()
            );
            assert!(Cli::try_parse_from(["studyplan", "review", "q1", "--wrong"]).is_ok());
        }

        #[test]
        fn parse_diagnostic() {
            let cli = Cli::try_parse_from(["studyplan", "diagnostic", "block1.json"]).unwrap();
            match cli.command {
                Commands::Diagnostic { file } => assert_eq!(file, PathBuf::from("block1.json")),
                _ => panic!("Expected Diagnostic command"),
            }
        }

        #[test]
        fn parse_read_commands() {
            let parse = |arg: &str| Cli::try_parse_from(["studyplan", arg]).unwrap().command;
            assert!(matches!(parse("days-left"), Commands::DaysLeft));
            assert!(matches!(parse("due"), Commands::Due));
            assert!(matches!(parse("mastery"), Commands::Mastery));
            assert!(matches!(parse("stats"), Commands::Stats));
            assert!(matches!(parse("diagnostics"), Commands::Diagnostics));
        }

        #[test]
        fn parse_invalid_command_fails() {
            assert!(Cli::try_parse_from(["studyplan", "topic", "list"]).is_err());
        }
    }
}
