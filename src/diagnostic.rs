//! Diagnostic scoring.
//!
//! A submission is a list of blocks, each pairing questions with answers by
//! position. Scoring is a single pass that tallies overall and per-skill
//! accuracy and collects the missed questions for the review queue.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

pub const UNTAGGED_SKILL: &str = "untagged";
pub const WEAK_SKILL_MIN_ATTEMPTS: u32 = 2;
pub const WEAK_SKILL_LIMIT: usize = 5;
const MAX_QUESTION_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticQuestion {
    pub id: String,
    #[serde(default)]
    pub skill_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticAnswer {
    pub question_id: String,
    #[serde(default)]
    pub selected_answer: Option<String>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticBlock {
    pub questions: Vec<DiagnosticQuestion>,
    pub answers: Vec<DiagnosticAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSubmission {
    pub section: String,
    #[serde(default)]
    pub block: i64,
    pub blocks: Vec<DiagnosticBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeakSkill {
    pub skill: String,
    pub accuracy: f64,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticScore {
    pub score: i64,
    pub scaled_score: i64,
    pub total_correct: u32,
    pub total_questions: u32,
    pub weak_skills: Vec<WeakSkill>,
    pub missed_question_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticResult {
    pub diagnostic_id: i64,
    pub predicted_score: i64,
    pub scaled_score: i64,
    pub weak_skills: Vec<WeakSkill>,
    pub seeded_reviews: usize,
}

/// Reject malformed submissions before anything is scored or stored.
pub fn validate(submission: &DiagnosticSubmission) -> Result<()> {
    if submission.section.trim().is_empty() {
        return Err(StudyError::invalid("diagnostic section is required"));
    }
    for (b, block) in submission.blocks.iter().enumerate() {
        if block.questions.len() != block.answers.len() {
            return Err(StudyError::invalid(format!(
                "block {} has {} questions but {} answers",
                b,
                block.questions.len(),
                block.answers.len()
            )));
        }
        for (i, (q, a)) in block.questions.iter().zip(&block.answers).enumerate() {
            if q.id != a.question_id {
                return Err(StudyError::invalid(format!(
                    "block {} answer {} is for '{}' but question is '{}'",
                    b, i, a.question_id, q.id
                )));
            }
        }
    }
    Ok(())
}

pub fn score(blocks: &[DiagnosticBlock]) -> DiagnosticScore {
    let mut total_correct = 0u32;
    let mut total_questions = 0u32;
    // insertion-ordered so ties keep discovery order after the stable sort
    let mut per_skill: Vec<(String, u32, u32)> = Vec::new();
    let mut missed = Vec::new();

    for block in blocks {
        for (question, answer) in block.questions.iter().zip(&block.answers) {
            total_questions += 1;
            if answer.is_correct {
                total_correct += 1;
            } else {
                missed.push(question.id.clone());
            }

            let skill = question
                .skill_tags
                .first()
                .map(String::as_str)
                .unwrap_or(UNTAGGED_SKILL);
            match per_skill.iter_mut().find(|entry| entry.0 == skill) {
                Some(entry) => {
                    entry.2 += 1;
                    if answer.is_correct {
                        entry.1 += 1;
                    }
                }
                None => per_skill.push((skill.to_string(), answer.is_correct as u32, 1)),
            }
        }
    }

    let percent = if total_questions == 0 {
        0.0
    } else {
        total_correct as f64 * 100.0 / total_questions as f64
    };

    let mut weak_skills: Vec<WeakSkill> = per_skill
        .into_iter()
        .filter(|(_, _, total)| *total >= WEAK_SKILL_MIN_ATTEMPTS)
        .map(|(skill, correct, total)| WeakSkill {
            skill,
            accuracy: correct as f64 / total as f64,
            total,
        })
        .collect();
    weak_skills.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
    weak_skills.truncate(WEAK_SKILL_LIMIT);

    DiagnosticScore {
        score: percent.round() as i64,
        scaled_score: scaled_score(percent),
        total_correct,
        total_questions,
        weak_skills,
        missed_question_ids: missed,
    }
}

/// Rough 1-36 scale estimate from percent correct.
pub fn scaled_score(percent: f64) -> i64 {
    let p = percent.clamp(0.0, 100.0);
    if p == 0.0 {
        return 1;
    }
    if p == 100.0 {
        return 36;
    }
    let adjusted = (p / 100.0).powf(0.8);
    ((1.0 + adjusted * 35.0).round() as i64).clamp(1, 36)
}

/// Keys the review store accepts: 1-64 chars of `[A-Za-z0-9_-]`.
pub fn is_canonical_question_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_QUESTION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
