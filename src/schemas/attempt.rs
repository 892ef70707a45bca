use serde::{Deserialize, Serialize};

use crate::db::types::SkillKind;

/// One (question, selected choice) pair from a submission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub choice_id: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SectionScore {
    pub skill: SkillKind,
    pub correct: u32,
    pub total: u32,
    pub scaled: i32,
}

/// Per-question review detail, including the media assets the student needs
/// to replay or re-read the item.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReview {
    pub question_id: String,
    pub selected_choice_id: String,
    pub correct_choice_id: String,
    pub is_correct: bool,
    pub skill: SkillKind,
    pub question_type: String,
    pub audio_url: Option<String>,
    pub passage: Option<String>,
}

/// Immutable grading outcome returned to the caller after a successful
/// submission. Timestamps are RFC 3339 UTC strings.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    pub attempt_id: String,
    pub submitted_at: String,
    pub score_percent: i32,
    pub aural: SectionScore,
    pub written: SectionScore,
    pub review: Vec<AnswerReview>,
    pub weak_areas: Vec<String>,
}
