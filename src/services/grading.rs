use std::collections::{BTreeMap, HashMap, HashSet};

use time::{Duration, PrimitiveDateTime};

use crate::core::config::GradingSettings;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::types::SkillKind;
use crate::errors::EngineError;
use crate::schemas::attempt::{AnswerReview, AttemptResult, SectionScore, SubmittedAnswer};
use crate::services::scaling::ScalePolicy;
use crate::stores::{
    AnswerKey, AnswerKeyResolver, AttemptScores, AttemptStore, GradedAnswer, StoreError,
};

/// Question-type categories scoring below this ratio land in the weak-area
/// summary.
const WEAK_AREA_THRESHOLD: f64 = 0.6;

/// Grades one attempt submission end to end: precondition checks, batch
/// answer-key resolution, two-section aggregation and a single atomic
/// finalize. Dependencies are injected so tests can substitute fakes.
pub struct GradingEngine<K, A, S> {
    keys: K,
    attempts: A,
    scale: S,
    settings: GradingSettings,
}

impl<K, A, S> GradingEngine<K, A, S>
where
    K: AnswerKeyResolver,
    A: AttemptStore,
    S: ScalePolicy,
{
    pub fn new(keys: K, attempts: A, scale: S, settings: GradingSettings) -> Self {
        Self { keys, attempts, scale, settings }
    }

    pub async fn submit(
        &self,
        attempt_id: &str,
        answers: &[SubmittedAnswer],
        requester_id: &str,
    ) -> Result<AttemptResult, EngineError> {
        self.submit_at(attempt_id, answers, requester_id, primitive_now_utc()).await
    }

    /// `submit` with an explicit submission instant. Preconditions are
    /// checked in a fixed order; each failure is terminal and maps to a
    /// distinct error variant.
    pub async fn submit_at(
        &self,
        attempt_id: &str,
        answers: &[SubmittedAnswer],
        requester_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<AttemptResult, EngineError> {
        let attempt = self
            .attempts
            .find(attempt_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("attempt {attempt_id} not found")))?;

        if attempt.student_id != requester_id {
            return Err(EngineError::Forbidden("attempt belongs to another student"));
        }

        if attempt.submitted_at.is_some() {
            return Err(EngineError::Conflict("attempt already submitted".to_string()));
        }

        let deadline = attempt.started_at
            + Duration::minutes(i64::from(attempt.time_limit_minutes))
            + Duration::seconds(self.settings.submit_grace_seconds);
        if now > deadline {
            return Err(EngineError::Conflict("time limit exceeded".to_string()));
        }

        if answers.is_empty() {
            return Err(EngineError::Validation("no answers submitted".to_string()));
        }

        let mut question_ids = Vec::with_capacity(answers.len());
        let mut seen = HashSet::new();
        for answer in answers {
            if !seen.insert(answer.question_id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "duplicate answer for question {}",
                    answer.question_id
                )));
            }
            question_ids.push(answer.question_id.clone());
        }

        let keys = self.keys.resolve_keys(&question_ids).await?;
        let key_map: HashMap<&str, &AnswerKey> =
            keys.iter().map(|key| (key.question_id.as_str(), key)).collect();

        // Unresolvable questions fail the whole submission. Skipping them
        // would corrupt the denominators of every score below.
        let missing: Vec<&str> = question_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !key_map.contains_key(*id))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Validation(format!(
                "unknown questions in answer set: {}",
                missing.join(", ")
            )));
        }

        let mut graded = Vec::with_capacity(answers.len());
        let mut review = Vec::with_capacity(answers.len());
        let mut sections: HashMap<SkillKind, (u32, u32)> = HashMap::new();
        let mut by_type: BTreeMap<String, (u32, u32)> = BTreeMap::new();

        for answer in answers {
            let key = key_map[answer.question_id.as_str()];
            let skill = key.skill.ok_or_else(|| {
                EngineError::Validation(format!(
                    "question {} has media without a skill classification",
                    key.question_id
                ))
            })?;
            let is_correct = answer.choice_id == key.correct_choice_id;

            let section = sections.entry(skill).or_insert((0, 0));
            section.1 += 1;
            let typed = by_type.entry(key.question_type.clone()).or_insert((0, 0));
            typed.1 += 1;
            if is_correct {
                section.0 += 1;
                typed.0 += 1;
            }

            graded.push(GradedAnswer {
                question_id: answer.question_id.clone(),
                choice_id: answer.choice_id.clone(),
                is_correct,
            });
            review.push(AnswerReview {
                question_id: answer.question_id.clone(),
                selected_choice_id: answer.choice_id.clone(),
                correct_choice_id: key.correct_choice_id.clone(),
                is_correct,
                skill,
                question_type: key.question_type.clone(),
                audio_url: key.audio_url.clone(),
                passage: key.passage.clone(),
            });
        }

        let total = answers.len() as u32;
        let correct = graded.iter().filter(|answer| answer.is_correct).count() as u32;
        let score_percent = round_percent(correct, total);

        let aural = self.section_score(SkillKind::Aural, &sections);
        let written = self.section_score(SkillKind::Written, &sections);
        let scores = AttemptScores {
            score_percent,
            aural_scaled: aural.scaled,
            written_scaled: written.scaled,
        };

        match self.attempts.finalize(attempt_id, &graded, &scores, now).await {
            Ok(()) => {}
            Err(StoreError::AlreadySubmitted) => {
                return Err(EngineError::Conflict("attempt already submitted".to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        metrics::counter!("attempts_graded_total").increment(1);
        tracing::info!(
            attempt_id = %attempt_id,
            student_id = %requester_id,
            answered = total,
            correct = correct,
            score_percent = score_percent,
            "Attempt graded and submitted"
        );

        Ok(AttemptResult {
            attempt_id: attempt.id,
            submitted_at: format_primitive(now),
            score_percent,
            aural,
            written,
            review,
            weak_areas: weak_areas(&by_type),
        })
    }

    /// Removes an attempt the student abandoned. Allowed only while the
    /// attempt is still unsubmitted; grading is a one-way transition.
    pub async fn discard(&self, attempt_id: &str, requester_id: &str) -> Result<(), EngineError> {
        let attempt = self
            .attempts
            .find(attempt_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("attempt {attempt_id} not found")))?;

        if attempt.student_id != requester_id {
            return Err(EngineError::Forbidden("attempt belongs to another student"));
        }

        if attempt.submitted_at.is_some() || !self.attempts.delete_unsubmitted(attempt_id).await? {
            return Err(EngineError::Conflict("attempt already submitted".to_string()));
        }

        tracing::info!(attempt_id = %attempt_id, student_id = %requester_id, "Attempt discarded");

        Ok(())
    }

    fn section_score(
        &self,
        skill: SkillKind,
        sections: &HashMap<SkillKind, (u32, u32)>,
    ) -> SectionScore {
        let (correct, total) = sections.get(&skill).copied().unwrap_or((0, 0));
        SectionScore { skill, correct, total, scaled: self.scale.scale(correct, total) }
    }
}

fn round_percent(correct: u32, total: u32) -> i32 {
    if total == 0 {
        return 0;
    }
    (100.0 * f64::from(correct) / f64::from(total)).round() as i32
}

fn weak_areas(by_type: &BTreeMap<String, (u32, u32)>) -> Vec<String> {
    by_type
        .iter()
        .filter(|(_, (correct, total))| {
            *total > 0 && f64::from(*correct) / f64::from(*total) < WEAK_AREA_THRESHOLD
        })
        .map(|(question_type, (correct, total))| {
            let pct = (100.0 * f64::from(*correct) / f64::from(*total)).round() as i32;
            format!("{question_type}: {correct}/{total} correct ({pct}%)")
        })
        .collect()
}
