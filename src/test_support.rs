//! In-memory store fakes for engine tests. They honor the same contracts as
//! the Postgres repositories but keep everything behind a `Mutex`, so tests
//! stay synchronous to set up and deterministic to assert on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::db::types::SkillKind;
use crate::schemas::attempt::SubmittedAnswer;
use crate::stores::{
    AnswerKey, AnswerKeyResolver, AttemptRow, AttemptScores, AttemptStore, GradedAnswer,
    GroupQuestion, NewPlacement, OrderingStore, Placement, PositionUpdate, StoreError,
};

pub fn answer(question_id: &str, choice_id: &str) -> SubmittedAnswer {
    SubmittedAnswer {
        question_id: question_id.to_string(),
        choice_id: choice_id.to_string(),
    }
}

pub fn attempt_row(
    id: &str,
    student_id: &str,
    exam_id: &str,
    started_at: PrimitiveDateTime,
    time_limit_minutes: i32,
) -> AttemptRow {
    AttemptRow {
        id: id.to_string(),
        student_id: student_id.to_string(),
        exam_id: exam_id.to_string(),
        started_at,
        submitted_at: None,
        time_limit_minutes,
    }
}

/// Question bank fake keyed by question id.
#[derive(Default)]
pub struct MemoryBank {
    keys: Mutex<HashMap<String, AnswerKey>>,
}

impl MemoryBank {
    /// Seeds one question. Aural questions get an audio URL, written ones a
    /// passage, mirroring how media rows look in production.
    pub fn seed_question(
        &self,
        question_id: &str,
        correct_choice_id: &str,
        question_type: &str,
        skill: Option<SkillKind>,
    ) {
        let (audio_url, passage) = match skill {
            Some(SkillKind::Aural) => {
                (Some(format!("https://cdn.example.com/audio/{question_id}.mp3")), None)
            }
            Some(SkillKind::Written) => (None, Some(format!("Passage for {question_id}."))),
            None => (None, None),
        };
        self.keys.lock().unwrap().insert(
            question_id.to_string(),
            AnswerKey {
                question_id: question_id.to_string(),
                correct_choice_id: correct_choice_id.to_string(),
                question_type: question_type.to_string(),
                skill,
                audio_url,
                passage,
            },
        );
    }
}

#[async_trait]
impl AnswerKeyResolver for MemoryBank {
    async fn resolve_keys(&self, question_ids: &[String]) -> Result<Vec<AnswerKey>, StoreError> {
        let keys = self.keys.lock().unwrap();
        Ok(question_ids.iter().filter_map(|id| keys.get(id).cloned()).collect())
    }
}

/// Attempt store fake. `force_already_submitted` makes the next `finalize`
/// lose the race regardless of state, to exercise the double-submit path.
#[derive(Default)]
pub struct MemoryAttempts {
    attempts: Mutex<HashMap<String, AttemptRow>>,
    answers: Mutex<HashMap<String, Vec<GradedAnswer>>>,
    scores: Mutex<HashMap<String, AttemptScores>>,
    lose_race: AtomicBool,
}

impl MemoryAttempts {
    pub fn insert(&self, row: AttemptRow) {
        self.attempts.lock().unwrap().insert(row.id.clone(), row);
    }

    pub fn get(&self, attempt_id: &str) -> Option<AttemptRow> {
        self.attempts.lock().unwrap().get(attempt_id).cloned()
    }

    pub fn answers_for(&self, attempt_id: &str) -> Vec<GradedAnswer> {
        self.answers.lock().unwrap().get(attempt_id).cloned().unwrap_or_default()
    }

    pub fn force_already_submitted(&self) {
        self.lose_race.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AttemptStore for MemoryAttempts {
    async fn find(&self, attempt_id: &str) -> Result<Option<AttemptRow>, StoreError> {
        Ok(self.get(attempt_id))
    }

    async fn finalize(
        &self,
        attempt_id: &str,
        answers: &[GradedAnswer],
        scores: &AttemptScores,
        submitted_at: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        if self.lose_race.load(Ordering::SeqCst) {
            return Err(StoreError::AlreadySubmitted);
        }

        let mut attempts = self.attempts.lock().unwrap();
        let row = attempts
            .get_mut(attempt_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        if row.submitted_at.is_some() {
            return Err(StoreError::AlreadySubmitted);
        }
        row.submitted_at = Some(submitted_at);

        self.answers.lock().unwrap().insert(attempt_id.to_string(), answers.to_vec());
        self.scores.lock().unwrap().insert(attempt_id.to_string(), *scores);

        Ok(())
    }

    async fn delete_unsubmitted(&self, attempt_id: &str) -> Result<bool, StoreError> {
        let mut attempts = self.attempts.lock().unwrap();
        match attempts.get(attempt_id) {
            Some(row) if row.submitted_at.is_none() => {
                attempts.remove(attempt_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Ordering store fake: an exam set, a question bank mapping each question to
/// its media record, and per-exam placement rows. It applies operations
/// without validating them, so tests can also seed invalid sequences through
/// `raw_place` and let the engine diagnose them.
#[derive(Default)]
pub struct MemoryPlacements {
    exams: Mutex<Vec<String>>,
    // question_id -> (media_id, order_in_group)
    bank: Mutex<HashMap<String, (String, i32)>>,
    placements: Mutex<HashMap<String, Vec<Placement>>>,
}

impl MemoryPlacements {
    pub fn seed_exam(&self, exam_id: &str) {
        self.exams.lock().unwrap().push(exam_id.to_string());
    }

    pub fn seed_question(&self, question_id: &str, media_id: &str, order_in_group: i32) {
        self.bank
            .lock()
            .unwrap()
            .insert(question_id.to_string(), (media_id.to_string(), order_in_group));
    }

    /// Inserts a placement row directly, bypassing the engine.
    pub fn raw_place(&self, exam_id: &str, question_id: &str, position: i32, group: Option<&str>) {
        self.placements.lock().unwrap().entry(exam_id.to_string()).or_default().push(
            Placement {
                question_id: question_id.to_string(),
                position,
                group_id: group.map(str::to_string),
                is_grouped: group.is_some(),
            },
        );
    }

    pub fn placements(&self, exam_id: &str) -> Vec<Placement> {
        self.placements.lock().unwrap().get(exam_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl OrderingStore for MemoryPlacements {
    async fn exam_exists(&self, exam_id: &str) -> Result<bool, StoreError> {
        Ok(self.exams.lock().unwrap().iter().any(|id| id == exam_id))
    }

    async fn list_placements(&self, exam_id: &str) -> Result<Vec<Placement>, StoreError> {
        let mut rows = self.placements(exam_id);
        rows.sort_by_key(|row| row.position);
        Ok(rows)
    }

    async fn filter_existing_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let bank = self.bank.lock().unwrap();
        Ok(question_ids.iter().filter(|id| bank.contains_key(*id)).cloned().collect())
    }

    async fn group_questions(&self, media_id: &str) -> Result<Vec<GroupQuestion>, StoreError> {
        let bank = self.bank.lock().unwrap();
        let mut members: Vec<GroupQuestion> = bank
            .iter()
            .filter(|(_, (media, _))| media == media_id)
            .map(|(question_id, (_, order))| GroupQuestion {
                question_id: question_id.clone(),
                order_in_group: *order,
            })
            .collect();
        members.sort_by(|a, b| {
            a.order_in_group.cmp(&b.order_in_group).then(a.question_id.cmp(&b.question_id))
        });
        Ok(members)
    }

    async fn media_of_question(&self, question_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.bank.lock().unwrap().get(question_id).map(|(media, _)| media.clone()))
    }

    async fn insert_placements(
        &self,
        exam_id: &str,
        rows: &[NewPlacement],
    ) -> Result<(), StoreError> {
        let mut placements = self.placements.lock().unwrap();
        let exam = placements.entry(exam_id.to_string()).or_default();
        for row in rows {
            exam.push(Placement {
                question_id: row.question_id.clone(),
                position: row.position,
                group_id: row.group_id.clone(),
                is_grouped: row.is_grouped,
            });
        }
        Ok(())
    }

    async fn delete_placement(
        &self,
        exam_id: &str,
        question_id: &str,
    ) -> Result<u64, StoreError> {
        let mut placements = self.placements.lock().unwrap();
        let Some(exam) = placements.get_mut(exam_id) else { return Ok(0) };
        let before = exam.len();
        exam.retain(|row| row.question_id != question_id);
        Ok((before - exam.len()) as u64)
    }

    async fn delete_group(&self, exam_id: &str, media_id: &str) -> Result<u64, StoreError> {
        let mut placements = self.placements.lock().unwrap();
        let Some(exam) = placements.get_mut(exam_id) else { return Ok(0) };
        let before = exam.len();
        exam.retain(|row| row.group_id.as_deref() != Some(media_id));
        Ok((before - exam.len()) as u64)
    }

    async fn update_positions(
        &self,
        exam_id: &str,
        moves: &[PositionUpdate],
    ) -> Result<(), StoreError> {
        let mut placements = self.placements.lock().unwrap();
        let Some(exam) = placements.get_mut(exam_id) else { return Ok(()) };
        for update in moves {
            if let Some(row) =
                exam.iter_mut().find(|row| row.question_id == update.question_id)
            {
                row.position = update.position;
            }
        }
        Ok(())
    }

    async fn set_question(
        &self,
        exam_id: &str,
        old_question_id: &str,
        new_question_id: &str,
    ) -> Result<(), StoreError> {
        let mut placements = self.placements.lock().unwrap();
        let Some(exam) = placements.get_mut(exam_id) else { return Ok(()) };
        if let Some(row) = exam.iter_mut().find(|row| row.question_id == old_question_id) {
            row.question_id = new_question_id.to_string();
        }
        Ok(())
    }
}
