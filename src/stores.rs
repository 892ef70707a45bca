//! Trait seams between the engines and the data store, plus the records that
//! cross them. Production implementations live in `repositories`; tests
//! substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::types::SkillKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("attempt already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Authoritative answer key for one question, resolved in batch. `skill` is
/// `None` when the media row carries an unknown classification; the grading
/// engine turns that into a validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerKey {
    pub question_id: String,
    pub correct_choice_id: String,
    pub question_type: String,
    pub skill: Option<SkillKind>,
    pub audio_url: Option<String>,
    pub passage: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttemptRow {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub started_at: PrimitiveDateTime,
    pub submitted_at: Option<PrimitiveDateTime>,
    pub time_limit_minutes: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradedAnswer {
    pub question_id: String,
    pub choice_id: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AttemptScores {
    pub score_percent: i32,
    pub aural_scaled: i32,
    pub written_scaled: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Placement {
    pub question_id: String,
    pub position: i32,
    pub group_id: Option<String>,
    pub is_grouped: bool,
}

#[derive(Debug, Clone)]
pub struct NewPlacement {
    pub question_id: String,
    pub position: i32,
    pub group_id: Option<String>,
    pub is_grouped: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupQuestion {
    pub question_id: String,
    pub order_in_group: i32,
}

#[derive(Debug, Clone)]
pub struct PositionUpdate {
    pub question_id: String,
    pub position: i32,
}

#[async_trait]
pub trait AnswerKeyResolver: Send + Sync {
    /// Resolves every id in one batch; ids without a question are simply
    /// absent from the result, the engine decides what that means.
    async fn resolve_keys(&self, question_ids: &[String]) -> Result<Vec<AnswerKey>, StoreError>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find(&self, attempt_id: &str) -> Result<Option<AttemptRow>, StoreError>;

    /// Persists answers, scores and the submit timestamp in one transaction.
    /// Must re-read attempt state under a write lock and fail with
    /// `StoreError::AlreadySubmitted` if another submission won the race.
    async fn finalize(
        &self,
        attempt_id: &str,
        answers: &[GradedAnswer],
        scores: &AttemptScores,
        submitted_at: PrimitiveDateTime,
    ) -> Result<(), StoreError>;

    /// Deletes the attempt only while it is still unsubmitted. Returns
    /// whether a row was removed.
    async fn delete_unsubmitted(&self, attempt_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait OrderingStore: Send + Sync {
    async fn exam_exists(&self, exam_id: &str) -> Result<bool, StoreError>;

    async fn list_placements(&self, exam_id: &str) -> Result<Vec<Placement>, StoreError>;

    /// Returns the subset of `question_ids` that exist in the question bank.
    async fn filter_existing_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<String>, StoreError>;

    /// All questions sharing `media_id`, sorted by their intra-group order.
    async fn group_questions(&self, media_id: &str) -> Result<Vec<GroupQuestion>, StoreError>;

    async fn media_of_question(&self, question_id: &str) -> Result<Option<String>, StoreError>;

    /// Batch insert; the whole batch lands or none of it does.
    async fn insert_placements(
        &self,
        exam_id: &str,
        rows: &[NewPlacement],
    ) -> Result<(), StoreError>;

    /// Removes one ungrouped placement. Returns the number of rows removed.
    async fn delete_placement(&self, exam_id: &str, question_id: &str)
        -> Result<u64, StoreError>;

    /// Removes every placement tagged with `media_id` in one statement so a
    /// group can never be half-deleted.
    async fn delete_group(&self, exam_id: &str, media_id: &str) -> Result<u64, StoreError>;

    /// Applies all position updates in one transaction.
    async fn update_positions(
        &self,
        exam_id: &str,
        moves: &[PositionUpdate],
    ) -> Result<(), StoreError>;

    async fn set_question(
        &self,
        exam_id: &str,
        old_question_id: &str,
        new_question_id: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: AnswerKeyResolver + ?Sized> AnswerKeyResolver for Arc<T> {
    async fn resolve_keys(&self, question_ids: &[String]) -> Result<Vec<AnswerKey>, StoreError> {
        (**self).resolve_keys(question_ids).await
    }
}

#[async_trait]
impl<T: AttemptStore + ?Sized> AttemptStore for Arc<T> {
    async fn find(&self, attempt_id: &str) -> Result<Option<AttemptRow>, StoreError> {
        (**self).find(attempt_id).await
    }

    async fn finalize(
        &self,
        attempt_id: &str,
        answers: &[GradedAnswer],
        scores: &AttemptScores,
        submitted_at: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        (**self).finalize(attempt_id, answers, scores, submitted_at).await
    }

    async fn delete_unsubmitted(&self, attempt_id: &str) -> Result<bool, StoreError> {
        (**self).delete_unsubmitted(attempt_id).await
    }
}

#[async_trait]
impl<T: OrderingStore + ?Sized> OrderingStore for Arc<T> {
    async fn exam_exists(&self, exam_id: &str) -> Result<bool, StoreError> {
        (**self).exam_exists(exam_id).await
    }

    async fn list_placements(&self, exam_id: &str) -> Result<Vec<Placement>, StoreError> {
        (**self).list_placements(exam_id).await
    }

    async fn filter_existing_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        (**self).filter_existing_questions(question_ids).await
    }

    async fn group_questions(&self, media_id: &str) -> Result<Vec<GroupQuestion>, StoreError> {
        (**self).group_questions(media_id).await
    }

    async fn media_of_question(&self, question_id: &str) -> Result<Option<String>, StoreError> {
        (**self).media_of_question(question_id).await
    }

    async fn insert_placements(
        &self,
        exam_id: &str,
        rows: &[NewPlacement],
    ) -> Result<(), StoreError> {
        (**self).insert_placements(exam_id, rows).await
    }

    async fn delete_placement(
        &self,
        exam_id: &str,
        question_id: &str,
    ) -> Result<u64, StoreError> {
        (**self).delete_placement(exam_id, question_id).await
    }

    async fn delete_group(&self, exam_id: &str, media_id: &str) -> Result<u64, StoreError> {
        (**self).delete_group(exam_id, media_id).await
    }

    async fn update_positions(
        &self,
        exam_id: &str,
        moves: &[PositionUpdate],
    ) -> Result<(), StoreError> {
        (**self).update_positions(exam_id, moves).await
    }

    async fn set_question(
        &self,
        exam_id: &str,
        old_question_id: &str,
        new_question_id: &str,
    ) -> Result<(), StoreError> {
        (**self).set_question(exam_id, old_question_id, new_question_id).await
    }
}
