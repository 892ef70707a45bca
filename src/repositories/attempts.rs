use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::stores::{AttemptRow, AttemptScores, AttemptStore, GradedAnswer, StoreError};

#[derive(Debug, Clone)]
pub struct PgAttempts {
    pool: PgPool,
}

impl PgAttempts {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgAttempts {
    async fn find(&self, attempt_id: &str) -> Result<Option<AttemptRow>, StoreError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            "SELECT a.id,
                    a.student_id,
                    a.exam_id,
                    a.started_at,
                    a.submitted_at,
                    e.duration_minutes AS time_limit_minutes
             FROM attempts a
             JOIN exams e ON e.id = a.exam_id
             WHERE a.id = $1",
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn finalize(
        &self,
        attempt_id: &str,
        answers: &[GradedAnswer],
        scores: &AttemptScores,
        submitted_at: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Re-read under a row lock: the losing side of a concurrent submit
        // must observe the winner's timestamp and bail out here.
        let current: Option<PrimitiveDateTime> =
            sqlx::query_scalar("SELECT submitted_at FROM attempts WHERE id = $1 FOR UPDATE")
                .bind(attempt_id)
                .fetch_one(&mut *tx)
                .await?;

        if current.is_some() {
            return Err(StoreError::AlreadySubmitted);
        }

        if !answers.is_empty() {
            let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
                "INSERT INTO attempt_answers (
                    id, attempt_id, question_id, choice_id, is_correct, created_at
                 ) ",
            );
            builder.push_values(answers, |mut row, answer| {
                row.push_bind(Uuid::new_v4().to_string())
                    .push_bind(attempt_id)
                    .push_bind(&answer.question_id)
                    .push_bind(&answer.choice_id)
                    .push_bind(answer.is_correct)
                    .push_bind(submitted_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        sqlx::query(
            "UPDATE attempts
             SET submitted_at = $1,
                 score_percent = $2,
                 aural_scaled = $3,
                 written_scaled = $4
             WHERE id = $5",
        )
        .bind(submitted_at)
        .bind(scores.score_percent)
        .bind(scores.aural_scaled)
        .bind(scores.written_scaled)
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn delete_unsubmitted(&self, attempt_id: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM attempts WHERE id = $1 AND submitted_at IS NULL")
                .bind(attempt_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
