use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::stores::{GroupQuestion, NewPlacement, OrderingStore, Placement, PositionUpdate, StoreError};

/// Placement sequence store. Every multi-row mutation runs in one
/// transaction that first locks the exam row, so two composition writes
/// against the same exam cannot interleave partial renumbering.
#[derive(Debug, Clone)]
pub struct PgPlacements {
    pool: PgPool,
}

impl PgPlacements {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn lock_exam(tx: &mut Transaction<'_, Postgres>, exam_id: &str) -> Result<(), StoreError> {
    sqlx::query_scalar::<_, String>("SELECT id FROM exams WHERE id = $1 FOR UPDATE")
        .bind(exam_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl OrderingStore for PgPlacements {
    async fn exam_exists(&self, exam_id: &str) -> Result<bool, StoreError> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM exams WHERE id = $1")
            .bind(exam_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn list_placements(&self, exam_id: &str) -> Result<Vec<Placement>, StoreError> {
        let rows = sqlx::query_as::<_, Placement>(
            "SELECT question_id, position, group_id, is_grouped
             FROM placements
             WHERE exam_id = $1
             ORDER BY position",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn filter_existing_questions(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let found = sqlx::query_scalar::<_, String>("SELECT id FROM questions WHERE id = ANY($1)")
            .bind(question_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(found)
    }

    async fn group_questions(&self, media_id: &str) -> Result<Vec<GroupQuestion>, StoreError> {
        let rows = sqlx::query_as::<_, GroupQuestion>(
            "SELECT id AS question_id, order_in_group
             FROM questions
             WHERE media_id = $1
             ORDER BY order_in_group, id",
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn media_of_question(&self, question_id: &str) -> Result<Option<String>, StoreError> {
        let media_id: Option<String> =
            sqlx::query_scalar("SELECT media_id FROM questions WHERE id = $1")
                .bind(question_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(media_id)
    }

    async fn insert_placements(
        &self,
        exam_id: &str,
        rows: &[NewPlacement],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        lock_exam(&mut tx, exam_id).await?;

        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO placements (
                id, exam_id, question_id, position, group_id, is_grouped
             ) ",
        );
        builder.push_values(rows, |mut entry, row| {
            entry
                .push_bind(Uuid::new_v4().to_string())
                .push_bind(exam_id)
                .push_bind(&row.question_id)
                .push_bind(row.position)
                .push_bind(&row.group_id)
                .push_bind(row.is_grouped);
        });
        builder.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_placement(
        &self,
        exam_id: &str,
        question_id: &str,
    ) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM placements WHERE exam_id = $1 AND question_id = $2")
                .bind(exam_id)
                .bind(question_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_group(&self, exam_id: &str, media_id: &str) -> Result<u64, StoreError> {
        // One statement: the group disappears whole or not at all.
        let result = sqlx::query("DELETE FROM placements WHERE exam_id = $1 AND group_id = $2")
            .bind(exam_id)
            .bind(media_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_positions(
        &self,
        exam_id: &str,
        moves: &[PositionUpdate],
    ) -> Result<(), StoreError> {
        if moves.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        lock_exam(&mut tx, exam_id).await?;

        // The (exam_id, position) unique constraint is deferred, so the
        // sequence may pass through transient overlaps until commit.
        for update in moves {
            sqlx::query(
                "UPDATE placements SET position = $1 WHERE exam_id = $2 AND question_id = $3",
            )
            .bind(update.position)
            .bind(exam_id)
            .bind(&update.question_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_question(
        &self,
        exam_id: &str,
        old_question_id: &str,
        new_question_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE placements SET question_id = $1 WHERE exam_id = $2 AND question_id = $3",
        )
        .bind(new_question_id)
        .bind(exam_id)
        .bind(old_question_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
