use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::types::SkillKind;
use crate::stores::{AnswerKey, AnswerKeyResolver, StoreError};

/// Batch answer-key lookup against the question bank. One query per
/// submission regardless of exam size.
#[derive(Debug, Clone)]
pub struct PgAnswerKeys {
    pool: PgPool,
}

impl PgAnswerKeys {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AnswerKeyRow {
    question_id: String,
    correct_choice_id: String,
    question_type: String,
    skill: String,
    audio_url: Option<String>,
    passage: Option<String>,
}

#[async_trait]
impl AnswerKeyResolver for PgAnswerKeys {
    async fn resolve_keys(&self, question_ids: &[String]) -> Result<Vec<AnswerKey>, StoreError> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AnswerKeyRow>(
            "SELECT q.id AS question_id,
                    c.id AS correct_choice_id,
                    q.question_type,
                    m.skill,
                    m.audio_url,
                    m.passage
             FROM questions q
             JOIN choices c ON c.question_id = q.id AND c.is_correct
             JOIN media m ON m.id = q.media_id
             WHERE q.id = ANY($1)",
        )
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AnswerKey {
                question_id: row.question_id,
                correct_choice_id: row.correct_choice_id,
                question_type: row.question_type,
                skill: SkillKind::parse(&row.skill),
                audio_url: row.audio_url,
                passage: row.passage,
            })
            .collect())
    }
}
