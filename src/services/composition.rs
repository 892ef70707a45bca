use std::collections::{BTreeMap, HashSet};

use crate::errors::EngineError;
use crate::schemas::composition::{QuestionPlacementInput, StructureReport};
use crate::stores::{NewPlacement, OrderingStore, Placement, PositionUpdate};

/// Maintains the ordered placement sequence of an exam. Media groups are
/// first-class: a shared-media block appears, moves and disappears as one
/// unit, and standalone operations refuse to touch grouped placements.
pub struct CompositionEngine<O> {
    store: O,
}

impl<O: OrderingStore> CompositionEngine<O> {
    pub fn new(store: O) -> Self {
        Self { store }
    }

    /// Places standalone questions at explicit positions.
    pub async fn add_questions(
        &self,
        exam_id: &str,
        entries: &[QuestionPlacementInput],
    ) -> Result<(), EngineError> {
        self.require_exam(exam_id).await?;

        if entries.is_empty() {
            return Err(EngineError::Validation("no questions to add".to_string()));
        }

        let mut seen_questions = HashSet::new();
        let mut seen_positions = HashSet::new();
        for entry in entries {
            if entry.position < 1 {
                return Err(EngineError::Validation(format!(
                    "invalid position {} for question {}",
                    entry.position, entry.question_id
                )));
            }
            if !seen_questions.insert(entry.question_id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "question {} listed more than once",
                    entry.question_id
                )));
            }
            if !seen_positions.insert(entry.position) {
                return Err(EngineError::Validation(format!(
                    "position {} listed more than once",
                    entry.position
                )));
            }
        }

        let requested: Vec<String> =
            entries.iter().map(|entry| entry.question_id.clone()).collect();
        let existing: HashSet<String> =
            self.store.filter_existing_questions(&requested).await?.into_iter().collect();
        for entry in entries {
            if !existing.contains(&entry.question_id) {
                return Err(EngineError::Validation(format!(
                    "question {} does not exist",
                    entry.question_id
                )));
            }
        }

        let current = self.store.list_placements(exam_id).await?;
        let placed: HashSet<&str> =
            current.iter().map(|placement| placement.question_id.as_str()).collect();
        let occupied: HashSet<i32> =
            current.iter().map(|placement| placement.position).collect();
        for entry in entries {
            if placed.contains(entry.question_id.as_str()) {
                return Err(EngineError::Conflict(format!(
                    "question {} is already placed in this exam",
                    entry.question_id
                )));
            }
            if occupied.contains(&entry.position) {
                return Err(EngineError::Conflict(format!(
                    "position {} is already occupied",
                    entry.position
                )));
            }
        }

        let rows: Vec<NewPlacement> = entries
            .iter()
            .map(|entry| NewPlacement {
                question_id: entry.question_id.clone(),
                position: entry.position,
                group_id: None,
                is_grouped: false,
            })
            .collect();
        self.store.insert_placements(exam_id, &rows).await?;

        metrics::counter!("composition_ops_total", "op" => "add_questions").increment(1);
        tracing::info!(exam_id = %exam_id, added = rows.len(), "Questions added to exam");

        Ok(())
    }

    /// Places a whole media group as one contiguous block starting at
    /// `start_position`, in intra-group order.
    pub async fn add_media_group(
        &self,
        exam_id: &str,
        media_id: &str,
        start_position: i32,
    ) -> Result<(), EngineError> {
        self.require_exam(exam_id).await?;

        if start_position < 1 {
            return Err(EngineError::Validation(format!(
                "invalid start position {start_position}"
            )));
        }

        let members = self.store.group_questions(media_id).await?;
        if members.is_empty() {
            return Err(EngineError::NotFound(format!(
                "media {media_id} has no questions"
            )));
        }

        let current = self.store.list_placements(exam_id).await?;
        if current
            .iter()
            .any(|placement| placement.group_id.as_deref() == Some(media_id))
        {
            return Err(EngineError::Conflict(format!(
                "media group {media_id} is already in this exam"
            )));
        }

        let placed: HashSet<&str> =
            current.iter().map(|placement| placement.question_id.as_str()).collect();
        for member in &members {
            if placed.contains(member.question_id.as_str()) {
                return Err(EngineError::Conflict(format!(
                    "question {} is already placed in this exam",
                    member.question_id
                )));
            }
        }

        let end_position = start_position + members.len() as i32 - 1;
        if let Some(position) = current
            .iter()
            .map(|placement| placement.position)
            .find(|position| (start_position..=end_position).contains(position))
        {
            return Err(EngineError::Conflict(format!(
                "position {position} is already occupied"
            )));
        }

        let rows: Vec<NewPlacement> = members
            .iter()
            .enumerate()
            .map(|(offset, member)| NewPlacement {
                question_id: member.question_id.clone(),
                position: start_position + offset as i32,
                group_id: Some(media_id.to_string()),
                is_grouped: true,
            })
            .collect();
        self.store.insert_placements(exam_id, &rows).await?;

        metrics::counter!("composition_ops_total", "op" => "add_media_group").increment(1);
        tracing::info!(
            exam_id = %exam_id,
            media_id = %media_id,
            members = rows.len(),
            start_position = start_position,
            "Media group added to exam"
        );

        Ok(())
    }

    /// Removes every placement of the group in one batch. Returns how many
    /// placements were removed.
    pub async fn remove_media_group(
        &self,
        exam_id: &str,
        media_id: &str,
    ) -> Result<u64, EngineError> {
        self.require_exam(exam_id).await?;

        let removed = self.store.delete_group(exam_id, media_id).await?;
        if removed == 0 {
            return Err(EngineError::NotFound(format!(
                "media group {media_id} is not in this exam"
            )));
        }

        metrics::counter!("composition_ops_total", "op" => "remove_media_group").increment(1);
        tracing::info!(exam_id = %exam_id, media_id = %media_id, removed = removed, "Media group removed");

        Ok(removed)
    }

    /// Reassigns the group contiguous positions starting at
    /// `new_start_position`, preserving relative order and membership.
    pub async fn move_media_group(
        &self,
        exam_id: &str,
        media_id: &str,
        new_start_position: i32,
    ) -> Result<(), EngineError> {
        self.require_exam(exam_id).await?;

        if new_start_position < 1 {
            return Err(EngineError::Validation(format!(
                "invalid start position {new_start_position}"
            )));
        }

        let current = self.store.list_placements(exam_id).await?;
        let mut group: Vec<&Placement> = current
            .iter()
            .filter(|placement| placement.group_id.as_deref() == Some(media_id))
            .collect();
        if group.is_empty() {
            return Err(EngineError::NotFound(format!(
                "media group {media_id} is not in this exam"
            )));
        }
        group.sort_by_key(|placement| placement.position);

        let end_position = new_start_position + group.len() as i32 - 1;
        if let Some(position) = current
            .iter()
            .filter(|placement| placement.group_id.as_deref() != Some(media_id))
            .map(|placement| placement.position)
            .find(|position| (new_start_position..=end_position).contains(position))
        {
            return Err(EngineError::Conflict(format!(
                "position {position} is already occupied"
            )));
        }

        let moves: Vec<PositionUpdate> = group
            .iter()
            .enumerate()
            .map(|(offset, placement)| PositionUpdate {
                question_id: placement.question_id.clone(),
                position: new_start_position + offset as i32,
            })
            .collect();
        self.store.update_positions(exam_id, &moves).await?;

        metrics::counter!("composition_ops_total", "op" => "move_media_group").increment(1);
        tracing::info!(
            exam_id = %exam_id,
            media_id = %media_id,
            new_start_position = new_start_position,
            "Media group moved"
        );

        Ok(())
    }

    /// Swaps the question behind a placement, keeping its position. A
    /// grouped placement only accepts a replacement from the same media
    /// group.
    pub async fn replace_question(
        &self,
        exam_id: &str,
        old_question_id: &str,
        new_question_id: &str,
    ) -> Result<(), EngineError> {
        self.require_exam(exam_id).await?;

        let current = self.store.list_placements(exam_id).await?;
        let placement = current
            .iter()
            .find(|placement| placement.question_id == old_question_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "question {old_question_id} is not placed in this exam"
                ))
            })?;

        if current.iter().any(|placement| placement.question_id == new_question_id) {
            return Err(EngineError::Conflict(format!(
                "question {new_question_id} is already placed in this exam"
            )));
        }

        let new_media =
            self.store.media_of_question(new_question_id).await?.ok_or_else(|| {
                EngineError::NotFound(format!("question {new_question_id} not found"))
            })?;

        if placement.is_grouped && placement.group_id.as_deref() != Some(new_media.as_str()) {
            return Err(EngineError::Conflict(format!(
                "question {new_question_id} belongs to a different media group"
            )));
        }

        self.store.set_question(exam_id, old_question_id, new_question_id).await?;

        metrics::counter!("composition_ops_total", "op" => "replace_question").increment(1);
        tracing::info!(
            exam_id = %exam_id,
            old_question_id = %old_question_id,
            new_question_id = %new_question_id,
            "Question replaced"
        );

        Ok(())
    }

    /// Removes one standalone placement. Grouped placements must go through
    /// `remove_media_group`.
    pub async fn remove_question(
        &self,
        exam_id: &str,
        question_id: &str,
    ) -> Result<(), EngineError> {
        self.require_exam(exam_id).await?;

        let current = self.store.list_placements(exam_id).await?;
        let placement = current
            .iter()
            .find(|placement| placement.question_id == question_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "question {question_id} is not placed in this exam"
                ))
            })?;

        if placement.group_id.is_some() {
            return Err(EngineError::Conflict(format!(
                "question {question_id} belongs to a media group; remove the group instead"
            )));
        }

        self.store.delete_placement(exam_id, question_id).await?;

        metrics::counter!("composition_ops_total", "op" => "remove_question").increment(1);
        tracing::info!(exam_id = %exam_id, question_id = %question_id, "Question removed");

        Ok(())
    }

    /// Renumbers all placements densely from 1, preserving relative order.
    pub async fn compact_order(&self, exam_id: &str) -> Result<(), EngineError> {
        self.require_exam(exam_id).await?;

        let mut current = self.store.list_placements(exam_id).await?;
        current.sort_by_key(|placement| placement.position);

        let moves: Vec<PositionUpdate> = current
            .iter()
            .enumerate()
            .filter(|(index, placement)| placement.position != *index as i32 + 1)
            .map(|(index, placement)| PositionUpdate {
                question_id: placement.question_id.clone(),
                position: index as i32 + 1,
            })
            .collect();

        if !moves.is_empty() {
            self.store.update_positions(exam_id, &moves).await?;
        }

        metrics::counter!("composition_ops_total", "op" => "compact_order").increment(1);
        tracing::info!(exam_id = %exam_id, renumbered = moves.len(), "Placement order compacted");

        Ok(())
    }

    /// Read-only structural diagnostic: duplicate positions, gaps wider
    /// than one, and non-contiguous media groups.
    pub async fn validate_structure(&self, exam_id: &str) -> Result<StructureReport, EngineError> {
        self.require_exam(exam_id).await?;

        let mut placements = self.store.list_placements(exam_id).await?;
        placements.sort_by_key(|placement| placement.position);

        let mut issues = Vec::new();

        let mut reported_duplicates = HashSet::new();
        for pair in placements.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            if previous.position == next.position {
                if reported_duplicates.insert(previous.position) {
                    issues.push(format!(
                        "position {} is assigned to more than one question",
                        previous.position
                    ));
                }
            } else if next.position - previous.position > 1 {
                issues.push(format!(
                    "gap between positions {} and {}",
                    previous.position, next.position
                ));
            }
        }

        let mut groups: BTreeMap<&str, (i32, i32, i32)> = BTreeMap::new();
        for placement in &placements {
            if let Some(group_id) = placement.group_id.as_deref() {
                let entry = groups
                    .entry(group_id)
                    .or_insert((placement.position, placement.position, 0));
                entry.0 = entry.0.min(placement.position);
                entry.1 = entry.1.max(placement.position);
                entry.2 += 1;
            }
        }
        for (group_id, (min, max, count)) in groups {
            if count != max - min + 1 {
                issues.push(format!(
                    "media group {group_id} is not contiguous: {count} members spanning positions {min}..{max}"
                ));
            }
        }

        Ok(StructureReport { is_valid: issues.is_empty(), issues })
    }

    async fn require_exam(&self, exam_id: &str) -> Result<(), EngineError> {
        if !self.store.exam_exists(exam_id).await? {
            return Err(EngineError::NotFound(format!("exam {exam_id} not found")));
        }
        Ok(())
    }
}
