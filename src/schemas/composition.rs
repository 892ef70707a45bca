use serde::{Deserialize, Serialize};

/// A standalone question to place at an explicit position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPlacementInput {
    pub question_id: String,
    pub position: i32,
}

/// Read-only structural diagnostic over an exam's placement sequence.
#[derive(Debug, Clone, Serialize)]
pub struct StructureReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
}
