use serde::{Deserialize, Serialize};

/// The two scored sections of a practice test. Media rows store this as free
/// text; anything unparseable is a data-integrity defect surfaced by the
/// grading engine, never a silent third bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillKind {
    Aural,
    Written,
}

impl SkillKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aural" | "listening" => Some(Self::Aural),
            "written" | "reading" => Some(Self::Written),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aural => "aural",
            Self::Written => "written",
        }
    }
}
