pub mod answer_keys;
pub mod attempts;
pub mod placements;

pub use answer_keys::PgAnswerKeys;
pub use attempts::PgAttempts;
pub use placements::PgPlacements;
