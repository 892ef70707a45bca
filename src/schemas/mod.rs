pub mod attempt;
pub mod composition;
