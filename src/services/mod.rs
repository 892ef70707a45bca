pub mod composition;
pub mod grading;
pub mod scaling;
