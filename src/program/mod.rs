pub mod domain;
pub mod plan;
pub mod report;
pub mod repository;

pub use domain::{DifficultyLevel, ProgramStatus, TaskKind, PROGRAM_DAYS};
pub use repository::{Completion, ProgramError, ProgramRepository, SqliteProgramRepository};
