use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::program::repository::{ProgramRepository, SqliteProgramRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub programs: Arc<dyn ProgramRepository>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let programs = Arc::new(SqliteProgramRepository::new(db.clone()));
        Self {
            db,
            config,
            programs,
        }
    }
}
