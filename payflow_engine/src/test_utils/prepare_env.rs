use std::env;

use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};
use uuid::Uuid;

use crate::SqliteDatabase;

/// Creates a fresh database at `url` (dropping any previous one) and runs the migrations.
pub async fn prepare_test_env(url: &str) {
    let _ = env_logger::try_init();
    create_database(url).await;
    run_migrations(url).await;
}

/// A unique throwaway database URL so parallel tests never share state.
pub fn random_db_url() -> String {
    let path = env::temp_dir().join(format!("payflow_test_{}.db", Uuid::new_v4()));
    format!("sqlite://{}", path.display())
}

/// One-call setup for most tests: unique file, migrated schema, small pool.
pub async fn prepare_test_db() -> SqliteDatabase {
    let url = random_db_url();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database")
}

async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 1).await.expect("Error creating connection to database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
}

async fn create_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::drop_database(url).await.expect("Error dropping database");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    debug!("🚀️ Created test database at {url}");
}
