use std::sync::Arc;

use anyhow::Context;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tracing::{info, warn};

use crate::store::{
    AttendanceStore, EmployeeDirectory, HolidayCalendar, LeaveStore, memory::MemoryStore,
    mysql::MySqlStore,
};

pub async fn init_db(database_url: &str) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

/// The storage seams, all served by one backend.
pub struct Backend {
    pub attendance: Arc<dyn AttendanceStore>,
    pub leaves: Arc<dyn LeaveStore>,
    pub holidays: Arc<dyn HolidayCalendar>,
    pub directory: Arc<dyn EmployeeDirectory>,
}

impl Backend {
    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: AttendanceStore + LeaveStore + HolidayCalendar + EmployeeDirectory + 'static,
    {
        Self {
            attendance: store.clone(),
            leaves: store.clone(),
            holidays: store.clone(),
            directory: store,
        }
    }
}

/// MySQL when `database_url` is set, otherwise the seeded in-memory store.
pub async fn init_backend(database_url: Option<&str>) -> anyhow::Result<Backend> {
    match database_url {
        Some(url) => {
            let pool = init_db(url).await?;
            info!("Using MySQL storage");
            Ok(Backend::from_store(Arc::new(MySqlStore::new(pool))))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage (data is lost on restart)");
            Ok(Backend::from_store(Arc::new(
                MemoryStore::seeded_for_development(),
            )))
        }
    }
}
