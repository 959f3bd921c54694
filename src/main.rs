use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod service;
mod store;
mod utils;

use crate::config::{Config, EvidenceBackend};
use crate::docs::ApiDoc;
use crate::service::attendance::AttendanceService;
use crate::service::leave::LeaveLedger;
use crate::store::EmployeeDirectory;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::evidence_store::{EvidenceStore, HttpEvidenceStore, LocalEvidenceStore};
use crate::utils::rate_limiter::{RateLimiter, WindowedRateLimiter};

fn evidence_store(config: &Config) -> Arc<dyn EvidenceStore> {
    match &config.evidence {
        EvidenceBackend::Local { dir, public_url } => {
            Arc::new(LocalEvidenceStore::new(dir, public_url.clone()))
        }
        EvidenceBackend::Http {
            endpoint,
            bucket,
            api_key,
        } => Arc::new(HttpEvidenceStore::new(
            endpoint.clone(),
            bucket.clone(),
            api_key.clone(),
            reqwest::Client::new(),
        )),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(true) // keeps the "audit" target visible
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let backend = db::init_backend(config.database_url.as_deref()).await?;

    let attendance = Data::new(AttendanceService::new(
        backend.attendance.clone(),
        backend.leaves.clone(),
        backend.holidays.clone(),
        evidence_store(&config),
        config.office.clone(),
        config.evidence_max_bytes,
    ));
    let ledger = Data::new(LeaveLedger::new(
        backend.leaves.clone(),
        config.leave.clone(),
    ));
    let directory: Data<dyn EmployeeDirectory> = Data::from(backend.directory.clone());
    let limiter: Data<dyn RateLimiter> = Data::from(Arc::new(WindowedRateLimiter::per_minute(
        config.rate_attendance_per_min,
    )) as Arc<dyn RateLimiter>);
    let clock: Data<dyn Clock> = Data::from(Arc::new(SystemClock) as Arc<dyn Clock>);
    let protected_limiter = routes::build_limiter(config.rate_protected_per_min)?;

    if config.auto_stop_sweep_secs > 0 {
        let service = attendance.clone();
        let clock = clock.clone();
        let period = Duration::from_secs(config.auto_stop_sweep_secs);
        actix_web::rt::spawn(async move {
            let mut ticker = actix_web::rt::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = service.sweep_auto_stop(clock.now()).await {
                    error!(error = %e, "Auto-stop sweep failed");
                }
            }
        });
        info!(every_secs = config.auto_stop_sweep_secs, "Auto-stop sweep enabled");
    }

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config_data.clone())
            .app_data(api::json_config(config_data.evidence_max_bytes))
            .app_data(attendance.clone())
            .app_data(ledger.clone())
            .app_data(directory.clone())
            .app_data(limiter.clone())
            .app_data(clock.clone())
            // protected routes with authentication and rate limiting
            .configure(|cfg| routes::configure(cfg, &config_data, &protected_limiter))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
