pub mod api;
pub mod config;
pub mod crm;
pub mod metrics_defs;
pub mod payload;
pub mod upsert;

use crate::config::Config;
use crate::crm::{Crm, CrmError, HubSpotClient};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ContactUpsertError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CRM client error: {0}")]
    Crm(#[from] CrmError),
}

/// Builds the CRM client when an access token is configured.
pub fn build_crm(config: &config::CrmConfig) -> Result<Option<Arc<dyn Crm>>, CrmError> {
    let Some(token) = config.token() else {
        return Ok(None);
    };

    let client = HubSpotClient::new(&config.base_url, token)?;
    Ok(Some(Arc::new(client)))
}

/// Serves the webhook and admin listeners until either fails.
pub async fn run(config: Config) -> Result<(), ContactUpsertError> {
    let crm = build_crm(&config.crm)?;
    if crm.is_none() {
        tracing::error!("CRM access token is not configured; webhook requests will fail");
    }

    let is_ready = crm.is_some();
    let state = api::AppState::new(crm, config.payload.clone());
    let app = api::router(&config.webhook_path, state);

    let webhook_task = api::serve(&config.listener, app);
    let admin_task = run_http_service::<_, _, ContactUpsertError>(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(move || is_ready),
    );

    tokio::try_join!(webhook_task, admin_task)?;
    Ok(())
}
