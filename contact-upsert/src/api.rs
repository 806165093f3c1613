use crate::ContactUpsertError;
use crate::config::{Listener as ListenerConfig, PayloadMapping};
use crate::crm::{ContactId, Crm, CrmError};
use crate::metrics_defs::WEBHOOK_REQUESTS;
use crate::payload::{ContactProperties, ReceivedFields, Signup};
use crate::upsert::{UpsertAction, upsert_contact};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use serde::Serialize;
use serde_json::{Value, json};
use shared::counter;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared by every webhook request. Holds no per-request state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no access token is configured.
    crm: Option<Arc<dyn Crm>>,
    payload: Arc<PayloadMapping>,
}

impl AppState {
    pub fn new(crm: Option<Arc<dyn Crm>>, payload: PayloadMapping) -> Self {
        AppState {
            crm,
            payload: Arc::new(payload),
        }
    }
}

pub fn router(webhook_path: &str, state: AppState) -> Router {
    Router::new()
        .route(webhook_path, any(webhook))
        .with_state(state)
}

pub async fn serve(listener: &ListenerConfig, app: Router) -> Result<(), ContactUpsertError> {
    let addr = format!("{}:{}", listener.host, listener.port);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Webhook listener started");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct UpsertData {
    #[serde(rename = "contactId")]
    contact_id: ContactId,
    pool_id: Value,
    email: Value,
}

#[derive(Serialize)]
struct UpsertResponse {
    success: bool,
    message: String,
    data: UpsertData,
    #[serde(skip)]
    action: UpsertAction,
}

impl IntoResponse for UpsertResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(thiserror::Error, Debug)]
enum WebhookError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Configuration error")]
    Configuration,
    #[error("Missing required fields")]
    MissingFields { received: ReceivedFields },
    #[error(transparent)]
    Crm(#[from] CrmError),
}

impl WebhookError {
    fn outcome(&self) -> &'static str {
        match self {
            WebhookError::MethodNotAllowed => "method_not_allowed",
            WebhookError::Configuration => "configuration_error",
            WebhookError::MissingFields { .. } => "missing_fields",
            WebhookError::Crm(_) => "crm_error",
        }
    }
}

#[derive(Serialize)]
struct CrmErrorResponse<'a> {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "POST")],
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            WebhookError::Configuration => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            WebhookError::MissingFields { ref received } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string(), "received": received })),
            )
                .into_response(),
            WebhookError::Crm(ref e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CrmErrorResponse {
                    success: false,
                    error: e.to_string(),
                    details: e.details(),
                }),
            )
                .into_response(),
        }
    }
}

async fn webhook(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<UpsertResponse, WebhookError> {
    let result = handle_webhook(&state, &method, &body).await;

    let outcome = match &result {
        Ok(response) => response.action.as_str(),
        Err(e) => e.outcome(),
    };
    counter!(WEBHOOK_REQUESTS, "outcome" => outcome).increment(1);

    result
}

async fn handle_webhook(
    state: &AppState,
    method: &Method,
    body: &[u8],
) -> Result<UpsertResponse, WebhookError> {
    if method != Method::POST {
        return Err(WebhookError::MethodNotAllowed);
    }

    let Some(crm) = state.crm.as_deref() else {
        tracing::error!("Missing CRM access token");
        return Err(WebhookError::Configuration);
    };

    let received = ReceivedFields::from_body(body, &state.payload.fields);
    tracing::info!(
        pool_id = %received.pool_id,
        email = %received.email,
        "Received signup"
    );

    let Ok(signup) = Signup::try_from(&received) else {
        tracing::warn!(received = ?received, "Missing required fields");
        return Err(WebhookError::MissingFields { received });
    };

    let properties = ContactProperties::new(&signup, &state.payload.properties);
    let outcome = upsert_contact(crm, &signup.email, &properties)
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, details = ?e.details(), "Webhook error");
        })?;

    tracing::info!(
        contact_id = %outcome.contact_id,
        action = outcome.action.as_str(),
        "Contact upserted"
    );

    Ok(UpsertResponse {
        success: true,
        message: format!("Contact {}", outcome.action.as_str()),
        data: UpsertData {
            contact_id: outcome.contact_id,
            pool_id: received.pool_id,
            email: received.email,
        },
        action: outcome.action,
    })
}
