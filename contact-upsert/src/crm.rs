//! HubSpot CRM contacts API (v3).

use crate::metrics_defs::CRM_REQUEST_DURATION;
use crate::payload::ContactProperties;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::histogram;
use std::time::Instant;
use url::Url;

pub type ContactId = String;

#[derive(thiserror::Error, Debug)]
pub enum CrmError {
    #[error("{0}")]
    Transport(#[source] reqwest::Error),
    #[error("Request failed with status code {}", .status.as_u16())]
    Status {
        status: StatusCode,
        /// Error payload returned by the CRM, if it sent one.
        details: Option<Value>,
    },
    #[error("Unexpected response from CRM: {0}")]
    InvalidResponse(String),
    #[error("invalid CRM base URL: {0}")]
    InvalidUrl(String),
}

impl CrmError {
    /// The CRM's own description of the failure.
    pub fn details(&self) -> Option<&Value> {
        match self {
            CrmError::Status { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}

/// Contact operations needed for an upsert.
#[async_trait]
pub trait Crm: Send + Sync {
    /// Ids of contacts whose `email` property equals `email`, in CRM order.
    async fn search_by_email(&self, email: &str) -> Result<Vec<ContactId>, CrmError>;

    /// Overwrites the given properties on an existing contact.
    async fn update_contact(
        &self,
        id: &str,
        properties: &ContactProperties,
    ) -> Result<(), CrmError>;

    async fn create_contact(&self, properties: &ContactProperties)
    -> Result<ContactId, CrmError>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    #[serde(rename = "filterGroups")]
    filter_groups: [FilterGroup<'a>; 1],
}

#[derive(Debug, Serialize)]
struct FilterGroup<'a> {
    filters: [Filter<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Filter<'a> {
    #[serde(rename = "propertyName")]
    property_name: &'a str,
    operator: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<ContactObject>,
}

#[derive(Debug, Deserialize)]
struct ContactObject {
    id: ContactId,
}

#[derive(Debug, Serialize)]
struct ContactInput<'a> {
    properties: &'a ContactProperties,
}

#[derive(Clone)]
pub struct HubSpotClient {
    client: Client,
    contacts_url: Url,
    token: String,
}

impl HubSpotClient {
    pub fn new(base_url: &Url, token: impl Into<String>) -> Result<Self, CrmError> {
        if base_url.cannot_be_a_base() {
            return Err(CrmError::InvalidUrl(base_url.to_string()));
        }

        // Url::join drops the last path segment unless it ends with '/'
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(HubSpotClient {
            client: Client::new(),
            contacts_url: base
                .join("crm/v3/objects/contacts")
                .map_err(|e| CrmError::InvalidUrl(e.to_string()))?,
            token: token.into(),
        })
    }

    fn contacts_path(&self, suffix: &str) -> Result<Url, CrmError> {
        let mut url = self.contacts_url.clone();
        url.path_segments_mut()
            .map_err(|()| CrmError::InvalidUrl(self.contacts_url.to_string()))?
            .push(suffix);
        Ok(url)
    }

    /// Sends an authenticated request, returning the body of a 2xx response.
    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<u8>, CrmError> {
        let start = Instant::now();
        let result = self.execute_inner(request).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        histogram!(CRM_REQUEST_DURATION, "operation" => operation, "status" => status)
            .record(start.elapsed().as_secs_f64());

        result
    }

    async fn execute_inner(&self, request: RequestBuilder) -> Result<Vec<u8>, CrmError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(CrmError::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(CrmError::Transport)?;

        if !status.is_success() {
            return Err(CrmError::Status {
                status,
                details: error_details(&body),
            });
        }

        Ok(body.to_vec())
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, CrmError> {
    serde_json::from_slice(body).map_err(|e| CrmError::InvalidResponse(e.to_string()))
}

/// JSON error payloads are kept as-is, anything else as a string.
fn error_details(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(body).into_owned())),
    }
}

#[async_trait]
impl Crm for HubSpotClient {
    async fn search_by_email(&self, email: &str) -> Result<Vec<ContactId>, CrmError> {
        let body = SearchRequest {
            filter_groups: [FilterGroup {
                filters: [Filter {
                    property_name: "email",
                    operator: "EQ",
                    value: email,
                }],
            }],
        };

        let request = self.client.post(self.contacts_path("search")?).json(&body);
        let response: SearchResponse = decode(&self.execute("search", request).await?)?;
        Ok(response.results.into_iter().map(|c| c.id).collect())
    }

    async fn update_contact(
        &self,
        id: &str,
        properties: &ContactProperties,
    ) -> Result<(), CrmError> {
        let request = self
            .client
            .patch(self.contacts_path(id)?)
            .json(&ContactInput { properties });
        // The updated contact is echoed back; only the status matters.
        self.execute("update", request).await?;
        Ok(())
    }

    async fn create_contact(
        &self,
        properties: &ContactProperties,
    ) -> Result<ContactId, CrmError> {
        let request = self
            .client
            .post(self.contacts_url.clone())
            .json(&ContactInput { properties });
        let created: ContactObject = decode(&self.execute("create", request).await?)?;
        Ok(created.id)
    }
}
