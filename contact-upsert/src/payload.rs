//! Inbound signup payloads and their translation into CRM contact properties.

use crate::config::{FieldMapping, PropertyMapping};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The four logical fields as they arrived, for echoing back on rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedFields {
    pub pool_id: Value,
    pub business_name: Value,
    pub full_name: Value,
    pub email: Value,
}

impl ReceivedFields {
    /// Picks the mapped fields out of a request body. A body that is not a
    /// JSON object yields all-null fields.
    pub fn from_body(body: &[u8], fields: &FieldMapping) -> Self {
        let object = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(object)) => object,
            Ok(_) | Err(_) => {
                tracing::debug!("Request body is not a JSON object");
                Map::new()
            }
        };

        let pick = |name: &str| object.get(name).cloned().unwrap_or(Value::Null);

        ReceivedFields {
            pool_id: pick(&fields.pool_id),
            business_name: pick(&fields.business_name),
            full_name: pick(&fields.full_name),
            email: pick(&fields.email),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Missing required fields")]
pub struct MissingFields;

/// A payload with every required value present.
#[derive(Debug, Clone, PartialEq)]
pub struct Signup {
    pub pool_id: String,
    pub business_name: String,
    pub full_name: String,
    pub email: String,
}

impl TryFrom<&ReceivedFields> for Signup {
    type Error = MissingFields;

    fn try_from(received: &ReceivedFields) -> Result<Self, Self::Error> {
        Ok(Signup {
            pool_id: required_text(&received.pool_id).ok_or(MissingFields)?,
            business_name: required_text(&received.business_name).ok_or(MissingFields)?,
            full_name: required_text(&received.full_name).ok_or(MissingFields)?,
            email: required_text(&received.email).ok_or(MissingFields)?,
        })
    }
}

/// Text form of a field value, or `None` when the value counts as missing:
/// null, `false`, zero, the empty string, and arrays or objects.
fn required_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".into()),
        _ => None,
    }
}

/// Splits a full name into `(firstname, lastname)`.
///
/// The first whitespace-separated token is the first name; the rest, joined
/// by single spaces, is the last name.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let firstname = parts.next().unwrap_or_default().to_string();
    let lastname = parts.collect::<Vec<_>>().join(" ");
    (firstname, lastname)
}

/// Property key to value, as sent in the CRM's `properties` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ContactProperties(BTreeMap<String, String>);

impl ContactProperties {
    pub fn new(signup: &Signup, mapping: &PropertyMapping) -> Self {
        let (firstname, lastname) = split_name(&signup.full_name);

        let mut properties = BTreeMap::new();
        properties.insert("email".to_string(), signup.email.clone());
        properties.insert("firstname".to_string(), firstname);
        properties.insert("lastname".to_string(), lastname);
        properties.insert("company".to_string(), signup.business_name.clone());
        properties.insert(mapping.pool_id.clone(), signup.pool_id.clone());
        properties.insert(
            mapping.lead_source.clone(),
            mapping.lead_source_value.clone(),
        );

        ContactProperties(properties)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.len()
    }
}
