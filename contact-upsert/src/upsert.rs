use crate::crm::{ContactId, Crm, CrmError};
use crate::payload::ContactProperties;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

impl UpsertAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UpsertAction::Created => "created",
            UpsertAction::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub contact_id: ContactId,
    pub action: UpsertAction,
}

/// Updates the first contact matching `email`, or creates one when there is
/// no match.
///
/// Search and write are separate CRM calls, so two concurrent upserts for a
/// new email can both create a contact.
pub async fn upsert_contact(
    crm: &dyn Crm,
    email: &str,
    properties: &ContactProperties,
) -> Result<UpsertOutcome, CrmError> {
    let existing = crm.search_by_email(email).await?;

    match existing.into_iter().next() {
        Some(contact_id) => {
            crm.update_contact(&contact_id, properties).await?;
            Ok(UpsertOutcome {
                contact_id,
                action: UpsertAction::Updated,
            })
        }
        None => {
            let contact_id = crm.create_contact(properties).await?;
            Ok(UpsertOutcome {
                contact_id,
                action: UpsertAction::Created,
            })
        }
    }
}
