//! Customer accounts as seen by the back office

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Blocked customers are inactive.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDraft {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 10, max = 15))]
    pub phone: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

impl Customer {
    pub fn create(id: impl Into<String>, draft: CustomerDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(), name: draft.name, email: draft.email.trim().to_lowercase(), phone: draft.phone,
            is_active: draft.is_active, created_at: now, updated_at: now,
        }
    }

    pub fn apply(&mut self, draft: CustomerDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.email = draft.email.trim().to_lowercase();
        self.phone = draft.phone;
        self.is_active = draft.is_active;
        self.updated_at = now;
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) { self.is_active = !self.is_active; self.updated_at = now; }
}
