//! Brand Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::value_objects::slugify;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BrandDraft {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(url)]
    pub logo: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

impl Brand {
    pub fn create(id: impl Into<String>, draft: BrandDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(), slug: slugify(&draft.name), name: draft.name, logo: draft.logo,
            description: draft.description, is_active: draft.is_active, created_at: now, updated_at: now,
        }
    }

    pub fn apply(&mut self, draft: BrandDraft, now: DateTime<Utc>) {
        self.slug = slugify(&draft.name);
        self.name = draft.name;
        self.logo = draft.logo;
        self.description = draft.description;
        self.is_active = draft.is_active;
        self.updated_at = now;
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) { self.is_active = !self.is_active; self.updated_at = now; }
}
