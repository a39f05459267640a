//! Blog posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::value_objects::slugify;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    /// Rich-text body as HTML from the admin editor.
    pub content: String,
    pub cover_image: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Published posts are the active ones.
    pub is_active: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlogDraft {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[validate(length(min = 1))]
    pub content: String,
    pub cover_image: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl Blog {
    pub fn create(id: impl Into<String>, draft: BlogDraft, now: DateTime<Utc>) -> Self {
        let mut blog = Self {
            id: id.into(), slug: slugify(&draft.title), title: draft.title, excerpt: draft.excerpt,
            content: draft.content, cover_image: draft.cover_image, author: draft.author, tags: normalize_tags(draft.tags),
            is_active: false, published_at: None, created_at: now, updated_at: now,
        };
        blog.set_published(draft.is_active, now);
        blog
    }

    pub fn apply(&mut self, draft: BlogDraft, now: DateTime<Utc>) {
        self.slug = slugify(&draft.title);
        self.title = draft.title;
        self.excerpt = draft.excerpt;
        self.content = draft.content;
        self.cover_image = draft.cover_image;
        self.author = draft.author;
        self.tags = normalize_tags(draft.tags);
        self.set_published(draft.is_active, now);
        self.updated_at = now;
    }

    /// `publishedAt` records the first publication and survives unpublishing.
    pub fn set_published(&mut self, published: bool, now: DateTime<Utc>) {
        self.is_active = published;
        if published && self.published_at.is_none() { self.published_at = Some(now); }
        self.updated_at = now;
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) { self.set_published(!self.is_active, now); }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags.into_iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
    tags.sort();
    tags.dedup();
    tags
}
