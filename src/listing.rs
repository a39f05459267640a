//! List queries: search, sort and paging.
//!
//! Collection endpoints take a [`ListQuery`] and answer with a [`Page`]. The
//! Postgres store turns the query into SQL; [`view`] applies the same
//! semantics to a collection that is already in memory.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_SORT: &str = "createdAt";
/// Top-level text fields a search term is matched against.
pub const SEARCH_FIELDS: &[&str] = &["id", "name", "title", "slug", "sku", "code", "email"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder { Asc, #[default] Desc }

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self { Self::Asc => "ASC", Self::Desc => "DESC" }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
    /// Restrict to documents whose `isActive` matches.
    pub active: Option<bool>,
}

impl ListQuery {
    pub fn page(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn limit(&self) -> u32 { self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) }
    pub fn offset(&self) -> u64 { u64::from(self.page() - 1) * u64::from(self.limit()) }
    pub fn order(&self) -> SortOrder { self.order.unwrap_or_default() }

    /// Trimmed, lowercased search term; `None` when blank.
    pub fn search_term(&self) -> Option<String> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase)
    }

    /// Sort field, restricted to plain camelCase identifiers.
    pub fn sort_field(&self) -> &str {
        match self.sort.as_deref() {
            Some(field) if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => field,
            _ => DEFAULT_SORT,
        }
    }

    /// Same query restricted to active documents.
    pub fn published(self) -> Self { Self { active: Some(true), ..self } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, query: &ListQuery) -> Self {
        let limit = query.limit();
        let pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
        Self { data, total, page: query.page(), limit, pages }
    }
}

/// Filters, sorts and pages an in-memory collection.
///
/// Search matches case-insensitively inside any of the [`SEARCH_FIELDS`]
/// string values, the same fields the Postgres store matches.
pub fn view<T: Serialize>(items: Vec<T>, query: &ListQuery) -> Page<T> {
    let term = query.search_term();
    let field = query.sort_field();
    let mut rows: Vec<(Value, T)> = items
        .into_iter()
        .filter_map(|item| serde_json::to_value(&item).ok().map(|v| (v, item)))
        .filter(|(v, _)| query.active.map_or(true, |active| v.get("isActive").and_then(Value::as_bool) == Some(active)))
        .filter(|(v, _)| term.as_deref().map_or(true, |t| matches_term(v, t)))
        .collect();

    rows.sort_by(|(a, _), (b, _)| {
        let ord = compare_json(a.get(field), b.get(field));
        match query.order() { SortOrder::Asc => ord, SortOrder::Desc => ord.reverse() }
    });

    let total = rows.len() as u64;
    let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
    let data = rows.into_iter().skip(offset).take(query.limit() as usize).map(|(_, item)| item).collect();
    Page::new(data, total, query)
}

fn matches_term(doc: &Value, term: &str) -> bool {
    SEARCH_FIELDS
        .iter()
        .filter_map(|field| doc.get(*field).and_then(Value::as_str))
        .any(|text| text.to_lowercase().contains(term))
}

/// Orders numbers numerically and strings case-insensitively; missing values sort last ascending.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Vec<Value> {
        (1..=45)
            .map(|i| json!({ "id": format!("P{i}"), "name": format!("Tile {i}"), "price": i * 10, "isActive": i % 3 != 0, "createdAt": format!("2024-01-{:02}", (i % 28) + 1) }))
            .collect()
    }

    #[test]
    fn test_defaults_page_twenty() {
        let page = view(catalog(), &ListQuery::default());
        assert_eq!((page.total, page.page, page.limit, page.pages), (45, 1, 20, 3));
        assert_eq!(page.data.len(), 20);
    }

    #[test]
    fn test_last_page_and_overflow() {
        let q = ListQuery { page: Some(3), ..Default::default() };
        assert_eq!(view(catalog(), &q).data.len(), 5);
        let q = ListQuery { page: Some(9), ..Default::default() };
        assert!(view(catalog(), &q).data.is_empty());
    }

    #[test]
    fn test_numeric_sort() {
        let q = ListQuery { sort: Some("price".into()), order: Some(SortOrder::Asc), limit: Some(3), ..Default::default() };
        let prices: Vec<i64> = view(catalog(), &q).data.iter().filter_map(|v| v["price"].as_i64()).collect();
        assert_eq!(prices, [10, 20, 30]);
    }

    #[test]
    fn test_search_and_active_filter() {
        let q = ListQuery { search: Some(" TILE 4".into()), active: Some(true), limit: Some(100), ..Default::default() };
        let page = view(catalog(), &q);
        // "Tile 4", "Tile 40".."Tile 44" minus multiples of three (42).
        assert_eq!(page.total, 5);
    }

    #[test]
    fn test_search_ignores_keys_and_other_values() {
        let q = |term: &str| ListQuery { search: Some(term.into()), limit: Some(100), ..Default::default() };
        assert_eq!(view(catalog(), &q("price")).total, 0);
        assert_eq!(view(catalog(), &q("2024")).total, 0);
        assert_eq!(view(catalog(), &q("p45")).total, 1);
    }

    #[test]
    fn test_published_keeps_paging() {
        let q = ListQuery { page: Some(2), active: Some(false), ..Default::default() }.published();
        assert_eq!((q.page(), q.active), (2, Some(true)));
    }

    #[test]
    fn test_limit_is_clamped_and_sort_field_sanitized() {
        let q = ListQuery { limit: Some(1000), sort: Some("name; DROP TABLE".into()), ..Default::default() };
        assert_eq!(q.limit(), MAX_LIMIT);
        assert_eq!(q.sort_field(), DEFAULT_SORT);
    }
}
