//! Postgres stores

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{CartLine, LineId, ListKind, NewLine, Owner, Variant};
use crate::listing::{ListQuery, Page, SEARCH_FIELDS};
use crate::store::{CartStore, DocumentStore, FieldEq, Write};
use crate::{CommerceError, Result};

#[derive(Clone)]
pub struct PgDocumentStore {
    db: PgPool,
}

impl PgDocumentStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

const FILTER: &str = "kind = $1 AND ($2::BOOLEAN IS NULL OR (body->>'isActive')::BOOLEAN = $2) \
                      AND ($3::TEXT IS NULL OR EXISTS (SELECT 1 FROM jsonb_each_text(body) AS f \
                          WHERE f.key = ANY($6::TEXT[]) AND jsonb_typeof(body->f.key) = 'string' AND f.value ILIKE $3 ESCAPE '\\')) \
                      AND ($4::TEXT IS NULL OR body->>($5::TEXT) = $4)";

fn search_fields() -> Vec<String> { SEARCH_FIELDS.iter().map(|f| f.to_string()).collect() }

fn insert_conflict<'a>(kind: &'static str, id: &'a str) -> impl FnOnce(sqlx::Error) -> CommerceError + 'a {
    move |e| match CommerceError::from(e) {
        CommerceError::Conflict(_) => CommerceError::Conflict(format!("{kind} '{id}'")),
        other => other,
    }
}

fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn list(&self, kind: &'static str, query: &ListQuery, filter: Option<FieldEq<'_>>) -> Result<Page<Value>> {
        let pattern = query.search_term().map(|t| like_pattern(&t));
        // sort_field() only yields plain identifiers, so it is safe to inline.
        let field = query.sort_field();
        let dir = query.order().as_sql();
        let sql = format!(
            "SELECT body FROM documents WHERE {FILTER} \
             ORDER BY CASE WHEN jsonb_typeof(body->'{field}') = 'number' THEN (body->>'{field}')::NUMERIC END {dir} NULLS LAST, \
             LOWER(body->>'{field}') {dir} NULLS LAST, id \
             LIMIT $7 OFFSET $8"
        );
        let fields = search_fields();
        let data = sqlx::query_scalar::<_, Value>(&sql)
            .bind(kind).bind(query.active).bind(&pattern)
            .bind(filter.map(|f| f.value)).bind(filter.map_or("", |f| f.field)).bind(&fields)
            .bind(i64::from(query.limit())).bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.db).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM documents WHERE {FILTER}"))
            .bind(kind).bind(query.active).bind(&pattern)
            .bind(filter.map(|f| f.value)).bind(filter.map_or("", |f| f.field)).bind(&fields)
            .fetch_one(&self.db).await?;
        Ok(Page::new(data, u64::try_from(total.0).unwrap_or_default(), query))
    }

    async fn all(&self, kind: &'static str) -> Result<Vec<Value>> {
        Ok(sqlx::query_scalar::<_, Value>("SELECT body FROM documents WHERE kind = $1 ORDER BY created_at")
            .bind(kind).fetch_all(&self.db).await?)
    }

    async fn get(&self, kind: &'static str, id: &str) -> Result<Option<Value>> {
        Ok(sqlx::query_scalar::<_, Value>("SELECT body FROM documents WHERE kind = $1 AND id = $2")
            .bind(kind).bind(id).fetch_optional(&self.db).await?)
    }

    async fn insert(&self, kind: &'static str, id: &str, body: Value) -> Result<()> {
        sqlx::query("INSERT INTO documents (kind, id, body, created_at, updated_at) VALUES ($1, $2, $3, NOW(), NOW())")
            .bind(kind).bind(id).bind(&body)
            .execute(&self.db).await
            .map_err(insert_conflict(kind, id))?;
        Ok(())
    }

    async fn update(&self, kind: &'static str, id: &str, body: Value) -> Result<bool> {
        let done = sqlx::query("UPDATE documents SET body = $3, updated_at = NOW() WHERE kind = $1 AND id = $2")
            .bind(kind).bind(id).bind(&body)
            .execute(&self.db).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete(&self, kind: &'static str, id: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM documents WHERE kind = $1 AND id = $2")
            .bind(kind).bind(id).execute(&self.db).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for write in writes {
            match write {
                Write::Insert { kind, id, body } => {
                    sqlx::query("INSERT INTO documents (kind, id, body, created_at, updated_at) VALUES ($1, $2, $3, NOW(), NOW())")
                        .bind(kind).bind(&id).bind(&body)
                        .execute(&mut *tx).await
                        .map_err(insert_conflict(kind, &id))?;
                }
                Write::Replace { kind, id, expected, body } => {
                    // A concurrent writer holds the row lock until it commits; the
                    // comparison then runs against its version and matches nothing.
                    let done = sqlx::query("UPDATE documents SET body = $3, updated_at = NOW() WHERE kind = $1 AND id = $2 AND body = $4")
                        .bind(kind).bind(&id).bind(&body).bind(&expected)
                        .execute(&mut *tx).await?;
                    if done.rows_affected() == 0 {
                        return Err(CommerceError::Stale(kind));
                    }
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    product_id: String,
    size: String,
    color: String,
    name: String,
    price: Decimal,
    image: Option<String>,
    quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for CartLine {
    fn from(row: CartRow) -> Self {
        let non_empty = |s: String| (!s.is_empty()).then_some(s);
        Self {
            id: LineId::Persisted(row.id.to_string()), product_id: row.product_id,
            variant: Variant { size: non_empty(row.size), color: non_empty(row.color) },
            name: row.name, price: row.price, image: row.image,
            quantity: u32::try_from(row.quantity).unwrap_or_default(),
            created_at: row.created_at, updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str = "id, product_id, size, color, name, price, image, quantity, created_at, updated_at";

/// `cart_items` rows keyed by list, owner, product and variant. Every write
/// pushes the whole list's `expires_at` forward by the TTL.
#[derive(Clone)]
pub struct PgCartStore {
    db: PgPool,
    ttl: Duration,
}

impl PgCartStore {
    pub fn new(db: PgPool, ttl: Duration) -> Self { Self { db, ttl } }

    /// Deletes the owner's lines once the list has lapsed, so later writes start a fresh list.
    async fn drop_expired(&self, list: ListKind, owner: &Owner) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE list_kind = $1 AND owner = $2 AND expires_at <= NOW()")
            .bind(list.as_str()).bind(owner.to_string())
            .execute(&self.db).await?;
        Ok(())
    }

    async fn touch(&self, list: ListKind, owner: &Owner) -> Result<()> {
        sqlx::query("UPDATE cart_items SET expires_at = $3 WHERE list_kind = $1 AND owner = $2")
            .bind(list.as_str()).bind(owner.to_string()).bind(Utc::now() + self.ttl)
            .execute(&self.db).await?;
        Ok(())
    }
}

fn parse_line_id(id: &str) -> Result<Uuid> { Uuid::parse_str(id).map_err(|_| CommerceError::NotFound("cart item")) }

#[async_trait]
impl CartStore for PgCartStore {
    async fn lines(&self, list: ListKind, owner: &Owner) -> Result<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {COLUMNS} FROM cart_items WHERE list_kind = $1 AND owner = $2 AND expires_at > NOW() ORDER BY created_at"
        ))
        .bind(list.as_str()).bind(owner.to_string())
        .fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(CartLine::from).collect())
    }

    async fn add(&self, list: ListKind, owner: &Owner, line: NewLine) -> Result<CartLine> {
        self.drop_expired(list, owner).await?;
        let quantity = i32::try_from(line.quantity.min(999)).unwrap_or(999);
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "INSERT INTO cart_items (id, list_kind, owner, product_id, size, color, name, price, image, quantity, created_at, updated_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW(), $11) \
             ON CONFLICT (list_kind, owner, product_id, size, color) DO UPDATE \
             SET quantity = CASE WHEN cart_items.expires_at <= NOW() THEN EXCLUDED.quantity \
                            ELSE LEAST(cart_items.quantity + EXCLUDED.quantity, 999) END, \
                 price = EXCLUDED.price, updated_at = NOW() \
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7()).bind(list.as_str()).bind(owner.to_string()).bind(&line.product_id)
        .bind(line.variant.size.unwrap_or_default()).bind(line.variant.color.unwrap_or_default())
        .bind(&line.name).bind(line.price).bind(&line.image).bind(quantity).bind(Utc::now() + self.ttl)
        .fetch_one(&self.db).await?;
        self.touch(list, owner).await?;
        Ok(row.into())
    }

    async fn set_quantity(&self, list: ListKind, owner: &Owner, id: &str, quantity: u32) -> Result<Option<CartLine>> {
        let id = parse_line_id(id)?;
        self.drop_expired(list, owner).await?;
        if quantity == 0 {
            return if self.remove_row(list, owner, id).await? { Ok(None) } else { Err(CommerceError::NotFound("cart item")) };
        }
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "UPDATE cart_items SET quantity = $4, updated_at = NOW() WHERE list_kind = $1 AND owner = $2 AND id = $3 RETURNING {COLUMNS}"
        ))
        .bind(list.as_str()).bind(owner.to_string()).bind(id).bind(i32::try_from(quantity).unwrap_or(999))
        .fetch_optional(&self.db).await?
        .ok_or(CommerceError::NotFound("cart item"))?;
        self.touch(list, owner).await?;
        Ok(Some(row.into()))
    }

    async fn remove(&self, list: ListKind, owner: &Owner, id: &str) -> Result<bool> {
        match Uuid::parse_str(id) {
            Ok(id) => {
                self.drop_expired(list, owner).await?;
                self.remove_row(list, owner, id).await
            }
            Err(_) => Ok(false),
        }
    }

    async fn clear(&self, list: ListKind, owner: &Owner) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE list_kind = $1 AND owner = $2")
            .bind(list.as_str()).bind(owner.to_string()).execute(&self.db).await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM cart_items WHERE expires_at <= $1").bind(now).execute(&self.db).await?;
        Ok(done.rows_affected())
    }
}

impl PgCartStore {
    async fn remove_row(&self, list: ListKind, owner: &Owner, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM cart_items WHERE list_kind = $1 AND owner = $2 AND id = $3")
            .bind(list.as_str()).bind(owner.to_string()).bind(id).execute(&self.db).await?;
        if done.rows_affected() > 0 { self.touch(list, owner).await?; }
        Ok(done.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("marble"), "%marble%");
    }

    #[test]
    fn test_row_without_variant() {
        let now = Utc::now();
        let id = Uuid::now_v7();
        let row = CartRow {
            id, product_id: "P1".into(), size: String::new(), color: "Ivory".into(), name: "Tile".into(),
            price: Decimal::from(45), image: None, quantity: 3, created_at: now, updated_at: now,
        };
        let line = CartLine::from(row);
        assert_eq!(line.id, LineId::Persisted(id.to_string()));
        assert_eq!(line.variant, Variant { size: None, color: Some("Ivory".into()) });
        assert_eq!(line.quantity, 3);
    }
}
