//! Cart and wishlist item lists

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

/// Which list an item lives in. Both share the same merge rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind { Cart, Wishlist }

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self { Self::Cart => "cart", Self::Wishlist => "wishlist" }
    }
}

/// Who a list belongs to. Callers without a session share the `guest` bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Owner {
    User(String),
    Session(String),
    Guest,
}

impl Owner {
    pub fn resolve(user: Option<&str>, session: Option<&str>) -> Self {
        match (user.filter(|u| !u.is_empty()), session.filter(|s| !s.is_empty())) {
            (Some(user), _) => Self::User(user.to_string()),
            (None, Some(session)) => Self::Session(session.to_string()),
            (None, None) => Self::Guest,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Session(id) => write!(f, "session:{id}"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

impl FromStr for Owner {
    type Err = CartError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            _ if s == "guest" => Ok(Self::Guest),
            Some(("user", id)) if !id.is_empty() => Ok(Self::User(id.to_string())),
            Some(("session", id)) if !id.is_empty() => Ok(Self::Session(id.to_string())),
            _ => Err(CartError::InvalidOwner(s.to_string())),
        }
    }
}

impl TryFrom<String> for Owner {
    type Error = CartError;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Owner> for String {
    fn from(owner: Owner) -> Self { owner.to_string() }
}

/// Size/colour selection of a product.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub size: Option<String>,
    pub color: Option<String>,
}

/// Item identity. Lines added locally carry a negative temporary id until the
/// store acknowledges them with its own id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineId {
    Temporary(i64),
    Persisted(String),
}

impl LineId {
    pub fn is_temporary(&self) -> bool { matches!(self, Self::Temporary(_)) }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Temporary(id) => write!(f, "{id}"), Self::Persisted(id) => f.write_str(id) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: LineId,
    pub product_id: String,
    #[serde(flatten)]
    pub variant: Variant,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn matches(&self, product_id: &str, variant: &Variant) -> bool {
        self.product_id == product_id && &self.variant == variant
    }
}

/// Add-to-list request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLine {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[serde(flatten)]
    pub variant: Variant,
    #[validate(length(min = 1))]
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found")]
    ItemNotFound,
    #[error("Quantity must be between 1 and 999")]
    InvalidQuantity,
    #[error("Invalid list owner '{0}'")]
    InvalidOwner(String),
}

/// Items of one cart or wishlist, at most one line per product and variant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemList {
    lines: Vec<CartLine>,
}

impl ItemList {
    pub const MAX_QUANTITY: u32 = 999;

    pub fn new(lines: Vec<CartLine>) -> Self { Self { lines } }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn into_lines(self) -> Vec<CartLine> { self.lines }
    pub fn len(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn get(&self, id: &LineId) -> Option<&CartLine> { self.lines.iter().find(|l| &l.id == id) }

    pub fn find(&self, product_id: &str, variant: &Variant) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.matches(product_id, variant))
    }

    /// Adds `item`, merging into the existing line for the same product and
    /// variant. `id` is only used when a new line is created.
    pub fn add(&mut self, id: LineId, item: NewLine, now: DateTime<Utc>) -> Result<&CartLine, CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        let index = match self.lines.iter().position(|l| l.matches(&item.product_id, &item.variant)) {
            Some(index) => {
                let existing = &mut self.lines[index];
                existing.quantity = existing.quantity.saturating_add(item.quantity).min(Self::MAX_QUANTITY);
                existing.price = item.price;
                existing.updated_at = now;
                index
            }
            None => {
                self.lines.push(CartLine {
                    id, product_id: item.product_id, variant: item.variant, name: item.name, price: item.price,
                    image: item.image, quantity: item.quantity.min(Self::MAX_QUANTITY), created_at: now, updated_at: now,
                });
                self.lines.len() - 1
            }
        };
        Ok(&self.lines[index])
    }

    /// Sets a line's quantity; zero removes the line and returns `None`.
    pub fn set_quantity(&mut self, id: &LineId, quantity: u32, now: DateTime<Utc>) -> Result<Option<&CartLine>, CartError> {
        if quantity > Self::MAX_QUANTITY { return Err(CartError::InvalidQuantity); }
        let index = self.lines.iter().position(|l| &l.id == id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 {
            self.lines.remove(index);
            return Ok(None);
        }
        let line = &mut self.lines[index];
        line.quantity = quantity;
        line.updated_at = now;
        Ok(Some(&*line))
    }

    pub fn remove(&mut self, id: &LineId) -> Result<CartLine, CartError> {
        let index = self.lines.iter().position(|l| &l.id == id).ok_or(CartError::ItemNotFound)?;
        Ok(self.lines.remove(index))
    }

    pub fn clear(&mut self) { self.lines.clear(); }

    /// Replaces the line for `line`'s product and variant with the stored copy,
    /// inserting it if the local line is gone.
    pub fn reconcile(&mut self, line: CartLine) {
        match self.lines.iter_mut().find(|l| l.matches(&line.product_id, &line.variant)) {
            Some(existing) => *existing = line,
            None => self.lines.push(line),
        }
    }
}
