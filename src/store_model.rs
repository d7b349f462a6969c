//! Data model for the persisted commerce state.
//!
//! Everything in here is plain data: the [`StoreSnapshot`] that gets written to
//! local storage on every mutation, its [`CartLineItem`]s, the [`Price`] type the
//! cart does arithmetic with, and the derived [`CartTotals`].
//!
//! Deserialization is forgiving about numbers. Snapshots written by
//! older front-ends carry prices as strings (`"9.99"`) and sometimes lose the
//! quantity field entirely, so prices and quantities accept numbers or numeric
//! strings and fall back to zero on anything else. A zero quantity is not a valid
//! line item, and [`StoreSnapshot::normalized`] drops those lines.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Opaque catalog identifier of a book.
pub type BookId = String;

/// A non-negative amount of money with two decimal places, held as cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(u64);

impl Price {
    pub const ZERO: Price = Price(0);

    pub fn from_cents(cents: u64) -> Self {
        Price(cents)
    }

    /// Builds a price from a decimal amount, rounding to the nearest cent.
    ///
    /// Negative, NaN and infinite inputs become zero.
    pub fn from_decimal(amount: f64) -> Self {
        if !amount.is_finite() || amount <= 0.0 {
            return Price::ZERO;
        }
        Price((amount * 100.0).round() as u64)
    }

    /// Parses `"9.99"`-style text. Unparsable text becomes zero.
    pub fn parse_lenient(text: &str) -> Self {
        text.trim()
            .parse::<f64>()
            .map(Price::from_decimal)
            .unwrap_or(Price::ZERO)
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn times(&self, quantity: u32) -> Price {
        Price(self.0.saturating_mul(u64::from(quantity)))
    }

    pub fn saturating_add(self, other: Price) -> Price {
        Price(self.0.saturating_add(other.0))
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        Ok(match raw {
            JsonValue::Number(n) => n.as_f64().map(Price::from_decimal).unwrap_or(Price::ZERO),
            JsonValue::String(s) => Price::parse_lenient(&s),
            _ => Price::ZERO,
        })
    }
}

fn lenient_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = JsonValue::deserialize(deserializer)?;
    let quantity = match raw {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite() && *v > 0.0).map(|v| v as u64)),
        JsonValue::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(quantity.map(|q| q.min(u64::from(u32::MAX)) as u32).unwrap_or(0))
}

/// What a surface hands to the store when the visitor clicks "add to cart".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(default)]
    pub id: BookId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "price", default)]
    pub unit_price: Price,
    #[serde(default)]
    pub image: String,
}

impl CartItem {
    pub fn new(
        id: impl Into<BookId>,
        title: impl Into<String>,
        unit_price: Price,
        image: impl Into<String>,
    ) -> Self {
        CartItem {
            id: id.into(),
            title: title.into(),
            unit_price,
            image: image.into(),
        }
    }
}

/// One cart entry. There is at most one per identifier and its quantity is
/// never below one while it sits in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    #[serde(default)]
    pub id: BookId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "price", default)]
    pub unit_price: Price,
    #[serde(default)]
    pub image: String,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

impl CartLineItem {
    pub fn from_item(item: CartItem) -> Self {
        CartLineItem {
            id: item.id,
            title: item.title,
            unit_price: item.unit_price,
            image: item.image,
            quantity: 1,
        }
    }

    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Complete persisted state: the unit written to storage on every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default, alias = "wishlist")]
    pub favorites: Vec<BookId>,
    #[serde(default)]
    pub saved: Vec<BookId>,
    #[serde(default)]
    pub cart: Vec<CartLineItem>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty() && self.saved.is_empty() && self.cart.is_empty()
    }

    /// Restores the invariants a snapshot read from storage may have lost:
    /// no empty or duplicate identifiers, one line per identifier (quantities
    /// merged), no line with a zero quantity.
    pub fn normalized(self) -> Self {
        let favorites = dedup_ids(self.favorites);
        let saved = dedup_ids(self.saved);

        let mut cart: Vec<CartLineItem> = Vec::with_capacity(self.cart.len());
        for line in self.cart {
            if line.id.is_empty() || line.quantity == 0 {
                continue;
            }
            match cart.iter_mut().find(|existing| existing.id == line.id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => cart.push(line),
            }
        }

        StoreSnapshot { favorites, saved, cart }
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals::from_lines(&self.cart)
    }
}

fn dedup_ids(ids: Vec<BookId>) -> Vec<BookId> {
    let mut unique: Vec<BookId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !id.is_empty() && !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

/// Derived cart summary. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartTotals {
    pub item_count: u64,
    pub total_price: Price,
    /// `total_price` rendered with two decimals, ready for display.
    pub total_display: String,
}

impl CartTotals {
    pub fn from_lines(lines: &[CartLineItem]) -> Self {
        let item_count = lines.iter().map(|line| u64::from(line.quantity)).sum();
        let total_price = lines
            .iter()
            .fold(Price::ZERO, |acc, line| acc.saturating_add(line.line_total()));

        CartTotals {
            item_count,
            total_price,
            total_display: total_price.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_display_keeps_two_decimals() {
        assert_eq!(Price::from_cents(999).to_string(), "9.99");
        assert_eq!(Price::from_cents(1005).to_string(), "10.05");
        assert_eq!(Price::ZERO.to_string(), "0.00");
    }

    #[test]
    fn price_accepts_strings_and_numbers() {
        let from_string: Price = serde_json::from_str("\"12.99\"").unwrap();
        let from_number: Price = serde_json::from_str("12.99").unwrap();
        let garbage: Price = serde_json::from_str("\"abc\"").unwrap();
        let null: Price = serde_json::from_str("null").unwrap();

        assert_eq!(from_string, Price::from_cents(1299));
        assert_eq!(from_number, Price::from_cents(1299));
        assert_eq!(garbage, Price::ZERO);
        assert_eq!(null, Price::ZERO);
    }

    #[test]
    fn line_missing_quantity_is_dropped_on_normalize() {
        let snapshot: StoreSnapshot = serde_json::from_str(
            r#"{"cart":[{"id":"a","title":"A","price":"5.99"},{"id":"b","price":1,"quantity":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.cart[0].quantity, 0);
        assert!(snapshot.normalized().cart.is_empty());
    }
}
