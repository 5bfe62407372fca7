use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn(pub String);

impl Isbn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Isbn {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub isbn: Isbn,
    pub title: String,
    pub author: String,
    pub price: Decimal,
    pub stock: i64,
}

/// Column a catalog search matches against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    #[default]
    Title,
    Author,
}

impl SearchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
        }
    }
}

impl FromStr for SearchField {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "author" => Ok(Self::Author),
            other => Err(DomainError::InvalidSearchField(other.to_string())),
        }
    }
}

pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Rejects non-positive restock quantities.
///
/// A negative restock would silently shrink stock through an operation that
/// is only meant to add copies.
pub fn validate_restock_quantity(isbn: &Isbn, qty: i64) -> Result<(), DomainError> {
    if qty <= 0 {
        return Err(DomainError::InvalidQuantity { isbn: isbn.clone(), qty });
    }
    Ok(())
}

/// Stock after adding `qty` copies, refusing to overflow.
pub fn restocked(isbn: &Isbn, stock: i64, qty: i64) -> Result<i64, DomainError> {
    stock
        .checked_add(qty)
        .ok_or_else(|| DomainError::StockOverflow { isbn: isbn.clone(), stock, qty })
}

pub fn validate_price(isbn: &Isbn, price: Decimal) -> Result<(), DomainError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(DomainError::InvalidPrice { isbn: isbn.clone(), price });
    }
    Ok(())
}
