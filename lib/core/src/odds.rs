//! Price vectors and the field-map encoder
//!
//! Incoming odds arrive either with display names (`home`, `over_25`, ...) from a
//! live query or with stored names (`home_odds`, `over_25_odds`, ...) from a
//! record payload. Both shapes are normalized here into [`PriceFields`] and,
//! once every price is valid, into a fixed-length [`PriceVector`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of prices in a vector
pub const PRICE_DIM: usize = 5;

/// Field names in vector order: (display name, stored name)
pub const FIELD_NAMES: [(&str, &str); PRICE_DIM] = [
    ("home", "home_odds"),
    ("draw", "draw_odds"),
    ("away", "away_odds"),
    ("over_25", "over_25_odds"),
    ("under_25", "under_25_odds"),
];

/// A price is usable when it is finite and strictly above 1.0
#[inline]
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 1.0
}

/// Five decimal prices: home, draw, away, over 2.5, under 2.5
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceVector {
    data: [f64; PRICE_DIM],
}

impl PriceVector {
    /// Build a vector, rejecting any price that is not finite and > 1.0
    pub fn new(data: [f64; PRICE_DIM]) -> Result<Self> {
        for (price, (name, _)) in data.iter().zip(FIELD_NAMES.iter()) {
            if !price.is_finite() {
                return Err(Error::Encoding(format!("{} is not a finite number", name)));
            }
            if *price <= 1.0 {
                return Err(Error::Encoding(format!(
                    "{} must be greater than 1.0, got {}",
                    name, price
                )));
            }
        }
        Ok(Self { data })
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn home(&self) -> f64 {
        self.data[0]
    }

    #[inline]
    pub fn draw(&self) -> f64 {
        self.data[1]
    }

    #[inline]
    pub fn away(&self) -> f64 {
        self.data[2]
    }

    #[inline]
    pub fn over_25(&self) -> f64 {
        self.data[3]
    }

    #[inline]
    pub fn under_25(&self) -> f64 {
        self.data[4]
    }

    /// Sum of 1X2 implied probabilities (bookmaker overround included)
    pub fn implied_1x2(&self) -> f64 {
        1.0 / self.home() + 1.0 / self.draw() + 1.0 / self.away()
    }

    /// Sum of over/under implied probabilities
    pub fn implied_totals(&self) -> f64 {
        1.0 / self.over_25() + 1.0 / self.under_25()
    }
}

impl<'de> Deserialize<'de> for PriceVector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            data: [f64; PRICE_DIM],
        }
        let raw = Raw::deserialize(deserializer)?;
        PriceVector::new(raw.data).map_err(serde::de::Error::custom)
    }
}

/// Optional prices of a stored record
///
/// Accepts the stored field names on the wire; the display names are aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceFields {
    #[serde(default, rename = "home_odds", alias = "home", skip_serializing_if = "Option::is_none")]
    pub home: Option<f64>,
    #[serde(default, rename = "draw_odds", alias = "draw", skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
    #[serde(default, rename = "away_odds", alias = "away", skip_serializing_if = "Option::is_none")]
    pub away: Option<f64>,
    #[serde(default, rename = "over_25_odds", alias = "over_25", skip_serializing_if = "Option::is_none")]
    pub over_25: Option<f64>,
    #[serde(default, rename = "under_25_odds", alias = "under_25", skip_serializing_if = "Option::is_none")]
    pub under_25: Option<f64>,
}

impl PriceFields {
    pub fn from_vector(vector: &PriceVector) -> Self {
        Self {
            home: Some(vector.home()),
            draw: Some(vector.draw()),
            away: Some(vector.away()),
            over_25: Some(vector.over_25()),
            under_25: Some(vector.under_25()),
        }
    }

    /// Prices in vector order
    pub fn as_array(&self) -> [Option<f64>; PRICE_DIM] {
        [self.home, self.draw, self.away, self.over_25, self.under_25]
    }

    /// Number of prices that are present and valid
    pub fn valid_count(&self) -> usize {
        self.as_array()
            .iter()
            .filter(|p| p.map(is_valid_price).unwrap_or(false))
            .count()
    }

    /// True when all five prices are present and valid
    pub fn is_complete(&self) -> bool {
        self.valid_count() == PRICE_DIM
    }

    /// Field-level coalesce: present incoming prices replace stored ones,
    /// absent incoming prices leave stored ones untouched.
    pub fn coalesce(&mut self, incoming: &PriceFields) {
        self.home = incoming.home.or(self.home);
        self.draw = incoming.draw.or(self.draw);
        self.away = incoming.away.or(self.away);
        self.over_25 = incoming.over_25.or(self.over_25);
        self.under_25 = incoming.under_25.or(self.under_25);
    }

    /// Encode into a vector, failing on the first missing or invalid price
    pub fn to_vector(&self) -> Result<PriceVector> {
        let mut data = [0.0; PRICE_DIM];
        for (i, price) in self.as_array().into_iter().enumerate() {
            data[i] = price.ok_or_else(|| {
                Error::Encoding(format!("missing field: {}", FIELD_NAMES[i].0))
            })?;
        }
        PriceVector::new(data)
    }
}

/// Normalize a loosely-typed field map into [`PriceFields`]
///
/// The display name takes precedence when both spellings are present. A key
/// holding anything other than a JSON number (or null) is an encoding error.
pub fn fields_from_map(fields: &Map<String, Value>) -> Result<PriceFields> {
    let mut prices = [None; PRICE_DIM];
    for (i, (display, stored)) in FIELD_NAMES.iter().enumerate() {
        let value = match fields.get(*display) {
            Some(Value::Null) | None => fields.get(*stored),
            found => found,
        };
        prices[i] = match value {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(n.as_f64().ok_or_else(|| {
                Error::Encoding(format!("{} is not representable as f64", display))
            })?),
            Some(other) => {
                return Err(Error::Encoding(format!(
                    "{} must be numeric, got {}",
                    display, other
                )))
            }
        };
    }
    Ok(PriceFields {
        home: prices[0],
        draw: prices[1],
        away: prices[2],
        over_25: prices[3],
        under_25: prices[4],
    })
}

/// Encode a field map (display or stored names) into a [`PriceVector`]
pub fn encode(fields: &Map<String, Value>) -> Result<PriceVector> {
    fields_from_map(fields)?.to_vector()
}
