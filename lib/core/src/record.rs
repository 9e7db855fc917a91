use crate::odds::{is_valid_price, PriceFields, PRICE_DIM};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Implied-probability band a market must fall into to count as consistent
pub const CONSISTENT_MARGIN: (f64, f64) = (0.85, 1.25);

const COMPLETENESS_WEIGHT: f64 = 0.6;
const MARKET_CONSISTENCY_WEIGHT: f64 = 0.15;
const OUTCOME_WEIGHT: f64 = 0.1;

/// Full-time 1X2 result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "H", alias = "home", alias = "Home")]
    Home,
    #[serde(rename = "D", alias = "draw", alias = "Draw")]
    Draw,
    #[serde(rename = "A", alias = "away", alias = "Away")]
    Away,
}

impl Outcome {
    pub fn from_scores(home: u32, away: u32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::Home,
            std::cmp::Ordering::Less => Outcome::Away,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

/// A settled or pending match with its closing prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub id: String,
    #[serde(flatten)]
    pub prices: PriceFields,
    #[serde(default, rename = "result", skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub over_25_result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btts_result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<DateTime<Utc>>,
    /// Derived data-quality score in [0, 1]; recomputed by the store on write
    #[serde(default)]
    pub quality: f64,
    /// Set by the store on write
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    /// Monotonic write counter assigned by the store
    #[serde(default)]
    pub revision: u64,
}

impl HistoricalRecord {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prices: PriceFields::default(),
            outcome: None,
            over_25_result: None,
            btts_result: None,
            home_score: None,
            away_score: None,
            league: None,
            home_team: None,
            away_team: None,
            kickoff: None,
            quality: 0.0,
            last_updated: Utc::now(),
            revision: 0,
        }
    }

    #[must_use]
    pub fn with_prices(mut self, prices: PriceFields) -> Self {
        self.prices = prices;
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_score(mut self, home: u32, away: u32) -> Self {
        self.home_score = Some(home);
        self.away_score = Some(away);
        self
    }

    /// Reject payloads the store must never persist
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation("record id must not be empty".to_string()));
        }
        for price in self.prices.as_array().into_iter().flatten() {
            if !is_valid_price(price) {
                return Err(Error::Validation(format!(
                    "record {}: price {} must be finite and greater than 1.0",
                    self.id, price
                )));
            }
        }
        Ok(())
    }

    /// Fill outcome fields that can be derived from a final score
    pub fn derive_outcomes(&mut self) {
        if let (Some(home), Some(away)) = (self.home_score, self.away_score) {
            self.outcome.get_or_insert(Outcome::from_scores(home, away));
            self.over_25_result.get_or_insert(home.saturating_add(away) > 2);
            self.btts_result.get_or_insert(home > 0 && away > 0);
        }
    }

    /// Coalesce every present incoming field onto this record
    ///
    /// Store-managed fields (`quality`, `last_updated`, `revision`) are left
    /// for the caller to set.
    pub fn merge_from(&mut self, incoming: &HistoricalRecord) {
        self.prices.coalesce(&incoming.prices);
        self.outcome = incoming.outcome.or(self.outcome);
        self.over_25_result = incoming.over_25_result.or(self.over_25_result);
        self.btts_result = incoming.btts_result.or(self.btts_result);
        self.home_score = incoming.home_score.or(self.home_score);
        self.away_score = incoming.away_score.or(self.away_score);
        self.kickoff = incoming.kickoff.or(self.kickoff);
        if incoming.league.is_some() {
            self.league = incoming.league.clone();
        }
        if incoming.home_team.is_some() {
            self.home_team = incoming.home_team.clone();
        }
        if incoming.away_team.is_some() {
            self.away_team = incoming.away_team.clone();
        }
    }

    /// True when all five prices are present, valid, and quality clears the bar
    pub fn is_complete(&self, min_quality: f64) -> bool {
        self.prices.is_complete() && self.quality >= min_quality
    }

    /// Completeness and consistency heuristic in [0, 1]
    pub fn compute_quality(&self) -> f64 {
        let p = &self.prices;
        let completeness = p.valid_count() as f64 / PRICE_DIM as f64;

        let mut score = COMPLETENESS_WEIGHT * completeness;
        if market_consistent(&[p.home, p.draw, p.away]) {
            score += MARKET_CONSISTENCY_WEIGHT;
        }
        if market_consistent(&[p.over_25, p.under_25]) {
            score += MARKET_CONSISTENCY_WEIGHT;
        }
        if self.outcome.is_some() {
            score += OUTCOME_WEIGHT;
        }
        score.clamp(0.0, 1.0)
    }
}

/// All prices present and valid, implied probabilities within the band
fn market_consistent(prices: &[Option<f64>]) -> bool {
    let mut implied = 0.0;
    for price in prices {
        match price {
            Some(p) if is_valid_price(*p) => implied += 1.0 / p,
            _ => return false,
        }
    }
    implied >= CONSISTENT_MARGIN.0 && implied <= CONSISTENT_MARGIN.1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_prices() -> PriceFields {
        PriceFields {
            home: Some(2.10),
            draw: Some(3.40),
            away: Some(3.20),
            over_25: Some(1.85),
            under_25: Some(1.95),
        }
    }

    #[test]
    fn test_quality_complete_settled() {
        let record = HistoricalRecord::new("1")
            .with_prices(full_prices())
            .with_outcome(Outcome::Home);
        assert!((record.compute_quality() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_partial_credit() {
        let mut prices = full_prices();
        prices.under_25 = None;
        let record = HistoricalRecord::new("1")
            .with_prices(prices)
            .with_outcome(Outcome::Home);
        let quality = record.compute_quality();
        assert!(quality > 0.5 && quality < 1.0, "quality was {}", quality);
    }

    #[test]
    fn test_quality_inconsistent_market() {
        let mut prices = full_prices();
        // 1/1.1 + 1/1.2 + 1/1.3 is far above the band
        prices.home = Some(1.1);
        prices.draw = Some(1.2);
        prices.away = Some(1.3);
        let record = HistoricalRecord::new("1").with_prices(prices);
        assert!((record.compute_quality() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_quality_empty_record() {
        assert_eq!(HistoricalRecord::new("1").compute_quality(), 0.0);
    }

    #[test]
    fn test_derive_outcomes_from_score() {
        let mut record = HistoricalRecord::new("1").with_score(2, 1);
        record.derive_outcomes();
        assert_eq!(record.outcome, Some(Outcome::Home));
        assert_eq!(record.over_25_result, Some(true));
        assert_eq!(record.btts_result, Some(true));

        let mut goalless = HistoricalRecord::new("2").with_score(0, 0);
        goalless.derive_outcomes();
        assert_eq!(goalless.outcome, Some(Outcome::Draw));
        assert_eq!(goalless.over_25_result, Some(false));
        assert_eq!(goalless.btts_result, Some(false));
    }

    #[test]
    fn test_derive_outcomes_huge_score() {
        let mut record = HistoricalRecord::new("1").with_score(u32::MAX, 1);
        record.derive_outcomes();
        assert_eq!(record.outcome, Some(Outcome::Home));
        assert_eq!(record.over_25_result, Some(true));
        assert_eq!(record.btts_result, Some(true));
    }

    #[test]
    fn test_derive_keeps_explicit_outcome() {
        let mut record = HistoricalRecord::new("1")
            .with_score(1, 0)
            .with_outcome(Outcome::Away);
        record.derive_outcomes();
        assert_eq!(record.outcome, Some(Outcome::Away));
    }

    #[test]
    fn test_validate() {
        assert!(HistoricalRecord::new(" ").validate().is_err());
        let mut prices = full_prices();
        prices.draw = Some(0.9);
        assert!(HistoricalRecord::new("1").with_prices(prices).validate().is_err());
        assert!(HistoricalRecord::new("1").with_prices(full_prices()).validate().is_ok());
    }

    #[test]
    fn test_record_wire_format() {
        let record: HistoricalRecord = serde_json::from_value(serde_json::json!({
            "id": "42",
            "home_odds": 2.1,
            "draw_odds": 3.4,
            "result": "H",
            "btts_result": true
        }))
        .unwrap();
        assert_eq!(record.prices.home, Some(2.1));
        assert_eq!(record.prices.under_25, None);
        assert_eq!(record.outcome, Some(Outcome::Home));
        assert_eq!(record.btts_result, Some(true));
    }
}
