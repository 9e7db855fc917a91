//! Outcome aggregation over a match set
//!
//! Similarity statistics cover every match. Outcome distributions cover only
//! the matches whose record carries a known outcome; `coverage` reports how
//! large that subset is relative to the whole set, so the two denominators
//! are never silently mixed.

use crate::distance::median;
use oddsim_core::{MatchResult, Outcome, PriceVector};
use serde::Serialize;

/// Known-outcome count at which the sample-depth half of confidence saturates
pub const CONFIDENCE_SAMPLE_SATURATION: f64 = 20.0;

/// Count and share of one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryShare {
    pub count: usize,
    pub percentage: f64,
}

impl CategoryShare {
    fn of(count: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        };
        Self { count, percentage }
    }
}

/// Similarity score distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimilarityStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
}

impl SimilarityStats {
    /// `None` for an empty slice
    pub fn compute(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let mut sorted = scores.to_vec();
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        let median = median(&mut sorted);

        Some(Self {
            mean,
            median,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            std_dev: variance.sqrt(),
            p25: percentile(&sorted, 25.0),
            p75: percentile(&sorted, 75.0),
            p90: percentile(&sorted, 90.0),
        })
    }
}

/// Linear interpolation between closest ranks; `sorted` must be ascending
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// 1X2 results over the known-outcome subset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OutcomeDistribution {
    pub known: usize,
    pub home: CategoryShare,
    pub draw: CategoryShare,
    pub away: CategoryShare,
}

/// A yes/no market (over 2.5 goals, both teams scored)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BinaryDistribution {
    pub known: usize,
    pub yes: CategoryShare,
    pub no: CategoryShare,
}

impl BinaryDistribution {
    fn from_flags(flags: &[bool]) -> Option<Self> {
        if flags.is_empty() {
            return None;
        }
        let yes = flags.iter().filter(|f| **f).count();
        Some(Self {
            known: flags.len(),
            yes: CategoryShare::of(yes, flags.len()),
            no: CategoryShare::of(flags.len() - yes, flags.len()),
        })
    }
}

/// Summary of a match set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateAnalysis {
    pub no_data: bool,
    pub total_matches: usize,
    pub similarity: Option<SimilarityStats>,
    pub outcomes: Option<OutcomeDistribution>,
    pub over_25: Option<BinaryDistribution>,
    pub btts: Option<BinaryDistribution>,
    /// Known-outcome matches / total matches
    pub coverage: f64,
    /// 0..=100
    pub confidence: f64,
}

impl AggregateAnalysis {
    fn empty() -> Self {
        Self {
            no_data: true,
            ..Default::default()
        }
    }

    pub fn known_outcomes(&self) -> usize {
        self.outcomes.map(|o| o.known).unwrap_or(0)
    }
}

/// Summarize a match list; never fails
pub fn analyze(results: &[MatchResult]) -> AggregateAnalysis {
    if results.is_empty() {
        return AggregateAnalysis::empty();
    }

    let scores: Vec<f64> = results.iter().map(|m| m.similarity).collect();
    let similarity = SimilarityStats::compute(&scores);
    let avg_similarity = similarity.map(|s| s.mean).unwrap_or(0.0);

    let settled: Vec<&MatchResult> = results
        .iter()
        .filter(|m| m.record.outcome.is_some())
        .collect();
    let known = settled.len();

    let outcomes = if known > 0 {
        let count = |o: Outcome| settled.iter().filter(|m| m.record.outcome == Some(o)).count();
        Some(OutcomeDistribution {
            known,
            home: CategoryShare::of(count(Outcome::Home), known),
            draw: CategoryShare::of(count(Outcome::Draw), known),
            away: CategoryShare::of(count(Outcome::Away), known),
        })
    } else {
        None
    };

    let over: Vec<bool> = settled.iter().filter_map(|m| m.record.over_25_result).collect();
    let btts: Vec<bool> = settled.iter().filter_map(|m| m.record.btts_result).collect();

    AggregateAnalysis {
        no_data: false,
        total_matches: results.len(),
        similarity,
        outcomes,
        over_25: BinaryDistribution::from_flags(&over),
        btts: BinaryDistribution::from_flags(&btts),
        coverage: known as f64 / results.len() as f64,
        confidence: confidence_score(known, avg_similarity),
    }
}

/// `min(100, known / 20 * 50 + avg_similarity * 50)`
pub fn confidence_score(known_outcomes: usize, avg_similarity: f64) -> f64 {
    let depth = known_outcomes as f64 / CONFIDENCE_SAMPLE_SATURATION * 50.0;
    (depth + avg_similarity * 50.0).min(100.0)
}

/// Where forecast percentages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    Historical,
    ImpliedOdds,
}

/// Percentages for the next match priced like the target
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Forecast {
    pub source: ForecastSource,
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    pub over_25: f64,
    pub under_25: f64,
    pub confidence: f64,
}

impl Forecast {
    /// Historical shares when outcomes are known, otherwise the target's
    /// margin-free implied probabilities
    pub fn build(analysis: &AggregateAnalysis, target: &PriceVector) -> Self {
        let (ou_over, ou_under) = implied_totals(target);
        let (over_25, under_25) = match analysis.over_25 {
            Some(d) => (d.yes.percentage, d.no.percentage),
            None => (ou_over, ou_under),
        };

        match analysis.outcomes {
            Some(o) => Self {
                source: ForecastSource::Historical,
                home: o.home.percentage,
                draw: o.draw.percentage,
                away: o.away.percentage,
                over_25,
                under_25,
                confidence: analysis.confidence,
            },
            None => {
                let total = target.implied_1x2();
                Self {
                    source: ForecastSource::ImpliedOdds,
                    home: 100.0 / target.home() / total,
                    draw: 100.0 / target.draw() / total,
                    away: 100.0 / target.away() / total,
                    over_25,
                    under_25,
                    confidence: analysis.confidence,
                }
            }
        }
    }
}

fn implied_totals(target: &PriceVector) -> (f64, f64) {
    let total = target.implied_totals();
    (
        100.0 / target.over_25() / total,
        100.0 / target.under_25() / total,
    )
}
