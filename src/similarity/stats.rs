//! Aggregates over a ranked view: price distribution and group summaries

use serde::Serialize;
use std::collections::BTreeMap;

use super::ranking::ScoredMatch;

/// Distribution of numeric unit prices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub count: usize,
    pub min: f64,
    #[serde(rename = "25%")]
    pub p25: f64,
    pub median: f64,
    #[serde(rename = "75%")]
    pub p75: f64,
    pub max: f64,
    pub mean: f64,
}

impl PriceStats {
    /// Statistics of the finite values, or `None` when there are none
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;

        Some(Self {
            count,
            min: sorted[0],
            p25: percentile(&sorted, 0.25),
            median: percentile(&sorted, 0.5),
            p75: percentile(&sorted, 0.75),
            max: sorted[count - 1],
            mean,
        })
    }
}

/// Linear-interpolated percentile of ascending `sorted`; `p` in [0, 1]
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let position = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Order count and mean unit price of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub order_count: usize,
    /// `None` when no order of the group has a numeric price
    pub mean_unit_price: Option<f64>,
}

/// Group matches by `key`, dropping rows without one. Groups are ordered by
/// key.
pub fn summarize_by<F>(matches: &[ScoredMatch], key: F) -> Vec<GroupSummary>
where
    F: Fn(&ScoredMatch) -> Option<String>,
{
    let mut groups: BTreeMap<String, (usize, f64, usize)> = BTreeMap::new();

    for m in matches {
        let Some(group) = key(m).filter(|k| !k.is_empty()) else {
            continue;
        };
        let entry = groups.entry(group).or_insert((0, 0.0, 0));
        entry.0 += 1;
        if let Some(price) = m.record.unit_price.filter(|p| p.is_finite()) {
            entry.1 += price;
            entry.2 += 1;
        }
    }

    groups
        .into_iter()
        .map(|(group, (order_count, sum, priced))| GroupSummary {
            group,
            order_count,
            mean_unit_price: (priced > 0).then(|| sum / priced as f64),
        })
        .collect()
}
