//! Result shapes of the ranking primitive
//!
//! Display endpoints get a [`DisplayView`] that always holds exactly `top_n`
//! rows, padded with [`PaddingRow`]s. Aggregating endpoints get the raw
//! [`FullView`].

use serde::Serialize;

use crate::schema::TransactionRecord;

/// Blend weights of the ranking score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Weight of the cosine similarity
    pub vector: f32,
    /// Weight of the normalized edit ratio
    pub lexical: f32,
}

impl ScoreWeights {
    pub fn blend(&self, cosine_sim: f32, edit_ratio: f32) -> f32 {
        self.vector * cosine_sim + self.lexical * edit_ratio
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            vector: 0.9,
            lexical: 0.1,
        }
    }
}

/// A transaction with the scores computed for one query
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMatch {
    #[serde(flatten)]
    pub record: TransactionRecord,
    #[serde(rename = "Similarity Score")]
    pub similarity_score: f32,
    pub cosine_sim: f32,
    pub edit_ratio: f32,
}

/// Synthetic row used to fill a display view up to `top_n`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaddingRow {
    #[serde(rename = "Product Description")]
    pub product_description: String,
    #[serde(rename = "Supplier Name")]
    pub supplier_name: String,
    #[serde(rename = "Unit Price")]
    pub unit_price: Option<f64>,
    #[serde(rename = "Similarity Score")]
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DisplayRow {
    Hit(ScoredMatch),
    Padding(PaddingRow),
}

impl DisplayRow {
    pub fn is_padding(&self) -> bool {
        matches!(self, DisplayRow::Padding(_))
    }

    pub fn as_hit(&self) -> Option<&ScoredMatch> {
        match self {
            DisplayRow::Hit(hit) => Some(hit),
            DisplayRow::Padding(_) => None,
        }
    }

    pub fn similarity_score(&self) -> f32 {
        match self {
            DisplayRow::Hit(hit) => hit.similarity_score,
            DisplayRow::Padding(pad) => pad.similarity_score,
        }
    }

    pub fn product_description(&self) -> &str {
        match self {
            DisplayRow::Hit(hit) => &hit.record.product_description,
            DisplayRow::Padding(pad) => &pad.product_description,
        }
    }

    pub fn supplier_name(&self) -> &str {
        match self {
            DisplayRow::Hit(hit) => &hit.record.supplier_name,
            DisplayRow::Padding(pad) => &pad.supplier_name,
        }
    }

    pub fn unit_price(&self) -> Option<f64> {
        match self {
            DisplayRow::Hit(hit) => hit.record.unit_price,
            DisplayRow::Padding(pad) => pad.unit_price,
        }
    }
}

/// Fixed-shape ranked rows for display
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DisplayView {
    rows: Vec<DisplayRow>,
}

impl DisplayView {
    /// Keep the first `top_n` matches and pad to exactly `top_n` rows
    pub fn padded(mut matches: Vec<ScoredMatch>, top_n: usize) -> Self {
        matches.truncate(top_n);
        let mut rows: Vec<DisplayRow> = matches.into_iter().map(DisplayRow::Hit).collect();
        rows.resize_with(top_n, || DisplayRow::Padding(PaddingRow::default()));
        Self { rows }
    }

    /// A view with no rows at all (no genuine match to build on)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    /// Genuine (non-padding) rows
    pub fn hits(&self) -> impl Iterator<Item = &ScoredMatch> {
        self.rows.iter().filter_map(DisplayRow::as_hit)
    }

    pub fn first_hit(&self) -> Option<&ScoredMatch> {
        self.rows.first().and_then(DisplayRow::as_hit)
    }
}

/// Unpadded ranked rows for aggregation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FullView {
    matches: Vec<ScoredMatch>,
}

impl FullView {
    pub fn new(mut matches: Vec<ScoredMatch>, limit: usize) -> Self {
        matches.truncate(limit);
        Self { matches }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn matches(&self) -> &[ScoredMatch] {
        &self.matches
    }
}

/// Stable descending sort on score; equal scores keep row order
pub(crate) fn sort_by_score<T>(items: &mut [T], score: impl Fn(&T) -> f32) {
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
}
