use serde::Serialize;

use crate::models::{ScoreField, ScoreRow};

/// Boxplot summary of one scored field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl FiveNumberSummary {
    pub fn as_array(&self) -> [f64; 5] {
        [self.min, self.q1, self.median, self.q3, self.max]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDistribution {
    pub field: ScoreField,
    pub count: usize,
    pub summary: FiveNumberSummary,
}

/// Nearest-rank summary: quartiles sit at `floor(n * p)` in the sorted
/// values, with no interpolation. Empty input yields all zeros.
pub fn five_number_summary(values: impl IntoIterator<Item = Option<f64>>) -> FiveNumberSummary {
    let mut sorted: Vec<f64> = values.into_iter().flatten().collect();
    if sorted.is_empty() {
        return FiveNumberSummary::default();
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let at = |p: f64| sorted[((n as f64 * p).floor() as usize).min(n - 1)];

    FiveNumberSummary {
        min: sorted[0],
        q1: at(0.25),
        median: at(0.5),
        q3: at(0.75),
        max: sorted[n - 1],
    }
}

/// One summary per scored field, total first, over the same rows.
pub fn distributions(rows: &[ScoreRow]) -> Vec<FieldDistribution> {
    ScoreField::ALL
        .iter()
        .map(|&field| FieldDistribution {
            field,
            count: rows.iter().filter(|row| row.get(field).is_some()).count(),
            summary: five_number_summary(rows.iter().map(|row| row.get(field))),
        })
        .collect()
}
