use tracing::debug;

use crate::classifier::PassRateBand;
use crate::error::{FitnessError, Result};
use crate::filter::{RecordFilter, Scope};
use crate::models::{
    CollegeAverage, CollegeTally, ComparisonReport, ComparisonSide, DetailReport, DetailStats,
    FieldDelta, Gender, OverviewReport, ScoreField, ScoreRow, TrendReport, YearAverages,
    YearTally,
};
use crate::stats::{self, GroupKey};
use crate::store::RecordStore;

/// Computes dashboard reports from a record store. Holds no state of its
/// own; each report comes from a fresh scan.
pub struct ReportEngine<S> {
    store: S,
}

impl<S: RecordStore> ReportEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn overview(&self, year: i32, gender: Option<Gender>) -> Result<OverviewReport> {
        let filter = RecordFilter::year(year).with_gender(gender);
        let records = self.store.scan(&filter).await?;
        debug!(year, ?gender, records = records.len(), "computing overview");

        let college_stats = stats::tally_by(&records, GroupKey::College)
            .into_iter()
            .map(|(college, tally)| CollegeTally { college, tally })
            .collect();

        Ok(OverviewReport {
            year,
            gender,
            total_stats: stats::tally_total(&records),
            college_stats,
            items_stats: stats::tally_items(&records),
            avg_scores: stats::item_averages(&records),
        })
    }

    pub async fn detail(
        &self,
        year: i32,
        gender: Option<Gender>,
        scope: Scope,
    ) -> Result<DetailReport> {
        let filter = RecordFilter::year(year)
            .with_gender(gender)
            .with_scope(&scope);
        let records = self.store.scan(&filter).await?;
        debug!(year, ?gender, %scope, records = records.len(), "computing detail");

        let tally = stats::tally_total(&records);
        let avg_scores = stats::score_averages(&records);

        Ok(DetailReport {
            year,
            gender,
            scope,
            stats: DetailStats {
                total: tally.total,
                passed: tally.passed,
                avg_score: avg_scores.total_avg,
            },
            scores: records.iter().map(ScoreRow::from_record).collect(),
            avg_scores,
        })
    }

    /// Per-year series over `[start_year, end_year]`. Years without
    /// matching records are left out rather than zero-filled.
    pub async fn trend(
        &self,
        start_year: i32,
        end_year: i32,
        gender: Option<Gender>,
        scope: Scope,
    ) -> Result<TrendReport> {
        let filter = RecordFilter::year_range(start_year, end_year)?
            .with_gender(gender)
            .with_scope(&scope);
        let records = self.store.scan(&filter).await?;
        debug!(start_year, end_year, ?gender, %scope, records = records.len(), "computing trend");

        let by_year = stats::partition_by_year(&records);
        let pass_rate_by_year = by_year
            .iter()
            .map(|(&year, records)| YearTally {
                year,
                tally: stats::tally_total(records),
            })
            .collect();
        let avg_scores_by_year = by_year
            .iter()
            .map(|(&year, records)| YearAverages {
                year,
                averages: stats::score_averages(records),
            })
            .collect();

        Ok(TrendReport {
            start_year,
            end_year,
            gender,
            scope,
            pass_rate_by_year,
            avg_scores_by_year,
        })
    }

    pub async fn college_average(
        &self,
        year: i32,
        gender: Option<Gender>,
    ) -> Result<Vec<CollegeAverage>> {
        let filter = RecordFilter::year(year).with_gender(gender);
        let records = self.store.scan(&filter).await?;
        debug!(year, ?gender, records = records.len(), "computing college averages");

        Ok(stats::partition_by(&records, GroupKey::College)
            .into_iter()
            .map(|(college, records)| CollegeAverage {
                college,
                avg_score: stats::mean(&records, ScoreField::Total),
                items: stats::item_averages(&records),
            })
            .collect())
    }

    /// Two detail scopes side by side for the same year and gender.
    pub async fn comparison(
        &self,
        year: i32,
        gender: Option<Gender>,
        left: Scope,
        right: Scope,
    ) -> Result<ComparisonReport> {
        let left = self.comparison_side(year, gender, left).await?;
        let right = self.comparison_side(year, gender, right).await?;

        let deltas = ScoreField::ALL
            .iter()
            .map(|&field| {
                let left_avg = left.avg_scores.get(field);
                let right_avg = right.avg_scores.get(field);
                FieldDelta {
                    field,
                    left: left_avg,
                    right: right_avg,
                    difference: left_avg.zip(right_avg).map(|(l, r)| l - r),
                }
            })
            .collect();

        Ok(ComparisonReport {
            year,
            gender,
            left,
            right,
            deltas,
        })
    }

    async fn comparison_side(
        &self,
        year: i32,
        gender: Option<Gender>,
        scope: Scope,
    ) -> Result<ComparisonSide> {
        let label = match &scope {
            Scope::Class { class_name, .. } => class_name.clone(),
            other => other.to_string(),
        };
        let detail = self.detail(year, gender, scope).await?;
        let pass_rate = detail.stats.pass_rate();

        Ok(ComparisonSide {
            label,
            scope: detail.scope,
            stats: detail.stats,
            pass_rate,
            band: PassRateBand::classify(pass_rate),
            avg_scores: detail.avg_scores,
        })
    }

    pub async fn years(&self) -> Result<Vec<i32>> {
        self.store.years().await
    }

    pub async fn colleges(&self, year: Option<i32>) -> Result<Vec<String>> {
        let filter = year.map(RecordFilter::year).unwrap_or_default();
        self.store.distinct_values(&filter, GroupKey::College).await
    }

    pub async fn classes(&self, year: i32, college: &str) -> Result<Vec<String>> {
        if college.trim().is_empty() {
            return Err(FitnessError::MissingParameter("college"));
        }
        let filter = RecordFilter::year(year).with_college(college.trim());
        self.store.distinct_values(&filter, GroupKey::ClassName).await
    }
}
