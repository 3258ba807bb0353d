use serde::Serialize;

use crate::models::{Gender, ScoreField, StudentRecord};

/// A score at or above this passes its item, the total included.
pub const PASS_THRESHOLD: f64 = 50.0;

/// Share of passing records, clamped into `[0, 1]`; zero when there are no records.
pub fn pass_rate(passed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (passed as f64 / total as f64).clamp(0.0, 1.0)
}

pub fn is_passing(score: Option<f64>) -> bool {
    matches!(score, Some(value) if value >= PASS_THRESHOLD)
}

pub fn select_endurance_score(record: &StudentRecord) -> Option<f64> {
    match record.gender {
        Gender::Male => record.run_1000m_score,
        Gender::Female => record.run_800m_score,
    }
}

pub fn select_strength_score(record: &StudentRecord) -> Option<f64> {
    match record.gender {
        Gender::Male => record.pullup_score,
        Gender::Female => record.situp_score,
    }
}

/// Resolves a scored field for one record. Every report reads scores
/// through here so endurance and strength follow the gender selectors.
pub fn score_for(record: &StudentRecord, field: ScoreField) -> Option<f64> {
    match field {
        ScoreField::Total => record.total_score,
        ScoreField::HeightWeight => record.height_weight_score,
        ScoreField::VitalCapacity => record.vital_capacity_score,
        ScoreField::Sprint50m => record.sprint_50m_score,
        ScoreField::LongJump => record.long_jump_score,
        ScoreField::SitReach => record.sit_reach_score,
        ScoreField::Endurance => select_endurance_score(record),
        ScoreField::Strength => select_strength_score(record),
    }
}

pub fn passes(record: &StudentRecord, field: ScoreField) -> bool {
    is_passing(score_for(record, field))
}

/// Dashboard colouring tiers for a pass rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassRateBand {
    Excellent,
    Good,
    Moderate,
    Low,
    Failing,
}

impl PassRateBand {
    pub fn classify(rate: f64) -> Self {
        match rate {
            r if r >= 0.8 => PassRateBand::Excellent,
            r if r >= 0.7 => PassRateBand::Good,
            r if r >= 0.5 => PassRateBand::Moderate,
            r if r >= 0.3 => PassRateBand::Low,
            _ => PassRateBand::Failing,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PassRateBand::Excellent => "excellent",
            PassRateBand::Good => "good",
            PassRateBand::Moderate => "moderate",
            PassRateBand::Low => "low",
            PassRateBand::Failing => "failing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(gender: Gender) -> StudentRecord {
        let mut record = StudentRecord::identity(2023, "Arts", "A1", "s-1", "Zhou", gender);
        record.run_800m_score = Some(61.0);
        record.run_1000m_score = Some(78.0);
        record.situp_score = Some(45.0);
        record.pullup_score = Some(20.0);
        record
    }

    #[test]
    fn pass_rate_is_zero_without_records() {
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(5, 0), 0.0);
    }

    #[test]
    fn pass_rate_divides_when_consistent() {
        assert!((pass_rate(60, 100) - 0.6).abs() < 1e-12);
        assert_eq!(pass_rate(0, 7), 0.0);
        assert_eq!(pass_rate(7, 7), 1.0);
    }

    #[test]
    fn pass_rate_clamps_inconsistent_counts() {
        assert_eq!(pass_rate(12, 10), 1.0);
    }

    #[test]
    fn passing_needs_a_score_at_threshold() {
        assert!(is_passing(Some(PASS_THRESHOLD)));
        assert!(is_passing(Some(99.5)));
        assert!(!is_passing(Some(49.9)));
        assert!(!is_passing(None));
    }

    #[test]
    fn endurance_follows_gender() {
        assert_eq!(select_endurance_score(&student(Gender::Male)), Some(78.0));
        assert_eq!(select_endurance_score(&student(Gender::Female)), Some(61.0));
    }

    #[test]
    fn strength_follows_gender() {
        assert_eq!(select_strength_score(&student(Gender::Male)), Some(20.0));
        assert_eq!(select_strength_score(&student(Gender::Female)), Some(45.0));
    }

    #[test]
    fn score_for_routes_through_selectors() {
        let female = student(Gender::Female);
        assert_eq!(score_for(&female, ScoreField::Endurance), Some(61.0));
        assert!(passes(&female, ScoreField::Endurance));
        assert!(!passes(&female, ScoreField::Strength));
    }

    #[test]
    fn bands_follow_dashboard_tiers() {
        assert_eq!(PassRateBand::classify(0.95), PassRateBand::Excellent);
        assert_eq!(PassRateBand::classify(0.8), PassRateBand::Excellent);
        assert_eq!(PassRateBand::classify(0.75), PassRateBand::Good);
        assert_eq!(PassRateBand::classify(0.5), PassRateBand::Moderate);
        assert_eq!(PassRateBand::classify(0.3), PassRateBand::Low);
        assert_eq!(PassRateBand::classify(0.0), PassRateBand::Failing);
    }
}
