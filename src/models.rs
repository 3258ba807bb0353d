use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::classifier::{self, PassRateBand};
use crate::error::{FitnessError, Result};
use crate::filter::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Recognises the English names, their initials and the Chinese
    /// characters used by the exported sheets.
    pub fn parse(value: &str) -> Option<Gender> {
        match value.trim().to_lowercase().as_str() {
            "male" | "m" | "男" => Some(Gender::Male),
            "female" | "f" | "女" => Some(Gender::Female),
            _ => None,
        }
    }

    /// Sheet cells that are not recognisably male take the female branch,
    /// matching how the gendered items are selected.
    pub fn from_cell(value: &str) -> Gender {
        Gender::parse(value).unwrap_or(Gender::Female)
    }

    /// Parses a report filter; `all` or an empty value means no filter.
    pub fn parse_filter(value: &str) -> Result<Option<Gender>> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(None);
        }
        Gender::parse(trimmed)
            .map(Some)
            .ok_or_else(|| FitnessError::InvalidGender(trimmed.to_string()))
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One student's results for one test year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub year: i32,
    pub grade_id: String,
    pub grade: String,
    pub college: String,
    pub major: String,
    pub class_name: String,
    pub student_id: String,
    pub name: String,
    pub gender: Gender,
    pub total_score: Option<f64>,
    pub status: String,
    pub level: String,
    pub height: f64,
    pub weight: f64,
    pub height_weight_score: Option<f64>,
    pub height_weight_level: String,
    pub vital_capacity: f64,
    pub vital_capacity_score: Option<f64>,
    pub vital_capacity_level: String,
    pub sprint_50m: f64,
    pub sprint_50m_score: Option<f64>,
    pub sprint_50m_level: String,
    pub long_jump: f64,
    pub long_jump_score: Option<f64>,
    pub long_jump_level: String,
    pub sit_reach: f64,
    pub sit_reach_score: Option<f64>,
    pub sit_reach_level: String,
    pub run_800m: String,
    pub run_800m_score: Option<f64>,
    pub run_800m_level: String,
    pub run_1000m: String,
    pub run_1000m_score: Option<f64>,
    pub run_1000m_level: String,
    pub situp: f64,
    pub situp_score: Option<f64>,
    pub situp_level: String,
    pub pullup: f64,
    pub pullup_score: Option<f64>,
    pub pullup_level: String,
}

impl StudentRecord {
    /// A record carrying identity only; every score starts out absent.
    pub fn identity(
        year: i32,
        college: &str,
        class_name: &str,
        student_id: &str,
        name: &str,
        gender: Gender,
    ) -> Self {
        Self {
            year,
            grade_id: String::new(),
            grade: String::new(),
            college: college.to_string(),
            major: String::new(),
            class_name: class_name.to_string(),
            student_id: student_id.to_string(),
            name: name.to_string(),
            gender,
            total_score: None,
            status: String::new(),
            level: String::new(),
            height: 0.0,
            weight: 0.0,
            height_weight_score: None,
            height_weight_level: String::new(),
            vital_capacity: 0.0,
            vital_capacity_score: None,
            vital_capacity_level: String::new(),
            sprint_50m: 0.0,
            sprint_50m_score: None,
            sprint_50m_level: String::new(),
            long_jump: 0.0,
            long_jump_score: None,
            long_jump_level: String::new(),
            sit_reach: 0.0,
            sit_reach_score: None,
            sit_reach_level: String::new(),
            run_800m: String::new(),
            run_800m_score: None,
            run_800m_level: String::new(),
            run_1000m: String::new(),
            run_1000m_score: None,
            run_1000m_level: String::new(),
            situp: 0.0,
            situp_score: None,
            situp_level: String::new(),
            pullup: 0.0,
            pullup_score: None,
            pullup_level: String::new(),
        }
    }
}

/// The scored fields reports aggregate over: seven test items plus the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    Total,
    HeightWeight,
    VitalCapacity,
    Sprint50m,
    LongJump,
    SitReach,
    Endurance,
    Strength,
}

impl ScoreField {
    pub const ITEMS: [ScoreField; 7] = [
        ScoreField::HeightWeight,
        ScoreField::VitalCapacity,
        ScoreField::Sprint50m,
        ScoreField::LongJump,
        ScoreField::SitReach,
        ScoreField::Endurance,
        ScoreField::Strength,
    ];

    pub const ALL: [ScoreField; 8] = [
        ScoreField::Total,
        ScoreField::HeightWeight,
        ScoreField::VitalCapacity,
        ScoreField::Sprint50m,
        ScoreField::LongJump,
        ScoreField::SitReach,
        ScoreField::Endurance,
        ScoreField::Strength,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ScoreField::Total => "Total",
            ScoreField::HeightWeight => "Height/weight",
            ScoreField::VitalCapacity => "Vital capacity",
            ScoreField::Sprint50m => "50m sprint",
            ScoreField::LongJump => "Long jump",
            ScoreField::SitReach => "Sit and reach",
            ScoreField::Endurance => "Endurance run",
            ScoreField::Strength => "Strength",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassTally {
    pub total: u64,
    pub passed: u64,
}

impl PassTally {
    pub fn record(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        }
    }

    pub fn pass_rate(&self) -> f64 {
        classifier::pass_rate(self.passed, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollegeTally {
    pub college: String,
    #[serde(flatten)]
    pub tally: PassTally,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTally {
    pub item: ScoreField,
    #[serde(flatten)]
    pub tally: PassTally,
}

/// Per-item mean scores; `None` when the item had no observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ItemAverages {
    pub height_weight_avg: Option<f64>,
    pub vital_capacity_avg: Option<f64>,
    pub sprint_avg: Option<f64>,
    pub long_jump_avg: Option<f64>,
    pub sit_reach_avg: Option<f64>,
    pub endurance_avg: Option<f64>,
    pub strength_avg: Option<f64>,
}

impl ItemAverages {
    pub fn get(&self, field: ScoreField) -> Option<f64> {
        match field {
            ScoreField::Total => None,
            ScoreField::HeightWeight => self.height_weight_avg,
            ScoreField::VitalCapacity => self.vital_capacity_avg,
            ScoreField::Sprint50m => self.sprint_avg,
            ScoreField::LongJump => self.long_jump_avg,
            ScoreField::SitReach => self.sit_reach_avg,
            ScoreField::Endurance => self.endurance_avg,
            ScoreField::Strength => self.strength_avg,
        }
    }

    pub(crate) fn set(&mut self, field: ScoreField, value: Option<f64>) {
        match field {
            ScoreField::Total => {}
            ScoreField::HeightWeight => self.height_weight_avg = value,
            ScoreField::VitalCapacity => self.vital_capacity_avg = value,
            ScoreField::Sprint50m => self.sprint_avg = value,
            ScoreField::LongJump => self.long_jump_avg = value,
            ScoreField::SitReach => self.sit_reach_avg = value,
            ScoreField::Endurance => self.endurance_avg = value,
            ScoreField::Strength => self.strength_avg = value,
        }
    }
}

/// Item averages together with the mean total score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreAverages {
    pub total_avg: Option<f64>,
    #[serde(flatten)]
    pub items: ItemAverages,
}

impl ScoreAverages {
    pub fn get(&self, field: ScoreField) -> Option<f64> {
        match field {
            ScoreField::Total => self.total_avg,
            item => self.items.get(item),
        }
    }
}

/// A record projected onto its scored fields, endurance and strength
/// already resolved for the student's gender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreRow {
    pub total_score: Option<f64>,
    pub height_weight_score: Option<f64>,
    pub vital_capacity_score: Option<f64>,
    pub sprint_50m_score: Option<f64>,
    pub long_jump_score: Option<f64>,
    pub sit_reach_score: Option<f64>,
    pub endurance_score: Option<f64>,
    pub strength_score: Option<f64>,
}

impl ScoreRow {
    pub fn from_record(record: &StudentRecord) -> Self {
        Self {
            total_score: classifier::score_for(record, ScoreField::Total),
            height_weight_score: classifier::score_for(record, ScoreField::HeightWeight),
            vital_capacity_score: classifier::score_for(record, ScoreField::VitalCapacity),
            sprint_50m_score: classifier::score_for(record, ScoreField::Sprint50m),
            long_jump_score: classifier::score_for(record, ScoreField::LongJump),
            sit_reach_score: classifier::score_for(record, ScoreField::SitReach),
            endurance_score: classifier::score_for(record, ScoreField::Endurance),
            strength_score: classifier::score_for(record, ScoreField::Strength),
        }
    }

    pub fn get(&self, field: ScoreField) -> Option<f64> {
        match field {
            ScoreField::Total => self.total_score,
            ScoreField::HeightWeight => self.height_weight_score,
            ScoreField::VitalCapacity => self.vital_capacity_score,
            ScoreField::Sprint50m => self.sprint_50m_score,
            ScoreField::LongJump => self.long_jump_score,
            ScoreField::SitReach => self.sit_reach_score,
            ScoreField::Endurance => self.endurance_score,
            ScoreField::Strength => self.strength_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewReport {
    pub year: i32,
    pub gender: Option<Gender>,
    pub total_stats: PassTally,
    pub college_stats: Vec<CollegeTally>,
    pub items_stats: Vec<ItemTally>,
    pub avg_scores: ItemAverages,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DetailStats {
    pub total: u64,
    pub passed: u64,
    pub avg_score: Option<f64>,
}

impl DetailStats {
    pub fn pass_rate(&self) -> f64 {
        classifier::pass_rate(self.passed, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailReport {
    pub year: i32,
    pub gender: Option<Gender>,
    pub scope: Scope,
    pub stats: DetailStats,
    pub scores: Vec<ScoreRow>,
    pub avg_scores: ScoreAverages,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTally {
    pub year: i32,
    #[serde(flatten)]
    pub tally: PassTally,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearAverages {
    pub year: i32,
    #[serde(flatten)]
    pub averages: ScoreAverages,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub start_year: i32,
    pub end_year: i32,
    pub gender: Option<Gender>,
    pub scope: Scope,
    pub pass_rate_by_year: Vec<YearTally>,
    pub avg_scores_by_year: Vec<YearAverages>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollegeAverage {
    pub college: String,
    pub avg_score: Option<f64>,
    #[serde(flatten)]
    pub items: ItemAverages,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSide {
    pub label: String,
    pub scope: Scope,
    pub stats: DetailStats,
    pub pass_rate: f64,
    pub band: PassRateBand,
    pub avg_scores: ScoreAverages,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDelta {
    pub field: ScoreField,
    pub left: Option<f64>,
    pub right: Option<f64>,
    /// `left - right`, absent when either side has no observations.
    pub difference: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub year: i32,
    pub gender: Option<Gender>,
    pub left: ComparisonSide,
    pub right: ComparisonSide,
    pub deltas: Vec<FieldDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub batch_id: Uuid,
    pub year: i32,
    pub imported_count: usize,
    pub skipped_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub batch_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    pub action: String,
    pub description: String,
}
