use std::fmt;

use serde::Serialize;

use crate::error::{FitnessError, Result};
use crate::models::{Gender, StudentRecord};

/// Granularity of a detail, trend or comparison report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scope {
    School,
    College { college: String },
    Class { college: String, class_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    School,
    College,
    Class,
}

impl Scope {
    /// Builds a scope from loose request values. A college or class scope
    /// without the values it names is rejected rather than widened.
    pub fn from_parts(
        kind: ScopeKind,
        college: Option<&str>,
        class_name: Option<&str>,
    ) -> Result<Self> {
        let college = college.map(str::trim).filter(|value| !value.is_empty());
        let class_name = class_name.map(str::trim).filter(|value| !value.is_empty());

        match kind {
            ScopeKind::School => Ok(Scope::School),
            ScopeKind::College => match college {
                Some(college) => Ok(Scope::College {
                    college: college.to_string(),
                }),
                None => Err(FitnessError::InvalidScope(
                    "college scope requires a college".to_string(),
                )),
            },
            ScopeKind::Class => match (college, class_name) {
                (Some(college), Some(class_name)) => Ok(Scope::Class {
                    college: college.to_string(),
                    class_name: class_name.to_string(),
                }),
                (None, _) => Err(FitnessError::InvalidScope(
                    "class scope requires the class's college".to_string(),
                )),
                (Some(_), None) => Err(FitnessError::InvalidScope(
                    "class scope requires a class name".to_string(),
                )),
            },
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::School => f.write_str("whole school"),
            Scope::College { college } => f.write_str(college),
            Scope::Class {
                college,
                class_name,
            } => write!(f, "{college} / {class_name}"),
        }
    }
}

/// Conjunctive predicate over student records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub years: Option<(i32, i32)>,
    pub gender: Option<Gender>,
    pub college: Option<String>,
    pub class_name: Option<String>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn year(year: i32) -> Self {
        Self {
            years: Some((year, year)),
            ..Self::default()
        }
    }

    pub fn year_range(start: i32, end: i32) -> Result<Self> {
        if start > end {
            return Err(FitnessError::InvalidYearRange { start, end });
        }
        Ok(Self {
            years: Some((start, end)),
            ..Self::default()
        })
    }

    pub fn with_gender(mut self, gender: Option<Gender>) -> Self {
        self.gender = gender;
        self
    }

    pub fn with_college(mut self, college: &str) -> Self {
        self.college = Some(college.to_string());
        self
    }

    pub fn with_scope(mut self, scope: &Scope) -> Self {
        match scope {
            Scope::School => {}
            Scope::College { college } => {
                self.college = Some(college.clone());
            }
            Scope::Class {
                college,
                class_name,
            } => {
                self.college = Some(college.clone());
                self.class_name = Some(class_name.clone());
            }
        }
        self
    }

    pub fn matches(&self, record: &StudentRecord) -> bool {
        if let Some((start, end)) = self.years {
            if record.year < start || record.year > end {
                return false;
            }
        }
        if let Some(gender) = self.gender {
            if record.gender != gender {
                return false;
            }
        }
        if let Some(college) = &self.college {
            if &record.college != college {
                return false;
            }
        }
        if let Some(class_name) = &self.class_name {
            if &record.class_name != class_name {
                return false;
            }
        }
        true
    }
}
