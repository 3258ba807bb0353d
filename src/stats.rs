//! Reductions over a scanned set of records: pass tallies, grouped tallies
//! and null-aware means. Every score is read through the classifier.

use std::collections::BTreeMap;

use crate::classifier;
use crate::models::{
    ItemAverages, ItemTally, PassTally, ScoreAverages, ScoreField, StudentRecord,
};

/// Text columns records can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    College,
    ClassName,
}

impl GroupKey {
    pub fn value(self, record: &StudentRecord) -> &str {
        match self {
            GroupKey::College => &record.college,
            GroupKey::ClassName => &record.class_name,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            GroupKey::College => "college",
            GroupKey::ClassName => "class_name",
        }
    }
}

/// Counts records and those whose total score passes.
pub fn tally_total<'a>(records: impl IntoIterator<Item = &'a StudentRecord>) -> PassTally {
    let mut tally = PassTally::default();
    for record in records {
        tally.record(classifier::passes(record, ScoreField::Total));
    }
    tally
}

pub fn tally_by(records: &[StudentRecord], key: GroupKey) -> BTreeMap<String, PassTally> {
    let mut groups: BTreeMap<String, PassTally> = BTreeMap::new();
    for record in records {
        groups
            .entry(key.value(record).to_string())
            .or_default()
            .record(classifier::passes(record, ScoreField::Total));
    }
    groups
}

/// Pass counts per test item. Every record counts toward each item's
/// total, so a missing score is a failure rather than an exclusion.
pub fn tally_items(records: &[StudentRecord]) -> Vec<ItemTally> {
    ScoreField::ITEMS
        .iter()
        .map(|&item| {
            let mut tally = PassTally::default();
            for record in records {
                tally.record(classifier::passes(record, item));
            }
            ItemTally { item, tally }
        })
        .collect()
}

/// Mean over the non-null values of `field`; `None` without observations.
pub fn mean<'a>(
    records: impl IntoIterator<Item = &'a StudentRecord>,
    field: ScoreField,
) -> Option<f64> {
    let (sum, count) = records
        .into_iter()
        .filter_map(|record| classifier::score_for(record, field))
        .fold((0.0_f64, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub fn item_averages(records: &[StudentRecord]) -> ItemAverages {
    let mut averages = ItemAverages::default();
    for item in ScoreField::ITEMS {
        averages.set(item, mean(records, item));
    }
    averages
}

pub fn score_averages(records: &[StudentRecord]) -> ScoreAverages {
    ScoreAverages {
        total_avg: mean(records, ScoreField::Total),
        items: item_averages(records),
    }
}

/// Splits records by year, keeping ascending year order.
pub fn partition_by_year(records: &[StudentRecord]) -> BTreeMap<i32, Vec<StudentRecord>> {
    let mut years: BTreeMap<i32, Vec<StudentRecord>> = BTreeMap::new();
    for record in records {
        years.entry(record.year).or_default().push(record.clone());
    }
    years
}

pub fn partition_by(
    records: &[StudentRecord],
    key: GroupKey,
) -> BTreeMap<String, Vec<StudentRecord>> {
    let mut groups: BTreeMap<String, Vec<StudentRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(key.value(record).to_string())
            .or_default()
            .push(record.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    fn scored(id: &str, college: &str, gender: Gender, total: Option<f64>) -> StudentRecord {
        let mut record = StudentRecord::identity(2023, college, "C1", id, id, gender);
        record.total_score = total;
        record
    }

    #[test]
    fn tally_counts_passing_totals() {
        let records = vec![
            scored("1", "Arts", Gender::Male, Some(50.0)),
            scored("2", "Arts", Gender::Male, Some(49.0)),
            scored("3", "Arts", Gender::Female, None),
        ];
        assert_eq!(tally_total(&records), PassTally { total: 3, passed: 1 });
    }

    #[test]
    fn tally_by_college_groups_in_name_order() {
        let records = vec![
            scored("1", "Science", Gender::Male, Some(80.0)),
            scored("2", "Arts", Gender::Male, Some(30.0)),
            scored("3", "Science", Gender::Female, Some(20.0)),
        ];
        let groups = tally_by(&records, GroupKey::College);
        let keys: Vec<&str> = groups.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Arts", "Science"]);
        assert_eq!(groups["Science"], PassTally { total: 2, passed: 1 });
        assert_eq!(groups["Arts"], PassTally { total: 1, passed: 0 });
    }

    #[test]
    fn mean_skips_nulls_in_denominator() {
        let records = vec![
            scored("1", "Arts", Gender::Male, Some(60.0)),
            scored("2", "Arts", Gender::Male, None),
            scored("3", "Arts", Gender::Male, Some(80.0)),
        ];
        assert_eq!(mean(&records, ScoreField::Total), Some(70.0));
    }

    #[test]
    fn mean_without_observations_is_absent() {
        let records = vec![scored("1", "Arts", Gender::Male, None)];
        assert_eq!(mean(&records, ScoreField::Total), None);
        assert_eq!(mean(&[] as &[StudentRecord], ScoreField::Total), None);
    }

    #[test]
    fn item_means_are_independent() {
        let mut first = scored("1", "Arts", Gender::Male, Some(70.0));
        first.long_jump_score = Some(90.0);
        let mut second = scored("2", "Arts", Gender::Male, Some(50.0));
        second.sprint_50m_score = Some(40.0);

        let averages = item_averages(&[first, second]);
        assert_eq!(averages.long_jump_avg, Some(90.0));
        assert_eq!(averages.sprint_avg, Some(40.0));
        assert_eq!(averages.vital_capacity_avg, None);
    }

    #[test]
    fn endurance_mean_mixes_genders_through_selectors() {
        let mut male = scored("1", "Arts", Gender::Male, Some(70.0));
        male.run_1000m_score = Some(80.0);
        male.run_800m_score = Some(0.0);
        let mut female = scored("2", "Arts", Gender::Female, Some(70.0));
        female.run_800m_score = Some(60.0);
        female.run_1000m_score = Some(0.0);

        assert_eq!(mean(&[male, female], ScoreField::Endurance), Some(70.0));
    }

    #[test]
    fn item_tallies_count_every_record() {
        let mut record = scored("1", "Arts", Gender::Female, Some(70.0));
        record.situp_score = Some(55.0);
        let tallies = tally_items(&[record, scored("2", "Arts", Gender::Female, Some(10.0))]);

        assert_eq!(tallies.len(), 7);
        let strength = tallies
            .iter()
            .find(|tally| tally.item == ScoreField::Strength)
            .unwrap();
        assert_eq!(strength.tally, PassTally { total: 2, passed: 1 });
    }

    #[test]
    fn years_partition_ascending() {
        let mut late = scored("1", "Arts", Gender::Male, Some(70.0));
        late.year = 2024;
        let early = scored("2", "Arts", Gender::Male, Some(70.0));
        let years: Vec<i32> = partition_by_year(&[late, early]).into_keys().collect();
        assert_eq!(years, vec![2023, 2024]);
    }
}
