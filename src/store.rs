use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::filter::RecordFilter;
use crate::models::{AuditEntry, PassTally, ScoreField, StudentRecord};
use crate::stats::{self, GroupKey};

pub const ACTION_IMPORT: &str = "data import";
pub const ACTION_DELETE: &str = "data delete";

/// Queryable collection of student records plus the audit trail that
/// records changes to it.
///
/// Only `scan` and the write operations are required; the aggregate
/// queries default to reductions over a scan so that gendered items are
/// always resolved by the classifier.
///
/// `ReportEngine` does not call `count`, `grouped_count` or `mean`: it
/// scans once per report and reduces in memory. Those aggregates serve
/// direct callers, and SQL overrides of them do not change any report.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records matching `filter`, ordered by year, college, class and student id.
    async fn scan(&self, filter: &RecordFilter) -> Result<Vec<StudentRecord>>;

    /// Deletes every record of `year` and inserts `records` as one unit,
    /// logging the delete under `batch_id`. Returns the number inserted.
    async fn replace_year(
        &self,
        year: i32,
        records: &[StudentRecord],
        batch_id: Uuid,
    ) -> Result<usize>;

    /// Removes every record of `year`, returning how many were removed.
    async fn delete_year(&self, year: i32) -> Result<u64>;

    async fn append_audit(
        &self,
        batch_id: Option<Uuid>,
        action: &str,
        description: &str,
    ) -> Result<()>;

    /// Most recent audit entries first.
    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>>;

    async fn count(&self, filter: &RecordFilter) -> Result<u64> {
        Ok(self.scan(filter).await?.len() as u64)
    }

    async fn grouped_count(
        &self,
        filter: &RecordFilter,
        key: GroupKey,
    ) -> Result<BTreeMap<String, PassTally>> {
        let records = self.scan(filter).await?;
        Ok(stats::tally_by(&records, key))
    }

    async fn mean(&self, filter: &RecordFilter, field: ScoreField) -> Result<Option<f64>> {
        let records = self.scan(filter).await?;
        Ok(stats::mean(&records, field))
    }

    /// Distinct values of a text column, sorted.
    async fn distinct_values(&self, filter: &RecordFilter, key: GroupKey) -> Result<Vec<String>> {
        let records = self.scan(filter).await?;
        let values: BTreeSet<String> = records
            .iter()
            .map(|record| key.value(record).to_string())
            .collect();
        Ok(values.into_iter().collect())
    }

    /// Years with at least one record, newest first.
    async fn years(&self) -> Result<Vec<i32>> {
        let records = self.scan(&RecordFilter::all()).await?;
        let years: BTreeSet<i32> = records.iter().map(|record| record.year).collect();
        Ok(years.into_iter().rev().collect())
    }
}

#[derive(Default)]
struct MemoryState {
    records: Vec<StudentRecord>,
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn push_audit(&mut self, batch_id: Option<Uuid>, action: &str, description: &str) {
        let id = self.audit.len() as i64 + 1;
        self.audit.push(AuditEntry {
            id,
            batch_id,
            recorded_at: Utc::now(),
            action: action.to_string(),
            description: description.to_string(),
        });
    }
}

/// In-process store. A year replace happens under one write lock, so
/// readers see either the old year or the new one.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<StudentRecord>) -> Self {
        let store = Self::new();
        store.write().records = records;
        store
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn scan(&self, filter: &RecordFilter) -> Result<Vec<StudentRecord>> {
        let mut records: Vec<StudentRecord> = self
            .read()
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (a.year, &a.college, &a.class_name, &a.student_id)
                .cmp(&(b.year, &b.college, &b.class_name, &b.student_id))
        });
        Ok(records)
    }

    async fn replace_year(
        &self,
        year: i32,
        records: &[StudentRecord],
        batch_id: Uuid,
    ) -> Result<usize> {
        let mut state = self.write();
        state.records.retain(|record| record.year != year);
        state.push_audit(
            Some(batch_id),
            ACTION_IMPORT,
            &format!("Deleted records for {year}, preparing re-import"),
        );
        state.records.extend(records.iter().cloned());
        Ok(records.len())
    }

    async fn delete_year(&self, year: i32) -> Result<u64> {
        let mut state = self.write();
        let before = state.records.len();
        state.records.retain(|record| record.year != year);
        Ok((before - state.records.len()) as u64)
    }

    async fn append_audit(
        &self,
        batch_id: Option<Uuid>,
        action: &str,
        description: &str,
    ) -> Result<()> {
        self.write().push_audit(batch_id, action, description);
        Ok(())
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        Ok(self.read().audit.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    fn student(year: i32, college: &str, id: &str, total: f64) -> StudentRecord {
        let mut record = StudentRecord::identity(year, college, "C1", id, id, Gender::Female);
        record.total_score = Some(total);
        record
    }

    #[tokio::test]
    async fn replace_year_leaves_other_years_alone() {
        let store = MemoryStore::with_records(vec![
            student(2022, "Arts", "a", 60.0),
            student(2023, "Arts", "b", 70.0),
        ]);

        let inserted = store
            .replace_year(2023, &[student(2023, "Arts", "c", 80.0)], Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let ids: Vec<String> = store
            .scan(&RecordFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.student_id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn default_queries_reduce_over_scan() {
        let store = MemoryStore::with_records(vec![
            student(2023, "Science", "a", 40.0),
            student(2023, "Arts", "b", 90.0),
            student(2023, "Science", "c", 55.0),
            student(2021, "Arts", "d", 10.0),
        ]);
        let filter = RecordFilter::year(2023);

        assert_eq!(store.count(&filter).await.unwrap(), 3);
        let groups = store.grouped_count(&filter, GroupKey::College).await.unwrap();
        assert_eq!(groups["Science"], PassTally { total: 2, passed: 1 });
        assert_eq!(
            store.mean(&filter, ScoreField::Total).await.unwrap(),
            Some(185.0 / 3.0)
        );
        assert_eq!(
            store
                .distinct_values(&filter, GroupKey::College)
                .await
                .unwrap(),
            vec!["Arts", "Science"]
        );
        assert_eq!(store.years().await.unwrap(), vec![2023, 2021]);
    }

    #[tokio::test]
    async fn audit_log_is_newest_first() {
        let store = MemoryStore::new();
        store.append_audit(None, ACTION_DELETE, "first").await.unwrap();
        store.append_audit(None, ACTION_DELETE, "second").await.unwrap();

        let entries = store.audit_log(1).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "second");
    }
}
