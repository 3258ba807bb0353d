use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{self, PASS_THRESHOLD};
use crate::error::{FitnessError, Result};
use crate::filter::RecordFilter;
use crate::models::{AuditEntry, Gender, PassTally, ScoreField, StudentRecord};
use crate::stats::GroupKey;
use crate::store::{RecordStore, ACTION_IMPORT};

const STUDENT_COLUMNS: &str = "year, grade_id, grade, college, major, class_name, student_id, \
     name, gender, total_score, status, level, height, weight, height_weight_score, \
     height_weight_level, vital_capacity, vital_capacity_score, vital_capacity_level, \
     sprint_50m, sprint_50m_score, sprint_50m_level, long_jump, long_jump_score, \
     long_jump_level, sit_reach, sit_reach_score, sit_reach_level, run_800m, run_800m_score, \
     run_800m_level, run_1000m, run_1000m_score, run_1000m_level, situp, situp_score, \
     situp_level, pullup, pullup_score, pullup_level";

const STUDENT_COLUMN_COUNT: usize = 40;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Record store backed by the `students` and `audit_log` tables.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &RecordFilter) {
    query.push(" WHERE 1 = 1");
    if let Some((start, end)) = filter.years {
        query
            .push(" AND year BETWEEN ")
            .push_bind(start)
            .push(" AND ")
            .push_bind(end);
    }
    if let Some(gender) = filter.gender {
        query.push(" AND gender = ").push_bind(gender.as_str());
    }
    if let Some(college) = &filter.college {
        query.push(" AND college = ").push_bind(college.clone());
    }
    if let Some(class_name) = &filter.class_name {
        query.push(" AND class_name = ").push_bind(class_name.clone());
    }
}

fn row_to_record(row: &SqliteRow) -> StudentRecord {
    let gender: String = row.get("gender");
    StudentRecord {
        year: row.get("year"),
        grade_id: row.get("grade_id"),
        grade: row.get("grade"),
        college: row.get("college"),
        major: row.get("major"),
        class_name: row.get("class_name"),
        student_id: row.get("student_id"),
        name: row.get("name"),
        gender: Gender::from_cell(&gender),
        total_score: row.get("total_score"),
        status: row.get("status"),
        level: row.get("level"),
        height: row.get("height"),
        weight: row.get("weight"),
        height_weight_score: row.get("height_weight_score"),
        height_weight_level: row.get("height_weight_level"),
        vital_capacity: row.get("vital_capacity"),
        vital_capacity_score: row.get("vital_capacity_score"),
        vital_capacity_level: row.get("vital_capacity_level"),
        sprint_50m: row.get("sprint_50m"),
        sprint_50m_score: row.get("sprint_50m_score"),
        sprint_50m_level: row.get("sprint_50m_level"),
        long_jump: row.get("long_jump"),
        long_jump_score: row.get("long_jump_score"),
        long_jump_level: row.get("long_jump_level"),
        sit_reach: row.get("sit_reach"),
        sit_reach_score: row.get("sit_reach_score"),
        sit_reach_level: row.get("sit_reach_level"),
        run_800m: row.get("run_800m"),
        run_800m_score: row.get("run_800m_score"),
        run_800m_level: row.get("run_800m_level"),
        run_1000m: row.get("run_1000m"),
        run_1000m_score: row.get("run_1000m_score"),
        run_1000m_level: row.get("run_1000m_level"),
        situp: row.get("situp"),
        situp_score: row.get("situp_score"),
        situp_level: row.get("situp_level"),
        pullup: row.get("pullup"),
        pullup_score: row.get("pullup_score"),
        pullup_level: row.get("pullup_level"),
    }
}

async fn insert_record(
    conn: &mut SqliteConnection,
    record: &StudentRecord,
) -> std::result::Result<(), sqlx::Error> {
    let placeholders = vec!["?"; STUDENT_COLUMN_COUNT].join(", ");
    let sql = format!("INSERT OR REPLACE INTO students ({STUDENT_COLUMNS}) VALUES ({placeholders})");

    sqlx::query(&sql)
        .bind(record.year)
        .bind(&record.grade_id)
        .bind(&record.grade)
        .bind(&record.college)
        .bind(&record.major)
        .bind(&record.class_name)
        .bind(&record.student_id)
        .bind(&record.name)
        .bind(record.gender.as_str())
        .bind(record.total_score)
        .bind(&record.status)
        .bind(&record.level)
        .bind(record.height)
        .bind(record.weight)
        .bind(record.height_weight_score)
        .bind(&record.height_weight_level)
        .bind(record.vital_capacity)
        .bind(record.vital_capacity_score)
        .bind(&record.vital_capacity_level)
        .bind(record.sprint_50m)
        .bind(record.sprint_50m_score)
        .bind(&record.sprint_50m_level)
        .bind(record.long_jump)
        .bind(record.long_jump_score)
        .bind(&record.long_jump_level)
        .bind(record.sit_reach)
        .bind(record.sit_reach_score)
        .bind(&record.sit_reach_level)
        .bind(&record.run_800m)
        .bind(record.run_800m_score)
        .bind(&record.run_800m_level)
        .bind(&record.run_1000m)
        .bind(record.run_1000m_score)
        .bind(&record.run_1000m_level)
        .bind(record.situp)
        .bind(record.situp_score)
        .bind(&record.situp_level)
        .bind(record.pullup)
        .bind(record.pullup_score)
        .bind(&record.pullup_level)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_audit(
    conn: &mut SqliteConnection,
    batch_id: Option<Uuid>,
    action: &str,
    description: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_log (batch_id, recorded_at, action, description) VALUES (?, ?, ?, ?)",
    )
    .bind(batch_id)
    .bind(Utc::now())
    .bind(action)
    .bind(description)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_year(
    conn: &mut SqliteConnection,
    year: i32,
    records: &[StudentRecord],
    batch_id: Uuid,
) -> std::result::Result<usize, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM students WHERE year = ?")
        .bind(year)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    insert_audit(
        conn,
        Some(batch_id),
        ACTION_IMPORT,
        &format!("Deleted {deleted} records for {year}, preparing re-import"),
    )
    .await?;

    for record in records {
        insert_record(conn, record).await?;
    }
    Ok(records.len())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn scan(&self, filter: &RecordFilter) -> Result<Vec<StudentRecord>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {STUDENT_COLUMNS} FROM students"));
        push_filter(&mut query, filter);
        query.push(" ORDER BY year, college, class_name, student_id");

        let rows = query.build().fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "scanned students");
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn replace_year(
        &self,
        year: i32,
        records: &[StudentRecord],
        batch_id: Uuid,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        match write_year(&mut tx, year, records, batch_id).await {
            Ok(inserted) => {
                tx.commit()
                    .await
                    .map_err(|source| FitnessError::ImportFailed { year, source })?;
                info!(year, inserted, %batch_id, "replaced year");
                Ok(inserted)
            }
            Err(source) => {
                // The insert error is the one worth reporting; a failed
                // rollback still discards the transaction when it drops.
                if let Err(rollback) = tx.rollback().await {
                    warn!(year, error = %rollback, "rollback failed");
                }
                Err(FitnessError::ImportFailed { year, source })
            }
        }
    }

    async fn delete_year(&self, year: i32) -> Result<u64> {
        let result = sqlx::query("DELETE FROM students WHERE year = ?")
            .bind(year)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn append_audit(
        &self,
        batch_id: Option<Uuid>,
        action: &str,
        description: &str,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_audit(&mut conn, batch_id, action, description).await?;
        Ok(())
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, batch_id, recorded_at, action, description \
             FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;
            entries.push(AuditEntry {
                id: row.get("id"),
                batch_id: row.try_get("batch_id")?,
                recorded_at,
                action: row.get("action"),
                description: row.get("description"),
            });
        }
        Ok(entries)
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM students");
        push_filter(&mut query, filter);

        let total: i64 = query.build().fetch_one(&self.pool).await?.get("total");
        Ok(total as u64)
    }

    async fn grouped_count(
        &self,
        filter: &RecordFilter,
        key: GroupKey,
    ) -> Result<BTreeMap<String, PassTally>> {
        let column = key.column();
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {column} AS grp, COUNT(*) AS total, \
             SUM(CASE WHEN total_score >= "
        ));
        query
            .push_bind(PASS_THRESHOLD)
            .push(" THEN 1 ELSE 0 END) AS passed FROM students");
        push_filter(&mut query, filter);
        query.push(format!(" GROUP BY {column}"));

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let total: i64 = row.get("total");
                let passed: i64 = row.get("passed");
                (
                    row.get::<String, _>("grp"),
                    PassTally {
                        total: total as u64,
                        passed: passed as u64,
                    },
                )
            })
            .collect())
    }

    async fn distinct_values(&self, filter: &RecordFilter, key: GroupKey) -> Result<Vec<String>> {
        let column = key.column();
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT DISTINCT {column} AS value FROM students"));
        push_filter(&mut query, filter);
        query.push(" ORDER BY value");

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get("value")).collect())
    }

    async fn years(&self) -> Result<Vec<i32>> {
        let rows = sqlx::query("SELECT DISTINCT year FROM students ORDER BY year DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("year")).collect())
    }
}

/// Loads two years of generated sample records for demos.
pub async fn seed<S: RecordStore>(store: &S) -> Result<usize> {
    let colleges = [
        ("Engineering", ["EE-1", "EE-2"]),
        ("Science", ["MA-1", "PH-1"]),
        ("Arts", ["LI-1", "HI-1"]),
    ];
    let mut inserted = 0;

    for year in [2022, 2023] {
        let mut records = Vec::new();
        for (college_index, (college, classes)) in colleges.iter().enumerate() {
            for (class_index, class_name) in classes.iter().enumerate() {
                for seat in 0..8 {
                    let serial = college_index * 100 + class_index * 10 + seat;
                    let gender = if seat % 2 == 0 { Gender::Male } else { Gender::Female };
                    records.push(sample_record(year, college, class_name, serial, gender));
                }
            }
        }

        let batch_id = Uuid::new_v4();
        inserted += store.replace_year(year, &records, batch_id).await?;
        store
            .append_audit(
                Some(batch_id),
                ACTION_IMPORT,
                &format!("Seeded {} sample records for {year}", records.len()),
            )
            .await?;
    }

    Ok(inserted)
}

fn sample_record(
    year: i32,
    college: &str,
    class_name: &str,
    serial: usize,
    gender: Gender,
) -> StudentRecord {
    let student_id = format!("{year}{serial:04}");
    let name = format!("Student {serial:03}");
    let mut record = StudentRecord::identity(year, college, class_name, &student_id, &name, gender);

    let spread = |offset: usize| -> f64 {
        let raw = (serial * 37 + offset * 11 + year as usize) % 56;
        (35 + raw) as f64
    };

    record.grade = format!("{}", year - 1);
    record.height_weight_score = Some(spread(1));
    record.vital_capacity_score = Some(spread(2));
    record.sprint_50m_score = Some(spread(3));
    record.long_jump_score = Some(spread(4));
    record.sit_reach_score = Some(spread(5));
    match gender {
        Gender::Male => {
            record.run_1000m = "3'55\"".to_string();
            record.run_1000m_score = Some(spread(6));
            record.pullup = 8.0;
            record.pullup_score = Some(spread(7));
        }
        Gender::Female => {
            record.run_800m = "3'48\"".to_string();
            record.run_800m_score = Some(spread(6));
            record.situp = 38.0;
            record.situp_score = Some(spread(7));
        }
    }
    let items: Vec<f64> = ScoreField::ITEMS
        .iter()
        .filter_map(|&item| classifier::score_for(&record, item))
        .collect();
    let sum: f64 = items.iter().sum();
    record.total_score = Some((sum / items.len() as f64 * 10.0).round() / 10.0);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_db(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn student(year: i32, college: &str, id: &str, gender: Gender, total: f64) -> StudentRecord {
        let mut record = StudentRecord::identity(year, college, "C1", id, id, gender);
        record.total_score = Some(total);
        record.run_800m_score = Some(64.0);
        record.run_1000m_score = Some(0.0);
        record
    }

    async fn ids(store: &SqliteStore, year: i32) -> Vec<String> {
        store
            .scan(&RecordFilter::year(year))
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.student_id)
            .collect()
    }

    #[tokio::test]
    async fn migration_runs_successfully() {
        let store = memory_store().await;
        assert!(store.years().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_year_round_trips_records() {
        let store = memory_store().await;
        let records = vec![
            student(2023, "Arts", "b", Gender::Female, 72.5),
            student(2023, "Arts", "a", Gender::Male, 48.0),
        ];

        let inserted = store.replace_year(2023, &records, Uuid::new_v4()).await.unwrap();
        assert_eq!(inserted, 2);

        let scanned = store.scan(&RecordFilter::year(2023)).await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0], records[1]);
        assert_eq!(scanned[1], records[0]);
    }

    #[tokio::test]
    async fn replacing_a_year_discards_the_old_records() {
        let store = memory_store().await;
        let old = vec![
            student(2023, "Arts", "old-1", Gender::Male, 60.0),
            student(2023, "Arts", "old-2", Gender::Male, 60.0),
        ];
        store.replace_year(2023, &old, Uuid::new_v4()).await.unwrap();
        store
            .replace_year(2022, &[student(2022, "Arts", "keep", Gender::Male, 60.0)], Uuid::new_v4())
            .await
            .unwrap();

        let new = vec![student(2023, "Arts", "new-1", Gender::Female, 80.0)];
        store.replace_year(2023, &new, Uuid::new_v4()).await.unwrap();

        assert_eq!(ids(&store, 2023).await, vec!["new-1"]);
        assert_eq!(ids(&store, 2022).await, vec!["keep"]);
    }

    #[tokio::test]
    async fn failed_replace_keeps_prior_year() {
        let store = memory_store().await;
        let prior = vec![student(2023, "Arts", "prior", Gender::Male, 60.0)];
        store.replace_year(2023, &prior, Uuid::new_v4()).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON students \
             WHEN NEW.student_id = 'boom' \
             BEGIN SELECT RAISE(ABORT, 'boom rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let batch = vec![
            student(2023, "Arts", "fresh", Gender::Male, 70.0),
            student(2023, "Arts", "boom", Gender::Male, 70.0),
        ];
        let err = store.replace_year(2023, &batch, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, FitnessError::ImportFailed { year: 2023, .. }));
        let cause = std::error::Error::source(&err).unwrap().to_string();
        assert!(cause.contains("boom rejected"));

        assert_eq!(ids(&store, 2023).await, vec!["prior"]);
    }

    #[tokio::test]
    async fn sql_aggregates_match_reductions() {
        let store = memory_store().await;
        let records = vec![
            student(2023, "Science", "a", Gender::Male, 40.0),
            student(2023, "Arts", "b", Gender::Female, 90.0),
            student(2023, "Science", "c", Gender::Female, 55.0),
        ];
        store.replace_year(2023, &records, Uuid::new_v4()).await.unwrap();
        let filter = RecordFilter::year(2023);

        assert_eq!(store.count(&filter).await.unwrap(), 3);
        let groups = store.grouped_count(&filter, GroupKey::College).await.unwrap();
        assert_eq!(groups["Science"], PassTally { total: 2, passed: 1 });
        assert_eq!(groups["Arts"], PassTally { total: 1, passed: 1 });
        assert_eq!(
            store.distinct_values(&filter, GroupKey::College).await.unwrap(),
            vec!["Arts", "Science"]
        );
        // male endurance comes from the 1000m score, female from the 800m
        assert_eq!(
            store.mean(&filter, ScoreField::Endurance).await.unwrap(),
            Some(128.0 / 3.0)
        );
    }

    #[tokio::test]
    async fn gender_filter_applies_in_sql() {
        let store = memory_store().await;
        let records = vec![
            student(2023, "Arts", "a", Gender::Male, 40.0),
            student(2023, "Arts", "b", Gender::Female, 90.0),
        ];
        store.replace_year(2023, &records, Uuid::new_v4()).await.unwrap();

        let filter = RecordFilter::year(2023).with_gender(Some(Gender::Female));
        let scanned = store.scan(&filter).await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].gender, Gender::Female);
    }

    #[tokio::test]
    async fn audit_entries_are_listed_newest_first() {
        let store = memory_store().await;
        let batch_id = Uuid::new_v4();
        store
            .replace_year(2023, &[student(2023, "Arts", "a", Gender::Male, 60.0)], batch_id)
            .await
            .unwrap();
        store
            .append_audit(Some(batch_id), ACTION_IMPORT, "imported 1")
            .await
            .unwrap();

        let entries = store.audit_log(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "imported 1");
        assert_eq!(entries[1].batch_id, Some(batch_id));
        assert!(entries[1].description.contains("preparing re-import"));
    }

    #[tokio::test]
    async fn seed_loads_two_years() {
        let store = memory_store().await;
        let inserted = seed(&store).await.unwrap();
        assert_eq!(inserted, 96);
        assert_eq!(store.years().await.unwrap(), vec![2023, 2022]);
        assert_eq!(store.count(&RecordFilter::year(2022)).await.unwrap(), 48);
    }
}
