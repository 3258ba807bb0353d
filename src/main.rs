use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fitness_test_stats::db::{self, SqliteStore};
use fitness_test_stats::filter::{Scope, ScopeKind};
use fitness_test_stats::models::Gender;
use fitness_test_stats::{ingest, report, FitnessError, ReportEngine, RecordStore};

#[derive(Parser)]
#[command(name = "fitness-stats")]
#[command(about = "Student physical fitness test statistics", long_about = None)]
struct Cli {
    /// SQLite database holding the imported records
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://fitness_data.db")]
    database_url: String,

    #[arg(long, env = "FITNESS_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Report gender filter: `all`, `male`/`female`, their initials or the
/// sheet's `男`/`女`.
#[derive(Clone, Copy, Debug)]
struct GenderFilter(Option<Gender>);

fn parse_gender(value: &str) -> Result<GenderFilter, FitnessError> {
    Gender::parse_filter(value).map(GenderFilter)
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    School,
    College,
    Class,
}

impl From<ScopeArg> for ScopeKind {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::School => ScopeKind::School,
            ScopeArg::College => ScopeKind::College,
            ScopeArg::Class => ScopeKind::Class,
        }
    }
}

#[derive(Args)]
struct OutputArgs {
    /// Print JSON instead of markdown
    #[arg(long)]
    json: bool,
    /// Write to a file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long, value_enum, default_value = "school")]
    scope: ScopeArg,
    #[arg(long)]
    college: Option<String>,
    #[arg(long)]
    class_name: Option<String>,
}

impl ScopeArgs {
    fn resolve(&self) -> anyhow::Result<Scope> {
        Ok(Scope::from_parts(
            self.scope.into(),
            self.college.as_deref(),
            self.class_name.as_deref(),
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load two years of sample records
    Seed,
    /// Replace a year's records with a CSV export of the results sheet
    Import {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Delete every record of a year
    Delete {
        #[arg(long)]
        year: i32,
    },
    /// List years with imported records
    Years,
    /// List colleges, optionally for one year
    Colleges {
        #[arg(long)]
        year: Option<i32>,
    },
    /// List the classes of a college
    Classes {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        college: String,
    },
    /// Pass rates and averages for a whole year
    Overview {
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "all", value_parser = parse_gender)]
        gender: GenderFilter,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Statistics and distributions for the school, a college or a class
    Detail {
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "all", value_parser = parse_gender)]
        gender: GenderFilter,
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Pass rates and averages across a range of years
    Trend {
        #[arg(long)]
        start_year: i32,
        #[arg(long)]
        end_year: i32,
        #[arg(long, default_value = "all", value_parser = parse_gender)]
        gender: GenderFilter,
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Average scores per college
    CollegeAvg {
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "all", value_parser = parse_gender)]
        gender: GenderFilter,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Compare two colleges, or two classes, side by side
    Compare {
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "all", value_parser = parse_gender)]
        gender: GenderFilter,
        #[arg(long)]
        left_college: String,
        #[arg(long)]
        left_class: Option<String>,
        #[arg(long)]
        right_college: String,
        #[arg(long)]
        right_class: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show the most recent import and delete entries
    Logs {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

fn comparison_scope(college: &str, class_name: Option<&str>) -> anyhow::Result<Scope> {
    let kind = if class_name.is_some() {
        ScopeKind::Class
    } else {
        ScopeKind::College
    };
    Ok(Scope::from_parts(kind, Some(college), class_name)?)
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn emit<T: Serialize>(output: &OutputArgs, value: &T, markdown: String) -> anyhow::Result<()> {
    let rendered = if output.json {
        serde_json::to_string_pretty(value).context("failed to serialize report")?
    } else {
        markdown
    };

    match &output.out {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let pool = db::connect(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;
    let store = SqliteStore::new(pool);

    db::init_db(store.pool())
        .await
        .context("failed to prepare the schema")?;
    let engine = ReportEngine::new(store);

    match cli.command {
        Commands::InitDb => {
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(engine.store()).await?;
            println!("Seeded {inserted} sample records.");
        }
        Commands::Import { year, csv } => {
            let outcome = ingest::import_csv(engine.store(), year, &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!(
                "Imported {} records for {} from {}, skipped {}.",
                outcome.imported_count,
                year,
                csv.display(),
                outcome.skipped_count
            );
        }
        Commands::Delete { year } => {
            let deleted = ingest::delete_year(engine.store(), year).await?;
            println!("Deleted {deleted} records for {year}.");
        }
        Commands::Years => {
            let years = engine.years().await?;
            if years.is_empty() {
                println!("No data imported yet.");
            }
            for year in years {
                println!("{year}");
            }
        }
        Commands::Colleges { year } => {
            for college in engine.colleges(year).await? {
                println!("{college}");
            }
        }
        Commands::Classes { year, college } => {
            for class_name in engine.classes(year, &college).await? {
                println!("{class_name}");
            }
        }
        Commands::Overview {
            year,
            gender,
            output,
        } => {
            let overview = engine.overview(year, gender.0).await?;
            emit(&output, &overview, report::build_overview(&overview))?;
        }
        Commands::Detail {
            year,
            gender,
            scope,
            output,
        } => {
            let detail = engine.detail(year, gender.0, scope.resolve()?).await?;
            emit(&output, &detail, report::build_detail(&detail))?;
        }
        Commands::Trend {
            start_year,
            end_year,
            gender,
            scope,
            output,
        } => {
            let trend = engine
                .trend(start_year, end_year, gender.0, scope.resolve()?)
                .await?;
            emit(&output, &trend, report::build_trend(&trend))?;
        }
        Commands::CollegeAvg {
            year,
            gender,
            output,
        } => {
            let gender = gender.0;
            let averages = engine.college_average(year, gender).await?;
            emit(
                &output,
                &averages,
                report::build_college_average(year, gender, &averages),
            )?;
        }
        Commands::Compare {
            year,
            gender,
            left_college,
            left_class,
            right_college,
            right_class,
            output,
        } => {
            let left = comparison_scope(&left_college, left_class.as_deref())?;
            let right = comparison_scope(&right_college, right_class.as_deref())?;
            let comparison = engine.comparison(year, gender.0, left, right).await?;
            emit(&output, &comparison, report::build_comparison(&comparison))?;
        }
        Commands::Logs { limit } => {
            let entries = engine.store().audit_log(limit).await?;
            print!("{}", report::build_audit_log(&entries));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overview_gender(value: &str) -> Result<Option<Gender>, clap::Error> {
        let cli = Cli::try_parse_from(["fitness-stats", "overview", "--year", "2023", "--gender", value])?;
        match cli.command {
            Commands::Overview { gender, .. } => Ok(gender.0),
            _ => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn gender_flag_accepts_sheet_values() {
        assert_eq!(overview_gender("男").unwrap(), Some(Gender::Male));
        assert_eq!(overview_gender("female").unwrap(), Some(Gender::Female));
        assert_eq!(overview_gender("all").unwrap(), None);
    }

    #[test]
    fn gender_flag_rejects_unknown_values() {
        let err = overview_gender("other").unwrap_err();
        assert!(err.to_string().contains("Invalid gender filter: other"));
    }

    #[test]
    fn gender_flag_defaults_to_all() {
        let cli = Cli::try_parse_from(["fitness-stats", "college-avg", "--year", "2023"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::CollegeAvg { gender: GenderFilter(None), .. }
        ));
    }
}
