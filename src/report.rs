use std::fmt::Write;

use crate::classifier::PassRateBand;
use crate::distribution;
use crate::models::{
    AuditEntry, CollegeAverage, ComparisonReport, DetailReport, Gender, ItemAverages,
    OverviewReport, ScoreAverages, ScoreField, TrendReport,
};

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Absent averages stay visibly absent instead of printing as zero.
fn score(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.1}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn gender_label(gender: Option<Gender>) -> &'static str {
    match gender {
        Some(Gender::Male) => "male students",
        Some(Gender::Female) => "female students",
        None => "all students",
    }
}

fn write_item_averages(output: &mut String, averages: &ItemAverages) {
    for item in ScoreField::ITEMS {
        let _ = writeln!(output, "- {}: {}", item.label(), score(averages.get(item)));
    }
}

fn write_score_averages(output: &mut String, averages: &ScoreAverages) {
    let _ = writeln!(output, "- {}: {}", ScoreField::Total.label(), score(averages.total_avg));
    write_item_averages(output, &averages.items);
}

pub fn build_overview(report: &OverviewReport) -> String {
    let mut output = String::new();
    let rate = report.total_stats.pass_rate();

    let _ = writeln!(output, "# Fitness Test Overview {}", report.year);
    let _ = writeln!(output, "Generated for {}", gender_label(report.gender));
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Pass rate {} ({} of {} passed, {})",
        percent(rate),
        report.total_stats.passed,
        report.total_stats.total,
        PassRateBand::classify(rate).label()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Colleges");
    if report.college_stats.is_empty() {
        let _ = writeln!(output, "No records for this year.");
    } else {
        for college in &report.college_stats {
            let _ = writeln!(
                output,
                "- {}: {} ({} of {})",
                college.college,
                percent(college.tally.pass_rate()),
                college.tally.passed,
                college.tally.total
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Test Items");
    for item in &report.items_stats {
        let _ = writeln!(
            output,
            "- {}: pass rate {}, average {}",
            item.item.label(),
            percent(item.tally.pass_rate()),
            score(report.avg_scores.get(item.item))
        );
    }

    output
}

pub fn build_detail(report: &DetailReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Fitness Test Detail {}", report.year);
    let _ = writeln!(
        output,
        "Generated for {} in {}",
        gender_label(report.gender),
        report.scope
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} students, pass rate {}, average total {}",
        report.stats.total,
        percent(report.stats.pass_rate()),
        score(report.stats.avg_score)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Scores");
    write_score_averages(&mut output, &report.avg_scores);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Distributions");
    let _ = writeln!(output, "| Field | n | Min | Q1 | Median | Q3 | Max |");
    let _ = writeln!(output, "|---|---|---|---|---|---|---|");
    for entry in distribution::distributions(&report.scores) {
        let summary = entry.summary;
        let _ = writeln!(
            output,
            "| {} | {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} |",
            entry.field.label(),
            entry.count,
            summary.min,
            summary.q1,
            summary.median,
            summary.q3,
            summary.max
        );
    }

    output
}

pub fn build_trend(report: &TrendReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Fitness Trend {}-{}",
        report.start_year, report.end_year
    );
    let _ = writeln!(
        output,
        "Generated for {} in {}",
        gender_label(report.gender),
        report.scope
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Pass Rate by Year");
    if report.pass_rate_by_year.is_empty() {
        let _ = writeln!(output, "No records in this range.");
    } else {
        for entry in &report.pass_rate_by_year {
            let _ = writeln!(
                output,
                "- {}: {} ({} of {})",
                entry.year,
                percent(entry.tally.pass_rate()),
                entry.tally.passed,
                entry.tally.total
            );
        }
    }

    if !report.avg_scores_by_year.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Average Scores by Year");
        let mut header = String::from("| Year |");
        let mut rule = String::from("|---|");
        for field in ScoreField::ALL {
            let _ = write!(header, " {} |", field.label());
            rule.push_str("---|");
        }
        let _ = writeln!(output, "{header}");
        let _ = writeln!(output, "{rule}");
        for entry in &report.avg_scores_by_year {
            let mut line = format!("| {} |", entry.year);
            for field in ScoreField::ALL {
                let _ = write!(line, " {} |", score(entry.averages.get(field)));
            }
            let _ = writeln!(output, "{line}");
        }
    }

    output
}

pub fn build_college_average(
    year: i32,
    gender: Option<Gender>,
    averages: &[CollegeAverage],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# College Averages {year}");
    let _ = writeln!(output, "Generated for {}", gender_label(gender));

    if averages.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No records for this year.");
        return output;
    }

    for college in averages {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "## {} (average total {})",
            college.college,
            score(college.avg_score)
        );
        write_item_averages(&mut output, &college.items);
    }

    output
}

pub fn build_comparison(report: &ComparisonReport) -> String {
    let mut output = String::new();
    let left = &report.left;
    let right = &report.right;

    let _ = writeln!(
        output,
        "# {} vs {} ({})",
        left.label, right.label, report.year
    );
    let _ = writeln!(output, "Generated for {}", gender_label(report.gender));
    let _ = writeln!(output);
    for side in [left, right] {
        let _ = writeln!(
            output,
            "- {}: pass rate {} ({}), {} students",
            side.label,
            percent(side.pass_rate),
            side.band.label(),
            side.stats.total
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Average Scores");
    let _ = writeln!(output, "| Field | {} | {} | Difference |", left.label, right.label);
    let _ = writeln!(output, "|---|---|---|---|");
    for delta in &report.deltas {
        let difference = delta
            .difference
            .map(|value| format!("{value:+.1}"))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            delta.field.label(),
            score(delta.left),
            score(delta.right),
            difference
        );
    }

    output
}

pub fn build_audit_log(entries: &[AuditEntry]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Data Log");

    if entries.is_empty() {
        let _ = writeln!(output, "No changes recorded.");
        return output;
    }

    for entry in entries {
        let _ = writeln!(
            output,
            "- {} [{}] {}",
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            entry.description
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Scope;
    use crate::models::{CollegeTally, DetailStats, ItemTally, PassTally, ScoreRow};

    #[test]
    fn overview_lists_colleges_and_items() {
        let report = OverviewReport {
            year: 2023,
            gender: None,
            total_stats: PassTally { total: 10, passed: 6 },
            college_stats: vec![CollegeTally {
                college: "Arts".to_string(),
                tally: PassTally { total: 10, passed: 6 },
            }],
            items_stats: vec![ItemTally {
                item: ScoreField::LongJump,
                tally: PassTally { total: 10, passed: 9 },
            }],
            avg_scores: ItemAverages {
                long_jump_avg: Some(71.34),
                ..ItemAverages::default()
            },
        };

        let text = build_overview(&report);
        assert!(text.contains("Pass rate 60.0% (6 of 10 passed, moderate)"));
        assert!(text.contains("- Arts: 60.0% (6 of 10)"));
        assert!(text.contains("- Long jump: pass rate 90.0%, average 71.3"));
    }

    #[test]
    fn empty_overview_prints_absent_averages() {
        let report = OverviewReport {
            year: 2020,
            gender: Some(Gender::Female),
            total_stats: PassTally::default(),
            college_stats: Vec::new(),
            items_stats: vec![ItemTally {
                item: ScoreField::Endurance,
                tally: PassTally::default(),
            }],
            avg_scores: ItemAverages::default(),
        };

        let text = build_overview(&report);
        assert!(text.contains("female students"));
        assert!(text.contains("No records for this year."));
        assert!(text.contains("- Endurance run: pass rate 0.0%, average n/a"));
    }

    #[test]
    fn detail_includes_distribution_table() {
        let report = DetailReport {
            year: 2023,
            gender: None,
            scope: Scope::College {
                college: "Science".to_string(),
            },
            stats: DetailStats {
                total: 1,
                passed: 1,
                avg_score: Some(72.0),
            },
            scores: vec![ScoreRow {
                total_score: Some(72.0),
                ..ScoreRow::default()
            }],
            avg_scores: ScoreAverages {
                total_avg: Some(72.0),
                items: ItemAverages::default(),
            },
        };

        let text = build_detail(&report);
        assert!(text.contains("Generated for all students in Science"));
        assert!(text.contains("| Total | 1 | 72.0 | 72.0 | 72.0 | 72.0 | 72.0 |"));
        assert!(text.contains("| Strength | 0 | 0.0 | 0.0 | 0.0 | 0.0 | 0.0 |"));
    }
}
