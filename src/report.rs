use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::models::{ExperimentGroup, GroupComparisonRow, StatisticalResult};
use crate::stats::{EffectSize, SIGNIFICANCE_LEVEL};

const WIDTH: usize = 80;

fn banner(output: &mut String, ch: char) {
    let _ = writeln!(output, "{}", ch.to_string().repeat(WIDTH));
}

fn section(output: &mut String, title: &str) {
    banner(output, '-');
    let _ = writeln!(output, "{title}");
    banner(output, '-');
    let _ = writeln!(output);
}

fn group_label(group: Option<&ExperimentGroup>) -> &str {
    group.map(ExperimentGroup::label).unwrap_or("(none)")
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn opt_precise(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

/// Fixed-width rendering of the group comparison table.
pub fn comparison_table(rows: &[GroupComparisonRow]) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<10} {:>5} {:>10} {:>9} {:>9} {:>9} {:>10} {:>12} {:>10} {:>14}",
        "ab_group",
        "count",
        "score_mean",
        "score_std",
        "score_min",
        "score_max",
        "cdps_mean",
        "optimal_mean",
        "med_errors",
        "scenarios_mean"
    );
    for row in rows {
        let _ = writeln!(
            output,
            "{:<10} {:>5} {:>10} {:>9} {:>9} {:>9} {:>10.2} {:>12.2} {:>10} {:>14.2}",
            group_label(row.ab_group.as_ref()),
            row.student_id_count,
            opt(row.overall_score_mean),
            opt(row.overall_score_std),
            opt(row.overall_score_min),
            opt(row.overall_score_max),
            row.total_cdps_mean,
            row.optimal_decisions_mean,
            row.medication_errors_sum,
            row.scenarios_completed_mean
        );
    }
    output
}

/// Renders the A/B testing report.
///
/// Sections two to four appear only when there is comparison data and a
/// statistical result.
pub fn build_report(
    comparison: &[GroupComparisonRow],
    stats: Option<&StatisticalResult>,
    generated_at: NaiveDateTime,
) -> String {
    let mut output = String::new();

    banner(&mut output, '=');
    let _ = writeln!(output, "KNOW THYSELF PLATFORM - A/B TESTING STATISTICAL REPORT");
    banner(&mut output, '=');
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "GENERATED: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(output);

    section(&mut output, "1. GROUP COMPARISON SUMMARY");

    if comparison.is_empty() {
        let _ = writeln!(output, "No data available for comparison");
        let _ = writeln!(output);
        banner(&mut output, '=');
        return output;
    }

    output.push_str(&comparison_table(comparison));
    let _ = writeln!(output);

    let Some(stats) = stats else {
        let _ = writeln!(
            output,
            "Statistical tests not run: groups A and B need at least one scored participant each."
        );
        let _ = writeln!(output);
        banner(&mut output, '=');
        return output;
    };

    section(&mut output, "2. STATISTICAL SIGNIFICANCE TEST (Independent t-test)");
    write_group(
        &mut output,
        "Group A (Challenge Points Enabled)",
        stats.group_a_n,
        stats.group_a_mean,
        stats.group_a_std,
    );
    write_group(
        &mut output,
        "Group B (Standard Feedback)",
        stats.group_b_n,
        stats.group_b_mean,
        stats.group_b_std,
    );
    let _ = writeln!(output, "Test Results:");
    let _ = writeln!(output, "  t-statistic = {}", opt_precise(stats.t_statistic));
    let _ = writeln!(output, "  p-value = {}", opt_precise(stats.p_value));
    let _ = writeln!(
        output,
        "  Significant at alpha={}? {}",
        SIGNIFICANCE_LEVEL,
        if stats.significant { "YES" } else { "NO" }
    );
    let _ = writeln!(output);

    let effect = EffectSize::from_cohens_d(stats.cohens_d);
    section(&mut output, "3. EFFECT SIZE ANALYSIS (Cohen's d)");
    let _ = writeln!(output, "Cohen's d = {:.3}", stats.cohens_d);
    let _ = writeln!(output);
    let _ = writeln!(output, "Interpretation: {}", effect.describe());
    let _ = writeln!(output);

    section(&mut output, "4. CONCLUSIONS");
    let mean_diff = stats.group_a_mean - stats.group_b_mean;
    let p_text = opt_precise(stats.p_value);
    if stats.significant {
        let _ = writeln!(output, "SIGNIFICANT DIFFERENCE DETECTED");
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Challenge Points (Group A) associated with a {:.2} point {} in performance (p={}).",
            mean_diff.abs(),
            if mean_diff > 0.0 { "improvement" } else { "decrease" },
            p_text
        );
        let _ = writeln!(output);
        let _ = writeln!(output, "Effect size: {}", effect.describe());
    } else {
        let _ = writeln!(output, "NO SIGNIFICANT DIFFERENCE DETECTED");
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "No statistically significant difference found between groups (p={}).",
            p_text
        );
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Further research with larger sample size may be needed."
        );
    }
    let _ = writeln!(output);
    banner(&mut output, '=');

    output
}

fn write_group(output: &mut String, title: &str, n: usize, mean: f64, std: Option<f64>) {
    let _ = writeln!(output, "{title}:");
    let _ = writeln!(output, "  N = {n}");
    let _ = writeln!(output, "  Mean Score = {mean:.2}");
    let _ = writeln!(output, "  Std Dev = {}", opt(std));
    let _ = writeln!(output);
}
