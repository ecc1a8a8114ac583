use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{ExperimentGroup, GroupComparisonRow, OverviewRow, PerformanceRow};

/// One overview row matched with one performance row for the same student.
#[derive(Debug, Clone, Copy)]
pub struct JoinedRow<'a> {
    pub overview: &'a OverviewRow,
    pub performance: &'a PerformanceRow,
}

/// Inner join on `student_id`.
///
/// Rows without an id never match. Repeated ids produce every pairing for
/// that id, in overview order then performance order.
pub fn join<'a>(
    overview: &'a [OverviewRow],
    performance: &'a [PerformanceRow],
) -> Vec<JoinedRow<'a>> {
    let mut by_id: HashMap<&str, Vec<&PerformanceRow>> = HashMap::new();
    for row in performance {
        if let Some(id) = row.student_id.as_deref() {
            by_id.entry(id).or_default().push(row);
        }
    }

    let mut joined = Vec::new();
    for row in overview {
        let Some(matches) = row.student_id.as_deref().and_then(|id| by_id.get(id)) else {
            continue;
        };
        for perf in matches {
            joined.push(JoinedRow {
                overview: row,
                performance: perf,
            });
        }
    }
    joined
}

/// Per-group aggregates over the joined overview and performance tables.
///
/// Groups are keyed on the raw label, so unlabeled rows form their own
/// group. Output is ordered A, B, other labels alphabetically, then rows
/// with no group.
pub fn compare(overview: &[OverviewRow], performance: &[PerformanceRow]) -> Vec<GroupComparisonRow> {
    let joined = join(overview, performance);
    if joined.is_empty() {
        return Vec::new();
    }

    let mut groups: HashMap<Option<&ExperimentGroup>, Vec<JoinedRow>> = HashMap::new();
    for row in joined {
        groups
            .entry(row.overview.ab_group.as_ref())
            .or_default()
            .push(row);
    }

    let mut rows: Vec<GroupComparisonRow> = groups
        .into_iter()
        .map(|(group, members)| summarize(group.cloned(), &members))
        .collect();
    rows.sort_by(|a, b| group_order(a.ab_group.as_ref(), b.ab_group.as_ref()));
    rows
}

fn summarize(group: Option<ExperimentGroup>, members: &[JoinedRow]) -> GroupComparisonRow {
    let scores: Vec<f64> = members
        .iter()
        .filter_map(|row| row.performance.overall_score)
        .collect();
    let cdps: Vec<f64> = members.iter().map(|row| row.performance.total_cdps).collect();
    let optimal: Vec<f64> = members
        .iter()
        .map(|row| row.performance.optimal_decisions as f64)
        .collect();
    let scenarios: Vec<f64> = members
        .iter()
        .map(|row| row.overview.scenarios_completed as f64)
        .collect();

    GroupComparisonRow {
        ab_group: group,
        student_id_count: members.len(),
        overall_score_mean: mean(&scores).map(round2),
        overall_score_std: sample_std(&scores).map(round2),
        overall_score_min: scores.iter().copied().reduce(f64::min).map(round2),
        overall_score_max: scores.iter().copied().reduce(f64::max).map(round2),
        total_cdps_mean: mean(&cdps).map(round2).unwrap_or(0.0),
        optimal_decisions_mean: mean(&optimal).map(round2).unwrap_or(0.0),
        medication_errors_sum: members
            .iter()
            .map(|row| row.performance.medication_errors)
            .sum(),
        scenarios_completed_mean: mean(&scenarios).map(round2).unwrap_or(0.0),
    }
}

fn group_order(a: Option<&ExperimentGroup>, b: Option<&ExperimentGroup>) -> Ordering {
    fn rank(group: Option<&ExperimentGroup>) -> (u8, &str) {
        match group {
            Some(ExperimentGroup::A) => (0, ""),
            Some(ExperimentGroup::B) => (1, ""),
            Some(ExperimentGroup::Unlabeled(raw)) => (2, raw.as_str()),
            None => (3, ""),
        }
    }
    rank(a).cmp(&rank(b))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator); undefined below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let sum_sq: f64 = values.iter().map(|value| (value - avg).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Two decimals, halves to the even neighbour.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, group: Option<ExperimentGroup>, scenarios: i64) -> OverviewRow {
        OverviewRow {
            student_id: Some(id.to_string()),
            student_name: None,
            student_email: None,
            ab_group: group,
            registered_at: None,
            session_started: None,
            session_completed: None,
            total_duration: None,
            scenarios_completed: scenarios,
            total_messages: 0,
            challenge_points_enabled: false,
            session_complete: true,
        }
    }

    fn perf(id: &str, score: Option<f64>, errors: i64) -> PerformanceRow {
        PerformanceRow {
            student_id: Some(id.to_string()),
            overall_score: score,
            performance_level: None,
            optimal_decisions: 3,
            acceptable_decisions: 0,
            suboptimal_decisions: 0,
            dangerous_decisions: 0,
            total_cdps: 5.0,
            medication_errors: errors,
            critical_actions_count: 0,
        }
    }

    #[test]
    fn join_drops_unmatched_and_expands_duplicates() {
        let overview = vec![
            student("s1", Some(ExperimentGroup::A), 1),
            student("s2", Some(ExperimentGroup::B), 1),
            student("s1", Some(ExperimentGroup::A), 2),
        ];
        let performance = vec![
            perf("s1", Some(80.0), 0),
            perf("s1", Some(90.0), 0),
            perf("s3", Some(70.0), 0),
        ];

        let joined = join(&overview, &performance);
        assert_eq!(joined.len(), 4);
        assert!(joined
            .iter()
            .all(|row| row.overview.student_id.as_deref() == Some("s1")));
    }

    #[test]
    fn rows_without_ids_never_join() {
        let mut anonymous = student("x", None, 0);
        anonymous.student_id = None;
        let mut anonymous_perf = perf("x", Some(50.0), 0);
        anonymous_perf.student_id = None;

        assert!(join(&[anonymous], &[anonymous_perf]).is_empty());
    }

    #[test]
    fn empty_join_yields_empty_comparison() {
        let overview = vec![student("s1", Some(ExperimentGroup::A), 1)];
        let performance = vec![perf("s2", Some(80.0), 0)];
        assert!(compare(&overview, &performance).is_empty());
    }

    #[test]
    fn aggregates_per_group() {
        let overview = vec![
            student("a1", Some(ExperimentGroup::A), 2),
            student("a2", Some(ExperimentGroup::A), 3),
            student("a3", Some(ExperimentGroup::A), 3),
            student("b1", Some(ExperimentGroup::B), 1),
            student("u1", Some(ExperimentGroup::Unlabeled("pilot".into())), 1),
            student("n1", None, 0),
        ];
        let performance = vec![
            perf("a1", Some(80.0), 1),
            perf("a2", Some(85.0), 0),
            perf("a3", Some(90.0), 2),
            perf("b1", Some(60.0), 1),
            perf("u1", None, 0),
            perf("n1", Some(50.0), 0),
        ];

        let rows = compare(&overview, &performance);
        let labels: Vec<Option<&str>> = rows
            .iter()
            .map(|row| row.ab_group.as_ref().map(ExperimentGroup::label))
            .collect();
        assert_eq!(labels, vec![Some("A"), Some("B"), Some("pilot"), None]);

        let a = &rows[0];
        assert_eq!(a.student_id_count, 3);
        assert_eq!(a.overall_score_mean, Some(85.0));
        assert_eq!(a.overall_score_std, Some(5.0));
        assert_eq!(a.overall_score_min, Some(80.0));
        assert_eq!(a.overall_score_max, Some(90.0));
        assert_eq!(a.total_cdps_mean, 5.0);
        assert_eq!(a.optimal_decisions_mean, 3.0);
        assert_eq!(a.medication_errors_sum, 3);
        assert_eq!(a.scenarios_completed_mean, 2.67);

        let b = &rows[1];
        assert_eq!(b.student_id_count, 1);
        assert_eq!(b.overall_score_std, None);

        let pilot = &rows[2];
        assert_eq!(pilot.student_id_count, 1);
        assert_eq!(pilot.overall_score_mean, None);
    }

    #[test]
    fn comparison_ignores_input_order() {
        let overview = vec![
            student("a1", Some(ExperimentGroup::A), 2),
            student("b1", Some(ExperimentGroup::B), 1),
            student("a2", Some(ExperimentGroup::A), 4),
            student("b2", Some(ExperimentGroup::B), 3),
        ];
        let performance = vec![
            perf("a1", Some(70.0), 0),
            perf("b1", Some(65.0), 1),
            perf("a2", Some(75.5), 2),
            perf("b2", Some(61.0), 0),
        ];

        let forward = compare(&overview, &performance);

        let mut overview_rev = overview.clone();
        overview_rev.reverse();
        let mut performance_rot = performance.clone();
        performance_rot.rotate_left(1);
        let shuffled = compare(&overview_rev, &performance_rot);

        assert_eq!(forward, shuffled);
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        assert_eq!(sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).map(round2), Some(2.14));
        assert_eq!(sample_std(&[3.0]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn round2_sends_halves_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }

    #[test]
    fn group_mean_on_a_half_rounds_to_even() {
        let ids: Vec<String> = (1..=8).map(|n| format!("a{n}")).collect();
        let overview: Vec<OverviewRow> = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| student(id, Some(ExperimentGroup::A), i64::from(idx == 0)))
            .collect();
        let performance: Vec<PerformanceRow> =
            ids.iter().map(|id| perf(id, Some(70.0), 0)).collect();

        let rows = compare(&overview, &performance);
        assert_eq!(rows[0].student_id_count, 8);
        assert_eq!(rows[0].scenarios_completed_mean, 0.12);
    }
}
