use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};

/// One participant's session document as it was read from disk.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source: PathBuf,
    pub document: Map<String, Value>,
}

/// Experimental condition a participant was assigned to.
///
/// Only `A` and `B` take part in the significance test. Any other label is
/// kept verbatim so the per-group comparison can still report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum ExperimentGroup {
    A,
    B,
    Unlabeled(String),
}

impl ExperimentGroup {
    pub fn label(&self) -> &str {
        match self {
            ExperimentGroup::A => "A",
            ExperimentGroup::B => "B",
            ExperimentGroup::Unlabeled(raw) => raw,
        }
    }
}

impl From<String> for ExperimentGroup {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "A" => ExperimentGroup::A,
            "B" => ExperimentGroup::B,
            _ => ExperimentGroup::Unlabeled(raw),
        }
    }
}

impl From<ExperimentGroup> for String {
    fn from(group: ExperimentGroup) -> Self {
        match group {
            ExperimentGroup::Unlabeled(raw) => raw,
            other => other.label().to_string(),
        }
    }
}

impl fmt::Display for ExperimentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub ab_group: Option<ExperimentGroup>,
    pub registered_at: Option<String>,
    pub session_started: Option<String>,
    pub session_completed: Option<String>,
    pub total_duration: Option<String>,
    pub scenarios_completed: i64,
    pub total_messages: i64,
    pub challenge_points_enabled: bool,
    pub session_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    pub student_id: Option<String>,
    /// `None` only when the document carries an explicit null score.
    pub overall_score: Option<f64>,
    pub performance_level: Option<String>,
    pub optimal_decisions: i64,
    pub acceptable_decisions: i64,
    pub suboptimal_decisions: i64,
    pub dangerous_decisions: i64,
    pub total_cdps: f64,
    pub medication_errors: i64,
    pub critical_actions_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRow {
    pub student_id: Option<String>,
    pub scenario_number: usize,
    pub scenario_id: Option<String>,
    pub scenario_title: Option<String>,
    pub duration: Option<String>,
    pub final_state: Option<String>,
    pub final_hr: Option<f64>,
    pub final_rr: Option<f64>,
    pub final_spo2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalActionRow {
    pub student_id: Option<String>,
    pub action_number: usize,
    pub action_type: Option<String>,
    pub action_name: Option<String>,
    pub timestamp: Option<String>,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengePointRow {
    pub student_id: Option<String>,
    pub ab_group: Option<ExperimentGroup>,
    pub challenge_number: usize,
    pub challenge_text: Option<String>,
    pub timestamp: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptRow {
    pub student_id: Option<String>,
    pub message_number: usize,
    pub role: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<String>,
}

/// Per-group aggregates, rounded to two decimals.
///
/// Score statistics are `None` when the group has no scored rows; the
/// standard deviation is also `None` for a single scored row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupComparisonRow {
    pub ab_group: Option<ExperimentGroup>,
    pub student_id_count: usize,
    pub overall_score_mean: Option<f64>,
    pub overall_score_std: Option<f64>,
    pub overall_score_min: Option<f64>,
    pub overall_score_max: Option<f64>,
    pub total_cdps_mean: f64,
    pub optimal_decisions_mean: f64,
    pub medication_errors_sum: i64,
    pub scenarios_completed_mean: f64,
}

/// Outcome of the A versus B independent t-test.
///
/// Standard deviations are `None` for groups of one. The t statistic and
/// p-value are `None` when the test is undefined (no degrees of freedom, or
/// zero spread with equal means).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticalResult {
    pub group_a_mean: f64,
    pub group_a_std: Option<f64>,
    pub group_a_n: usize,
    pub group_b_mean: f64,
    pub group_b_std: Option<f64>,
    pub group_b_n: usize,
    pub t_statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub cohens_d: f64,
    pub significant: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_labels_map_to_closed_variants() {
        assert_eq!(ExperimentGroup::from("A".to_string()), ExperimentGroup::A);
        assert_eq!(ExperimentGroup::from("B".to_string()), ExperimentGroup::B);
        assert_eq!(
            ExperimentGroup::from("a".to_string()),
            ExperimentGroup::Unlabeled("a".to_string())
        );
    }

    #[test]
    fn group_serializes_as_raw_label() {
        let value = serde_json::to_value(ExperimentGroup::Unlabeled("pilot".into())).unwrap();
        assert_eq!(value, Value::String("pilot".into()));
        let value = serde_json::to_value(ExperimentGroup::B).unwrap();
        assert_eq!(value, Value::String("B".into()));
    }
}
