//! Flattening of session documents into the six export tables.
//!
//! Every output field is declared as a source path in [`paths`] and read
//! through one of a handful of typed accessors. The accessor decides the
//! fallback for an absent key, so the defaulting rules live in one place:
//!
//! - text and identifiers: `None`
//! - counters and numeric totals: `0`
//! - flags: `false`
//! - lists: empty
//!
//! Extractors never fail. A document that could not be parsed never reaches
//! this module.

use std::path::Path;
use std::sync::OnceLock;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::models::{
    ChallengePointRow, CriticalActionRow, ExperimentGroup, OverviewRow, PerformanceRow, RawRecord,
    ScenarioRow, TranscriptRow,
};
use crate::source::RawRecordStore;

type Object = Map<String, Value>;

/// Key path from the root of a document (or of a list entry).
pub type FieldPath = &'static [&'static str];

pub mod paths {
    use super::FieldPath;

    pub mod student {
        use super::FieldPath;

        pub const ID: FieldPath = &["studentId"];
        pub const NAME: FieldPath = &["studentName"];
        pub const EMAIL: FieldPath = &["studentEmail"];
        pub const GROUP: FieldPath = &["group"];
        pub const REGISTERED: FieldPath = &["timestamps", "registered"];
        pub const SESSION_STARTED: FieldPath = &["timestamps", "sessionStarted"];
        pub const SESSION_COMPLETED: FieldPath = &["timestamps", "sessionCompleted"];
        pub const TOTAL_ELAPSED: FieldPath = &["timestamps", "totalElapsed"];
        pub const SCENARIOS_COMPLETED: FieldPath = &["metadata", "scenariosCompleted"];
        pub const TOTAL_MESSAGES: FieldPath = &["metadata", "totalMessages"];
        pub const CHALLENGE_POINTS_ENABLED: FieldPath = &["metadata", "challengePointsEnabled"];
        pub const SESSION_COMPLETE: FieldPath = &["metadata", "sessionComplete"];
        pub const MEDICATION_ERRORS: FieldPath = &["metadata", "medicationErrors"];
        pub const SCENARIOS: FieldPath = &["scenarios"];
        pub const CRITICAL_ACTIONS: FieldPath = &["criticalActions"];
        pub const CHALLENGE_POINTS: FieldPath = &["challengePoints"];
        pub const AAR_TRANSCRIPT: FieldPath = &["aarTranscript"];
    }

    pub mod performance {
        use super::FieldPath;

        pub const OVERALL_SCORE: FieldPath = &["performance", "overallScore"];
        pub const INTERPRETATION: FieldPath = &["performance", "interpretation"];
        pub const OPTIMAL: FieldPath = &["performance", "breakdown", "optimal"];
        pub const ACCEPTABLE: FieldPath = &["performance", "breakdown", "acceptable"];
        pub const SUBOPTIMAL: FieldPath = &["performance", "breakdown", "suboptimal"];
        pub const DANGEROUS: FieldPath = &["performance", "breakdown", "dangerous"];
        pub const TOTAL_CDPS: FieldPath = &["performance", "totalCDPs"];
    }

    /// Relative to one entry of `scenarios`.
    pub mod scenario {
        use super::FieldPath;

        pub const ID: FieldPath = &["scenarioId"];
        pub const TITLE: FieldPath = &["scenarioTitle"];
        pub const DURATION: FieldPath = &["duration"];
        pub const FINAL_STATE: FieldPath = &["finalState"];
        pub const HEART_RATE: FieldPath = &["finalVitals", "heartRate"];
        pub const RESPIRATORY_RATE: FieldPath = &["finalVitals", "respiratoryRate"];
        pub const SPO2: FieldPath = &["finalVitals", "spO2"];
    }

    /// Relative to one entry of `criticalActions`.
    pub mod action {
        use super::FieldPath;

        pub const ACTION: FieldPath = &["action"];
        pub const NAME: FieldPath = &["name"];
        pub const TIMESTAMP: FieldPath = &["timestamp"];
        pub const DETAILS: FieldPath = &["details"];
    }

    /// Relative to one entry of `challengePoints`.
    pub mod challenge {
        use super::FieldPath;

        pub const TEXT: FieldPath = &["text"];
        pub const TIMESTAMP: FieldPath = &["timestamp"];
        pub const CONTEXT: FieldPath = &["context"];
    }

    /// Relative to one entry of `aarTranscript`.
    pub mod message {
        use super::FieldPath;

        pub const ROLE: FieldPath = &["role"];
        pub const CONTENT: FieldPath = &["content"];
        pub const TIMESTAMP: FieldPath = &["timestamp"];
    }
}

fn lookup<'a>(object: &'a Object, path: FieldPath) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = object.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

/// Absent or null resolves to `None`; non-string scalars keep their JSON text.
pub fn text(object: &Object, path: FieldPath) -> Option<String> {
    match lookup(object, path)? {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

/// Integer counter, `0` when absent or not an integral number.
pub fn counter(object: &Object, path: FieldPath) -> i64 {
    let value = match lookup(object, path) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|value| value.fract() == 0.0)
                .map(|value| value as i64)
        }),
        _ => None,
    };
    value.unwrap_or(0)
}

/// Numeric total, `0.0` when absent or not a number.
pub fn total(object: &Object, path: FieldPath) -> f64 {
    measurement(object, path).unwrap_or(0.0)
}

/// Numeric reading with no default.
pub fn measurement(object: &Object, path: FieldPath) -> Option<f64> {
    lookup(object, path).and_then(Value::as_f64)
}

/// Score field: an absent key scores `0`, an explicit null or a non-number
/// stays unscored.
pub fn score(object: &Object, path: FieldPath) -> Option<f64> {
    match lookup(object, path) {
        None => Some(0.0),
        Some(value) => value.as_f64(),
    }
}

pub fn flag(object: &Object, path: FieldPath) -> bool {
    lookup(object, path)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// List entries; absent or non-list values read as empty.
pub fn list<'a>(object: &'a Object, path: FieldPath) -> &'a [Value] {
    match lookup(object, path) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

fn group(object: &Object, path: FieldPath) -> Option<ExperimentGroup> {
    text(object, path).map(ExperimentGroup::from)
}

/// Non-object list entries behave like empty objects.
fn entries<'a>(object: &'a Object, path: FieldPath) -> impl Iterator<Item = (usize, &'a Object)> {
    static EMPTY: OnceLock<Object> = OnceLock::new();
    list(object, path).iter().enumerate().map(|(idx, entry)| {
        let entry = entry
            .as_object()
            .unwrap_or_else(|| EMPTY.get_or_init(Object::new));
        (idx + 1, entry)
    })
}

pub fn overview(records: &[RawRecord]) -> Vec<OverviewRow> {
    use paths::student as p;

    records
        .iter()
        .map(|record| {
            let doc = &record.document;
            OverviewRow {
                student_id: text(doc, p::ID),
                student_name: text(doc, p::NAME),
                student_email: text(doc, p::EMAIL),
                ab_group: group(doc, p::GROUP),
                registered_at: text(doc, p::REGISTERED),
                session_started: text(doc, p::SESSION_STARTED),
                session_completed: text(doc, p::SESSION_COMPLETED),
                total_duration: text(doc, p::TOTAL_ELAPSED),
                scenarios_completed: counter(doc, p::SCENARIOS_COMPLETED),
                total_messages: counter(doc, p::TOTAL_MESSAGES),
                challenge_points_enabled: flag(doc, p::CHALLENGE_POINTS_ENABLED),
                session_complete: flag(doc, p::SESSION_COMPLETE),
            }
        })
        .collect()
}

pub fn performance(records: &[RawRecord]) -> Vec<PerformanceRow> {
    use paths::performance as p;
    use paths::student as s;

    records
        .iter()
        .map(|record| {
            let doc = &record.document;
            PerformanceRow {
                student_id: text(doc, s::ID),
                overall_score: score(doc, p::OVERALL_SCORE),
                performance_level: text(doc, p::INTERPRETATION),
                optimal_decisions: counter(doc, p::OPTIMAL),
                acceptable_decisions: counter(doc, p::ACCEPTABLE),
                suboptimal_decisions: counter(doc, p::SUBOPTIMAL),
                dangerous_decisions: counter(doc, p::DANGEROUS),
                total_cdps: total(doc, p::TOTAL_CDPS),
                medication_errors: list(doc, s::MEDICATION_ERRORS).len() as i64,
                critical_actions_count: list(doc, s::CRITICAL_ACTIONS).len() as i64,
            }
        })
        .collect()
}

pub fn scenarios(records: &[RawRecord]) -> Vec<ScenarioRow> {
    use paths::scenario as p;

    records
        .iter()
        .flat_map(|record| {
            let student_id = text(&record.document, paths::student::ID);
            entries(&record.document, paths::student::SCENARIOS).map(move |(number, entry)| {
                ScenarioRow {
                    student_id: student_id.clone(),
                    scenario_number: number,
                    scenario_id: text(entry, p::ID),
                    scenario_title: text(entry, p::TITLE),
                    duration: text(entry, p::DURATION),
                    final_state: text(entry, p::FINAL_STATE),
                    final_hr: measurement(entry, p::HEART_RATE),
                    final_rr: measurement(entry, p::RESPIRATORY_RATE),
                    final_spo2: measurement(entry, p::SPO2),
                }
            })
        })
        .collect()
}

pub fn critical_actions(records: &[RawRecord]) -> Vec<CriticalActionRow> {
    use paths::action as p;

    records
        .iter()
        .flat_map(|record| {
            let student_id = text(&record.document, paths::student::ID);
            entries(&record.document, paths::student::CRITICAL_ACTIONS).map(
                move |(number, entry)| CriticalActionRow {
                    student_id: student_id.clone(),
                    action_number: number,
                    action_type: text(entry, p::ACTION),
                    action_name: text(entry, p::NAME),
                    timestamp: text(entry, p::TIMESTAMP),
                    details: match lookup(entry, p::DETAILS) {
                        None | Some(Value::Null) => "{}".to_string(),
                        Some(details) => details.to_string(),
                    },
                },
            )
        })
        .collect()
}

pub fn challenge_points(records: &[RawRecord]) -> Vec<ChallengePointRow> {
    use paths::challenge as p;

    records
        .iter()
        .flat_map(|record| {
            let doc = &record.document;
            let student_id = text(doc, paths::student::ID);
            let ab_group = group(doc, paths::student::GROUP);
            entries(doc, paths::student::CHALLENGE_POINTS).map(move |(number, entry)| {
                ChallengePointRow {
                    student_id: student_id.clone(),
                    ab_group: ab_group.clone(),
                    challenge_number: number,
                    challenge_text: text(entry, p::TEXT),
                    timestamp: text(entry, p::TIMESTAMP),
                    context: text(entry, p::CONTEXT),
                }
            })
        })
        .collect()
}

pub fn transcripts(records: &[RawRecord]) -> Vec<TranscriptRow> {
    use paths::message as p;

    records
        .iter()
        .flat_map(|record| {
            let student_id = text(&record.document, paths::student::ID);
            entries(&record.document, paths::student::AAR_TRANSCRIPT).map(
                move |(number, entry)| TranscriptRow {
                    student_id: student_id.clone(),
                    message_number: number,
                    role: text(entry, p::ROLE),
                    content: text(entry, p::CONTENT),
                    timestamp: text(entry, p::TIMESTAMP),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedTables {
    pub overview: Vec<OverviewRow>,
    pub performance: Vec<PerformanceRow>,
    pub scenarios: Vec<ScenarioRow>,
    pub critical_actions: Vec<CriticalActionRow>,
    pub challenge_points: Vec<ChallengePointRow>,
    pub transcripts: Vec<TranscriptRow>,
}

/// Files whose document carries no usable `studentId`. Their rows are
/// extracted but never join.
pub fn unidentified_sources(records: &[RawRecord]) -> Vec<&Path> {
    records
        .iter()
        .filter(|record| text(&record.document, paths::student::ID).is_none())
        .map(|record| record.source.as_path())
        .collect()
}

/// Runs every extractor over the store.
pub fn extract_all(store: &RawRecordStore) -> ExtractedTables {
    let records = store.records();
    for source in unidentified_sources(records) {
        warn!(source = %source.display(), "document has no studentId, rows will not join");
    }
    let tables = ExtractedTables {
        overview: overview(records),
        performance: performance(records),
        scenarios: scenarios(records),
        critical_actions: critical_actions(records),
        challenge_points: challenge_points(records),
        transcripts: transcripts(records),
    };

    info!(
        overview = tables.overview.len(),
        performance = tables.performance.len(),
        scenarios = tables.scenarios.len(),
        critical_actions = tables.critical_actions.len(),
        challenge_points = tables.challenge_points.len(),
        transcripts = tables.transcripts.len(),
        "extracted tables"
    );
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn record(value: Value) -> RawRecord {
        RawRecord {
            source: PathBuf::from("fixture.json"),
            document: value.as_object().cloned().unwrap(),
        }
    }

    fn full_record() -> RawRecord {
        record(json!({
            "studentId": "stu-001",
            "studentName": "Avery Lee",
            "studentEmail": "avery@example.com",
            "group": "A",
            "timestamps": {
                "registered": "2025-03-01T09:00:00Z",
                "sessionStarted": "2025-03-01T09:05:00Z",
                "sessionCompleted": "2025-03-01T09:50:00Z",
                "totalElapsed": "45 minutes 0 seconds"
            },
            "performance": {
                "overallScore": 82.5,
                "interpretation": "Proficient",
                "totalCDPs": 6,
                "breakdown": { "optimal": 4, "acceptable": 1, "suboptimal": 1, "dangerous": 0 }
            },
            "scenarios": [
                {
                    "scenarioId": "asthma_01",
                    "scenarioTitle": "Severe Asthma",
                    "duration": 12,
                    "finalState": "improving",
                    "finalVitals": { "heartRate": 98, "respiratoryRate": 20, "spO2": 96 }
                },
                { "scenarioId": "anaphylaxis_01", "finalState": "stable" }
            ],
            "criticalActions": [
                { "action": "medication_given", "name": "Salbutamol", "timestamp": "00:02:10",
                  "details": { "dose": "5mg" } },
                { "action": "oxygen_applied" }
            ],
            "challengePoints": [
                { "text": "Why salbutamol first?", "timestamp": "00:03:00", "context": "asthma" }
            ],
            "aarTranscript": [
                { "role": "assistant", "content": "Let's review.", "timestamp": "t1" },
                { "role": "user", "content": "Okay." },
                { "role": "assistant" }
            ],
            "metadata": {
                "scenariosCompleted": 2,
                "totalMessages": 31,
                "challengePointsEnabled": true,
                "sessionComplete": true,
                "medicationErrors": [ { "drug": "epinephrine" } ]
            }
        }))
    }

    #[test]
    fn missing_fields_resolve_to_defaults() {
        let records = vec![record(json!({}))];

        let overview = overview(&records);
        assert_eq!(overview.len(), 1);
        let row = &overview[0];
        assert_eq!(row.student_id, None);
        assert_eq!(row.ab_group, None);
        assert_eq!(row.total_duration, None);
        assert_eq!(row.scenarios_completed, 0);
        assert_eq!(row.total_messages, 0);
        assert!(!row.challenge_points_enabled);
        assert!(!row.session_complete);

        let performance = performance(&records);
        assert_eq!(performance.len(), 1);
        let row = &performance[0];
        assert_eq!(row.overall_score, Some(0.0));
        assert_eq!(row.performance_level, None);
        assert_eq!(row.optimal_decisions, 0);
        assert_eq!(row.dangerous_decisions, 0);
        assert_eq!(row.total_cdps, 0.0);
        assert_eq!(row.medication_errors, 0);
        assert_eq!(row.critical_actions_count, 0);

        assert!(scenarios(&records).is_empty());
        assert!(critical_actions(&records).is_empty());
        assert!(challenge_points(&records).is_empty());
        assert!(transcripts(&records).is_empty());
    }

    #[test]
    fn documents_without_id_are_reported_by_source() {
        let mut anonymous = record(json!({ "studentName": "Nobody" }));
        anonymous.source = PathBuf::from("data/anonymous.json");
        let records = vec![full_record(), anonymous, record(json!({ "studentId": null }))];

        assert_eq!(
            unidentified_sources(&records),
            vec![Path::new("data/anonymous.json"), Path::new("fixture.json")]
        );
    }

    #[test]
    fn explicit_null_score_stays_unscored() {
        let records = vec![record(json!({ "performance": { "overallScore": null } }))];
        assert_eq!(performance(&records)[0].overall_score, None);
    }

    #[test]
    fn overview_and_performance_read_nested_blocks() {
        let records = vec![full_record()];

        let row = &overview(&records)[0];
        assert_eq!(row.student_id.as_deref(), Some("stu-001"));
        assert_eq!(row.ab_group, Some(ExperimentGroup::A));
        assert_eq!(row.session_started.as_deref(), Some("2025-03-01T09:05:00Z"));
        assert_eq!(row.total_duration.as_deref(), Some("45 minutes 0 seconds"));
        assert_eq!(row.scenarios_completed, 2);
        assert_eq!(row.total_messages, 31);
        assert!(row.challenge_points_enabled);
        assert!(row.session_complete);

        let row = &performance(&records)[0];
        assert_eq!(row.overall_score, Some(82.5));
        assert_eq!(row.performance_level.as_deref(), Some("Proficient"));
        assert_eq!(row.optimal_decisions, 4);
        assert_eq!(row.suboptimal_decisions, 1);
        assert_eq!(row.total_cdps, 6.0);
        assert_eq!(row.medication_errors, 1);
        assert_eq!(row.critical_actions_count, 2);
    }

    #[test]
    fn list_tables_number_entries_in_source_order() {
        let records = vec![full_record(), record(json!({ "studentId": "stu-002", "scenarios": [] }))];

        let rows = scenarios(&records);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows.iter().map(|r| r.scenario_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(rows[0].scenario_id.as_deref(), Some("asthma_01"));
        assert_eq!(rows[0].duration.as_deref(), Some("12"));
        assert_eq!(rows[0].final_spo2, Some(96.0));
        assert_eq!(rows[1].scenario_title, None);
        assert_eq!(rows[1].final_hr, None);

        let rows = critical_actions(&records);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action_number, 1);
        assert_eq!(rows[0].details, r#"{"dose":"5mg"}"#);
        assert_eq!(rows[1].action_number, 2);
        assert_eq!(rows[1].action_name, None);
        assert_eq!(rows[1].details, "{}");

        let rows = challenge_points(&records);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].challenge_number, 1);
        assert_eq!(rows[0].ab_group, Some(ExperimentGroup::A));

        let rows = transcripts(&records);
        assert_eq!(
            rows.iter().map(|r| r.message_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(rows[2].content, None);
        assert!(rows.iter().all(|r| r.student_id.as_deref() == Some("stu-001")));
    }

    #[test]
    fn one_overview_and_performance_row_per_record() {
        let records = vec![
            full_record(),
            record(json!({ "studentId": "stu-002" })),
            record(json!({ "studentId": "stu-001" })),
        ];
        assert_eq!(overview(&records).len(), 3);
        assert_eq!(performance(&records).len(), 3);
    }

    #[test]
    fn wrongly_typed_values_fall_back_to_defaults() {
        let records = vec![record(json!({
            "studentId": 42,
            "group": "control",
            "scenarios": "not a list",
            "metadata": { "scenariosCompleted": "three", "totalMessages": 7.0,
                          "sessionComplete": "yes" },
            "performance": { "breakdown": 5 },
            "aarTranscript": [ "bare string" ]
        }))];

        let row = &overview(&records)[0];
        assert_eq!(row.student_id.as_deref(), Some("42"));
        assert_eq!(row.ab_group, Some(ExperimentGroup::Unlabeled("control".into())));
        assert_eq!(row.scenarios_completed, 0);
        assert_eq!(row.total_messages, 7);
        assert!(!row.session_complete);

        assert_eq!(performance(&records)[0].optimal_decisions, 0);
        assert!(scenarios(&records).is_empty());

        let messages = transcripts(&records);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, None);
    }

    #[test]
    fn extract_all_fills_every_table() {
        let store = RawRecordStore::new(vec![full_record()]);
        let tables = extract_all(&store);
        assert_eq!(tables.overview.len(), 1);
        assert_eq!(tables.performance.len(), 1);
        assert_eq!(tables.scenarios.len(), 2);
        assert_eq!(tables.critical_actions.len(), 2);
        assert_eq!(tables.challenge_points.len(), 1);
        assert_eq!(tables.transcripts.len(), 3);
    }
}
