use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::models::{CompletedTest, PeriodKey};

/// One completed test as exported by the clients, either as a CSV row or as
/// an entry of a completed-tests report.
#[derive(Debug, Deserialize)]
struct TestRecord {
    #[serde(default)]
    week: Option<i32>,
    #[serde(default, alias = "eventId")]
    event_id: Option<String>,
    day: i32,
    session: i32,
    #[serde(alias = "completedOn")]
    completed_on: f64,
}

#[derive(Debug, Deserialize)]
struct CompletedTestList {
    completed: Vec<TestRecord>,
}

impl From<TestRecord> for CompletedTest {
    fn from(record: TestRecord) -> Self {
        let period_key = match record.event_id.filter(|id| !id.trim().is_empty()) {
            Some(event_id) => PeriodKey::Event(event_id),
            None => PeriodKey::Week(record.week.unwrap_or_default()),
        };
        CompletedTest::new(period_key, record.day, record.session, record.completed_on)
    }
}

/// Reads completed tests from a `.csv` or `.json` file, in file order.
pub fn load_completed_tests(path: &Path) -> Result<Vec<CompletedTest>> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => {
            let reader = csv::Reader::from_path(path)?;
            read_csv(reader)
        }
        Some("json") => {
            let raw = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_json(&raw)
        }
        _ => Err(EngineError::UnsupportedInput(path.to_path_buf())),
    }
}

fn read_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<CompletedTest>> {
    let mut tests = Vec::new();
    for row in reader.deserialize::<TestRecord>() {
        tests.push(row?.into());
    }
    Ok(tests)
}

/// Parses a completed-tests report: `{"completed": [...]}`.
pub fn parse_json(raw: &str) -> Result<Vec<CompletedTest>> {
    let list: CompletedTestList = serde_json::from_str(raw)?;
    Ok(list.completed.into_iter().map(CompletedTest::from).collect())
}
