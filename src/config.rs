use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::ArcSchedule;
use crate::schedule::{self, PeriodSchedule};

/// Environment variable naming the study configuration file.
pub const CONFIG_ENV: &str = "EARNINGS_CONFIG";

/// Everything the engine needs to know about one participant's study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Required by the legacy scheme; without it earnings are not ready.
    #[serde(default)]
    pub study_start: Option<DateTime<FixedOffset>>,
    pub schedule: PeriodSchedule,
    /// Backup legacy table that reflects a major re-schedule.
    #[serde(default)]
    pub alternative_arc_start_days: Option<ArcSchedule>,
}

impl StudyConfig {
    pub fn legacy(study_start: DateTime<FixedOffset>) -> Self {
        Self {
            study_start: Some(study_start),
            schedule: PeriodSchedule::ArcStartDays(ArcSchedule::adherence_default()),
            alternative_arc_start_days: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: StudyConfig = serde_json::from_str(&raw)?;
        config.schedule.validate()?;
        if let Some(alternative) = &config.alternative_arc_start_days {
            schedule::validate_arc_offsets(alternative)?;
        }
        Ok(config)
    }
}
