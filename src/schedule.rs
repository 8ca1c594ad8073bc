use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::{ArcSchedule, CompletedTest, PeriodKey, StudyBurstSchedule};
use crate::normalize::DAYS_IN_STUDY_BURST;

/// Days in every scored period.
pub const DAYS_IN_PERIOD: i32 = 7;

/// Latest day offset a legacy period may start at, a century after study start.
pub const MAX_ARC_START_DAY: i64 = 36_500;

/// How a study's periods are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSchedule {
    /// Legacy: fixed day offsets from the study start, tests keyed by week.
    ArcStartDays(ArcSchedule),
    /// Explicit study bursts, tests keyed by burst event id.
    StudyBursts(StudyBurstSchedule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    Legacy,
    StudyBurst,
}

/// One scored interval of the study.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub index: usize,
    /// Key completed tests must carry to count toward this period. `None`
    /// for the placeholder used before the study starts.
    pub origin: Option<PeriodKey>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// First scored day index. The legacy baseline week starts at day 1
    /// because day 0 is the tutorial.
    pub first_day: i32,
    pub scheme: Scheme,
}

impl Period {
    pub fn matches(&self, test: &CompletedTest) -> bool {
        self.origin.as_ref() == Some(&test.period_key)
    }

    /// Scored day indices, one per day of the period.
    pub fn scored_days(&self) -> std::ops::Range<i32> {
        self.first_day..self.first_day + DAYS_IN_PERIOD
    }
}

/// Periods that have started at an evaluation instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    /// Started periods, earliest first. Empty before the study starts.
    pub periods: Vec<Period>,
    /// Day index of the evaluation instant inside the latest period.
    pub today: i32,
    /// Days tested so far in the latest period, 0 to 7.
    pub current_days_tested: u32,
    /// Bounds to show for the placeholder period when nothing has started.
    pub placeholder: Period,
}

impl PeriodSchedule {
    /// Rejects schedules the engine cannot be wired to.
    pub fn validate(&self) -> Result<()> {
        match self {
            PeriodSchedule::ArcStartDays(arcs) => {
                if arcs.is_empty() {
                    return Err(EngineError::EmptyArcSchedule);
                }
                validate_arc_offsets(arcs)
            }
            PeriodSchedule::StudyBursts(schedule) => {
                match schedule
                    .study_bursts
                    .iter()
                    .position(|burst| burst.start_date().is_none())
                {
                    Some(index) => Err(EngineError::EmptyStudyBurst { index }),
                    None => Ok(()),
                }
            }
        }
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            PeriodSchedule::ArcStartDays(_) => Scheme::Legacy,
            PeriodSchedule::StudyBursts(_) => Scheme::StudyBurst,
        }
    }

    /// Whether a study start date is needed to place periods in time.
    pub fn requires_study_start(&self) -> bool {
        self.scheme() == Scheme::Legacy
    }

    /// Every scheduled period, started or not. Returns `None` when the
    /// schedule cannot be placed in time yet.
    pub fn all_periods(
        &self,
        study_start: Option<DateTime<FixedOffset>>,
        offset: FixedOffset,
    ) -> Option<Vec<Period>> {
        match self {
            PeriodSchedule::ArcStartDays(arcs) => {
                let start = study_start?;
                let start_date = start.date_naive();
                let offset = *start.offset();
                let periods = sorted_offsets(arcs)
                    .into_iter()
                    .enumerate()
                    .filter_map(|(index, days)| {
                        let week = i32::try_from(days / 7).ok()?;
                        let first = start_date.checked_add_signed(Duration::try_days(days)?)?;
                        let last = first
                            .checked_add_signed(Duration::days(i64::from(DAYS_IN_PERIOD)))?;
                        Some(Period {
                            index,
                            origin: Some(PeriodKey::Week(week)),
                            start: midnight(first, offset),
                            end: midnight(last, offset),
                            first_day: if week == 0 { 1 } else { 0 },
                            scheme: Scheme::Legacy,
                        })
                    })
                    .collect();
                Some(periods)
            }
            PeriodSchedule::StudyBursts(schedule) => {
                let periods = schedule
                    .study_bursts
                    .iter()
                    .enumerate()
                    .filter_map(|(index, burst)| {
                        let start = burst.start_date()?;
                        let end = burst.end_date().unwrap_or(start);
                        Some(Period {
                            index,
                            origin: burst
                                .origin_event_id()
                                .map(|id| PeriodKey::Event(id.to_string())),
                            start: midnight(start, offset),
                            end: midnight(end, offset),
                            first_day: 0,
                            scheme: Scheme::StudyBurst,
                        })
                    })
                    .collect();
                Some(periods)
            }
        }
    }

    /// Partitions the schedule at `now`. Returns `None` when the study start
    /// is required but unknown.
    pub fn timeline(
        &self,
        study_start: Option<DateTime<FixedOffset>>,
        now: DateTime<FixedOffset>,
    ) -> Option<Timeline> {
        let all = self.all_periods(study_start, *now.offset())?;
        let placeholder = self.placeholder(&all, now);

        let timeline = match self {
            PeriodSchedule::ArcStartDays(_) => {
                let start = study_start?;
                legacy_timeline(all, start, now, placeholder)
            }
            PeriodSchedule::StudyBursts(_) => burst_timeline(all, now, placeholder),
        };
        Some(timeline)
    }

    fn placeholder(&self, all: &[Period], now: DateTime<FixedOffset>) -> Period {
        let today = midnight(now.date_naive(), *now.offset());
        let (start, end) = all
            .first()
            .map(|period| (period.start, period.end))
            .unwrap_or((today, today));
        Period {
            index: 0,
            origin: None,
            start,
            end,
            first_day: match self.scheme() {
                Scheme::Legacy => 1,
                Scheme::StudyBurst => 0,
            },
            scheme: self.scheme(),
        }
    }
}

fn legacy_timeline(
    all: Vec<Period>,
    study_start: DateTime<FixedOffset>,
    now: DateTime<FixedOffset>,
    placeholder: Period,
) -> Timeline {
    let now_date = now.with_timezone(study_start.offset()).date_naive();

    // A period is active once its first day has been reached.
    let periods: Vec<Period> = all
        .into_iter()
        .filter(|period| period.start.date_naive() <= now_date)
        .collect();

    let Some(current) = periods.last() else {
        // Days until the first period, counted as negative.
        let until_first = (now_date - placeholder.start.date_naive()).num_days();
        return Timeline {
            periods,
            today: until_first.min(-1) as i32,
            current_days_tested: 0,
            placeholder,
        };
    };

    let today = (now_date - current.start.date_naive()).num_days();
    // The baseline week scores days 1 to 7, so day 0 is never a tested day.
    let tested = today - i64::from(current.first_day);

    Timeline {
        today: today as i32,
        current_days_tested: tested.clamp(0, i64::from(DAYS_IN_PERIOD)) as u32,
        periods,
        placeholder,
    }
}

fn burst_timeline(all: Vec<Period>, now: DateTime<FixedOffset>, placeholder: Period) -> Timeline {
    let now_date = now.date_naive();
    let periods: Vec<Period> = all
        .into_iter()
        .filter(|period| period.start.date_naive() <= now_date)
        .collect();

    let days_in = periods
        .last()
        .map(|period| (now_date - period.start.date_naive()).num_days())
        .unwrap_or(0);

    Timeline {
        periods,
        today: days_in.clamp(0, i64::from(DAYS_IN_STUDY_BURST - 1)) as i32,
        current_days_tested: days_in.clamp(0, i64::from(DAYS_IN_STUDY_BURST)) as u32,
        placeholder,
    }
}

/// Rejects legacy offsets that start before the study or too far after it to
/// be placed on a calendar.
pub fn validate_arc_offsets(arcs: &ArcSchedule) -> Result<()> {
    for (&index, &offset) in arcs.start_days.iter() {
        if offset < 0 {
            return Err(EngineError::NegativeArcOffset { index, offset });
        }
        if offset > MAX_ARC_START_DAY {
            return Err(EngineError::ArcOffsetOutOfRange {
                index,
                offset,
                max: MAX_ARC_START_DAY,
            });
        }
    }
    Ok(())
}

fn sorted_offsets(arcs: &ArcSchedule) -> Vec<i64> {
    let mut offsets = arcs.offsets();
    offsets.sort_unstable();
    offsets
}

/// Local midnight of `date` in `offset`.
pub fn midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}
