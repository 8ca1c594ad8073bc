use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EngineError;

/// Identifies the study period a completed test was taken in.
///
/// Legacy clients label tests with a week number counted from study start,
/// newer clients with the event id of the study burst that scheduled them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodKey {
    Week(i32),
    Event(String),
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Week(week) => write!(f, "week {week}"),
            PeriodKey::Event(event_id) => write!(f, "{event_id}"),
        }
    }
}

/// One finished test session as reported by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTest {
    pub period_key: PeriodKey,
    pub day: i32,
    pub session: i32,
    /// Seconds since the unix epoch.
    pub completed_on: f64,
}

impl CompletedTest {
    pub fn new(period_key: PeriodKey, day: i32, session: i32, completed_on: f64) -> Self {
        Self {
            period_key,
            day,
            session,
            completed_on,
        }
    }

    pub fn in_week(week: i32, day: i32, session: i32, completed_on: f64) -> Self {
        Self::new(PeriodKey::Week(week), day, session, completed_on)
    }

    pub fn in_burst(event_id: &str, day: i32, session: i32, completed_on: f64) -> Self {
        Self::new(PeriodKey::Event(event_id.to_string()), day, session, completed_on)
    }

    /// Uniqueness key of a completed test.
    pub fn key(&self) -> (&PeriodKey, i32, i32) {
        (&self.period_key, self.day, self.session)
    }
}

/// Legacy period table: period index to the number of days after study start
/// that the period begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArcSchedule {
    pub start_days: BTreeMap<usize, i64>,
}

impl ArcSchedule {
    pub const DAYS_BETWEEN_ARCS: i64 = 182;

    pub fn new(start_days: BTreeMap<usize, i64>) -> Self {
        Self { start_days }
    }

    /// The production adherence table: ten test cycles, one every 182 days.
    pub fn adherence_default() -> Self {
        (0..10)
            .map(|index| (index, index as i64 * Self::DAYS_BETWEEN_ARCS))
            .collect()
    }

    /// Day offsets in index order.
    pub fn offsets(&self) -> Vec<i64> {
        self.start_days.values().copied().collect()
    }

    /// Week numbers in index order, as clients label them.
    pub fn weeks(&self) -> Vec<i32> {
        self.start_days
            .values()
            .map(|offset| {
                let week = offset / 7;
                i32::try_from(week).unwrap_or(if week < 0 { i32::MIN } else { i32::MAX })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.start_days.is_empty()
    }
}

impl FromIterator<(usize, i64)> for ArcSchedule {
    fn from_iter<T: IntoIterator<Item = (usize, i64)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A scheduled session inside a study burst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyBurstSession {
    pub instance_guid: String,
    /// Event id of the study burst that scheduled this session.
    pub burst_id: Option<String>,
    pub burst_timestamp: String,
    pub start_date_time: NaiveDateTime,
    pub end_date_time: NaiveDateTime,
}

/// Sessions grouped by day, each day ordered by session start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyBurst {
    pub sessions: Vec<Vec<StudyBurstSession>>,
}

impl StudyBurst {
    fn first_session(&self) -> Option<&StudyBurstSession> {
        self.sessions.first().and_then(|day| day.first())
    }

    fn last_session(&self) -> Option<&StudyBurstSession> {
        self.sessions.last().and_then(|day| day.last())
    }

    /// Event id that created this study burst.
    pub fn origin_event_id(&self) -> Option<&str> {
        self.first_session()
            .and_then(|session| session.burst_id.as_deref())
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.first_session()
            .map(|session| session.start_date_time.date())
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.last_session()
            .map(|session| session.start_date_time.date())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudyBurstSchedule {
    pub study_bursts: Vec<StudyBurst>,
}

impl StudyBurstSchedule {
    pub fn new(study_bursts: Vec<StudyBurst>) -> Self {
        Self { study_bursts }
    }

    pub fn start_date(&self, index: usize) -> Option<NaiveDate> {
        self.study_bursts.get(index).and_then(StudyBurst::start_date)
    }

    pub fn end_date(&self, index: usize) -> Option<NaiveDate> {
        self.study_bursts.get(index).and_then(StudyBurst::end_date)
    }
}

/// A US dollar amount, displayed and serialized as `$0.00`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Dollars(pub f64);

impl Dollars {
    pub const ZERO: Dollars = Dollars(0.0);

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Dollars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl FromStr for Dollars {
    type Err = EngineError;

    /// Accepts `$1.50`, `1.50` and the comma decimal form `$1,50`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('$').unwrap_or(trimmed).replace(',', ".");
        digits
            .parse::<f64>()
            .map(Dollars)
            .map_err(|_| EngineError::InvalidAmount(s.to_string()))
    }
}

impl Serialize for Dollars {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dollars {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Add for Dollars {
    type Output = Dollars;

    fn add(self, rhs: Dollars) -> Dollars {
        Dollars(self.0 + rhs.0)
    }
}

impl AddAssign for Dollars {
    fn add_assign(&mut self, rhs: Dollars) {
        self.0 += rhs.0;
    }
}

impl Sum for Dollars {
    fn sum<I: Iterator<Item = Dollars>>(iter: I) -> Dollars {
        iter.fold(Dollars::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Dollars> for Dollars {
    fn sum<I: Iterator<Item = &'a Dollars>>(iter: I) -> Dollars {
        iter.copied().sum()
    }
}

/// The four incentive rules a period is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum GoalKind {
    /// $0.50 for every completed session, up to 28 per period.
    #[serde(rename = "test-session")]
    AllSessions,
    /// $5.00 once 21 sessions are completed in a period.
    #[serde(rename = "21-sessions")]
    TwentyOneSessions,
    /// $6.00 once every day of a period has at least two sessions.
    #[serde(rename = "2-a-day")]
    TwoADay,
    /// $1.00 for each day where all four sessions are completed.
    #[serde(rename = "4-out-of-4")]
    FourOfFour { day: i32 },
}

impl GoalKind {
    pub const ALL_SESSIONS: &'static str = "test-session";
    pub const TWENTY_ONE_SESSIONS: &'static str = "21-sessions";
    pub const TWO_A_DAY: &'static str = "2-a-day";
    pub const FOUR_OUT_OF_FOUR: &'static str = "4-out-of-4";

    /// Goal names in the order earnings details list them.
    pub const DETAIL_ORDER: [&'static str; 4] = [
        Self::FOUR_OUT_OF_FOUR,
        Self::TWO_A_DAY,
        Self::TWENTY_ONE_SESSIONS,
        Self::ALL_SESSIONS,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GoalKind::AllSessions => Self::ALL_SESSIONS,
            GoalKind::TwentyOneSessions => Self::TWENTY_ONE_SESSIONS,
            GoalKind::TwoADay => Self::TWO_A_DAY,
            GoalKind::FourOfFour { .. } => Self::FOUR_OUT_OF_FOUR,
        }
    }

    /// Payout for completing the goal once (per session for `AllSessions`).
    pub fn payout(&self) -> Dollars {
        payout_for(self.name())
    }

    /// Whether the goal can flip to completed and unlock an achievement.
    pub fn is_completable(&self) -> bool {
        !matches!(self, GoalKind::AllSessions)
    }

    pub fn day(&self) -> Option<i32> {
        match self {
            GoalKind::FourOfFour { day } => Some(*day),
            _ => None,
        }
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Payout for a goal name; unknown names pay the single session rate.
pub fn payout_for(name: &str) -> Dollars {
    match name {
        GoalKind::FOUR_OUT_OF_FOUR => Dollars(1.0),
        GoalKind::TWENTY_ONE_SESSIONS => Dollars(5.0),
        GoalKind::TWO_A_DAY => Dollars(6.0),
        _ => Dollars(0.5),
    }
}

/// One goal evaluated against one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    #[serde(flatten)]
    pub kind: GoalKind,
    /// Percentage, 0-100.
    pub progress: u32,
    pub progress_components: Vec<u32>,
    pub completed: bool,
    /// Seconds since the unix epoch, set once the goal is completed.
    pub completed_on: Option<i64>,
    pub earnings: Dollars,
}

impl Goal {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn value(&self) -> Dollars {
        self.kind.payout()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub name: String,
    pub amount_earned: Dollars,
}

/// Snapshot of the current period shown on the earnings screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningOverview {
    pub total_earnings: Dollars,
    pub cycle: usize,
    pub cycle_earnings: Dollars,
    pub goals: Vec<Goal>,
    pub new_achievements: Vec<Achievement>,
}

impl EarningOverview {
    pub fn goal(&self, name: &str) -> Option<&Goal> {
        self.goals.iter().find(|goal| goal.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleGoal {
    pub name: String,
    pub value: Dollars,
    pub count_completed: usize,
    pub amount_earned: Dollars,
    /// Average progress of every instance of the goal in the cycle.
    pub progress: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub cycle: usize,
    pub total: Dollars,
    pub start_date: i64,
    pub end_date: i64,
    pub details: Vec<CycleGoal>,
}

impl Cycle {
    pub fn detail(&self, name: &str) -> Option<&CycleGoal> {
        self.details.iter().find(|goal| goal.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningDetails {
    pub total_earnings: Dollars,
    pub cycles: Vec<Cycle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudySummary {
    pub total_earnings: Dollars,
    pub tests_taken: usize,
    pub days_tested: u32,
    pub goals_met: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollars_display_with_two_decimals() {
        assert_eq!(Dollars(32.0).to_string(), "$32.00");
        assert_eq!(Dollars(1.5).to_string(), "$1.50");
        assert_eq!(Dollars::ZERO.to_string(), "$0.00");
    }

    #[test]
    fn dollars_parse_comma_and_dot_notation() {
        assert_eq!("$6,50".parse::<Dollars>().ok(), Some(Dollars(6.5)));
        assert_eq!("$6.50".parse::<Dollars>().ok(), Some(Dollars(6.5)));
        assert_eq!("12".parse::<Dollars>().ok(), Some(Dollars(12.0)));
        assert!("six dollars".parse::<Dollars>().is_err());
    }

    #[test]
    fn goal_kinds_carry_fixed_payouts() {
        assert_eq!(GoalKind::AllSessions.payout(), Dollars(0.5));
        assert_eq!(GoalKind::TwentyOneSessions.payout(), Dollars(5.0));
        assert_eq!(GoalKind::TwoADay.payout(), Dollars(6.0));
        assert_eq!(GoalKind::FourOfFour { day: 3 }.payout(), Dollars(1.0));
        assert!(!GoalKind::AllSessions.is_completable());
        assert!(GoalKind::FourOfFour { day: 0 }.is_completable());
    }

    #[test]
    fn goal_serializes_with_its_name() {
        let goal = Goal {
            kind: GoalKind::FourOfFour { day: 2 },
            progress: 50,
            progress_components: vec![100, 100, 0, 0],
            completed: false,
            completed_on: None,
            earnings: Dollars::ZERO,
        };

        let json = serde_json::to_value(&goal).expect("serialize goal");
        assert_eq!(json["name"], "4-out-of-4");
        assert_eq!(json["day"], 2);
        assert_eq!(json["earnings"], "$0.00");

        let back: Goal = serde_json::from_value(json).expect("deserialize goal");
        assert_eq!(back, goal);
    }

    #[test]
    fn default_arc_schedule_spaces_cycles_by_182_days() {
        let arcs = ArcSchedule::adherence_default();
        assert_eq!(arcs.offsets().len(), 10);
        assert_eq!(arcs.offsets()[1], 182);
        assert_eq!(arcs.weeks()[1], 26);
        assert_eq!(arcs.weeks()[9], 234);
    }

    #[test]
    fn study_burst_bounds_come_from_sessions() {
        let at = |day: u32| {
            NaiveDate::from_ymd_opt(2022, 3, day)
                .and_then(|date| date.and_hms_opt(9, 0, 0))
                .expect("valid date")
        };
        let session = |day: u32| StudyBurstSession {
            instance_guid: format!("guid-{day}"),
            burst_id: Some("study_burst_1".to_string()),
            burst_timestamp: "2022-03-01T09:00:00Z".to_string(),
            start_date_time: at(day),
            end_date_time: at(day),
        };
        let burst = StudyBurst {
            sessions: vec![vec![session(1)], vec![session(7)]],
        };

        assert_eq!(burst.origin_event_id(), Some("study_burst_1"));
        assert_eq!(burst.start_date(), NaiveDate::from_ymd_opt(2022, 3, 1));
        assert_eq!(burst.end_date(), NaiveDate::from_ymd_opt(2022, 3, 7));
        assert_eq!(StudyBurst::default().start_date(), None);
    }
}
