use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::config::StudyConfig;
use crate::earnings::{self, EarningsViews};
use crate::error::Result;
use crate::models::{
    ArcSchedule, CompletedTest, Dollars, EarningDetails, EarningOverview, StudySummary,
};
use crate::normalize;
use crate::schedule::{self, PeriodSchedule, Timeline};

/// Caches earnings views for one participant.
///
/// Views are recomputed when the completed tests or study settings change,
/// or when the evaluation instant falls on a different calendar day than the
/// last computation. Not thread safe: a host sharing one controller between
/// threads must wrap it in a mutex.
#[derive(Debug, Clone)]
pub struct EarningsController {
    schedule: PeriodSchedule,
    alternative_arc_start_days: Option<ArcSchedule>,
    study_start: Option<DateTime<FixedOffset>>,
    raw_tests: Vec<CompletedTest>,
    completed_tests: Vec<CompletedTest>,
    baseline_test: Option<CompletedTest>,
    views: Option<EarningsViews>,
    last_calculated: Option<NaiveDate>,
    needs_recalculated: bool,
}

impl EarningsController {
    /// Fails when the schedule cannot describe any period.
    pub fn new(schedule: PeriodSchedule) -> Result<Self> {
        schedule.validate()?;
        Ok(Self {
            schedule,
            alternative_arc_start_days: None,
            study_start: None,
            raw_tests: Vec::new(),
            completed_tests: Vec::new(),
            baseline_test: None,
            views: None,
            last_calculated: None,
            needs_recalculated: true,
        })
    }

    pub fn from_config(config: &StudyConfig) -> Result<Self> {
        let mut controller = Self::new(config.schedule.clone())?;
        controller.study_start = config.study_start;
        controller.set_alternative_arc_start_days(config.alternative_arc_start_days.clone())?;
        Ok(controller)
    }

    pub fn schedule(&self) -> &PeriodSchedule {
        &self.schedule
    }

    pub fn study_start(&self) -> Option<DateTime<FixedOffset>> {
        self.study_start
    }

    pub fn set_study_start(&mut self, study_start: Option<DateTime<FixedOffset>>) {
        self.study_start = study_start;
        self.invalidate();
    }

    /// Backup legacy table consulted when snapping mislabeled weeks.
    pub fn set_alternative_arc_start_days(
        &mut self,
        alternative: Option<ArcSchedule>,
    ) -> Result<()> {
        if let Some(alternative) = &alternative {
            schedule::validate_arc_offsets(alternative)?;
        }
        self.alternative_arc_start_days = alternative;
        self.renormalize();
        Ok(())
    }

    /// Replaces the completed tests. Duplicates, mislabeled weeks and the
    /// baseline tutorial are cleaned up here.
    pub fn set_completed_tests(&mut self, tests: Vec<CompletedTest>) {
        self.raw_tests = tests;
        self.renormalize();
    }

    /// Normalized completed tests.
    pub fn completed_tests(&self) -> &[CompletedTest] {
        &self.completed_tests
    }

    pub fn baseline_test(&self) -> Option<&CompletedTest> {
        self.baseline_test.as_ref()
    }

    /// Forces the next read to recompute.
    pub fn invalidate(&mut self) {
        self.needs_recalculated = true;
    }

    fn renormalize(&mut self) {
        let normalized = normalize::normalize(
            &self.raw_tests,
            &self.schedule,
            self.alternative_arc_start_days.as_ref(),
        );
        tracing::debug!(
            raw = self.raw_tests.len(),
            kept = normalized.tests.len(),
            "normalized completed tests"
        );
        self.completed_tests = normalized.tests;
        self.baseline_test = normalized.baseline;
        self.invalidate();
    }

    /// Current period overview. New achievements are handed out once: later
    /// reads of the same computation return an empty list.
    pub fn current_earnings_overview(
        &mut self,
        now: DateTime<FixedOffset>,
    ) -> Option<EarningOverview> {
        self.possibly_recalculate(now);
        let views = self.views.as_mut()?;
        let overview = views.overview.clone();
        views.overview.new_achievements.clear();
        Some(overview)
    }

    pub fn current_earnings_details(
        &mut self,
        now: DateTime<FixedOffset>,
    ) -> Option<EarningDetails> {
        self.possibly_recalculate(now);
        self.views.as_ref().map(|views| views.details.clone())
    }

    pub fn current_study_summary(&mut self, now: DateTime<FixedOffset>) -> Option<StudySummary> {
        self.possibly_recalculate(now);
        self.views.as_ref().map(|views| views.summary.clone())
    }

    /// Lifetime earnings at `now`, bypassing the cache.
    pub fn total_earnings(&self, now: DateTime<FixedOffset>) -> Option<Dollars> {
        let timeline = self.timeline(now)?;
        let all_goals = earnings::calculate_period_goals(&self.completed_tests, &timeline, now);
        Some(earnings::total_earnings(&all_goals))
    }

    /// Per-period totals at `now`, bypassing the cache.
    pub fn cycle_totals(&self, now: DateTime<FixedOffset>) -> Option<Vec<Dollars>> {
        let timeline = self.timeline(now)?;
        let all_goals = earnings::calculate_period_goals(&self.completed_tests, &timeline, now);
        Some(all_goals.iter().map(|period| period.earnings()).collect())
    }

    fn timeline(&self, now: DateTime<FixedOffset>) -> Option<Timeline> {
        self.schedule.timeline(self.study_start, now)
    }

    fn possibly_recalculate(&mut self, now: DateTime<FixedOffset>) {
        let today = now.date_naive();
        let day_changed = self.last_calculated != Some(today);
        if !self.needs_recalculated && !day_changed {
            tracing::debug!("serving cached earnings");
            return;
        }

        let Some(timeline) = self.timeline(now) else {
            tracing::info!("study start unknown, skipping earnings recalculation");
            return;
        };

        let previous = self.views.as_ref().map(|views| &views.overview);
        let views = earnings::recalculate(&self.completed_tests, &timeline, previous, now);

        self.views = Some(views);
        self.last_calculated = Some(today);
        self.needs_recalculated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::GoalKind;
    use chrono::Duration;

    fn start() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2021-08-10T11:21:00-07:00").expect("valid start")
    }

    fn controller() -> EarningsController {
        EarningsController::from_config(&StudyConfig::legacy(start())).expect("valid config")
    }

    fn day_one(sessions: i32) -> Vec<CompletedTest> {
        let mut tests = vec![CompletedTest::in_week(0, 0, 0, 1.0)];
        tests.extend((0..sessions).map(|session| CompletedTest::in_week(0, 1, session, 2.0)));
        tests
    }

    #[test]
    fn construction_fails_without_periods() {
        let schedule = PeriodSchedule::ArcStartDays(ArcSchedule::new(Default::default()));
        assert!(matches!(
            EarningsController::new(schedule),
            Err(EngineError::EmptyArcSchedule)
        ));
    }

    #[test]
    fn construction_fails_for_offsets_past_the_calendar() {
        let arcs: ArcSchedule = [(0, 0), (1, 1_000_000_000)].into_iter().collect();
        assert!(matches!(
            EarningsController::new(PeriodSchedule::ArcStartDays(arcs)),
            Err(EngineError::ArcOffsetOutOfRange { index: 1, offset: 1_000_000_000, .. })
        ));

        let mut controller = controller();
        let alternative: ArcSchedule = [(0, 0), (1, i64::MAX)].into_iter().collect();
        assert!(controller.set_alternative_arc_start_days(Some(alternative)).is_err());
        assert!(controller.current_earnings_overview(start()).is_some());
    }

    #[test]
    fn not_ready_without_study_start() {
        let mut controller = controller();
        controller.set_study_start(None);
        controller.set_completed_tests(day_one(4));
        assert!(controller.current_earnings_overview(start()).is_none());
        assert!(controller.total_earnings(start()).is_none());

        controller.set_study_start(Some(start()));
        assert!(controller.current_earnings_overview(start()).is_some());
    }

    #[test]
    fn baseline_is_extracted() {
        let mut controller = controller();
        controller.set_completed_tests(day_one(2));
        assert_eq!(controller.completed_tests().len(), 2);
        assert_eq!(
            controller.baseline_test(),
            Some(&CompletedTest::in_week(0, 0, 0, 1.0))
        );
    }

    #[test]
    fn cache_survives_same_day_and_rolls_over() {
        let mut controller = controller();
        controller.set_completed_tests(day_one(4));
        let now = start() + Duration::days(1);

        let first = controller.current_study_summary(now).expect("summary");
        assert_eq!(first.days_tested, 0);

        // Same calendar day, no invalidation: cached view comes back.
        let later = controller
            .current_study_summary(now + Duration::hours(1))
            .expect("summary");
        assert_eq!(later, first);

        let next_day = controller
            .current_study_summary(now + Duration::days(1))
            .expect("summary");
        assert_eq!(next_day.days_tested, 1);
    }

    #[test]
    fn achievements_are_handed_out_once() {
        let mut controller = controller();
        let now = start() + Duration::days(1) + Duration::minutes(1);

        controller.set_completed_tests(day_one(3));
        controller.current_earnings_overview(now);
        controller.set_completed_tests(day_one(3));
        let unchanged = controller.current_earnings_overview(now).expect("overview");
        assert!(unchanged.new_achievements.is_empty());

        controller.set_completed_tests(day_one(4));
        let unlocked = controller.current_earnings_overview(now).expect("overview");
        assert_eq!(unlocked.new_achievements.len(), 1);
        assert_eq!(unlocked.new_achievements[0].name, GoalKind::FOUR_OUT_OF_FOUR);

        let reread = controller.current_earnings_overview(now).expect("overview");
        assert!(reread.new_achievements.is_empty());

        controller.set_completed_tests(day_one(4));
        let repeat = controller.current_earnings_overview(now).expect("overview");
        assert!(repeat.new_achievements.is_empty());
    }

    #[test]
    fn cycle_totals_list_every_started_period() {
        let mut controller = controller();
        let mut tests = day_one(4);
        tests.push(CompletedTest::in_week(26, 0, 0, 3.0));
        controller.set_completed_tests(tests);

        let totals = controller
            .cycle_totals(start() + Duration::days(183))
            .expect("totals");
        assert_eq!(totals, vec![Dollars(3.0), Dollars(0.5)]);
        assert_eq!(
            controller.total_earnings(start() + Duration::days(183)),
            Some(Dollars(3.5))
        );
    }
}
