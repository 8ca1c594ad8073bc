use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::achievements;
use crate::goals;
use crate::models::{
    payout_for, CompletedTest, Cycle, CycleGoal, Dollars, EarningDetails, EarningOverview, Goal,
    GoalKind, StudySummary,
};
use crate::schedule::{Period, Timeline, DAYS_IN_PERIOD};

/// The goals of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodGoals {
    pub period: Period,
    pub goals: Vec<Goal>,
}

impl PeriodGoals {
    pub fn earnings(&self) -> Dollars {
        self.goals.iter().map(|goal| goal.earnings).sum()
    }

    pub fn completed_count(&self) -> usize {
        self.goals.iter().filter(|goal| goal.completed).count()
    }
}

/// Every view produced by one recalculation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsViews {
    pub overview: EarningOverview,
    pub details: EarningDetails,
    pub summary: StudySummary,
}

/// Scores every started period. Before the study starts a single empty
/// placeholder period is scored so the views are never empty.
pub fn calculate_period_goals(
    tests: &[CompletedTest],
    timeline: &Timeline,
    now: DateTime<FixedOffset>,
) -> Vec<PeriodGoals> {
    let evaluated_at = now.timestamp();
    let periods = if timeline.periods.is_empty() {
        std::slice::from_ref(&timeline.placeholder)
    } else {
        timeline.periods.as_slice()
    };

    periods
        .iter()
        .map(|period| {
            let in_period: Vec<&CompletedTest> =
                tests.iter().filter(|test| period.matches(test)).collect();
            PeriodGoals {
                period: period.clone(),
                goals: goals::compute_goals(&in_period, period, evaluated_at),
            }
        })
        .collect()
}

/// Runs a full recalculation. `previous` is the last overview handed out and
/// is only used to detect newly unlocked achievements.
pub fn recalculate(
    tests: &[CompletedTest],
    timeline: &Timeline,
    previous: Option<&EarningOverview>,
    now: DateTime<FixedOffset>,
) -> EarningsViews {
    let all_goals = calculate_period_goals(tests, timeline, now);

    let overview = calculate_overview(&all_goals, timeline.today, previous);
    let details = calculate_details(&all_goals);
    let summary = calculate_summary(tests, timeline, &all_goals);

    tracing::debug!(
        periods = all_goals.len(),
        tests = tests.len(),
        total = %overview.total_earnings,
        "recalculated earnings"
    );

    EarningsViews {
        overview,
        details,
        summary,
    }
}

pub fn total_earnings(all_goals: &[PeriodGoals]) -> Dollars {
    all_goals.iter().map(PeriodGoals::earnings).sum()
}

pub fn calculate_overview(
    all_goals: &[PeriodGoals],
    today: i32,
    previous: Option<&EarningOverview>,
) -> EarningOverview {
    let current: &[Goal] = all_goals
        .last()
        .map(|period| period.goals.as_slice())
        .unwrap_or_default();

    // Only today's 4-out-of-4 goal is shown on the overview.
    let mut goals: Vec<Goal> = current
        .iter()
        .filter(|goal| !matches!(goal.kind, GoalKind::FourOfFour { .. }))
        .cloned()
        .collect();
    if let Some(todays) = current
        .iter()
        .find(|goal| goal.kind == GoalKind::FourOfFour { day: today })
    {
        goals.push(todays.clone());
    }

    let new_achievements = previous
        .map(|previous| achievements::new_achievements(&previous.goals, &goals))
        .unwrap_or_default();

    EarningOverview {
        total_earnings: total_earnings(all_goals),
        cycle: all_goals.len().saturating_sub(1),
        cycle_earnings: current.iter().map(|goal| goal.earnings).sum(),
        goals,
        new_achievements,
    }
}

pub fn calculate_details(all_goals: &[PeriodGoals]) -> EarningDetails {
    let cycles: Vec<Cycle> = all_goals
        .iter()
        .enumerate()
        .map(|(index, period_goals)| Cycle {
            cycle: index,
            total: period_goals.earnings(),
            start_date: period_goals.period.start.timestamp(),
            end_date: period_goals.period.end.timestamp(),
            details: GoalKind::DETAIL_ORDER
                .iter()
                .map(|name| cycle_goal(name, &period_goals.goals))
                .collect(),
        })
        .collect();

    EarningDetails {
        total_earnings: cycles.iter().map(|cycle| cycle.total).sum(),
        cycles,
    }
}

fn cycle_goal(name: &str, goals: &[Goal]) -> CycleGoal {
    let named: Vec<&Goal> = goals.iter().filter(|goal| goal.name() == name).collect();
    let progress = if named.is_empty() {
        0
    } else {
        named.iter().map(|goal| u64::from(goal.progress)).sum::<u64>() / named.len() as u64
    };

    CycleGoal {
        name: name.to_string(),
        value: payout_for(name),
        count_completed: named.iter().filter(|goal| goal.completed).count(),
        amount_earned: named.iter().map(|goal| goal.earnings).sum(),
        progress: progress as u32,
    }
}

pub fn calculate_summary(
    tests: &[CompletedTest],
    timeline: &Timeline,
    all_goals: &[PeriodGoals],
) -> StudySummary {
    let prior_periods = all_goals.len().saturating_sub(1) as u32;

    StudySummary {
        total_earnings: total_earnings(all_goals),
        tests_taken: tests.len(),
        days_tested: timeline.current_days_tested + prior_periods * DAYS_IN_PERIOD as u32,
        goals_met: all_goals.iter().map(PeriodGoals::completed_count).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArcSchedule, PeriodKey};
    use crate::schedule::PeriodSchedule;
    use chrono::Duration;

    fn start() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2021-08-10T11:21:00-07:00").expect("valid start")
    }

    fn timeline_at(now: DateTime<FixedOffset>) -> Timeline {
        PeriodSchedule::ArcStartDays(ArcSchedule::adherence_default())
            .timeline(Some(start()), now)
            .expect("ready")
    }

    fn sessions(
        week: i32,
        days: std::ops::RangeInclusive<i32>,
        per_day: i32,
    ) -> Vec<CompletedTest> {
        days.flat_map(|day| {
            (0..per_day).map(move |session| CompletedTest::in_week(week, day, session, 100.0))
        })
        .collect()
    }

    #[test]
    fn overview_shows_only_todays_four_of_four() {
        let now = start() + Duration::days(3);
        let tests = sessions(0, 1..=3, 4);
        let views = recalculate(&tests, &timeline_at(now), None, now);

        let four: Vec<&Goal> = views
            .overview
            .goals
            .iter()
            .filter(|goal| goal.name() == GoalKind::FOUR_OUT_OF_FOUR)
            .collect();
        assert_eq!(four.len(), 1);
        assert_eq!(four[0].kind, GoalKind::FourOfFour { day: 3 });
        assert_eq!(views.overview.goals.len(), 4);
        assert!(views.overview.new_achievements.is_empty());
    }

    #[test]
    fn details_roll_four_of_four_into_one_row() {
        let now = start() + Duration::days(7);
        let tests = sessions(0, 1..=2, 4);
        let views = recalculate(&tests, &timeline_at(now), None, now);

        let cycle = &views.details.cycles[0];
        assert_eq!(cycle.details.len(), 4);
        let four = cycle.detail(GoalKind::FOUR_OUT_OF_FOUR).expect("4 of 4 row");
        assert_eq!(four.count_completed, 2);
        assert_eq!(four.amount_earned, Dollars(2.0));
        // two of seven days at 100%
        assert_eq!(four.progress, 28);
        assert_eq!(cycle.total, Dollars(6.0));
        assert_eq!(views.details.total_earnings, Dollars(6.0));
    }

    #[test]
    fn unmatched_weeks_count_as_taken_but_not_scored() {
        let now = start() + Duration::days(2);
        let mut tests = sessions(0, 1..=1, 2);
        tests.push(CompletedTest::in_week(13, 1, 0, 5.0));
        let views = recalculate(&tests, &timeline_at(now), None, now);

        assert_eq!(views.summary.tests_taken, 3);
        assert_eq!(views.overview.total_earnings, Dollars(1.0));
    }

    #[test]
    fn summary_adds_seven_days_per_prior_period() {
        let now = start() + Duration::days(185);
        let views = recalculate(&[], &timeline_at(now), None, now);
        assert_eq!(views.overview.cycle, 1);
        assert_eq!(views.summary.days_tested, 10);
        assert_eq!(views.details.cycles.len(), 2);
        assert_eq!(
            views.details.cycles[1].start_date - views.details.cycles[0].start_date,
            182 * 86_400
        );
    }

    #[test]
    fn placeholder_period_before_study_start() {
        let now = start() - Duration::days(2);
        let tests = vec![CompletedTest::new(PeriodKey::Week(0), 1, 0, 1.0)];
        let views = recalculate(&tests, &timeline_at(now), None, now);

        assert_eq!(views.details.cycles.len(), 1);
        assert_eq!(views.overview.cycle, 0);
        assert_eq!(views.overview.total_earnings, Dollars::ZERO);
        assert_eq!(views.overview.goals.len(), 3);
        assert_eq!(views.summary.days_tested, 0);
    }
}
