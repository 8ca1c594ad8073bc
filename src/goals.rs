use crate::models::{CompletedTest, Dollars, Goal, GoalKind};
use crate::schedule::{Period, Scheme};

pub const SESSIONS_PER_DAY: i32 = 4;
pub const MAX_PAID_SESSIONS: usize = 28;
pub const TWENTY_ONE_TARGET: usize = 21;
pub const TWO_A_DAY_MIN_SESSIONS: usize = 2;

/// Evaluates every goal of one period.
///
/// `tests` must already be the normalized tests of `period`. Goals come back
/// as TwoADay, TwentyOneSessions, AllSessions, then one FourOfFour per scored
/// day. `evaluated_at` stands in for the completion time of a goal with no
/// timestamped tests.
pub fn compute_goals(tests: &[&CompletedTest], period: &Period, evaluated_at: i64) -> Vec<Goal> {
    let mut goals = vec![
        two_a_day(tests, period, evaluated_at),
        twenty_one_sessions(tests, period, evaluated_at),
        all_sessions(tests, period),
    ];
    goals.extend(
        period
            .scored_days()
            .map(|day| four_of_four(tests, day, evaluated_at)),
    );
    goals
}

/// Session count shown in progress components. Study bursts cap it at the
/// number of paid sessions.
fn displayed_count(tests: &[&CompletedTest], period: &Period) -> usize {
    match period.scheme {
        Scheme::Legacy => tests.len(),
        Scheme::StudyBurst => tests.len().min(MAX_PAID_SESSIONS),
    }
}

pub fn all_sessions(tests: &[&CompletedTest], period: &Period) -> Goal {
    let paid = tests.len().min(MAX_PAID_SESSIONS);
    let progress = (100.0 * paid as f64 / MAX_PAID_SESSIONS as f64).round() as u32;

    Goal {
        kind: GoalKind::AllSessions,
        progress: progress.min(100),
        progress_components: vec![displayed_count(tests, period) as u32],
        // Accrues per session, never completes.
        completed: false,
        completed_on: None,
        earnings: Dollars(GoalKind::AllSessions.payout().value() * paid as f64),
    }
}

pub fn twenty_one_sessions(tests: &[&CompletedTest], period: &Period, evaluated_at: i64) -> Goal {
    let count = displayed_count(tests, period);
    let completed = count >= TWENTY_ONE_TARGET;

    Goal {
        kind: GoalKind::TwentyOneSessions,
        progress: truncated_percent(count, TWENTY_ONE_TARGET),
        progress_components: vec![count as u32],
        completed,
        completed_on: completed.then(|| latest_completion(tests).unwrap_or(evaluated_at)),
        earnings: payout_if(completed, GoalKind::TwentyOneSessions),
    }
}

pub fn two_a_day(tests: &[&CompletedTest], period: &Period, evaluated_at: i64) -> Goal {
    let progress_components: Vec<u32> = period
        .scored_days()
        .map(|day| {
            let count = tests.iter().filter(|test| test.day == day).count();
            if count >= TWO_A_DAY_MIN_SESSIONS {
                100
            } else {
                0
            }
        })
        .collect();

    let days = progress_components.len();
    let satisfied = progress_components.iter().filter(|&&c| c >= 100).count();
    let completed = satisfied >= days;

    Goal {
        kind: GoalKind::TwoADay,
        progress: truncated_percent(satisfied, days),
        progress_components,
        completed,
        completed_on: completed.then(|| latest_completion(tests).unwrap_or(evaluated_at)),
        earnings: payout_if(completed, GoalKind::TwoADay),
    }
}

pub fn four_of_four(tests: &[&CompletedTest], day: i32, evaluated_at: i64) -> Goal {
    let on_day: Vec<&CompletedTest> = tests
        .iter()
        .copied()
        .filter(|test| test.day == day)
        .collect();

    let progress_components: Vec<u32> = (0..SESSIONS_PER_DAY)
        .map(|session| {
            if on_day.iter().any(|test| test.session == session) {
                100
            } else {
                0
            }
        })
        .collect();

    let present = progress_components.iter().filter(|&&c| c >= 100).count();
    let completed = present >= SESSIONS_PER_DAY as usize;
    let kind = GoalKind::FourOfFour { day };

    Goal {
        kind,
        progress: truncated_percent(present, SESSIONS_PER_DAY as usize),
        progress_components,
        completed,
        completed_on: completed.then(|| latest_completion(&on_day).unwrap_or(evaluated_at)),
        earnings: payout_if(completed, kind),
    }
}

/// `floor(100 * count / target)`, capped at 100.
pub fn truncated_percent(count: usize, target: usize) -> u32 {
    if target == 0 {
        return 0;
    }
    ((100 * count / target).min(100)) as u32
}

fn payout_if(completed: bool, kind: GoalKind) -> Dollars {
    if completed {
        kind.payout()
    } else {
        Dollars::ZERO
    }
}

fn latest_completion(tests: &[&CompletedTest]) -> Option<i64> {
    tests
        .iter()
        .map(|test| test.completed_on)
        .filter(|at| at.is_finite())
        .fold(None, |latest: Option<f64>, at| {
            Some(latest.map_or(at, |current| current.max(at)))
        })
        .map(|at| at as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PeriodKey;
    use chrono::DateTime;

    fn period(scheme: Scheme, first_day: i32) -> Period {
        let start = DateTime::parse_from_rfc3339("2021-08-10T00:00:00-07:00").expect("valid date");
        Period {
            index: 0,
            origin: Some(PeriodKey::Week(0)),
            start,
            end: start,
            first_day,
            scheme,
        }
    }

    fn week(days: std::ops::RangeInclusive<i32>, sessions: i32) -> Vec<CompletedTest> {
        days.flat_map(|day| {
            (0..sessions).map(move |session| {
                CompletedTest::in_week(0, day, session, f64::from(day * 10 + session))
            })
        })
        .collect()
    }

    fn refs(tests: &[CompletedTest]) -> Vec<&CompletedTest> {
        tests.iter().collect()
    }

    #[test]
    fn goals_are_listed_in_fixed_order() {
        let goals = compute_goals(&[], &period(Scheme::Legacy, 1), 0);
        assert_eq!(goals.len(), 10);
        assert_eq!(goals[0].kind, GoalKind::TwoADay);
        assert_eq!(goals[1].kind, GoalKind::TwentyOneSessions);
        assert_eq!(goals[2].kind, GoalKind::AllSessions);
        assert_eq!(goals[3].kind, GoalKind::FourOfFour { day: 1 });
        assert_eq!(goals[9].kind, GoalKind::FourOfFour { day: 7 });
        assert!(goals.iter().all(|goal| goal.earnings == Dollars::ZERO));
    }

    #[test]
    fn perfect_week_earns_every_goal() {
        let tests = week(1..=7, 4);
        let goals = compute_goals(&refs(&tests), &period(Scheme::Legacy, 1), 999);

        let total: Dollars = goals.iter().map(|goal| goal.earnings).sum();
        assert_eq!(total, Dollars(32.0));
        assert_eq!(goals.iter().filter(|goal| goal.completed).count(), 9);
        // latest test is day 7 session 3
        assert_eq!(goals[1].completed_on, Some(73));
    }

    #[test]
    fn twenty_one_progress_truncates() {
        let tests = week(1..=5, 4);
        let goal = twenty_one_sessions(&refs(&tests), &period(Scheme::Legacy, 1), 0);
        assert_eq!(goal.progress, 95);
        assert!(!goal.completed);
        assert_eq!(goal.completed_on, None);
        assert_eq!(goal.earnings, Dollars::ZERO);
    }

    #[test]
    fn all_sessions_caps_payout_at_28() {
        let tests = week(0..=9, 4);
        let legacy = all_sessions(&refs(&tests), &period(Scheme::Legacy, 1));
        assert_eq!(legacy.earnings, Dollars(14.0));
        assert_eq!(legacy.progress, 100);
        assert_eq!(legacy.progress_components, vec![40]);
        assert!(!legacy.completed);

        let burst = all_sessions(&refs(&tests), &period(Scheme::StudyBurst, 0));
        assert_eq!(burst.progress_components, vec![28]);
    }

    #[test]
    fn all_sessions_progress_rounds() {
        let tests = week(1..=1, 3);
        let goal = all_sessions(&refs(&tests), &period(Scheme::Legacy, 1));
        // 300 / 28 = 10.7
        assert_eq!(goal.progress, 11);
        assert_eq!(goal.earnings, Dollars(1.5));
    }

    #[test]
    fn two_a_day_uses_baseline_day_window() {
        let tests = week(1..=6, 2);
        let goal = two_a_day(&refs(&tests), &period(Scheme::Legacy, 1), 0);
        assert_eq!(goal.progress_components, vec![100, 100, 100, 100, 100, 100, 0]);
        assert_eq!(goal.progress, 85);
        assert!(!goal.completed);

        let shifted = two_a_day(&refs(&tests), &period(Scheme::StudyBurst, 0), 0);
        assert_eq!(shifted.progress_components, vec![0, 100, 100, 100, 100, 100, 100]);
    }

    #[test]
    fn four_of_four_needs_every_session_index() {
        let tests = vec![
            CompletedTest::in_week(0, 2, 0, 1.0),
            CompletedTest::in_week(0, 2, 1, 2.0),
            CompletedTest::in_week(0, 2, 2, 3.0),
            CompletedTest::in_week(0, 2, 5, 4.0),
        ];
        let goal = four_of_four(&refs(&tests), 2, 0);
        assert_eq!(goal.progress_components, vec![100, 100, 100, 0]);
        assert_eq!(goal.progress, 75);
        assert!(!goal.completed);

        let mut full = tests.clone();
        full.push(CompletedTest::in_week(0, 2, 3, 8.0));
        let goal = four_of_four(&refs(&full), 2, 0);
        assert!(goal.completed);
        assert_eq!(goal.completed_on, Some(8));
        assert_eq!(goal.earnings, Dollars(1.0));
    }

    #[test]
    fn completion_time_falls_back_to_evaluation_time() {
        let tests: Vec<CompletedTest> = week(1..=7, 3)
            .into_iter()
            .map(|mut test| {
                test.completed_on = f64::NAN;
                test
            })
            .collect();
        let goal = twenty_one_sessions(&refs(&tests), &period(Scheme::Legacy, 1), 1_234);
        assert!(goal.completed);
        assert_eq!(goal.completed_on, Some(1_234));
    }

    #[test]
    fn truncated_percent_is_floor_and_capped() {
        assert_eq!(truncated_percent(20, 21), 95);
        assert_eq!(truncated_percent(6, 7), 85);
        assert_eq!(truncated_percent(30, 21), 100);
        assert_eq!(truncated_percent(3, 0), 0);
    }
}
