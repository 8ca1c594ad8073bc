use std::collections::HashSet;

use crate::models::{ArcSchedule, CompletedTest, PeriodKey};
use crate::schedule::PeriodSchedule;

/// Weeks within this distance of a scheduled week are snapped onto it.
pub const WEEK_SNAP_TOLERANCE: i32 = 2;

/// Valid day indices inside a study burst are `0..DAYS_IN_STUDY_BURST`.
pub const DAYS_IN_STUDY_BURST: i32 = 7;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTests {
    pub tests: Vec<CompletedTest>,
    /// The tutorial test taken on the baseline day, kept out of scoring.
    pub baseline: Option<CompletedTest>,
}

/// Cleans raw client submissions according to the schedule's period scheme.
pub fn normalize(
    tests: &[CompletedTest],
    schedule: &PeriodSchedule,
    alternative: Option<&ArcSchedule>,
) -> NormalizedTests {
    match schedule {
        PeriodSchedule::ArcStartDays(arcs) => normalize_legacy(tests, arcs, alternative),
        PeriodSchedule::StudyBursts(_) => NormalizedTests {
            tests: normalize_bursts(tests),
            baseline: None,
        },
    }
}

/// Legacy week-labelled tests.
///
/// iOS labels every period after the first one week off, and Android reports
/// the last day of the baseline week as week 1, so week numbers close to a
/// scheduled week are snapped onto it before duplicates are removed.
pub fn normalize_legacy(
    tests: &[CompletedTest],
    arcs: &ArcSchedule,
    alternative: Option<&ArcSchedule>,
) -> NormalizedTests {
    let expected = arcs.weeks();
    let backup = alternative.map(ArcSchedule::weeks).unwrap_or_default();

    let mut seen = HashSet::new();
    let mut converted = Vec::with_capacity(tests.len());

    for test in tests {
        let mut test = test.clone();
        if let PeriodKey::Week(week) = test.period_key {
            let snapped = snap_week(week, &expected, &backup);
            if snapped != week {
                tracing::debug!(
                    from = week,
                    to = snapped,
                    day = test.day,
                    session = test.session,
                    "snapped mislabeled week"
                );
                test.period_key = PeriodKey::Week(snapped);
            }
        }

        if seen.insert((test.period_key.clone(), test.day, test.session)) {
            converted.push(test);
        } else {
            tracing::trace!(
                key = %test.period_key,
                day = test.day,
                session = test.session,
                "dropped duplicate test"
            );
        }
    }

    let baseline = converted.iter().find(|test| is_baseline(test)).cloned();
    converted.retain(|test| !is_baseline_day(test));

    NormalizedTests {
        tests: converted,
        baseline,
    }
}

/// Study burst tests: exact event id matching, duplicates and days outside
/// the burst window are dropped.
pub fn normalize_bursts(tests: &[CompletedTest]) -> Vec<CompletedTest> {
    let mut seen = HashSet::new();
    let mut converted = Vec::with_capacity(tests.len());

    for test in tests {
        if !(0..DAYS_IN_STUDY_BURST).contains(&test.day) {
            tracing::debug!(
                key = %test.period_key,
                day = test.day,
                "dropped test outside burst days"
            );
            continue;
        }
        if seen.insert(test.key()) {
            converted.push(test.clone());
        }
    }

    converted
}

/// Snaps a week onto the closest acceptable scheduled week, falling back to the
/// alternative schedule at the same index. The later index wins when several
/// weeks are in range.
pub fn snap_week(week: i32, expected: &[i32], backup: &[i32]) -> i32 {
    if expected.contains(&week) {
        return week;
    }

    let within = |scheduled: i32| {
        (i64::from(week) - i64::from(scheduled)).abs() <= i64::from(WEEK_SNAP_TOLERANCE)
    };

    let mut snapped = week;
    for (index, &expected_week) in expected.iter().enumerate() {
        if within(expected_week) || backup.get(index).is_some_and(|&backup| within(backup)) {
            snapped = expected_week;
        }
    }
    snapped
}

fn is_baseline_day(test: &CompletedTest) -> bool {
    test.period_key == PeriodKey::Week(0) && test.day == 0
}

fn is_baseline(test: &CompletedTest) -> bool {
    is_baseline_day(test) && test.session == 0
}
