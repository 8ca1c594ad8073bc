use std::fmt::Write;

use chrono::{DateTime, Duration, FixedOffset};

use crate::models::{Dollars, EarningDetails, EarningOverview, GoalKind, StudySummary};
use crate::schedule::Period;

/// Stored earnings may end with one extra empty cycle written in either
/// decimal notation.
const ZERO_EARNINGS: [&str; 2] = ["$0.00", "$0,00"];

#[derive(Debug, Clone, PartialEq)]
pub struct AdherenceRow {
    pub cycle: usize,
    pub start_date: String,
    pub end_date: String,
    /// Share of paid sessions completed, e.g. `75%`.
    pub adherence: String,
    pub earned: Dollars,
}

/// One row per scheduled period. Periods that have not started yet read as
/// `00%` and `$0.00`.
pub fn adherence_rows(scheduled: &[Period], details: &EarningDetails) -> Vec<AdherenceRow> {
    scheduled
        .iter()
        .enumerate()
        .map(|(cycle, period)| {
            let earned = details.cycles.get(cycle);
            let adherence = earned
                .and_then(|cycle| cycle.detail(GoalKind::ALL_SESSIONS))
                .map(|goal| goal.progress)
                .unwrap_or(0);

            AdherenceRow {
                cycle,
                start_date: format_date(period.start),
                end_date: format_date(period.start + Duration::days(7)),
                adherence: format!("{adherence:02}%"),
                earned: earned.map(|cycle| cycle.total).unwrap_or(Dollars::ZERO),
            }
        })
        .collect()
}

fn format_date(at: DateTime<FixedOffset>) -> String {
    at.format("%m/%d/%Y").to_string()
}

pub fn build_report(
    participant: Option<&str>,
    now: DateTime<FixedOffset>,
    overview: &EarningOverview,
    summary: &StudySummary,
    rows: &[AdherenceRow],
) -> String {
    let mut output = String::new();
    let participant_label = participant.unwrap_or("participant");

    let _ = writeln!(output, "# Adherence Earnings Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        participant_label,
        now.format("%Y-%m-%d %H:%M %:z")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Cycle");
    let _ = writeln!(
        output,
        "- Cycle {} earned {} ({} total)",
        overview.cycle, overview.cycle_earnings, overview.total_earnings
    );

    for goal in overview.goals.iter() {
        let status = if goal.completed { "complete" } else { "in progress" };
        let _ = writeln!(
            output,
            "- {}: {}% {} ({} earned)",
            goal.name(),
            goal.progress,
            status,
            goal.earnings
        );
    }

    if !overview.new_achievements.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## New Achievements");
        for achievement in overview.new_achievements.iter() {
            let _ = writeln!(output, "- {} ({})", achievement.name, achievement.amount_earned);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Study Summary");
    let _ = writeln!(output, "- Total earnings: {}", summary.total_earnings);
    let _ = writeln!(output, "- Tests taken: {}", summary.tests_taken);
    let _ = writeln!(output, "- Days tested: {}", summary.days_tested);
    let _ = writeln!(output, "- Goals met: {}", summary.goals_met);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cycles");

    if rows.is_empty() {
        let _ = writeln!(output, "No cycles scheduled.");
    } else {
        let _ = writeln!(output, "| Cycle | Start Date | End Date | Adherence | Earned |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for row in rows {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                row.cycle, row.start_date, row.end_date, row.adherence, row.earned
            );
        }
    }

    output
}

/// Whether earnings stored for a participant agree with a recomputation.
///
/// The stored list may carry one extra trailing `$0.00` cycle, and amounts
/// written with a decimal comma compare equal to their dot form.
pub fn earnings_match(computed: &[Dollars], stored: Option<&[String]>) -> bool {
    let Some(stored) = stored else {
        return computed.is_empty();
    };

    if computed.len() != stored.len() {
        let trailing_zero = stored
            .last()
            .map(|last| ZERO_EARNINGS.contains(&last.trim()))
            .unwrap_or(false);
        if computed.len() + 1 != stored.len() || !trailing_zero {
            return false;
        }
    }

    computed
        .iter()
        .zip(stored)
        .all(|(computed, stored)| computed.to_string() == stored.trim().replace(',', "."))
}
