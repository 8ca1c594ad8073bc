use crate::models::{Achievement, Goal, GoalKind};

/// Goals that unlock an achievement when they flip to completed.
pub const ACHIEVEMENT_GOALS: [&str; 3] = [
    GoalKind::TWO_A_DAY,
    GoalKind::TWENTY_ONE_SESSIONS,
    GoalKind::FOUR_OUT_OF_FOUR,
];

/// Compares two overview goal lists and reports goals that went from
/// incomplete to complete.
///
/// Goals are matched by name only, so at most one 4-out-of-4 transition is
/// reported per comparison. A goal missing from either side never unlocks.
pub fn new_achievements(previous: &[Goal], current: &[Goal]) -> Vec<Achievement> {
    ACHIEVEMENT_GOALS
        .iter()
        .filter_map(|&name| {
            let before = previous.iter().find(|goal| goal.name() == name)?;
            let after = current.iter().find(|goal| goal.name() == name)?;
            (!before.completed && after.completed).then(|| {
                tracing::debug!(goal = name, "achievement unlocked");
                Achievement {
                    name: name.to_string(),
                    amount_earned: after.value(),
                }
            })
        })
        .collect()
}
