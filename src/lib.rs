//! Adherence earnings engine.
//!
//! Turns a participant's completed cognitive test sessions into payment
//! goals, per-period earnings and a study summary. Completed tests are
//! normalized first (duplicates, mislabeled weeks, the baseline tutorial),
//! then partitioned into scheduled periods and scored.
//!
//! [`controller::EarningsController`] is the entry point for hosts that keep
//! one engine per participant. The free functions in [`earnings`] run a
//! single stateless calculation.

pub mod achievements;
pub mod config;
pub mod controller;
pub mod earnings;
pub mod error;
pub mod goals;
pub mod input;
pub mod models;
pub mod normalize;
pub mod report;
pub mod schedule;

pub use config::StudyConfig;
pub use controller::EarningsController;
pub use error::{EngineError, Result};
pub use models::{
    Achievement, ArcSchedule, CompletedTest, Cycle, CycleGoal, Dollars, EarningDetails,
    EarningOverview, Goal, GoalKind, PeriodKey, StudyBurst, StudyBurstSchedule,
    StudyBurstSession, StudySummary,
};
pub use schedule::{Period, PeriodSchedule, Scheme, Timeline};
