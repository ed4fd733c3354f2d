//! Self-healing: classify a failed sample, try reversible fixes from the
//! catalog, keep the first one a majority of live samples agree with.

mod classify;
mod commit;
mod controller;
mod fix;
mod fixture;
mod history;
mod infer;
mod strategy;
mod verify;

pub use classify::{classify, Classification, FailureCategory};
pub use commit::{commit_message, Committer, GitCommitter};
pub use controller::{HealOptions, HealResult, Healer};
pub use fix::{Fix, Patch};
pub use fixture::{ExpectedValues, FixturePair, FixtureWriter};
pub use history::{HistoryEntry, HistoryLog};
pub use infer::infer_date_format;
pub use strategy::{
    strategies_for, FailureContext, Strategy, BROAD_PERCENT_TOKEN, BROAD_PERCENT_USED,
    RELAXED_RESET_TOKEN,
};
pub use verify::{verify, VerifyOutcome, VerifyPlan};
