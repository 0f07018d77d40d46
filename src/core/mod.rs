// core logic - classification, policy and the guarded connection

mod classify;
mod db;
mod engine;
mod param;
mod policy;
mod predicate;
mod rows;
mod shadow;
mod trace;

pub use classify::{
    Classified, StatementKind, Target, classify, is_always_true_where, is_dangerous_delete,
    is_delete_without_where, is_drop_query, split,
};
pub use db::{Database, Outcome, Skip};
pub use param::Param;
pub use policy::{Decision, DenyReason, ErrorMode, Policy, decide};
pub use predicate::{Predicate, PredicateShape, analyze};
pub use rows::{QueryResult, RowFactory, Records, Tuples};
pub use trace::{LogTrace, TraceSink};
