// sqlward library - guarded sqlite execution

pub mod cli;
mod core;
mod error;
mod output;
mod server;

pub use self::core::{
    Classified, Database, Decision, DenyReason, ErrorMode, LogTrace, Outcome, Param, Policy,
    Predicate, PredicateShape, QueryResult, Records, RowFactory, Skip, StatementKind, Target,
    TraceSink, Tuples, analyze, classify, decide, is_always_true_where, is_dangerous_delete,
    is_delete_without_where, is_drop_query, split,
};
pub use error::Error;
pub use server::Server;
