pub mod config;
pub mod evaluator;
pub mod roster;

pub use config::{CountRule, FlagRule, Operator, RuleConfig};
pub use evaluator::{evaluate, Evaluation};
pub use roster::Roster;
