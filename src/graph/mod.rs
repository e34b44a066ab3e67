//! Build graph: rules with declared inputs and outputs, the compiler that
//! derives them from a job, and the maker that runs them.

pub mod compiler;
pub mod maker;
pub mod rule;

pub use compiler::{list_rule_name, resolve_rule_name, GraphCompiler, SCAN_RULE};
pub use maker::{is_up_to_date, CancelHandle, Maker, RunReport};
pub use rule::{Action, ActionOutput, BuildGraph, BuildRule};
