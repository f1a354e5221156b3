//! Parlance Context — token counting and budgeted-context selection.

pub mod budget;
pub mod counter;

pub use budget::{budget_context, BudgetConfig};
pub use counter::{CharEstimate, HfCounter, TokenCounter};
