//! Declaration language for study variables
//!
//! Relative dates, time windows, predicates, categorisation rules and
//! return expectations, plus the source operations that combine them into
//! variable declarations.

pub mod categorise;
pub mod date_expr;
pub mod expectations;
pub mod patients;
pub mod predicate;
pub mod source;
pub mod variable;
pub mod window;

// Re-export commonly used types
pub use categorise::{Categorise, CategoryLabel, CategoryRule};
pub use date_expr::{DateExpr, DateLookup, DateUnit, Offset};
pub use expectations::{DateExpectation, Distribution, ExpectedDate, Rate, ReturnExpectations};
pub use patients::{MatchSelection, Windowed};
pub use predicate::{Predicate, ValueLookup};
pub use source::{LabelSet, MatchPolicy, ReturnShape, Source};
pub use variable::VariableSpec;
pub use window::{ResolvedWindow, TimeWindow};
