// SPDX-License-Identifier: MIT

//! Installer conditions
//!
//! This module provides the condition model, the compact expression parser
//! and the evaluator. Expressions combine registered condition ids:
//! - `a+b` both are true
//! - `a|b` at least one is true
//! - `a\b` exactly one is true
//! - `!a` negation, only as the first character of a (sub-)expression
//!
//! Operators are right-folded without precedence, so `a+b|c` reads as
//! `a+(b|c)`.

mod ast;
mod evaluator;
mod parser;
pub mod version;

pub use ast::{
    Condition, ConditionKind, DynamicProbe, EmptyKind, ExistsKind, Operand, Operator, PackMatch,
};
pub use evaluator::evaluate;
pub use parser::{parse, MAX_OPERATORS};
