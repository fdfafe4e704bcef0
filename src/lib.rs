//! A small expression engine over caller-owned integer and float variables.
//!
//! Text is lexed into [`Token`]s, folded into a [`ContextTree`] of nested
//! scopes, and reduced to one value by the [`Evaluator`]. Assignments write
//! straight into the caller's [`VariableStore`]s.
//!
//! ```
//! use std::collections::HashMap;
//!
//! use math_parser::{Numeric, parse_and_evaluate};
//!
//! let mut floats: HashMap<String, f64> = HashMap::new();
//! let mut ints: HashMap<String, i64> = HashMap::from([("x".to_string(), 0)]);
//!
//! let result = parse_and_evaluate("x = round(5.7)", &mut floats, &mut ints).unwrap();
//! assert_eq!(result.value, Numeric::Int(6));
//! assert_eq!(ints["x"], 6);
//! ```

pub mod error;
pub mod eval;
pub mod lex;
pub mod operator;
pub mod parse;
pub mod store;

pub use error::EvalError;
pub use eval::{Assignment, Evaluation, Evaluator};
pub use lex::{Lexer, Numeric, Token, TokenKind, tokenize};
pub use operator::Operator;
pub use parse::{Context, ContextTree, Parser, Piece, build_tree};
pub use store::{Stores, VariableStore};

/// Lexes, builds and evaluates `text` in one go.
///
/// Variable writes made before a failure stay in the stores.
#[tracing::instrument(level = "debug", skip(floats, ints))]
pub fn parse_and_evaluate<'de>(
    text: &'de str,
    floats: &mut dyn VariableStore<f64>,
    ints: &mut dyn VariableStore<i64>,
) -> Result<Evaluation<'de>, EvalError> {
    let mut stores = Stores::new(floats, ints);
    let tokens = tokenize(text, &stores)?;
    let tree = build_tree(tokens)?;
    tracing::trace!(%tree, "built context tree");
    Evaluator::new(&mut stores).evaluate(&tree)
}
