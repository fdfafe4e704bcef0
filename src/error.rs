use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::operator::Operator;

/// Everything that can go wrong between the raw text and the final value.
///
/// Spans point into the expression text; attach it with
/// [`miette::Report::with_source_code`] to get a rendered report.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unexpected token '{token}'")]
    #[diagnostic(
        code(math_parser::lex),
        help("`{token}` is not an operator, a number, or a known variable")
    )]
    Lex {
        token: String,
        #[label("this token")]
        span: SourceSpan,
    },

    #[error("Dangling `.` in '{joined}'")]
    #[diagnostic(
        code(math_parser::dot_join),
        help("a `.` must join two parts of a known variable name, like `a.b`")
    )]
    DotJoin {
        joined: String,
        #[label("no variable is named like this")]
        span: SourceSpan,
    },

    #[error("Unbalanced grouping: {reason}")]
    #[diagnostic(code(math_parser::unbalanced_grouping))]
    UnbalancedGrouping {
        reason: &'static str,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("Groups nested deeper than {limit} levels")]
    #[diagnostic(
        code(math_parser::nesting_too_deep),
        help("split the expression or drop redundant parentheses")
    )]
    NestingTooDeep {
        limit: usize,
        #[label("this scope is one level too deep")]
        span: SourceSpan,
    },

    #[error("Nothing to compute")]
    #[diagnostic(
        code(math_parser::empty_expression),
        help("put an expression between the parentheses")
    )]
    EmptyExpression {
        #[label("this scope is empty")]
        span: SourceSpan,
    },

    #[error("Can't assign to '{target}'")]
    #[diagnostic(
        code(math_parser::non_reference_assignment),
        help("only a variable can stand on the left of `=`")
    )]
    NonReferenceAssignment {
        target: String,
        #[label("not a variable")]
        span: SourceSpan,
    },

    #[error("Can't assign a float to integer variable '{name}'")]
    #[diagnostic(
        code(math_parser::narrowing_without_function),
        help("wrap the value in `round`, `floor`, `ceil`, `trunc` or `sqrt` to convert it")
    )]
    NarrowingWithoutFunction {
        name: String,
        #[label("this assignment")]
        span: SourceSpan,
    },

    #[error("Operator `{op}` is not defined for floats")]
    #[diagnostic(
        code(math_parser::type_mismatch_operator),
        help("`!`, `|` and `&` only work on integer operands")
    )]
    TypeMismatchOperator {
        op: Operator,
        #[label("float operands here")]
        span: SourceSpan,
    },

    #[error("Division by zero")]
    #[diagnostic(
        code(math_parser::division_by_zero),
        help("integer division needs a non-zero divisor; use a float to get infinity")
    )]
    DivisionByZero {
        #[label("this division")]
        span: SourceSpan,
    },

    #[error("Expected a value")]
    #[diagnostic(code(math_parser::missing_operand))]
    MissingOperand {
        #[label("a value should be here")]
        span: SourceSpan,
    },

    #[error("Expected an operator")]
    #[diagnostic(code(math_parser::missing_operator))]
    MissingOperator {
        #[label("an operator should be here")]
        span: SourceSpan,
    },
}

impl EvalError {
    /// True for failures found before evaluation started.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            EvalError::Lex { .. }
                | EvalError::DotJoin { .. }
                | EvalError::UnbalancedGrouping { .. }
                | EvalError::NestingTooDeep { .. }
        )
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            EvalError::Lex { span, .. }
            | EvalError::DotJoin { span, .. }
            | EvalError::UnbalancedGrouping { span, .. }
            | EvalError::NestingTooDeep { span, .. }
            | EvalError::EmptyExpression { span }
            | EvalError::NonReferenceAssignment { span, .. }
            | EvalError::NarrowingWithoutFunction { span, .. }
            | EvalError::TypeMismatchOperator { span, .. }
            | EvalError::DivisionByZero { span }
            | EvalError::MissingOperand { span }
            | EvalError::MissingOperator { span } => *span,
        }
    }
}
