use std::borrow::Cow;

use miette::SourceSpan;

use crate::{
    error::EvalError,
    lex::{Numeric, Token, TokenKind},
    operator::Operator,
    parse::{Context, ContextId, ContextTree, Piece},
    store::Stores,
};

/// A variable write performed by a top-level assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    /// The value as stored, in the variable's own kind.
    pub value: Numeric,
}

/// Result of evaluating one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<'de> {
    pub token: Token<'de>,
    pub value: Numeric,
    /// Set when the expression as a whole was an assignment, e.g. `x=5` or
    /// `(x=5)`, but not `(x=5)+1`.
    pub assignment: Option<Assignment>,
}

/// Reduces a [`ContextTree`] to a single value.
///
/// Variable writes happen as soon as an assignment is reached. A failure
/// later in the same expression does not undo them.
pub struct Evaluator<'a, 's> {
    stores: &'a mut Stores<'s>,
}

impl<'a, 's> Evaluator<'a, 's> {
    pub fn new(stores: &'a mut Stores<'s>) -> Self {
        Evaluator { stores }
    }

    pub fn evaluate<'de>(
        &mut self,
        tree: &ContextTree<'de>,
    ) -> Result<Evaluation<'de>, EvalError> {
        let (token, assignment) = self.context(tree, ContextTree::ROOT)?;
        Ok(Evaluation {
            value: numeric(&token)?,
            token,
            assignment,
        })
    }

    fn context<'de>(
        &mut self,
        tree: &ContextTree<'de>,
        id: ContextId,
    ) -> Result<(Token<'de>, Option<Assignment>), EvalError> {
        let context = &tree[id];
        if context.pieces.is_empty() {
            return Err(EvalError::EmptyExpression { span: context.span });
        }

        let mut pos = 0;
        let (token, assignment) = self.climb(tree, context, &mut pos, Operator::NoOp.weight())?;

        if context.operator == Operator::NoOp {
            return Ok((token, assignment));
        }
        let value = numeric(&token)?.as_f64();
        let result = Numeric::Float(context.operator.apply_function(value));
        Ok((Token::value(result, context.span), None))
    }

    /// Folds `left op right op ...` starting at `pos`, consuming operators
    /// that bind tighter than `floor`.
    ///
    /// When the operator after the right operand binds tighter than the
    /// current one, the right operand is itself the suffix reduced with the
    /// current weight as its floor. Equal weights associate to the left.
    fn climb<'de>(
        &mut self,
        tree: &ContextTree<'de>,
        context: &Context<'de>,
        pos: &mut usize,
        floor: i32,
    ) -> Result<(Token<'de>, Option<Assignment>), EvalError> {
        let (mut left, mut assignment) = self.operand(tree, context, pos)?;

        while let Some(piece) = context.pieces.get(*pos) {
            let (op, op_span) = match piece {
                Piece::Literal(Token {
                    kind: TokenKind::Op(op),
                    span,
                    ..
                }) => (*op, *span),
                Piece::Literal(token) => {
                    return Err(EvalError::MissingOperator { span: token.span });
                }
                Piece::SubContext(child) => {
                    return Err(EvalError::MissingOperator {
                        span: tree[*child].span,
                    });
                }
            };
            if op.weight() <= floor {
                break;
            }
            *pos += 1;

            let (right, _) = self.climb(tree, context, pos, op.weight())?;
            left = combine(&left, op, op_span, &right)?;
            assignment = None;
        }

        Ok((left, assignment))
    }

    /// One operand: optional `+`/`-` signs, then a value, a group, or an
    /// assignment to the variable in front of `=`.
    fn operand<'de>(
        &mut self,
        tree: &ContextTree<'de>,
        context: &Context<'de>,
        pos: &mut usize,
    ) -> Result<(Token<'de>, Option<Assignment>), EvalError> {
        let mut negate = false;
        let mut sign_span = None;
        while let Some(Piece::Literal(Token {
            kind: TokenKind::Op(op @ (Operator::Add | Operator::Subtract)),
            span,
            ..
        })) = context.pieces.get(*pos)
        {
            negate ^= *op == Operator::Subtract;
            sign_span.get_or_insert(*span);
            *pos += 1;
        }

        let Some(piece) = context.pieces.get(*pos) else {
            let end = context.span.offset() + context.span.len();
            return Err(EvalError::MissingOperand {
                span: SourceSpan::from(end..end),
            });
        };
        *pos += 1;

        let (token, assignment) = match context.pieces.get(*pos) {
            Some(Piece::Literal(Token {
                kind: TokenKind::GroupOpen(Operator::Equals),
                ..
            })) => {
                let Some(Piece::SubContext(value)) = context.pieces.get(*pos + 1) else {
                    return Err(EvalError::MissingOperand {
                        span: piece_span(tree, piece),
                    });
                };
                *pos += 2;
                let (token, assignment) = self.assign(tree, context.operator, piece, *value)?;
                (token, Some(assignment))
            }
            _ => self.resolve(tree, piece)?,
        };

        if !negate {
            return Ok((token, assignment));
        }
        let value = match numeric(&token)? {
            Numeric::Int(n) => Numeric::Int(n.wrapping_neg()),
            Numeric::Float(n) => Numeric::Float(-n),
        };
        let span = cover(sign_span.unwrap_or(token.span), token.span);
        Ok((Token::value(value, span), None))
    }

    fn resolve<'de>(
        &mut self,
        tree: &ContextTree<'de>,
        piece: &Piece<'de>,
    ) -> Result<(Token<'de>, Option<Assignment>), EvalError> {
        match piece {
            Piece::SubContext(id) => self.context(tree, *id),
            Piece::Literal(
                token @ Token {
                    kind:
                        TokenKind::Value {
                            reference: true,
                            value,
                        },
                    ..
                },
            ) => {
                // Read the variable now: an earlier assignment in the same
                // expression may have changed it since lexing.
                let live = match value {
                    Numeric::Float(_) => {
                        self.stores.floats.lookup(&token.literal).map(Numeric::Float)
                    }
                    Numeric::Int(_) => self.stores.ints.lookup(&token.literal).map(Numeric::Int),
                };
                let kind = TokenKind::Value {
                    reference: true,
                    value: live.unwrap_or(*value),
                };
                Ok((
                    Token {
                        kind,
                        ..token.clone()
                    },
                    None,
                ))
            }
            Piece::Literal(token @ Token {
                kind: TokenKind::Value { .. },
                ..
            }) => Ok((token.clone(), None)),
            Piece::Literal(token) => Err(EvalError::MissingOperand { span: token.span }),
        }
    }

    /// Writes the value of context `value_id` into the variable `target`.
    ///
    /// A float goes into an int slot only through a context function: the
    /// assigned scope's own, or else `enclosing`, the function of the scope
    /// holding the `=`.
    fn assign<'de>(
        &mut self,
        tree: &ContextTree<'de>,
        enclosing: Operator,
        target: &Piece<'de>,
        value_id: ContextId,
    ) -> Result<(Token<'de>, Assignment), EvalError> {
        let target = match target {
            Piece::Literal(
                token @ Token {
                    kind: TokenKind::Value {
                        reference: true, ..
                    },
                    ..
                },
            ) => token,
            Piece::Literal(token) => {
                return Err(EvalError::NonReferenceAssignment {
                    target: token.literal.to_string(),
                    span: token.span,
                });
            }
            Piece::SubContext(id) => {
                return Err(EvalError::NonReferenceAssignment {
                    target: "(...)".to_string(),
                    span: tree[*id].span,
                });
            }
        };

        let (result, _) = self.context(tree, value_id)?;
        let result = numeric(&result)?;
        let name = target.literal.as_ref();
        let span = cover(target.span, tree[value_id].span);
        let not_a_variable = || EvalError::NonReferenceAssignment {
            target: name.to_string(),
            span: target.span,
        };

        let stored = match (target.kind, result) {
            (
                TokenKind::Value {
                    value: Numeric::Float(_),
                    ..
                },
                result,
            ) => {
                let slot = self
                    .stores
                    .floats
                    .try_get_slot(name)
                    .ok_or_else(not_a_variable)?;
                *slot = result.as_f64();
                Numeric::Float(*slot)
            }
            (_, Numeric::Int(n)) => {
                let slot = self.stores.ints.try_get_slot(name).ok_or_else(not_a_variable)?;
                *slot = n;
                Numeric::Int(n)
            }
            (_, Numeric::Float(n)) => {
                let function = match narrowing_function(tree, value_id) {
                    Operator::NoOp => enclosing,
                    function => function,
                };
                let narrowed = function.narrow(n).ok_or_else(|| {
                    EvalError::NarrowingWithoutFunction {
                        name: name.to_string(),
                        span,
                    }
                })?;
                let slot = self.stores.ints.try_get_slot(name).ok_or_else(not_a_variable)?;
                *slot = narrowed;
                Numeric::Int(narrowed)
            }
        };
        tracing::debug!(name, value = %stored, "assigned variable");

        Ok((
            Token::value(stored, span),
            Assignment {
                name: name.to_string(),
                value: stored,
            },
        ))
    }
}

fn piece_span(tree: &ContextTree<'_>, piece: &Piece<'_>) -> SourceSpan {
    match piece {
        Piece::Literal(token) => token.span,
        Piece::SubContext(id) => tree[*id].span,
    }
}

/// The context function that converts an assigned scope's float result to an
/// integer: the scope's own function, or that of the single group it wraps.
fn narrowing_function(tree: &ContextTree<'_>, id: ContextId) -> Operator {
    let context = &tree[id];
    match (context.operator, context.pieces.as_slice()) {
        (Operator::NoOp, [Piece::SubContext(child)]) => narrowing_function(tree, *child),
        (operator, _) => operator,
    }
}

fn numeric(token: &Token<'_>) -> Result<Numeric, EvalError> {
    token
        .numeric()
        .ok_or(EvalError::MissingOperand { span: token.span })
}

fn cover(start: SourceSpan, end: SourceSpan) -> SourceSpan {
    let from = start.offset().min(end.offset());
    let to = (start.offset() + start.len()).max(end.offset() + end.len());
    SourceSpan::from(from..to)
}

/// Applies a binary operator. Two integers stay integers; otherwise both
/// sides are widened to floats.
fn combine<'de>(
    left: &Token<'de>,
    op: Operator,
    op_span: SourceSpan,
    right: &Token<'de>,
) -> Result<Token<'de>, EvalError> {
    let span = cover(left.span, right.span);
    let value = match (numeric(left)?, numeric(right)?) {
        (Numeric::Int(a), Numeric::Int(b)) => Numeric::Int(int_op(a, op, b, op_span, span)?),
        (a, b) => {
            if op.is_integer_only() {
                return Err(EvalError::TypeMismatchOperator { op, span });
            }
            Numeric::Float(float_op(a.as_f64(), op, b.as_f64(), op_span)?)
        }
    };

    Ok(Token {
        kind: TokenKind::Value {
            reference: false,
            value,
        },
        literal: Cow::Owned(format!("{}{}{}", left.literal, op.symbol(), right.literal)),
        span,
    })
}

fn int_op(
    a: i64,
    op: Operator,
    b: i64,
    op_span: SourceSpan,
    span: SourceSpan,
) -> Result<i64, EvalError> {
    Ok(match op {
        Operator::Add => a.wrapping_add(b),
        Operator::Subtract => a.wrapping_sub(b),
        Operator::Multiply => a.wrapping_mul(b),
        Operator::Divide => {
            if b == 0 {
                return Err(EvalError::DivisionByZero { span });
            }
            a.wrapping_div(b)
        }
        Operator::Raise => match u32::try_from(b) {
            Ok(exp) => a.wrapping_pow(exp),
            Err(_) => (a as f64).powf(b as f64) as i64,
        },
        Operator::Smaller => i64::from(a < b),
        Operator::SmallerOrEqual => i64::from(a <= b),
        Operator::Larger => i64::from(a > b),
        Operator::LargerOrEqual => i64::from(a >= b),
        Operator::Not => i64::from(a != b),
        Operator::Or => a | b,
        Operator::And => a & b,
        _ => return Err(EvalError::MissingOperator { span: op_span }),
    })
}

fn float_op(a: f64, op: Operator, b: f64, op_span: SourceSpan) -> Result<f64, EvalError> {
    Ok(match op {
        Operator::Add => a + b,
        Operator::Subtract => a - b,
        Operator::Multiply => a * b,
        Operator::Divide => a / b,
        Operator::Raise => a.powf(b),
        Operator::Smaller => f64::from(u8::from(a < b)),
        Operator::SmallerOrEqual => f64::from(u8::from(a <= b)),
        Operator::Larger => f64::from(u8::from(a > b)),
        Operator::LargerOrEqual => f64::from(u8::from(a >= b)),
        _ => return Err(EvalError::MissingOperator { span: op_span }),
    })
}
