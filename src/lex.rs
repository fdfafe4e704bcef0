use std::{borrow::Cow, fmt::Display, iter::Peekable};

use miette::SourceSpan;

use crate::{
    error::EvalError,
    operator::{DOUBLE_SYMBOLS, Operator},
    store::{Stores, VariableStore},
};

/// A number in one of the two domains the engine computes in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    /// The value in the float domain, widening integers.
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(n) => n as f64,
            Numeric::Float(n) => n,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Numeric::Float(_))
    }
}

impl Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Numeric::Int(n) => write!(f, "{n}"),
            Numeric::Float(n) if n.is_finite() && n == n.trunc() => write!(f, "{n}.0"),
            Numeric::Float(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    /// A literal number, or a variable (`reference`) holding that number.
    Value { reference: bool, value: Numeric },
    /// A binary operator.
    Op(Operator),
    /// Opens a new scope: `(` or `=`.
    GroupOpen(Operator),
    /// `)`
    GroupClose,
    /// `sqrt`, `floor`, `ceil`, `round` or `trunc`, applied to the next scope.
    ContextFn(Operator),
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: Cow<'de, str>,
    pub span: SourceSpan,
}

impl<'de> Token<'de> {
    /// A computed value with no variable behind it.
    pub fn value(value: Numeric, span: SourceSpan) -> Self {
        Token {
            kind: TokenKind::Value {
                reference: false,
                value,
            },
            literal: Cow::Owned(value.to_string()),
            span,
        }
    }

    fn implicit_multiply(span: SourceSpan) -> Self {
        Token {
            kind: TokenKind::Op(Operator::Multiply),
            literal: Cow::Borrowed("*"),
            span: SourceSpan::from(span.offset()..span.offset()),
        }
    }

    pub fn operator(&self) -> Option<Operator> {
        match self.kind {
            TokenKind::Op(op) | TokenKind::GroupOpen(op) | TokenKind::ContextFn(op) => Some(op),
            TokenKind::GroupClose => Some(Operator::CloseParen),
            TokenKind::Value { .. } | TokenKind::Invalid => None,
        }
    }

    /// Precedence of the token when it sits between two operands. Values weigh 0.
    pub fn weight(&self) -> i32 {
        self.operator().map_or(0, Operator::weight)
    }

    pub fn numeric(&self) -> Option<Numeric> {
        match self.kind {
            TokenKind::Value { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, TokenKind::Value { reference: true, .. })
    }

    pub fn is_float(&self) -> bool {
        self.numeric().is_some_and(Numeric::is_float)
    }

    pub fn is_int(&self) -> bool {
        matches!(self.numeric(), Some(Numeric::Int(_)))
    }

    /// True when an implicit `*` may follow this token.
    fn ends_operand(&self) -> bool {
        matches!(self.kind, TokenKind::Value { .. } | TokenKind::GroupClose)
    }

    /// True when an implicit `*` may precede this token.
    fn starts_operand(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Value { .. }
                | TokenKind::ContextFn(_)
                | TokenKind::GroupOpen(Operator::OpenParen)
        )
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = &self.literal;
        match self.kind {
            TokenKind::Value {
                reference: false,
                value: value @ Numeric::Int(_),
            } => write!(f, "INT {lit} {value}"),
            TokenKind::Value {
                reference: false,
                value: value @ Numeric::Float(_),
            } => write!(f, "FLOAT {lit} {value}"),
            TokenKind::Value {
                reference: true,
                value: value @ Numeric::Int(_),
            } => write!(f, "INT_REF {lit} {value}"),
            TokenKind::Value {
                reference: true,
                value: value @ Numeric::Float(_),
            } => write!(f, "FLOAT_REF {lit} {value}"),
            TokenKind::Op(op) => write!(f, "OPERATOR {lit} {op:?}"),
            TokenKind::GroupOpen(op) => write!(f, "OPEN {lit} {op:?}"),
            TokenKind::GroupClose => write!(f, "CLOSE {lit} null"),
            TokenKind::ContextFn(op) => write!(f, "FUNCTION {lit} {op:?}"),
            TokenKind::Invalid => write!(f, "INVALID {lit} null"),
        }
    }
}

/// One raw piece of input text, before classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment<'de> {
    pub text: &'de str,
    pub span: SourceSpan,
}

/// Splits input into operator symbols, digit runs and letter runs.
///
/// Whitespace is skipped. Any other character comes out as a fragment of its
/// own so classification can reject it with a proper span.
pub struct Fragments<'de> {
    rest: &'de str,
    byte: usize,
}

impl<'de> Fragments<'de> {
    pub fn new(input: &'de str) -> Self {
        Fragments {
            rest: input,
            byte: 0,
        }
    }
}

impl<'de> Iterator for Fragments<'de> {
    type Item = Fragment<'de>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let c = self.rest.chars().next()?;
            let cur = self.rest;

            let len = match c {
                c if c.is_whitespace() => {
                    self.rest = &cur[c.len_utf8()..];
                    self.byte += c.len_utf8();
                    continue;
                }
                '0'..='9' | '.' | ',' => cur
                    .find(|c: char| !matches!(c, '0'..='9' | '.' | ','))
                    .unwrap_or(cur.len()),
                c if c.is_ascii_alphabetic() => cur
                    .find(|c: char| !c.is_ascii_alphabetic())
                    .unwrap_or(cur.len()),
                _ if DOUBLE_SYMBOLS.iter().any(|s| cur.starts_with(s)) => 2,
                c => c.len_utf8(),
            };

            let start = self.byte;
            self.rest = &cur[len..];
            self.byte += len;
            return Some(Fragment {
                text: &cur[..len],
                span: SourceSpan::from(start..self.byte),
            });
        }
    }
}

/// Turns fragments into tokens, resolving names against the variable stores.
pub struct Lexer<'de, 'a> {
    fragments: Peekable<Fragments<'de>>,
    floats: &'a dyn VariableStore<f64>,
    ints: &'a dyn VariableStore<i64>,
}

impl<'de, 'a> Lexer<'de, 'a> {
    pub fn new(input: &'de str, stores: &'a Stores<'_>) -> Self {
        Lexer {
            fragments: Fragments::new(input).peekable(),
            floats: &*stores.floats,
            ints: &*stores.ints,
        }
    }

    /// Classifies one piece of text.
    ///
    /// Operators win over numbers, numbers over names, and the float store
    /// over the int store for a name defined in both.
    pub fn classify(&self, literal: Cow<'de, str>, span: SourceSpan) -> Token<'de> {
        let kind = if let Some(op) = Operator::resolve(&literal) {
            if op.is_context_function() {
                TokenKind::ContextFn(op)
            } else if op.is_open() {
                TokenKind::GroupOpen(op)
            } else if op.is_close() {
                TokenKind::GroupClose
            } else {
                TokenKind::Op(op)
            }
        } else if let Ok(n) = literal.parse::<i64>() {
            TokenKind::Value {
                reference: false,
                value: Numeric::Int(n),
            }
        } else if let Some(n) = parse_float(&literal) {
            TokenKind::Value {
                reference: false,
                value: Numeric::Float(n),
            }
        } else if let Some(n) = self.floats.lookup(&literal) {
            TokenKind::Value {
                reference: true,
                value: Numeric::Float(n),
            }
        } else if let Some(n) = self.ints.lookup(&literal) {
            TokenKind::Value {
                reference: true,
                value: Numeric::Int(n),
            }
        } else {
            TokenKind::Invalid
        };

        Token {
            kind,
            literal,
            span,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token<'de>>, EvalError> {
        let mut tokens: Vec<Token<'de>> = Vec::new();

        while let Some(fragment) = self.fragments.next() {
            let token = self.classify(Cow::Borrowed(fragment.text), fragment.span);
            let token = match token.kind {
                // The first part of a dotted name is usually not a variable itself.
                TokenKind::Invalid if self.fragments.peek().is_some_and(|f| f.text == ".") => {
                    tokens.push(token);
                    continue;
                }
                TokenKind::Invalid => {
                    return Err(EvalError::Lex {
                        token: fragment.text.to_string(),
                        span: fragment.span,
                    });
                }
                TokenKind::Op(Operator::Dot) => {
                    let Some(previous) = tokens.pop() else {
                        return Err(EvalError::DotJoin {
                            joined: ".".to_string(),
                            span: fragment.span,
                        });
                    };
                    self.join_dotted(previous, fragment.span)?
                }
                _ => token,
            };

            if tokens
                .last()
                .is_some_and(|last| last.ends_operand() && token.starts_operand())
            {
                tracing::trace!(before = %token.literal, "inserting implicit multiplication");
                tokens.push(Token::implicit_multiply(token.span));
            }
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Glues `previous . next [. next ...]` until the joined text classifies.
    fn join_dotted(
        &mut self,
        previous: Token<'de>,
        dot: SourceSpan,
    ) -> Result<Token<'de>, EvalError> {
        let start = previous.span.offset();
        let mut end = dot.offset() + dot.len();
        let mut joined = previous.literal.into_owned();

        loop {
            joined.push('.');
            let Some(next) = self.fragments.next() else {
                return Err(EvalError::DotJoin {
                    joined,
                    span: SourceSpan::from(start..end),
                });
            };
            joined.push_str(next.text);
            end = next.span.offset() + next.span.len();

            let token = self.classify(Cow::Owned(joined.clone()), SourceSpan::from(start..end));
            if token.kind != TokenKind::Invalid {
                tracing::trace!(name = %token.literal, "joined dotted name");
                return Ok(token);
            }

            if self.fragments.next_if(|f| f.text == ".").is_none() {
                return Err(EvalError::DotJoin {
                    joined,
                    span: SourceSpan::from(start..end),
                });
            }
        }
    }
}

/// Float literals come from digit runs only, so names like `inf` or `nan`
/// stay names. `,` is read as a thousands separator.
///
/// A digit run too large for `i64` also lands here and becomes a float, so
/// `9223372036854775808` (and `-9223372036854775808`, a sign plus that run)
/// evaluates to a float rather than `i64::MIN`.
fn parse_float(text: &str) -> Option<f64> {
    if !text.bytes().any(|b| b.is_ascii_digit())
        || !text.bytes().all(|b| b.is_ascii_digit() || b == b'.' || b == b',')
    {
        return None;
    }
    text.replace(',', "").parse().ok()
}

/// Lexes `input` against `stores`.
pub fn tokenize<'de>(input: &'de str, stores: &Stores<'_>) -> Result<Vec<Token<'de>>, EvalError> {
    Lexer::new(input, stores).tokenize()
}
