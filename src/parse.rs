use std::{fmt::Display, ops::Index};

use miette::SourceSpan;

use crate::{
    error::EvalError,
    lex::{Token, TokenKind},
    operator::Operator,
};

/// Index of a context in its [`ContextTree`]. Also its creation order.
pub type ContextId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum Piece<'de> {
    Literal(Token<'de>),
    /// A nested scope, owned by exactly one parent.
    SubContext(ContextId),
}

/// One scope of the expression: the whole input, a parenthesized group, or
/// the right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Context<'de> {
    pub id: ContextId,
    /// Context function applied to the scope's result, or `NoOp`.
    pub operator: Operator,
    pub pieces: Vec<Piece<'de>>,
    pub span: SourceSpan,
}

/// Contexts of one parse, stored flat. Index 0 is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextTree<'de> {
    contexts: Vec<Context<'de>>,
}

impl<'de> ContextTree<'de> {
    pub const ROOT: ContextId = 0;

    pub fn root(&self) -> &Context<'de> {
        &self.contexts[Self::ROOT]
    }

    pub fn get(&self, id: ContextId) -> Option<&Context<'de>> {
        self.contexts.get(id)
    }

    /// Every context, in creation order.
    pub fn contexts(&self) -> &[Context<'de>] {
        &self.contexts
    }

    fn write_context(&self, f: &mut std::fmt::Formatter<'_>, id: ContextId) -> std::fmt::Result {
        let context = &self.contexts[id];
        for (i, piece) in context.pieces.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match piece {
                Piece::Literal(token) => write!(f, "{}", token.literal)?,
                Piece::SubContext(child) => {
                    let operator = self.contexts[*child].operator;
                    if operator != Operator::NoOp {
                        write!(f, "{operator}")?;
                    }
                    write!(f, "[#{child} ")?;
                    self.write_context(f, *child)?;
                    write!(f, "]")?;
                }
            }
        }
        Ok(())
    }
}

impl<'de> Index<ContextId> for ContextTree<'de> {
    type Output = Context<'de>;

    fn index(&self, id: ContextId) -> &Self::Output {
        &self.contexts[id]
    }
}

impl Display for ContextTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[#0 ")?;
        self.write_context(f, Self::ROOT)?;
        write!(f, "]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Opener {
    Paren,
    /// `=` scopes have no closing token; they end with the enclosing group.
    Assign,
}

#[derive(Debug)]
struct Frame {
    id: ContextId,
    opener: Opener,
    span: SourceSpan,
}

/// Folds a token stream into a [`ContextTree`] in one left-to-right pass.
pub struct Parser<'de> {
    contexts: Vec<Context<'de>>,
    open: Vec<Frame>,
    pending: Operator,
    end: usize,
}

impl Default for Parser<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'de> Parser<'de> {
    /// Deepest allowed stack of open `(` and `=` scopes. Evaluation recurses
    /// once per level.
    pub const MAX_DEPTH: usize = 128;

    pub fn new() -> Self {
        Parser {
            contexts: vec![Context {
                id: ContextTree::ROOT,
                operator: Operator::NoOp,
                pieces: Vec::new(),
                span: SourceSpan::from(0..0),
            }],
            open: Vec::new(),
            pending: Operator::NoOp,
            end: 0,
        }
    }

    fn current(&self) -> ContextId {
        self.open.last().map_or(ContextTree::ROOT, |frame| frame.id)
    }

    pub fn push(&mut self, token: Token<'de>) -> Result<(), EvalError> {
        self.end = self.end.max(token.span.offset() + token.span.len());
        match token.kind {
            TokenKind::ContextFn(op) => self.pending = op,
            TokenKind::Value { .. } | TokenKind::Op(_) => {
                let current = self.current();
                self.contexts[current].pieces.push(Piece::Literal(token));
            }
            TokenKind::GroupOpen(op) => {
                let span = token.span;
                let opener = if op == Operator::Equals {
                    let current = self.current();
                    self.contexts[current].pieces.push(Piece::Literal(token));
                    Opener::Assign
                } else {
                    Opener::Paren
                };
                self.open_context(opener, span)?;
            }
            TokenKind::GroupClose => self.close_context(token.span)?,
            TokenKind::Invalid => {
                return Err(EvalError::Lex {
                    token: token.literal.into_owned(),
                    span: token.span,
                });
            }
        }
        Ok(())
    }

    fn open_context(&mut self, opener: Opener, span: SourceSpan) -> Result<(), EvalError> {
        if self.open.len() >= Self::MAX_DEPTH {
            return Err(EvalError::NestingTooDeep {
                limit: Self::MAX_DEPTH,
                span,
            });
        }
        let id = self.contexts.len();
        let parent = self.current();
        self.contexts[parent].pieces.push(Piece::SubContext(id));
        self.contexts.push(Context {
            id,
            operator: std::mem::replace(&mut self.pending, Operator::NoOp),
            pieces: Vec::new(),
            span,
        });
        self.open.push(Frame { id, opener, span });
        Ok(())
    }

    /// Closes every `=` scope up to and including the innermost `(`.
    fn close_context(&mut self, closer: SourceSpan) -> Result<(), EvalError> {
        loop {
            let Some(frame) = self.open.pop() else {
                return Err(EvalError::UnbalancedGrouping {
                    reason: "`)` without a matching `(`",
                    span: closer,
                });
            };
            self.contexts[frame.id].span = cover(frame.span, closer);
            if frame.opener == Opener::Paren {
                return Ok(());
            }
        }
    }

    pub fn finish(mut self) -> Result<ContextTree<'de>, EvalError> {
        let end = self.end;
        while let Some(frame) = self.open.pop() {
            if frame.opener == Opener::Paren {
                return Err(EvalError::UnbalancedGrouping {
                    reason: "`(` is never closed",
                    span: frame.span,
                });
            }
            let start = frame.span.offset();
            self.contexts[frame.id].span = SourceSpan::from(start..end.max(start));
        }
        if self.pending != Operator::NoOp {
            tracing::debug!(function = %self.pending, "context function without a scope ignored");
        }

        self.contexts[ContextTree::ROOT].span = SourceSpan::from(0..end);
        Ok(ContextTree {
            contexts: self.contexts,
        })
    }
}

fn cover(start: SourceSpan, end: SourceSpan) -> SourceSpan {
    SourceSpan::from(start.offset()..(end.offset() + end.len()).max(start.offset()))
}

/// Builds the context tree for a lexed expression.
pub fn build_tree<'de>(
    tokens: impl IntoIterator<Item = Token<'de>>,
) -> Result<ContextTree<'de>, EvalError> {
    let mut parser = Parser::new();
    for token in tokens {
        parser.push(token)?;
    }
    parser.finish()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{lex::tokenize, store::Stores};

    fn tree(input: &str) -> Result<ContextTree<'_>, EvalError> {
        let mut floats: HashMap<String, f64> = HashMap::from([("r".to_string(), 0.5)]);
        let mut ints: HashMap<String, i64> = HashMap::from([("x".to_string(), 0)]);
        let stores = Stores::new(&mut floats, &mut ints);
        build_tree(tokenize(input, &stores)?)
    }

    fn render(input: &str) -> String {
        tree(input).expect("builds").to_string()
    }

    #[test]
    fn flat_expression_stays_in_root() {
        let tree = tree("1+2*3").expect("builds");
        assert_eq!(tree.contexts().len(), 1);
        assert_eq!(tree.root().pieces.len(), 5);
        assert_eq!(tree.root().operator, Operator::NoOp);
    }

    #[test]
    fn parentheses_nest_in_creation_order() {
        assert_eq!(render("2(3+4)"), "[#0 2 * [#1 3 + 4]]");
        assert_eq!(render("((1)+(2))"), "[#0 [#1 [#2 1] + [#3 2]]]");
    }

    #[test]
    fn context_functions_tag_the_next_scope() {
        let tree = tree("1+sqrt(4)+floor(r)").expect("builds");
        assert_eq!(tree.get(1).map(|c| c.operator), Some(Operator::SquareRoot));
        assert_eq!(tree.get(2).map(|c| c.operator), Some(Operator::Floor));
        assert_eq!(render("round(sqrt(2))"), "[#0 round[#1 sqrt[#2 2]]]");
    }

    #[test]
    fn assignment_keeps_target_and_operator_visible() {
        assert_eq!(render("x=5"), "[#0 x = [#1 5]]");
        assert_eq!(render("x=round(r)"), "[#0 x = [#1 round[#2 r]]]");
    }

    #[test]
    fn closing_paren_also_ends_assignment_scope() {
        assert_eq!(render("(x=5)+1"), "[#0 [#1 x = [#2 5]] + 1]");
    }

    #[test]
    fn spans_cover_groups() {
        let tree = tree("2*(3+4)").expect("builds");
        let group = tree.get(1).expect("group");
        assert_eq!((group.span.offset(), group.span.len()), (2, 5));
        assert_eq!(tree.root().span.len(), 7);
    }

    #[test]
    fn unbalanced_grouping() {
        assert!(matches!(
            tree("(2+3"),
            Err(EvalError::UnbalancedGrouping { .. })
        ));
        assert!(matches!(
            tree("2+3)"),
            Err(EvalError::UnbalancedGrouping { .. })
        ));
        assert!(matches!(
            tree("x=(1"),
            Err(EvalError::UnbalancedGrouping { .. })
        ));
    }

    #[test]
    fn nesting_depth_is_capped() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));

        let deepest = nested(Parser::MAX_DEPTH);
        let contexts = tree(&deepest).expect("builds").contexts().len();
        assert_eq!(contexts, Parser::MAX_DEPTH + 1);

        let too_deep = nested(Parser::MAX_DEPTH + 1);
        let err = tree(&too_deep).unwrap_err();
        assert_eq!(
            err,
            EvalError::NestingTooDeep {
                limit: Parser::MAX_DEPTH,
                span: SourceSpan::from(Parser::MAX_DEPTH..Parser::MAX_DEPTH + 1),
            }
        );
        assert!(matches!(
            tree(&"x=".repeat(Parser::MAX_DEPTH + 1)),
            Err(EvalError::NestingTooDeep { .. })
        ));
    }
}
