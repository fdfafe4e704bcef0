use std::fmt::Display;

/// Every operator and keyword the expression language knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    NoOp,
    Add,
    Subtract,
    Multiply,
    Divide,
    Raise,
    SquareRoot,
    OpenParen,
    CloseParen,
    Equals,
    Not,
    Or,
    And,
    Smaller,
    SmallerOrEqual,
    Larger,
    LargerOrEqual,
    Dot,
    Floor,
    Ceil,
    Round,
    Truncate,
}

/// Two-character symbols the fragment splitter keeps together. Every other
/// symbol is cut out of the input one character at a time.
pub const DOUBLE_SYMBOLS: &[&str] = &["<=", ">=", "!="];

impl Operator {
    /// Looks `text` up in the operator table. `None` means "not an operator",
    /// the caller should try numbers and variable names next.
    pub fn resolve(text: &str) -> Option<Operator> {
        let op = match text {
            "+" => Operator::Add,
            "-" => Operator::Subtract,
            "*" => Operator::Multiply,
            "/" => Operator::Divide,
            "^" => Operator::Raise,
            "(" => Operator::OpenParen,
            ")" => Operator::CloseParen,
            "=" => Operator::Equals,
            "!" | "!=" => Operator::Not,
            "|" => Operator::Or,
            "&" => Operator::And,
            "<" => Operator::Smaller,
            ">" => Operator::Larger,
            "<=" => Operator::SmallerOrEqual,
            ">=" => Operator::LargerOrEqual,
            "." => Operator::Dot,
            "sqrt" => Operator::SquareRoot,
            "floor" => Operator::Floor,
            "ceil" => Operator::Ceil,
            "round" => Operator::Round,
            "trunc" => Operator::Truncate,
            _ => return None,
        };
        Some(op)
    }

    /// Binding precedence. Higher binds tighter; `NoOp` is the `-1` sentinel.
    pub fn weight(self) -> i32 {
        match self {
            Operator::NoOp => -1,
            Operator::Add | Operator::Subtract => 1,
            Operator::Multiply | Operator::Divide => 2,
            Operator::Raise
            | Operator::SquareRoot
            | Operator::Floor
            | Operator::Ceil
            | Operator::Round
            | Operator::Truncate => 3,
            Operator::OpenParen
            | Operator::CloseParen
            | Operator::Equals
            | Operator::Not
            | Operator::Or
            | Operator::And
            | Operator::Smaller
            | Operator::SmallerOrEqual
            | Operator::Larger
            | Operator::LargerOrEqual
            | Operator::Dot => 0,
        }
    }

    pub fn is_context_function(self) -> bool {
        matches!(
            self,
            Operator::Floor
                | Operator::Ceil
                | Operator::Round
                | Operator::Truncate
                | Operator::SquareRoot
        )
    }

    pub fn is_open(self) -> bool {
        matches!(self, Operator::OpenParen | Operator::Equals)
    }

    pub fn is_close(self) -> bool {
        matches!(self, Operator::CloseParen)
    }

    /// Operators that only make sense between two integers.
    pub fn is_integer_only(self) -> bool {
        matches!(self, Operator::Not | Operator::Or | Operator::And)
    }

    /// Applies a context function to a scope's result. `NoOp` is the identity.
    ///
    /// Rounding uses ties-to-even, so `round(2.5)` is `2` and `round(3.5)` is `4`.
    pub fn apply_function(self, value: f64) -> f64 {
        match self {
            Operator::SquareRoot => value.sqrt(),
            Operator::Floor => value.floor(),
            Operator::Ceil => value.ceil(),
            Operator::Round => value.round_ties_even(),
            Operator::Truncate => value.trunc(),
            _ => value,
        }
    }

    /// The float to integer conversion a context function supplies when its
    /// result is assigned into an integer slot.
    ///
    /// `value` is the scope's result, so the function has already run on it;
    /// rounding again is a no-op and the square root is only cast. Returns
    /// `None` when the operator cannot narrow (plain grouping).
    pub fn narrow(self, value: f64) -> Option<i64> {
        match self {
            Operator::Floor => Some(value.floor() as i64),
            Operator::Ceil => Some(value.ceil() as i64),
            Operator::Round => Some(value.round_ties_even() as i64),
            Operator::Truncate | Operator::SquareRoot => Some(value.trunc() as i64),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::NoOp => "",
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Raise => "^",
            Operator::SquareRoot => "sqrt",
            Operator::OpenParen => "(",
            Operator::CloseParen => ")",
            Operator::Equals => "=",
            Operator::Not => "!",
            Operator::Or => "|",
            Operator::And => "&",
            Operator::Smaller => "<",
            Operator::SmallerOrEqual => "<=",
            Operator::Larger => ">",
            Operator::LargerOrEqual => ">=",
            Operator::Dot => ".",
            Operator::Floor => "floor",
            Operator::Ceil => "ceil",
            Operator::Round => "round",
            Operator::Truncate => "trunc",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::NoOp => write!(f, "no-op"),
            op => write!(f, "{}", op.symbol()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_symbols_and_keywords() {
        assert_eq!(Operator::resolve("+"), Some(Operator::Add));
        assert_eq!(Operator::resolve("<="), Some(Operator::SmallerOrEqual));
        assert_eq!(Operator::resolve("!="), Some(Operator::Not));
        assert_eq!(Operator::resolve("trunc"), Some(Operator::Truncate));
        assert_eq!(Operator::resolve("sin"), None);
        assert_eq!(Operator::resolve("12"), None);
    }

    #[test]
    fn weights_follow_precedence_tiers() {
        assert_eq!(Operator::NoOp.weight(), -1);
        assert_eq!(Operator::Equals.weight(), 0);
        assert_eq!(Operator::Larger.weight(), 0);
        assert!(Operator::Multiply.weight() > Operator::Subtract.weight());
        assert!(Operator::Raise.weight() > Operator::Divide.weight());
        assert_eq!(Operator::Round.weight(), Operator::Raise.weight());
    }

    #[test]
    fn roles() {
        for op in [
            Operator::Floor,
            Operator::Ceil,
            Operator::Round,
            Operator::Truncate,
            Operator::SquareRoot,
        ] {
            assert!(op.is_context_function(), "{op:?}");
            assert!(!op.is_open());
        }
        assert!(Operator::Equals.is_open());
        assert!(Operator::OpenParen.is_open());
        assert!(Operator::CloseParen.is_close());
        assert!(!Operator::Add.is_context_function());
    }

    #[test]
    fn functions_and_narrowing() {
        assert_eq!(Operator::Round.apply_function(2.5), 2.0);
        assert_eq!(Operator::Round.apply_function(3.5), 4.0);
        assert_eq!(Operator::Truncate.apply_function(-2.7), -2.0);
        assert_eq!(Operator::SquareRoot.apply_function(16.0), 4.0);
        assert_eq!(Operator::NoOp.apply_function(1.25), 1.25);

        assert_eq!(Operator::SquareRoot.narrow(3.16), Some(3));
        assert_eq!(Operator::Ceil.narrow(5.0), Some(5));
        assert_eq!(Operator::NoOp.narrow(5.7), None);
    }
}
