use std::collections::HashMap;

use math_parser::{EvalError, Numeric, Parser, TokenKind, parse_and_evaluate};

struct Session {
    floats: HashMap<String, f64>,
    ints: HashMap<String, i64>,
}

impl Session {
    fn new() -> Self {
        Session {
            floats: HashMap::new(),
            ints: HashMap::new(),
        }
    }

    fn int(mut self, name: &str, value: i64) -> Self {
        self.ints.insert(name.to_string(), value);
        self
    }

    fn float(mut self, name: &str, value: f64) -> Self {
        self.floats.insert(name.to_string(), value);
        self
    }

    fn run(&mut self, src: &str) -> Result<Numeric, EvalError> {
        parse_and_evaluate(src, &mut self.floats, &mut self.ints).map(|e| e.value)
    }

    fn assert_value(&mut self, src: &str, expected: Numeric) {
        match self.run(src) {
            Ok(value) => assert_eq!(value, expected, "`{src}`"),
            Err(e) => panic!("`{src}` failed: {e}"),
        }
    }
}

fn assert_value(src: &str, expected: Numeric) {
    Session::new().assert_value(src, expected);
}

fn assert_failure(src: &str) -> EvalError {
    match Session::new().run(src) {
        Ok(value) => panic!("`{src}` succeeded with {value} but was expected to fail"),
        Err(e) => e,
    }
}

#[test]
fn arithmetic_follows_precedence() {
    assert_value("2+3*4", Numeric::Int(14));
    assert_value("(2+3)*4", Numeric::Int(20));
    assert_value("2+3*4-5", Numeric::Int(9));
    assert_value("10/2/5", Numeric::Int(1));
    assert_value("2^10-24", Numeric::Int(1000));
    assert_value(" 1 +  2 ", Numeric::Int(3));
}

#[test]
fn implicit_multiplication() {
    assert_value("2(3+4)", Numeric::Int(14));
    assert_value("(1+1)(2+2)", Numeric::Int(8));
    assert_value("3 sqrt(16)", Numeric::Float(12.0));
    Session::new().int("n", 4).assert_value("2n", Numeric::Int(8));
}

#[test]
fn context_functions() {
    assert_value("round(7/2)", Numeric::Float(3.0));
    assert_value("round(7.0/2)", Numeric::Float(4.0));
    assert_value("floor(7.0/2)", Numeric::Float(3.0));
    assert_value("ceil(7.0/2)", Numeric::Float(4.0));
    assert_value("trunc(-7.0/2)", Numeric::Float(-3.0));
    assert_value("sqrt(sqrt(16))", Numeric::Float(2.0));
}

#[test]
fn comparisons_yield_one_or_zero() {
    assert_value("3<4", Numeric::Int(1));
    assert_value("3>=4", Numeric::Int(0));
    assert_value("4<=4", Numeric::Int(1));
    assert_value("2.5>1", Numeric::Float(1.0));
}

#[test]
fn assignment_round_trip() {
    let mut session = Session::new().int("x", 0);
    session.assert_value("x=5", Numeric::Int(5));
    assert_eq!(session.ints["x"], 5);
    session.assert_value("x", Numeric::Int(5));

    session.assert_value("x=round(5.7)", Numeric::Int(6));
    assert_eq!(session.ints["x"], 6);

    let err = session.run("x=5.7").unwrap_err();
    assert!(matches!(err, EvalError::NarrowingWithoutFunction { .. }), "{err:?}");
    assert_eq!(session.ints["x"], 6);
}

#[test]
fn assignment_reports_the_write() {
    let mut floats = HashMap::from([("speed".to_string(), 1.0)]);
    let mut ints = HashMap::new();
    let evaluation = parse_and_evaluate("speed = 3 * 2", &mut floats, &mut ints).unwrap();
    assert_eq!(evaluation.value, Numeric::Float(6.0));
    let assignment = evaluation.assignment.expect("top-level assignment");
    assert_eq!(assignment.name, "speed");
    assert_eq!(assignment.value, Numeric::Float(6.0));
    assert_eq!(floats["speed"], 6.0);

    let evaluation = parse_and_evaluate("speed + 1", &mut floats, &mut ints).unwrap();
    assert!(evaluation.assignment.is_none());
}

#[test]
fn float_store_shadows_int_store() {
    let mut session = Session::new().int("v", 1).float("v", 0.25);
    session.assert_value("v*4", Numeric::Float(1.0));
    session.assert_value("v=2", Numeric::Float(2.0));
    assert_eq!(session.floats["v"], 2.0);
    assert_eq!(session.ints["v"], 1);
}

#[test]
fn unbalanced_grouping() {
    assert!(matches!(
        assert_failure("(2+3"),
        EvalError::UnbalancedGrouping { .. }
    ));
    assert!(matches!(
        assert_failure("2+3)"),
        EvalError::UnbalancedGrouping { .. }
    ));
}

#[test]
fn dotted_names() {
    let mut floats = HashMap::from([("a.b".to_string(), 1.5)]);
    let mut ints = HashMap::new();
    let evaluation = parse_and_evaluate("a.b+1", &mut floats, &mut ints).unwrap();
    assert_eq!(evaluation.value, Numeric::Float(2.5));

    let stores = math_parser::Stores::new(&mut floats, &mut ints);
    let tokens = math_parser::tokenize("a.b+1", &stores).unwrap();
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[0].literal, "a.b");
    assert!(matches!(
        tokens[0].kind,
        TokenKind::Value {
            reference: true,
            ..
        }
    ));

    assert!(matches!(assert_failure("a."), EvalError::DotJoin { .. }));
    assert!(matches!(assert_failure("."), EvalError::DotJoin { .. }));
}

#[test]
fn deep_nesting_is_an_error_not_a_crash() {
    let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    assert_value(&nested(Parser::MAX_DEPTH), Numeric::Int(1));

    let err = assert_failure(&nested(10_000));
    assert!(matches!(err, EvalError::NestingTooDeep { .. }), "{err:?}");
    assert!(err.is_syntax());
}

#[test]
fn narrowing_inside_a_rounding_group() {
    let mut session = Session::new().int("x", 0);
    session.assert_value("round(x=5.7)", Numeric::Float(6.0));
    assert_eq!(session.ints["x"], 6);
}

#[test]
fn division_by_zero() {
    assert!(matches!(
        assert_failure("5/0"),
        EvalError::DivisionByZero { .. }
    ));
    assert_value("5.0/0", Numeric::Float(f64::INFINITY));
}

#[test]
fn lexing_failures() {
    assert!(matches!(assert_failure("2+y"), EvalError::Lex { .. }));
    assert!(matches!(assert_failure("2 # 3"), EvalError::Lex { .. }));
    assert!(matches!(assert_failure(""), EvalError::EmptyExpression { .. }));
}

#[test]
fn float_operands_reject_integer_only_operators() {
    assert!(matches!(
        assert_failure("1.5&1"),
        EvalError::TypeMismatchOperator { .. }
    ));
    assert!(matches!(
        assert_failure("1.5!=1"),
        EvalError::TypeMismatchOperator { .. }
    ));
}

#[test]
fn earlier_writes_survive_a_later_failure() {
    let mut session = Session::new().int("x", 0).int("y", 0);
    assert!(session.run("(x=1)+(y=2)+1/0").is_err());
    assert_eq!((session.ints["x"], session.ints["y"]), (1, 2));
}

#[test]
fn errors_render_as_diagnostics() {
    let err = assert_failure("1+2)");
    let span = err.span();
    assert_eq!((span.offset(), span.len()), (3, 1));
    let report = miette::Report::new(err)
        .with_source_code(miette::NamedSource::new("<expression>", "1+2)".to_string()));
    assert!(format!("{report}").contains("Unbalanced grouping"));
}
