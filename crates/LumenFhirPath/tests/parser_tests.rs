use lumen_fhir_path::parser::{
    parse_source, Expression, ExpressionKind, LiteralValue, ParseMode, ParseOptions,
};
use lumen_fhir_path::ErrorCode;

fn parse_ok(source: &str) -> Expression {
    parse_source(source, ParseOptions::default())
        .unwrap_or_else(|e| panic!("parse error for '{}': {}", source, e))
        .ast
}

fn binary_operator(expr: &Expression) -> &str {
    match &expr.kind {
        ExpressionKind::Binary { operator, .. } => operator,
        other => panic!("expected a binary node, found {:?}", other),
    }
}

fn binary_children(expr: &Expression) -> (&Expression, &Expression) {
    match &expr.kind {
        ExpressionKind::Binary { left, right, .. } => (left, right),
        other => panic!("expected a binary node, found {:?}", other),
    }
}

// --- Precedence ---

#[test]
fn test_multiplicative_binds_tighter_than_additive() {
    // a + (b * c)
    let ast = parse_ok("a + b * c");
    assert_eq!(binary_operator(&ast), "+");
    let (_, right) = binary_children(&ast);
    assert_eq!(binary_operator(right), "*");
}

#[test]
fn test_and_binds_tighter_than_or() {
    // a or (b and c)
    let ast = parse_ok("a or b and c");
    assert_eq!(binary_operator(&ast), "or");
    let (_, right) = binary_children(&ast);
    assert_eq!(binary_operator(right), "and");
}

#[test]
fn test_implies_is_right_associative() {
    // a implies (b implies c)
    let ast = parse_ok("a implies b implies c");
    assert_eq!(binary_operator(&ast), "implies");
    let (left, right) = binary_children(&ast);
    assert!(matches!(left.kind, ExpressionKind::Identifier(_)));
    assert_eq!(binary_operator(right), "implies");
}

#[test]
fn test_additive_is_left_associative() {
    // (a - b) - c
    let ast = parse_ok("a - b - c");
    let (left, right) = binary_children(&ast);
    assert_eq!(binary_operator(left), "-");
    assert!(matches!(right.kind, ExpressionKind::Identifier(_)));
}

#[test]
fn test_union_sits_between_additive_and_comparison() {
    // (a | (b + c)) < d  parses as  (a | b + c) < d
    let ast = parse_ok("a | b + c < d");
    assert_eq!(binary_operator(&ast), "<");
    let (left, _) = binary_children(&ast);
    assert_eq!(binary_operator(left), "|");
}

// --- Node shapes ---

#[test]
fn test_pipeline_and_function_call() {
    let ast = parse_ok("Patient.name.where(use = 'official')");
    assert_eq!(binary_operator(&ast), ".");
    let (_, right) = binary_children(&ast);
    let ExpressionKind::Function { callee, arguments } = &right.kind else {
        panic!("expected a function call");
    };
    assert!(matches!(&callee.kind, ExpressionKind::Identifier(n) if n == "where"));
    assert_eq!(arguments.len(), 1);
}

#[test]
fn test_uppercase_identifier_is_type_or_identifier() {
    let ast = parse_ok("Patient");
    assert!(matches!(&ast.kind, ExpressionKind::TypeOrIdentifier(n) if n == "Patient"));
    let ast = parse_ok("patient");
    assert!(matches!(&ast.kind, ExpressionKind::Identifier(n) if n == "patient"));
}

#[test]
fn test_collection_literals() {
    assert!(matches!(
        parse_ok("{}").kind,
        ExpressionKind::Literal(LiteralValue::Empty)
    ));
    let ast = parse_ok("{1, 2, 3}");
    let ExpressionKind::Collection(elements) = &ast.kind else {
        panic!("expected a collection literal");
    };
    assert_eq!(elements.len(), 3);
}

#[test]
fn test_quantity_literal_forms() {
    let ast = parse_ok("5 'mg'");
    assert!(matches!(
        &ast.kind,
        ExpressionKind::Quantity { unit, calendar_unit: false, .. } if unit == "mg"
    ));
    let ast = parse_ok("3 days");
    assert!(matches!(
        &ast.kind,
        ExpressionKind::Quantity { unit, calendar_unit: true, .. } if unit == "days"
    ));
}

#[test]
fn test_type_operations() {
    let ast = parse_ok("value is System.Boolean");
    assert!(matches!(
        &ast.kind,
        ExpressionKind::MembershipTest { type_name, .. } if type_name == "System.Boolean"
    ));
    let ast = parse_ok("value as Quantity");
    assert!(matches!(
        &ast.kind,
        ExpressionKind::TypeCast { type_name, .. } if type_name == "Quantity"
    ));
}

#[test]
fn test_indexer_and_variables() {
    let ast = parse_ok("name[0]");
    assert!(matches!(ast.kind, ExpressionKind::Index { .. }));
    assert!(matches!(
        parse_ok("$this").kind,
        ExpressionKind::Variable(ref n) if n == "$this"
    ));
    assert!(matches!(
        parse_ok("%resource").kind,
        ExpressionKind::Variable(ref n) if n == "%resource"
    ));
    assert!(matches!(
        parse_ok("%`vs-name`").kind,
        ExpressionKind::Variable(ref n) if n == "%vs-name"
    ));
}

#[test]
fn test_delimited_identifier_strips_backticks() {
    let ast = parse_ok("`odd name`");
    assert!(matches!(&ast.kind, ExpressionKind::Identifier(n) if n == "odd name"));
}

#[test]
fn test_unary_not_versus_member_not() {
    assert!(matches!(
        parse_ok("not active").kind,
        ExpressionKind::Unary { ref operator, .. } if operator == "not"
    ));
    // As a member invocation, `not` stays a function call.
    let ast = parse_ok("active.not()");
    let (_, right) = binary_children(&ast);
    assert!(matches!(right.kind, ExpressionKind::Function { .. }));
}

// --- Ranges ---

fn assert_ranges_nested(expr: &Expression) {
    let check = |child: &Expression| {
        assert!(
            expr.range.contains(&child.range),
            "child range {} escapes parent {}",
            child.range,
            expr.range
        );
        assert_ranges_nested(child);
    };
    match &expr.kind {
        ExpressionKind::Binary { left, right, .. } => {
            check(left);
            check(right);
            assert!(left.range.end.offset <= right.range.start.offset);
        }
        ExpressionKind::Unary { operand, .. } => check(operand),
        ExpressionKind::Function { callee, arguments } => {
            check(callee);
            arguments.iter().for_each(check);
        }
        ExpressionKind::Index { expression, index } => {
            check(expression);
            check(index);
        }
        ExpressionKind::Collection(elements) => elements.iter().for_each(check),
        ExpressionKind::MembershipTest { expression, .. }
        | ExpressionKind::TypeCast { expression, .. } => check(expression),
        _ => {}
    }
}

#[test]
fn test_ranges_are_monotonic() {
    let source = "Patient.name.where(use = 'official').given[0] | telecom.exists()";
    let ast = parse_ok(source);
    assert_eq!(ast.range.start.offset, 0);
    assert_eq!(ast.range.end.offset, source.len());
    assert_ranges_nested(&ast);
}

// --- Modes ---

#[test]
fn test_strict_mode_aborts_on_first_error() {
    let err = parse_source("1 + ", ParseOptions::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNEXPECTED_TOKEN);
    assert!(parse_source("where(", ParseOptions::default()).is_err());
}

#[test]
fn test_recovery_mode_produces_error_nodes() {
    let options = ParseOptions {
        mode: ParseMode::Recovery,
        ..ParseOptions::default()
    };
    let outcome = parse_source("name.where(use = ).first()", options).unwrap();
    assert!(!outcome.errors.is_empty());

    fn contains_error_node(expr: &Expression) -> bool {
        match &expr.kind {
            ExpressionKind::Error { .. } => true,
            ExpressionKind::Binary { left, right, .. } => {
                contains_error_node(left) || contains_error_node(right)
            }
            ExpressionKind::Function { arguments, .. } => {
                arguments.iter().any(contains_error_node)
            }
            ExpressionKind::Unary { operand, .. } => contains_error_node(operand),
            ExpressionKind::Index { expression, index } => {
                contains_error_node(expression) || contains_error_node(index)
            }
            _ => false,
        }
    }
    assert!(contains_error_node(&outcome.ast));
}

#[test]
fn test_recovery_mode_never_fails_on_lexer_errors() {
    let options = ParseOptions {
        mode: ParseMode::Recovery,
        ..ParseOptions::default()
    };
    let outcome = parse_source("1 + #", options).unwrap();
    assert!(!outcome.errors.is_empty());
}
