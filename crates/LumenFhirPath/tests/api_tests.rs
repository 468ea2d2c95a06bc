use lumen_fhir_path::{
    evaluate, inspect, parse, EvaluateOptions, InspectOptions, ParseMode, ParseOptions, Value,
};
use serde_json::json;

// --- parse ---

#[test]
fn test_parse_strict_and_recovery_surface() {
    let outcome = parse("Patient.name", ParseOptions::default()).unwrap();
    assert!(outcome.errors.is_empty());

    assert!(parse("Patient..name", ParseOptions::default()).is_err());

    let recovered = parse(
        "Patient..name",
        ParseOptions {
            mode: ParseMode::Recovery,
            ..ParseOptions::default()
        },
    )
    .unwrap();
    assert!(!recovered.errors.is_empty());
}

// --- evaluate ---

#[test]
fn test_evaluate_accepts_scalar_and_sequence_inputs() {
    assert_eq!(
        evaluate("$this", EvaluateOptions::new().with_input(json!("solo"))).unwrap(),
        vec![Value::String("solo".to_string())]
    );
    assert_eq!(
        evaluate("count()", EvaluateOptions::new().with_input(json!([1, 2, 3]))).unwrap(),
        vec![Value::Integer(3)]
    );
    // No input at all is the empty sequence.
    assert_eq!(
        evaluate("count()", EvaluateOptions::new()).unwrap(),
        vec![Value::Integer(0)]
    );
}

#[test]
fn test_evaluate_results_are_raw_values() {
    let result = evaluate(
        "name.given",
        EvaluateOptions::new().with_input(json!({ "name": [{ "given": ["A"] }] })),
    )
    .unwrap();
    assert_eq!(result, vec![Value::String("A".to_string())]);
    assert_eq!(result[0].to_json(), json!("A"));
}

// --- inspect ---

#[test]
fn test_inspect_reports_result_ast_and_timings() {
    let report = inspect(
        "name.given.count()",
        InspectOptions {
            input: Some(json!({ "name": [{ "given": ["A", "B"] }] })),
            ..InspectOptions::default()
        },
    )
    .unwrap();
    assert_eq!(report.result, vec![Value::Integer(2)]);
    assert!(report.diagnostics.is_empty());
    assert!(report.timings.total_micros >= report.timings.parse_micros);
    // The AST is navigable: the root spans the whole source.
    assert_eq!(report.ast.range.end.offset, "name.given.count()".len());
}

#[test]
fn test_inspect_collects_traces_when_asked() {
    let options = InspectOptions {
        input: Some(json!([1, 2, 3])),
        include_traces: true,
        ..InspectOptions::default()
    };
    let report = inspect("trace('all').where($this > 1).trace('big').count()", options).unwrap();
    assert_eq!(report.result, vec![Value::Integer(2)]);
    let names: Vec<&str> = report.traces.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["all", "big"]);
    assert_eq!(report.traces[0].value.len(), 3);
    assert_eq!(report.traces[1].value.len(), 2);

    // Without the flag the report stays clean.
    let report = inspect(
        "trace('all')",
        InspectOptions {
            input: Some(json!([1])),
            ..InspectOptions::default()
        },
    )
    .unwrap();
    assert!(report.traces.is_empty());
}

#[test]
fn test_inspect_surfaces_syntax_diagnostics_without_evaluating() {
    let report = inspect("name.where(", InspectOptions::default()).unwrap();
    assert!(report.result.is_empty());
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.source == "fhirpath-parser"));
}

#[test]
fn test_inspect_depth_guard() {
    let options = InspectOptions {
        max_depth: Some(3),
        ..InspectOptions::default()
    };
    assert!(inspect("a.b.c.d.e.f.g.h", options).is_err());
    let options = InspectOptions {
        max_depth: Some(64),
        ..InspectOptions::default()
    };
    assert!(inspect("a.b.c", options).is_ok());
}
