use lumen_fhir_path::{evaluate, ErrorCode, EvaluateOptions, Value};
use rust_decimal::Decimal;
use serde_json::json;

// Helper to evaluate against an empty input.
fn eval(input: &str) -> Vec<Value> {
    evaluate(input, EvaluateOptions::new()).unwrap_or_else(|e| {
        panic!("evaluation error for '{}': {}", input, e);
    })
}

// Helper to evaluate against a JSON input.
fn eval_with(input: &str, resource: serde_json::Value) -> Vec<Value> {
    evaluate(input, EvaluateOptions::new().with_input(resource)).unwrap_or_else(|e| {
        panic!("evaluation error for '{}': {}", input, e);
    })
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

// --- Literals ---

#[test]
fn test_literals() {
    assert_eq!(eval("true"), vec![Value::Boolean(true)]);
    assert_eq!(eval("false"), vec![Value::Boolean(false)]);
    assert_eq!(eval("123"), vec![Value::Integer(123)]);
    assert_eq!(eval("-5"), vec![Value::Integer(-5)]);
    assert_eq!(
        eval("123.45"),
        vec![Value::Decimal("123.45".parse().unwrap())]
    );
    assert_eq!(eval("'hello'"), vec![string("hello")]);
    assert_eq!(eval("'urn:oid:1.2.3'"), vec![string("urn:oid:1.2.3")]);
    // The empty collection literal.
    assert_eq!(eval("{}"), Vec::<Value>::new());
}

#[test]
fn test_date_time_literals() {
    let [date] = &eval("@2015-02-04")[..] else {
        panic!("expected one value")
    };
    assert_eq!(date.to_display_string(), "2015-02-04");
    let [partial] = &eval("@2015-02")[..] else {
        panic!("expected one value")
    };
    assert_eq!(partial.to_display_string(), "2015-02");
    let [datetime] = &eval("@2015-02-04T14:34:28Z")[..] else {
        panic!("expected one value")
    };
    assert_eq!(datetime.to_display_string(), "2015-02-04T14:34:28Z");
    let [time] = &eval("@T14:34:28")[..] else {
        panic!("expected one value")
    };
    assert_eq!(time.to_display_string(), "14:34:28");
}

#[test]
fn test_quantity_literals() {
    assert_eq!(
        eval("10 'mg'"),
        vec![Value::Quantity {
            value: Decimal::from(10),
            unit: "mg".to_string()
        }]
    );
    // Calendar units map to their canonical UCUM codes.
    assert_eq!(
        eval("100 days"),
        vec![Value::Quantity {
            value: Decimal::from(100),
            unit: "d".to_string()
        }]
    );
    assert_eq!(
        eval("1 year"),
        vec![Value::Quantity {
            value: Decimal::from(1),
            unit: "a".to_string()
        }]
    );
}

// --- Seed scenarios ---

fn patient() -> serde_json::Value {
    json!({
        "resourceType": "Patient",
        "name": [
            { "use": "official", "given": ["John", "Q"] },
            { "use": "nick", "given": ["Johnny"] }
        ]
    })
}

#[test]
fn test_filtered_navigation() {
    assert_eq!(
        eval_with(
            "Patient.name.where(use = 'official').given.first()",
            patient()
        ),
        vec![string("John")]
    );
}

#[test]
fn test_operator_precedence_arithmetic() {
    assert_eq!(eval_with("1 + 2 * 3", json!({})), vec![Value::Integer(7)]);
}

#[test]
fn test_collection_distinct() {
    assert_eq!(
        eval_with("{1,2,2,3}.distinct()", json!({})),
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
}

#[test]
fn test_iif() {
    assert_eq!(eval_with("iif(true, 'a', 'b')", json!({})), vec![string("a")]);
    assert_eq!(eval("iif(false, 'a', 'b')"), vec![string("b")]);
    // The otherwise branch is optional.
    assert_eq!(eval("iif(false, 'a')"), Vec::<Value>::new());
    // Only the selected branch is evaluated.
    assert_eq!(eval("iif(true, 'a', 1/0)"), vec![string("a")]);
}

#[test]
fn test_define_variable_shadows_input() {
    assert_eq!(
        eval_with("defineVariable('x', 10).select(%x + 1)", json!([1, 2])),
        vec![Value::Integer(11), Value::Integer(11)]
    );
}

#[test]
fn test_union_deduplicates() {
    assert_eq!(
        eval_with("(5 | 5 | 6)", json!({})),
        vec![Value::Integer(5), Value::Integer(6)]
    );
}

#[test]
fn test_single_on_collection_is_an_error() {
    let err = evaluate(
        "value.single()",
        EvaluateOptions::new().with_input(json!([{ "value": [1, 2] }])),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::SINGLETON_REQUIRED);
}

#[test]
fn test_indexer() {
    assert_eq!(
        eval_with("Patient.name.given[1]", patient()),
        vec![string("Q")]
    );
    // Out-of-range and negative indexes answer empty.
    assert_eq!(eval_with("Patient.name.given[9]", patient()), Vec::<Value>::new());
    assert_eq!(eval_with("Patient.name.given[-1]", patient()), Vec::<Value>::new());
}

// --- Navigation ---

#[test]
fn test_navigation_spreads_arrays_and_skips_missing() {
    assert_eq!(
        eval_with("Patient.name.given", patient()),
        vec![string("John"), string("Q"), string("Johnny")]
    );
    assert_eq!(eval_with("Patient.telecom", patient()), Vec::<Value>::new());
}

#[test]
fn test_type_or_identifier_falls_back_to_navigation() {
    // No resourceType match: an uppercase identifier navigates.
    let input = json!({ "Coding": { "code": "a" } });
    assert_eq!(eval_with("Coding.code", input), vec![string("a")]);
    // With a matching resourceType it filters instead.
    assert_eq!(
        eval_with("Patient.name.count()", patient()),
        vec![Value::Integer(2)]
    );
    assert_eq!(
        eval_with("Observation.name", patient()),
        Vec::<Value>::new()
    );
}

#[test]
fn test_scalar_input_is_wrapped() {
    assert_eq!(eval_with("$this", json!(42)), vec![Value::Integer(42)]);
    assert_eq!(eval_with("$this + 1", json!(41)), vec![Value::Integer(42)]);
}

#[test]
fn test_pipeline_this_identity() {
    // e.$this = e
    assert_eq!(
        eval_with("Patient.name.given.$this", patient()),
        eval_with("Patient.name.given", patient())
    );
    assert_eq!(eval("{}.first()"), Vec::<Value>::new());
}

#[test]
fn test_primitive_element_sidecar_navigation() {
    let input = json!({
        "resourceType": "Patient",
        "birthDate": "1970-03-30",
        "_birthDate": {
            "extension": [{
                "url": "http://example.org/real-birth",
                "valueDateTime": "1970-03-30T12:00:00Z"
            }]
        }
    });
    assert_eq!(
        eval_with("Patient.birthDate.extension.url", input.clone()),
        vec![string("http://example.org/real-birth")]
    );
    assert_eq!(
        eval_with(
            "Patient.birthDate.extension('http://example.org/real-birth').valueDateTime",
            input
        ),
        vec![string("1970-03-30T12:00:00Z")]
    );
}

#[test]
fn test_sidecar_pairs_with_array_elements() {
    let input = json!({
        "given": ["John", "Q"],
        "_given": [{ "id": "g1" }, null]
    });
    assert_eq!(eval_with("given.id", input), vec![string("g1")]);
}

// --- Type operations ---

#[test]
fn test_is_operator_on_primitives() {
    assert_eq!(eval("1 is Integer"), vec![Value::Boolean(true)]);
    assert_eq!(eval("1 is System.Integer"), vec![Value::Boolean(true)]);
    assert_eq!(eval("1 is Decimal"), vec![Value::Boolean(false)]);
    assert_eq!(eval("'a' is String"), vec![Value::Boolean(true)]);
    assert_eq!(eval("@2015 is Date"), vec![Value::Boolean(true)]);
    assert_eq!(eval("1 'mg' is Quantity"), vec![Value::Boolean(true)]);
}

#[test]
fn test_as_operator_filters() {
    assert_eq!(eval("1 as Integer"), vec![Value::Integer(1)]);
    assert_eq!(eval("1 as Decimal"), Vec::<Value>::new());
}

#[test]
fn test_of_type_filters_mixed_collection() {
    assert_eq!(
        eval("(1 | 'a' | 2.5).ofType(Integer)"),
        vec![Value::Integer(1)]
    );
    assert_eq!(
        eval("(1 | 'a' | 2.5).ofType(String)"),
        vec![string("a")]
    );
}

#[test]
fn test_type_reflection() {
    assert_eq!(eval("true.type().name"), vec![string("Boolean")]);
    assert_eq!(eval("1.type().namespace"), vec![string("System")]);
    assert_eq!(
        eval_with("Patient.type().name", patient()),
        vec![string("Patient")]
    );
}

// --- Errors ---

#[test]
fn test_unknown_function_is_an_error() {
    let err = evaluate("frst()", EvaluateOptions::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNKNOWN_FUNCTION);
}

#[test]
fn test_unknown_variable_is_an_error() {
    let err = evaluate("%missing", EvaluateOptions::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::VARIABLE_NOT_DEFINED);
}

#[test]
fn test_wrong_arity_is_an_error() {
    let err = evaluate("first(1)", EvaluateOptions::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::WRONG_ARGUMENT_COUNT);
}
