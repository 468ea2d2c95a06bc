use lumen_fhir_path::{evaluate, ErrorCode, EvaluateOptions, Value};
use serde_json::json;

fn eval_with(input: &str, resource: serde_json::Value) -> Vec<Value> {
    evaluate(input, EvaluateOptions::new().with_input(resource)).unwrap_or_else(|e| {
        panic!("evaluation error for '{}': {}", input, e);
    })
}

fn integers(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Integer).collect()
}

// --- External variables ---

#[test]
fn test_external_variables_resolve_with_or_without_prefix() {
    let options = EvaluateOptions::new()
        .with_input(json!(0))
        .with_variable("threshold", json!(5));
    assert_eq!(
        evaluate("%threshold + 1", options.clone()).unwrap(),
        integers(&[6])
    );
    // Callers may also pass the name already prefixed.
    let options = EvaluateOptions::new()
        .with_input(json!(0))
        .with_variable("%limit", json!(3));
    assert_eq!(evaluate("%limit", options).unwrap(), integers(&[3]));
}

#[test]
fn test_builtin_environment_constants() {
    assert_eq!(
        evaluate("%ucum", EvaluateOptions::new()).unwrap(),
        vec![Value::String("http://unitsofmeasure.org".to_string())]
    );
    assert_eq!(
        evaluate("%sct", EvaluateOptions::new()).unwrap(),
        vec![Value::String("http://snomed.info/sct".to_string())]
    );
}

#[test]
fn test_context_resource_and_root_resource() {
    let input = json!({ "resourceType": "Patient", "id": "p1" });
    assert_eq!(
        eval_with("%context.id", input.clone()),
        vec![Value::String("p1".to_string())]
    );
    assert_eq!(
        eval_with("%resource.id", input.clone()),
        eval_with("%rootResource.id", input)
    );
}

// --- defineVariable ---

#[test]
fn test_define_variable_passes_input_through() {
    assert_eq!(
        eval_with("defineVariable('x', 2).select($this * %x)", json!([1, 2, 3])),
        integers(&[2, 4, 6])
    );
}

#[test]
fn test_define_variable_defaults_to_input() {
    assert_eq!(
        eval_with("defineVariable('saved').select(%saved.count())", json!([7, 8])),
        integers(&[2, 2])
    );
}

#[test]
fn test_redefinition_is_silent_and_keeps_the_first_binding() {
    assert_eq!(
        eval_with(
            "defineVariable('x', 1).defineVariable('x', 2).select(%x)",
            json!(0)
        ),
        integers(&[1])
    );
}

#[test]
fn test_system_names_cannot_be_redefined() {
    let input = json!({ "resourceType": "Patient", "id": "p1" });
    // Silently ignored; %context keeps pointing at the root.
    assert_eq!(
        eval_with("defineVariable('context', 'x').select(%context.id)", input),
        vec![Value::String("p1".to_string())]
    );
}

// --- Scope isolation ---

#[test]
fn test_variable_defined_in_one_union_branch_is_invisible_in_the_other() {
    let err = evaluate(
        "(defineVariable('v', 1).select(%v)) | %v",
        EvaluateOptions::new().with_input(json!(0)),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::VARIABLE_NOT_DEFINED);
}

#[test]
fn test_variable_does_not_escape_a_union() {
    let err = evaluate(
        "(defineVariable('v', 1) | 2).select(%v)",
        EvaluateOptions::new().with_input(json!(0)),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::VARIABLE_NOT_DEFINED);
}

#[test]
fn test_variable_does_not_escape_an_iterator_frame() {
    let err = evaluate(
        "select(defineVariable('inner', 1)).select(%inner)",
        EvaluateOptions::new().with_input(json!(0)),
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::VARIABLE_NOT_DEFINED);
}

#[test]
fn test_nested_definitions_shadow_nothing_and_nest_cleanly() {
    assert_eq!(
        eval_with(
            "defineVariable('a', 1).defineVariable('b', 2).select(%a + %b)",
            json!(0)
        ),
        integers(&[3])
    );
}

// --- Iterator variables ---

#[test]
fn test_this_and_index_inside_iterators() {
    assert_eq!(
        eval_with("select($this + $index)", json!([10, 20, 30])),
        integers(&[10, 21, 32])
    );
}

#[test]
fn test_index_is_not_defined_outside_iteration() {
    // $index resolves only inside iterator frames; at the top level the
    // variable lookup fails.
    let err = evaluate("$index", EvaluateOptions::new().with_input(json!(0)));
    assert!(err.is_err() || err.unwrap().is_empty());
}
