use lumen_fhir_path::{evaluate, ErrorCode, EvaluateOptions, Value};
use rust_decimal_macros::dec;
use serde_json::json;

fn eval(input: &str) -> Vec<Value> {
    evaluate(input, EvaluateOptions::new()).unwrap_or_else(|e| {
        panic!("evaluation error for '{}': {}", input, e);
    })
}

fn eval_with(input: &str, resource: serde_json::Value) -> Vec<Value> {
    evaluate(input, EvaluateOptions::new().with_input(resource)).unwrap_or_else(|e| {
        panic!("evaluation error for '{}': {}", input, e);
    })
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

fn integers(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Integer).collect()
}

// --- Existence ---

#[test]
fn test_empty_exists_count() {
    assert_eq!(eval("{}.empty()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("(1 | 2).empty()"), vec![Value::Boolean(false)]);
    assert_eq!(eval("{}.exists()"), vec![Value::Boolean(false)]);
    assert_eq!(eval("(1 | 2).exists()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("(1 | 2).count()"), vec![Value::Integer(2)]);
    assert_eq!(eval("{}.count()"), vec![Value::Integer(0)]);
}

#[test]
fn test_exists_and_all_with_criteria() {
    assert_eq!(
        eval("(1 | 2 | 3).exists($this > 2)"),
        vec![Value::Boolean(true)]
    );
    assert_eq!(
        eval("(1 | 2 | 3).exists($this > 5)"),
        vec![Value::Boolean(false)]
    );
    assert_eq!(eval("(1 | 2 | 3).all($this > 0)"), vec![Value::Boolean(true)]);
    assert_eq!(eval("(1 | 2 | 3).all($this > 1)"), vec![Value::Boolean(false)]);
    // all() over the empty collection is vacuously true.
    assert_eq!(eval("{}.all($this > 1)"), vec![Value::Boolean(true)]);
}

#[test]
fn test_boolean_aggregates() {
    assert_eq!(eval("(true | false).allTrue()"), vec![Value::Boolean(false)]);
    assert_eq!(eval("(true | false).anyTrue()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("(false).allFalse()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("(true).anyFalse()"), vec![Value::Boolean(false)]);
}

// --- Subsetting ---

#[test]
fn test_first_last_tail_skip_take() {
    assert_eq!(eval("(1 | 2 | 3).first()"), integers(&[1]));
    assert_eq!(eval("(1 | 2 | 3).last()"), integers(&[3]));
    assert_eq!(eval("(1 | 2 | 3).tail()"), integers(&[2, 3]));
    assert_eq!(eval("(1 | 2 | 3).skip(2)"), integers(&[3]));
    assert_eq!(eval("(1 | 2 | 3).take(2)"), integers(&[1, 2]));
    assert_eq!(eval("(1 | 2 | 3).skip(9)"), integers(&[]));
}

#[test]
fn test_iteration_index() {
    assert_eq!(
        eval("('a' | 'b' | 'c').select($index)"),
        integers(&[0, 1, 2])
    );
    assert_eq!(
        eval("('a' | 'b' | 'c').where($index > 0).count()"),
        integers(&[2])
    );
}

// --- Set functions ---

#[test]
fn test_combine_intersect_exclude() {
    assert_eq!(eval("(1 | 2).combine(2 | 3)"), integers(&[1, 2, 2, 3]));
    assert_eq!(eval("(1 | 2).union(2 | 3)"), integers(&[1, 2, 3]));
    assert_eq!(eval("(1 | 2 | 3).intersect(2 | 3 | 4)"), integers(&[2, 3]));
    assert_eq!(eval("(1 | 2 | 3).exclude(2)"), integers(&[1, 3]));
}

#[test]
fn test_subset_and_superset() {
    assert_eq!(eval("(1 | 2).subsetOf(1 | 2 | 3)"), vec![Value::Boolean(true)]);
    assert_eq!(eval("(1 | 4).subsetOf(1 | 2 | 3)"), vec![Value::Boolean(false)]);
    assert_eq!(
        eval("(1 | 2 | 3).supersetOf(2 | 3)"),
        vec![Value::Boolean(true)]
    );
    assert_eq!(eval("{}.subsetOf(1 | 2)"), vec![Value::Boolean(true)]);
}

#[test]
fn test_is_distinct() {
    assert_eq!(eval("(1 | 2).isDistinct()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("(1 | 2).combine(1).isDistinct()"), vec![Value::Boolean(false)]);
}

// --- Strings ---

#[test]
fn test_string_functions() {
    assert_eq!(eval("'hello'.length()"), integers(&[5]));
    assert_eq!(eval("'hello'.upper()"), vec![string("HELLO")]);
    assert_eq!(eval("'HELLO'.lower()"), vec![string("hello")]);
    assert_eq!(eval("'  x  '.trim()"), vec![string("x")]);
    assert_eq!(eval("'hello'.indexOf('ll')"), integers(&[2]));
    assert_eq!(eval("'hello'.indexOf('zz')"), integers(&[-1]));
    assert_eq!(eval("'abcdef'.substring(2, 3)"), vec![string("cde")]);
    assert_eq!(eval("'abcdef'.substring(4)"), vec![string("ef")]);
    assert_eq!(eval("'abc'.substring(9)"), Vec::<Value>::new());
    assert_eq!(eval("'hello'.startsWith('he')"), vec![Value::Boolean(true)]);
    assert_eq!(eval("'hello'.endsWith('lo')"), vec![Value::Boolean(true)]);
    assert_eq!(eval("'hello'.contains('ell')"), vec![Value::Boolean(true)]);
    assert_eq!(
        eval("'banana'.replace('an', 'AN')"),
        vec![string("bANANa")]
    );
}

#[test]
fn test_regex_functions() {
    assert_eq!(eval("'hello'.matches('l+')"), vec![Value::Boolean(true)]);
    assert_eq!(eval("'hello'.matches('^z')"), vec![Value::Boolean(false)]);
    assert_eq!(
        eval("'a1b2'.replaceMatches('[0-9]', '#')"),
        vec![string("a#b#")]
    );
    let err = evaluate("'x'.matches('(')", EvaluateOptions::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_OPERAND);
}

#[test]
fn test_split_join_chars() {
    assert_eq!(
        eval("'a,b,c'.split(',')"),
        vec![string("a"), string("b"), string("c")]
    );
    assert_eq!(
        eval("('a' | 'b' | 'c').join('-')"),
        vec![string("a-b-c")]
    );
    assert_eq!(eval("('a' | 'b').join()"), vec![string("ab")]);
    assert_eq!(eval("'ab'.toChars()"), vec![string("a"), string("b")]);
}

#[test]
fn test_encode_decode() {
    assert_eq!(eval("'hello'.encode('base64')"), vec![string("aGVsbG8=")]);
    assert_eq!(eval("'aGVsbG8='.decode('base64')"), vec![string("hello")]);
    assert_eq!(eval("'hi'.encode('hex')"), vec![string("6869")]);
    assert_eq!(eval("'6869'.decode('hex')"), vec![string("hi")]);
}

// --- Math ---

#[test]
fn test_math_functions() {
    assert_eq!(eval("(-5).abs()"), integers(&[5]));
    assert_eq!(eval("(-5.5).abs()"), vec![Value::Decimal(dec!(5.5))]);
    assert_eq!(eval("2.5 'mg'.abs()"), vec![Value::Quantity {
        value: dec!(2.5),
        unit: "mg".to_string()
    }]);
    assert_eq!(eval("2.1.ceiling()"), integers(&[3]));
    assert_eq!(eval("2.9.floor()"), integers(&[2]));
    assert_eq!(eval("2.5.round()"), vec![Value::Decimal(dec!(3))]);
    assert_eq!(eval("3.14159.round(2)"), vec![Value::Decimal(dec!(3.14))]);
    assert_eq!(eval("2.7.truncate()"), integers(&[2]));
    assert_eq!(eval("16.sqrt()"), vec![Value::Decimal(dec!(4))]);
    assert_eq!(eval("(-1).sqrt()"), Vec::<Value>::new());
    assert_eq!(eval("2.power(10)"), integers(&[1024]));
    assert_eq!(eval("(-1).ln()"), Vec::<Value>::new());
    assert_eq!(eval("100.log(10).round(6)"), vec![Value::Decimal(dec!(2))]);
}

// --- Conversions ---

#[test]
fn test_conversions() {
    assert_eq!(eval("'42'.toInteger()"), integers(&[42]));
    assert_eq!(eval("'x'.toInteger()"), Vec::<Value>::new());
    assert_eq!(eval("'42'.convertsToInteger()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("'x'.convertsToInteger()"), vec![Value::Boolean(false)]);
    assert_eq!(eval("'3.5'.toDecimal()"), vec![Value::Decimal(dec!(3.5))]);
    assert_eq!(eval("1.toBoolean()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("'yes'.toBoolean()"), vec![Value::Boolean(true)]);
    assert_eq!(eval("42.toString()"), vec![string("42")]);
    assert_eq!(eval("true.toString()"), vec![string("true")]);
    assert_eq!(eval("{}.toString()"), Vec::<Value>::new());
}

#[test]
fn test_temporal_conversions() {
    assert_eq!(
        eval("'2015-02-04'.toDate()").first().map(Value::to_display_string),
        Some("2015-02-04".to_string())
    );
    assert_eq!(
        eval("'2015-02-04T14:30:00Z'.toDateTime()")
            .first()
            .map(Value::to_display_string),
        Some("2015-02-04T14:30:00Z".to_string())
    );
    assert_eq!(
        eval("'14:30'.toTime()").first().map(Value::to_display_string),
        Some("14:30".to_string())
    );
    assert_eq!(eval("'nope'.convertsToDate()"), vec![Value::Boolean(false)]);
}

#[test]
fn test_quantity_conversions() {
    assert_eq!(
        eval("'5.4 \\'mg\\''.toQuantity()"),
        vec![Value::Quantity {
            value: dec!(5.4),
            unit: "mg".to_string()
        }]
    );
    assert_eq!(
        eval("1 'g'.toQuantity('mg')"),
        vec![Value::Quantity {
            value: dec!(1000),
            unit: "mg".to_string()
        }]
    );
}

// --- Aggregate / repeat / trace ---

#[test]
fn test_aggregate() {
    assert_eq!(
        eval("(1 | 2 | 3 | 4).aggregate($this + $total, 0)"),
        integers(&[10])
    );
    assert_eq!(
        eval("(1 | 2 | 3).aggregate(iif($total.empty(), $this, $total + $this))"),
        integers(&[6])
    );
}

#[test]
fn test_repeat_walks_nested_structures() {
    let input = json!({
        "item": [
            { "name": "a", "item": [{ "name": "b" }] },
            { "name": "c" }
        ]
    });
    assert_eq!(
        eval_with("repeat(item).name", input),
        vec![string("a"), string("c"), string("b")]
    );
}

#[test]
fn test_trace_passes_input_through() {
    assert_eq!(eval("(1 | 2).trace('vals').count()"), integers(&[2]));
}

// --- Tree navigation ---

#[test]
fn test_children_and_descendants() {
    let input = json!({ "a": { "b": 1 }, "c": 2 });
    assert_eq!(eval_with("children().count()", input.clone()), integers(&[2]));
    assert_eq!(eval_with("descendants().count()", input), integers(&[3]));
}
