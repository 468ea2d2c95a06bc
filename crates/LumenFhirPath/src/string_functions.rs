//! String manipulation functions.
//!
//! All of these require a singleton string input; an empty input answers
//! empty, a collection is a singleton error, and a non-string singleton is
//! a type error. `matches`/`replaceMatches` compile their pattern with the
//! `regex` crate; an invalid pattern is an error, not empty.

use crate::interpreter::{
    boolean_collection, integer_collection, singleton_integer, singleton_string, EvalOutput,
    FunctionInvocation,
};
use base64::Engine as _;
use lumen_fhirpath_support::{BoxedValue, Collection, EngineError, ErrorCode, Value};
use regex::Regex;

fn string_result(s: String) -> Collection {
    vec![BoxedValue::new(Value::String(s))]
}

/// The function's input as a singleton string, empty-propagating.
fn input_string(
    invocation: &FunctionInvocation,
    name: &str,
) -> Result<Option<String>, EngineError> {
    singleton_string(invocation.input, &format!("{}()", name))
        .map_err(|e| e.or_range(invocation.range))
}

/// A required string argument, empty-propagating.
fn argument_string(
    invocation: &FunctionInvocation,
    index: usize,
    name: &str,
) -> Result<Option<String>, EngineError> {
    let collection = invocation.eval_argument(index)?;
    singleton_string(&collection, &format!("{}() argument", name))
        .map_err(|e| e.or_range(invocation.range))
}

/// `indexOf(substring)`: zero-based index, `-1` when absent.
pub fn index_of_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(haystack), Some(needle)) = (
        input_string(invocation, "indexOf")?,
        argument_string(invocation, 0, "indexOf")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let index = haystack
        .find(&needle)
        .map(|byte| haystack[..byte].chars().count() as i64)
        .unwrap_or(-1);
    Ok(invocation.unchanged(integer_collection(index)))
}

/// `substring(start [, length])`: character-indexed; a start outside the
/// string answers empty.
pub fn substring_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(text) = input_string(invocation, "substring")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let start_collection = invocation.eval_argument(0)?;
    let Some(start) = singleton_integer(&start_collection, "substring() start")
        .map_err(|e| e.or_range(invocation.range))?
    else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let chars: Vec<char> = text.chars().collect();
    if start < 0 || start as usize >= chars.len() {
        return Ok(invocation.unchanged(Vec::new()));
    }
    let start = start as usize;
    let end = match invocation.argument(1) {
        Some(_) => {
            let length_collection = invocation.eval_argument(1)?;
            match singleton_integer(&length_collection, "substring() length")
                .map_err(|e| e.or_range(invocation.range))?
            {
                Some(length) if length > 0 => (start + length as usize).min(chars.len()),
                Some(_) => start,
                None => return Ok(invocation.unchanged(Vec::new())),
            }
        }
        None => chars.len(),
    };
    let out: String = chars[start..end].iter().collect();
    Ok(invocation.unchanged(string_result(out)))
}

pub fn starts_with_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(prefix)) = (
        input_string(invocation, "startsWith")?,
        argument_string(invocation, 0, "startsWith")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(text.starts_with(&prefix))))
}

pub fn ends_with_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(suffix)) = (
        input_string(invocation, "endsWith")?,
        argument_string(invocation, 0, "endsWith")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(text.ends_with(&suffix))))
}

/// `contains(substring)` — the function form; the `contains` operator is
/// collection membership and lives with the set operations.
pub fn contains_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(needle)) = (
        input_string(invocation, "contains")?,
        argument_string(invocation, 0, "contains")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(boolean_collection(text.contains(&needle))))
}

pub fn upper_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(text) = input_string(invocation, "upper")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(string_result(text.to_uppercase())))
}

pub fn lower_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(text) = input_string(invocation, "lower")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(string_result(text.to_lowercase())))
}

pub fn replace_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(find), Some(replacement)) = (
        input_string(invocation, "replace")?,
        argument_string(invocation, 0, "replace")?,
        argument_string(invocation, 1, "replace")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(string_result(text.replace(&find, &replacement))))
}

fn compile_regex(pattern: &str, invocation: &FunctionInvocation) -> Result<Regex, EngineError> {
    Regex::new(pattern).map_err(|e| {
        invocation.error(
            ErrorCode::INVALID_OPERAND,
            format!("invalid regular expression '{}': {}", pattern, e),
        )
    })
}

/// `matches(regex)`: partial match anywhere in the string.
pub fn matches_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(pattern)) = (
        input_string(invocation, "matches")?,
        argument_string(invocation, 0, "matches")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let regex = compile_regex(&pattern, invocation)?;
    Ok(invocation.unchanged(boolean_collection(regex.is_match(&text))))
}

/// `replaceMatches(regex, substitution)`.
pub fn replace_matches_function(
    invocation: &FunctionInvocation,
) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(pattern), Some(substitution)) = (
        input_string(invocation, "replaceMatches")?,
        argument_string(invocation, 0, "replaceMatches")?,
        argument_string(invocation, 1, "replaceMatches")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let regex = compile_regex(&pattern, invocation)?;
    let out = regex.replace_all(&text, substitution.as_str()).into_owned();
    Ok(invocation.unchanged(string_result(out)))
}

/// `length()` in characters.
pub fn length_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(text) = input_string(invocation, "length")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(integer_collection(text.chars().count() as i64)))
}

/// `toChars()`: one single-character string per character.
pub fn to_chars_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(text) = input_string(invocation, "toChars")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let out = text
        .chars()
        .map(|c| BoxedValue::new(Value::String(c.to_string())))
        .collect();
    Ok(invocation.unchanged(out))
}

pub fn split_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(separator)) = (
        input_string(invocation, "split")?,
        argument_string(invocation, 0, "split")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let out = text
        .split(separator.as_str())
        .map(|part| BoxedValue::new(Value::String(part.to_string())))
        .collect();
    Ok(invocation.unchanged(out))
}

/// `join([separator])` over a collection of strings.
pub fn join_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let separator = match invocation.argument(0) {
        Some(_) => match argument_string(invocation, 0, "join")? {
            Some(s) => s,
            None => String::new(),
        },
        None => String::new(),
    };
    let mut parts = Vec::with_capacity(invocation.input.len());
    for item in invocation.input {
        match &item.value {
            Value::String(s) => parts.push(s.clone()),
            other => {
                return Err(invocation.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("join() requires strings, found {}", other.type_name()),
                ));
            }
        }
    }
    Ok(invocation.unchanged(string_result(parts.join(&separator))))
}

pub fn trim_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let Some(text) = input_string(invocation, "trim")? else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    Ok(invocation.unchanged(string_result(text.trim().to_string())))
}

/// `encode(format)` with `base64`, `urlbase64`, or `hex`.
pub fn encode_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(format)) = (
        input_string(invocation, "encode")?,
        argument_string(invocation, 0, "encode")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let encoded = match format.as_str() {
        "base64" => base64::engine::general_purpose::STANDARD.encode(text.as_bytes()),
        "urlbase64" => base64::engine::general_purpose::URL_SAFE.encode(text.as_bytes()),
        "hex" => hex::encode(text.as_bytes()),
        other => {
            return Err(invocation.error(
                ErrorCode::INVALID_OPERAND,
                format!("unknown encoding '{}'", other),
            ));
        }
    };
    Ok(invocation.unchanged(string_result(encoded)))
}

/// `decode(format)` — inverse of [`encode_function`]; undecodable input
/// answers empty.
pub fn decode_function(invocation: &FunctionInvocation) -> Result<EvalOutput, EngineError> {
    let (Some(text), Some(format)) = (
        input_string(invocation, "decode")?,
        argument_string(invocation, 0, "decode")?,
    ) else {
        return Ok(invocation.unchanged(Vec::new()));
    };
    let bytes = match format.as_str() {
        "base64" => base64::engine::general_purpose::STANDARD.decode(text.as_bytes()).ok(),
        "urlbase64" => base64::engine::general_purpose::URL_SAFE.decode(text.as_bytes()).ok(),
        "hex" => hex::decode(text.as_bytes()).ok(),
        other => {
            return Err(invocation.error(
                ErrorCode::INVALID_OPERAND,
                format!("unknown encoding '{}'", other),
            ));
        }
    };
    let out = bytes
        .and_then(|b| String::from_utf8(b).ok())
        .map(string_result)
        .unwrap_or_default();
    Ok(invocation.unchanged(out))
}
