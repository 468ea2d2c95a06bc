//! # Lumen FHIRPath Engine
//!
//! An implementation of the FHIRPath expression language — the
//! path-navigation and query language for FHIR resources — evaluated over
//! JSON document trees.
//!
//! ## Overview
//!
//! FHIRPath lets you:
//! - **Navigate resources** with path expressions (`Patient.name.given`)
//! - **Filter collections** with predicates (`telecom.where(system = 'email')`)
//! - **Transform data** with built-in functions (`name.given.first()`)
//! - **Compute** with arithmetic, logical, and comparison operators
//! - **Test and narrow types** (`value is Quantity`, `value.ofType(Quantity)`)
//! - **Bind variables** (`defineVariable('x', ...)`, externally supplied `%vars`)
//!
//! ## Architecture
//!
//! The pipeline is lexer → parser → analyzer → interpreter:
//!
//! - [`lexer`]: source text to position-tagged tokens
//! - [`parser`]: Pratt (precedence-climbing) parse to an AST with ranges,
//!   with an error-recovery mode for editors
//! - [`registry`]: the operator/function catalogue driving parser
//!   precedence, analyzer validation, and interpreter dispatch
//! - [`analyzer`]: diagnostics plus optional type annotation via a
//!   pluggable model provider
//! - [`interpreter`]: tree-walking evaluation over boxed-value
//!   collections with three-valued logic and scoped variables
//!
//! The FHIR type model and UCUM quantity arithmetic are collaborators
//! behind the [`ModelProvider`] and [`QuantityBackend`] traits; the engine
//! ships a UCUM-backed default for the latter and none for the former.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lumen_fhir_path::{evaluate, EvaluateOptions};
//! use serde_json::json;
//!
//! let patient = json!({
//!     "resourceType": "Patient",
//!     "name": [
//!         { "use": "official", "given": ["John", "Q"] },
//!         { "use": "nickname", "given": ["Johnny"] }
//!     ]
//! });
//!
//! let result = evaluate(
//!     "Patient.name.where(use = 'official').given.first()",
//!     EvaluateOptions::new().with_input(patient),
//! )?;
//! // result == [Value::String("John")]
//! # Ok::<(), lumen_fhir_path::EngineError>(())
//! ```
//!
//! ## Error handling
//!
//! [`evaluate`] raises a structured [`EngineError`] with a stable code and
//! source range. [`analyze`] never raises for semantic problems — they
//! come back as [`Diagnostic`]s — and only raises when recovery is off and
//! the parse itself failed.

pub mod analyzer;
pub mod context;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod ucum;

mod aggregate_function;
mod arithmetic;
mod boolean_functions;
mod collection_functions;
mod comparison;
mod conversion_functions;
mod date_operation;
mod define_variable_function;
mod distinct_functions;
mod extension_function;
mod logic;
mod math_functions;
mod not_function;
mod repeat_function;
mod set_operations;
mod string_functions;
mod subset_functions;
mod trace_function;
mod type_function;

pub use context::{EvaluationContext, TraceEntry};
pub use lumen_fhirpath_support::{
    BoxedValue, Collection, Diagnostic, EngineError, ErrorCode, ModelContext, ModelProvider,
    Position, QuantityBackend, Range, Severity, TypeInfo, TypeName, Value,
};
pub use parser::{
    Expression, ExpressionKind, LiteralValue, NodeId, ParseMode, ParseOptions, ParseOutcome,
};

use analyzer::{Analysis, Analyzer};
use lumen_fhirpath_support::to_collection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Parse an expression.
///
/// In [`ParseMode::Strict`] the first syntax error is returned as `Err`;
/// in [`ParseMode::Recovery`] the outcome always carries an AST (with
/// `Error` nodes at failure sites) plus the collected errors.
pub fn parse(source: &str, options: ParseOptions) -> Result<ParseOutcome, EngineError> {
    tracing::debug!(target: "fhirpath", source, "parse");
    parser::parse_source(source, options)
}

/// Options for [`analyze`].
#[derive(Default, Clone)]
pub struct AnalyzeOptions {
    /// User variable names available to the expression, with or without
    /// their `%` prefix.
    pub variables: Vec<String>,
    pub model_provider: Option<Arc<dyn ModelProvider>>,
    /// Declared type of the evaluation input, enabling navigation typing.
    pub input_type: Option<TypeInfo>,
    /// Parse in recovery mode and report syntax errors as diagnostics.
    pub error_recovery: bool,
}

impl AnalyzeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    pub fn with_input_type(mut self, input_type: TypeInfo) -> Self {
        self.input_type = Some(input_type);
        self
    }

    pub fn with_error_recovery(mut self) -> Self {
        self.error_recovery = true;
        self
    }
}

/// Result of [`analyze`].
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub ast: Expression,
    pub diagnostics: Vec<Diagnostic>,
    /// Inferred node types, keyed by [`NodeId`].
    pub types: HashMap<NodeId, TypeInfo>,
}

/// Parse and semantically analyze an expression.
///
/// Semantic findings come back as diagnostics; the call only fails when
/// `error_recovery` is off and parsing itself failed.
pub fn analyze(source: &str, options: AnalyzeOptions) -> Result<AnalysisOutcome, EngineError> {
    tracing::debug!(target: "fhirpath", source, "analyze");
    let parse_options = ParseOptions {
        mode: if options.error_recovery {
            ParseMode::Recovery
        } else {
            ParseMode::Strict
        },
        ..ParseOptions::default()
    };
    let outcome = parser::parse_source(source, parse_options)?;
    let mut diagnostics: Vec<Diagnostic> = outcome
        .errors
        .iter()
        .map(|e| e.to_diagnostic(Severity::Error, "fhirpath-parser"))
        .collect();
    let analysis: Analysis = Analyzer::new(options.model_provider.clone()).analyze(
        &outcome.ast,
        options.input_type.clone(),
        &options.variables,
    );
    diagnostics.extend(analysis.diagnostics);
    Ok(AnalysisOutcome {
        ast: outcome.ast,
        diagnostics,
        types: analysis.types,
    })
}

/// Options for [`evaluate`].
#[derive(Default, Clone)]
pub struct EvaluateOptions {
    /// The root value. A single value is wrapped; a JSON array becomes
    /// the input sequence.
    pub input: Option<serde_json::Value>,
    /// External variables; names may carry their `%` prefix or not.
    pub variables: HashMap<String, serde_json::Value>,
    pub model_provider: Option<Arc<dyn ModelProvider>>,
    /// Quantity arithmetic backend; defaults to [`ucum::UcumBackend`].
    pub quantity_backend: Option<Arc<dyn QuantityBackend>>,
}

impl EvaluateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_variable(mut self, name: &str, value: serde_json::Value) -> Self {
        self.variables.insert(name.to_string(), value);
        self
    }

    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    pub fn with_quantity_backend(mut self, backend: Arc<dyn QuantityBackend>) -> Self {
        self.quantity_backend = Some(backend);
        self
    }
}

/// Evaluate an expression and return the raw result sequence.
pub fn evaluate(source: &str, options: EvaluateOptions) -> Result<Vec<Value>, EngineError> {
    tracing::debug!(target: "fhirpath", source, "evaluate");
    let outcome = parser::parse_source(source, ParseOptions::default())?;
    let (input, context) = build_context(&options);
    let output = interpreter::evaluate(&outcome.ast, &input, &context)?;
    Ok(lumen_fhirpath_support::unboxed(&output.value))
}

/// Options for [`inspect`].
#[derive(Default, Clone)]
pub struct InspectOptions {
    pub input: Option<serde_json::Value>,
    pub variables: HashMap<String, serde_json::Value>,
    pub model_provider: Option<Arc<dyn ModelProvider>>,
    pub quantity_backend: Option<Arc<dyn QuantityBackend>>,
    /// Collect `trace()` outputs into the report.
    pub include_traces: bool,
    /// Maximum AST nesting depth accepted before evaluation is refused;
    /// a guard for untrusted expressions.
    pub max_depth: Option<usize>,
}

/// Per-stage wall-clock timings of an [`inspect`] run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectTimings {
    pub parse_micros: u128,
    pub analyze_micros: u128,
    pub evaluate_micros: u128,
    pub total_micros: u128,
}

/// The full report produced by [`inspect`].
#[derive(Debug, Clone)]
pub struct Inspection {
    pub result: Vec<Value>,
    pub ast: Expression,
    pub diagnostics: Vec<Diagnostic>,
    pub timings: InspectTimings,
    pub traces: Vec<TraceEntry>,
}

/// Evaluate with full introspection: the result alongside the AST,
/// diagnostics, per-stage timings, and (optionally) `trace()` output.
///
/// Parsing runs in recovery mode so diagnostics are as complete as
/// possible; evaluation is only attempted on a clean parse.
pub fn inspect(source: &str, options: InspectOptions) -> Result<Inspection, EngineError> {
    tracing::debug!(target: "fhirpath", source, "inspect");
    let started = Instant::now();

    let parse_started = Instant::now();
    let outcome = parser::parse_source(
        source,
        ParseOptions {
            mode: ParseMode::Recovery,
            ..ParseOptions::default()
        },
    )?;
    let parse_micros = parse_started.elapsed().as_micros();

    let analyze_started = Instant::now();
    let variable_names: Vec<String> = options.variables.keys().cloned().collect();
    let analysis =
        Analyzer::new(options.model_provider.clone()).analyze(&outcome.ast, None, &variable_names);
    let mut diagnostics: Vec<Diagnostic> = outcome
        .errors
        .iter()
        .map(|e| e.to_diagnostic(Severity::Error, "fhirpath-parser"))
        .collect();
    diagnostics.extend(analysis.diagnostics);
    let analyze_micros = analyze_started.elapsed().as_micros();

    if let Some(max_depth) = options.max_depth {
        let depth = expression_depth(&outcome.ast);
        if depth > max_depth {
            return Err(EngineError::new(
                ErrorCode::INVALID_OPERAND,
                format!("expression depth {} exceeds the limit of {}", depth, max_depth),
            )
            .with_range(outcome.ast.range));
        }
    }

    let evaluate_options = EvaluateOptions {
        input: options.input.clone(),
        variables: options.variables.clone(),
        model_provider: options.model_provider.clone(),
        quantity_backend: options.quantity_backend.clone(),
    };
    let evaluate_started = Instant::now();
    let (result, traces) = if outcome.errors.is_empty() {
        let (input, context) = build_context(&evaluate_options);
        let output = interpreter::evaluate(&outcome.ast, &input, &context)?;
        let traces = if options.include_traces {
            context.take_traces()
        } else {
            Vec::new()
        };
        (lumen_fhirpath_support::unboxed(&output.value), traces)
    } else {
        (Vec::new(), Vec::new())
    };
    let evaluate_micros = evaluate_started.elapsed().as_micros();

    Ok(Inspection {
        result,
        ast: outcome.ast,
        diagnostics,
        timings: InspectTimings {
            parse_micros,
            analyze_micros,
            evaluate_micros,
            total_micros: started.elapsed().as_micros(),
        },
        traces,
    })
}

fn build_context(options: &EvaluateOptions) -> (Collection, EvaluationContext) {
    let input = options
        .input
        .as_ref()
        .map(|json| to_collection(Value::from_json(json)))
        .unwrap_or_default();
    let variables = options
        .variables
        .iter()
        .map(|(name, json)| (name.clone(), to_collection(Value::from_json(json))))
        .collect();
    let quantity = options
        .quantity_backend
        .clone()
        .unwrap_or_else(|| Arc::new(ucum::UcumBackend::new()));
    let context = EvaluationContext::create(
        input.clone(),
        variables,
        options.model_provider.clone(),
        quantity,
    );
    (input, context)
}

fn expression_depth(expr: &Expression) -> usize {
    let children: Vec<&Expression> = match &expr.kind {
        ExpressionKind::Binary { left, right, .. } => vec![left, right],
        ExpressionKind::Unary { operand, .. } => vec![operand],
        ExpressionKind::Function { callee, arguments } => {
            let mut v: Vec<&Expression> = vec![callee];
            v.extend(arguments.iter());
            v
        }
        ExpressionKind::Index { expression, index } => vec![expression, index],
        ExpressionKind::Collection(elements) => elements.iter().collect(),
        ExpressionKind::MembershipTest { expression, .. }
        | ExpressionKind::TypeCast { expression, .. } => vec![expression],
        _ => Vec::new(),
    };
    1 + children.into_iter().map(expression_depth).max().unwrap_or(0)
}
