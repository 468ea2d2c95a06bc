//! # Evaluation Context
//!
//! The runtime environment of an evaluation step: the current input and
//! focus collections, the variable scope, and the external collaborators
//! (model provider, quantity backend). Contexts are cheap to copy — every
//! field is either `Copy` or behind an `Arc` — so the interpreter creates
//! a child context per pipeline step, iterator frame, and
//! `defineVariable` without deep-copying anything.
//!
//! ## Variable scoping
//!
//! Scopes form a parent-pointer chain of immutable frames: defining a
//! variable allocates one new frame whose parent is the current scope
//! (O(1)), and lookup walks the chain (O(depth)). A variable defined in a
//! child frame is invisible to the parent and to sibling branches — the
//! two sides of a union each extend the same parent frame and never see
//! each other's bindings.
//!
//! ## Reserved names
//!
//! `%context`, `%resource`, and `%rootResource` are bound to the evaluation
//! root at creation; `%ucum`, `%sct`, and `%loinc` to their canonical
//! URLs. Attempting to redefine a system name, or to redefine any existing
//! user variable, is a silent no-op: [`EvaluationContext::set_variable`]
//! answers `None` and the caller keeps the context it already had.

use lumen_fhirpath_support::{
    BoxedValue, Collection, ModelProvider, QuantityBackend, Value,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// System environment names that can never be redefined by
/// `defineVariable`, with or without their `%` prefix.
const SYSTEM_VARIABLES: &[&str] = &["context", "resource", "rootResource", "ucum", "sct", "loinc"];

/// One frame in the lexical scope chain.
#[derive(Debug)]
struct ScopeFrame {
    bindings: HashMap<String, Collection>,
    parent: Option<Arc<ScopeFrame>>,
}

impl ScopeFrame {
    fn lookup(&self, name: &str) -> Option<&Collection> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.bindings.get(name) {
                return Some(value);
            }
            frame = frame.parent.as_deref()?;
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

/// A value traced during evaluation via the `trace()` function.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub name: String,
    pub value: Vec<Value>,
}

/// The runtime environment of an evaluation step.
#[derive(Clone)]
pub struct EvaluationContext {
    /// The collection the current expression node receives.
    pub input: Arc<Collection>,
    /// The current focus; follows `input` through pipeline steps.
    pub focus: Arc<Collection>,
    scope: Arc<ScopeFrame>,
    /// Optional type metadata source, used by `is`/`as`/`ofType` and by
    /// navigation to annotate boxed values.
    pub model: Option<Arc<dyn ModelProvider>>,
    /// Quantity arithmetic backend; defaults to the UCUM adapter.
    pub quantity: Arc<dyn QuantityBackend>,
    /// Values collected by `trace()`, shared across child contexts.
    pub traces: Arc<Mutex<Vec<TraceEntry>>>,
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("input", &self.input)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl EvaluationContext {
    /// Create a root context for evaluating against `input`.
    ///
    /// Binds `%context`/`%resource`/`%rootResource` (and `$this`) to the
    /// input, the terminology URL constants, and any caller-supplied
    /// variables (stored under their `%`-prefixed names).
    pub fn create(
        input: Collection,
        initial_variables: HashMap<String, Collection>,
        model: Option<Arc<dyn ModelProvider>>,
        quantity: Arc<dyn QuantityBackend>,
    ) -> Self {
        let mut bindings: HashMap<String, Collection> = HashMap::new();
        bindings.insert("%context".to_string(), input.clone());
        bindings.insert("%resource".to_string(), input.clone());
        bindings.insert("%rootResource".to_string(), input.clone());
        bindings.insert("$this".to_string(), input.clone());
        bindings.insert(
            "%ucum".to_string(),
            string_collection("http://unitsofmeasure.org"),
        );
        bindings.insert("%sct".to_string(), string_collection("http://snomed.info/sct"));
        bindings.insert("%loinc".to_string(), string_collection("http://loinc.org"));
        for (name, value) in initial_variables {
            bindings.insert(prefixed(&name), value);
        }
        let input = Arc::new(input);
        Self {
            focus: Arc::clone(&input),
            input,
            scope: Arc::new(ScopeFrame {
                bindings,
                parent: None,
            }),
            model,
            quantity,
            traces: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// O(1) child sharing every frame with the parent.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// The context for a pipeline step whose input is `input`. `$this`
    /// follows the input, so `e.$this` evaluates to `e`.
    pub fn with_input(&self, input: Collection) -> Self {
        let mut bindings = HashMap::new();
        bindings.insert("$this".to_string(), input.clone());
        let mut child = self.child_with_bindings(bindings);
        let input = Arc::new(input);
        child.focus = Arc::clone(&input);
        child.input = input;
        child
    }

    /// An iterator frame: `$this` bound to the single `item`, `$index` to
    /// its position. The frame is a child scope, so bindings vanish when
    /// the frame is dropped.
    pub fn with_iterator(&self, item: &BoxedValue, index: usize) -> Self {
        let mut bindings = HashMap::new();
        bindings.insert("$this".to_string(), vec![item.clone()]);
        bindings.insert(
            "$index".to_string(),
            vec![BoxedValue::new(Value::Integer(index as i64))],
        );
        self.child_with_bindings(bindings)
    }

    /// Bind `$total` for an `aggregate()` step on top of an iterator frame.
    pub fn with_total(&self, total: Collection) -> Self {
        let mut bindings = HashMap::new();
        bindings.insert("$total".to_string(), total);
        self.child_with_bindings(bindings)
    }

    fn child_with_bindings(&self, bindings: HashMap<String, Collection>) -> Self {
        Self {
            scope: Arc::new(ScopeFrame {
                bindings,
                parent: Some(Arc::clone(&self.scope)),
            }),
            ..self.clone()
        }
    }

    /// Define a user variable in a fresh child scope.
    ///
    /// Answers `None` — a silent no-op, per the language rules — when
    /// `name` is a system name, or when the variable is already defined
    /// and `allow_redefinition` is false. Callers detect the no-op by the
    /// `None` and keep their current context.
    pub fn set_variable(
        &self,
        name: &str,
        value: Collection,
        allow_redefinition: bool,
    ) -> Option<Self> {
        let bare = name.trim_start_matches(['%', '$']);
        if SYSTEM_VARIABLES.contains(&bare) {
            return None;
        }
        let key = prefixed(name);
        if !allow_redefinition && self.scope.is_bound(&key) {
            return None;
        }
        let mut bindings = HashMap::new();
        bindings.insert(key, value);
        Some(self.child_with_bindings(bindings))
    }

    /// Resolve `$name`, `%name`, or an unprefixed environment alias.
    pub fn get_variable(&self, name: &str) -> Option<Collection> {
        if let Some(value) = self.scope.lookup(name) {
            return Some(value.clone());
        }
        if !name.starts_with('%') && !name.starts_with('$') {
            return self.scope.lookup(&prefixed(name)).cloned();
        }
        None
    }

    pub fn is_variable_defined(&self, name: &str) -> bool {
        self.get_variable(name).is_some()
    }

    /// Record a `trace()` observation.
    pub fn push_trace(&self, name: &str, value: Vec<Value>) {
        self.traces.lock().push(TraceEntry {
            name: name.to_string(),
            value,
        });
    }

    /// Drain the traces collected so far.
    pub fn take_traces(&self) -> Vec<TraceEntry> {
        std::mem::take(&mut *self.traces.lock())
    }
}

/// Store user variable names with the `%` prefix; `$`-names keep theirs.
fn prefixed(name: &str) -> String {
    if name.starts_with('%') || name.starts_with('$') {
        name.to_string()
    } else {
        format!("%{}", name)
    }
}

fn string_collection(text: &str) -> Collection {
    vec![BoxedValue::new(Value::String(text.to_string()))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucum::UcumBackend;

    fn context() -> EvaluationContext {
        EvaluationContext::create(
            Vec::new(),
            HashMap::new(),
            None,
            Arc::new(UcumBackend::new()),
        )
    }

    #[test]
    fn test_child_bindings_do_not_leak_upward() {
        let parent = context();
        let child = parent
            .set_variable("x", string_collection("child"), false)
            .unwrap();
        assert!(child.get_variable("%x").is_some());
        assert!(parent.get_variable("%x").is_none());
    }

    #[test]
    fn test_redefinition_is_a_silent_no_op() {
        let ctx = context()
            .set_variable("x", string_collection("first"), false)
            .unwrap();
        assert!(ctx.set_variable("x", string_collection("second"), false).is_none());
        let value = ctx.get_variable("x").unwrap();
        assert_eq!(value[0].value, Value::String("first".to_string()));
    }

    #[test]
    fn test_system_names_cannot_be_shadowed() {
        let ctx = context();
        assert!(ctx.set_variable("context", Vec::new(), false).is_none());
        assert!(ctx.set_variable("%resource", Vec::new(), true).is_none());
        assert!(ctx.set_variable("ucum", Vec::new(), false).is_none());
    }

    #[test]
    fn test_environment_aliases_resolve_without_prefix() {
        let ctx = context();
        assert!(ctx.get_variable("ucum").is_some());
        assert!(ctx.get_variable("%ucum").is_some());
        assert!(ctx.get_variable("$this").is_some());
    }
}
