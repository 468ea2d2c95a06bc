//! # Semantic Analyzer
//!
//! Walks the AST, validating names and arities and — when a model
//! provider is available — annotating nodes with inferred types. The
//! analyzer never throws: every finding becomes a [`Diagnostic`] with a
//! stable code and the offending node's range, and analysis continues so
//! an editor gets the full picture in one pass.
//!
//! Type annotations live in a side table keyed by [`NodeId`] rather than
//! on the AST itself, so the tree stays immutable and shareable.
//!
//! ## Variable tracking
//!
//! The analyzer mirrors the interpreter's scoping: `defineVariable` with a
//! literal name makes that name known to the rest of its pipeline, both
//! sides of a union get independent copies of the scope, and iterator
//! arguments see `$this`/`$index`/`$total`. Unknown variables are
//! reported with the same code the interpreter would fail with.

use crate::parser::{Expression, ExpressionKind, LiteralValue, NodeId};
use crate::registry::{Registry, ReturnTyping};
use lumen_fhirpath_support::{
    Diagnostic, ErrorCode, ModelProvider, Range, Severity, TypeInfo, TypeName,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const DIAGNOSTIC_SOURCE: &str = "fhirpath-analyzer";

/// Result of analyzing one expression.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub diagnostics: Vec<Diagnostic>,
    /// Inferred types, keyed by node identity.
    pub types: HashMap<NodeId, TypeInfo>,
}

/// See the module docs.
pub struct Analyzer {
    registry: &'static Registry,
    model: Option<Arc<dyn ModelProvider>>,
    diagnostics: Vec<Diagnostic>,
    types: HashMap<NodeId, TypeInfo>,
}

impl Analyzer {
    pub fn new(model: Option<Arc<dyn ModelProvider>>) -> Self {
        Self {
            registry: Registry::global(),
            model,
            diagnostics: Vec::new(),
            types: HashMap::new(),
        }
    }

    /// Analyze `expr` evaluated against an input of `input_type`, with
    /// `user_variables` available (names with or without `%` prefix).
    pub fn analyze(
        mut self,
        expr: &Expression,
        input_type: Option<TypeInfo>,
        user_variables: &[String],
    ) -> Analysis {
        let mut scope: HashSet<String> = [
            "$this",
            "$index",
            "$total",
            "%context",
            "%resource",
            "%rootResource",
            "%ucum",
            "%sct",
            "%loinc",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        for name in user_variables {
            scope.insert(normalize_variable(name));
        }
        self.analyze_node(expr, input_type.as_ref(), &mut scope);
        Analysis {
            diagnostics: self.diagnostics,
            types: self.types,
        }
    }

    fn report(&mut self, code: ErrorCode, severity: Severity, message: String, range: Range) {
        self.diagnostics.push(Diagnostic {
            range,
            severity,
            code: code.to_string(),
            source: DIAGNOSTIC_SOURCE.to_string(),
            message,
        });
    }

    fn annotate(&mut self, id: NodeId, type_info: Option<TypeInfo>) -> Option<TypeInfo> {
        if let Some(t) = &type_info {
            self.types.insert(id, t.clone());
        }
        type_info
    }

    fn analyze_node(
        &mut self,
        expr: &Expression,
        input_type: Option<&TypeInfo>,
        scope: &mut HashSet<String>,
    ) -> Option<TypeInfo> {
        match &expr.kind {
            ExpressionKind::Literal(literal) => {
                let type_info = literal_type(literal);
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::Identifier(name) => {
                let type_info = self.navigation_type(input_type, name, expr.range);
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::TypeOrIdentifier(name) => {
                let type_info = self
                    .model
                    .as_ref()
                    .and_then(|m| m.get_type(name))
                    .or_else(|| self.navigation_type(input_type, name, expr.range));
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::Variable(name) => {
                if !scope.contains(name.as_str()) {
                    self.report(
                        ErrorCode::VARIABLE_NOT_DEFINED,
                        Severity::Error,
                        format!("variable '{}' is not defined", name),
                        expr.range,
                    );
                }
                let type_info = match name.as_str() {
                    "$index" | "$total" => Some(TypeInfo::system(TypeName::Integer)),
                    "$this" => input_type.cloned(),
                    _ => None,
                };
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                let type_info = self.analyze_binary(operator, left, right, input_type, scope);
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::Unary { operator, operand } => {
                let operand_type = self.analyze_node(operand, input_type, scope);
                if !self.registry.is_unary_operator(operator) {
                    self.report(
                        ErrorCode::UNKNOWN_OPERATOR,
                        Severity::Error,
                        format!("unknown unary operator '{}'", operator),
                        expr.range,
                    );
                }
                let type_info = match operator.as_str() {
                    "not" => Some(TypeInfo::system(TypeName::Boolean)),
                    _ => operand_type,
                };
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::Function { callee, arguments } => {
                let type_info = self.analyze_function(callee, arguments, input_type, scope);
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::Index { expression, index } => {
                let base = self.analyze_node(expression, input_type, scope);
                let mut index_scope = scope.clone();
                self.analyze_node(index, input_type, &mut index_scope);
                let type_info = base.map(|t| t.with_singleton(true));
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::Collection(elements) => {
                let mut element_types = Vec::new();
                for element in elements {
                    let mut element_scope = scope.clone();
                    element_types.push(self.analyze_node(element, input_type, &mut element_scope));
                }
                // Homogeneous literals keep their element type; anything
                // mixed or unknown falls back to a collection of Any.
                let type_info = match homogeneous(&element_types) {
                    Some(t) => Some(t.as_collection()),
                    None => Some(TypeInfo::system(TypeName::Any).as_collection()),
                };
                self.annotate(expr.id, type_info)
            }
            ExpressionKind::MembershipTest { expression, .. } => {
                self.analyze_node(expression, input_type, scope);
                self.annotate(expr.id, Some(TypeInfo::system(TypeName::Boolean)))
            }
            ExpressionKind::TypeCast {
                expression,
                type_name,
            } => {
                self.analyze_node(expression, input_type, scope);
                let target = self.resolve_type_name(type_name);
                self.annotate(expr.id, target)
            }
            ExpressionKind::Quantity { .. } => {
                self.annotate(expr.id, Some(TypeInfo::system(TypeName::Quantity)))
            }
            ExpressionKind::Error { message, .. } => {
                self.report(
                    ErrorCode::INVALID_SYNTAX,
                    Severity::Error,
                    message.clone(),
                    expr.range,
                );
                None
            }
        }
    }

    fn analyze_binary(
        &mut self,
        operator: &str,
        left: &Expression,
        right: &Expression,
        input_type: Option<&TypeInfo>,
        scope: &mut HashSet<String>,
    ) -> Option<TypeInfo> {
        match operator {
            "." => {
                // Pipeline: defineVariable on the left is visible on the
                // right, and the left's type feeds the right.
                let left_type = self.analyze_node(left, input_type, scope);
                self.analyze_node(right, left_type.as_ref(), scope)
            }
            "|" => {
                let mut left_scope = scope.clone();
                let left_type = self.analyze_node(left, input_type, &mut left_scope);
                let mut right_scope = scope.clone();
                let right_type = self.analyze_node(right, input_type, &mut right_scope);
                match (left_type, right_type) {
                    (Some(a), Some(b)) if a.type_name == b.type_name => Some(a.as_collection()),
                    _ => Some(TypeInfo::system(TypeName::Any).as_collection()),
                }
            }
            _ => {
                let mut left_scope = scope.clone();
                let left_type = self.analyze_node(left, input_type, &mut left_scope);
                let mut right_scope = scope.clone();
                let right_type = self.analyze_node(right, input_type, &mut right_scope);
                let Some(def) = self.registry.binary_operator(operator) else {
                    self.report(
                        ErrorCode::UNKNOWN_OPERATOR,
                        Severity::Error,
                        format!("unknown operator '{}'", operator),
                        left.range.covering(right.range),
                    );
                    return None;
                };
                let left_name = left_type.map(|t| t.type_name);
                let right_name = right_type.map(|t| t.type_name);
                def.signatures
                    .iter()
                    .find(|signature| {
                        left_name.is_none_or(|t| t.matches(signature.left))
                            && right_name.is_none_or(|t| t.matches(signature.right))
                    })
                    .map(|signature| {
                        // Decimal operands widen an Integer-signature result.
                        let result = if signature.result == TypeName::Integer
                            && (left_name == Some(TypeName::Decimal)
                                || right_name == Some(TypeName::Decimal))
                        {
                            TypeName::Decimal
                        } else {
                            signature.result
                        };
                        TypeInfo::system(result)
                    })
            }
        }
    }

    fn analyze_function(
        &mut self,
        callee: &Expression,
        arguments: &[Expression],
        input_type: Option<&TypeInfo>,
        scope: &mut HashSet<String>,
    ) -> Option<TypeInfo> {
        let name = match &callee.kind {
            ExpressionKind::Identifier(name) | ExpressionKind::TypeOrIdentifier(name) => name,
            _ => return None,
        };
        let Some(def) = self.registry.function(name) else {
            self.report(
                ErrorCode::UNKNOWN_FUNCTION,
                Severity::Error,
                format!("unknown function '{}'", name),
                callee.range,
            );
            for argument in arguments {
                let mut argument_scope = scope.clone();
                self.analyze_node(argument, input_type, &mut argument_scope);
            }
            return None;
        };
        let return_typing = def.return_typing;
        let (min_arity, max_arity, arity_text) =
            (def.min_arity, def.max_arity, def.arity_description());
        if arguments.len() < min_arity || max_arity.is_some_and(|max| arguments.len() > max) {
            self.report(
                ErrorCode::WRONG_ARGUMENT_COUNT,
                Severity::Error,
                format!(
                    "function '{}' expects {} argument(s), got {}",
                    name,
                    arity_text,
                    arguments.len()
                ),
                callee.range,
            );
        }

        // ofType's argument is a type name, not a navigable expression.
        if name == "ofType" {
            return arguments
                .first()
                .and_then(crate::type_function::type_name_from_expression)
                .and_then(|target| self.resolve_type_name(&target))
                .map(TypeInfo::as_collection);
        }

        // Iterator arguments see an item of the input's element type.
        let item_type = input_type.cloned().map(|t| t.with_singleton(true));
        let mut argument_types = Vec::new();
        for argument in arguments {
            let mut argument_scope = scope.clone();
            argument_types.push(self.analyze_node(argument, item_type.as_ref(), &mut argument_scope));
        }

        // A defineVariable with a literal name extends the pipeline scope.
        if name == "defineVariable" {
            if let Some(Expression {
                kind: ExpressionKind::Literal(LiteralValue::String(variable_name)),
                ..
            }) = arguments.first()
            {
                scope.insert(normalize_variable(variable_name));
            }
        }

        match return_typing {
            ReturnTyping::Fixed(type_name) => Some(TypeInfo::system(type_name)),
            ReturnTyping::FixedCollection(type_name) => {
                Some(TypeInfo::system(type_name).as_collection())
            }
            ReturnTyping::Input => input_type.cloned(),
            ReturnTyping::InputItem => input_type.cloned().map(|t| t.with_singleton(true)),
            ReturnTyping::Unknown => match name.as_str() {
                // select's result type is its projection's type.
                "select" => argument_types.into_iter().next().flatten(),
                _ => None,
            },
        }
    }

    /// Navigation typing plus unknown-property detection: when the model
    /// knows the parent type's elements and the property is not among
    /// them, report a warning.
    fn navigation_type(
        &mut self,
        input_type: Option<&TypeInfo>,
        property: &str,
        range: Range,
    ) -> Option<TypeInfo> {
        let model = self.model.as_ref()?;
        let parent = input_type?;
        match model.get_element_type(parent, property) {
            Some(element) => Some(element),
            None => {
                let known = model.get_element_names(parent);
                if !known.is_empty() && !known.iter().any(|n| n == property) {
                    self.report(
                        ErrorCode::UNKNOWN_PROPERTY,
                        Severity::Warning,
                        format!(
                            "type '{}' has no element '{}'",
                            parent.display_name(),
                            property
                        ),
                        range,
                    );
                }
                None
            }
        }
    }

    fn resolve_type_name(&self, name: &str) -> Option<TypeInfo> {
        let bare = name.rsplit('.').next().unwrap_or(name);
        if let Some(primitive) = TypeName::parse(bare) {
            return Some(TypeInfo::system(primitive));
        }
        self.model.as_ref().and_then(|m| m.get_type(bare))
    }
}

fn literal_type(literal: &LiteralValue) -> Option<TypeInfo> {
    let type_name = match literal {
        LiteralValue::Empty => return None,
        LiteralValue::Boolean(_) => TypeName::Boolean,
        LiteralValue::Integer(_) => TypeName::Integer,
        LiteralValue::Decimal(_) => TypeName::Decimal,
        LiteralValue::String(_) => TypeName::String,
        LiteralValue::Date(_) => TypeName::Date,
        LiteralValue::DateTime(_) => TypeName::DateTime,
        LiteralValue::Time(_) => TypeName::Time,
    };
    Some(TypeInfo::system(type_name))
}

fn homogeneous(types: &[Option<TypeInfo>]) -> Option<TypeInfo> {
    let mut iter = types.iter();
    let first = iter.next()?.clone()?;
    for t in iter {
        match t {
            Some(t) if t.type_name == first.type_name => {}
            _ => return None,
        }
    }
    Some(first)
}

fn normalize_variable(name: &str) -> String {
    if name.starts_with('%') || name.starts_with('$') {
        name.to_string()
    } else {
        format!("%{}", name)
    }
}
