//! Type metadata for analysis and type operations.
//!
//! [`TypeInfo`] is what the analyzer attaches to AST nodes and what the
//! model provider trades in. The engine core only understands the `System`
//! primitives listed in [`TypeName`]; everything model-specific travels in
//! the opaque-to-the-core [`ModelContext`], with one exception: choice
//! types are an explicit [`ModelContext::Union`] variant so that `is` and
//! `as` can rule targets in or out without round-tripping through the
//! provider.

/// The primitive type universe of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeName {
    Any,
    Boolean,
    String,
    Integer,
    Long,
    Decimal,
    Date,
    DateTime,
    Time,
    Quantity,
}

impl TypeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeName::Any => "Any",
            TypeName::Boolean => "Boolean",
            TypeName::String => "String",
            TypeName::Integer => "Integer",
            TypeName::Long => "Long",
            TypeName::Decimal => "Decimal",
            TypeName::Date => "Date",
            TypeName::DateTime => "DateTime",
            TypeName::Time => "Time",
            TypeName::Quantity => "Quantity",
        }
    }

    /// Parse a type name, accepting both the `System` spelling and the
    /// lowercase FHIR primitive spelling (`boolean`, `integer`, ...).
    pub fn parse(name: &str) -> Option<TypeName> {
        match name {
            "Any" => Some(TypeName::Any),
            "Boolean" | "boolean" => Some(TypeName::Boolean),
            "String" | "string" => Some(TypeName::String),
            "Integer" | "integer" => Some(TypeName::Integer),
            "Long" | "integer64" => Some(TypeName::Long),
            "Decimal" | "decimal" => Some(TypeName::Decimal),
            "Date" | "date" => Some(TypeName::Date),
            "DateTime" | "dateTime" => Some(TypeName::DateTime),
            "Time" | "time" => Some(TypeName::Time),
            "Quantity" => Some(TypeName::Quantity),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeName::Integer | TypeName::Long | TypeName::Decimal)
    }

    /// Whether a value of type `self` is acceptable where `target` is
    /// expected, under the language's widening rules:
    /// `Integer ≤ Long ≤ Decimal`, `Date ≤ DateTime`, and `Any` matches
    /// everything on either side.
    pub fn matches(&self, target: TypeName) -> bool {
        if *self == target || *self == TypeName::Any || target == TypeName::Any {
            return true;
        }
        match (*self, target) {
            (TypeName::Integer, TypeName::Long | TypeName::Decimal) => true,
            (TypeName::Long, TypeName::Decimal) => true,
            (TypeName::Date, TypeName::DateTime) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred or declared type of an expression or element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Primitive classification. Complex model types use [`TypeName::Any`]
    /// and carry their identity in `namespace`/`name`/`model_context`.
    pub type_name: TypeName,
    /// `Some(true)` when the value is known to be a single item,
    /// `Some(false)` when it is known to be a collection, `None` when
    /// cardinality is unknown.
    pub singleton: Option<bool>,
    /// Declaring namespace, e.g. `System` or `FHIR`.
    pub namespace: Option<String>,
    /// Concrete type name within the namespace, e.g. `Patient`.
    pub name: Option<String>,
    /// Model-specific payload; interpreted by the model provider except
    /// for [`ModelContext::Union`], which `is`/`as` dispatch on directly.
    pub model_context: Option<ModelContext>,
}

impl TypeInfo {
    /// A `System` primitive singleton.
    pub fn system(type_name: TypeName) -> Self {
        Self {
            type_name,
            singleton: Some(true),
            namespace: Some("System".to_string()),
            name: Some(type_name.as_str().to_string()),
            model_context: None,
        }
    }

    /// A named model type (complex type or resource).
    pub fn model(namespace: &str, name: &str) -> Self {
        Self {
            type_name: TypeName::Any,
            singleton: Some(true),
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            model_context: None,
        }
    }

    pub fn with_singleton(mut self, singleton: bool) -> Self {
        self.singleton = Some(singleton);
        self
    }

    pub fn with_context(mut self, context: ModelContext) -> Self {
        self.model_context = Some(context);
        self
    }

    /// Collection-of-`self`.
    pub fn as_collection(mut self) -> Self {
        self.singleton = Some(false);
        self
    }

    /// Qualified display name, `System.Boolean` style.
    pub fn display_name(&self) -> String {
        match (&self.namespace, &self.name) {
            (Some(ns), Some(name)) => format!("{}.{}", ns, name),
            (None, Some(name)) => name.clone(),
            _ => self.type_name.as_str().to_string(),
        }
    }
}

/// Model-provider payload attached to a [`TypeInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelContext {
    /// The type is a resource with the given `resourceType`.
    Resource { resource_type: String },
    /// The type is an element at the given dotted path within a resource.
    Element { path: String },
    /// A choice type: the element's concrete type is one of `choices`.
    /// `is`/`as` answer `false`/empty outright for targets not listed.
    Union { choices: Vec<TypeInfo> },
}

impl ModelContext {
    /// For a union, whether `target` names one of the choices; `true` for
    /// every other context (the core cannot rule anything out).
    pub fn admits(&self, target: &str) -> bool {
        match self {
            ModelContext::Union { choices } => choices.iter().any(|c| {
                c.name.as_deref() == Some(target) || c.type_name.as_str() == target
            }),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_rules() {
        assert!(TypeName::Integer.matches(TypeName::Decimal));
        assert!(TypeName::Integer.matches(TypeName::Long));
        assert!(TypeName::Long.matches(TypeName::Decimal));
        assert!(TypeName::Date.matches(TypeName::DateTime));
        assert!(!TypeName::Decimal.matches(TypeName::Integer));
        assert!(TypeName::Any.matches(TypeName::Quantity));
        assert!(TypeName::String.matches(TypeName::Any));
    }

    #[test]
    fn test_union_admits_only_choices() {
        let union = ModelContext::Union {
            choices: vec![
                TypeInfo::system(TypeName::Quantity),
                TypeInfo::model("FHIR", "CodeableConcept"),
            ],
        };
        assert!(union.admits("Quantity"));
        assert!(union.admits("CodeableConcept"));
        assert!(!union.admits("Ratio"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            TypeInfo::system(TypeName::Boolean).display_name(),
            "System.Boolean"
        );
        assert_eq!(TypeInfo::model("FHIR", "Patient").display_name(), "FHIR.Patient");
    }
}
