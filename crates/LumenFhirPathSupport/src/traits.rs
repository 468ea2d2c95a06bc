//! External capability traits.
//!
//! The engine core treats the FHIR type model and UCUM arithmetic as
//! collaborators behind these two traits. Both are object-safe and shared
//! as `Arc<dyn …>`; implementations must be internally consistent under
//! concurrent reads, since the core never takes a lock around them.

use crate::type_info::TypeInfo;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Supplies type metadata for model types (resources, elements, choice
/// types). Consumed by the analyzer for type annotation and by the
/// interpreter to disambiguate `is`/`as` on choice types.
///
/// Without a provider the engine still evaluates; it just cannot annotate
/// model types or rule out choice-type targets, and falls back to
/// primitive-kind and `resourceType` checks.
pub trait ModelProvider: Send + Sync {
    /// Resolve a type by name, e.g. `Patient` or `HumanName`.
    fn get_type(&self, name: &str) -> Option<TypeInfo>;

    /// Type of the `property` element of `parent`, or `None` when the
    /// model has no such element.
    fn get_element_type(&self, parent: &TypeInfo, property: &str) -> Option<TypeInfo>;

    /// Narrow `source` to `target` for `ofType`/`as`; `None` when the
    /// narrowing is impossible.
    fn of_type(&self, source: &TypeInfo, target: &str) -> Option<TypeInfo>;

    /// All element names of `parent`, for diagnostics and completion.
    fn get_element_names(&self, parent: &TypeInfo) -> Vec<String>;

    /// Common type of all children of `parent` (`children()`/
    /// `descendants()` result typing), if the model defines one.
    fn get_children_type(&self, parent: &TypeInfo) -> Option<TypeInfo>;

    /// Every resource type name the model knows.
    fn get_resource_types(&self) -> Vec<String>;
}

/// Performs quantity arithmetic and unit conversion.
///
/// Every method answers `None` for incommensurable units or invalid unit
/// expressions; the owning operator turns that into an empty result, per
/// the language's empty-propagation rules.
pub trait QuantityBackend: Send + Sync {
    /// `left + right`, converting `right` into `left`'s unit.
    fn add(&self, left: (Decimal, &str), right: (Decimal, &str)) -> Option<(Decimal, String)>;

    /// `left - right`, converting `right` into `left`'s unit.
    fn subtract(&self, left: (Decimal, &str), right: (Decimal, &str))
    -> Option<(Decimal, String)>;

    /// `left * right` with unit composition (e.g. `m * m -> m.m`).
    fn multiply(&self, left: (Decimal, &str), right: (Decimal, &str))
    -> Option<(Decimal, String)>;

    /// `left / right` with unit composition (e.g. `m / s -> m/s`).
    fn divide(&self, left: (Decimal, &str), right: (Decimal, &str))
    -> Option<(Decimal, String)>;

    /// Ordering of two commensurable quantities.
    fn compare(&self, left: (Decimal, &str), right: (Decimal, &str)) -> Option<Ordering>;

    /// Convert `value` from one unit to another.
    fn convert(&self, value: Decimal, from: &str, to: &str) -> Option<Decimal>;

    /// Whether `unit` is a valid unit expression for this backend.
    fn validate_unit(&self, unit: &str) -> bool;
}
