//! # FHIRPath Support Types
//!
//! Foundational types shared by every stage of the Lumen FHIRPath engine
//! and by external integrators: the runtime value model, type metadata,
//! precision date/time values, LSP-shaped positions and diagnostics, the
//! structured error taxonomy, and the capability traits the engine
//! consumes its collaborators through.
//!
//! ## Core Types
//!
//! - [`Value`] / [`BoxedValue`] / [`Collection`] — the runtime value model
//! - [`TypeInfo`] / [`ModelContext`] — type metadata for analysis and
//!   `is`/`as`/`ofType`
//! - [`PrecisionDate`] / [`PrecisionDateTime`] / [`PrecisionTime`] —
//!   precision-preserving temporal values
//! - [`EngineError`] / [`Diagnostic`] — stable-coded errors and
//!   LSP-compatible diagnostics
//! - [`ModelProvider`] / [`QuantityBackend`] — external capability seams
//!
//! ## Usage Example
//!
//! ```rust
//! use lumen_fhirpath_support::{to_collection, unboxed, Value};
//! use serde_json::json;
//!
//! let raw = Value::from_json(&json!(["a", "b"]));
//! let collection = to_collection(raw);
//! assert_eq!(collection.len(), 2);
//! assert_eq!(
//!     unboxed(&collection),
//!     vec![Value::String("a".into()), Value::String("b".into())]
//! );
//! ```

pub mod date_time;
pub mod error;
pub mod span;
pub mod traits;
pub mod type_info;
pub mod value;

pub use date_time::{DatePrecision, PrecisionDate, PrecisionDateTime, PrecisionTime, TimePrecision};
pub use error::{Diagnostic, EngineError, ErrorClass, ErrorCode, Severity};
pub use span::{Position, Range};
pub use traits::{ModelProvider, QuantityBackend};
pub use type_info::{ModelContext, TypeInfo, TypeName};
pub use value::{flatten, singleton, to_collection, unboxed, BoxedValue, Collection, Value};
