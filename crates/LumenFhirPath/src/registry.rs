//! # Operator & Function Registry
//!
//! The single catalogue of everything callable: symbol operators, keyword
//! operators, unary operators, and functions, each with its precedence or
//! arity, structural signatures for the analyzer, and an evaluator. The
//! parser consults the registry for precedence and associativity (and to
//! promote keyword identifiers like `and` into operators); the analyzer
//! validates names and arities and infers result types from signatures;
//! the interpreter dispatches through the evaluator pointers.
//!
//! The standard registry is built once behind a `Lazy` and is immutable
//! afterwards, so concurrent evaluations can read it without locks.
//! Additional functions can be registered on a freshly built registry at
//! startup, before it is shared.

use crate::context::EvaluationContext;
use crate::interpreter::{EvalOutput, FunctionInvocation};
use lumen_fhirpath_support::{Collection, EngineError, TypeName};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Operator associativity; everything is left-associative except
/// `implies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// Whether the operator is spelled as a symbol (`+`) or a keyword (`div`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCategory {
    Symbol,
    Keyword,
}

/// Precedence levels, high binds tighter.
pub mod precedence {
    pub const PIPELINE: u8 = 140;
    pub const INDEX: u8 = 130;
    pub const TYPE_TEST: u8 = 120;
    pub const UNARY: u8 = 110;
    pub const MULTIPLICATIVE: u8 = 100;
    pub const ADDITIVE: u8 = 90;
    pub const UNION: u8 = 80;
    pub const INEQUALITY: u8 = 70;
    pub const EQUALITY: u8 = 60;
    pub const MEMBERSHIP: u8 = 50;
    pub const AND: u8 = 40;
    pub const XOR: u8 = 30;
    pub const OR: u8 = 20;
    pub const IMPLIES: u8 = 10;
}

/// A structural operand signature used by the analyzer for result-type
/// inference. Matching applies the numeric widening rules of
/// [`TypeName::matches`].
#[derive(Debug, Clone, Copy)]
pub struct OperatorSignature {
    pub left: TypeName,
    pub right: TypeName,
    pub result: TypeName,
}

/// Evaluator for an eager binary operator: both operands are already
/// evaluated. Special-form operators (`.`, `[]`, `is`, `as`) carry no
/// evaluator; the interpreter implements their control flow itself.
pub type BinaryEvaluator =
    fn(&Collection, &Collection, &EvaluationContext) -> Result<Collection, EngineError>;

/// Evaluator for a unary operator.
pub type UnaryEvaluator = fn(&Collection, &EvaluationContext) -> Result<Collection, EngineError>;

/// Evaluator for a function; receives lazy argument nodes, see
/// [`FunctionInvocation`].
pub type FunctionEvaluator = fn(&FunctionInvocation) -> Result<EvalOutput, EngineError>;

/// A binary operator definition.
#[derive(Clone)]
pub struct OperatorDefinition {
    pub symbol: &'static str,
    pub name: &'static str,
    pub category: OperatorCategory,
    pub precedence: u8,
    pub associativity: Associativity,
    pub signatures: Vec<OperatorSignature>,
    pub evaluator: Option<BinaryEvaluator>,
}

/// A unary operator definition.
#[derive(Clone)]
pub struct UnaryDefinition {
    pub symbol: &'static str,
    pub name: &'static str,
    pub evaluator: UnaryEvaluator,
}

/// How the analyzer types a function's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTyping {
    /// A singleton of this primitive type.
    Fixed(TypeName),
    /// A collection of this primitive type.
    FixedCollection(TypeName),
    /// The same element type as the input collection.
    Input,
    /// A single item of the input's element type.
    InputItem,
    /// Not statically known.
    Unknown,
}

/// A function definition.
#[derive(Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub min_arity: usize,
    /// `None` means unbounded.
    pub max_arity: Option<usize>,
    pub return_typing: ReturnTyping,
    pub evaluator: FunctionEvaluator,
}

impl FunctionDefinition {
    /// Human-readable arity for error messages, e.g. `1..2` or `0`.
    pub fn arity_description(&self) -> String {
        match self.max_arity {
            Some(max) if max == self.min_arity => format!("{}", self.min_arity),
            Some(max) => format!("{}..{}", self.min_arity, max),
            None => format!("{}+", self.min_arity),
        }
    }
}

/// The immutable catalogue; see the module docs.
pub struct Registry {
    binary: HashMap<&'static str, OperatorDefinition>,
    unary: HashMap<&'static str, UnaryDefinition>,
    functions: HashMap<String, FunctionDefinition>,
}

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::standard);

impl Registry {
    /// The shared standard registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Look up a binary operator by symbol or keyword.
    pub fn binary_operator(&self, symbol: &str) -> Option<&OperatorDefinition> {
        self.binary.get(symbol)
    }

    /// Look up a unary operator.
    pub fn unary_operator(&self, symbol: &str) -> Option<&UnaryDefinition> {
        self.unary.get(symbol)
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.get(name)
    }

    /// Whether `word` is a keyword binary operator (`and`, `div`, `is`, ...).
    pub fn is_keyword_operator(&self, word: &str) -> bool {
        self.binary
            .get(word)
            .is_some_and(|def| def.category == OperatorCategory::Keyword)
    }

    /// Whether `symbol` is a symbol binary operator.
    pub fn is_symbol_operator(&self, symbol: &str) -> bool {
        self.binary
            .get(symbol)
            .is_some_and(|def| def.category == OperatorCategory::Symbol)
    }

    pub fn is_unary_operator(&self, symbol: &str) -> bool {
        self.unary.contains_key(symbol)
    }

    pub fn operators(&self) -> impl Iterator<Item = &OperatorDefinition> {
        self.binary.values()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.functions.values()
    }

    /// Register an additional function on a not-yet-shared registry.
    /// Fails if the name is already taken.
    pub fn register_function(&mut self, def: FunctionDefinition) -> Result<(), EngineError> {
        if self.functions.contains_key(&def.name) {
            return Err(EngineError::new(
                lumen_fhirpath_support::ErrorCode::UNKNOWN_FUNCTION,
                format!("function '{}' is already registered", def.name),
            ));
        }
        self.functions.insert(def.name.clone(), def);
        Ok(())
    }

    /// Build the standard operator and function tables.
    pub fn standard() -> Registry {
        use precedence as p;
        use Associativity::{Left, Right};
        use OperatorCategory::{Keyword, Symbol};
        use TypeName::*;

        let mut registry = Registry {
            binary: HashMap::new(),
            unary: HashMap::new(),
            functions: HashMap::new(),
        };

        let numeric = |result_int: TypeName| {
            vec![
                sig(Integer, Integer, result_int),
                sig(Decimal, Decimal, Decimal),
                sig(Quantity, Quantity, Quantity),
            ]
        };

        // Special forms: the interpreter owns their control flow.
        registry.add_binary(op(".", "pipeline", Symbol, p::PIPELINE, Left, vec![], None));
        registry.add_binary(op("[]", "indexer", Symbol, p::INDEX, Left, vec![], None));
        registry.add_binary(op("is", "is", Keyword, p::TYPE_TEST, Left, vec![], None));
        registry.add_binary(op("as", "as", Keyword, p::TYPE_TEST, Left, vec![], None));

        // Multiplicative.
        registry.add_binary(op(
            "*",
            "multiply",
            Symbol,
            p::MULTIPLICATIVE,
            Left,
            numeric(Integer),
            Some(crate::arithmetic::multiply_op),
        ));
        registry.add_binary(op(
            "/",
            "divide",
            Symbol,
            p::MULTIPLICATIVE,
            Left,
            vec![
                sig(Decimal, Decimal, Decimal),
                sig(Quantity, Quantity, Quantity),
            ],
            Some(crate::arithmetic::divide_op),
        ));
        registry.add_binary(op(
            "div",
            "integer-divide",
            Keyword,
            p::MULTIPLICATIVE,
            Left,
            vec![sig(Integer, Integer, Integer), sig(Decimal, Decimal, Integer)],
            Some(crate::arithmetic::div_op),
        ));
        registry.add_binary(op(
            "mod",
            "modulo",
            Keyword,
            p::MULTIPLICATIVE,
            Left,
            vec![sig(Integer, Integer, Integer), sig(Decimal, Decimal, Decimal)],
            Some(crate::arithmetic::mod_op),
        ));

        // Additive.
        let mut plus_sigs = numeric(Integer);
        plus_sigs.push(sig(String, String, String));
        registry.add_binary(op(
            "+",
            "add",
            Symbol,
            p::ADDITIVE,
            Left,
            plus_sigs,
            Some(crate::arithmetic::add_op),
        ));
        registry.add_binary(op(
            "-",
            "subtract",
            Symbol,
            p::ADDITIVE,
            Left,
            numeric(Integer),
            Some(crate::arithmetic::subtract_op),
        ));
        registry.add_binary(op(
            "&",
            "concatenate",
            Symbol,
            p::ADDITIVE,
            Left,
            vec![sig(String, String, String)],
            Some(crate::arithmetic::concat_op),
        ));

        // Union.
        registry.add_binary(op(
            "|",
            "union",
            Symbol,
            p::UNION,
            Left,
            vec![sig(Any, Any, Any)],
            Some(crate::set_operations::union_op),
        ));

        // Inequality.
        for (symbol, name, evaluator) in [
            ("<", "less", crate::comparison::less_op as BinaryEvaluator),
            ("<=", "less-or-equal", crate::comparison::less_equal_op),
            (">", "greater", crate::comparison::greater_op),
            (">=", "greater-or-equal", crate::comparison::greater_equal_op),
        ] {
            registry.add_binary(op(
                symbol,
                name,
                Symbol,
                p::INEQUALITY,
                Left,
                vec![sig(Any, Any, Boolean)],
                Some(evaluator),
            ));
        }

        // Equality.
        for (symbol, name, evaluator) in [
            ("=", "equals", crate::comparison::equals_op as BinaryEvaluator),
            ("!=", "not-equals", crate::comparison::not_equals_op),
            ("~", "equivalent", crate::comparison::equivalent_op),
            ("!~", "not-equivalent", crate::comparison::not_equivalent_op),
        ] {
            registry.add_binary(op(
                symbol,
                name,
                Symbol,
                p::EQUALITY,
                Left,
                vec![sig(Any, Any, Boolean)],
                Some(evaluator),
            ));
        }

        // Membership.
        registry.add_binary(op(
            "in",
            "in",
            Keyword,
            p::MEMBERSHIP,
            Left,
            vec![sig(Any, Any, Boolean)],
            Some(crate::set_operations::in_op),
        ));
        registry.add_binary(op(
            "contains",
            "contains",
            Keyword,
            p::MEMBERSHIP,
            Left,
            vec![sig(Any, Any, Boolean)],
            Some(crate::set_operations::contains_op),
        ));

        // Boolean logic.
        registry.add_binary(op(
            "and",
            "and",
            Keyword,
            p::AND,
            Left,
            vec![sig(Boolean, Boolean, Boolean)],
            Some(crate::logic::and_op),
        ));
        registry.add_binary(op(
            "xor",
            "xor",
            Keyword,
            p::XOR,
            Left,
            vec![sig(Boolean, Boolean, Boolean)],
            Some(crate::logic::xor_op),
        ));
        registry.add_binary(op(
            "or",
            "or",
            Keyword,
            p::OR,
            Left,
            vec![sig(Boolean, Boolean, Boolean)],
            Some(crate::logic::or_op),
        ));
        registry.add_binary(op(
            "implies",
            "implies",
            Keyword,
            p::IMPLIES,
            Right,
            vec![sig(Boolean, Boolean, Boolean)],
            Some(crate::logic::implies_op),
        ));

        // Unary operators. `not` is unary-only; `+`/`-` are registered
        // separately from their binary forms and selected by the parser.
        registry.unary.insert(
            "+",
            UnaryDefinition {
                symbol: "+",
                name: "unary-plus",
                evaluator: crate::arithmetic::unary_plus,
            },
        );
        registry.unary.insert(
            "-",
            UnaryDefinition {
                symbol: "-",
                name: "unary-minus",
                evaluator: crate::arithmetic::unary_minus,
            },
        );
        registry.unary.insert(
            "not",
            UnaryDefinition {
                symbol: "not",
                name: "not",
                evaluator: crate::logic::unary_not,
            },
        );

        registry.install_standard_functions();
        registry
    }

    fn add_binary(&mut self, def: OperatorDefinition) {
        self.binary.insert(def.symbol, def);
    }

    fn add(
        &mut self,
        name: &str,
        min_arity: usize,
        max_arity: Option<usize>,
        return_typing: ReturnTyping,
        evaluator: FunctionEvaluator,
    ) {
        self.functions.insert(
            name.to_string(),
            FunctionDefinition {
                name: name.to_string(),
                min_arity,
                max_arity,
                return_typing,
                evaluator,
            },
        );
    }

    fn install_standard_functions(&mut self) {
        use ReturnTyping::*;
        use TypeName::*;

        // Existence.
        self.add("empty", 0, Some(0), Fixed(Boolean), crate::collection_functions::empty_function);
        self.add("exists", 0, Some(1), Fixed(Boolean), crate::collection_functions::exists_function);
        self.add("all", 1, Some(1), Fixed(Boolean), crate::collection_functions::all_function);
        self.add("count", 0, Some(0), Fixed(Integer), crate::collection_functions::count_function);
        self.add("allTrue", 0, Some(0), Fixed(Boolean), crate::boolean_functions::all_true_function);
        self.add("anyTrue", 0, Some(0), Fixed(Boolean), crate::boolean_functions::any_true_function);
        self.add("allFalse", 0, Some(0), Fixed(Boolean), crate::boolean_functions::all_false_function);
        self.add("anyFalse", 0, Some(0), Fixed(Boolean), crate::boolean_functions::any_false_function);

        // Filtering and projection.
        self.add("where", 1, Some(1), Input, crate::collection_functions::where_function);
        self.add("select", 1, Some(1), Unknown, crate::collection_functions::select_function);
        self.add("repeat", 1, Some(1), Unknown, crate::repeat_function::repeat_evaluator);
        self.add("ofType", 1, Some(1), Input, crate::type_function::of_type_function);

        // Subsetting.
        self.add("single", 0, Some(0), InputItem, crate::collection_functions::single_function);
        self.add("first", 0, Some(0), InputItem, crate::collection_functions::first_function);
        self.add("last", 0, Some(0), InputItem, crate::collection_functions::last_function);
        self.add("tail", 0, Some(0), Input, crate::collection_functions::tail_function);
        self.add("skip", 1, Some(1), Input, crate::collection_functions::skip_function);
        self.add("take", 1, Some(1), Input, crate::collection_functions::take_function);

        // Set operations.
        self.add("distinct", 0, Some(0), Input, crate::distinct_functions::distinct_function);
        self.add("isDistinct", 0, Some(0), Fixed(Boolean), crate::distinct_functions::is_distinct_function);
        self.add("union", 1, Some(1), Input, crate::set_operations::union_function);
        self.add("combine", 1, Some(1), Input, crate::set_operations::combine_function);
        self.add("intersect", 1, Some(1), Input, crate::set_operations::intersect_function);
        self.add("exclude", 1, Some(1), Input, crate::set_operations::exclude_function);
        self.add("subsetOf", 1, Some(1), Fixed(Boolean), crate::subset_functions::subset_of_function);
        self.add("supersetOf", 1, Some(1), Fixed(Boolean), crate::subset_functions::superset_of_function);

        // Control.
        self.add("iif", 2, Some(3), Unknown, crate::boolean_functions::iif_function);
        self.add("not", 0, Some(0), Fixed(Boolean), crate::not_function::not_evaluator);
        self.add("trace", 1, Some(2), Input, crate::trace_function::trace_evaluator);
        self.add(
            "defineVariable",
            1,
            Some(2),
            Input,
            crate::define_variable_function::define_variable_evaluator,
        );
        self.add("aggregate", 1, Some(2), Unknown, crate::aggregate_function::aggregate_evaluator);

        // Tree navigation.
        self.add("children", 0, Some(0), Unknown, crate::collection_functions::children_function);
        self.add("descendants", 0, Some(0), Unknown, crate::collection_functions::descendants_function);
        self.add("extension", 1, Some(1), Unknown, crate::extension_function::extension_evaluator);

        // Strings.
        self.add("indexOf", 1, Some(1), Fixed(Integer), crate::string_functions::index_of_function);
        self.add("substring", 1, Some(2), Fixed(String), crate::string_functions::substring_function);
        self.add("startsWith", 1, Some(1), Fixed(Boolean), crate::string_functions::starts_with_function);
        self.add("endsWith", 1, Some(1), Fixed(Boolean), crate::string_functions::ends_with_function);
        self.add("contains", 1, Some(1), Fixed(Boolean), crate::string_functions::contains_function);
        self.add("upper", 0, Some(0), Fixed(String), crate::string_functions::upper_function);
        self.add("lower", 0, Some(0), Fixed(String), crate::string_functions::lower_function);
        self.add("replace", 2, Some(2), Fixed(String), crate::string_functions::replace_function);
        self.add("matches", 1, Some(1), Fixed(Boolean), crate::string_functions::matches_function);
        self.add(
            "replaceMatches",
            2,
            Some(2),
            Fixed(String),
            crate::string_functions::replace_matches_function,
        );
        self.add("length", 0, Some(0), Fixed(Integer), crate::string_functions::length_function);
        self.add("toChars", 0, Some(0), FixedCollection(String), crate::string_functions::to_chars_function);
        self.add("split", 1, Some(1), FixedCollection(String), crate::string_functions::split_function);
        self.add("join", 0, Some(1), Fixed(String), crate::string_functions::join_function);
        self.add("trim", 0, Some(0), Fixed(String), crate::string_functions::trim_function);
        self.add("encode", 1, Some(1), Fixed(String), crate::string_functions::encode_function);
        self.add("decode", 1, Some(1), Fixed(String), crate::string_functions::decode_function);

        // Math.
        self.add("abs", 0, Some(0), Unknown, crate::math_functions::abs_function);
        self.add("ceiling", 0, Some(0), Fixed(Integer), crate::math_functions::ceiling_function);
        self.add("floor", 0, Some(0), Fixed(Integer), crate::math_functions::floor_function);
        self.add("round", 0, Some(1), Fixed(Decimal), crate::math_functions::round_function);
        self.add("sqrt", 0, Some(0), Fixed(Decimal), crate::math_functions::sqrt_function);
        self.add("truncate", 0, Some(0), Fixed(Integer), crate::math_functions::truncate_function);
        self.add("exp", 0, Some(0), Fixed(Decimal), crate::math_functions::exp_function);
        self.add("ln", 0, Some(0), Fixed(Decimal), crate::math_functions::ln_function);
        self.add("log", 1, Some(1), Fixed(Decimal), crate::math_functions::log_function);
        self.add("power", 1, Some(1), Unknown, crate::math_functions::power_function);

        // Conversions.
        self.add("toBoolean", 0, Some(0), Fixed(Boolean), crate::conversion_functions::to_boolean_function);
        self.add(
            "convertsToBoolean",
            0,
            Some(0),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_boolean_function,
        );
        self.add("toInteger", 0, Some(0), Fixed(Integer), crate::conversion_functions::to_integer_function);
        self.add(
            "convertsToInteger",
            0,
            Some(0),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_integer_function,
        );
        self.add("toDecimal", 0, Some(0), Fixed(Decimal), crate::conversion_functions::to_decimal_function);
        self.add(
            "convertsToDecimal",
            0,
            Some(0),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_decimal_function,
        );
        self.add("toString", 0, Some(0), Fixed(String), crate::conversion_functions::to_string_function);
        self.add(
            "convertsToString",
            0,
            Some(0),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_string_function,
        );
        self.add("toQuantity", 0, Some(1), Fixed(Quantity), crate::conversion_functions::to_quantity_function);
        self.add(
            "convertsToQuantity",
            0,
            Some(1),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_quantity_function,
        );
        self.add("toDate", 0, Some(0), Fixed(Date), crate::conversion_functions::to_date_function);
        self.add(
            "convertsToDate",
            0,
            Some(0),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_date_function,
        );
        self.add("toDateTime", 0, Some(0), Fixed(DateTime), crate::conversion_functions::to_date_time_function);
        self.add(
            "convertsToDateTime",
            0,
            Some(0),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_date_time_function,
        );
        self.add("toTime", 0, Some(0), Fixed(Time), crate::conversion_functions::to_time_function);
        self.add(
            "convertsToTime",
            0,
            Some(0),
            Fixed(Boolean),
            crate::conversion_functions::converts_to_time_function,
        );

        // Type reflection.
        self.add("type", 0, Some(0), Unknown, crate::type_function::type_reflection_function);

        // Utility.
        self.add("now", 0, Some(0), Fixed(DateTime), crate::date_operation::now_function);
        self.add("today", 0, Some(0), Fixed(Date), crate::date_operation::today_function);
        self.add("timeOfDay", 0, Some(0), Fixed(Time), crate::date_operation::time_of_day_function);
    }
}

fn sig(left: TypeName, right: TypeName, result: TypeName) -> OperatorSignature {
    OperatorSignature {
        left,
        right,
        result,
    }
}

fn op(
    symbol: &'static str,
    name: &'static str,
    category: OperatorCategory,
    precedence: u8,
    associativity: Associativity,
    signatures: Vec<OperatorSignature>,
    evaluator: Option<BinaryEvaluator>,
) -> OperatorDefinition {
    OperatorDefinition {
        symbol,
        name,
        category,
        precedence,
        associativity,
        signatures,
        evaluator,
    }
}
