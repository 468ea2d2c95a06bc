//! # FHIRPath Expression Parser
//!
//! Builds an abstract syntax tree from the lexer's token stream using
//! precedence climbing (a Pratt parser): the primary parser handles
//! literals, identifiers, variables, grouping, collection literals, and
//! unary operators, and the main loop extends the left-hand side while the
//! next operator's precedence — looked up in the [registry](crate::registry)
//! — is at least the current minimum.
//!
//! ## Precedence (high binds tighter)
//!
//! `.` 140 · `[]` 130 · `is`/`as` 120 · unary 110 · `* / div mod` 100 ·
//! `+ - &` 90 · `|` 80 · `< <= > >=` 70 · `= != ~ !~` 60 · `in contains`
//! 50 · `and` 40 · `xor` 30 · `or` 20 · `implies` 10 (right-associative).
//!
//! ## Modes
//!
//! - **Strict** (the default): the first syntax error aborts the parse.
//! - **Recovery**: the parser records the error, emits an
//!   [`ExpressionKind::Error`] node at the failing site, synchronizes at
//!   `, ) ] }` or end of input, and keeps going. Editors use this to keep
//!   an AST and diagnostics for incomplete expressions.
//!
//! Every node carries the range spanning its first through last token and
//! a [`NodeId`] that the analyzer keys its type annotations off.

use crate::lexer::{self, LexerOptions, Token, TokenKind};
use crate::registry::{Associativity, Registry};
use lumen_fhirpath_support::{
    EngineError, ErrorCode, PrecisionDate, PrecisionDateTime, PrecisionTime, Range,
};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Identity of an AST node within one parse, used as the key for analyzer
/// side tables.
pub type NodeId = u32;

/// An AST node: a kind plus the source range it spans.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub id: NodeId,
    pub kind: ExpressionKind,
    pub range: Range,
}

/// The closed set of AST node variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// A literal value. `{}` parses to `Literal(LiteralValue::Empty)`.
    Literal(LiteralValue),
    /// A lowercase-initial identifier: property navigation.
    Identifier(String),
    /// An uppercase-initial identifier: resolved at runtime as a type
    /// filter when the input's `resourceType` matches, otherwise as
    /// property navigation.
    TypeOrIdentifier(String),
    /// `$this`, `$index`, `$total`, or `%name`; the prefix is kept in the
    /// name.
    Variable(String),
    /// A binary operator. `.` is the pipeline operator: the left side's
    /// output is the right side's input.
    Binary {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Unary `+`, `-`, or `not`.
    Unary {
        operator: String,
        operand: Box<Expression>,
    },
    /// A function call; the callee is always an `Identifier` or
    /// `TypeOrIdentifier` node.
    Function {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    /// `expression[index]`.
    Index {
        expression: Box<Expression>,
        index: Box<Expression>,
    },
    /// `{a, b, c}` collection literal.
    Collection(Vec<Expression>),
    /// `expression is Type`.
    MembershipTest {
        expression: Box<Expression>,
        type_name: String,
    },
    /// `expression as Type`.
    TypeCast {
        expression: Box<Expression>,
        type_name: String,
    },
    /// A quantity literal, e.g. `5 'mg'` or `3 days`.
    Quantity {
        value: Decimal,
        unit: String,
        calendar_unit: bool,
    },
    /// Recovery placeholder emitted where parsing failed in recovery mode.
    Error {
        message: String,
        expected: Vec<String>,
    },
}

/// Literal payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// The empty collection literal `{}`.
    Empty,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Date(PrecisionDate),
    DateTime(PrecisionDateTime),
    Time(PrecisionTime),
}

/// Parser mode, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    Strict,
    Recovery,
}

/// Options for [`parse_source`].
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub mode: ParseMode,
    /// Keep whitespace/comment tokens on the hidden channel (plumbed to
    /// the lexer; the parser itself only reads the default channel).
    pub preserve_trivia: bool,
    /// Track line/character positions in the lexer.
    pub track_position: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            mode: ParseMode::Strict,
            preserve_trivia: false,
            track_position: true,
        }
    }
}

/// Result of a parse: the AST plus any errors collected in recovery mode.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub ast: Expression,
    pub errors: Vec<EngineError>,
}

/// Parse a source string.
///
/// In strict mode the first error is returned as `Err`. In recovery mode
/// the call always succeeds and the outcome's `errors` list what went
/// wrong; error sites appear as [`ExpressionKind::Error`] nodes.
pub fn parse_source(source: &str, options: ParseOptions) -> Result<ParseOutcome, EngineError> {
    let lexer_options = LexerOptions {
        track_position: options.track_position,
        preserve_trivia: options.preserve_trivia,
    };
    let tokens = match lexer::tokenize(source, lexer_options) {
        Ok(tokens) => tokens,
        Err(err) => {
            if options.mode == ParseMode::Strict {
                return Err(err);
            }
            // Nothing to synchronize on without tokens; surface the error
            // with a bare Error node.
            let ast = Expression {
                id: 0,
                kind: ExpressionKind::Error {
                    message: err.message.clone(),
                    expected: Vec::new(),
                },
                range: err.range.unwrap_or_default(),
            };
            return Ok(ParseOutcome {
                ast,
                errors: vec![err],
            });
        }
    };
    let mut parser = Parser::new(tokens, options.mode);
    let ast = parser.parse_root();
    match ast {
        Ok(ast) => Ok(ParseOutcome {
            ast,
            errors: parser.errors,
        }),
        Err(err) => Err(err),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    mode: ParseMode,
    errors: Vec<EngineError>,
    next_id: NodeId,
}

impl Parser {
    fn new(tokens: Vec<Token>, mode: ParseMode) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|t| t.channel == crate::lexer::Channel::Default)
            .collect();
        Self {
            tokens,
            pos: 0,
            mode,
            errors: Vec::new(),
            next_id: 0,
        }
    }

    fn parse_root(&mut self) -> Result<Expression, EngineError> {
        let expr = self.parse_expression(0)?;
        if self.peek().kind != TokenKind::Eof {
            let token = self.peek().clone();
            let err = EngineError::new(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("unexpected '{}' after expression", token.text),
            )
            .with_range(token.range);
            if self.mode == ParseMode::Strict {
                return Err(err);
            }
            self.errors.push(err);
        }
        Ok(expr)
    }

    // === Token plumbing ===

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, EngineError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(EngineError::new(
                ErrorCode::EXPECTED_TOKEN,
                format!("expected {}, found '{}'", what, token.text),
            )
            .with_range(token.range))
        }
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn node(&mut self, kind: ExpressionKind, range: Range) -> Expression {
        Expression {
            id: self.fresh_id(),
            kind,
            range,
        }
    }

    // === Error recovery ===

    /// In recovery mode, record the error and return an `Error` node after
    /// synchronizing; in strict mode, propagate.
    fn recover(
        &mut self,
        err: EngineError,
        expected: Vec<String>,
    ) -> Result<Expression, EngineError> {
        if self.mode == ParseMode::Strict {
            return Err(err);
        }
        let range = err.range.unwrap_or(self.peek().range);
        self.errors.push(err.clone());
        self.synchronize();
        Ok(self.node(
            ExpressionKind::Error {
                message: err.message,
                expected,
            },
            range,
        ))
    }

    /// Skip ahead to the next `, ) ] }` or end of input.
    fn synchronize(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::Comma
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // === Expression parsing ===

    /// The precedence-climbing loop. Extends the left-hand side while the
    /// next operator binds at least as tightly as `min_precedence`.
    fn parse_expression(&mut self, min_precedence: u8) -> Result<Expression, EngineError> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((symbol, precedence, associativity)) = self.peek_binary_operator() else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            left = match symbol.as_str() {
                "." => self.parse_pipeline_step(left)?,
                "[]" => self.parse_index(left)?,
                "is" | "as" => self.parse_type_operation(left, &symbol)?,
                _ => {
                    self.advance();
                    let next_min = match associativity {
                        Associativity::Left => precedence + 1,
                        Associativity::Right => precedence,
                    };
                    let right = self.parse_expression(next_min)?;
                    let range = left.range.covering(right.range);
                    self.node(
                        ExpressionKind::Binary {
                            operator: symbol,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        range,
                    )
                }
            };
        }
        Ok(left)
    }

    /// What binary operator, if any, does the next token denote?
    fn peek_binary_operator(&self) -> Option<(String, u8, Associativity)> {
        let registry = Registry::global();
        let token = self.peek();
        let symbol = match token.kind {
            TokenKind::Dot => ".",
            TokenKind::LBracket => "[]",
            TokenKind::Operator => token.text.as_str(),
            // Keyword operators are lexed as identifiers and promoted here.
            TokenKind::Identifier => {
                if !registry.is_keyword_operator(&token.text) {
                    return None;
                }
                token.text.as_str()
            }
            _ => return None,
        };
        let def = registry.binary_operator(symbol)?;
        Some((symbol.to_string(), def.precedence, def.associativity))
    }

    /// `left . member` — the right side must be an identifier invocation,
    /// possibly a function call, or `$this`/`$index`/`$total`.
    fn parse_pipeline_step(&mut self, left: Expression) -> Result<Expression, EngineError> {
        self.advance(); // '.'
        let token = self.peek().clone();
        let right = match token.kind {
            TokenKind::Identifier | TokenKind::DelimitedIdentifier => {
                let member = self.parse_identifier_invocation()?;
                member
            }
            TokenKind::SpecialIdentifier => {
                self.advance();
                self.node(ExpressionKind::Variable(token.text.clone()), token.range)
            }
            _ => {
                let err = EngineError::new(
                    ErrorCode::EXPECTED_TOKEN,
                    format!("expected a member name after '.', found '{}'", token.text),
                )
                .with_range(token.range);
                return match self.recover(err, vec!["identifier".to_string()]) {
                    Ok(error_node) => {
                        let range = left.range.covering(error_node.range);
                        Ok(self.node(
                            ExpressionKind::Binary {
                                operator: ".".to_string(),
                                left: Box::new(left),
                                right: Box::new(error_node),
                            },
                            range,
                        ))
                    }
                    Err(err) => Err(err),
                };
            }
        };
        let range = left.range.covering(right.range);
        Ok(self.node(
            ExpressionKind::Binary {
                operator: ".".to_string(),
                left: Box::new(left),
                right: Box::new(right),
            },
            range,
        ))
    }

    /// `left [ index ]`.
    fn parse_index(&mut self, left: Expression) -> Result<Expression, EngineError> {
        self.advance(); // '['
        let index = self.parse_expression(0)?;
        let close = self.expect(TokenKind::RBracket, "']'");
        let close = match close {
            Ok(token) => token,
            Err(err) => return self.recover(err, vec!["]".to_string()]),
        };
        let range = left.range.covering(close.range);
        Ok(self.node(
            ExpressionKind::Index {
                expression: Box::new(left),
                index: Box::new(index),
            },
            range,
        ))
    }

    /// `left is Type` / `left as Type`.
    fn parse_type_operation(
        &mut self,
        left: Expression,
        operator: &str,
    ) -> Result<Expression, EngineError> {
        self.advance(); // 'is' | 'as'
        let (type_name, type_range) = match self.parse_qualified_type_name() {
            Ok(pair) => pair,
            Err(err) => {
                let error_node = self.recover(err, vec!["type name".to_string()])?;
                return Ok(error_node);
            }
        };
        let range = left.range.covering(type_range);
        let kind = if operator == "is" {
            ExpressionKind::MembershipTest {
                expression: Box::new(left),
                type_name,
            }
        } else {
            ExpressionKind::TypeCast {
                expression: Box::new(left),
                type_name,
            }
        };
        Ok(self.node(kind, range))
    }

    /// `Name` or `Namespace.Name` (each part may be delimited).
    fn parse_qualified_type_name(&mut self) -> Result<(String, Range), EngineError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier | TokenKind::DelimitedIdentifier => {
                self.advance();
                let mut name = token.text.clone();
                let mut range = token.range;
                if self.peek().kind == TokenKind::Dot {
                    let next = self.peek_at(1).clone();
                    if matches!(
                        next.kind,
                        TokenKind::Identifier | TokenKind::DelimitedIdentifier
                    ) {
                        self.advance(); // '.'
                        self.advance(); // name
                        name.push('.');
                        name.push_str(&next.text);
                        range = range.covering(next.range);
                    }
                }
                Ok((name, range))
            }
            _ => Err(EngineError::new(
                ErrorCode::EXPECTED_TOKEN,
                format!("expected a type name, found '{}'", token.text),
            )
            .with_range(token.range)),
        }
    }

    /// Prefix operators, then a primary with postfix handled by the main
    /// loop.
    fn parse_unary(&mut self) -> Result<Expression, EngineError> {
        let token = self.peek().clone();
        let is_polarity = token.kind == TokenKind::Operator && matches!(token.text.as_str(), "+" | "-");
        let is_not = token.kind == TokenKind::Identifier
            && token.text == "not"
            && self.starts_primary(self.peek_at(1));
        if is_polarity || is_not {
            self.advance();
            let operand = self.parse_expression(crate::registry::precedence::UNARY)?;
            let range = token.range.covering(operand.range);
            return Ok(self.node(
                ExpressionKind::Unary {
                    operator: token.text,
                    operand: Box::new(operand),
                },
                range,
            ));
        }
        self.parse_primary()
    }

    /// Whether a token can begin a primary expression; used to tell unary
    /// `not x` apart from the identifier `not` (e.g. `value.not()`).
    fn starts_primary(&self, token: &Token) -> bool {
        match token.kind {
            TokenKind::Identifier
            | TokenKind::DelimitedIdentifier
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::DateTime
            | TokenKind::Time
            | TokenKind::SpecialIdentifier
            | TokenKind::EnvVariable
            | TokenKind::LParen
            | TokenKind::LBrace => true,
            _ => false,
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, EngineError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => self.parse_number_or_quantity(),
            TokenKind::String => {
                self.advance();
                Ok(self.node(
                    ExpressionKind::Literal(LiteralValue::String(token.text)),
                    token.range,
                ))
            }
            TokenKind::DateTime => {
                self.advance();
                let literal = if token.text.contains('T') {
                    match PrecisionDateTime::parse(&token.text) {
                        Some(dt) => LiteralValue::DateTime(dt),
                        None => unreachable!("lexer validated the datetime literal"),
                    }
                } else {
                    match PrecisionDate::parse(&token.text) {
                        Some(d) => LiteralValue::Date(d),
                        None => unreachable!("lexer validated the date literal"),
                    }
                };
                Ok(self.node(ExpressionKind::Literal(literal), token.range))
            }
            TokenKind::Time => {
                self.advance();
                match PrecisionTime::parse(&token.text) {
                    Some(t) => {
                        Ok(self.node(ExpressionKind::Literal(LiteralValue::Time(t)), token.range))
                    }
                    None => unreachable!("lexer validated the time literal"),
                }
            }
            TokenKind::SpecialIdentifier => {
                self.advance();
                Ok(self.node(ExpressionKind::Variable(token.text), token.range))
            }
            TokenKind::EnvVariable => {
                self.advance();
                Ok(self.node(
                    ExpressionKind::Variable(format!("%{}", token.text)),
                    token.range,
                ))
            }
            TokenKind::Identifier | TokenKind::DelimitedIdentifier => {
                self.parse_identifier_invocation()
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                match self.expect(TokenKind::RParen, "')'") {
                    Ok(_) => Ok(inner),
                    Err(err) => self.recover(err, vec![")".to_string()]),
                }
            }
            TokenKind::LBrace => self.parse_collection_literal(),
            _ => {
                let err = EngineError::new(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unexpected '{}'", token.text),
                )
                .with_range(token.range);
                self.recover(
                    err,
                    vec![
                        "literal".to_string(),
                        "identifier".to_string(),
                        "(".to_string(),
                        "{".to_string(),
                    ],
                )
            }
        }
    }

    /// Booleans, bare identifiers, type-or-identifiers, and function
    /// calls. An immediate `(` after the name begins a call.
    fn parse_identifier_invocation(&mut self) -> Result<Expression, EngineError> {
        let token = self.advance();
        if token.kind == TokenKind::Identifier {
            match token.text.as_str() {
                "true" => {
                    return Ok(self.node(
                        ExpressionKind::Literal(LiteralValue::Boolean(true)),
                        token.range,
                    ));
                }
                "false" => {
                    return Ok(self.node(
                        ExpressionKind::Literal(LiteralValue::Boolean(false)),
                        token.range,
                    ));
                }
                _ => {}
            }
        }
        let is_type = token.kind == TokenKind::Identifier
            && token.text.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        let name_kind = if is_type {
            ExpressionKind::TypeOrIdentifier(token.text.clone())
        } else {
            ExpressionKind::Identifier(token.text.clone())
        };
        let name_node = self.node(name_kind, token.range);

        if self.peek().kind != TokenKind::LParen {
            return Ok(name_node);
        }

        self.advance(); // '('
        let mut arguments = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                arguments.push(self.parse_expression(0)?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                    // Trailing comma before ')'.
                    if self.peek().kind == TokenKind::RParen {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        let close = match self.expect(TokenKind::RParen, "')'") {
            Ok(token) => token,
            Err(err) => return self.recover(err, vec![")".to_string(), ",".to_string()]),
        };
        let range = name_node.range.covering(close.range);
        Ok(self.node(
            ExpressionKind::Function {
                callee: Box::new(name_node),
                arguments,
            },
            range,
        ))
    }

    /// `{}` (empty) or `{e1, e2, ...}`.
    fn parse_collection_literal(&mut self) -> Result<Expression, EngineError> {
        let open = self.advance(); // '{'
        if self.peek().kind == TokenKind::RBrace {
            let close = self.advance();
            return Ok(self.node(
                ExpressionKind::Literal(LiteralValue::Empty),
                open.range.covering(close.range),
            ));
        }
        let mut elements = Vec::new();
        loop {
            elements.push(self.parse_expression(0)?);
            if self.peek().kind == TokenKind::Comma {
                self.advance();
                continue;
            }
            break;
        }
        let close = match self.expect(TokenKind::RBrace, "'}'") {
            Ok(token) => token,
            Err(err) => return self.recover(err, vec!["}".to_string(), ",".to_string()]),
        };
        Ok(self.node(
            ExpressionKind::Collection(elements),
            open.range.covering(close.range),
        ))
    }

    /// A number literal, or a quantity when a unit string or calendar-unit
    /// keyword immediately follows.
    fn parse_number_or_quantity(&mut self) -> Result<Expression, EngineError> {
        let token = self.advance();
        let decimal = match Decimal::from_str(&token.text) {
            Ok(d) => d,
            Err(_) => {
                let err = EngineError::new(
                    ErrorCode::INVALID_LITERAL,
                    format!("invalid number '{}'", token.text),
                )
                .with_range(token.range);
                return self.recover(err, vec!["number".to_string()]);
            }
        };

        let next = self.peek().clone();
        // Quantity: number followed by a string unit or calendar keyword.
        if next.kind == TokenKind::String {
            self.advance();
            return Ok(self.node(
                ExpressionKind::Quantity {
                    value: decimal,
                    unit: next.text,
                    calendar_unit: false,
                },
                token.range.covering(next.range),
            ));
        }
        if next.kind == TokenKind::Identifier && is_calendar_unit(&next.text) {
            self.advance();
            return Ok(self.node(
                ExpressionKind::Quantity {
                    value: decimal,
                    unit: next.text,
                    calendar_unit: true,
                },
                token.range.covering(next.range),
            ));
        }

        let literal = if token.text.contains('.') {
            LiteralValue::Decimal(decimal)
        } else {
            match i64::from_str(&token.text) {
                Ok(i) => LiteralValue::Integer(i),
                Err(_) => {
                    let err = EngineError::new(
                        ErrorCode::INVALID_LITERAL,
                        format!("integer literal '{}' out of range", token.text),
                    )
                    .with_range(token.range);
                    return self.recover(err, vec!["number".to_string()]);
                }
            }
        };
        Ok(self.node(ExpressionKind::Literal(literal), token.range))
    }
}

/// Calendar duration keywords valid as quantity units.
pub fn is_calendar_unit(word: &str) -> bool {
    matches!(
        word,
        "year"
            | "years"
            | "month"
            | "months"
            | "week"
            | "weeks"
            | "day"
            | "days"
            | "hour"
            | "hours"
            | "minute"
            | "minutes"
            | "second"
            | "seconds"
            | "millisecond"
            | "milliseconds"
    )
}
