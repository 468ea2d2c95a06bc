//! # FHIRPath Lexer
//!
//! Converts FHIRPath source text into a position-tagged token stream for
//! the parser. The scanner is a hand-written loop dispatching on the first
//! byte of each lexeme; no regular expressions are involved.
//!
//! ## Token model
//!
//! Every token carries its [`Range`] (zero-based line/character plus byte
//! offsets) and a channel. Whitespace and comments are skipped by default;
//! with [`LexerOptions::preserve_trivia`] they are emitted on the hidden
//! channel with the same range model, which editors use for accurate
//! re-highlighting.
//!
//! Keyword operators (`and`, `or`, `div`, `implies`, ...) are lexed as
//! plain identifiers; the parser promotes them by consulting the registry,
//! so the lexer needs no keyword table.
//!
//! ## Errors
//!
//! The lexer fails fast with an [`EngineError`] (code class 5xxx) on an
//! unexpected character, an unterminated string/identifier/comment, a bare
//! `!`, or a malformed date/time literal.

use lumen_fhirpath_support::{
    EngineError, ErrorCode, Position, PrecisionDate, PrecisionDateTime, PrecisionTime, Range,
};

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `name`, including keyword operators, which the parser promotes.
    Identifier,
    /// `` `name` ``; `text` holds the decoded content without backticks.
    DelimitedIdentifier,
    /// Integer or decimal literal; the parser re-parses the text.
    Number,
    /// Single- or double-quoted string; `text` holds the decoded value.
    String,
    /// `@...` date or datetime literal; `text` excludes the `@`.
    DateTime,
    /// `@T...` time literal; `text` excludes the `@T`.
    Time,
    /// One- or two-character operator symbol.
    Operator,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// `$this`, `$index`, `$total`; `text` includes the `$`.
    SpecialIdentifier,
    /// `%name`, `` %`name` ``, or `%'name'`; `text` excludes the `%`.
    EnvVariable,
    /// Hidden-channel trivia.
    Whitespace,
    /// Hidden-channel trivia, `//...` or `/*...*/`.
    Comment,
    /// End of input; always the final token.
    Eof,
}

/// Token channel, LSP-style: parsers only read `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Default,
    Hidden,
}

/// A lexed token with its decoded text and source range.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub range: Range,
    pub channel: Channel,
}

/// Lexer configuration.
#[derive(Debug, Clone, Copy)]
pub struct LexerOptions {
    /// Track line/character positions. Disabling keeps byte offsets only
    /// (lines and characters read zero), trading positions for throughput.
    pub track_position: bool,
    /// Emit whitespace and comments on the hidden channel instead of
    /// dropping them.
    pub preserve_trivia: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            track_position: true,
            preserve_trivia: false,
        }
    }
}

/// Tokenize `source` into a finite stream ending in an `Eof` token.
pub fn tokenize(source: &str, options: LexerOptions) -> Result<Vec<Token>, EngineError> {
    Lexer::new(source, options).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    options: LexerOptions,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, options: LexerOptions) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 0,
            column: 0,
            options,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, EngineError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            match token.channel {
                Channel::Default => tokens.push(token),
                Channel::Hidden => {
                    if self.options.preserve_trivia {
                        tokens.push(token);
                    }
                }
            }
            if done {
                return Ok(tokens);
            }
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    /// Advance one byte, maintaining line/column when tracking is on.
    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if self.options.track_position {
            if byte == b'\n' {
                self.line += 1;
                self.column = 0;
            } else if byte & 0b1100_0000 != 0b1000_0000 {
                // Count characters, not UTF-8 continuation bytes.
                self.column += 1;
            }
        }
        Some(byte)
    }

    fn bump_while(&mut self, pred: impl Fn(u8) -> bool) {
        while let Some(byte) = self.peek() {
            if !pred(byte) {
                break;
            }
            self.bump();
        }
    }

    fn token(&self, kind: TokenKind, text: impl Into<String>, start: Position) -> Token {
        let channel = match kind {
            TokenKind::Whitespace | TokenKind::Comment => Channel::Hidden,
            _ => Channel::Default,
        };
        Token {
            kind,
            text: text.into(),
            range: Range::new(start, self.position()),
            channel,
        }
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, start: Position) -> EngineError {
        EngineError::new(code, message).with_range(Range::new(start, self.position()))
    }

    fn next_token(&mut self) -> Result<Token, EngineError> {
        let start = self.position();
        let Some(byte) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, "", start));
        };

        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => {
                self.bump_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'));
                let text = &self.src[start.offset..self.pos];
                Ok(self.token(TokenKind::Whitespace, text, start))
            }
            b'/' => match self.peek_at(1) {
                Some(b'/') => self.line_comment(start),
                Some(b'*') => self.block_comment(start),
                _ => {
                    self.bump();
                    Ok(self.token(TokenKind::Operator, "/", start))
                }
            },
            b'0'..=b'9' => self.number(start),
            b'\'' | b'"' => {
                let quote = byte;
                self.bump();
                let text = self.quoted(quote, start)?;
                Ok(self.token(TokenKind::String, text, start))
            }
            b'`' => {
                self.bump();
                let text = self.quoted(b'`', start)?;
                Ok(self.token(TokenKind::DelimitedIdentifier, text, start))
            }
            b'@' => self.date_or_time(start),
            b'$' => {
                self.bump();
                self.bump_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                let text = &self.src[start.offset..self.pos];
                if text.len() == 1 {
                    return Err(self.error(
                        ErrorCode::INVALID_SYNTAX,
                        "expected an identifier after '$'",
                        start,
                    ));
                }
                Ok(self.token(TokenKind::SpecialIdentifier, text, start))
            }
            b'%' => {
                self.bump();
                match self.peek() {
                    Some(b'`') => {
                        self.bump();
                        let text = self.quoted(b'`', start)?;
                        Ok(self.token(TokenKind::EnvVariable, text, start))
                    }
                    Some(b'\'') => {
                        self.bump();
                        let text = self.quoted(b'\'', start)?;
                        Ok(self.token(TokenKind::EnvVariable, text, start))
                    }
                    Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                        let name_start = self.pos;
                        self.bump_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                        let text = self.src[name_start..self.pos].to_string();
                        Ok(self.token(TokenKind::EnvVariable, text, start))
                    }
                    _ => Err(self.error(
                        ErrorCode::INVALID_SYNTAX,
                        "expected a name after '%'",
                        start,
                    )),
                }
            }
            b'.' => {
                self.bump();
                Ok(self.token(TokenKind::Dot, ".", start))
            }
            b',' => {
                self.bump();
                Ok(self.token(TokenKind::Comma, ",", start))
            }
            b'(' => {
                self.bump();
                Ok(self.token(TokenKind::LParen, "(", start))
            }
            b')' => {
                self.bump();
                Ok(self.token(TokenKind::RParen, ")", start))
            }
            b'[' => {
                self.bump();
                Ok(self.token(TokenKind::LBracket, "[", start))
            }
            b']' => {
                self.bump();
                Ok(self.token(TokenKind::RBracket, "]", start))
            }
            b'{' => {
                self.bump();
                Ok(self.token(TokenKind::LBrace, "{", start))
            }
            b'}' => {
                self.bump();
                Ok(self.token(TokenKind::RBrace, "}", start))
            }
            b'!' => {
                // Two-character forms only; a bare '!' is not an operator.
                self.bump();
                match self.peek() {
                    Some(b'=') => {
                        self.bump();
                        Ok(self.token(TokenKind::Operator, "!=", start))
                    }
                    Some(b'~') => {
                        self.bump();
                        Ok(self.token(TokenKind::Operator, "!~", start))
                    }
                    _ => Err(self.error(
                        ErrorCode::INVALID_SYNTAX,
                        "'!' must be followed by '=' or '~'",
                        start,
                    )),
                }
            }
            b'<' | b'>' => {
                self.bump();
                let mut text = (byte as char).to_string();
                if self.peek() == Some(b'=') {
                    self.bump();
                    text.push('=');
                }
                Ok(self.token(TokenKind::Operator, text, start))
            }
            b'+' | b'-' | b'*' | b'=' | b'~' | b'|' | b'&' => {
                self.bump();
                Ok(self.token(TokenKind::Operator, (byte as char).to_string(), start))
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                self.bump_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                let text = &self.src[start.offset..self.pos];
                Ok(self.token(TokenKind::Identifier, text, start))
            }
            _ => {
                let ch = self.src[self.pos..].chars().next().unwrap_or('\u{FFFD}');
                for _ in 0..ch.len_utf8() {
                    self.bump();
                }
                Err(self.error(
                    ErrorCode::INVALID_SYNTAX,
                    format!("unexpected character '{}'", ch),
                    start,
                ))
            }
        }
    }

    fn line_comment(&mut self, start: Position) -> Result<Token, EngineError> {
        self.bump_while(|b| b != b'\n');
        let text = &self.src[start.offset..self.pos];
        Ok(self.token(TokenKind::Comment, text, start))
    }

    fn block_comment(&mut self, start: Position) -> Result<Token, EngineError> {
        // Skip the opening "/*".
        self.bump();
        self.bump();
        loop {
            match self.peek() {
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.bump();
                    self.bump();
                    let text = &self.src[start.offset..self.pos];
                    return Ok(self.token(TokenKind::Comment, text, start));
                }
                Some(_) => {
                    self.bump();
                }
                None => {
                    return Err(self.error(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated block comment",
                        start,
                    ));
                }
            }
        }
    }

    /// Integer, optionally followed by `.` and at least one digit. The dot
    /// is only consumed when a digit follows, so `5.single()` lexes as a
    /// number, a dot, and an identifier.
    fn number(&mut self, start: Position) -> Result<Token, EngineError> {
        self.bump_while(|b| b.is_ascii_digit());
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
            self.bump_while(|b| b.is_ascii_digit());
        }
        let text = &self.src[start.offset..self.pos];
        Ok(self.token(TokenKind::Number, text, start))
    }

    /// Body of a quoted string, delimited identifier, or quoted
    /// environment name. The opening delimiter has been consumed; returns
    /// the decoded content.
    fn quoted(&mut self, delimiter: u8, start: Position) -> Result<String, EngineError> {
        let mut out = String::new();
        loop {
            let Some(byte) = self.peek() else {
                return Err(self.error(
                    ErrorCode::UNTERMINATED_LITERAL,
                    match delimiter {
                        b'`' => "unterminated delimited identifier",
                        _ => "unterminated string literal",
                    },
                    start,
                ));
            };
            if byte == delimiter {
                self.bump();
                return Ok(out);
            }
            if byte == b'\\' {
                self.bump();
                out.push(self.escape(start)?);
                continue;
            }
            // Copy the whole UTF-8 character.
            let ch = self.src[self.pos..].chars().next().unwrap_or('\u{FFFD}');
            for _ in 0..ch.len_utf8() {
                self.bump();
            }
            out.push(ch);
        }
    }

    fn escape(&mut self, start: Position) -> Result<char, EngineError> {
        let Some(byte) = self.bump() else {
            return Err(self.error(
                ErrorCode::UNTERMINATED_LITERAL,
                "unterminated escape sequence",
                start,
            ));
        };
        match byte {
            b'n' => Ok('\n'),
            b'r' => Ok('\r'),
            b't' => Ok('\t'),
            b'f' => Ok('\u{000C}'),
            b'\\' => Ok('\\'),
            b'/' => Ok('/'),
            b'"' => Ok('"'),
            b'\'' => Ok('\''),
            b'`' => Ok('`'),
            b'u' => {
                let mut code: u32 = 0;
                for _ in 0..4 {
                    let Some(digit) = self.bump().and_then(|b| (b as char).to_digit(16)) else {
                        return Err(self.error(
                            ErrorCode::INVALID_LITERAL,
                            "'\\u' requires four hex digits",
                            start,
                        ));
                    };
                    code = code * 16 + digit;
                }
                char::from_u32(code).ok_or_else(|| {
                    self.error(ErrorCode::INVALID_LITERAL, "invalid unicode escape", start)
                })
            }
            other => Err(self.error(
                ErrorCode::INVALID_LITERAL,
                format!("unknown escape sequence '\\{}'", other as char),
                start,
            )),
        }
    }

    /// `@`-prefixed date, datetime, or time literal. The literal is
    /// validated here so malformed partials fail at lex time.
    fn date_or_time(&mut self, start: Position) -> Result<Token, EngineError> {
        self.bump(); // '@'
        if self.peek() == Some(b'T') {
            self.bump();
            let text_start = self.pos;
            self.bump_while(|b| b.is_ascii_digit() || b == b':' || b == b'.');
            let text = self.src[text_start..self.pos].to_string();
            if PrecisionTime::parse(&text).is_none() {
                return Err(self.error(
                    ErrorCode::INVALID_LITERAL,
                    format!("invalid time literal '@T{}'", text),
                    start,
                ));
            }
            return Ok(self.token(TokenKind::Time, text, start));
        }

        let text_start = self.pos;
        self.bump_while(|b| b.is_ascii_digit() || b == b'-');
        let mut has_time = false;
        if self.peek() == Some(b'T') {
            has_time = true;
            self.bump();
            self.bump_while(|b| b.is_ascii_digit() || b == b':' || b == b'.');
            // Optional timezone. A sign is only a timezone when a digit
            // follows; otherwise it is left for the parser as an operator.
            match self.peek() {
                Some(b'Z') => {
                    self.bump();
                }
                Some(b'+') | Some(b'-')
                    if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) =>
                {
                    self.bump();
                    self.bump_while(|b| b.is_ascii_digit() || b == b':');
                }
                _ => {}
            }
        }
        let text = self.src[text_start..self.pos].to_string();
        let valid = if has_time {
            PrecisionDateTime::parse(&text).is_some()
        } else {
            PrecisionDate::parse(&text).is_some()
        };
        if !valid {
            return Err(self.error(
                ErrorCode::INVALID_LITERAL,
                format!("invalid date/time literal '@{}'", text),
                start,
            ));
        }
        Ok(self.token(TokenKind::DateTime, text, start))
    }
}
