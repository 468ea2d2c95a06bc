use lumen_fhir_path::lexer::{tokenize, Channel, LexerOptions, Token, TokenKind};
use lumen_fhir_path::ErrorCode;

fn lex(source: &str) -> Vec<Token> {
    tokenize(source, LexerOptions::default())
        .unwrap_or_else(|e| panic!("lexer error for '{}': {}", source, e))
}

fn kinds(source: &str) -> Vec<TokenKind> {
    lex(source).into_iter().map(|t| t.kind).collect()
}

#[test]
fn test_basic_stream() {
    assert_eq!(
        kinds("Patient.name.given[0]"),
        vec![
            TokenKind::Identifier,
            TokenKind::Dot,
            TokenKind::Identifier,
            TokenKind::Dot,
            TokenKind::Identifier,
            TokenKind::LBracket,
            TokenKind::Number,
            TokenKind::RBracket,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_keyword_operators_are_identifiers() {
    // The parser promotes keywords via the registry; the lexer stays dumb.
    assert_eq!(
        kinds("a and b"),
        vec![
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_two_char_operators_win_over_one_char() {
    let tokens = lex("a <= b != c !~ d >= e");
    let operators: Vec<&str> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Operator)
        .map(|t| t.text.as_str())
        .collect();
    assert_eq!(operators, vec!["<=", "!=", "!~", ">="]);
}

#[test]
fn test_bare_bang_is_rejected() {
    let err = tokenize("a ! b", LexerOptions::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_SYNTAX);
}

#[test]
fn test_string_escapes_are_decoded() {
    let tokens = lex(r"'a\n\tA\\'");
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].text, "a\n\tA\\");
}

#[test]
fn test_unterminated_string() {
    let err = tokenize("'abc", LexerOptions::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNTERMINATED_LITERAL);
}

#[test]
fn test_delimited_identifier_keeps_content() {
    let tokens = lex("`odd name`");
    assert_eq!(tokens[0].kind, TokenKind::DelimitedIdentifier);
    assert_eq!(tokens[0].text, "odd name");
}

#[test]
fn test_number_forms() {
    let tokens = lex("5.single()");
    // The dot only joins a number when a digit follows.
    assert_eq!(tokens[0].kind, TokenKind::Number);
    assert_eq!(tokens[0].text, "5");
    assert_eq!(tokens[1].kind, TokenKind::Dot);

    let tokens = lex("3.14");
    assert_eq!(tokens[0].text, "3.14");
}

#[test]
fn test_date_and_time_literals() {
    let tokens = lex("@2015-02-04T14:34:28+09:00");
    assert_eq!(tokens[0].kind, TokenKind::DateTime);
    assert_eq!(tokens[0].text, "2015-02-04T14:34:28+09:00");

    let tokens = lex("@2015-02");
    assert_eq!(tokens[0].kind, TokenKind::DateTime);
    assert_eq!(tokens[0].text, "2015-02");

    let tokens = lex("@T14:30");
    assert_eq!(tokens[0].kind, TokenKind::Time);
    assert_eq!(tokens[0].text, "14:30");
}

#[test]
fn test_invalid_date_is_rejected_at_lex_time() {
    let err = tokenize("@2015-13", LexerOptions::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_LITERAL);
}

#[test]
fn test_special_identifiers_and_environment_variables() {
    let tokens = lex("$this $index %context %`vs-x` %'quoted'");
    assert_eq!(tokens[0].kind, TokenKind::SpecialIdentifier);
    assert_eq!(tokens[0].text, "$this");
    assert_eq!(tokens[1].text, "$index");
    assert_eq!(tokens[2].kind, TokenKind::EnvVariable);
    assert_eq!(tokens[2].text, "context");
    assert_eq!(tokens[3].text, "vs-x");
    assert_eq!(tokens[4].text, "quoted");
}

#[test]
fn test_comments_are_skipped_by_default() {
    let tokens = lex("a // trailing\n + /* block */ b");
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Identifier,
            TokenKind::Operator,
            TokenKind::Identifier,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_preserve_trivia_emits_hidden_channel() {
    let options = LexerOptions {
        preserve_trivia: true,
        ..LexerOptions::default()
    };
    let tokens = tokenize("a // c\nb", options).unwrap();
    assert!(tokens
        .iter()
        .any(|t| t.kind == TokenKind::Comment && t.channel == Channel::Hidden));
    assert!(tokens
        .iter()
        .any(|t| t.kind == TokenKind::Whitespace && t.channel == Channel::Hidden));
}

#[test]
fn test_unterminated_block_comment() {
    let err = tokenize("a /* open", LexerOptions::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNTERMINATED_LITERAL);
}

#[test]
fn test_positions_track_lines_and_columns() {
    let tokens = lex("a\n  bb");
    assert_eq!(tokens[0].range.start.line, 0);
    assert_eq!(tokens[0].range.start.character, 0);
    assert_eq!(tokens[1].range.start.line, 1);
    assert_eq!(tokens[1].range.start.character, 2);
    assert_eq!(tokens[1].range.end.character, 4);
}

#[test]
fn test_token_ranges_cover_the_source() {
    let source = "Patient.name.where(use = 'official')";
    let options = LexerOptions {
        preserve_trivia: true,
        ..LexerOptions::default()
    };
    let tokens = tokenize(source, options).unwrap();
    let mut offset = 0;
    for token in &tokens {
        assert_eq!(token.range.start.offset, offset, "gap before {:?}", token);
        offset = token.range.end.offset;
    }
    assert_eq!(offset, source.len());
}

#[test]
fn test_position_tracking_can_be_disabled() {
    let options = LexerOptions {
        track_position: false,
        ..LexerOptions::default()
    };
    let tokens = tokenize("a\nb", options).unwrap();
    // Offsets stay valid; lines and characters read zero.
    assert_eq!(tokens[1].range.start.line, 0);
    assert_eq!(tokens[1].range.start.offset, 2);
}
