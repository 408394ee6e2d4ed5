use std::str::{Chars, FromStr};

use smol_str::SmolStr;

use crate::errors::Diagnostic;
use crate::tokens::{Keyword, Location, Placeholder, Token, TokenKind};

const EOF_CHAR: char = '\0';

/// A pull-model lexer over a single in-memory source string.
///
/// Tokens are produced on demand with one character of lookahead. The lexer
/// never fails: malformed input yields a diagnostic and a best-effort token,
/// and unknown characters are skipped.
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    chars: Chars<'src>,
    pos: usize,
    line: usize,
    column: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.chars(),
            pos: 0,
            line: 1,
            column: 1,
            diagnostics: Vec::new(),
        }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Diagnostics accumulated so far. Drained by the parser once it is done
    /// pulling tokens.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn peek(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    fn peek2(&self) -> char {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next().unwrap_or(EOF_CHAR)
    }

    fn shift(&mut self) -> char {
        let Some(ch) = self.chars.next() else {
            return EOF_CHAR;
        };
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn shift_while(&mut self, f: impl Fn(char) -> bool + Copy) {
        while self.peek() != EOF_CHAR && f(self.peek()) {
            self.shift();
        }
    }

    fn at_eof(&self) -> bool {
        self.peek() == EOF_CHAR
    }

    /// The next token in the stream. Once the source is exhausted this keeps
    /// returning `Eof` tokens.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_trivia();

            let start = (self.pos, self.line, self.column);
            if self.at_eof() {
                return self.token_from(TokenKind::Eof, start);
            }

            let ch = self.peek();
            let kind = match ch {
                '(' => self.single(TokenKind::LeftParen),
                ')' => self.single(TokenKind::RightParen),
                ',' => self.single(TokenKind::Comma),
                ';' => self.single(TokenKind::Semicolon),
                '+' => self.single(TokenKind::Plus),
                '*' => self.single(TokenKind::Star),
                '%' => self.single(TokenKind::Percent),
                '&' => self.single(TokenKind::Ampersand),
                '~' => self.single(TokenKind::Tilde),
                '/' => self.single(TokenKind::Slash),
                '.' => {
                    if self.peek2().is_ascii_digit() {
                        self.scan_number()
                    } else {
                        self.single(TokenKind::Dot)
                    }
                }
                '-' => {
                    self.shift();
                    if self.peek() == '>' {
                        self.shift();
                        if self.peek() == '>' {
                            self.shift();
                            TokenKind::LongArrow
                        } else {
                            TokenKind::Arrow
                        }
                    } else {
                        TokenKind::Minus
                    }
                }
                '|' => {
                    self.shift();
                    if self.peek() == '|' {
                        self.shift();
                        TokenKind::PipePipe
                    } else {
                        TokenKind::Pipe
                    }
                }
                '<' => {
                    self.shift();
                    match self.peek() {
                        '<' => self.single(TokenKind::LessLess),
                        '=' => self.single(TokenKind::LessEquals),
                        '>' => self.single(TokenKind::LessGreater),
                        _ => TokenKind::LessThan,
                    }
                }
                '>' => {
                    self.shift();
                    match self.peek() {
                        '>' => self.single(TokenKind::GreaterGreater),
                        '=' => self.single(TokenKind::GreaterEquals),
                        _ => TokenKind::GreaterThan,
                    }
                }
                '=' => {
                    self.shift();
                    if self.peek() == '=' {
                        self.shift();
                        TokenKind::EqualsEquals
                    } else {
                        TokenKind::Equals
                    }
                }
                '!' => {
                    self.shift();
                    if self.peek() == '=' {
                        self.shift();
                        TokenKind::BangEquals
                    } else {
                        self.diagnostics.push(Diagnostic::error(
                            "unknown character '!'",
                            self.location_from(start),
                        ));
                        continue;
                    }
                }
                '\'' => self.scan_string(),
                '"' => self.scan_escaped_identifier('"', '"'),
                '[' => self.scan_escaped_identifier('[', ']'),
                '`' => self.scan_escaped_identifier('`', '`'),
                '?' => {
                    self.shift();
                    if self.peek().is_ascii_digit() {
                        let digits_start = self.pos;
                        self.shift_while(|c| c.is_ascii_digit());
                        match i64::from_str(&self.source[digits_start..self.pos]) {
                            Ok(n) => TokenKind::Placeholder(Placeholder::Numbered(n)),
                            Err(_) => {
                                self.diagnostics.push(Diagnostic::error(
                                    "invalid numbered bind parameter",
                                    self.location_from(start),
                                ));
                                TokenKind::Placeholder(Placeholder::Numbered(0))
                            }
                        }
                    } else {
                        TokenKind::Placeholder(Placeholder::Anonymous)
                    }
                }
                ':' | '@' => {
                    self.shift();
                    let name_start = self.pos;
                    self.shift_while(is_identifier_continue);
                    let name = SmolStr::new(&self.source[name_start..self.pos]);
                    if name.is_empty() {
                        // A bare ':' is punctuation (`DEFINE QUERY` options);
                        // a bare '@' is always a mistake.
                        if ch == ':' {
                            TokenKind::Colon
                        } else {
                            self.diagnostics.push(Diagnostic::error(
                                "expected a name after '@'",
                                self.location_from(start),
                            ));
                            continue;
                        }
                    } else if ch == ':' {
                        TokenKind::Placeholder(Placeholder::Colon(name))
                    } else {
                        TokenKind::Placeholder(Placeholder::At(name))
                    }
                }
                '$' => {
                    self.shift();
                    let name_start = self.pos;
                    self.shift_while(|c| is_identifier_continue(c) || c == ':');
                    if self.peek() == '(' {
                        self.shift();
                        self.shift_while(|c| c != ')');
                        if self.at_eof() {
                            self.diagnostics.push(Diagnostic::error(
                                "unterminated bind parameter suffix",
                                self.location_from(start),
                            ));
                        } else {
                            self.shift();
                        }
                    }
                    TokenKind::Placeholder(Placeholder::Tcl(SmolStr::new(
                        &self.source[name_start..self.pos],
                    )))
                }
                '0' if matches!(self.peek2(), 'x' | 'X') => self.scan_hex(),
                _ if ch.is_ascii_digit() => self.scan_number(),
                _ if is_identifier_start(ch) => self.scan_word(),
                _ => {
                    self.shift();
                    self.diagnostics.push(Diagnostic::error(
                        format!("unknown character {ch:?}"),
                        self.location_from(start),
                    ));
                    continue;
                }
            };

            return self.token_from(kind, start);
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.shift();
        kind
    }

    fn token_from(&self, kind: TokenKind, start: (usize, usize, usize)) -> Token {
        Token::new(kind, self.location_from(start))
    }

    fn location_from(&self, (start, line, column): (usize, usize, usize)) -> Location {
        Location::new(start, self.pos, line, column)
    }

    /// Skip whitespace and comments. `--` runs to the end of the line,
    /// `/* ... */` to the closing delimiter.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                c if c.is_whitespace() => {
                    self.shift();
                }
                '-' if self.peek2() == '-' => {
                    self.shift_while(|c| c != '\n');
                }
                '/' if self.peek2() == '*' => {
                    let start = (self.pos, self.line, self.column);
                    self.shift();
                    self.shift();
                    loop {
                        if self.at_eof() {
                            self.diagnostics.push(Diagnostic::error(
                                "unterminated block comment",
                                self.location_from(start),
                            ));
                            break;
                        }
                        if self.peek() == '*' && self.peek2() == '/' {
                            self.shift();
                            self.shift();
                            break;
                        }
                        self.shift();
                    }
                }
                _ => return,
            }
        }
    }

    /// A word is a keyword, an identifier, or the `X'..'` blob prefix.
    fn scan_word(&mut self) -> TokenKind {
        if matches!(self.peek(), 'x' | 'X') && self.peek2() == '\'' {
            return self.scan_blob();
        }

        let start = self.pos;
        self.shift_while(is_identifier_continue);
        let text = &self.source[start..self.pos];

        match Keyword::from_str(text) {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier(SmolStr::new(text)),
        }
    }

    fn scan_string(&mut self) -> TokenKind {
        let start = (self.pos, self.line, self.column);
        self.shift();
        let mut value = String::new();
        loop {
            if self.at_eof() {
                self.diagnostics.push(Diagnostic::error(
                    "unterminated string literal",
                    self.location_from(start),
                ));
                break;
            }
            let ch = self.shift();
            if ch == '\'' {
                // A doubled quote is an escaped quote.
                if self.peek() == '\'' {
                    self.shift();
                    value.push('\'');
                    continue;
                }
                break;
            }
            value.push(ch);
        }
        TokenKind::String(SmolStr::new(value))
    }

    fn scan_blob(&mut self) -> TokenKind {
        let start = (self.pos, self.line, self.column);
        self.shift();
        self.shift();
        let content_start = self.pos;
        self.shift_while(|c| c != '\'');
        let content = SmolStr::new(&self.source[content_start..self.pos]);
        if self.at_eof() {
            self.diagnostics.push(Diagnostic::error(
                "unterminated blob literal",
                self.location_from(start),
            ));
        } else {
            self.shift();
        }
        if content.len() % 2 != 0 || !content.chars().all(|c| c.is_ascii_hexdigit()) {
            self.diagnostics.push(Diagnostic::error(
                "blob literal must contain an even number of hex digits",
                self.location_from(start),
            ));
        }
        TokenKind::Blob(content)
    }

    fn scan_escaped_identifier(&mut self, open: char, close: char) -> TokenKind {
        let start = (self.pos, self.line, self.column);
        self.shift();
        let content_start = self.pos;
        self.shift_while(|c| c != close);
        let symbol = SmolStr::new(&self.source[content_start..self.pos]);
        if self.at_eof() {
            self.diagnostics.push(Diagnostic::error(
                format!("unterminated identifier, expected closing '{close}' to match '{open}'"),
                self.location_from(start),
            ));
        } else {
            self.shift();
        }
        TokenKind::Identifier(symbol)
    }

    fn scan_hex(&mut self) -> TokenKind {
        let start = (self.pos, self.line, self.column);
        self.shift();
        self.shift();
        let digits_start = self.pos;
        self.shift_while(|c| c.is_ascii_hexdigit() || c == '_');
        let digits: String = self.source[digits_start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();

        match u64::from_str_radix(&digits, 16) {
            Ok(value) => TokenKind::HexInt(value as i64),
            Err(_) => {
                self.diagnostics.push(Diagnostic::error(
                    "invalid hex literal",
                    self.location_from(start),
                ));
                TokenKind::HexInt(0)
            }
        }
    }

    /// Numeric literal: optional integer part, optional fraction, optional
    /// exponent. Underscore separators are stripped before parsing.
    fn scan_number(&mut self) -> TokenKind {
        let start = (self.pos, self.line, self.column);
        let mut is_double = false;

        self.shift_while(|c| c.is_ascii_digit() || c == '_');
        if self.peek() == '.' && (self.peek2().is_ascii_digit() || self.pos == start.0) {
            is_double = true;
            self.shift();
            self.shift_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.peek(), 'e' | 'E') {
            let after = self.peek2();
            if after.is_ascii_digit() || matches!(after, '+' | '-') {
                is_double = true;
                self.shift();
                if matches!(self.peek(), '+' | '-') {
                    self.shift();
                }
                self.shift_while(|c| c.is_ascii_digit());
            }
        }

        let spelled: String = self.source[start.0..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();

        if is_double {
            match f64::from_str(&spelled) {
                Ok(value) => TokenKind::Double(value),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        "invalid numeric literal",
                        self.location_from(start),
                    ));
                    TokenKind::Double(0.0)
                }
            }
        } else {
            match i64::from_str(&spelled) {
                Ok(value) => TokenKind::Int(value),
                Err(_) => {
                    self.diagnostics.push(Diagnostic::error(
                        "integer literal out of range",
                        self.location_from(start),
                    ));
                    TokenKind::Int(0)
                }
            }
        }
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lex_all(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.is_eof();
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, lexer.take_diagnostics())
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = lex_all(source);
        assert_eq!(diagnostics, vec![]);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("SELECT name FROM users"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Identifier("name".into()),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Identifier("users".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(kinds("42"), vec![TokenKind::Int(42), TokenKind::Eof]);
        assert_eq!(
            kinds("1_000_000"),
            vec![TokenKind::Int(1_000_000), TokenKind::Eof]
        );
        assert_eq!(kinds("3.25"), vec![TokenKind::Double(3.25), TokenKind::Eof]);
        assert_eq!(kinds(".5"), vec![TokenKind::Double(0.5), TokenKind::Eof]);
        assert_eq!(
            kinds("1e3"),
            vec![TokenKind::Double(1000.0), TokenKind::Eof]
        );
        assert_eq!(
            kinds("2.5e-1"),
            vec![TokenKind::Double(0.25), TokenKind::Eof]
        );
        assert_eq!(
            kinds("0xFF"),
            vec![TokenKind::HexInt(255), TokenKind::Eof]
        );
    }

    #[test]
    fn test_integer_out_of_range_defaults_to_zero() {
        let (tokens, diagnostics) = lex_all("99999999999999999999999999");
        assert_eq!(tokens[0].kind, TokenKind::Int(0));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("out of range"));
    }

    #[test]
    fn test_strings_and_escaped_identifiers() {
        assert_eq!(
            kinds("'it''s'"),
            vec![TokenKind::String("it's".into()), TokenKind::Eof]
        );
        assert_eq!(
            kinds(r#""order" [group] `select`"#),
            vec![
                TokenKind::Identifier("order".into()),
                TokenKind::Identifier("group".into()),
                TokenKind::Identifier("select".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_blob_literal() {
        assert_eq!(
            kinds("X'53514C'"),
            vec![TokenKind::Blob("53514C".into()), TokenKind::Eof]
        );
        let (_, diagnostics) = lex_all("x'5'");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, diagnostics) = lex_all("'oops");
        assert_eq!(tokens[0].kind, TokenKind::String("oops".into()));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("unterminated"));
    }

    #[test]
    fn test_operators_are_greedy() {
        assert_eq!(
            kinds("<< <= <> < >> >= > || | -> ->> - == = != ~"),
            vec![
                TokenKind::LessLess,
                TokenKind::LessEquals,
                TokenKind::LessGreater,
                TokenKind::LessThan,
                TokenKind::GreaterGreater,
                TokenKind::GreaterEquals,
                TokenKind::GreaterThan,
                TokenKind::PipePipe,
                TokenKind::Pipe,
                TokenKind::Arrow,
                TokenKind::LongArrow,
                TokenKind::Minus,
                TokenKind::EqualsEquals,
                TokenKind::Equals,
                TokenKind::BangEquals,
                TokenKind::Tilde,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            kinds("? ?3 :name @name $ns::var(key)"),
            vec![
                TokenKind::Placeholder(Placeholder::Anonymous),
                TokenKind::Placeholder(Placeholder::Numbered(3)),
                TokenKind::Placeholder(Placeholder::Colon("name".into())),
                TokenKind::Placeholder(Placeholder::At("name".into())),
                TokenKind::Placeholder(Placeholder::Tcl("ns::var(key)".into())),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("SELECT -- trailing\n 1 /* block\ncomment */ ;"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Int(1),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unknown_character_is_skipped_with_diagnostic() {
        let (tokens, diagnostics) = lex_all("select ^ 1");
        assert_eq!(
            tokens.iter().map(|t| t.kind.clone()).collect::<Vec<_>>(),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Int(1),
                TokenKind::Eof
            ]
        );
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_locations_reconstruct_spelling() {
        let source = "SELECT foo, 12 FROM bar WHERE x >= 3.5";
        let (tokens, _) = lex_all(source);
        for token in &tokens {
            if token.is_eof() {
                continue;
            }
            let spelled = &source[token.location.range()];
            assert!(!spelled.is_empty());
            match &token.kind {
                TokenKind::Identifier(name) => assert_eq!(spelled, name.as_str()),
                TokenKind::Keyword(kw) => assert_eq!(spelled.to_uppercase(), kw.as_ref()),
                _ => {}
            }
        }
    }

    #[test]
    fn test_line_and_column_tracking() {
        let (tokens, _) = lex_all("a\n  b");
        assert_eq!((tokens[0].location.line, tokens[0].location.column), (1, 1));
        assert_eq!((tokens[1].location.line, tokens[1].location.column), (2, 3));
    }
}
