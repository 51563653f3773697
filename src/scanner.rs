use std::iter::FusedIterator;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // One-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Asterisk,
    // One- or two-character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    // Literals
    Identifier,
    String,
    Number,
    // Keywords
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,
    Error,
    Eof,
}

/// A lexical token. `lexeme` borrows the exact source bytes from `start`; for
/// string literals it still includes the surrounding quotes.
#[derive(Debug, PartialEq, Clone)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub start: usize,
    pub line: usize,
    pub error: Option<ScanError>,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, start: usize, line: usize) -> Self {
        Self {
            kind,
            lexeme,
            start,
            line,
            error: None,
        }
    }

    /// Placeholder used before the first token is scanned.
    pub fn synthetic(line: usize) -> Self {
        Self::new(TokenKind::Eof, "", 0, line)
    }
}

pub struct Scanner<'a> {
    source: &'a str,
    graphemes: Vec<(usize, &'a str)>,
    start: usize,
    current: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            graphemes: source.grapheme_indices(true).collect(),
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// Scans the next token. Once the source is exhausted every call returns
    /// an `Eof` token.
    pub fn scan_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.start = self.current;

        let c = match self.advance() {
            Some(c) => c,
            None => return self.make_token(TokenKind::Eof),
        };

        use TokenKind::*;
        match c {
            "(" => self.make_token(LeftParen),
            ")" => self.make_token(RightParen),
            "{" => self.make_token(LeftBrace),
            "}" => self.make_token(RightBrace),
            ";" => self.make_token(Semicolon),
            "," => self.make_token(Comma),
            "." => self.make_token(Dot),
            "-" => self.make_token(Minus),
            "+" => self.make_token(Plus),
            "/" => self.make_token(Slash),
            "*" => self.make_token(Asterisk),
            "!" => {
                let kind = if self.advance_if_matches("=") {
                    BangEqual
                } else {
                    Bang
                };
                self.make_token(kind)
            }
            "=" => {
                let kind = if self.advance_if_matches("=") {
                    EqualEqual
                } else {
                    Equal
                };
                self.make_token(kind)
            }
            "<" => {
                let kind = if self.advance_if_matches("=") {
                    LessEqual
                } else {
                    Less
                };
                self.make_token(kind)
            }
            ">" => {
                let kind = if self.advance_if_matches("=") {
                    GreaterEqual
                } else {
                    Greater
                };
                self.make_token(kind)
            }
            "\"" => self.string(),
            c if is_digit(c) => self.number(),
            c if is_alpha(c) => self.identifier(),
            c => self.error_token(ScanError::UnexpectedCharacter(c.to_string(), self.line)),
        }
    }

    fn offset(&self, index: usize) -> usize {
        self.graphemes
            .get(index)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn lexeme(&self) -> &'a str {
        &self.source[self.offset(self.start)..self.offset(self.current)]
    }

    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token::new(kind, self.lexeme(), self.offset(self.start), self.line)
    }

    fn error_token(&self, error: ScanError) -> Token<'a> {
        let mut token = self.make_token(TokenKind::Error);
        token.error = Some(error);
        token
    }

    fn advance(&mut self) -> Option<&'a str> {
        let (_, c) = *self.graphemes.get(self.current)?;
        self.current += 1;
        Some(c)
    }

    fn peek(&self) -> Option<&'a str> {
        self.graphemes.get(self.current).map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<&'a str> {
        self.graphemes.get(self.current + 1).map(|(_, c)| *c)
    }

    fn advance_if_matches(&mut self, expected: &str) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                " " | "\t" | "\r" => {
                    self.current += 1;
                }
                "\n" | "\r\n" => {
                    self.current += 1;
                    self.line += 1;
                }
                "/" if self.peek_next() == Some("/") => {
                    while let Some(c) = self.peek() {
                        if is_newline(c) {
                            break;
                        }
                        self.current += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn string(&mut self) -> Token<'a> {
        let starting_line = self.line;
        while let Some(c) = self.peek() {
            if c == "\"" {
                break;
            }
            if is_newline(c) {
                self.line += 1;
            }
            self.current += 1;
        }

        if self.peek().is_none() {
            return self.error_token(ScanError::UnterminatedString(self.line));
        }

        // Closing quote
        self.current += 1;
        let mut token = self.make_token(TokenKind::String);
        token.line = starting_line;
        token
    }

    fn number(&mut self) -> Token<'a> {
        self.consume_digits();
        if self.peek() == Some(".") && self.peek_next().map_or(false, is_digit) {
            // Consume .
            self.current += 1;
            self.consume_digits();
        }
        self.make_token(TokenKind::Number)
    }

    fn consume_digits(&mut self) {
        while self.peek().map_or(false, is_digit) {
            self.current += 1;
        }
    }

    fn identifier(&mut self) -> Token<'a> {
        while self.peek().map_or(false, |c| is_alpha(c) || is_digit(c)) {
            self.current += 1;
        }
        let kind = keyword_kind(self.lexeme());
        self.make_token(kind)
    }
}

/// Identifiers are ASCII only, so byte indexing into `identifier` is safe.
fn keyword_kind(identifier: &str) -> TokenKind {
    use TokenKind::*;
    let bytes = identifier.as_bytes();
    match bytes.first() {
        Some(b'a') => check_keyword(identifier, 1, "nd", And),
        Some(b'c') => check_keyword(identifier, 1, "lass", Class),
        Some(b'e') => check_keyword(identifier, 1, "lse", Else),
        Some(b'f') => match bytes.get(1) {
            Some(b'a') => check_keyword(identifier, 2, "lse", False),
            Some(b'o') => check_keyword(identifier, 2, "r", For),
            Some(b'u') => check_keyword(identifier, 2, "n", Fun),
            _ => Identifier,
        },
        Some(b'i') => check_keyword(identifier, 1, "f", If),
        Some(b'n') => check_keyword(identifier, 1, "il", Nil),
        Some(b'o') => check_keyword(identifier, 1, "r", Or),
        Some(b'p') => check_keyword(identifier, 1, "rint", Print),
        Some(b'r') => check_keyword(identifier, 1, "eturn", Return),
        Some(b's') => check_keyword(identifier, 1, "uper", Super),
        Some(b't') => match bytes.get(1) {
            Some(b'h') => check_keyword(identifier, 2, "is", This),
            Some(b'r') => check_keyword(identifier, 2, "ue", True),
            _ => Identifier,
        },
        Some(b'v') => check_keyword(identifier, 1, "ar", Var),
        Some(b'w') => check_keyword(identifier, 1, "hile", While),
        _ => Identifier,
    }
}

fn check_keyword(identifier: &str, start: usize, rest: &str, kind: TokenKind) -> TokenKind {
    if identifier.len() == start + rest.len() && &identifier[start..] == rest {
        kind
    } else {
        TokenKind::Identifier
    }
}

fn is_newline(c: &str) -> bool {
    matches!(c, "\n" | "\r\n")
}

fn is_digit(c: &str) -> bool {
    matches!(c.as_bytes(), [b] if b.is_ascii_digit())
}

fn is_alpha(c: &str) -> bool {
    matches!(c.as_bytes(), [b] if b.is_ascii_alphabetic() || *b == b'_')
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.scan_token();
        (token.kind != TokenKind::Eof).then_some(token)
    }
}

impl<'a> FusedIterator for Scanner<'a> {}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ScanError {
    #[error("[line {1}] Error: Unexpected character '{0}'.")]
    UnexpectedCharacter(String, usize),
    #[error("[line {0}] Error: Unterminated string.")]
    UnterminatedString(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn scanner_len() {
        let source = "a \tb\n\r//c√∂mment\nc";
        assert_eq!(Scanner::new(source).count(), 3);
    }

    #[test]
    fn single_char() {
        let expected = [
            LeftParen, RightParen, LeftBrace, RightBrace, Semicolon, Comma, Dot, Minus, Plus,
            Slash, Asterisk,
        ];
        assert_eq!(kinds("(){};,.-+/*"), expected);
    }

    #[test]
    fn one_or_two_char() {
        let expected = [
            Equal,
            EqualEqual,
            Bang,
            BangEqual,
            Less,
            LessEqual,
            Greater,
            GreaterEqual,
            EqualEqual,
            Equal,
        ];
        assert_eq!(kinds("= == ! != < <= > >= ==="), expected);
    }

    #[test]
    fn string() {
        let source = "\n\"hi!\nsup\"\n\"how are you?\"";
        let res: Vec<_> = Scanner::new(source).map(|t| (t.lexeme, t.line)).collect();
        assert_eq!(res, [("\"hi!\nsup\"", 2), ("\"how are you?\"", 4)]);
    }

    #[test]
    fn unterminated_string() {
        let mut scanner = Scanner::new("\"abc\n");
        let token = scanner.scan_token();
        assert_eq!(token.kind, Error);
        assert_eq!(token.error, Some(ScanError::UnterminatedString(2)));
        assert_eq!(scanner.scan_token().kind, Eof);
    }

    #[test]
    fn digit() {
        let source = "0.123456789\n14482.148210:";
        let res: Vec<_> = Scanner::new(source).collect();
        assert_eq!(res[0], Token::new(Number, "0.123456789", 0, 1));
        assert_eq!(res[1], Token::new(Number, "14482.148210", 12, 2));
        assert_eq!(res[2].kind, Error);
        assert_eq!(
            res[2].error,
            Some(ScanError::UnexpectedCharacter(":".to_owned(), 2))
        );
    }

    #[test]
    fn number_without_fraction_leaves_dot() {
        assert_eq!(kinds("12."), [Number, Dot]);
        assert_eq!(kinds("-3"), [Minus, Number]);
    }

    #[test]
    fn identifier() {
        let res: Vec<_> = Scanner::new("a Beta _c class").collect();
        assert_eq!(res[0], Token::new(Identifier, "a", 0, 1));
        assert_eq!(res[1], Token::new(Identifier, "Beta", 2, 1));
        assert_eq!(res[2], Token::new(Identifier, "_c", 7, 1));
        assert_eq!(res[3], Token::new(Class, "class", 10, 1));
    }

    #[test]
    fn keywords_need_exact_match() {
        assert_eq!(
            kinds("and andy fun funny for f true th this var vars while"),
            [
                And, Identifier, Fun, Identifier, For, Identifier, True, Identifier, This, Var,
                Identifier, While
            ]
        );
    }

    #[test]
    fn eof_repeats() {
        let mut scanner = Scanner::new("x");
        assert_eq!(scanner.scan_token().kind, Identifier);
        for _ in 0..3 {
            assert_eq!(scanner.scan_token().kind, Eof);
        }
    }

    #[test]
    fn offsets_are_bytes() {
        let res: Vec<_> = Scanner::new("\"√\" x").collect();
        assert_eq!(res[1].start, 6);
        assert_eq!(res[1].lexeme, "x");
    }
}
