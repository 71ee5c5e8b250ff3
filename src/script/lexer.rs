/*!
 * Lexer
 * Turns script text into tokens carrying byte spans for source capture
 */

use super::error::{ScriptError, ScriptResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Newline,
    Eof,

    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    Def,
    Lambda,
    Return,
    Import,
    From,
    As,
    If,
    Else,
    And,
    Or,
    Not,
    In,
    True,
    False,
    None,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,

    Assign,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
}

pub fn tokenize(source: &str) -> ScriptResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
    line: usize,
    col: usize,
    nesting: usize,
    output: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            index: 0,
            line: 1,
            col: 1,
            nesting: 0,
            output: Vec::new(),
        }
    }

    fn tokenize(mut self) -> ScriptResult<Vec<Token>> {
        while let Some(c) = self.peek_char(0) {
            if c == '\n' {
                // Newlines inside brackets are insignificant
                if self.nesting == 0 {
                    let offset = self.offset();
                    self.push(TokenKind::Newline, offset, offset + 1, self.line, self.col);
                }
                self.index += 1;
                self.line += 1;
                self.col = 1;
                continue;
            }
            if c.is_whitespace() {
                self.advance(1);
                continue;
            }
            if c == '#' {
                while let Some(c) = self.peek_char(0) {
                    if c == '\n' {
                        break;
                    }
                    self.advance(1);
                }
                continue;
            }
            if c == '\\' && self.peek_char(1) == Some('\n') {
                // Explicit line continuation
                self.index += 2;
                self.line += 1;
                self.col = 1;
                continue;
            }
            if c == '"' || c == '\'' {
                self.lex_string(c)?;
                continue;
            }
            if c.is_ascii_digit() {
                self.lex_number()?;
                continue;
            }
            if c.is_alphabetic() || c == '_' {
                self.lex_ident_or_keyword();
                continue;
            }
            self.lex_punct()?;
        }

        let end = self.source.len();
        self.push(TokenKind::Eof, end, end, self.line, self.col);
        Ok(self.output)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn peek_char(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|(_, c)| *c)
    }

    fn advance(&mut self, n: usize) {
        self.index += n;
        self.col += n;
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize, line: usize, col: usize) {
        self.output.push(Token {
            kind,
            start,
            end,
            line,
            col,
        });
    }

    fn lex_string(&mut self, quote: char) -> ScriptResult<()> {
        let (start, line, col) = (self.offset(), self.line, self.col);
        self.advance(1);
        let mut value = String::new();
        while let Some(c) = self.peek_char(0) {
            if c == quote {
                self.advance(1);
                let end = self.offset();
                self.push(TokenKind::Str(value), start, end, line, col);
                return Ok(());
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                let escaped = match self.peek_char(1) {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('0') => '\0',
                    Some(other) => other,
                    None => break,
                };
                value.push(escaped);
                self.advance(2);
                continue;
            }
            value.push(c);
            self.advance(1);
        }
        Err(ScriptError::syntax("Unterminated string literal", line, col))
    }

    fn lex_number(&mut self) -> ScriptResult<()> {
        let (start, line, col) = (self.offset(), self.line, self.col);
        let mut raw = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek_char(0) {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    raw.push(c);
                }
                self.advance(1);
            } else if c == '.'
                && !is_float
                && self.peek_char(1).is_some_and(|n| n.is_ascii_digit())
            {
                is_float = true;
                raw.push(c);
                self.advance(1);
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_char(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+')
            {
                is_float = true;
                raw.push(c);
                raw.push(self.peek_char(1).unwrap_or('0'));
                self.advance(2);
            } else {
                break;
            }
        }

        let end = self.offset();
        let kind = if is_float {
            raw.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| ScriptError::syntax("Invalid float literal", line, col))?
        } else {
            raw.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| ScriptError::syntax("Integer literal out of range", line, col))?
        };
        self.push(kind, start, end, line, col);
        Ok(())
    }

    fn lex_ident_or_keyword(&mut self) {
        let (start, line, col) = (self.offset(), self.line, self.col);
        while let Some(c) = self.peek_char(0) {
            if c.is_alphanumeric() || c == '_' {
                self.advance(1);
            } else {
                break;
            }
        }
        let end = self.offset();
        let word = &self.source[start..end];
        let kind = match word {
            "def" => TokenKind::Def,
            "lambda" => TokenKind::Lambda,
            "return" => TokenKind::Return,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "as" => TokenKind::As,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => TokenKind::Ident(word.to_string()),
        };
        self.push(kind, start, end, line, col);
    }

    fn lex_punct(&mut self) -> ScriptResult<()> {
        let (start, line, col) = (self.offset(), self.line, self.col);
        let c = self.peek_char(0).unwrap_or('\0');
        let next = self.peek_char(1);

        let (kind, width) = match (c, next) {
            ('*', Some('*')) => (TokenKind::DoubleStar, 2),
            ('/', Some('/')) => (TokenKind::DoubleSlash, 2),
            ('=', Some('=')) => (TokenKind::EqualEqual, 2),
            ('!', Some('=')) => (TokenKind::BangEqual, 2),
            ('<', Some('=')) => (TokenKind::LessEqual, 2),
            ('>', Some('=')) => (TokenKind::GreaterEqual, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('=', _) => (TokenKind::Assign, 1),
            ('<', _) => (TokenKind::Less, 1),
            ('>', _) => (TokenKind::Greater, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            (other, _) => {
                return Err(ScriptError::syntax(
                    format!("Unexpected character '{}'", other),
                    line,
                    col,
                ))
            }
        };

        match kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => self.nesting += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                self.nesting = self.nesting.saturating_sub(1)
            }
            _ => {}
        }

        self.advance(width);
        let end = self.offset();
        self.push(kind, start, end, line, col);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_def_tokens() {
        assert_eq!(
            kinds("def f(x): return x ** 2"),
            vec![
                TokenKind::Def,
                TokenKind::Ident("f".into()),
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::RParen,
                TokenKind::Colon,
                TokenKind::Return,
                TokenKind::Ident("x".into()),
                TokenKind::DoubleStar,
                TokenKind::Int(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            kinds("1_000 2.5 1e3 'a\\n' \"b\""),
            vec![
                TokenKind::Int(1000),
                TokenKind::Float(2.5),
                TokenKind::Float(1000.0),
                TokenKind::Str("a\n".into()),
                TokenKind::Str("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets_ignored() {
        let tokens = kinds("f(1,\n 2)\nx");
        let newlines = tokens
            .iter()
            .filter(|k| **k == TokenKind::Newline)
            .count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_spans_cover_source() {
        let source = "import math  # comment";
        let tokens = tokenize(source).unwrap();
        assert_eq!(&source[tokens[1].start..tokens[1].end], "math");
        assert_eq!(tokens[1].col, 8);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc").unwrap_err();
        assert_eq!(err.kind, super::super::error::ErrorKind::SyntaxError);
    }
}
