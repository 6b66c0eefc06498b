//! Character-level scanner: turns source text into a stream of `Token`s.
//!
//! Scanning has no I/O of its own — the CLI reads the file and hands the
//! scanner a `&str`, so the library stays free of file-system side effects.

mod token;

pub use token::{Token, TokenKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{line}: unrecognized character '{ch}'")]
    BadChar { line: u32, ch: char },

    #[error("{line}: unterminated block comment")]
    UnterminatedComment { line: u32 },

    #[error("{line}: integer literal '{lexeme}' out of range")]
    IntegerOverflow { line: u32, lexeme: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A hand-written state machine over the source characters.
///
/// `Scanner` is cheaply `Clone`: `peek_token` clones the scanner, advances
/// the clone, and discards it, rather than threading an explicit
/// save/restore API through the source reader the way a stream-backed
/// scanner would need to.
#[derive(Debug, Clone)]
pub struct Scanner<'src> {
    chars: std::iter::Peekable<std::str::Chars<'src>>,
    line: u32,
}

impl<'src> Scanner<'src> {
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Returns the next token without consuming it from `self`.
    pub fn peek_token(&self) -> Result<Token> {
        self.clone().next_token()
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia()?;

        let line = self.line;
        let Some(c) = self.advance() else {
            return Ok(Token::new(TokenKind::Eof, line));
        };

        let kind = match c {
            '<' => {
                if self.eat('<') {
                    TokenKind::Insertion
                } else if self.eat('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::NotEqual
                } else {
                    return Err(Error::BadChar { line, ch: '!' });
                }
            }
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusEqual
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat('*') {
                    TokenKind::Power
                } else {
                    TokenKind::Star
                }
            }
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LCurly,
            '}' => TokenKind::RCurly,
            '0'..='9' => return self.integer(c, line),
            c if is_ident_start(c) => return Ok(self.identifier(c, line)),
            other => return Err(Error::BadChar { line, ch: other }),
        };

        Ok(Token::new(kind, line))
    }

    fn integer(&mut self, first: char, line: u32) -> Result<Token> {
        let mut lexeme = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let value = lexeme
            .parse::<i32>()
            .map_err(|_| Error::IntegerOverflow { line, lexeme })?;
        Ok(Token::new(TokenKind::Integer(value), line))
    }

    fn identifier(&mut self, first: char, line: u32) -> Token {
        let mut lexeme = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if is_ident_continue(c) {
                lexeme.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let kind = keyword(&lexeme).unwrap_or(TokenKind::Identifier(lexeme));
        Token::new(kind, line)
    }

    /// Skips whitespace, `//` line comments and `/* ... */` block comments.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.chars.peek() {
                Some('\n') => {
                    self.chars.next();
                    self.line += 1;
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    match lookahead.peek() {
                        Some('/') => {
                            self.chars.next();
                            self.chars.next();
                            while !matches!(self.chars.peek(), Some('\n') | None) {
                                self.chars.next();
                            }
                        }
                        Some('*') => {
                            let start_line = self.line;
                            self.chars.next();
                            self.chars.next();
                            loop {
                                match self.chars.next() {
                                    Some('*') if self.chars.peek() == Some(&'/') => {
                                        self.chars.next();
                                        break;
                                    }
                                    Some('\n') => self.line += 1,
                                    Some(_) => {}
                                    None => {
                                        return Err(Error::UnterminatedComment {
                                            line: start_line,
                                        });
                                    }
                                }
                            }
                        }
                        _ => break,
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn keyword(lexeme: &str) -> Option<TokenKind> {
    Some(match lexeme {
        "void" => TokenKind::Void,
        "main" => TokenKind::Main,
        "int" => TokenKind::Int,
        "cout" => TokenKind::Cout,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "repeat" => TokenKind::Repeat,
        "endl" => TokenKind::Endl,
        "or" => TokenKind::Or,
        "and" => TokenKind::And,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let tok = scanner.next_token().expect("scan ok");
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn scans_two_char_operators() {
        assert_eq!(
            kinds("<< <= >= == != ++ -- += -= **"),
            vec![
                TokenKind::Insertion,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::PlusEqual,
                TokenKind::MinusEqual,
                TokenKind::Power,
            ]
        );
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(
            kinds("int x repeat endl foo_bar"),
            vec![
                TokenKind::Int,
                TokenKind::Identifier("x".to_string()),
                TokenKind::Repeat,
                TokenKind::Endl,
                TokenKind::Identifier("foo_bar".to_string()),
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let mut scanner = Scanner::new("// a comment\nint /* block \n comment */ x");
        assert_eq!(scanner.next_token().unwrap().kind, TokenKind::Int);
        let tok = scanner.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Identifier("x".to_string()));
        assert_eq!(tok.line, 3);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut scanner = Scanner::new("int x");
        assert_eq!(scanner.peek_token().unwrap().kind, TokenKind::Int);
        assert_eq!(scanner.next_token().unwrap().kind, TokenKind::Int);
        assert_eq!(
            scanner.next_token().unwrap().kind,
            TokenKind::Identifier("x".to_string())
        );
    }

    #[test]
    fn rejects_bad_character() {
        let mut scanner = Scanner::new("@");
        assert!(matches!(
            scanner.next_token(),
            Err(Error::BadChar { ch: '@', .. })
        ));
    }

    #[test]
    fn negative_literal_is_unary_minus_not_a_lexeme() {
        // The scanner only ever produces non-negative integer literals;
        // `-7` is Minus followed by Integer(7), folded later by the parser.
        assert_eq!(
            kinds("-7"),
            vec![TokenKind::Minus, TokenKind::Integer(7)]
        );
    }
}
