#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Reserved words
    Void,
    Main,
    Int,
    Cout,
    If,
    Else,
    While,
    Do,
    For,
    Repeat,
    Endl,
    And,
    Or,
    // Relational / modulo
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    EqualEqual,
    NotEqual,
    Percent,
    // Other operators
    Insertion,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    PlusPlus,
    MinusMinus,
    PlusEqual,
    MinusEqual,
    // Punctuation
    Semicolon,
    LParen,
    RParen,
    LCurly,
    RCurly,
    // Literals
    Identifier(String),
    Integer(i32),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

impl Token {
    #[must_use]
    pub const fn new(kind: TokenKind, line: u32) -> Self {
        Self { kind, line }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identifier(name) => write!(f, "identifier '{name}'"),
            Self::Integer(v) => write!(f, "integer {v}"),
            other => write!(f, "{other:?}"),
        }
    }
}
