//! Token definitions for the Slarit language

use std::fmt;

/// A token produced by the lexer: the raw lexeme and its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub lexeme: String,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(lexeme: impl Into<String>, kind: TokenKind) -> Self {
        Self {
            lexeme: lexeme.into(),
            kind,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// An operator token spelled exactly `op`
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.lexeme == op
    }

    /// An identifier token spelled exactly `word`
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == word
    }
}

/// Token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Decimal integer literal
    Number,
    /// Identifier, may carry sigils and a `:Type` suffix
    Identifier,
    /// (
    LeftBracket,
    /// )
    RightBracket,
    /// + - * / < > = & | . and the merged pairs >= <= == <-
    Operator,
    /// @ (dereference)
    At,
    /// ! (logical not)
    Not,
    /// {
    LeftSection,
    /// }
    RightSection,
    /// ,
    Comma,
    /// newline or ;
    Eol,
}

impl TokenKind {
    /// Does `c` belong to this kind's character class?
    pub fn accepts(self, c: char) -> bool {
        match self {
            Self::Number => c.is_ascii_digit(),
            Self::Identifier => {
                c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '%' | '^' | '!' | '?' | ':' | '#')
            }
            Self::LeftBracket => c == '(',
            Self::RightBracket => c == ')',
            Self::Operator => matches!(c, '+' | '-' | '*' | '/' | '<' | '>' | '=' | '&' | '|' | '.'),
            Self::At => c == '@',
            Self::Not => c == '!',
            Self::LeftSection => c == '{',
            Self::RightSection => c == '}',
            Self::Comma => c == ',',
            Self::Eol => c == '\n' || c == ';',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Number => "NUMBERS",
            Self::Identifier => "IDENTIFIER",
            Self::LeftBracket => "LEFT_BRACKET",
            Self::RightBracket => "RIGHT_BRACKET",
            Self::Operator => "OPERATOR",
            Self::At => "AT",
            Self::Not => "NOT",
            Self::LeftSection => "LEFT_SECTION_BRACKET",
            Self::RightSection => "RIGHT_SECTION_BRACKET",
            Self::Comma => "COMMA",
            Self::Eol => "EOL",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.lexeme, self.kind)
    }
}
