//! Lexer for the Slarit language
//!
//! Characters are fed one at a time. The lexer keeps an accumulation buffer
//! plus an expectation set: the token kinds that may legally start or extend
//! at the current position. Classification tries the expected kinds in order,
//! so the set also disambiguates (a digit after an identifier extends it).

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result};

use TokenKind::*;

/// Keywords that switch the lexer to "start of expression" on whitespace
const RETURN_KEYWORDS: [&str; 2] = ["return", "return!"];

const EXPECT_STATEMENT: &[TokenKind] = &[Identifier, Eol];
const EXPECT_EXPRESSION: &[TokenKind] = &[Not, At, Number, Identifier, LeftBracket];
const EXPECT_AFTER_IDENTIFIER: &[TokenKind] = &[
    Number, Identifier, Operator, LeftBracket, RightBracket, Comma, RightSection, LeftSection, Eol,
];
const EXPECT_IDENTIFIER_DIGIT: &[TokenKind] = &[
    Number, Identifier, Operator, LeftBracket, RightBracket, Comma, RightSection, Eol,
];
const EXPECT_NUMBER_DIGIT: &[TokenKind] = &[
    Number, Identifier, Operator, RightBracket, Comma, RightSection, Eol,
];
const EXPECT_NUMBER_START: &[TokenKind] = &[
    Number, Identifier, Operator, Comma, RightBracket, RightSection, Eol,
];
const EXPECT_AFTER_COMMA: &[TokenKind] = &[Number, Identifier, LeftBracket];
const EXPECT_AFTER_LEFT_BRACKET: &[TokenKind] = &[Number, Not, At, Identifier, LeftBracket, RightBracket];
const EXPECT_AFTER_RIGHT_BRACKET: &[TokenKind] = &[
    Comma, RightBracket, LeftSection, RightSection, Operator, Eol,
];
const EXPECT_AFTER_PAIR: &[TokenKind] = &[Not, At, Number, Identifier, LeftBracket];
const EXPECT_AFTER_PENDING: &[TokenKind] = &[Not, At, Number, Identifier, LeftBracket, Operator];
const EXPECT_AFTER_RETURN: &[TokenKind] = &[Not, At, Number, Identifier, LeftBracket, RightSection, Eol];
const EXPECT_AFTER_PREFIX: &[TokenKind] = &[Number, Identifier, LeftBracket];
const EXPECT_LINE_START: &[TokenKind] = &[Identifier, Eol, RightSection];

/// The lexer state
pub struct Lexer {
    /// Tokens flushed so far, in source order
    tokens: Vec<Token>,
    /// Current accumulation buffer
    buffer: String,
    /// Kind of the buffer, `None` while empty
    buffer_kind: Option<TokenKind>,
    /// Kinds allowed for the next character
    expecting: &'static [TokenKind],
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            buffer: String::new(),
            buffer_kind: None,
            expecting: EXPECT_STATEMENT,
            line: 1,
            column: 0,
        }
    }

    /// Feed a whole string, one character at a time
    pub fn feed_str(&mut self, source: &str) -> Result<()> {
        source.chars().try_for_each(|c| self.feed(c))
    }

    /// Feed a single character
    pub fn feed(&mut self, c: char) -> Result<()> {
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }

        if matches!(c, ' ' | '\t' | '\r') {
            let is_return = RETURN_KEYWORDS.contains(&self.buffer.as_str());
            self.flush();
            if is_return {
                self.expecting = EXPECT_AFTER_RETURN;
            }
            return Ok(());
        }

        let kind = self
            .expecting
            .iter()
            .copied()
            .find(|k| k.accepts(c))
            .ok_or_else(|| Error::UnexpectedChar {
                ch: c,
                expected: self
                    .expecting
                    .iter()
                    .map(|k| k.name())
                    .collect::<Vec<_>>()
                    .join(", "),
                line: self.line,
                column: self.column,
            })?;

        match kind {
            Number => match self.buffer_kind {
                Some(Identifier) => {
                    self.buffer.push(c);
                    self.expecting = EXPECT_IDENTIFIER_DIGIT;
                }
                Some(Number) => {
                    self.buffer.push(c);
                    self.expecting = EXPECT_NUMBER_DIGIT;
                }
                _ => {
                    self.start(c, Number);
                    self.expecting = EXPECT_NUMBER_START;
                }
            },
            Identifier => {
                match self.buffer_kind {
                    Some(Number) => {
                        self.buffer.push(c);
                        self.buffer_kind = Some(Identifier);
                    }
                    Some(Identifier) => self.buffer.push(c),
                    _ => self.start(c, Identifier),
                }
                self.expecting = EXPECT_AFTER_IDENTIFIER;
            }
            Operator => self.feed_operator(c),
            _ => {
                self.flush();
                self.tokens.push(Token::new(c.to_string(), kind));
                self.expecting = match kind {
                    Comma => EXPECT_AFTER_COMMA,
                    LeftBracket => EXPECT_AFTER_LEFT_BRACKET,
                    RightBracket => EXPECT_AFTER_RIGHT_BRACKET,
                    Not | At => EXPECT_AFTER_PREFIX,
                    _ => EXPECT_LINE_START,
                };
            }
        }
        Ok(())
    }

    /// `>`, `<` and `=` wait for a possible second character;
    /// every other operator is complete on its own.
    fn feed_operator(&mut self, c: char) {
        if self.buffer_kind == Some(Operator) {
            if c == '=' || (c == '-' && self.buffer == "<") {
                self.buffer.push(c);
                self.flush();
                self.expecting = EXPECT_AFTER_PAIR;
                return;
            }
            self.flush();
        }

        if matches!(c, '>' | '<' | '=') {
            self.start(c, Operator);
            self.expecting = EXPECT_AFTER_PENDING;
        } else {
            self.flush();
            self.tokens.push(Token::new(c.to_string(), Operator));
            self.expecting = EXPECT_EXPRESSION;
        }
    }

    /// Flush the buffer and start a new one holding `c`
    fn start(&mut self, c: char, kind: TokenKind) {
        self.flush();
        self.buffer.push(c);
        self.buffer_kind = Some(kind);
    }

    fn flush(&mut self) {
        if let Some(kind) = self.buffer_kind.take() {
            if !self.buffer.is_empty() {
                self.tokens.push(Token::new(std::mem::take(&mut self.buffer), kind));
            }
        }
        self.buffer.clear();
    }

    /// Flush whatever is left in the buffer
    pub fn trim(&mut self) {
        self.flush();
        self.tokens.retain(|t| !t.lexeme.is_empty());
    }

    /// The tokens produced so far
    pub fn dump(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(mut self) -> Vec<Token> {
        self.trim();
        self.tokens
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tokenize a complete (preprocessed) source text
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new();
    lexer.feed_str(source)?;
    Ok(lexer.into_tokens())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<(String, TokenKind)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.lexeme, t.kind))
            .collect()
    }

    fn tok(s: &str, k: TokenKind) -> (String, TokenKind) {
        (s.to_string(), k)
    }

    #[test]
    fn test_assignment() {
        assert_eq!(
            kinds("a = 1 + b2\n"),
            vec![
                tok("a", Identifier),
                tok("=", Operator),
                tok("1", Number),
                tok("+", Operator),
                tok("b2", Identifier),
                tok("\n", Eol),
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        let ops: Vec<_> = kinds("x = a >= b <= c == d\np <- q\n")
            .into_iter()
            .filter(|(_, k)| *k == Operator)
            .map(|(s, _)| s)
            .collect();
        assert_eq!(ops, vec!["=", ">=", "<=", "==", "<-"]);
    }

    #[test]
    fn test_unpaired_operator_is_flushed() {
        // `=-` is not a pair: `=` flushes before `-` starts
        let ops: Vec<_> = kinds("x =-y\n")
            .into_iter()
            .filter(|(_, k)| *k == Operator)
            .map(|(s, _)| s)
            .collect();
        assert_eq!(ops, vec!["=", "-"]);
    }

    #[test]
    fn test_typed_identifier_and_call() {
        assert_eq!(
            kinds("p:geo::Point = $alloc(2)"),
            vec![
                tok("p:geo::Point", Identifier),
                tok("=", Operator),
                tok("$alloc", Identifier),
                tok("(", LeftBracket),
                tok("2", Number),
                tok(")", RightBracket),
            ]
        );
    }

    #[test]
    fn test_digit_after_identifier_extends_it() {
        assert_eq!(kinds("x1y2"), vec![tok("x1y2", Identifier)]);
    }

    #[test]
    fn test_return_switches_to_expression() {
        assert_eq!(
            kinds("return @p\n"),
            vec![tok("return", Identifier), tok("@", At), tok("p", Identifier), tok("\n", Eol)]
        );
        assert_eq!(
            kinds("return! (1)"),
            vec![
                tok("return!", Identifier),
                tok("(", LeftBracket),
                tok("1", Number),
                tok(")", RightBracket),
            ]
        );
    }

    #[test]
    fn test_not_after_operator() {
        assert_eq!(
            kinds("x = !a"),
            vec![tok("x", Identifier), tok("=", Operator), tok("!", Not), tok("a", Identifier)]
        );
    }

    #[test]
    fn test_bare_return_before_block_end() {
        assert_eq!(
            kinds("{ return }"),
            vec![tok("{", LeftSection), tok("return", Identifier), tok("}", RightSection)]
        );
    }

    #[test]
    fn test_member_access_and_not() {
        assert_eq!(
            kinds("x = (!a.b)"),
            vec![
                tok("x", Identifier),
                tok("=", Operator),
                tok("(", LeftBracket),
                tok("!", Not),
                tok("a", Identifier),
                tok(".", Operator),
                tok("b", Identifier),
                tok(")", RightBracket),
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a = 1\n(b)").unwrap_err();
        match err {
            Error::UnexpectedChar { ch, line, column, expected } => {
                assert_eq!(ch, '(');
                assert_eq!(line, 2);
                assert_eq!(column, 1);
                assert!(expected.contains("IDENTIFIER"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_lexing_is_deterministic() {
        let source = "main() {\nif (a > 1) {\nb = f(a, 2)\n} else {\nb = 0\n}\n}\n";
        assert_eq!(tokenize(source).unwrap(), tokenize(source).unwrap());
    }

    #[test]
    fn test_trim_drops_empty_tokens() {
        let mut lexer = Lexer::new();
        lexer.feed_str("f(a, b)").unwrap();
        lexer.trim();
        assert!(lexer.dump().iter().all(|t| !t.lexeme.is_empty()));
        assert_eq!(lexer.dump().len(), 6);
    }
}
