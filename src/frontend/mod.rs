//! Frontend module - Text preparation, lexing, parsing, AST

pub mod ast;
pub mod context;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod token;

pub use ast::CodeBlock;
pub use context::{CompileContext, UnitKind};
pub use lexer::{tokenize, Lexer};
pub use parser::Parser;
pub use preprocess::preprocess;
pub use token::{Token, TokenKind};
