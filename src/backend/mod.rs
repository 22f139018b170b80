//! Backend module - Pseudo-assembly generation

pub mod asm;
pub mod codegen;

pub use asm::{Assembly, Line, Mnemonic, Operand};
pub use codegen::{generate, CodeGen};
