//! Pseudo-assembly model
//!
//! The text form is what the assembler and runtime read: one instruction
//! per line, mnemonic first, operands separated by single spaces, and
//! labels written as `name:`.

use std::fmt;
use std::str::FromStr;

use crate::utils::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Mov,
    Del,
    Add,
    Sub,
    Mul,
    Div,
    Cmp,
    And,
    Or,
    Not,
    Ret,
    Call,
    Jmp,
    Push0,
    Pop0,
    Je,
    Jb,
    Jbe,
    Ja,
    Jae,
    Int,
    Out,
    In,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 23] = [
        Self::Mov,
        Self::Del,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Cmp,
        Self::And,
        Self::Or,
        Self::Not,
        Self::Ret,
        Self::Call,
        Self::Jmp,
        Self::Push0,
        Self::Pop0,
        Self::Je,
        Self::Jb,
        Self::Jbe,
        Self::Ja,
        Self::Jae,
        Self::Int,
        Self::Out,
        Self::In,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mov => "MOV",
            Self::Del => "DEL",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Cmp => "CMP",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Ret => "RET",
            Self::Call => "CALL",
            Self::Jmp => "JMP",
            Self::Push0 => "PUSH0",
            Self::Pop0 => "POP0",
            Self::Je => "JE",
            Self::Jb => "JB",
            Self::Jbe => "JBE",
            Self::Ja => "JA",
            Self::Jae => "JAE",
            Self::Int => "INT",
            Self::Out => "OUT",
            Self::In => "IN",
        }
    }

    /// Control never continues to the next line
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Ret | Self::Jmp)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mnemonic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidRecord(format!("unknown mnemonic {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Variable, slot, temporary or label
    Name(String),
    Int(i64),
}

impl From<String> for Operand {
    fn from(name: String) -> Self {
        Operand::Name(name)
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Name(name.to_string())
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Int(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Name(name) => f.write_str(name),
            Operand::Int(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Label(String),
    Instr(Mnemonic, Vec<Operand>),
}

impl Line {
    pub fn mnemonic(&self) -> Option<Mnemonic> {
        match self {
            Line::Instr(op, _) => Some(*op),
            Line::Label(_) => None,
        }
    }

    pub fn operands(&self) -> &[Operand] {
        match self {
            Line::Instr(_, operands) => operands,
            Line::Label(_) => &[],
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Label(name) => write!(f, "{name}:"),
            Line::Instr(op, operands) => {
                write!(f, "{op}")?;
                for operand in operands {
                    write!(f, " {operand}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Line {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(label) = s.strip_suffix(':') {
            return Ok(Line::Label(label.to_string()));
        }
        let mut parts = s.split_whitespace();
        let op = parts
            .next()
            .ok_or_else(|| Error::InvalidRecord("empty instruction".to_string()))?
            .parse()?;
        let operands = parts
            .map(|p| match p.parse::<i64>() {
                Ok(value) => Operand::Int(value),
                Err(_) => Operand::Name(p.to_string()),
            })
            .collect();
        Ok(Line::Instr(op, operands))
    }
}

/// The emission list shared by every node during code generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    lines: Vec<Line>,
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit<const N: usize>(&mut self, op: Mnemonic, operands: [Operand; N]) {
        self.lines.push(Line::Instr(op, operands.into()));
    }

    pub fn label(&mut self, name: impl Into<String>) {
        self.lines.push(Line::Label(name.into()));
    }

    /// Number of lines emitted so far; also the seed for unique labels
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut Vec<Line> {
        &mut self.lines
    }

    pub fn instruction_count(&self) -> usize {
        self.lines.iter().filter(|l| l.mnemonic().is_some()).count()
    }
}

impl FromIterator<Line> for Assembly {
    fn from_iter<T: IntoIterator<Item = Line>>(iter: T) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

impl FromStr for Assembly {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::parse::<Line>)
            .collect()
    }
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_lines() {
        let mut asm = Assembly::new();
        asm.label("func_main");
        asm.emit(Mnemonic::Mov, ["%tmp_a".into(), Operand::Int(-3)]);
        asm.emit(Mnemonic::Push0, ["$f_arg1".into()]);
        asm.emit(Mnemonic::Ret, []);
        assert_eq!(asm.to_string(), "func_main:\nMOV %tmp_a -3\nPUSH0 $f_arg1\nRET");
        assert_eq!(asm.instruction_count(), 3);
    }

    #[test]
    fn test_parse_text() {
        let text = "eval_1_T:\nCMP %tmp_1 0\nJAE eval_1_T\nINT native_print";
        let asm: Assembly = text.parse().unwrap();
        assert_eq!(asm.len(), 4);
        assert_eq!(
            asm.lines()[1],
            Line::Instr(Mnemonic::Cmp, vec!["%tmp_1".into(), Operand::Int(0)])
        );
        assert_eq!(asm.to_string(), text);
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert!("LOAD a b".parse::<Line>().is_err());
    }

    #[test]
    fn test_every_mnemonic_round_trips_its_spelling() {
        for m in Mnemonic::ALL {
            assert_eq!(m.as_str().parse::<Mnemonic>().unwrap(), m);
        }
    }
}
