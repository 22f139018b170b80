//! Peephole optimizer for the emitted pseudo-assembly
//!
//! Passes rewrite the line list in place and report whether they changed
//! anything; the optimizer reruns them until nothing changes.

use log::debug;

use crate::backend::asm::{Assembly, Line, Mnemonic, Operand};

/// Optimization pass trait
pub trait PeepholePass {
    /// Name of the optimization pass
    fn name(&self) -> &'static str;

    /// Run the pass once over the whole listing
    fn run(&mut self, asm: &mut Assembly) -> bool;
}

/// The optimizer - runs optimization passes
pub struct Optimizer {
    passes: Vec<Box<dyn PeepholePass>>,
    max_iterations: usize,
}

impl Optimizer {
    pub fn new() -> Self {
        let mut opt = Self {
            passes: Vec::new(),
            max_iterations: 10,
        };
        opt.add_pass(Box::new(StackPairElimination));
        opt.add_pass(Box::new(CollapseReturns));
        opt.add_pass(Box::new(FallthroughJumps));
        opt
    }

    /// Add an optimization pass
    pub fn add_pass(&mut self, pass: Box<dyn PeepholePass>) {
        self.passes.push(pass);
    }

    /// Run all passes until none of them changes the listing
    pub fn optimize(&mut self, asm: &mut Assembly) {
        let before = asm.len();
        let mut changed = true;
        let mut iteration = 0;

        while changed && iteration < self.max_iterations {
            changed = false;
            for pass in &mut self.passes {
                if pass.run(asm) {
                    debug!("Pass {} changed the listing", pass.name());
                    changed = true;
                }
            }
            iteration += 1;
        }
        debug!("Optimized {} lines down to {} in {} rounds", before, asm.len(), iteration);
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop every line whose index is flagged in `remove`
fn retain_marked(asm: &mut Assembly, remove: &[bool]) -> bool {
    if !remove.contains(&true) {
        return false;
    }
    let mut flags = remove.iter();
    asm.lines_mut()
        .retain(|_| !flags.next().copied().unwrap_or(false));
    true
}

fn single_operand(line: &Line, op: Mnemonic) -> Option<&Operand> {
    match line {
        Line::Instr(m, operands) if *m == op && operands.len() == 1 => operands.first(),
        _ => None,
    }
}

// ==================== Stack pairs ====================

/// `PUSH0 x` directly followed by `POP0 x` restores what it saved
pub struct StackPairElimination;

impl PeepholePass for StackPairElimination {
    fn name(&self) -> &'static str {
        "stack-pairs"
    }

    fn run(&mut self, asm: &mut Assembly) -> bool {
        let lines = asm.lines();
        let mut remove = vec![false; lines.len()];
        let mut i = 0;
        while i + 1 < lines.len() {
            let pushed = single_operand(&lines[i], Mnemonic::Push0);
            let popped = single_operand(&lines[i + 1], Mnemonic::Pop0);
            if pushed.is_some() && pushed == popped {
                remove[i] = true;
                remove[i + 1] = true;
                i += 2;
            } else {
                i += 1;
            }
        }
        retain_marked(asm, &remove)
    }
}

// ==================== Returns ====================

/// Consecutive `RET`s collapse into one
pub struct CollapseReturns;

impl PeepholePass for CollapseReturns {
    fn name(&self) -> &'static str {
        "collapse-returns"
    }

    fn run(&mut self, asm: &mut Assembly) -> bool {
        let lines = asm.lines();
        let remove: Vec<bool> = (0..lines.len())
            .map(|i| {
                i > 0 && lines[i].mnemonic() == Some(Mnemonic::Ret) && lines[i - 1].mnemonic() == Some(Mnemonic::Ret)
            })
            .collect();
        retain_marked(asm, &remove)
    }
}

// ==================== Jumps ====================

/// A `JMP` landing on one of the labels right after it
pub struct FallthroughJumps;

impl PeepholePass for FallthroughJumps {
    fn name(&self) -> &'static str {
        "fallthrough-jumps"
    }

    fn run(&mut self, asm: &mut Assembly) -> bool {
        let lines = asm.lines();
        let remove: Vec<bool> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let Some(Operand::Name(target)) = single_operand(line, Mnemonic::Jmp) else {
                    return false;
                };
                lines[i + 1..]
                    .iter()
                    .map_while(|next| match next {
                        Line::Label(label) => Some(label),
                        Line::Instr(..) => None,
                    })
                    .any(|label| label == target)
            })
            .collect();
        retain_marked(asm, &remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn optimized(text: &str) -> String {
        let mut asm: Assembly = text.parse().unwrap();
        Optimizer::new().optimize(&mut asm);
        asm.to_string()
    }

    #[test]
    fn test_adjacent_stack_pairs_vanish() {
        let text = "MOV $f_arg1 a\nPUSH0 $f_arg1\nMOV $f_arg2 b\nPUSH0 $f_arg2\nPOP0 $f_arg2\nPOP0 $f_arg1\nCALL func_f";
        assert_eq!(
            optimized(text),
            "MOV $f_arg1 a\nPUSH0 $f_arg1\nMOV $f_arg2 b\nPOP0 $f_arg1\nCALL func_f"
        );
    }

    #[test]
    fn test_nested_pairs_need_another_round() {
        assert_eq!(optimized("PUSH0 a\nPUSH0 b\nPOP0 b\nPOP0 a"), "");
    }

    #[test]
    fn test_mismatched_pair_is_kept() {
        let text = "PUSH0 a\nPOP0 b";
        assert_eq!(optimized(text), text);
    }

    #[test]
    fn test_returns_collapse() {
        assert_eq!(optimized("func_f:\nMOV $f_return 1\nRET\nRET\nRET"), "func_f:\nMOV $f_return 1\nRET");
    }

    #[test]
    fn test_return_after_label_is_kept() {
        let text = "RET\nfunc_g:\nRET";
        assert_eq!(optimized(text), text);
    }

    #[test]
    fn test_fallthrough_jumps() {
        let text = "JE if_E0\nJMP if_T0\nif_T0:\nMOV x 1\nJMP if_O0\nif_E0:\nif_O0:\nMOV y x";
        assert_eq!(
            optimized(text),
            "JE if_E0\nif_T0:\nMOV x 1\nif_E0:\nif_O0:\nMOV y x"
        );
    }

    #[test]
    fn test_backward_jump_is_kept() {
        let text = "while_S0:\nCMP c 0\nJE while_L0\nJMP while_S0\nwhile_L0:";
        assert_eq!(optimized(text), text);
    }

    #[test]
    fn test_code_after_return_survives() {
        let text = "func_f:\nRET\nMOV x 1";
        assert_eq!(optimized(text), text);
    }
}
