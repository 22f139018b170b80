//! Code generation - AST to pseudo-assembly
//!
//! Every node knows how to emit itself and how to release what it
//! introduced. Release composes bottom-up: a node releases its children
//! through their own `gen_del_asm` and then its own locations. Variables are
//! never released; immediates, temporaries and call slots are.

use crate::backend::asm::{Assembly, Mnemonic, Operand};
use crate::frontend::ast::*;

use Mnemonic::*;

/// Node-level code generation
pub trait CodeGen {
    /// Emit the instructions computing this node
    fn gen_asm(&self, asm: &mut Assembly);

    /// Emit the instructions releasing what this node introduced
    fn gen_del_asm(&self, asm: &mut Assembly);
}

/// Lower a whole unit
pub fn generate(block: &CodeBlock) -> Assembly {
    let mut asm = Assembly::new();
    block.gen_asm(&mut asm);
    asm
}

fn value(expr: &Expr) -> Operand {
    Operand::Name(expr.result_name())
}

impl CodeGen for CodeBlock {
    /// Each statement is released as soon as it completes
    fn gen_asm(&self, asm: &mut Assembly) {
        for stmt in self.statements() {
            stmt.gen_asm(asm);
            stmt.gen_del_asm(asm);
        }
    }

    fn gen_del_asm(&self, _asm: &mut Assembly) {}
}

impl CodeGen for Stmt {
    fn gen_asm(&self, asm: &mut Assembly) {
        match self {
            Stmt::Expr(expr) => expr.gen_asm(asm),
            Stmt::If(stmt) => stmt.gen_asm(asm),
            Stmt::While(stmt) => stmt.gen_asm(asm),
            Stmt::Function(stmt) => stmt.gen_asm(asm),
            Stmt::Return(stmt) => stmt.gen_asm(asm),
        }
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        match self {
            Stmt::Expr(expr) => expr.gen_del_asm(asm),
            Stmt::If(stmt) => stmt.gen_del_asm(asm),
            Stmt::While(stmt) => stmt.gen_del_asm(asm),
            Stmt::Function(stmt) => stmt.gen_del_asm(asm),
            Stmt::Return(stmt) => stmt.gen_del_asm(asm),
        }
    }
}

impl CodeGen for IfStatement {
    fn gen_asm(&self, asm: &mut Assembly) {
        let n = asm.len();
        let (then_tag, else_tag, end_tag) = (format!("if_T{n}"), format!("if_E{n}"), format!("if_O{n}"));

        self.condition.gen_asm(asm);
        asm.emit(Cmp, [value(&self.condition), Operand::Int(0)]);
        asm.emit(Je, [else_tag.as_str().into()]);
        asm.emit(Jmp, [then_tag.as_str().into()]);
        asm.label(then_tag);
        self.then.gen_asm(asm);
        asm.emit(Jmp, [end_tag.as_str().into()]);
        asm.label(else_tag);
        self.otherwise.gen_asm(asm);
        asm.label(end_tag);
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        self.condition.gen_del_asm(asm);
    }
}

impl CodeGen for WhileLoop {
    fn gen_asm(&self, asm: &mut Assembly) {
        let n = asm.len();
        let (start_tag, end_tag) = (format!("while_S{n}"), format!("while_L{n}"));

        asm.label(start_tag.as_str());
        self.condition.gen_asm(asm);
        asm.emit(Cmp, [value(&self.condition), Operand::Int(0)]);
        asm.emit(Je, [end_tag.as_str().into()]);
        self.body.gen_asm(asm);
        asm.emit(Jmp, [start_tag.into()]);
        asm.label(end_tag);
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        self.condition.gen_del_asm(asm);
    }
}

impl CodeGen for FunctionDefineStatement {
    fn gen_asm(&self, asm: &mut Assembly) {
        asm.label(format!("func_{}", self.function_name));
        for (i, arg) in self.args.iter().enumerate() {
            asm.emit(
                Mov,
                [arg.result_name().into(), format!("${}_arg{}", self.function_name, i + 1).into()],
            );
        }
        self.body.gen_asm(asm);
        // falling off the end returns too
        asm.emit(Ret, []);
    }

    fn gen_del_asm(&self, _asm: &mut Assembly) {}
}

impl CodeGen for ReturnStatement {
    fn gen_asm(&self, asm: &mut Assembly) {
        self.value.gen_asm(asm);
        asm.emit(
            Mov,
            [format!("${}_return", self.function_name).into(), value(&self.value)],
        );
        if !self.deferred {
            asm.emit(Ret, []);
        }
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        self.value.gen_del_asm(asm);
    }
}

impl CodeGen for Expr {
    fn gen_asm(&self, asm: &mut Assembly) {
        match self {
            Expr::Assign(assign) => assign.gen_asm(asm),
            Expr::BiVar(calc) => calc.gen_asm(asm),
            Expr::Call(call) => call.gen_asm(asm),
            Expr::Variable(var) => var.gen_asm(asm),
            Expr::Immediate(imm) => imm.gen_asm(asm),
            Expr::Null => {}
        }
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        match self {
            Expr::Assign(assign) => assign.gen_del_asm(asm),
            Expr::BiVar(calc) => calc.gen_del_asm(asm),
            Expr::Call(call) => call.gen_del_asm(asm),
            Expr::Variable(var) => var.gen_del_asm(asm),
            Expr::Immediate(imm) => imm.gen_del_asm(asm),
            Expr::Null => {}
        }
    }
}

impl CodeGen for AssignOperation {
    fn gen_asm(&self, asm: &mut Assembly) {
        let target = Operand::Name(self.left.result_name());
        match self.right.as_immediate() {
            Some(v) => asm.emit(Mov, [target, Operand::Int(v)]),
            None => {
                self.right.gen_asm(asm);
                asm.emit(Mov, [target, value(&self.right)]);
            }
        }
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        // an inlined immediate never got a slot
        if self.right.as_immediate().is_none() {
            self.right.gen_del_asm(asm);
        }
    }
}

impl BiVarCalculation {
    fn arithmetic(&self, asm: &mut Assembly, op: Mnemonic) {
        let tmp = self.result_name();
        self.left.gen_asm(asm);
        asm.emit(Mov, [tmp.as_str().into(), value(&self.left)]);
        self.right.gen_asm(asm);
        asm.emit(op, [tmp.into(), value(&self.right)]);
    }

    /// Leaves 1 or 0 in the temporary
    fn compare(&self, asm: &mut Assembly, jump: Mnemonic) {
        let tmp = self.result_name();
        let tag = |suffix: &str| format!("eval_{:x}_{}", self.temp, suffix);

        self.left.gen_asm(asm);
        asm.emit(Mov, [tmp.as_str().into(), value(&self.left)]);
        let rhs = match self.right.as_immediate() {
            Some(v) => Operand::Int(v),
            None => {
                self.right.gen_asm(asm);
                value(&self.right)
            }
        };
        asm.emit(Cmp, [tmp.as_str().into(), rhs]);
        asm.emit(jump, [tag("T").into()]);
        asm.emit(Jmp, [tag("F").into()]);
        asm.label(tag("T"));
        asm.emit(Mov, [tmp.as_str().into(), Operand::Int(1)]);
        asm.emit(Jmp, [tag("E").into()]);
        asm.label(tag("F"));
        asm.emit(Mov, [tmp.into(), Operand::Int(0)]);
        asm.label(tag("E"));
    }
}

impl CodeGen for BiVarCalculation {
    fn gen_asm(&self, asm: &mut Assembly) {
        let tmp = self.result_name();
        match self.op {
            Operator::Add => self.arithmetic(asm, Add),
            Operator::Sub => self.arithmetic(asm, Sub),
            Operator::Mul => self.arithmetic(asm, Mul),
            Operator::Div => self.arithmetic(asm, Div),
            Operator::And => self.arithmetic(asm, And),
            Operator::Or => self.arithmetic(asm, Or),
            Operator::Gt => self.compare(asm, Ja),
            Operator::Lt => self.compare(asm, Jb),
            Operator::Eq => self.compare(asm, Je),
            Operator::Gte => self.compare(asm, Jae),
            Operator::Lte => self.compare(asm, Jbe),
            Operator::Not => {
                self.left.gen_asm(asm);
                asm.emit(Mov, [tmp.as_str().into(), value(&self.left)]);
                asm.emit(Not, [tmp.into()]);
            }
            Operator::Deref => {
                self.left.gen_asm(asm);
                asm.emit(In, [tmp.into(), value(&self.left)]);
            }
            Operator::Store => {
                self.left.gen_asm(asm);
                self.right.gen_asm(asm);
                asm.emit(Mov, [tmp.as_str().into(), value(&self.right)]);
                asm.emit(Out, [value(&self.left), tmp.into()]);
            }
            Operator::Dot => {
                let offset = self.right.as_immediate().unwrap_or_default();
                self.left.gen_asm(asm);
                asm.emit(Mov, [tmp.as_str().into(), value(&self.left)]);
                asm.emit(Add, [tmp.into(), Operand::Int(offset)]);
            }
        }
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        self.left.gen_del_asm(asm);
        if !self.inlines_right() {
            self.right.gen_del_asm(asm);
        }
        asm.emit(Del, [self.result_name().into()]);
    }
}

impl CodeGen for FunctionCall {
    /// Arguments go to per-call-site slots in source order; each slot is
    /// pushed as it is filled and all are popped back before the call.
    fn gen_asm(&self, asm: &mut Assembly) {
        for (i, arg) in self.args.iter().enumerate() {
            let slot = self.arg_slot(i + 1);
            arg.gen_asm(asm);
            asm.emit(Mov, [slot.as_str().into(), value(arg)]);
            asm.emit(Push0, [slot.into()]);
        }
        for i in (1..=self.args.len()).rev() {
            asm.emit(Pop0, [self.arg_slot(i).into()]);
        }
        if self.native {
            asm.emit(Int, [format!("native_{}", self.name).into()]);
        } else {
            asm.emit(Call, [format!("func_{}", self.label).into()]);
        }
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        for (i, arg) in self.args.iter().enumerate() {
            arg.gen_del_asm(asm);
            asm.emit(Del, [self.arg_slot(i + 1).into()]);
        }
        asm.emit(Del, [self.result_name().into()]);
    }
}

impl CodeGen for Variable {
    fn gen_asm(&self, _asm: &mut Assembly) {}

    fn gen_del_asm(&self, _asm: &mut Assembly) {}
}

impl CodeGen for ImmediateValue {
    fn gen_asm(&self, asm: &mut Assembly) {
        asm.emit(Mov, [self.result_name().into(), Operand::Int(self.value)]);
    }

    fn gen_del_asm(&self, asm: &mut Assembly) {
        asm.emit(Del, [self.result_name().into()]);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::backend::asm::Line;
    use crate::frontend::context::CompileContext;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::Parser;
    use crate::types::collect_class;
    use pretty_assertions::assert_eq;

    /// Reference accumulator machine for the emitted text
    #[derive(Default)]
    struct Machine {
        memory: HashMap<String, i64>,
        heap: HashMap<i64, i64>,
        stack: Vec<i64>,
        calls: Vec<usize>,
        flag: Option<std::cmp::Ordering>,
        visited: HashSet<String>,
    }

    impl Machine {
        fn get(&self, operand: &Operand) -> i64 {
            match operand {
                Operand::Int(v) => *v,
                Operand::Name(name) => self.memory.get(name).copied().unwrap_or(0),
            }
        }

        fn name(operand: &Operand) -> String {
            operand.to_string()
        }

        fn run(&mut self, asm: &Assembly, entry: Option<&str>) {
            let lines = asm.lines();
            let labels: HashMap<String, usize> = lines
                .iter()
                .enumerate()
                .filter_map(|(i, l)| match l {
                    Line::Label(name) => Some((name.clone(), i)),
                    _ => None,
                })
                .collect();
            let mut pc = entry.map_or(0, |e| labels[e]);
            let mut steps = 0;

            while pc < lines.len() {
                steps += 1;
                assert!(steps < 10_000, "machine did not halt");
                let (op, args) = match &lines[pc] {
                    Line::Label(name) => {
                        self.visited.insert(name.clone());
                        pc += 1;
                        continue;
                    }
                    Line::Instr(op, args) => (*op, args),
                };
                pc += 1;
                let jump_to = |target: &Operand| labels[&target.to_string()];
                match op {
                    Mov => {
                        let v = self.get(&args[1]);
                        self.memory.insert(Self::name(&args[0]), v);
                    }
                    Add | Sub | Mul | Div | And | Or => {
                        let (a, b) = (self.get(&args[0]), self.get(&args[1]));
                        let v = match op {
                            Add => a + b,
                            Sub => a - b,
                            Mul => a * b,
                            Div => a / b,
                            And => a & b,
                            _ => a | b,
                        };
                        self.memory.insert(Self::name(&args[0]), v);
                    }
                    Not => {
                        let v = (self.get(&args[0]) == 0) as i64;
                        self.memory.insert(Self::name(&args[0]), v);
                    }
                    Cmp => self.flag = Some(self.get(&args[0]).cmp(&self.get(&args[1]))),
                    Jmp => pc = jump_to(&args[0]),
                    Je | Ja | Jb | Jae | Jbe => {
                        use std::cmp::Ordering::*;
                        let taken = match op {
                            Je => self.flag == Some(Equal),
                            Ja => self.flag == Some(Greater),
                            Jb => self.flag == Some(Less),
                            Jae => matches!(self.flag, Some(Greater | Equal)),
                            _ => matches!(self.flag, Some(Less | Equal)),
                        };
                        if taken {
                            pc = jump_to(&args[0]);
                        }
                    }
                    Del => {
                        self.memory.remove(&Self::name(&args[0]));
                    }
                    Push0 => {
                        let v = self.get(&args[0]);
                        self.stack.push(v);
                    }
                    Pop0 => {
                        let v = self.stack.pop().unwrap();
                        self.memory.insert(Self::name(&args[0]), v);
                    }
                    Call => {
                        self.calls.push(pc);
                        pc = jump_to(&args[0]);
                    }
                    Ret => match self.calls.pop() {
                        Some(back) => pc = back,
                        None => return,
                    },
                    In => {
                        let v = self.heap.get(&self.get(&args[1])).copied().unwrap_or(0);
                        self.memory.insert(Self::name(&args[0]), v);
                    }
                    Out => {
                        let (address, v) = (self.get(&args[0]), self.get(&args[1]));
                        self.heap.insert(address, v);
                    }
                    Int => {}
                }
            }
        }
    }

    fn compile(source: &str, ctx: &mut CompileContext) -> Assembly {
        let block = Parser::new(ctx).parse_program(tokenize(source).unwrap()).unwrap();
        generate(&block)
    }

    fn run(source: &str) -> Machine {
        let mut ctx = CompileContext::new();
        let asm = compile(source, &mut ctx);
        let mut machine = Machine::default();
        machine.run(&asm, None);
        machine
    }

    fn texts(asm: &Assembly) -> Vec<String> {
        asm.lines().iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_grouped_arithmetic() {
        let machine = run("x = (3 + 5) + 2 * 4\n");
        assert_eq!(machine.memory["x"], 16);
    }

    #[test]
    fn test_precedence_follows_pass_order() {
        assert_eq!(run("x = 1 + 2 * 3\n").memory["x"], 7);
        assert_eq!(run("x = 10 - 4 / 2\n").memory["x"], 8);
        assert_eq!(run("x = (10 - 4) / 2\n").memory["x"], 3);
    }

    #[test]
    fn test_temporaries_are_released() {
        let machine = run("a = 2\nx = (a + 5) * (a - 1)\n");
        assert_eq!(machine.memory["x"], 7);
        let mut left: Vec<_> = machine.memory.keys().cloned().collect();
        left.sort();
        assert_eq!(left, vec!["a".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_simple_expression_text() {
        let mut ctx = CompileContext::new();
        let asm = compile("x = a + 1\n", &mut ctx);
        assert_eq!(
            texts(&asm),
            vec![
                "MOV %tmp_1 a",
                "MOV @imm_1 1",
                "ADD %tmp_1 @imm_1",
                "MOV x %tmp_1",
                "DEL @imm_1",
                "DEL %tmp_1",
            ]
        );
    }

    #[test]
    fn test_comparison_inlines_immediate() {
        let mut ctx = CompileContext::new();
        let asm = compile("c = a >= 3\n", &mut ctx);
        let lines = texts(&asm);
        assert_eq!(lines[0], "MOV %tmp_1 a");
        assert_eq!(lines[1], "CMP %tmp_1 3");
        assert_eq!(lines[2], "JAE eval_1_T");
        assert!(!lines.iter().any(|l| l.contains("@imm_3")));
    }

    #[test]
    fn test_if_takes_exactly_one_branch() {
        let source = |a: i64| format!("a = {a}\nif (a > 1) {{\nb = 1\n}} else {{\nb = 2\n}}\n");

        let machine = run(&source(0));
        assert_eq!(machine.memory["b"], 2);
        assert!(!machine.visited.iter().any(|l| l.starts_with("if_T")));

        let machine = run(&source(5));
        assert_eq!(machine.memory["b"], 1);
        assert!(!machine.visited.iter().any(|l| l.starts_with("if_E")));
    }

    #[test]
    fn test_while_loop() {
        let machine = run("i = 0\ns = 0\nwhile (i < 5) {\ns = s + i\ni = i + 1\n}\n");
        assert_eq!(machine.memory["s"], 10);
        assert_eq!(machine.memory["i"], 5);
    }

    #[test]
    fn test_call_arguments_in_source_order() {
        let mut ctx = CompileContext::new();
        let lines = texts(&compile("f(a, b, c)\n", &mut ctx));
        let at = |needle: &str| lines.iter().position(|l| l == needle).unwrap();

        let (a, b, c) = (at("MOV $f_arg1 a"), at("MOV $f_arg2 b"), at("MOV $f_arg3 c"));
        assert!(a < b && b < c);
        assert!(at("CALL func_f") > c);
        assert!(at("POP0 $f_arg3") < at("POP0 $f_arg1"));
    }

    #[test]
    fn test_function_call_and_return() {
        let mut ctx = CompileContext::new();
        let asm = compile("add(a, b) {\nreturn a + b\n}\nmain() {\nx = add(2, 3)\n}\n", &mut ctx);
        let mut machine = Machine::default();
        machine.run(&asm, Some("func_main"));
        assert_eq!(machine.memory["x"], 5);
        assert!(!machine.memory.contains_key("$add_return"));
    }

    #[test]
    fn test_deferred_return_keeps_running() {
        let mut ctx = CompileContext::new();
        let lines = texts(&compile("f() {\nreturn! 1\nx = 2\n}\n", &mut ctx));
        assert_eq!(
            lines,
            vec![
                "func_f:",
                "MOV @imm_1 1",
                "MOV $f_return @imm_1",
                "DEL @imm_1",
                "MOV x 2",
                "RET",
            ]
        );
    }

    #[test]
    fn test_native_call() {
        let mut ctx = CompileContext::new();
        let lines = texts(&compile("$print(7)\n", &mut ctx));
        assert!(lines.contains(&"INT native_print".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("DEL $print_return"));
    }

    #[test]
    fn test_field_store_and_load() {
        let mut ctx = CompileContext::new();
        collect_class(
            "MODULE geo\nCLASS Point\nSIZE 2\nFIELD x 0 -\nFIELD y 1 -",
            &mut ctx,
        )
        .unwrap();
        let asm = compile("p:Point = base\np.y <- 7\nv = @p.y\n", &mut ctx);
        let mut machine = Machine::default();
        machine.memory.insert("base".to_string(), 100);
        machine.run(&asm, None);
        assert_eq!(machine.heap.get(&101), Some(&7));
        assert_eq!(machine.memory["v"], 7);
    }

    #[test]
    fn test_not_and_logic() {
        let machine = run("a = 0\nb = !a\nc = (a == 0) & b\n");
        assert_eq!(machine.memory["b"], 1);
        assert_eq!(machine.memory["c"], 1);
    }
}
