//! Abstract Syntax Tree definitions for the Slarit language
//!
//! Nodes are built by the reducing parser. Constructors take the compile
//! context because building a node also annotates it: variables record or
//! look up their static type, calls pick up return types, member access
//! resolves field offsets and method links.

use std::fmt;

use crate::frontend::context::{split_typed, CompileContext, OPAQUE_TYPE};
use crate::types::resolve_class;
use crate::utils::{Error, Result};

/// Prefix marking a native (runtime provided) call
pub const NATIVE_SIGIL: char = '$';

/// An ordered list of statements; empty slots are placeholders
#[derive(Debug, Clone, Default)]
pub struct CodeBlock {
    pub content: Vec<Option<Stmt>>,
}

impl CodeBlock {
    pub fn new(content: Vec<Option<Stmt>>) -> Self {
        Self { content }
    }

    pub fn statements(&self) -> impl Iterator<Item = &Stmt> {
        self.content.iter().flatten()
    }
}

/// Statement
#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    If(IfStatement),
    While(WhileLoop),
    Function(FunctionDefineStatement),
    Return(ReturnStatement),
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub condition: Expr,
    pub then: CodeBlock,
    pub otherwise: CodeBlock,
}

#[derive(Debug, Clone)]
pub struct WhileLoop {
    pub condition: Expr,
    pub body: CodeBlock,
}

#[derive(Debug, Clone)]
pub struct FunctionDefineStatement {
    /// Name as written, without the type suffix
    pub origin_name: String,
    /// Mangled label the function is emitted under
    pub function_name: String,
    /// Declared return type (or parent class, for class definitions)
    pub ty: String,
    pub args: Vec<Variable>,
    pub body: CodeBlock,
}

#[derive(Debug, Clone)]
pub struct ReturnStatement {
    pub function_name: String,
    pub value: Expr,
    /// Materialize the value but leave the function running
    pub deferred: bool,
}

/// Expression (evaluable node)
#[derive(Debug, Clone)]
pub enum Expr {
    Assign(Box<AssignOperation>),
    BiVar(Box<BiVarCalculation>),
    Call(FunctionCall),
    Variable(Variable),
    Immediate(ImmediateValue),
    /// Inert placeholder
    Null,
}

impl Expr {
    /// Where the value lives once the node's code has run
    pub fn result_name(&self) -> String {
        match self {
            Expr::Assign(assign) => assign.left.result_name(),
            Expr::BiVar(calc) => calc.result_name(),
            Expr::Call(call) => call.result_name(),
            Expr::Variable(var) => var.result_name(),
            Expr::Immediate(imm) => imm.result_name(),
            Expr::Null => String::new(),
        }
    }

    /// Static type name
    pub fn ty(&self) -> &str {
        match self {
            Expr::Assign(assign) => &assign.left.ty,
            Expr::BiVar(calc) => &calc.ty,
            Expr::Call(call) => &call.ty,
            Expr::Variable(var) => &var.ty,
            Expr::Immediate(_) | Expr::Null => OPAQUE_TYPE,
        }
    }

    pub fn as_immediate(&self) -> Option<i64> {
        match self {
            Expr::Immediate(imm) => Some(imm.value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignOperation {
    pub left: Variable,
    pub right: Expr,
}

impl AssignOperation {
    /// `left = right`. An unannotated left side takes the right side's type.
    pub fn new(left: Expr, right: Expr, ctx: &mut CompileContext) -> Result<Self> {
        let Expr::Variable(mut left) = left else {
            return Err(Error::InvalidAssignTarget {
                target: describe(&left),
            });
        };
        if !left.annotated {
            left.ty = right.ty().to_string();
            ctx.record_local(&left.identifier, &left.ty);
        }
        Ok(Self { left, right })
    }
}

/// Operators of `BiVarCalculation`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
    And,
    Or,
    Not,
    Deref,
    Store,
    Dot,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::And => "&",
            Self::Or => "|",
            Self::Not => "!",
            Self::Deref => "@",
            Self::Store => "<-",
            Self::Dot => ".",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Eq | Self::Gte | Self::Lte)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Binary or unary operation; owns one temporary
#[derive(Debug, Clone)]
pub struct BiVarCalculation {
    pub op: Operator,
    pub left: Expr,
    /// `Expr::Null` for unary operators, the field offset for `Dot`
    pub right: Expr,
    pub temp: usize,
    pub ty: String,
}

impl BiVarCalculation {
    pub fn new(op: Operator, left: Expr, right: Expr, ctx: &mut CompileContext) -> Self {
        let ty = match op {
            Operator::Add | Operator::Sub | Operator::Deref => left.ty().to_string(),
            Operator::Store => right.ty().to_string(),
            _ => OPAQUE_TYPE.to_string(),
        };
        Self {
            op,
            left,
            right,
            temp: ctx.alloc_temp(),
            ty,
        }
    }

    /// `object.member`. A field yields its address, a method becomes a call
    /// receiving the object as its first argument.
    pub fn member(object: Expr, member: Expr, ctx: &mut CompileContext) -> Result<Expr> {
        // `a.b.c`: `a.b` is the address of `b`, the object is what it holds
        let object = match object {
            Expr::BiVar(calc) if calc.op == Operator::Dot => {
                Expr::BiVar(Box::new(Self::new(Operator::Deref, Expr::BiVar(calc), Expr::Null, ctx)))
            }
            other => other,
        };
        let class = resolve_class(object.ty(), ctx)?;
        match member {
            Expr::Variable(var) => {
                let Some(field) = class.fields.get(&var.identifier) else {
                    return Err(Error::UnknownMember {
                        class: class.full_name(),
                        member: var.identifier,
                    });
                };
                Ok(Expr::BiVar(Box::new(Self {
                    op: Operator::Dot,
                    left: object,
                    right: Expr::Immediate(ImmediateValue::new(field.offset as i64)),
                    temp: ctx.alloc_temp(),
                    ty: field.ty.clone(),
                })))
            }
            Expr::Call(call) if !call.native => {
                let Some(method) = class.methods.get(&call.name) else {
                    return Err(Error::UnknownMember {
                        class: class.full_name(),
                        member: call.name,
                    });
                };
                let mut args = Vec::with_capacity(call.args.len() + 1);
                args.push(object);
                args.extend(call.args);
                Ok(Expr::Call(FunctionCall {
                    name: method.identifier.clone(),
                    label: method.link.clone(),
                    args,
                    native: false,
                    ty: method.ret_type.clone(),
                }))
            }
            other => Err(Error::ExpectedMember {
                got: describe(&other),
            }),
        }
    }

    pub fn result_name(&self) -> String {
        format!("%tmp_{:x}", self.temp)
    }

    /// Whether the right operand is used inline instead of materialized
    pub fn inlines_right(&self) -> bool {
        match self.op {
            Operator::Dot => true,
            op if op.is_comparison() => self.right.as_immediate().is_some(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    /// Name as written, sigil stripped
    pub name: String,
    /// Label used for the call target and argument slots
    pub label: String,
    pub args: Vec<Expr>,
    pub native: bool,
    pub ty: String,
}

impl FunctionCall {
    pub fn new(name: &str, args: Vec<Expr>, ctx: &CompileContext) -> Self {
        match name.strip_prefix(NATIVE_SIGIL) {
            Some(native) => Self {
                name: native.to_string(),
                label: native.to_string(),
                args,
                native: true,
                ty: OPAQUE_TYPE.to_string(),
            },
            None => {
                let label = ctx.function_call_label(name);
                Self {
                    name: name.to_string(),
                    ty: ctx.return_type(&label),
                    label,
                    args,
                    native: false,
                }
            }
        }
    }

    pub fn arg_slot(&self, index: usize) -> String {
        format!("${}_arg{}", self.label, index)
    }

    pub fn result_name(&self) -> String {
        format!("${}_return", self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub identifier: String,
    pub ty: String,
    /// Written as `name:Type`
    pub annotated: bool,
}

impl Variable {
    /// Build from `name` or `name:Type`. An annotation is resolved now
    /// (unknown classes are fatal) and recorded in the function scope;
    /// otherwise the scope supplies the type.
    pub fn new(origin: &str, ctx: &mut CompileContext) -> Result<Self> {
        let (identifier, annotation) = split_typed(origin);
        if annotation.is_empty() {
            return Ok(Self {
                identifier: identifier.to_string(),
                ty: ctx.local_type(identifier),
                annotated: false,
            });
        }
        let ty = resolve_class(annotation, ctx)?.full_name();
        ctx.record_local(identifier, &ty);
        Ok(Self {
            identifier: identifier.to_string(),
            ty,
            annotated: true,
        })
    }

    pub fn result_name(&self) -> String {
        self.identifier.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmediateValue {
    pub value: i64,
}

impl ImmediateValue {
    pub fn new(value: i64) -> Self {
        Self { value }
    }

    pub fn result_name(&self) -> String {
        format!("@imm_{}", self.value)
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Variable(var) => var.identifier.clone(),
        Expr::Immediate(imm) => imm.value.to_string(),
        Expr::Call(call) => format!("{}(..)", call.name),
        Expr::BiVar(calc) => format!("({} expression)", calc.op),
        Expr::Assign(_) => "assignment".to_string(),
        Expr::Null => "nothing".to_string(),
    }
}
