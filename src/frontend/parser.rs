//! Parser for the Slarit language
//!
//! There is no grammar-driven descent here. The token list is turned into a
//! list of slots and reduced in place: each pass looks for the *first*
//! occurrence of its construct, splices the matched window down to one node,
//! and is repeated until it no longer matches before the next pass starts.
//! Precedence is therefore pass order, and operators of one tier associate
//! left to right by first match.
//!
//! Statements are handled the same way: function definitions, then `if`,
//! then `while` are hoisted out of a flat token run, and whatever remains is
//! split on end-of-line markers into expressions.

use log::{debug, warn};

use crate::frontend::ast::*;
use crate::frontend::context::{split_typed, CompileContext, UnitKind, OPAQUE_TYPE};
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result};

use TokenKind::{At, Comma, Eol, Identifier, LeftBracket, LeftSection, Not, Number, RightBracket, RightSection};

/// Words that look like calls but introduce statements
const KEYWORDS: [&str; 2] = ["if", "while"];

/// Binary operator passes, in precedence order (assignment and store come last)
const BINARY_PASSES: [Operator; 11] = [
    Operator::Mul,
    Operator::Div,
    Operator::Add,
    Operator::Sub,
    Operator::Gte,
    Operator::Lte,
    Operator::Gt,
    Operator::Lt,
    Operator::Eq,
    Operator::And,
    Operator::Or,
];

/// One position of the sequence under reduction
#[derive(Debug, Clone)]
pub enum Slot {
    /// A token nothing has consumed yet
    Raw(Token),
    Expr(Expr),
    Stmt(Stmt),
}

impl Slot {
    pub fn token(&self) -> Option<&Token> {
        match self {
            Slot::Raw(token) => Some(token),
            _ => None,
        }
    }

    fn is_word(&self, word: &str) -> bool {
        self.token().is_some_and(|t| t.is_word(word))
    }

    fn is_operator(&self, op: &str) -> bool {
        self.token().is_some_and(|t| t.is_operator(op))
    }
}

impl From<Token> for Slot {
    fn from(token: Token) -> Self {
        Slot::Raw(token)
    }
}

/// Anything bracket matching can run over
pub trait Lexeme {
    fn token_kind(&self) -> Option<TokenKind>;

    fn is(&self, kind: TokenKind) -> bool {
        self.token_kind() == Some(kind)
    }
}

impl Lexeme for Token {
    fn token_kind(&self) -> Option<TokenKind> {
        Some(self.kind)
    }
}

impl Lexeme for Slot {
    fn token_kind(&self) -> Option<TokenKind> {
        self.token().map(|t| t.kind)
    }
}

/// Index of the `close` that balances an already consumed `open`.
/// `seq` starts right after the opening bracket.
pub fn find_next_pair<T: Lexeme>(seq: &[T], open: TokenKind, close: TokenKind) -> Option<usize> {
    let mut depth = 0usize;
    for (i, item) in seq.iter().enumerate() {
        if item.is(open) {
            depth += 1;
        } else if item.is(close) {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
    }
    None
}

/// Drain `seq[open..=close]` and return what lay between the two brackets
fn drain_group(seq: &mut Vec<Slot>, open: usize, close: usize) -> Vec<Slot> {
    let mut inner: Vec<Slot> = seq.drain(open..=close).collect();
    inner.pop();
    inner.remove(0);
    inner
}

fn immediate(lexeme: &str) -> Result<Expr> {
    lexeme
        .parse()
        .map(|value| Expr::Immediate(ImmediateValue::new(value)))
        .map_err(|_| Error::InvalidNumber {
            lexeme: lexeme.to_string(),
        })
}

fn is_keyword(slot: &Slot) -> bool {
    KEYWORDS.iter().any(|k| slot.is_word(k))
}

fn unbalanced(open: &'static str, context: &str) -> Error {
    Error::UnbalancedBracket {
        open,
        context: context.to_string(),
    }
}

/// Reducing parser; every node it builds is annotated through `ctx`
pub struct Parser<'ctx> {
    ctx: &'ctx mut CompileContext,
}

impl<'ctx> Parser<'ctx> {
    pub fn new(ctx: &'ctx mut CompileContext) -> Self {
        Self { ctx }
    }

    /// Parse a whole unit
    pub fn parse_program(&mut self, tokens: Vec<Token>) -> Result<CodeBlock> {
        self.parse_block(tokens.into_iter().map(Slot::from).collect())
    }

    /// Reduce a token run holding a single expression
    pub fn parse_expression(&mut self, tokens: Vec<Token>) -> Result<Option<Expr>> {
        self.handle_evaluable(tokens.into_iter().map(Slot::from).collect())
    }

    // ==================== Expressions ====================

    /// Reduce `seq` to one expression. `None` means there was nothing to
    /// reduce, which callers treat as an empty span.
    pub fn handle_evaluable(&mut self, seq: Vec<Slot>) -> Result<Option<Expr>> {
        let mut seq: Vec<Slot> = seq.into_iter().filter(|s| !s.is(Eol)).collect();
        if seq.is_empty() {
            return Ok(None);
        }

        while self.reduce_immediate(&mut seq)? {}
        while self.reduce_variable(&mut seq)? {}
        while self.reduce_call(&mut seq)? {}
        while self.reduce_group(&mut seq)? {}
        while self.reduce_infix(&mut seq, Operator::Dot.symbol(), BiVarCalculation::member)? {}
        while self.reduce_prefix(&mut seq, At, Operator::Deref)? {}
        while self.reduce_prefix(&mut seq, Not, Operator::Not)? {}
        for op in BINARY_PASSES {
            while self.reduce_infix(&mut seq, op.symbol(), |l, r, ctx| {
                Ok(Expr::BiVar(Box::new(BiVarCalculation::new(op, l, r, ctx))))
            })? {}
        }
        while self.reduce_infix(&mut seq, "=", |l, r, ctx| {
            AssignOperation::new(l, r, ctx).map(|a| Expr::Assign(Box::new(a)))
        })? {}
        while self.reduce_infix(&mut seq, Operator::Store.symbol(), |l, r, ctx| {
            Ok(Expr::BiVar(Box::new(BiVarCalculation::new(Operator::Store, l, r, ctx))))
        })? {}

        if seq.len() > 1 {
            warn!("Expression did not reduce to one node ({} parts left), keeping the first", seq.len());
        }
        Ok(seq.into_iter().find_map(|s| match s {
            Slot::Expr(expr) => Some(expr),
            _ => None,
        }))
    }

    fn reduce_immediate(&mut self, seq: &mut [Slot]) -> Result<bool> {
        let Some(i) = seq.iter().position(|s| s.is(Number)) else {
            return Ok(false);
        };
        let Some(token) = seq[i].token() else {
            return Ok(false);
        };
        seq[i] = Slot::Expr(immediate(&token.lexeme)?);
        Ok(true)
    }

    /// Identifiers not followed by `(`
    fn reduce_variable(&mut self, seq: &mut [Slot]) -> Result<bool> {
        let found = (0..seq.len()).find(|&i| {
            seq[i].is(Identifier) && !seq.get(i + 1).is_some_and(|next| next.is(LeftBracket))
        });
        let Some(lexeme) = found.and_then(|i| seq[i].token()).map(|t| t.lexeme.clone()) else {
            return Ok(false);
        };
        let variable = Variable::new(&lexeme, self.ctx)?;
        if let Some(i) = found {
            seq[i] = Slot::Expr(Expr::Variable(variable));
        }
        Ok(true)
    }

    /// `name(arg, arg, ...)`; a leading `$` marks a native call
    fn reduce_call(&mut self, seq: &mut Vec<Slot>) -> Result<bool> {
        let found = (0..seq.len().saturating_sub(1))
            .find(|&i| seq[i].is(Identifier) && !is_keyword(&seq[i]) && seq[i + 1].is(LeftBracket));
        let Some(i) = found else {
            return Ok(false);
        };
        let name = seq[i].token().map(|t| t.lexeme.clone()).unwrap_or_default();
        let close = find_next_pair(&seq[i + 2..], LeftBracket, RightBracket)
            .map(|pair| i + 2 + pair)
            .ok_or_else(|| unbalanced("(", &name))?;

        let inner = drain_group(seq, i + 1, close);
        let args = self.arguments(inner)?;
        seq[i] = Slot::Expr(Expr::Call(FunctionCall::new(&name, args, self.ctx)));
        Ok(true)
    }

    /// Split on top-level commas and reduce every argument. Line breaks
    /// inside the list are ignored; empty arguments are dropped.
    fn arguments(&mut self, inner: Vec<Slot>) -> Result<Vec<Expr>> {
        let mut groups = Vec::new();
        let mut current = Vec::new();
        let mut depth = 0usize;
        for slot in inner {
            if slot.is(Eol) {
                continue;
            }
            if slot.is(LeftBracket) {
                depth += 1;
            } else if slot.is(RightBracket) {
                depth = depth.saturating_sub(1);
            }
            if slot.is(Comma) && depth == 0 {
                groups.push(std::mem::take(&mut current));
            } else {
                current.push(slot);
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }

        groups
            .into_iter()
            .map(|group| self.handle_evaluable(group))
            .filter_map(Result::transpose)
            .collect()
    }

    /// `( ... )` left after call extraction
    fn reduce_group(&mut self, seq: &mut Vec<Slot>) -> Result<bool> {
        let Some(i) = seq.iter().position(|s| s.is(LeftBracket)) else {
            return Ok(false);
        };
        let close = find_next_pair(&seq[i + 1..], LeftBracket, RightBracket)
            .map(|pair| i + 1 + pair)
            .ok_or_else(|| unbalanced("(", "expression"))?;

        let inner = drain_group(seq, i, close);
        let expr = self
            .handle_evaluable(inner)?
            .ok_or_else(|| Error::MissingOperand { op: "()".to_string() })?;
        seq.insert(i, Slot::Expr(expr));
        Ok(true)
    }

    /// `@x`, `!x`
    fn reduce_prefix(&mut self, seq: &mut Vec<Slot>, kind: TokenKind, op: Operator) -> Result<bool> {
        let Some(i) = seq.iter().position(|s| s.is(kind)) else {
            return Ok(false);
        };
        if i + 1 >= seq.len() {
            return Err(Error::MissingOperand { op: op.to_string() });
        }
        let operand = self.operand(seq.remove(i + 1), op.symbol())?;
        seq[i] = Slot::Expr(Expr::BiVar(Box::new(BiVarCalculation::new(
            op,
            operand,
            Expr::Null,
            self.ctx,
        ))));
        Ok(true)
    }

    /// Replace `left <symbol> right` by whatever `build` makes of it
    fn reduce_infix<F>(&mut self, seq: &mut Vec<Slot>, symbol: &str, build: F) -> Result<bool>
    where
        F: FnOnce(Expr, Expr, &mut CompileContext) -> Result<Expr>,
    {
        let Some(i) = seq.iter().position(|s| s.is_operator(symbol)) else {
            return Ok(false);
        };
        if i == 0 || i + 1 >= seq.len() {
            return Err(Error::MissingOperand {
                op: symbol.to_string(),
            });
        }

        let mut window = seq.drain(i - 1..=i + 1);
        let (Some(left), Some(_), Some(right)) = (window.next(), window.next(), window.next()) else {
            return Err(Error::MissingOperand {
                op: symbol.to_string(),
            });
        };
        drop(window);

        let left = self.operand(left, symbol)?;
        let right = self.operand(right, symbol)?;
        let expr = build(left, right, &mut *self.ctx)?;
        seq.insert(i - 1, Slot::Expr(expr));
        Ok(true)
    }

    /// Coerce a neighbour of an operator into an expression
    fn operand(&mut self, slot: Slot, op: &str) -> Result<Expr> {
        match slot {
            Slot::Expr(expr) => Ok(expr),
            Slot::Raw(token) if token.is(Identifier) => {
                Ok(Expr::Variable(Variable::new(&token.lexeme, self.ctx)?))
            }
            Slot::Raw(token) if token.is(Number) => immediate(&token.lexeme),
            _ => Err(Error::MissingOperand { op: op.to_string() }),
        }
    }

    // ==================== Statements ====================

    /// Hoist definitions, `if`s and `while`s, then split the rest on
    /// end-of-line markers.
    pub fn parse_block(&mut self, mut seq: Vec<Slot>) -> Result<CodeBlock> {
        self.hoist_definitions(&mut seq)?;
        while self.reduce_if(&mut seq)? {}
        while self.reduce_while(&mut seq)? {}

        let mut content = Vec::new();
        let mut segment = Vec::new();
        for slot in seq {
            match slot {
                Slot::Stmt(stmt) => {
                    self.flush_segment(&mut segment, &mut content)?;
                    content.push(Some(stmt));
                }
                slot if slot.is(Eol) => self.flush_segment(&mut segment, &mut content)?,
                slot => segment.push(slot),
            }
        }
        self.flush_segment(&mut segment, &mut content)?;
        Ok(CodeBlock::new(content))
    }

    fn flush_segment(&mut self, segment: &mut Vec<Slot>, content: &mut Vec<Option<Stmt>>) -> Result<()> {
        if segment.is_empty() {
            return Ok(());
        }
        let expr = self.handle_evaluable(std::mem::take(segment))?;
        content.push(expr.map(Stmt::Expr));
        Ok(())
    }

    fn hoist_definitions(&mut self, seq: &mut Vec<Slot>) -> Result<()> {
        while self.reduce_function_define(seq)? {}
        Ok(())
    }

    /// `name(args) { body }`; an identifier and bracket pair not followed
    /// by `{` is a call and is left alone.
    fn reduce_function_define(&mut self, seq: &mut Vec<Slot>) -> Result<bool> {
        let mut i = 0;
        while i + 1 < seq.len() {
            if !seq[i].is(Identifier) || is_keyword(&seq[i]) || !seq[i + 1].is(LeftBracket) {
                i += 1;
                continue;
            }
            let origin = seq[i].token().map(|t| t.lexeme.clone()).unwrap_or_default();
            let close = find_next_pair(&seq[i + 2..], LeftBracket, RightBracket)
                .map(|pair| i + 2 + pair)
                .ok_or_else(|| unbalanced("(", &origin))?;
            if !seq.get(close + 1).is_some_and(|s| s.is(LeftSection)) {
                i += 1;
                continue;
            }
            let body_close = find_next_pair(&seq[close + 2..], LeftSection, RightSection)
                .map(|pair| close + 2 + pair)
                .ok_or_else(|| unbalanced("{", &origin))?;

            let body = drain_group(seq, close + 1, body_close);
            let args = drain_group(seq, i + 1, close);
            let function = self.build_function(&origin, args, body)?;
            seq[i] = Slot::Stmt(Stmt::Function(function));
            return Ok(true);
        }
        Ok(false)
    }

    fn build_function(&mut self, origin: &str, args: Vec<Slot>, body: Vec<Slot>) -> Result<FunctionDefineStatement> {
        let (name, ret_type) = split_typed(origin);
        let ret_type = if ret_type.is_empty() { OPAQUE_TYPE } else { ret_type };

        if self.ctx.kind == UnitKind::Class
            && self.ctx.current_class.is_none()
            && self.ctx.current_function.is_empty()
        {
            return self.build_class(name, ret_type, body);
        }

        let label = match &self.ctx.current_class {
            Some(class) if self.ctx.current_function.is_empty() => {
                self.ctx.function_def_label(&format!("{class}_{name}"))
            }
            _ => self.ctx.function_def_label(name),
        };
        self.ctx
            .function_class_list
            .insert(label.clone(), ret_type.to_string());

        let previous = std::mem::replace(&mut self.ctx.current_function, label.clone());
        self.ctx.open_scope(&label);
        let built = self.function_body(&label, args, body);
        self.ctx.current_function = previous;
        let (args, body) = built?;

        debug!("Function {} parsed as {}", name, label);
        Ok(FunctionDefineStatement {
            origin_name: name.to_string(),
            function_name: label,
            ty: ret_type.to_string(),
            args,
            body,
        })
    }

    fn function_body(&mut self, label: &str, args: Vec<Slot>, mut body: Vec<Slot>) -> Result<(Vec<Variable>, CodeBlock)> {
        let args = self.parameters(label, args)?;
        self.hoist_definitions(&mut body)?;
        self.declare_locals(&body)?;
        while self.reduce_return(label, &mut body)? {}
        let body = self.parse_block(body)?;
        Ok((args, body))
    }

    /// A class in a class unit: only its methods are kept; its fields were
    /// declared before parsing started.
    fn build_class(&mut self, name: &str, parent: &str, mut body: Vec<Slot>) -> Result<FunctionDefineStatement> {
        let previous = self.ctx.current_class.replace(name.to_string());
        let hoisted = self.hoist_definitions(&mut body);
        self.ctx.current_class = previous;
        hoisted?;

        let methods = body
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Stmt(stmt @ Stmt::Function(_)) => Some(Some(stmt)),
                _ => None,
            })
            .collect();
        Ok(FunctionDefineStatement {
            origin_name: name.to_string(),
            function_name: self.ctx.function_def_label(name),
            ty: parent.to_string(),
            args: Vec::new(),
            body: CodeBlock::new(methods),
        })
    }

    fn parameters(&mut self, function: &str, args: Vec<Slot>) -> Result<Vec<Variable>> {
        let mut params = Vec::new();
        for group in args.split(|s| s.is(Comma)) {
            let mut names = group.iter().filter(|s| !s.is(Eol));
            let Some(slot) = names.next() else {
                continue;
            };
            let single = names.next().is_none();
            match slot.token() {
                Some(token) if token.is(Identifier) && single => {
                    params.push(Variable::new(&token.lexeme, self.ctx)?);
                }
                _ => {
                    return Err(Error::MalformedDefinition {
                        name: function.to_string(),
                        reason: "parameters must be plain identifiers".to_string(),
                    })
                }
            }
        }
        Ok(params)
    }

    /// Record every `name:Type` the body mentions before anything is
    /// reduced, since hoisting reorders reduction.
    fn declare_locals(&mut self, seq: &[Slot]) -> Result<()> {
        for (i, slot) in seq.iter().enumerate() {
            let Some(token) = slot.token() else {
                continue;
            };
            let called = seq.get(i + 1).is_some_and(|s| s.is(LeftBracket));
            if token.is(Identifier) && token.lexeme.contains(':') && !called {
                Variable::new(&token.lexeme, self.ctx)?;
            }
        }
        Ok(())
    }

    /// `return expr` / `return! expr` up to the end of the line or block
    fn reduce_return(&mut self, function: &str, seq: &mut Vec<Slot>) -> Result<bool> {
        let Some(i) = seq
            .iter()
            .position(|s| s.is_word("return") || s.is_word("return!"))
        else {
            return Ok(false);
        };
        let deferred = seq[i].is_word("return!");
        let end = seq[i + 1..]
            .iter()
            .position(|s| s.is(Eol) || s.is(RightSection))
            .map_or(seq.len(), |p| i + 1 + p);

        let value: Vec<Slot> = seq.drain(i + 1..end).collect();
        let value = self
            .handle_evaluable(value)?
            .unwrap_or(Expr::Immediate(ImmediateValue::new(0)));
        seq[i] = Slot::Stmt(Stmt::Return(ReturnStatement {
            function_name: function.to_string(),
            value,
            deferred,
        }));
        Ok(true)
    }

    /// `if (cond) { ... }` with an optional `else { ... }`, possibly on a
    /// later line
    fn reduce_if(&mut self, seq: &mut Vec<Slot>) -> Result<bool> {
        let Some((i, close)) = self.find_header(seq, "if")? else {
            return Ok(false);
        };
        let body_close = self.block_end(seq, close, "if")?;

        let mut next = body_close + 1;
        while seq.get(next).is_some_and(|s| s.is(Eol)) {
            next += 1;
        }
        let mut otherwise = Vec::new();
        if seq.get(next).is_some_and(|s| s.is_word("else")) {
            let mut open = next + 1;
            while seq.get(open).is_some_and(|s| s.is(Eol)) {
                open += 1;
            }
            let else_close = self.block_end(seq, open - 1, "else")?;
            otherwise = drain_group(seq, open, else_close);
            seq.drain(body_close + 1..open);
        }

        let then = drain_group(seq, close + 1, body_close);
        let condition = drain_group(seq, i + 1, close);
        let condition = self.condition(condition, "if")?;
        let statement = IfStatement {
            condition,
            then: self.parse_block(then)?,
            otherwise: self.parse_block(otherwise)?,
        };
        seq[i] = Slot::Stmt(Stmt::If(statement));
        Ok(true)
    }

    fn reduce_while(&mut self, seq: &mut Vec<Slot>) -> Result<bool> {
        let Some((i, close)) = self.find_header(seq, "while")? else {
            return Ok(false);
        };
        let body_close = self.block_end(seq, close, "while")?;

        let body = drain_group(seq, close + 1, body_close);
        let condition = drain_group(seq, i + 1, close);
        let statement = WhileLoop {
            condition: self.condition(condition, "while")?,
            body: self.parse_block(body)?,
        };
        seq[i] = Slot::Stmt(Stmt::While(statement));
        Ok(true)
    }

    /// First `keyword (` and the index of its matching `)`
    fn find_header(&self, seq: &[Slot], keyword: &str) -> Result<Option<(usize, usize)>> {
        let found = (0..seq.len().saturating_sub(1))
            .find(|&i| seq[i].is_word(keyword) && seq[i + 1].is(LeftBracket));
        let Some(i) = found else {
            return Ok(None);
        };
        let close = find_next_pair(&seq[i + 2..], LeftBracket, RightBracket)
            .map(|pair| i + 2 + pair)
            .ok_or_else(|| unbalanced("(", keyword))?;
        Ok(Some((i, close)))
    }

    /// `seq[after + 1]` must open a block; returns the index closing it
    fn block_end(&self, seq: &[Slot], after: usize, keyword: &str) -> Result<usize> {
        if !seq.get(after + 1).is_some_and(|s| s.is(LeftSection)) {
            return Err(Error::MalformedDefinition {
                name: keyword.to_string(),
                reason: "expected '{'".to_string(),
            });
        }
        find_next_pair(&seq[after + 2..], LeftSection, RightSection)
            .map(|pair| after + 2 + pair)
            .ok_or_else(|| unbalanced("{", keyword))
    }

    fn condition(&mut self, seq: Vec<Slot>, keyword: &str) -> Result<Expr> {
        self.handle_evaluable(seq)?
            .ok_or_else(|| Error::MalformedDefinition {
                name: keyword.to_string(),
                reason: "empty condition".to_string(),
            })
    }
}
