//! Compilation driver
//!
//! Runs one unit through every stage: text preparation, lexing, class
//! declaration (class units only), parsing, code generation and the
//! peephole optimizer.

use log::{debug, info};

use crate::backend::{generate, Assembly};
use crate::frontend::{preprocess, tokenize, CodeBlock, CompileContext, Parser, UnitKind};
use crate::middle::Optimizer;
use crate::types::{collect_classes, declare_classes, extract_methods, ClassSummary};
use crate::utils::Result;

/// Everything a unit produced
#[derive(Debug)]
pub struct CompiledUnit {
    pub ast: CodeBlock,
    pub assembly: Assembly,
    /// Classes declared by a class unit, empty otherwise
    pub classes: Vec<ClassSummary>,
}

pub struct Compiler {
    /// Loaded class summaries, and with sharing on, every unit's state
    ctx: CompileContext,
    share_context: bool,
    optimize: bool,
}

impl Compiler {
    pub fn new(share_context: bool) -> Self {
        Self {
            ctx: CompileContext::new(),
            share_context,
            optimize: true,
        }
    }

    pub fn with_optimization(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Load class summary records so that every later unit can use them
    pub fn load_classes(&mut self, summaries: &str) -> Result<Vec<ClassSummary>> {
        let loaded = collect_classes(summaries, &mut self.ctx)?;
        info!("Loaded {} class summaries", loaded.len());
        Ok(loaded)
    }

    /// Compile one unit. Without sharing, the unit starts from a fresh
    /// context that only knows the loaded classes.
    pub fn compile(&mut self, source: &str) -> Result<CompiledUnit> {
        if self.share_context {
            self.ctx.begin_unit();
            compile_unit(source, &mut self.ctx, self.optimize)
        } else {
            let mut ctx = self.fresh_context();
            compile_unit(source, &mut ctx, self.optimize)
        }
    }

    fn fresh_context(&self) -> CompileContext {
        let mut ctx = CompileContext::new();
        ctx.classes_map = self.ctx.classes_map.clone();
        ctx.short_classes_map = self.ctx.short_classes_map.clone();
        ctx.ambiguous_short_names = self.ctx.ambiguous_short_names.clone();
        ctx
    }
}

/// Run every stage over `source` within `ctx`
pub fn compile_unit(source: &str, ctx: &mut CompileContext, optimize: bool) -> Result<CompiledUnit> {
    let text = preprocess(source, ctx);
    let tokens = tokenize(&text)?;
    debug!("Module '{}': {} tokens", ctx.current_module, tokens.len());

    let class_unit = ctx.kind == UnitKind::Class;
    let classes = if class_unit {
        declare_classes(&tokens, ctx)?
    } else {
        Vec::new()
    };

    let mut ast = Parser::new(ctx).parse_program(tokens)?;
    if class_unit {
        ast = extract_methods(ast);
    }

    let mut assembly = generate(&ast);
    if optimize {
        Optimizer::new().optimize(&mut assembly);
    }
    debug!("Emitted {} instructions", assembly.instruction_count());

    Ok(CompiledUnit {
        ast,
        assembly,
        classes,
    })
}
