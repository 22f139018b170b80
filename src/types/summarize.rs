//! Class declaration for class units
//!
//! In a class unit every top-level `Name:Parent() { ... }` is a class. Its
//! summary is built straight from the token stream before parsing, so that
//! method parameters such as `self:Name` and member access on them resolve
//! while the method bodies are reduced.

use log::debug;

use crate::frontend::ast::{CodeBlock, Stmt};
use crate::frontend::context::{split_typed, CompileContext, OPAQUE_TYPE};
use crate::frontend::parser::find_next_pair;
use crate::frontend::token::{Token, TokenKind};
use crate::types::class_summary::{merge_class, register_class, resolve_class, ClassSummary, MethodSummary, NO_PARENT};
use crate::utils::{Error, Result};

use TokenKind::{Comma, Eol, Identifier, LeftBracket, LeftSection, RightBracket, RightSection};

/// A `name(...) { ... }` span inside a token run
struct Definition<'t> {
    origin: &'t str,
    args: &'t [Token],
    body: &'t [Token],
    /// Index just past the closing `}`
    end: usize,
}

/// Match a definition starting at `tokens[i]`
fn definition_at(tokens: &[Token], i: usize) -> Result<Option<Definition<'_>>> {
    let (Some(name), Some(open)) = (tokens.get(i), tokens.get(i + 1)) else {
        return Ok(None);
    };
    if !name.is(Identifier) || !open.is(LeftBracket) {
        return Ok(None);
    }
    let unbalanced = |open: &'static str| Error::UnbalancedBracket {
        open,
        context: name.lexeme.clone(),
    };
    let close = find_next_pair(&tokens[i + 2..], LeftBracket, RightBracket)
        .map(|pair| i + 2 + pair)
        .ok_or_else(|| unbalanced("("))?;
    if !tokens.get(close + 1).is_some_and(|t| t.is(LeftSection)) {
        return Ok(None);
    }
    let body_close = find_next_pair(&tokens[close + 2..], LeftSection, RightSection)
        .map(|pair| close + 2 + pair)
        .ok_or_else(|| unbalanced("{"))?;
    Ok(Some(Definition {
        origin: &name.lexeme,
        args: &tokens[i + 2..close],
        body: &tokens[close + 2..body_close],
        end: body_close + 1,
    }))
}

fn type_or_opaque(annotation: &str) -> &str {
    if annotation.is_empty() {
        OPAQUE_TYPE
    } else {
        annotation
    }
}

/// Declare every class defined at the top level of `tokens` and register
/// it in `ctx`. Parents must already be known.
pub fn declare_classes(tokens: &[Token], ctx: &mut CompileContext) -> Result<Vec<ClassSummary>> {
    let mut declared = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < tokens.len() {
        if depth == 0 {
            if let Some(def) = definition_at(tokens, i)? {
                declared.push(declare_class(&def, ctx)?);
                i = def.end;
                continue;
            }
        }
        if tokens[i].is(LeftSection) {
            depth += 1;
        } else if tokens[i].is(RightSection) {
            depth = depth.saturating_sub(1);
        }
        i += 1;
    }
    Ok(declared)
}

fn declare_class(def: &Definition<'_>, ctx: &mut CompileContext) -> Result<ClassSummary> {
    let (name, parent) = split_typed(def.origin);
    let mut class = ClassSummary::new(&ctx.current_module, name);
    let own_name = class.full_name();

    let body = def.body;
    let mut i = 0;
    while i < body.len() {
        if let Some(method) = definition_at(body, i)? {
            let (method_name, ret_type) = split_typed(method.origin);
            let args_type = method
                .args
                .split(|t| t.is(Comma))
                .filter_map(|group| group.iter().find(|t| t.is(Identifier)))
                .map(|arg| type_or_opaque(split_typed(&arg.lexeme).1).to_string())
                .collect();
            class.methods.insert(
                method_name.to_string(),
                MethodSummary {
                    identifier: method_name.to_string(),
                    link: ctx.function_def_label(&format!("{name}_{method_name}")),
                    ret_type: type_or_opaque(ret_type).to_string(),
                    args_type,
                },
            );
            i = method.end;
            continue;
        }

        // A field is an identifier alone on its line
        let alone = (i == 0 || body[i - 1].is(Eol)) && body.get(i + 1).map_or(true, |t| t.is(Eol));
        if body[i].is(Identifier) && alone {
            let (field, annotation) = split_typed(&body[i].lexeme);
            let ty = match annotation {
                "" => OPAQUE_TYPE.to_string(),
                same if same == name || same == own_name => own_name.clone(),
                other => resolve_class(other, ctx)?.full_name(),
            };
            class.add_field(field, &ty);
        }
        i += 1;
    }

    let parent = type_or_opaque(parent);
    if parent != NO_PARENT {
        let resolved = resolve_class(parent, ctx)?;
        class = merge_class(class, &resolved);
    }

    debug!("Class {} declared with {} fields", own_name, class.fields.len());
    register_class(class.clone(), ctx);
    Ok(class)
}

/// Replace the class definitions of a parsed class unit by their methods
pub fn extract_methods(block: CodeBlock) -> CodeBlock {
    let methods = block
        .content
        .into_iter()
        .flatten()
        .flat_map(|stmt| match stmt {
            Stmt::Function(class) => class.body.content,
            _ => Vec::new(),
        })
        .collect();
    CodeBlock::new(methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::context::UnitKind;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::Parser;
    use pretty_assertions::assert_eq;

    const SHAPES: &str = "Shape() {\nx\narea(self:Shape) {\nreturn 0\n}\n}\n\
                          Square:Shape() {\nside\nnext:Square\narea:Int(self:Square) {\nreturn @self.side\n}\n}\n";

    fn class_unit(module: &str) -> CompileContext {
        let mut ctx = CompileContext::new();
        ctx.current_module = module.to_string();
        ctx.kind = UnitKind::Class;
        ctx
    }

    #[test]
    fn test_declare_fields_and_methods() {
        let mut ctx = class_unit("geo");
        let tokens = tokenize(SHAPES).unwrap();
        let classes = declare_classes(&tokens, &mut ctx).unwrap();
        assert_eq!(classes.len(), 2);

        let shape = &classes[0];
        assert_eq!(shape.full_name(), "geo::Shape");
        assert_eq!(shape.size, 1);
        assert_eq!(shape.methods["area"].link, "geo_Shape_area");
        assert_eq!(shape.methods["area"].args_type, vec!["Shape".to_string()]);

        let square = &classes[1];
        assert_eq!(square.parent, "geo::Shape");
        assert_eq!(square.fields["x"].offset, 0);
        assert_eq!(square.fields["side"].offset, 1);
        assert_eq!(square.fields["next"].offset, 2);
        assert_eq!(square.fields["next"].ty, "geo::Square");
        assert_eq!(square.size, 3);
        assert_eq!(square.methods["area"].link, "geo_Square_area");
        assert_eq!(square.methods["area"].ret_type, "Int");

        assert!(ctx.classes_map.contains_key("geo::Square"));
    }

    #[test]
    fn test_unknown_parent_is_fatal() {
        let mut ctx = class_unit("");
        let tokens = tokenize("Child:Missing() {\na\n}\n").unwrap();
        let err = declare_classes(&tokens, &mut ctx).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_methods_are_extracted_after_parsing() {
        let mut ctx = class_unit("geo");
        let tokens = tokenize(SHAPES).unwrap();
        declare_classes(&tokens, &mut ctx).unwrap();
        let block = Parser::new(&mut ctx).parse_program(tokens).unwrap();
        let methods = extract_methods(block);

        let labels: Vec<_> = methods
            .statements()
            .map(|stmt| match stmt {
                Stmt::Function(f) => f.function_name.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(labels, vec!["geo_Shape_area", "geo_Square_area"]);
    }
}
