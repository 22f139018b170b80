//! Text preparation ahead of lexing
//!
//! Comments are stripped, then directive lines are consumed. Directives fill
//! in the unit's module, aliases and kind, and drive conditional inclusion.
//! Defined names only matter to `#ifdef`/`#ifndef`; their values are never
//! substituted into the text.

use std::collections::HashMap;

use log::{debug, warn};

use crate::frontend::context::{CompileContext, UnitKind};

/// Remove `//` line comments and `/* */` block comments. Line breaks
/// inside block comments are kept so line numbers stay meaningful.
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('/', Some('/')) => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut last = '\0';
                for inner in chars.by_ref() {
                    if last == '*' && inner == '/' {
                        break;
                    }
                    if inner == '\n' {
                        out.push('\n');
                    }
                    last = inner;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Prepare `source` for the lexer, updating `ctx` from its directives
pub fn preprocess(source: &str, ctx: &mut CompileContext) -> String {
    let mut defines: HashMap<String, String> = HashMap::new();
    // one entry per open `#if*`: whether its branch is being kept
    let mut branches: Vec<bool> = Vec::new();
    let mut lines = Vec::new();

    let stripped = strip_comments(source);
    for line in stripped.lines() {
        let line = line.trim();
        let active = branches.iter().all(|&keep| keep);

        let Some(directive) = line.strip_prefix('#') else {
            if active {
                lines.push(line);
            }
            continue;
        };
        let (keyword, args) = directive.split_once(' ').unwrap_or((directive, ""));
        let keyword = keyword.to_ascii_lowercase();
        let mut args = args.split_whitespace();
        let first = args.next().unwrap_or_default();

        match keyword.as_str() {
            "ifdef" => branches.push(defines.contains_key(first)),
            "ifndef" => branches.push(!defines.contains_key(first)),
            "else" => match branches.last_mut() {
                Some(keep) => *keep = !*keep,
                None => warn!("#else without a matching #ifdef"),
            },
            "endif" => {
                if branches.pop().is_none() {
                    warn!("#endif without a matching #ifdef");
                }
            }
            _ if !active => {}
            "define" => {
                let value = args.collect::<Vec<_>>().join(" ");
                debug!("Define {} = {}", first, value);
                defines.insert(first.to_string(), value);
            }
            "undef" => {
                debug!("Undef {}", first);
                defines.remove(first);
            }
            "module" => ctx.current_module = first.to_string(),
            "type" => {
                ctx.kind = if first.eq_ignore_ascii_case("class") {
                    UnitKind::Class
                } else {
                    UnitKind::Program
                };
            }
            "use" => {
                let alias = match args.next() {
                    Some(alias) => alias,
                    None => first.rsplit('.').next().unwrap_or(first),
                };
                debug!("Use {} as {}", first, alias);
                ctx.module_alias_map.insert(alias.to_string(), first.to_string());
            }
            other => warn!("Unknown directive #{}", other),
        }
    }

    if !branches.is_empty() {
        warn!("{} conditional block(s) left open", branches.len());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_comments() {
        let source = "a = 1 // one\n/* two\nlines */b = a / 2\n";
        assert_eq!(strip_comments(source), "a = 1 \n\nb = a / 2\n");
    }

    #[test]
    fn test_module_use_and_type() {
        let mut ctx = CompileContext::new();
        let out = preprocess("#MODULE app.main\n#use sys.io\n#use lib.geometry geo\n#type class\n  x = 1  \n", &mut ctx);
        assert_eq!(out, "x = 1");
        assert_eq!(ctx.current_module, "app.main");
        assert_eq!(ctx.module_alias_map["io"], "sys.io");
        assert_eq!(ctx.module_alias_map["geo"], "lib.geometry");
        assert_eq!(ctx.kind, UnitKind::Class);
    }

    #[test]
    fn test_conditional_inclusion() {
        let mut ctx = CompileContext::new();
        let source = "#define DEBUG 1\n#ifdef DEBUG\na\n#ifndef DEBUG\nb\n#else\nc\n#endif\n#else\nd\n#endif\n#undef DEBUG\n#ifdef DEBUG\ne\n#endif\nf";
        assert_eq!(preprocess(source, &mut ctx), "a\nc\nf");
    }

    #[test]
    fn test_directives_in_skipped_branch_are_ignored() {
        let mut ctx = CompileContext::new();
        preprocess("#ifdef MISSING\n#module nope\n#endif\n", &mut ctx);
        assert_eq!(ctx.current_module, "");
    }

    #[test]
    fn test_defines_are_not_substituted() {
        let mut ctx = CompileContext::new();
        assert_eq!(preprocess("#define N 10\nx = N\n", &mut ctx), "x = N");
    }
}
