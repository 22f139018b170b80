//! Compile context threaded through parsing
//!
//! Holds the module identity, alias table, per-function local type scopes,
//! function return types and the two class lookup tables. One context is
//! created per compilation unit unless sharing is requested.

use std::collections::HashMap;

use crate::types::ClassSummary;

/// Type name used when nothing better is known
pub const OPAQUE_TYPE: &str = "-";

/// What a compilation unit produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitKind {
    /// Ordinary program code
    #[default]
    Program,
    /// Top-level definitions are classes; emits class summaries
    Class,
}

#[derive(Debug, Default)]
pub struct CompileContext {
    pub current_module: String,
    /// alias -> full module name
    pub module_alias_map: HashMap<String, String>,
    /// Function whose body is being reduced, empty at top level
    pub current_function: String,
    /// Class whose body is being reduced in a class unit
    pub current_class: Option<String>,
    /// function -> (variable -> type)
    pub function_scope_class_list: HashMap<String, HashMap<String, String>>,
    /// function label -> return type
    pub function_class_list: HashMap<String, String>,
    /// `module::Name` -> class
    pub classes_map: HashMap<String, ClassSummary>,
    /// last path segment -> class, ambiguous names removed
    pub short_classes_map: HashMap<String, ClassSummary>,
    /// Short names seen more than once; they stay out of `short_classes_map`
    pub ambiguous_short_names: Vec<String>,
    pub kind: UnitKind,
    next_temp: usize,
}

impl CompileContext {
    pub fn new() -> Self {
        Self {
            next_temp: 1,
            ..Default::default()
        }
    }

    /// Reset the per-unit state before compiling another file with a
    /// shared context. Class tables and aliases survive.
    pub fn begin_unit(&mut self) {
        self.function_scope_class_list.clear();
        self.current_function.clear();
        self.current_class = None;
        self.current_module.clear();
        self.kind = UnitKind::Program;
    }

    /// Allocate a fresh temporary index, unique within this context
    pub fn alloc_temp(&mut self) -> usize {
        let n = self.next_temp.max(1);
        self.next_temp = n + 1;
        n
    }

    /// Local type scope of the current function, created on first use
    pub fn scope_mut(&mut self) -> &mut HashMap<String, String> {
        self.function_scope_class_list
            .entry(self.current_function.clone())
            .or_default()
    }

    /// Start a fresh local scope for `function`
    pub fn open_scope(&mut self, function: &str) {
        self.function_scope_class_list
            .insert(function.to_string(), HashMap::new());
    }

    /// Type recorded for `variable` in the current function
    pub fn local_type(&self, variable: &str) -> String {
        self.function_scope_class_list
            .get(&self.current_function)
            .and_then(|scope| scope.get(variable))
            .cloned()
            .unwrap_or_else(|| OPAQUE_TYPE.to_string())
    }

    pub fn record_local(&mut self, variable: &str, ty: &str) {
        self.scope_mut().insert(variable.to_string(), ty.to_string());
    }

    /// Return type of the function with `label`
    pub fn return_type(&self, label: &str) -> String {
        self.function_class_list
            .get(label)
            .cloned()
            .unwrap_or_else(|| OPAQUE_TYPE.to_string())
    }

    /// `alias::Name` -> `full.module::Name`; other names pass through
    pub fn full_class_name(&self, class: &str) -> String {
        match class.split_once("::") {
            Some((module, rest)) => match self.module_alias_map.get(module) {
                Some(full) => format!("{full}::{rest}"),
                None => class.to_string(),
            },
            None => class.to_string(),
        }
    }

    /// Label of a function defined in this unit
    pub fn function_def_label(&self, name: &str) -> String {
        if self.current_module.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.current_module.replace('.', "_"), name)
        }
    }

    /// Label a call to `name` refers to. `alias::f` goes through the alias
    /// table; unqualified names target this unit's module.
    pub fn function_call_label(&self, name: &str) -> String {
        match name.split_once("::") {
            Some((module, rest)) => match self.module_alias_map.get(module) {
                Some(full) => format!("{}_{}", full.replace('.', "_"), rest),
                None => name.to_string(),
            },
            None => self.function_def_label(name),
        }
    }
}

/// Split `name:Type` into its name and (possibly empty) type
pub fn split_typed(origin: &str) -> (&str, &str) {
    origin.split_once(':').unwrap_or((origin, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_typed() {
        assert_eq!(split_typed("p:geo::Point"), ("p", "geo::Point"));
        assert_eq!(split_typed("count"), ("count", ""));
    }

    #[test]
    fn test_labels_follow_module() {
        let mut ctx = CompileContext::new();
        ctx.current_module = "app.util".to_string();
        ctx.module_alias_map
            .insert("io".to_string(), "sys.io".to_string());
        assert_eq!(ctx.function_def_label("sum"), "app_util_sum");
        assert_eq!(ctx.function_call_label("sum"), "app_util_sum");
        assert_eq!(ctx.function_call_label("io::print"), "sys_io_print");
        assert_eq!(ctx.function_call_label("zz::f"), "zz::f");
        assert_eq!(ctx.full_class_name("io::File"), "sys.io::File");
    }

    #[test]
    fn test_local_scope_defaults_to_opaque() {
        let mut ctx = CompileContext::new();
        ctx.current_function = "main".to_string();
        assert_eq!(ctx.local_type("x"), OPAQUE_TYPE);
        ctx.record_local("x", "geo::Point");
        assert_eq!(ctx.local_type("x"), "geo::Point");
        ctx.open_scope("main");
        assert_eq!(ctx.local_type("x"), OPAQUE_TYPE);
    }

    #[test]
    fn test_temps_are_unique_per_context() {
        let mut a = CompileContext::new();
        let mut b = CompileContext::new();
        assert_eq!(a.alloc_temp(), 1);
        assert_eq!(a.alloc_temp(), 2);
        assert_eq!(b.alloc_temp(), 1);
    }
}
