//! Class summaries and the single-inheritance layout resolver
//!
//! A class summary is the reloadable description of a class: its fields with
//! slot offsets, its methods with the labels implementing them, its size and
//! its parent. Summaries travel between separately compiled units in a
//! line-oriented text format:
//!
//! ```text
//! MODULE geo
//! CLASS Point
//! SIZE 2
//! FIELD x 0 -
//! FIELD y 1 -
//! METHOD len - geo_Point_len
//! EXTEND geo::Shape
//! ```

use std::collections::HashMap;

use log::{debug, error, warn};

use crate::frontend::context::{CompileContext, OPAQUE_TYPE};
use crate::utils::{Error, Result};

/// Marker for "no parent class"
pub const NO_PARENT: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    pub identifier: String,
    pub offset: usize,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    pub identifier: String,
    /// Label of the function implementing the method
    pub link: String,
    pub ret_type: String,
    pub args_type: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSummary {
    pub module: String,
    pub identifier: String,
    pub fields: HashMap<String, FieldSummary>,
    pub methods: HashMap<String, MethodSummary>,
    pub size: usize,
    pub parent: String,
}

impl ClassSummary {
    pub fn new(module: &str, identifier: &str) -> Self {
        Self {
            module: module.to_string(),
            identifier: identifier.to_string(),
            fields: HashMap::new(),
            methods: HashMap::new(),
            size: 0,
            parent: NO_PARENT.to_string(),
        }
    }

    /// The opaque single-slot type every untyped value has
    pub fn base_pointer() -> Self {
        Self {
            size: 1,
            ..Self::new("", OPAQUE_TYPE)
        }
    }

    /// `module::identifier`, or just the identifier outside any module
    pub fn full_name(&self) -> String {
        if self.module.is_empty() {
            self.identifier.clone()
        } else {
            format!("{}::{}", self.module, self.identifier)
        }
    }

    /// Key in the short-name table: the last `.` segment of the identifier
    pub fn short_name(&self) -> &str {
        self.identifier.rsplit('.').next().unwrap_or_default()
    }

    pub fn add_field(&mut self, identifier: &str, ty: &str) {
        let offset = self.fields.len();
        self.fields.insert(
            identifier.to_string(),
            FieldSummary {
                identifier: identifier.to_string(),
                offset,
                ty: ty.to_string(),
            },
        );
        self.size = self.size.max(self.fields.len());
    }

    /// Fields ordered by offset, ties broken by name
    pub fn fields_by_offset(&self) -> Vec<&FieldSummary> {
        let mut fields: Vec<_> = self.fields.values().collect();
        fields.sort_by(|a, b| a.offset.cmp(&b.offset).then_with(|| a.identifier.cmp(&b.identifier)));
        fields
    }
}

/// Look a class up by short or qualified name. Failing to find it is fatal.
pub fn resolve_class(class_name: &str, ctx: &CompileContext) -> Result<ClassSummary> {
    if class_name == OPAQUE_TYPE {
        return Ok(ClassSummary::base_pointer());
    }
    if let Some(class) = ctx.short_classes_map.get(class_name) {
        return Ok(class.clone());
    }
    let full_name = ctx.full_class_name(class_name);
    if let Some(class) = ctx.classes_map.get(&full_name) {
        return Ok(class.clone());
    }
    error!("Cannot resolve class: {}", class_name);
    Err(Error::UnresolvedClass {
        name: class_name.to_string(),
    })
}

/// Merge `child` onto `parent`: parent fields keep their offsets, fields new
/// in the child follow from `parent.size`, child methods override.
pub fn merge_class(child: ClassSummary, parent: &ClassSummary) -> ClassSummary {
    let mut merged = ClassSummary {
        module: child.module.clone(),
        identifier: child.identifier.clone(),
        fields: parent.fields.clone(),
        methods: parent.methods.clone(),
        size: parent.size,
        parent: parent.full_name(),
    };

    let mut next_offset = parent.size;
    for field in child.fields_by_offset() {
        let offset = match parent.fields.get(&field.identifier) {
            Some(inherited) => inherited.offset,
            None => {
                next_offset += 1;
                next_offset - 1
            }
        };
        merged.fields.insert(
            field.identifier.clone(),
            FieldSummary {
                offset,
                ..field.clone()
            },
        );
    }
    merged.size = next_offset;

    merged.methods.extend(child.methods);
    merged
}

/// Parse one class record. EXTEND merges against the already resolved
/// parent. Malformed records are skipped with a warning.
pub fn collect_class(source: &str, ctx: &mut CompileContext) -> Result<Option<ClassSummary>> {
    let mut class = ClassSummary::new("", "");

    for line in source.lines() {
        let mut parts = line.trim().split(' ').filter(|s| !s.is_empty());
        let Some(instr) = parts.next() else {
            continue;
        };
        let values: Vec<&str> = parts.collect();

        match instr.to_ascii_uppercase().as_str() {
            "MODULE" => class.module = values.join(" "),
            "CLASS" => class.identifier = values.join(" "),
            "SIZE" => match values.join(" ").parse() {
                Ok(size) => class.size = size,
                Err(_) => return Ok(skip_record(source, "bad SIZE")),
            },
            "FIELD" => {
                let (Some(name), Some(offset)) = (values.first(), values.get(1)) else {
                    return Ok(skip_record(source, "incomplete FIELD"));
                };
                let Ok(offset) = offset.parse() else {
                    return Ok(skip_record(source, "bad FIELD offset"));
                };
                class.fields.insert(
                    name.to_string(),
                    FieldSummary {
                        identifier: name.to_string(),
                        offset,
                        ty: values.get(2).unwrap_or(&OPAQUE_TYPE).to_string(),
                    },
                );
            }
            "METHOD" => {
                if values.len() < 3 {
                    return Ok(skip_record(source, "incomplete METHOD"));
                }
                class.methods.insert(
                    values[0].to_string(),
                    MethodSummary {
                        identifier: values[0].to_string(),
                        ret_type: values[1].to_string(),
                        link: values[2].to_string(),
                        args_type: values[3..].iter().map(|s| s.to_string()).collect(),
                    },
                );
            }
            "EXTEND" => {
                let parent_name = values.first().copied().unwrap_or(NO_PARENT);
                if parent_name != NO_PARENT {
                    let parent = resolve_class(parent_name, ctx)?;
                    class = merge_class(class, &parent);
                }
            }
            _ => {}
        }
    }

    if class.identifier.is_empty() {
        return Ok(skip_record(source, "no CLASS line"));
    }

    register_class(class.clone(), ctx);
    Ok(Some(class))
}

/// Collect every blank-line separated record in `source`
pub fn collect_classes(source: &str, ctx: &mut CompileContext) -> Result<Vec<ClassSummary>> {
    let mut collected = Vec::new();
    let mut record = String::new();
    for line in source.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !record.is_empty() {
                collected.extend(collect_class(&record, ctx)?);
                record.clear();
            }
        } else {
            record.push_str(line);
            record.push('\n');
        }
    }
    Ok(collected)
}

fn skip_record(source: &str, reason: &str) -> Option<ClassSummary> {
    warn!("Invalid class summary detected ({}):", reason);
    warn!("{}", source.trim_end());
    warn!("This class was skipped.");
    None
}

/// Insert into both lookup tables. A short name seen twice is dropped from
/// the short table for good, forcing qualified lookups.
pub fn register_class(class: ClassSummary, ctx: &mut CompileContext) {
    let short = class.short_name().to_string();
    let full_name = class.full_name();

    if ctx.ambiguous_short_names.contains(&short) {
        // stays qualified-only
    } else if ctx.short_classes_map.remove(&short).is_some() {
        ctx.ambiguous_short_names.push(short);
    } else {
        ctx.short_classes_map.insert(short, class.clone());
    }

    if ctx.classes_map.contains_key(&full_name) {
        warn!("Duplicated class: {}", full_name);
        warn!("The former one will be overwritten.");
    }
    ctx.classes_map.insert(full_name.clone(), class);
    debug!("Class {} collected.", full_name);
}

/// Serialise a summary in the record format read by `collect_class`
pub fn dump_class(summary: &ClassSummary) -> String {
    let mut out = vec![
        format!("MODULE {}", summary.module),
        format!("CLASS {}", summary.identifier),
        format!("SIZE {}", summary.size),
    ];
    for field in summary.fields_by_offset() {
        out.push(format!("FIELD {} {} {}", field.identifier, field.offset, field.ty));
    }
    let mut methods: Vec<_> = summary.methods.values().collect();
    methods.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    for method in methods {
        out.push(format!("METHOD {} {} {}", method.identifier, method.ret_type, method.link));
    }
    if summary.parent != NO_PARENT {
        out.push(format!("EXTEND {}", summary.parent));
    }
    out.join("\n")
}
