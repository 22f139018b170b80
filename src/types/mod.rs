//! Types module - Class summaries and class-unit declaration

pub mod class_summary;
pub mod summarize;

pub use class_summary::{
    collect_class, collect_classes, dump_class, merge_class, register_class, resolve_class, ClassSummary,
    FieldSummary, MethodSummary, NO_PARENT,
};
pub use summarize::{declare_classes, extract_methods};
