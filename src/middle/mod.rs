//! Middle-end module - Peephole optimization

pub mod optimize;

pub use optimize::{Optimizer, PeepholePass};
