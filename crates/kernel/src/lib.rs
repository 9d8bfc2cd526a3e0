//! Kernel primitives shared by every Libris crate: layered settings, the
//! module lifecycle trait and the registry that drives it.

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{InitCtx, Module};
pub use registry::ModuleRegistry;
