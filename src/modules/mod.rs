/*!
 * Modules
 * Native modules shared by controller sessions and isolated contexts
 */

mod builtins;
pub mod catalog;
mod math;
mod system;
mod text;

// Re-export public API
pub use catalog::{catalog, Catalog, Member, NativeModule, BUILTINS};
