//! Rules for lifecycle hooks and for code that persists entities those hooks
//! react to.

pub mod order;
pub mod required_fields;
pub mod restricted_fields;
pub mod same_entity_save;

/// Hook methods that run around an entity save.
pub const SAVE_HOOKS: &[&str] = &["beforeSave", "afterSave"];

/// Calls that persist an entity passed as their first argument.
pub const PERSIST_CALLS: &[&str] = &["save", "saveEntity"];
