//! Errors reported while loading persisted scenes.
//!
//! Runtime operations never fail loudly: missing handles are no-ops or return `None`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("scene document contains the uuid {0} more than once")]
    DuplicateUuid(String),
    #[error("object {child} references unknown parent {parent}")]
    UnknownParent { child: String, parent: String },
    #[error("parenting {child} under {parent} would create a cycle")]
    ParentCycle { child: String, parent: String },
}
