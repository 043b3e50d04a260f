

// General library config

pub mod config;

// Checks (VALIDATE / ASSERT / RETHROW machinery)

pub mod check_internal;
pub mod debugger;

// Categorized, volumed tracing

pub mod category;
pub mod trace;

pub use category::{ Category, CategoryMap, ExtCategoryMap };
pub use vigil_macro::*;
