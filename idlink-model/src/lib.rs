//! Core data model definitions shared across idlink crates.

pub mod error;
pub mod identity;
pub mod ids;
pub mod mapping;

pub use error::{ModelError, Result as ModelResult};
pub use identity::ExternalIdentity;
pub use ids::ParsedId;
pub use mapping::{ContentKind, MappingKind, StaticMappingEntry};
