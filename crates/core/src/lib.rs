//! `binsync-core`: shared building blocks.
//!
//! Record identifiers, the domain error model and the entity/value-object
//! markers. No infrastructure concerns.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BinId, ItemId, LocationId, ProgramId, RuleId};
pub use value_object::ValueObject;
