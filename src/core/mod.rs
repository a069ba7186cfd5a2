//! Core module - fundamental types and utilities

pub mod aggregate;
pub mod compliance;
pub mod config;
pub mod entity;
pub mod error;
pub mod identity;
pub mod links;
pub mod loader;
pub mod patch;
pub mod project;
pub mod sequence;
pub mod store;
pub mod workflow;

pub use config::Config;
pub use entity::{Entity, Latch, Priority, Severity, Signoff};
pub use error::{QualityError, QualityResult, StoreError};
pub use identity::{EntityId, EntityPrefix, IdParseError};
pub use links::BackRef;
pub use patch::UpdatePolicy;
pub use project::{Project, ProjectError};
pub use sequence::{FileSequence, MemorySequence, SequenceGenerator};
pub use store::{MemoryStore, RecordStore, YamlStore};
pub use workflow::{Action, Lifecycle, StateMachine, WorkflowError};
