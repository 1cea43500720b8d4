//! medretrieve-common — shared error taxonomy, the canonical Document/Chunk
//! model (C1), and process configuration used across the workspace.

pub mod config;
pub mod error;
pub mod model;

pub use config::AppConfig;
pub use error::{ErrorCode, MedretrieveError, Result};
pub use model::{Chunk, Document, Section, NS_CHUNK};
