//! medretrieve-tools — the tool catalog and invoke surface (C7): a fixed set
//! of named tools (`ping`, `search`, `get`, `sync`, `checkpoint.get`,
//! `checkpoint.set`, `jobs.get`, `jobs.cancel`, `jobs.list`) behind a uniform
//! validate/limit/dispatch/envelope pipeline.

pub mod context;
pub mod invoker;
pub mod registry;
pub mod tools;

pub use context::ToolContext;
pub use invoker::{InvokeEnvelope, Invoker};
pub use registry::{Tool, ToolRegistry};
pub use tools::build_default_registry;
