//! medretrieve-web — the HTTP transport: the `/invoke` tool surface, the job
//! API, SSE job-progress streaming, and the C10 readiness orchestrator.

pub mod auth;
pub mod handlers;
pub mod ready;
pub mod router;
pub mod sse;
pub mod state;
