//! Agent runtime boundary consumed by the tenant backend.
//!
//! The backend treats the conversation engine as an external collaborator:
//! it hands over `(message, thread_id)` and relays the resulting chunk
//! stream to the caller. Everything about prompting, model calls, and
//! conversation state lives behind the `AgentRuntime` trait; this crate only
//! defines that seam, the named registry the backend selects agents from,
//! and the request-input validation shared by every agent endpoint.

pub mod input;
pub mod registry;
pub mod runtime;

pub use input::{generate_thread_id, validate_message, validate_thread_id, InputError};
pub use registry::AgentRegistry;
pub use runtime::{AgentRuntime, ChunkStream, EchoAgent};
