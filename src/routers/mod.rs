//! Job routing and response translation.
//!
//! - [`route`]: classifies a job and builds the engine request (pure)
//! - [`streaming`]: turns the engine response into output items
//! - [`handler`]: glues the two around the single upstream call

pub mod error;
pub mod handler;
mod lines;
pub mod route;
pub mod sse;
pub mod streaming;

pub use error::WorkerError;
pub use handler::JobHandler;
pub use lines::LineStream;
pub use route::{route_job, OutboundRequest};
pub use sse::SseChunkStream;
pub use streaming::{translate, OutputStream};
