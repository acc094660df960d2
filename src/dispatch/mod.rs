//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! canonical Request
//!     → interceptor.rs (ordered chain, first response wins)
//!     → [router lookup, handler.rs route handler]
//!     → [typed fallback or `fetch` topic]
//!     → pipeline.rs (404 default, failure → `error` + 500)
//!     → canonical Response
//! ```

pub mod error;
pub mod handler;
pub mod interceptor;
pub mod pipeline;

pub use error::DispatchError;
pub use handler::{BoxError, Handler, HandlerResult, IntoReply, RequestHandler};
pub use interceptor::{Flow, Interceptor, InterceptorChain, IntoFlow};
pub use pipeline::Pipeline;
