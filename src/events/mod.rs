//! Notification bus subsystem.
//!
//! # Topics
//! ```text
//! start     → Event::Start { index, port }     listener accepting
//! stop      → Event::Stop { index }            listener closed
//! error     → Event::Error(DispatchError)      request failed, 500 sent
//! fetch     → Event::Fetch { request, responder }  fallback dispatch
//! websocket → Event::WebSocket(channel)        upgraded connection
//! <custom>  → Event::Custom { name, payload }  application events
//! ```
//!
//! # Design Decisions
//! - Events are typed; subscribers match on the variant they registered for
//! - Delivery is synchronous; subscribers needing I/O spawn a task
//! - The bus is owned by a server context rather than being process-global

pub mod bus;
pub mod event;

pub use bus::{Delivery, EventBus, SubscriptionId};
pub use event::{Event, FetchEvent, Responder, Topic};
