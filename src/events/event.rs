//! Topics and payloads carried by the event bus.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::dispatch::DispatchError;
use crate::http::{Request, Response, WebSocketChannel};

/// Name of a bus channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Start,
    Stop,
    Error,
    Fetch,
    WebSocket,
    Custom(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Start => f.write_str("start"),
            Topic::Stop => f.write_str("stop"),
            Topic::Error => f.write_str("error"),
            Topic::Fetch => f.write_str("fetch"),
            Topic::WebSocket => f.write_str("websocket"),
            Topic::Custom(name) => f.write_str(name),
        }
    }
}

/// A published notification.
#[derive(Debug)]
pub enum Event {
    /// A listener began accepting connections.
    Start { index: usize, port: u16 },
    /// A listener finished closing.
    Stop { index: usize },
    /// A request failed inside the dispatch pipeline.
    Error(Arc<DispatchError>),
    /// No interceptor or route answered; subscribers may respond.
    Fetch(FetchEvent),
    /// A connection completed a WebSocket upgrade.
    WebSocket(WebSocketChannel),
    /// Application-defined notification.
    Custom {
        name: String,
        payload: serde_json::Value,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Start { .. } => Topic::Start,
            Event::Stop { .. } => Topic::Stop,
            Event::Error(_) => Topic::Error,
            Event::Fetch(_) => Topic::Fetch,
            Event::WebSocket(_) => Topic::WebSocket,
            Event::Custom { name, .. } => Topic::Custom(name.clone()),
        }
    }
}

/// Fallback request offered to `fetch` subscribers.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub request: Request,
    pub responder: Responder,
}

/// Single-use reply slot handed to `fetch` subscribers.
///
/// Clones share the slot: whichever clone responds first wins and later
/// calls return `false`. With several subscribers registered the winner is
/// whichever one answers first; no ordering between them is defined.
#[derive(Clone)]
pub struct Responder {
    slot: Arc<Mutex<Option<oneshot::Sender<Response>>>>,
}

impl Responder {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver the response. Returns `false` if a response was already given
    /// or the request is no longer waiting.
    pub fn respond(&self, response: Response) -> bool {
        let sender = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("spent", &self.is_spent())
            .finish()
    }
}
