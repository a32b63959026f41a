//! TabSync Host
//!
//! Tokio runtime for tabsync sessions: an in-process browser with shared
//! storage and a relay channel, an SSE transport over reqwest, and one
//! event-loop task per tab.

pub mod browser;
pub mod channel;
pub mod clock;
pub mod runner;
pub mod sse;
pub mod storage;
pub mod transport;

pub use browser::Browser;
pub use clock::TokioClock;
pub use runner::{spawn_tab, NotificationSink, TabHandle, TabInputs, TabNotification};
pub use transport::{SseTransportFactory, TransportSignal};
