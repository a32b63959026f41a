//! TabSync Core Library
//!
//! Leader election, push-stream lifecycle and cross-tab relay for live
//! issue updates. Every component is driven with an explicit `now`; hosts
//! supply storage, channel and transport through the traits below.

pub mod clock;
pub mod config;
pub mod error;
pub mod issue;
pub mod lease;
pub mod relay;
pub mod session;
pub mod stream;

pub use clock::{Clock, ManualClock};
pub use config::{LeaderConfig, RelayConfig, StreamConfig, TabSyncConfig};
pub use error::{TabSyncError, TabSyncResult};
pub use lease::model::Role;
pub use lease::store::{LeaseStore, MemoryBackend, StorageBackend};
pub use lease::LeaderCoordinator;
pub use relay::{BroadcastRelay, ChannelBackend};
pub use session::{SessionListener, SessionNotification, SessionParts, TabSession};
pub use stream::StreamController;
