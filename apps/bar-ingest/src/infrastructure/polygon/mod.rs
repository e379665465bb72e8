//! Polygon Adapters
//!
//! - **Stream**: WebSocket aggregate feed (JSON codec), supervised
//!   connection with subscription replay
//! - **REST**: Ticker reference data for symbol enrichment

pub mod auth;
pub mod codec;
pub mod dispatcher;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod rest;
pub mod supervisor;

pub use auth::{AuthError, AuthHandler, AuthProgress, AuthState, Credentials};
pub use codec::{CodecError, FeedCodec, FeedEvent};
pub use dispatcher::{Dispatch, DispatchSummary, FrameDispatcher};
pub use heartbeat::{HeartbeatConfig, Liveness};
pub use messages::{AggregateMessage, ControlAction, ControlRequest, StatusKind, StatusMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use rest::{PolygonRestClient, RestClientConfig};
pub use supervisor::{ConnectionState, FeedConfig, FeedError, FeedSupervisor};
