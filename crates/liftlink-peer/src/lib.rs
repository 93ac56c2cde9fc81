//! Request correlation, heartbeat supervision and shared-port plumbing.
//!
//! This is the "just works" layer of liftlink. A [`Port`] owns one byte
//! link, runs the receive/housekeeping loop on a dedicated thread, and
//! lets any number of caller contexts send commands and correlated
//! queries concurrently. Inbound frames are matched against pending
//! queries, persistent type listeners, or a generic diagnostic fallback;
//! everything the application needs to hear comes out of a bounded
//! [`LinkEvent`] queue, never from a callback holding the port lock.

pub mod error;
pub mod heartbeat;
pub mod port;
pub mod proto;
pub mod registry;

pub use error::{ListenerKind, PeerError, Result};
pub use heartbeat::{Heartbeat, HeartbeatConfig, LinkState, LinkTransition};
pub use port::{LinkEvent, Port, PortConfig};
pub use proto::{
    CommandRequest, CommandResponse, CommandStatus, StateEvent, MSG_TYPE_COMMAND, MSG_TYPE_ESTOP,
    MSG_TYPE_EVENT, MSG_TYPE_HEARTBEAT,
};
pub use registry::{Dispatch, FrameId, ListenerAction, Registry, RegistryConfig, Role};
