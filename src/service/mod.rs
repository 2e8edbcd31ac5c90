//! Service layer: session lifecycle and command orchestration.
//!
//! [`RobotSession`] owns the connection state and the transaction
//! registry, [`CommandChannel`] turns typed requests into registered
//! transactions, and [`EventRouter`] feeds inbound events back to them.

pub mod channel;
pub mod media;
pub mod router;
pub mod session;

pub use channel::CommandChannel;
pub use media::{FetchSlot, MediaSlots};
pub use router::{EventRouter, RouteOutcome};
pub use session::{InboundSink, RobotSession};
