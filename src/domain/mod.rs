//! Domain layer: identifiers, payloads, commands, and the transaction registry.
//!
//! This module holds the value types exchanged with the robot, the typed
//! callback machinery, the registry of in-flight transactions, and the
//! event bus for session-level notifications.

pub mod callback_info;
pub mod command;
pub mod dispatcher;
pub mod event;
pub mod event_bus;
pub mod geometry;
pub mod media;
pub mod robot;
pub mod transaction_id;
pub mod transaction_registry;

pub use callback_info::{CallbackInfo, Decoded, DecodeError, ResultKind, ResultPayload, decode};
pub use command::{Command, CommandRequest, LookAt, LookAtTarget};
pub use dispatcher::{Callback, Completion, Delivery, Dispatch};
pub use event::{ConnectionState, EventEnvelope, EventType, SessionEvent};
pub use event_bus::EventBus;
pub use geometry::{AngleVector, LpsPosition, Vector2, Vector3};
pub use media::{TakePhotoInfo, VideoFrame};
pub use robot::{Robot, RobotInfo};
pub use transaction_id::TransactionId;
pub use transaction_registry::{PendingSummary, Resolution, TransactionKind, TransactionRegistry};
