//! # robot-toolkit
//!
//! Command, transaction and event correlation core for talking to an
//! embodied robot.
//!
//! Every command gets a fresh transaction id and a typed completion
//! handler. The robot answers asynchronously with events tagged by that
//! id; the router decodes each event against what its transaction expects
//! and invokes the handler once (single-shot commands) or repeatedly
//! (standing subscriptions) until cancelled. Photos and video are fetched
//! over a side channel once the robot reports where they live.
//!
//! The wire transport, account authentication and media fetching are
//! traits in [`transport`]; [`transport::memory`] provides in-process
//! implementations.
//!
//! ## Architecture
//!
//! ```text
//! Application
//!     │
//!     ├── RobotSession (service/)          sign-in, connect, cancel
//!     ├── CommandChannel (service/)        look_at, say, take_photo, ...
//!     │
//!     ├── TransactionRegistry (domain/)    pending transactions
//!     ├── EventRouter (service/)           inbound event → callback
//!     ├── EventBus (domain/)               connection state broadcast
//!     ├── MediaSlots (service/)            photo / video fetches
//!     │
//!     └── Transport, Authenticator, MediaFetcher (transport/)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod transport;
