//! MLE control plane for a Thread interface.
//!
//! This crate provides the receive path for MLE messages, the attach
//! state machine and the router/REED role logic built on the wire codecs
//! of `thread-wire` and the tables of `thread-topology`.
//!
//! ## Features
//!
//! - **Attach**: scan, resynchronisation, parent selection, Child ID exchange
//! - **Partitions**: merge detection, leader conflicts, targeted reattach
//! - **Router role**: REED upgrade, downgrade, child hosting, advertisements
//! - **Network data**: leader assembly, propagation, route derivation
//!
//! ## Architecture
//!
//! ```text
//! transport ──> Event ──> ThreadInterface ──> MleService / Ipv6Stack / ManagementClient
//!                            │
//!                            ├── handler/    inbound commands
//!                            ├── bootstrap   attach transitions (pure)
//!                            └── interface/  actions, leader and parent duties
//! ```
//!
//! An interface is single-threaded: it is driven by [`Event`]s, one at a
//! time, and reports through [`Notification`]s.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod builder;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod event;
mod handler;
pub mod interface;
pub mod router;
pub mod routes;
pub mod state;
pub mod timers;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use bootstrap::{transition, BootstrapAction, BootstrapContext, BootstrapEvent, ParentRound};
pub use collaborators::{
    Ipv6Stack, ManagementClient, MleService, OutboundMessage, RetryPolicy, RouteKind,
    TransactionId,
};
pub use config::{ResyncRecord, ThreadConfig};
pub use error::MleError;
pub use event::{
    ConnectionError, Event, Notification, RestartStrategy, RetryDecision, RouterIdResponse, RxInfo,
};
pub use interface::ThreadInterface;
pub use routes::{DerivedRoute, Derivation};
pub use state::{AttachState, DeviceRole, ParentInfo};
