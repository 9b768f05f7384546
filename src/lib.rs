//! # SignalHub
//!
//! `signalhub` is an in-process publish/subscribe broker. Objects subscribe
//! to named or typed topics and are called back when something publishes a
//! matching event, without publisher and subscriber referencing each other.
//!
//! ## Core Modules
//!
//! - `broker`: topics, subscriptions, the registry and the dispatcher, plus
//!   the `Broker` facade that ties them together.
//! - `executor`: runs deliveries inline, on a worker pool, or marshaled onto
//!   a designated home thread.
//! - `config`: loads broker and logging settings from file and environment.
//! - `utils`: the crate error type and logging initialisation.
//!
//! ## Example
//!
//! ```no_run
//! use signalhub::broker::{BroadcastMessage, Broker};
//!
//! let broker = Broker::new()?;
//! let handle = broker.subscribe_to::<BroadcastMessage<String>, _>(|msg, _| {
//!     println!("got {}", msg.content);
//! })?;
//! broker.send(None, BroadcastMessage::new("hello".to_string()));
//! handle.unsubscribe();
//! # Ok::<(), signalhub::utils::BrokerError>(())
//! ```

pub mod broker;
pub mod config;
pub mod executor;
pub mod utils;

pub use broker::Broker;
pub use utils::{BrokerError, Result};
