//! Stageline - concurrent stage-pipeline dispatcher
//!
//! This library walks work units through an ordered pipeline of processing
//! stages. Stages between barriers run concurrently; groups run in order.
//! Units that share an identity key while one is already in flight are
//! coalesced onto that traversal and receive its result with their own
//! routing. A periodic soft timeout releases waiting submitters without
//! aborting the work.
//!
//! # Example
//!
//! ```ignore
//! use stageline::{Callbacks, Dispatcher, Token, Unit};
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::builder()
//!     .pipe(resolve)
//!     .pipe(fetch)
//!     .wait()
//!     .pipe(respond)
//!     .timeout(Duration::from_millis(500))
//!     .build()?;
//!
//! dispatcher.load();
//! dispatcher.submit(
//!     Unit::new(Token::new("example.org/A")),
//!     Callbacks::new()
//!         .on_success(|d| reply(d.routing(), d.unit()))
//!         .on_timeout(|d| reply_busy(d.routing())),
//! );
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod pipeline;
pub mod stage;
pub mod token;
pub mod unit;
pub mod wait_list;

pub use dispatcher::{
    Admission, Callback, Callbacks, Delivery, Dispatcher, DispatcherBuilder, DispatcherConfig,
    DispatcherStats,
};
pub use error::DispatcherError;
pub use hooks::{DispatchEvent, EventRegistry};
pub use pipeline::{Pipeline, Step};
pub use stage::{Stage, StageClock, StageError};
pub use token::{Routing, Token, TokenId};
pub use unit::{Unit, UnitStatus};
pub use wait_list::WaitList;

/// Version of the Stageline library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
