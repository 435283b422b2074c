//! # medialib-core
//!
//! Aggregating media library. Several backends (local files, streams,
//! remote servers, removable media) each own part of one hierarchical
//! namespace; the core routes requests to them, answers for the top level
//! itself, and coordinates library-wide operations such as rescans.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use medialib_core::{Config, MediaDb};
//! use medialib_types::Command;
//!
//! // 1. Process settings: embedded defaults + ~/.config/medialib/config.toml
//! let config = Config::load();
//!
//! // 2. Open the database with the backends this build ships
//! let db = MediaDb::open(config.options(false), vec![Box::new(MyBackend::new())])?;
//!
//! // 3. Talk to it over the control bus
//! let handle = db.handle();
//! let answers = handle.call(
//!     |token| Command::BrowseChildren { token, id: "/".into(), start: 0, count: None, one_answer: true },
//!     Duration::from_secs(5),
//! )?;
//!
//! // 4. Dropping the database stops every backend thread and writes settings
//! drop(db);
//! ```
//!
//! ## Module Overview
//!
//! - [`bus`]: `Sink`, `Hub`, `Controllable`: the message plumbing between
//!   clients, the dispatcher and the backends
//! - [`backend`]: the `Backend` trait and its runner thread
//! - [`catalog`]: the core-owned root tree and id routing
//! - [`dispatcher`]: command routing, barriers and event post-processing
//! - [`barrier`]: N-of-N completion barrier for rescan and creation
//! - [`policy`]: which containers accept which children
//! - [`object`], [`uris`]: preparing objects for clients
//! - [`registry`]: persisted per-context settings, written debounced
//! - [`config`]: process settings (embedded + user override)
//! - [`mdb`]: `MediaDb`, the lifecycle owner

pub mod backend;
pub mod barrier;
pub mod bus;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod dirlock;
pub mod dispatcher;
pub mod error;
pub mod mdb;
pub mod object;
pub mod paths;
pub mod policy;
pub mod registry;
pub mod uris;

pub use backend::{Backend, BackendContext, BackendInfo, Capabilities, CreateContext};
pub use bus::{ControlHandle, Controllable, Hub, Sink, SinkHandle};
pub use config::{Config, Options};
pub use error::{BusError, DispatchError, Error, Result};
pub use mdb::MediaDb;
