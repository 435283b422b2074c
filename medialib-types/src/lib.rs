//! # medialib-types
//!
//! Shared type definitions for the medialib workspace: the container model,
//! media classes, configuration parameters and the command/event messages
//! that travel over the control bus.
//!
//! Everything here is plain data. Routing, threads and persistence live in
//! `medialib-core`.

mod class;
mod container;
mod message;
mod param;

pub use class::MediaClass;
pub use container::{Container, Source, UriRole};
pub use message::{BackendEvent, Command, DeviceKind, Event, RemoteDevice, Token, Volume};
pub use param::{ParameterInfo, ParameterKind, ParameterValue};
