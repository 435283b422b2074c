//! Backend adapter contract.
//!
//! A backend owns one part of the namespace (usually one or more root
//! containers it claims at startup) and runs on its own thread, see
//! [`runner`]. It talks to the core only through its [`Emitter`].

pub mod runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use medialib_types::{BackendEvent, Command, Container, Event, MediaClass, ParameterInfo};

use crate::bus::{BusMessage, SinkHandle};
use crate::cache::ObjectCache;
use crate::catalog::RootCatalog;

pub use runner::BackendRunner;

/// Which broadcast operations a backend takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Receives rescan requests and answers each with `RescanComplete`.
    pub rescan: bool,
    /// Receives remote device add/remove commands.
    pub remote_devices: bool,
    /// Receives volume add/remove commands.
    pub volumes: bool,
    /// Sends one `CreationDone` after a new database was created.
    pub creation_done: bool,
}

/// Static description of a backend.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub name: String,
    pub long_name: String,
    pub capabilities: Capabilities,
    /// Parameter schema. A non-empty schema gets its own config section.
    pub parameters: Vec<ParameterInfo>,
}

impl BackendInfo {
    pub fn new(name: impl Into<String>, long_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            long_name: long_name.into(),
            capabilities: Capabilities::default(),
            parameters: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<ParameterInfo>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A backend event tagged with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendMessage {
    pub backend: String,
    pub event: BackendEvent,
}

impl BusMessage for BackendMessage {}

/// Sends events from one backend to the dispatcher.
#[derive(Clone)]
pub struct Emitter {
    backend: String,
    sink: SinkHandle<BackendMessage>,
}

impl Emitter {
    pub(crate) fn new(backend: impl Into<String>, sink: SinkHandle<BackendMessage>) -> Self {
        Self {
            backend: backend.into(),
            sink,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn emit(&self, event: BackendEvent) {
        self.sink.put(BackendMessage {
            backend: self.backend.clone(),
            event,
        });
    }

    /// Shorthand for an event forwarded to subscribers.
    pub fn publish(&self, event: Event) {
        self.emit(BackendEvent::Publish(event));
    }

    /// Report a failure the backend handled itself.
    pub fn error(&self, message: impl Into<String>) {
        self.publish(Event::BackendError {
            backend: self.backend.clone(),
            message: message.into(),
        });
    }
}

/// What a backend sees while it is being created, before any thread runs.
pub struct CreateContext<'a> {
    pub(crate) name: &'a str,
    pub(crate) data_dir: &'a Path,
    pub(crate) do_create: bool,
    pub(crate) catalog: &'a mut RootCatalog,
}

impl CreateContext<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    /// The database directory.
    pub fn data_dir(&self) -> &Path {
        self.data_dir
    }

    /// Whether a fresh database is being created.
    pub fn do_create(&self) -> bool {
        self.do_create
    }

    /// Take over the root container of `class`: everything at and below it
    /// is routed to this backend.
    pub fn claim_root_container(&mut self, class: MediaClass) -> &mut Container {
        let container = self.catalog.get_or_create_root_container(class);
        container.backend = Some(self.name.to_string());
        container
    }

    /// A root container without claiming it, e.g. to mark it editable.
    pub fn root_container(&mut self, class: MediaClass) -> &mut Container {
        self.catalog.get_or_create_root_container(class)
    }
}

/// What a backend sees on its runner thread.
#[derive(Clone)]
pub struct BackendContext {
    pub emitter: Emitter,
    pub cache: Arc<dyn ObjectCache>,
    pub data_dir: PathBuf,
}

impl BackendContext {
    pub fn name(&self) -> &str {
        self.emitter.backend()
    }

    pub fn emit(&self, event: BackendEvent) {
        self.emitter.emit(event);
    }

    pub fn publish(&self, event: Event) {
        self.emitter.publish(event);
    }
}

/// One content source.
///
/// Hooks run on the backend's own runner thread, except [`Backend::create`]
/// which runs during startup. Failures are reported as events; a panic takes
/// down only this backend's runner.
pub trait Backend: Send {
    fn info(&self) -> BackendInfo;

    /// Set up state and claim root containers.
    fn create(&mut self, _ctx: &mut CreateContext<'_>) {}

    /// Background work, called once per runner tick. Returns the number of
    /// operations performed; zero lets the runner sleep.
    fn ping(&mut self, _ctx: &BackendContext) -> usize {
        0
    }

    fn handle_command(&mut self, cmd: Command, ctx: &BackendContext);

    /// Called after the runner thread has been joined.
    fn stop(&mut self) {}

    /// Called last, after the dispatcher has stopped.
    fn destroy(&mut self) {}
}
