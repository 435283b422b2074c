#![allow(dead_code)]
//! Test harness utilities for medialib-core integration tests.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use medialib_core::backend::{Backend, BackendContext, BackendInfo, Capabilities, CreateContext};
use medialib_core::bus::Subscription;
use medialib_core::Options;
use medialib_types::{
    BackendEvent, Command, Container, Event, MediaClass, ParameterInfo, ParameterKind,
};

/// Shared record of backend hook calls, in call order.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Scriptable backend.
pub struct FakeBackend {
    name: String,
    capabilities: Capabilities,
    claims: Vec<MediaClass>,
    journal: Journal,
    parameters: Vec<ParameterInfo>,
    /// Panic when a command of this kind arrives.
    panic_on: Option<&'static str>,
    /// Never report creation.
    silent: bool,
    do_create: bool,
    announced: bool,
}

impl FakeBackend {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            capabilities: Capabilities::default(),
            claims: Vec::new(),
            journal: journal.clone(),
            parameters: Vec::new(),
            panic_on: None,
            silent: false,
            do_create: false,
            announced: false,
        }
    }

    pub fn claims(mut self, class: MediaClass) -> Self {
        self.claims.push(class);
        self
    }

    pub fn rescans(mut self) -> Self {
        self.capabilities.rescan = true;
        self
    }

    pub fn creates(mut self) -> Self {
        self.capabilities.creation_done = true;
        self
    }

    pub fn with_depth_parameter(mut self) -> Self {
        self.parameters
            .push(ParameterInfo::new("depth", "Scan depth", ParameterKind::Int));
        self
    }

    pub fn panics_on(mut self, kind: &'static str) -> Self {
        self.panic_on = Some(kind);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn boxed(self) -> Box<dyn Backend> {
        Box::new(self)
    }

    fn log(&self, what: &str) {
        self.journal.push(format!("{}:{}", self.name, what));
    }
}

fn kind(cmd: &Command) -> &'static str {
    match cmd {
        Command::BrowseChildren { .. } => "browse-children",
        Command::BrowseObject { .. } => "browse-object",
        Command::Rescan { .. } => "rescan",
        Command::SetParameter { .. } => "set-parameter",
        _ => "other",
    }
}

impl Backend for FakeBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo::new(self.name.clone(), format!("Fake {}", self.name))
            .with_capabilities(self.capabilities)
            .with_parameters(self.parameters.clone())
    }

    fn create(&mut self, ctx: &mut CreateContext<'_>) {
        self.do_create = ctx.do_create();
        for class in self.claims.clone() {
            ctx.claim_root_container(class);
        }
        self.log("create");
    }

    fn ping(&mut self, ctx: &BackendContext) -> usize {
        if self.capabilities.creation_done && self.do_create && !self.announced && !self.silent {
            self.announced = true;
            ctx.emit(BackendEvent::CreationDone);
            return 1;
        }
        0
    }

    fn handle_command(&mut self, cmd: Command, ctx: &BackendContext) {
        if self.panic_on == Some(kind(&cmd)) {
            panic!("{} refuses {}", self.name, kind(&cmd));
        }
        match cmd {
            Command::BrowseChildren { token, id, start, .. } => {
                self.log("browse-children");
                let items = (0..2)
                    .map(|i| Container::new(format!("{}/{}", id, i), format!("Song {}", i), MediaClass::Song))
                    .collect();
                ctx.publish(Event::SpliceChildren {
                    token: Some(token),
                    id,
                    last: true,
                    index: start,
                    delete: 0,
                    items,
                });
            }
            Command::BrowseObject { token, id } => {
                self.log("browse-object");
                ctx.publish(Event::Object {
                    token,
                    object: Container::new(id, "Deep", MediaClass::Song),
                });
            }
            Command::Rescan { .. } => {
                self.log("rescan");
                ctx.emit(BackendEvent::RescanComplete);
            }
            Command::SetParameter { name, value, .. } => {
                self.log(&format!("set:{}={}", name, value.as_int().unwrap_or_default()));
            }
            other => self.log(kind(&other)),
        }
    }

    fn stop(&mut self) {
        self.log("stop");
    }

    fn destroy(&mut self) {
        self.log("destroy");
    }
}

/// Fast-ticking options for a database below `base`.
pub fn test_options(base: &Path, create: bool) -> Options {
    let mut options = Options::new(base);
    options.create = create;
    options.poll_interval = Duration::from_millis(5);
    options.save_debounce = Duration::from_millis(50);
    options.creation_timeout = Some(Duration::from_secs(5));
    options
}

/// Wait for an event matching `pred`, or panic.
pub fn expect_event<F>(sub: &Subscription<Event>, timeout: Duration, pred: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    match sub.wait_for(timeout, pred) {
        Some(event) => event,
        None => panic!("Timed out after {:?} waiting for event", timeout),
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while Instant::now().duration_since(start) < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
