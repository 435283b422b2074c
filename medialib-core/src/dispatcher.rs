//! The dispatcher thread: routes client commands to the owning backend,
//! answers for the core-owned part of the tree, and post-processes what the
//! backends send back before publishing it.
//!
//! Everything here runs on one thread. The root catalog, both barriers and
//! the config registry are never touched from anywhere else once the
//! database is open.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use medialib_types::{
    BackendEvent, Command, DeviceKind, Event, ParameterInfo, ParameterKind, ParameterValue,
    RemoteDevice, Token,
};
use url::Url;

use crate::backend::{BackendMessage, Capabilities};
use crate::barrier::{Barrier, Begin, Completion};
use crate::bus::{ControlHandle, Flow, Sink, SinkHandle};
use crate::cache::DerivedCache;
use crate::catalog::{Merge, Resolution, RootCatalog};
use crate::config::Options;
use crate::error::DispatchError;
use crate::object::{finalize, parent_id};
use crate::registry::{ConfigPersister, GENERAL_CONTEXT};
use crate::uris::{add_external_uris, MediaDirs, RadioBrowserResolver};

/// Button in the general context that starts a rescan.
pub const RESCAN_PARAMETER: &str = "rescan";

/// Schema of the `general` config context.
pub fn general_parameters() -> Vec<ParameterInfo> {
    let mut params = vec![ParameterInfo::new(RESCAN_PARAMETER, "Rescan", ParameterKind::Button)
        .with_help("Rescan all media sources")];
    params.extend(MediaDirs::parameters());
    params
}

/// Command sink and capabilities of one backend runner.
struct Route {
    name: String,
    capabilities: Capabilities,
    commands: SinkHandle<Command>,
}

/// Who answers a command addressed to an id.
enum Target {
    Local,
    /// Core-owned root of a backend's subtree.
    Claimed(String),
    Backend(String),
    Missing,
}

pub struct Dispatcher {
    catalog: RootCatalog,
    routes: Vec<Route>,
    rescan: Barrier<Token>,
    creation: Barrier<()>,
    persister: ConfigPersister,
    media_dirs: MediaDirs,
    resolver: RadioBrowserResolver,
    control: ControlHandle<Command, Event>,
    derived: Vec<Box<dyn DerivedCache>>,
    server_url: Option<Url>,
    remote_devices: Vec<RemoteDevice>,
}

impl Dispatcher {
    pub fn new(
        catalog: RootCatalog,
        persister: ConfigPersister,
        control: ControlHandle<Command, Event>,
        options: &Options,
    ) -> Self {
        let mut media_dirs = MediaDirs::new();
        let server_url = options.server_url.as_deref().and_then(|raw| match Url::parse(raw) {
            Ok(url) => {
                media_dirs.set_root_uri(raw);
                Some(url)
            }
            Err(e) => {
                log::warn!(target: "mdb", "ignoring invalid server url {}: {}", raw, e);
                None
            }
        });

        Self {
            catalog,
            routes: Vec::new(),
            rescan: Barrier::new(),
            creation: Barrier::new(),
            persister,
            media_dirs,
            resolver: RadioBrowserResolver::new(options.radio_browser_server.clone()),
            control,
            derived: Vec::new(),
            server_url,
            remote_devices: Vec::new(),
        }
    }

    pub fn add_backend(&mut self, name: &str, capabilities: Capabilities, commands: SinkHandle<Command>) {
        self.routes.push(Route {
            name: name.to_string(),
            capabilities,
            commands,
        });
    }

    pub fn add_derived_cache(&mut self, cache: Box<dyn DerivedCache>) {
        self.derived.push(cache);
    }

    /// Publish files below `path` through the export table.
    pub fn export_dir(&mut self, path: &Path) {
        self.media_dirs.add_path(&path.to_string_lossy());
    }

    /// Start waiting for the named backends to finish creating a new
    /// database. With no participants `CreationDone` goes out at once.
    pub fn begin_creation(&mut self, participants: Vec<String>) {
        let count = participants.len();
        match self.creation.begin((), participants) {
            Begin::Started => {
                log::info!(target: "mdb", "waiting for {} backends to finish creation", count)
            }
            Begin::Immediate(()) => self.publish(Event::CreationDone),
            Begin::Rejected(()) => log::warn!(target: "mdb", "creation already in process"),
        }
    }

    pub fn catalog(&self) -> &RootCatalog {
        &self.catalog
    }

    pub fn persister(&self) -> &ConfigPersister {
        &self.persister
    }

    pub fn persister_mut(&mut self) -> &mut ConfigPersister {
        &mut self.persister
    }

    pub fn media_dirs(&self) -> &MediaDirs {
        &self.media_dirs
    }

    pub fn media_dirs_mut(&mut self) -> &mut MediaDirs {
        &mut self.media_dirs
    }

    pub fn rescan_pending(&self) -> bool {
        self.rescan.is_pending()
    }

    pub fn remote_devices(&self) -> &[RemoteDevice] {
        &self.remote_devices
    }

    fn publish(&self, event: Event) {
        self.control.events().publish(event);
    }

    fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    fn forward(&self, backend: &str, cmd: Command) -> Result<(), DispatchError> {
        match self.route(backend) {
            Some(route) => {
                route.commands.put(cmd);
                Ok(())
            }
            None => {
                log::warn!(target: "mdb", "no runner for backend {}", backend);
                Err(DispatchError::UnknownBackend(backend.to_string()))
            }
        }
    }

    fn broadcast(&self, wants: impl Fn(&Capabilities) -> bool, cmd: &Command) -> usize {
        let mut sent = 0;
        for route in self.routes.iter().filter(|r| wants(&r.capabilities)) {
            route.commands.put(cmd.clone());
            sent += 1;
        }
        sent
    }

    fn target(&self, id: &str) -> Target {
        match self.catalog.resolve(id) {
            Resolution::Local(_) => Target::Local,
            Resolution::Delegated {
                backend,
                exact: true,
                ..
            } => Target::Claimed(backend.to_string()),
            Resolution::Delegated { backend, .. } => Target::Backend(backend.to_string()),
            Resolution::NotFound => Target::Missing,
        }
    }

    fn not_found(&self, token: Option<Token>, id: String) -> Result<(), DispatchError> {
        log::debug!(target: "mdb", "no such object {}", id);
        self.publish(Event::NotFound {
            token,
            id: id.clone(),
        });
        Err(DispatchError::NotFound(id))
    }

    /// Handle one client command. Every error has already been logged or
    /// answered on the bus; the result is for callers driving the
    /// dispatcher directly.
    pub fn handle_command(&mut self, cmd: Command) -> Result<(), DispatchError> {
        match cmd {
            Command::BrowseObject { token, id } => match self.target(&id) {
                Target::Local | Target::Claimed(_) => {
                    self.serve_object(token, &id);
                    Ok(())
                }
                Target::Backend(backend) => self.forward(&backend, Command::BrowseObject { token, id }),
                Target::Missing => self.not_found(Some(token), id),
            },

            Command::BrowseChildren {
                token,
                id,
                start,
                count,
                one_answer,
            } => match self.target(&id) {
                Target::Local => {
                    self.serve_children(token, id, start, count);
                    Ok(())
                }
                Target::Claimed(backend) | Target::Backend(backend) => self.forward(
                    &backend,
                    Command::BrowseChildren {
                        token,
                        id,
                        start,
                        count,
                        one_answer,
                    },
                ),
                Target::Missing => self.not_found(Some(token), id),
            },

            cmd @ (Command::SpliceChildren { .. } | Command::Sort { .. } | Command::SaveLocal { .. }) => {
                let id = cmd.target_id().unwrap_or_default().to_string();
                match self.target(&id) {
                    Target::Claimed(backend) | Target::Backend(backend) => self.forward(&backend, cmd),
                    Target::Local => {
                        log::debug!(target: "mdb", "{} is read only", id);
                        Ok(())
                    }
                    Target::Missing => self.not_found(None, id),
                }
            }

            Command::Rescan { token } => self.start_rescan(token),

            Command::SetParameter { context, name, value } => self.set_parameter(context, name, value),

            Command::RemoteDeviceAdded(device) => {
                self.remote_device_added(device);
                Ok(())
            }

            Command::RemoteDeviceRemoved { uri } => {
                self.remote_devices.retain(|d| d.uri != uri);
                self.broadcast(|c| c.remote_devices, &Command::RemoteDeviceRemoved { uri: uri.clone() });
                self.publish(Event::BackendRemoved { uri });
                Ok(())
            }

            cmd @ (Command::VolumeAdded { .. } | Command::VolumeRemoved { .. }) => {
                self.broadcast(|c| c.volumes, &cmd);
                Ok(())
            }

            Command::Quit => Ok(()),
        }
    }

    fn serve_object(&self, token: Token, id: &str) {
        let Some(node) = self.catalog.get(id) else {
            return;
        };
        let position = parent_id(&node.id)
            .and_then(|parent| self.catalog.get(parent))
            .and_then(|parent| Some((parent.child_index(&node.id)?, parent.children.len())));
        let mut object = node.clone();
        match position {
            Some((idx, total)) => finalize(&mut object, Some(idx), total),
            None => finalize(&mut object, None, 0),
        }
        add_external_uris(&mut object, &self.media_dirs, Some(&self.resolver));
        self.publish(Event::Object { token, object });
    }

    fn serve_children(&self, token: Token, id: String, start: usize, count: Option<usize>) {
        let Some((mut items, _total)) = self.catalog.browse_children(&id, start, count) else {
            return;
        };
        for item in &mut items {
            add_external_uris(item, &self.media_dirs, Some(&self.resolver));
        }
        self.publish(Event::SpliceChildren {
            token: Some(token),
            id,
            last: true,
            index: start,
            delete: 0,
            items,
        });
    }

    fn start_rescan(&mut self, token: Token) -> Result<(), DispatchError> {
        let participants: Vec<&str> = self
            .routes
            .iter()
            .filter(|r| r.capabilities.rescan)
            .map(|r| r.name.as_str())
            .collect();
        let count = participants.len();
        match self.rescan.begin(token, participants) {
            Begin::Rejected(token) => {
                log::warn!(target: "mdb", "rescan {} ignored: already in process", token);
                Err(DispatchError::RescanPending)
            }
            Begin::Immediate(token) => {
                self.purge_derived();
                self.publish(Event::RescanDone { token });
                Ok(())
            }
            Begin::Started => {
                log::info!(target: "mdb", "rescan {} started ({} backends)", token, count);
                self.broadcast(|c| c.rescan, &Command::Rescan { token });
                self.purge_derived();
                Ok(())
            }
        }
    }

    /// A top-level container changed its sort key: take it out at `from`
    /// and put it back at `to`.
    fn publish_root_move(&mut self, id: &str, from: usize, to: usize) {
        let Some(node) = self.catalog.root().children.get(to) else {
            return;
        };
        let mut item = node.clone();
        finalize(&mut item, Some(to), self.catalog.len());
        log::debug!(target: "mdb", "root container {} moved {} -> {}", id, from, to);
        self.publish(Event::SpliceChildren {
            token: None,
            id: "/".to_string(),
            last: false,
            index: from,
            delete: 1,
            items: Vec::new(),
        });
        self.publish(Event::SpliceChildren {
            token: None,
            id: "/".to_string(),
            last: true,
            index: to,
            delete: 0,
            items: vec![item],
        });
    }

    fn purge_derived(&mut self) {
        for cache in &mut self.derived {
            log::debug!(target: "mdb", "purging {}", cache.name());
            cache.purge();
        }
    }

    fn set_parameter(&mut self, context: String, name: String, value: ParameterValue) -> Result<(), DispatchError> {
        let now = Instant::now();
        if context == GENERAL_CONTEXT {
            self.persister.set(&context, &name, value.clone(), now)?;
            if name == RESCAN_PARAMETER {
                let token = self.control.next_token();
                return self.start_rescan(token);
            }
            if !self.media_dirs.set_parameter(&name, &value) {
                log::debug!(target: "mdb", "general parameter {} has no handler", name);
            }
            return Ok(());
        }

        if self.route(&context).is_none() {
            return Err(DispatchError::UnknownBackend(context));
        }
        self.persister.set(&context, &name, value.clone(), now)?;
        self.forward(&context.clone(), Command::SetParameter { context, name, value })
    }

    fn remote_device_added(&mut self, device: RemoteDevice) {
        if self.is_us(&device) {
            log::debug!(target: "mdb", "ignoring our own server {}", device.uri);
            return;
        }
        log::info!(target: "mdb", "remote device {} ({})", device.label, device.uri);
        self.broadcast(|c| c.remote_devices, &Command::RemoteDeviceAdded(device.clone()));
        self.remote_devices.retain(|d| d.uri != device.uri);
        self.remote_devices.push(device.clone());
        self.publish(Event::BackendAdded(device));
    }

    fn is_us(&self, device: &RemoteDevice) -> bool {
        if device.kind != DeviceKind::MediaServer {
            return false;
        }
        let Some(ours) = &self.server_url else {
            return false;
        };
        match Url::parse(&device.uri) {
            Ok(theirs) => {
                theirs.host_str() == ours.host_str()
                    && theirs.port_or_known_default() == ours.port_or_known_default()
            }
            Err(e) => {
                log::debug!(target: "mdb", "unparsable device uri {}: {}", device.uri, e);
                false
            }
        }
    }

    /// Process one message from a backend runner.
    pub fn handle_backend_event(&mut self, msg: BackendMessage) {
        let BackendMessage { backend, event } = msg;
        match event {
            BackendEvent::Publish(mut event) => {
                match &mut event {
                    Event::SpliceChildren { items, .. } => {
                        for item in items.iter_mut() {
                            add_external_uris(item, &self.media_dirs, Some(&self.resolver));
                        }
                    }
                    Event::Object { object, .. } => {
                        add_external_uris(object, &self.media_dirs, Some(&self.resolver));
                    }
                    _ => {}
                }
                let moved = match &event {
                    Event::ObjectChanged { id, fields } => match self.catalog.merge_object(id, fields) {
                        Merge::Moved { from, to } => Some((id.clone(), from, to)),
                        _ => None,
                    },
                    _ => None,
                };
                self.publish(event);
                if let Some((id, from, to)) = moved {
                    self.publish_root_move(&id, from, to);
                }
            }

            BackendEvent::AddRootContainer(container) => {
                if let Some((index, _)) = self.catalog.delete_root_container(&container.id) {
                    log::debug!(target: "mdb", "{}: replacing root container {}", backend, container.id);
                    self.publish(Event::SpliceChildren {
                        token: None,
                        id: "/".to_string(),
                        last: true,
                        index,
                        delete: 1,
                        items: Vec::new(),
                    });
                }
                let mut item = container.clone();
                let index = self.catalog.add_root_container(container);
                finalize(&mut item, Some(index), self.catalog.len());
                self.publish(Event::SpliceChildren {
                    token: None,
                    id: "/".to_string(),
                    last: true,
                    index,
                    delete: 0,
                    items: vec![item],
                });
            }

            BackendEvent::DeleteRootContainer { id } => match self.catalog.delete_root_container(&id) {
                Some((index, _)) => self.publish(Event::SpliceChildren {
                    token: None,
                    id: "/".to_string(),
                    last: true,
                    index,
                    delete: 1,
                    items: Vec::new(),
                }),
                None => log::warn!(target: "mdb", "{}: no root container {}", backend, id),
            },

            BackendEvent::ExportMediaDir { path } => self.media_dirs.add_path(&path.to_string_lossy()),

            BackendEvent::UnexportMediaDir { path } => self.media_dirs.del_path(&path.to_string_lossy()),

            BackendEvent::RescanComplete => match self.rescan.complete(&backend) {
                Completion::Done(token) => {
                    log::info!(target: "mdb", "rescan {} done", token);
                    self.publish(Event::RescanDone { token });
                }
                Completion::Waiting(left) => {
                    log::debug!(target: "mdb", "{} finished rescan, {} left", backend, left)
                }
                Completion::Ignored => {
                    log::warn!(target: "mdb", "{}: rescan completion not waited for", backend)
                }
            },

            BackendEvent::CreationDone => match self.creation.complete(&backend) {
                Completion::Done(()) => {
                    log::info!(target: "mdb", "all backends created");
                    self.publish(Event::CreationDone);
                }
                Completion::Waiting(left) => {
                    log::debug!(target: "mdb", "{} created, {} left", backend, left)
                }
                Completion::Ignored => log::warn!(target: "mdb", "{}: unexpected creation done", backend),
            },

            BackendEvent::ParameterChanged { name, value } => {
                if let Err(e) = self.persister.set(&backend, &name, value.clone(), Instant::now()) {
                    log::warn!(target: "config", "{}: {}", backend, e);
                }
                self.publish(Event::ParameterChanged {
                    context: backend,
                    name,
                    value,
                });
            }
        }
    }

    /// Periodic work: write the config once it has settled.
    pub fn tick(&mut self, now: Instant) {
        if let Err(e) = self.persister.poll(now) {
            log::error!(target: "config", "saving {} failed: {}", self.persister.path().display(), e);
        }
    }

    /// Write pending config changes now.
    pub fn flush_config(&mut self) {
        if let Err(e) = self.persister.flush() {
            log::error!(target: "config", "saving {} failed: {}", self.persister.path().display(), e);
        }
    }

    /// Thread body. Returns the dispatcher after `Quit` so the owner can
    /// flush its state.
    pub fn run(
        mut self,
        commands: Sink<Command>,
        backend_events: Sink<BackendMessage>,
        poll_interval: Duration,
    ) -> Self {
        log::debug!(target: "mdb", "dispatcher started");
        loop {
            let pass = commands.iteration(|cmd| {
                if let Err(e) = self.handle_command(cmd) {
                    log::debug!(target: "mdb", "command failed: {}", e);
                }
                Flow::Continue
            });
            let mut ops = pass.handled;

            ops += backend_events
                .iteration(|msg| {
                    self.handle_backend_event(msg);
                    Flow::Continue
                })
                .handled;

            self.tick(Instant::now());

            if !pass.keep_running {
                break;
            }
            if ops == 0 {
                thread::sleep(poll_interval);
            }
        }
        log::debug!(target: "mdb", "dispatcher stopped");
        self
    }
}
