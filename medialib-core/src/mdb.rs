//! The media database: owns the directory, the backends and the dispatcher
//! thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use medialib_types::{Command, Event};

use crate::backend::{Backend, BackendContext, BackendMessage, BackendRunner, CreateContext, Emitter};
use crate::bus::{ControlHandle, Controllable, Sink};
use crate::cache::{DirectoryCache, MemoryObjectCache, ObjectCache};
use crate::catalog::RootCatalog;
use crate::config::Options;
use crate::dirlock::DirLock;
use crate::dispatcher::{general_parameters, Dispatcher};
use crate::error::{Error, Result};
use crate::paths;
use crate::registry::{ConfigPersister, GENERAL_CONTEXT};

const CREATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An open media database.
///
/// Clients talk to it through [`MediaDb::handle`]. Dropping it shuts
/// everything down, see [`MediaDb::stop`].
pub struct MediaDb {
    db_dir: PathBuf,
    control: ControlHandle<Command, Event>,
    cache: Arc<dyn ObjectCache>,
    runners: Vec<BackendRunner>,
    dispatcher: Option<JoinHandle<Dispatcher>>,
    lock: Option<DirLock>,
}

impl MediaDb {
    /// Open (or with `options.create`, create) the database below
    /// `options.base_dir` and start every backend.
    pub fn open(options: Options, backends: Vec<Box<dyn Backend>>) -> Result<Self> {
        let db_dir = paths::db_dir(&options.base_dir);
        if options.create && db_dir.exists() {
            return Err(Error::AlreadyExists(db_dir));
        }
        if !options.create && !db_dir.is_dir() {
            return Err(Error::NotFound(db_dir));
        }

        std::fs::create_dir_all(&db_dir).map_err(|e| Error::io(&db_dir, e))?;
        let lock = DirLock::acquire(&db_dir)?;
        let thumbnails_dir = paths::thumbnails_dir(&db_dir);
        for dir in [paths::cache_dir(&db_dir), thumbnails_dir.clone()] {
            std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }

        let mut persister = ConfigPersister::open(paths::config_file(&db_dir), options.save_debounce)?;
        persister.register_context(GENERAL_CONTEXT, general_parameters());

        let mut catalog = RootCatalog::new();
        let mut backends: Vec<_> = backends
            .into_iter()
            .map(|mut backend| {
                let info = backend.info();
                let mut ctx = CreateContext {
                    name: &info.name,
                    data_dir: &db_dir,
                    do_create: options.create,
                    catalog: &mut catalog,
                };
                backend.create(&mut ctx);
                if !info.parameters.is_empty() {
                    persister.register_context(&info.name, info.parameters.clone());
                }
                (backend, info)
            })
            .collect();

        let controllable: Controllable<Command, Event> = Controllable::new();
        let control = controllable.handle();
        let backend_events: Sink<BackendMessage> = Sink::new();
        let cache: Arc<dyn ObjectCache> = Arc::new(MemoryObjectCache::new(options.object_cache_size));

        let mut dispatcher = Dispatcher::new(catalog, persister, control.clone(), &options);
        dispatcher.add_derived_cache(Box::new(DirectoryCache::new("thumbnails", &thumbnails_dir)));
        dispatcher.export_dir(&thumbnails_dir);
        for (name, value) in dispatcher.persister().startup_values(GENERAL_CONTEXT) {
            dispatcher.media_dirs_mut().set_parameter(&name, &value);
        }

        let creating: Vec<String> = backends
            .iter()
            .filter(|(_, info)| info.capabilities.creation_done)
            .map(|(_, info)| info.name.clone())
            .collect();

        let mut db = MediaDb {
            db_dir: db_dir.clone(),
            control: control.clone(),
            cache: Arc::clone(&cache),
            runners: Vec::with_capacity(backends.len()),
            dispatcher: None,
            lock: Some(lock),
        };

        for (backend, info) in backends.drain(..) {
            let ctx = BackendContext {
                emitter: Emitter::new(info.name.clone(), backend_events.handle()),
                cache: Arc::clone(&cache),
                data_dir: db_dir.clone(),
            };
            let runner = BackendRunner::spawn(backend, info, ctx, options.poll_interval)?;
            let name = runner.name().to_string();
            for (param, value) in dispatcher.persister().startup_values(&name) {
                runner.send(Command::SetParameter {
                    context: name.clone(),
                    name: param,
                    value,
                });
            }
            dispatcher.add_backend(&name, runner.info().capabilities, runner.commands());
            db.runners.push(runner);
        }

        // Connected before anything can publish CreationDone.
        let creation_events = control.subscribe();
        if options.create {
            dispatcher.begin_creation(creating);
        }

        let Controllable { commands, .. } = controllable;
        let poll_interval = options.poll_interval;
        let handle = thread::Builder::new()
            .name("mdb-dispatcher".to_string())
            .spawn(move || dispatcher.run(commands, backend_events, poll_interval))
            .map_err(|source| Error::Spawn {
                name: "mdb-dispatcher".to_string(),
                source,
            })?;
        db.dispatcher = Some(handle);

        if options.create && options.wait_for_creation {
            log::info!(target: "mdb", "waiting for backends to create {}", db_dir.display());
            let deadline = options.creation_timeout.map(|t| Instant::now() + t);
            loop {
                if creation_events
                    .drain()
                    .iter()
                    .any(|e| matches!(e, Event::CreationDone))
                {
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    let timeout = options.creation_timeout.unwrap_or_default();
                    log::error!(target: "mdb", "creation timed out after {:?}", timeout);
                    return Err(Error::CreationTimeout(timeout));
                }
                thread::sleep(CREATION_POLL_INTERVAL);
            }
        }

        log::info!(target: "mdb", "opened {} with {} backends", db_dir.display(), db.runners.len());
        Ok(db)
    }

    /// Client side of the control bus.
    pub fn handle(&self) -> ControlHandle<Command, Event> {
        self.control.clone()
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    pub fn cache(&self) -> Arc<dyn ObjectCache> {
        Arc::clone(&self.cache)
    }

    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.runners.iter().map(BackendRunner::name)
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Shut down in order: each backend runner (joined, then its `stop`
    /// hook), the dispatcher (then pending config is written), every
    /// backend's `destroy` hook, and finally the directory lock.
    ///
    /// Idempotent. Also called on drop.
    pub fn stop(&mut self) {
        if self.lock.is_none() {
            return;
        }
        log::info!(target: "mdb", "closing {}", self.db_dir.display());

        let mut stopped = Vec::with_capacity(self.runners.len());
        for runner in &mut self.runners {
            if let Some(mut backend) = runner.shutdown() {
                backend.stop();
                stopped.push(backend);
            }
        }

        if let Some(handle) = self.dispatcher.take() {
            if let Err(e) = self.control.send_blocking(Command::Quit) {
                log::warn!(target: "mdb", "dispatcher did not take quit: {}", e);
            }
            match handle.join() {
                Ok(mut dispatcher) => dispatcher.flush_config(),
                Err(_) => log::error!(target: "mdb", "dispatcher thread panicked"),
            }
        }

        for mut backend in stopped {
            backend.destroy();
        }
        self.lock = None;
    }
}

impl Drop for MediaDb {
    fn drop(&mut self) {
        self.stop();
    }
}
