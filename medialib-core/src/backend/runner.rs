//! One thread per backend.
//!
//! Each tick: run the backend's background hook, drain one pass of its
//! command sink, and sleep when neither did any work. A `Quit` command ends
//! the loop and hands the backend back through the join handle.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use medialib_types::Command;

use super::{Backend, BackendContext, BackendInfo};
use crate::bus::{Flow, Sink, SinkHandle};
use crate::error::{Error, Result};

pub struct BackendRunner {
    info: BackendInfo,
    commands: SinkHandle<Command>,
    join_handle: Option<JoinHandle<Box<dyn Backend>>>,
}

impl BackendRunner {
    pub(crate) fn spawn(
        backend: Box<dyn Backend>,
        info: BackendInfo,
        ctx: BackendContext,
        poll_interval: Duration,
    ) -> Result<Self> {
        let sink = Sink::new();
        let commands = sink.handle();
        let thread_name = format!("backend-{}", info.name);

        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run(backend, sink, ctx, poll_interval))
            .map_err(|source| Error::Spawn {
                name: thread_name,
                source,
            })?;

        Ok(Self {
            info,
            commands,
            join_handle: Some(join_handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &BackendInfo {
        &self.info
    }

    pub(crate) fn commands(&self) -> SinkHandle<Command> {
        self.commands.clone()
    }

    /// Fire-and-forget, dropped if the backend's sink is full.
    pub fn send(&self, cmd: Command) {
        self.commands.put(cmd);
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Send `Quit` and join. Returns the backend for its stop/destroy hooks,
    /// or `None` if the thread panicked.
    pub fn shutdown(&mut self) -> Option<Box<dyn Backend>> {
        let handle = self.join_handle.take()?;
        if self.commands.send(Command::Quit).is_err() {
            log::debug!(target: "backend", "{}: runner already gone", self.info.name);
        }
        match handle.join() {
            Ok(backend) => Some(backend),
            Err(_) => {
                log::error!(target: "backend", "{}: runner thread panicked", self.info.name);
                None
            }
        }
    }
}

fn run(
    mut backend: Box<dyn Backend>,
    sink: Sink<Command>,
    ctx: BackendContext,
    poll_interval: Duration,
) -> Box<dyn Backend> {
    log::debug!(target: "backend", "{}: runner started", ctx.name());
    loop {
        let mut ops = backend.ping(&ctx);

        let iteration = sink.iteration(|cmd| {
            backend.handle_command(cmd, &ctx);
            Flow::Continue
        });
        ops += iteration.handled;
        if !iteration.keep_running {
            break;
        }

        if ops == 0 {
            thread::sleep(poll_interval);
        }
    }
    log::debug!(target: "backend", "{}: runner stopped", ctx.name());
    backend
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendMessage, Emitter};
    use crate::cache::MemoryObjectCache;
    use medialib_types::{BackendEvent, Token};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct Counter {
        pings: Arc<AtomicUsize>,
        commands: Arc<AtomicUsize>,
        panic_on_rescan: bool,
    }

    impl Backend for Counter {
        fn info(&self) -> BackendInfo {
            BackendInfo::new("counter", "Counter")
        }

        fn ping(&mut self, _ctx: &BackendContext) -> usize {
            self.pings.fetch_add(1, Ordering::SeqCst);
            0
        }

        fn handle_command(&mut self, cmd: Command, ctx: &BackendContext) {
            if let Command::Rescan { .. } = cmd {
                if self.panic_on_rescan {
                    panic!("scanner exploded");
                }
                ctx.emit(BackendEvent::RescanComplete);
            }
            self.commands.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spawn(panic_on_rescan: bool) -> (BackendRunner, Sink<BackendMessage>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let events = Sink::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(AtomicUsize::new(0));
        let backend = Box::new(Counter {
            pings: pings.clone(),
            commands: commands.clone(),
            panic_on_rescan,
        });
        let info = backend.info();
        let ctx = BackendContext {
            emitter: Emitter::new("counter", events.handle()),
            cache: Arc::new(MemoryObjectCache::new(8)),
            data_dir: std::env::temp_dir(),
        };
        let runner = BackendRunner::spawn(backend, info, ctx, Duration::from_millis(5)).unwrap();
        (runner, events, pings, commands)
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn runner_pings_and_handles_commands() {
        let (mut runner, events, pings, commands) = spawn(false);
        runner.send(Command::Rescan { token: Token::new(1) });
        assert!(wait_until(Duration::from_secs(2), || commands.load(Ordering::SeqCst) == 1));
        assert!(pings.load(Ordering::SeqCst) > 0);

        let msg = events.try_next().unwrap();
        assert_eq!(msg.backend, "counter");
        assert_eq!(msg.event, BackendEvent::RescanComplete);

        assert!(runner.shutdown().is_some());
        assert!(!runner.is_running());
    }

    #[test]
    fn panic_is_contained_to_runner() {
        let (mut runner, _events, _pings, _commands) = spawn(true);
        runner.send(Command::Rescan { token: Token::new(1) });
        assert!(wait_until(Duration::from_secs(2), || !runner.is_running()));
        assert!(runner.shutdown().is_none());
        // A second shutdown is a no-op.
        assert!(runner.shutdown().is_none());
    }
}
