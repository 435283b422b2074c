//! Control bus: sinks, hubs and controllables.
//!
//! A [`Sink`] is a bounded queue drained by exactly one consumer loop. A
//! [`Hub`] fans a message out to every connected sink. A [`Controllable`]
//! pairs one command sink with one event hub and is the only way components
//! talk to each other across threads.
//!
//! Delivery is at-most-once: [`SinkHandle::put`] never blocks, and a full or
//! closed sink drops the message. Callers that need an answer use a
//! correlated request/response with [`ControlHandle::call`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use medialib_types::{Command, Event, Token};

use crate::error::BusError;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Poll interval of [`ControlHandle::call`].
pub const CALL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Messages that can travel over the bus.
pub trait BusMessage: Send + 'static {
    /// A quit message ends the consumer loop that drains it.
    fn is_quit(&self) -> bool {
        false
    }
}

impl BusMessage for Command {
    fn is_quit(&self) -> bool {
        matches!(self, Command::Quit)
    }
}

impl BusMessage for Event {}

/// Events that can answer a correlated request.
pub trait Reply {
    /// Token of the request this message answers, if any.
    fn token(&self) -> Option<Token>;

    /// Whether this is the last message answering `token`.
    fn completes(&self, token: Token) -> bool;
}

impl Reply for Event {
    fn token(&self) -> Option<Token> {
        Event::token(self)
    }

    fn completes(&self, token: Token) -> bool {
        Event::completes(self, token)
    }
}

/// Returned by the handler passed to [`Sink::iteration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    pub handled: usize,
    pub keep_running: bool,
}

/// Receiving end of a bounded queue.
pub struct Sink<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T: BusMessage> Sink<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// A producer handle for this sink.
    pub fn handle(&self) -> SinkHandle<T> {
        SinkHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn try_next(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain one pass: at most the messages that were queued when the pass
    /// began, in enqueue order.
    ///
    /// A quit message ends the pass and is not handed to `handler`.
    pub fn iteration<F>(&self, mut handler: F) -> Iteration
    where
        F: FnMut(T) -> Flow,
    {
        let pending = self.rx.len();
        let mut handled = 0;
        for _ in 0..pending {
            let Ok(msg) = self.rx.try_recv() else {
                break;
            };
            handled += 1;
            if msg.is_quit() {
                return Iteration {
                    handled,
                    keep_running: false,
                };
            }
            if handler(msg) == Flow::Stop {
                return Iteration {
                    handled,
                    keep_running: false,
                };
            }
        }
        Iteration {
            handled,
            keep_running: true,
        }
    }

    /// Everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

impl<T: BusMessage> Default for Sink<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable producer side of a [`Sink`].
pub struct SinkHandle<T> {
    tx: Sender<T>,
}

impl<T> Clone for SinkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: BusMessage> SinkHandle<T> {
    /// Fire-and-forget. A full or closed sink drops the message.
    pub fn put(&self, msg: T) {
        if let Err(e) = self.try_put(msg) {
            log::trace!(target: "bus", "message dropped: {}", e);
        }
    }

    pub fn try_put(&self, msg: T) -> Result<(), BusError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => BusError::Full,
            TrySendError::Disconnected(_) => BusError::Disconnected,
        })
    }

    /// Blocks while the sink is full. Only used for shutdown, where a dropped
    /// quit would leave a thread running.
    pub fn send(&self, msg: T) -> Result<(), BusError> {
        self.tx.send(msg).map_err(|_| BusError::Disconnected)
    }
}

/// Identifies one sink connected to a [`Hub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HubConnection(u64);

struct HubInner<T> {
    next_id: u64,
    sinks: Vec<(HubConnection, SinkHandle<T>)>,
}

/// Fan-out to every connected sink.
pub struct Hub<T> {
    inner: Arc<Mutex<HubInner<T>>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: BusMessage + Clone> Hub<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 0,
                sinks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner<T>> {
        // A panicking subscriber must not take the hub down with it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connect(&self, sink: SinkHandle<T>) -> HubConnection {
        let mut inner = self.lock();
        inner.next_id += 1;
        let conn = HubConnection(inner.next_id);
        inner.sinks.push((conn, sink));
        conn
    }

    /// Messages already queued in the sink stay there.
    pub fn disconnect(&self, conn: HubConnection) {
        self.lock().sinks.retain(|(c, _)| *c != conn);
    }

    pub fn publish(&self, msg: T) {
        let inner = self.lock();
        for (_, sink) in &inner.sinks {
            sink.put(msg.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().sinks.len()
    }

    /// Connect a fresh sink that disconnects itself when dropped.
    pub fn subscribe(&self) -> Subscription<T> {
        let sink = Sink::new();
        let conn = self.connect(sink.handle());
        Subscription {
            sink,
            hub: self.clone(),
            conn,
        }
    }
}

impl<T: BusMessage + Clone> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A sink connected to a hub for as long as it lives.
pub struct Subscription<T: BusMessage + Clone> {
    sink: Sink<T>,
    hub: Hub<T>,
    conn: HubConnection,
}

impl<T: BusMessage + Clone> Subscription<T> {
    pub fn sink(&self) -> &Sink<T> {
        &self.sink
    }

    pub fn try_next(&self) -> Option<T> {
        self.sink.try_next()
    }

    pub fn drain(&self) -> Vec<T> {
        self.sink.drain()
    }

    /// Wait up to `timeout` for a message matching `pred`, discarding the
    /// ones that do not match.
    pub fn wait_for<F>(&self, timeout: Duration, mut pred: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(msg) = self.sink.try_next() {
                if pred(&msg) {
                    return Some(msg);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(CALL_POLL_INTERVAL);
        }
    }
}

impl<T: BusMessage + Clone> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.hub.disconnect(self.conn);
    }
}

/// One command sink plus one event hub.
pub struct Controllable<C: BusMessage, E: BusMessage + Clone> {
    pub commands: Sink<C>,
    pub events: Hub<E>,
    tokens: Arc<AtomicU64>,
}

impl<C: BusMessage, E: BusMessage + Clone> Controllable<C, E> {
    pub fn new() -> Self {
        Self {
            commands: Sink::new(),
            events: Hub::new(),
            tokens: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn handle(&self) -> ControlHandle<C, E> {
        ControlHandle {
            commands: self.commands.handle(),
            events: self.events.clone(),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<C: BusMessage + Clone, E: BusMessage + Clone> Controllable<C, E> {
    /// Feed everything published on `hub` into this command sink, until
    /// `hub.disconnect` is called with the returned connection.
    pub fn connect_to(&self, hub: &Hub<C>) -> HubConnection {
        hub.connect(self.commands.handle())
    }
}

impl<C: BusMessage, E: BusMessage + Clone> Default for Controllable<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Client view of a [`Controllable`].
pub struct ControlHandle<C, E> {
    commands: SinkHandle<C>,
    events: Hub<E>,
    tokens: Arc<AtomicU64>,
}

impl<C, E> Clone for ControlHandle<C, E> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            events: self.events.clone(),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<C: BusMessage, E: BusMessage + Clone> ControlHandle<C, E> {
    pub fn send(&self, cmd: C) {
        self.commands.put(cmd);
    }

    pub fn send_blocking(&self, cmd: C) -> Result<(), BusError> {
        self.commands.send(cmd)
    }

    pub fn events(&self) -> &Hub<E> {
        &self.events
    }

    pub fn subscribe(&self) -> Subscription<E> {
        self.events.subscribe()
    }

    pub fn next_token(&self) -> Token {
        Token::new(self.tokens.fetch_add(1, Ordering::Relaxed))
    }
}

impl<C: BusMessage, E: BusMessage + Clone + Reply> ControlHandle<C, E> {
    /// Send a correlated request and collect its answers until the final one
    /// arrives or `timeout` expires.
    ///
    /// The subscription is connected before the request is sent, so a fast
    /// answer cannot be missed.
    pub fn call<F>(&self, build: F, timeout: Duration) -> Result<Vec<E>, BusError>
    where
        F: FnOnce(Token) -> C,
    {
        let token = self.next_token();
        let sub = self.subscribe();
        self.commands.try_put(build(token))?;

        let deadline = Instant::now() + timeout;
        let mut answers = Vec::new();
        loop {
            let mut done = false;
            sub.sink().iteration(|evt| {
                if evt.completes(token) {
                    done = true;
                    answers.push(evt);
                    return Flow::Stop;
                }
                if evt.token() == Some(token) {
                    answers.push(evt);
                }
                Flow::Continue
            });
            if done {
                return Ok(answers);
            }
            if Instant::now() >= deadline {
                return Err(BusError::Timeout(timeout));
            }
            thread::sleep(CALL_POLL_INTERVAL);
        }
    }
}
