use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Container, MediaClass, ParameterValue};

/// Correlates a response event with the request that caused it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Token(u64);

impl Token {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    MediaServer,
    Renderer,
}

/// A media server or renderer found on the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub uri: String,
    pub label: String,
    pub kind: DeviceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// A removable volume reported by the volume manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub label: String,
    pub class: MediaClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<PathBuf>,
}

/// Requests accepted by the dispatcher and forwarded to backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Command {
    BrowseChildren {
        token: Token,
        id: String,
        #[serde(default)]
        start: usize,
        /// `None` means everything from `start` on.
        #[serde(default)]
        count: Option<usize>,
        /// Answer with a single splice instead of a paged sequence.
        #[serde(default)]
        one_answer: bool,
    },
    BrowseObject {
        token: Token,
        id: String,
    },
    SpliceChildren {
        id: String,
        /// `None` appends.
        index: Option<usize>,
        delete: usize,
        items: Vec<Container>,
    },
    Sort {
        id: String,
    },
    Rescan {
        token: Token,
    },
    SaveLocal {
        id: String,
    },
    SetParameter {
        context: String,
        name: String,
        value: ParameterValue,
    },
    RemoteDeviceAdded(RemoteDevice),
    RemoteDeviceRemoved {
        uri: String,
    },
    VolumeAdded {
        id: String,
        volume: Volume,
    },
    VolumeRemoved {
        id: String,
    },
    Quit,
}

impl Command {
    /// Target identifier for commands addressed to one node.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Command::BrowseChildren { id, .. }
            | Command::BrowseObject { id, .. }
            | Command::SpliceChildren { id, .. }
            | Command::Sort { id }
            | Command::SaveLocal { id } => Some(id),
            _ => None,
        }
    }
}

/// Everything the dispatcher publishes to its subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    /// Browse response page or an unsolicited change notification
    /// (`token` is `None` for the latter).
    SpliceChildren {
        token: Option<Token>,
        id: String,
        last: bool,
        index: usize,
        delete: usize,
        items: Vec<Container>,
    },
    Object {
        token: Token,
        object: Container,
    },
    NotFound {
        token: Option<Token>,
        id: String,
    },
    ObjectChanged {
        id: String,
        fields: Map<String, Value>,
    },
    CreationDone,
    RescanDone {
        token: Token,
    },
    BackendAdded(RemoteDevice),
    BackendRemoved {
        uri: String,
    },
    ParameterChanged {
        context: String,
        name: String,
        value: ParameterValue,
    },
    BackendError {
        backend: String,
        message: String,
    },
}

impl Event {
    pub fn token(&self) -> Option<Token> {
        match self {
            Event::SpliceChildren { token, .. } | Event::NotFound { token, .. } => *token,
            Event::Object { token, .. } | Event::RescanDone { token } => Some(*token),
            _ => None,
        }
    }

    /// Whether this is the final message answering `token`.
    pub fn completes(&self, token: Token) -> bool {
        match self {
            Event::SpliceChildren { token: Some(t), last, .. } => *t == token && *last,
            other => other.token() == Some(token),
        }
    }
}

/// Messages a backend sends to the core.
///
/// `Publish` is passed through (after URI rewriting) to subscribers. The rest
/// are consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Publish(Event),
    /// Insert a top-level container into the root catalog.
    AddRootContainer(Container),
    DeleteRootContainer { id: String },
    ExportMediaDir { path: PathBuf },
    UnexportMediaDir { path: PathBuf },
    RescanComplete,
    CreationDone,
    /// A parameter of the sending backend changed on its own.
    ParameterChanged { name: String, value: ParameterValue },
}
