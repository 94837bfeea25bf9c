//! User commands and the queue that carries them to the run loop.
//!
//! Consoles and GUIs produce free-form `(name, parameters)` string pairs. They
//! are parsed once, on enqueue, into the closed [`Command`] type; anything not
//! recognised becomes [`Command::Unknown`] and is ignored by the dispatcher.

use std::fmt;
use std::path::PathBuf;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

/// A user-issued action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Coordinated reset of tracking and mapping.
    Reset,
    /// Stop the run loop (`quit` or `exit`).
    Quit,
    /// Write the current map snapshot to a CSV file.
    SaveMap(PathBuf),
    /// Enable or disable keyframe creation in the tracker.
    KeyFrameInsertion(bool),
    /// Park the map maker at its next checkpoint.
    PauseMapping,
    /// Release a map maker parked by `PauseMapping`.
    ResumeMapping,
    /// Anything the dispatch table does not recognise.
    Unknown { name: String, params: String },
}

impl Command {
    /// Parse a `(name, parameters)` pair. Names are case-insensitive.
    pub fn parse(name: &str, params: &str) -> Self {
        let params = params.trim();
        let unknown = || Command::Unknown {
            name: name.trim().to_string(),
            params: params.to_string(),
        };

        match name.trim().to_ascii_lowercase().as_str() {
            "reset" => Command::Reset,
            "quit" | "exit" => Command::Quit,
            "savemap" if !params.is_empty() => Command::SaveMap(PathBuf::from(params)),
            "keyframes" => match params.to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => Command::KeyFrameInsertion(true),
                "off" | "false" | "0" => Command::KeyFrameInsertion(false),
                _ => unknown(),
            },
            "pausemapping" => Command::PauseMapping,
            "resumemapping" => Command::ResumeMapping,
            _ => unknown(),
        }
    }

    /// Parse one console line: the first whitespace-separated word is the
    /// name, the remainder the parameters.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (name, params) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        Some(Self::parse(name, params))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reset => write!(f, "Reset"),
            Command::Quit => write!(f, "Quit"),
            Command::SaveMap(path) => write!(f, "SaveMap {}", path.display()),
            Command::KeyFrameInsertion(on) => {
                write!(f, "KeyFrames {}", if *on { "on" } else { "off" })
            }
            Command::PauseMapping => write!(f, "PauseMapping"),
            Command::ResumeMapping => write!(f, "ResumeMapping"),
            Command::Unknown { name, params } => write!(f, "{} {}", name, params),
        }
    }
}

/// Producer end of the command queue. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    /// Enqueue a command. Returns false once the run loop has gone away.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Enqueue a raw `(name, parameters)` pair.
    pub fn send_raw(&self, name: &str, params: &str) -> bool {
        self.send(Command::parse(name, params))
    }
}

/// Consumer end, owned by the run loop. FIFO, each command delivered once.
pub struct CommandQueue {
    rx: Receiver<Command>,
    tx: Sender<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { rx, tx }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Non-blocking poll for the oldest pending command.
    pub fn try_next(&self) -> Option<Command> {
        match self.rx.try_recv() {
            Ok(cmd) => Some(cmd),
            // The queue keeps its own sender, so it never disconnects.
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
