//! Event envelope and the default payload schema.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier handed out by the bus on subscribe.
///
/// `NodeId::BUS` (0) is reserved for the bus itself and never names a
/// subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const BUS: NodeId = NodeId(0);

    pub fn is_bus(self) -> bool {
        self == Self::BUS
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A payload stamped with the id of the node that published it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEvent<P> {
    pub sender: NodeId,
    pub payload: P,
}

impl<P> TaggedEvent<P> {
    pub fn new(sender: NodeId, payload: P) -> Self {
        Self { sender, payload }
    }
}

/// Application mode switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppState {
    Input,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equals,
}

/// Piano samples the audio side can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sound {
    C5,
    D5,
    E5,
    F5,
    G5,
}

impl Sound {
    /// Sample file backing this note.
    pub fn file_name(self) -> &'static str {
        match self {
            Sound::C5 => "Piano.mf.C5.aiff",
            Sound::D5 => "Piano.mf.D5.aiff",
            Sound::E5 => "Piano.mf.E5.aiff",
            Sound::F5 => "Piano.mf.F5.aiff",
            Sound::G5 => "Piano.mf.G5.aiff",
        }
    }
}

/// Text of at most [`ShortText::MAX_CHARS`] characters.
///
/// Every way of building one truncates, deserialization included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ShortText(String);

impl ShortText {
    pub const MAX_CHARS: usize = 16;

    pub fn new(text: impl AsRef<str>) -> Self {
        Self(text.as_ref().chars().take(Self::MAX_CHARS).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ShortText {
    fn from(text: String) -> Self {
        if text.chars().nth(Self::MAX_CHARS).is_none() {
            return Self(text);
        }
        Self::new(text)
    }
}

impl From<&str> for ShortText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<ShortText> for String {
    fn from(text: ShortText) -> Self {
        text.0
    }
}

impl fmt::Display for ShortText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Default payload carried by the bus.
///
/// Any `Clone + Send` type works as a payload; this is the closed set the
/// application ships with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    State(AppState),
    Math(MathOperation),
    Sound(Sound),
    Message(ShortText),
}

impl Payload {
    /// Build a `Message`, keeping at most [`ShortText::MAX_CHARS`] characters.
    pub fn message(text: impl AsRef<str>) -> Self {
        Payload::Message(ShortText::new(text))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::State(_) => "state",
            Payload::Math(_) => "math",
            Payload::Sound(_) => "sound",
            Payload::Message(_) => "message",
        }
    }
}
