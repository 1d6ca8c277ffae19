use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Identifies one ingestion unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    File,
    Stream,
    Partition(String),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::File => write!(f, "file"),
            SourceId::Stream => write!(f, "stream"),
            SourceId::Partition(partition) => write!(f, "partition {}", partition),
        }
    }
}

/// One message delivered by a queue: key/value metadata and an encoded body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueMessage {
    pub properties: HashMap<String, Value>,
    pub body: Vec<u8>,
}

impl QueueMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            properties: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A raw payload pulled from a source, before any parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The source has nothing to show right now.
    Idle,
    /// One complete XML document.
    Document(String),
    /// A queue message that may or may not be meant for us.
    Message(QueueMessage),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("queue error: {0}")]
    Queue(String),
}

/// Something that produces documents until it ends or the process is cancelled.
#[async_trait]
pub trait EventSource: Send {
    fn id(&self) -> SourceId;

    /// Wait for the next batch of payloads.
    ///
    /// `Ok(None)` means the source ended cleanly. An empty batch means a poll cycle passed
    /// without anything arriving. After an error the next call starts over, reconnecting if
    /// the source is connection based. Implementations must be cancel safe.
    async fn next_batch(&mut self) -> Result<Option<Vec<Inbound>>, SourceError>;
}
