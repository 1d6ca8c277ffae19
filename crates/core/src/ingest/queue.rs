//! Message-queue ingestion, one unit per partition.
//!
//! Only messages whose metadata carries the relevance key with a true value are meant for
//! the flasher. Their body is a UTF-8 JSON encoding of the show document.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use super::traits::{EventSource, Inbound, QueueMessage, SourceError, SourceId};
use crate::show::{Document, DocumentError};

pub const RELEVANCE_KEY: &str = "iot-pattern-flasher";

/// Messages requested per receive call.
pub const MAX_BATCH: usize = 100;

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn partitions(&self) -> Result<Vec<String>, SourceError>;

    /// Wait up to one poll cycle for messages on `partition`.
    ///
    /// Returns an empty batch when the cycle passes without messages and `None` once the
    /// partition is closed.
    async fn receive(
        &self,
        partition: &str,
        max_messages: usize,
    ) -> Result<Option<Vec<QueueMessage>>, SourceError>;
}

pub struct QueueSource {
    queue: Arc<dyn MessageQueue>,
    partition: String,
    max_batch: usize,
}

impl QueueSource {
    pub fn new(queue: Arc<dyn MessageQueue>, partition: impl Into<String>) -> Self {
        Self {
            queue,
            partition: partition.into(),
            max_batch: MAX_BATCH,
        }
    }

    /// One source per partition the queue reports.
    pub async fn for_all_partitions(
        queue: Arc<dyn MessageQueue>,
    ) -> Result<Vec<QueueSource>, SourceError> {
        let partitions = queue.partitions().await?;
        Ok(partitions
            .into_iter()
            .map(|partition| {
                log::info!("Create receiver on partition: {}", partition);
                QueueSource::new(Arc::clone(&queue), partition)
            })
            .collect())
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }
}

#[async_trait]
impl EventSource for QueueSource {
    fn id(&self) -> SourceId {
        SourceId::Partition(self.partition.clone())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Inbound>>, SourceError> {
        log::trace!("Listening for messages on: {}", self.partition);
        let messages = self.queue.receive(&self.partition, self.max_batch).await?;
        Ok(messages.map(|messages| {
            if !messages.is_empty() {
                log::debug!(
                    "{} message(s) received on partition {}",
                    messages.len(),
                    self.partition
                );
            }
            messages.into_iter().map(Inbound::Message).collect()
        }))
    }
}

/// Whether `message` carries `key` with a value that reads as `true`.
pub fn is_relevant(message: &QueueMessage, key: &str) -> bool {
    message
        .properties
        .get(key)
        .and_then(as_bool)
        .unwrap_or(false)
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

pub fn decode_body(message: &QueueMessage) -> Result<Document, DocumentError> {
    let text =
        std::str::from_utf8(&message.body).map_err(|e| DocumentError::Json(e.to_string()))?;
    Document::from_json(text)
}

/// In-process queue with one channel per partition.
pub struct ChannelQueue {
    partitions: Vec<String>,
    receivers: HashMap<String, Mutex<mpsc::Receiver<QueueMessage>>>,
    senders: parking_lot::Mutex<HashMap<String, mpsc::Sender<QueueMessage>>>,
    poll_interval: Duration,
}

impl ChannelQueue {
    pub fn new(partitions: &[&str], poll_interval: Duration) -> Self {
        let mut receivers = HashMap::new();
        let mut senders = HashMap::new();
        for partition in partitions {
            let (tx, rx) = mpsc::channel(1000);
            receivers.insert(partition.to_string(), Mutex::new(rx));
            senders.insert(partition.to_string(), tx);
        }

        Self {
            partitions: partitions.iter().map(|p| p.to_string()).collect(),
            receivers,
            senders: parking_lot::Mutex::new(senders),
            poll_interval,
        }
    }

    /// A handle for publishing into `partition`.
    pub fn publisher(&self, partition: &str) -> Option<mpsc::Sender<QueueMessage>> {
        self.senders.lock().get(partition).cloned()
    }

    /// Close every partition once outstanding publishers are dropped.
    pub fn close(&self) {
        self.senders.lock().clear();
    }
}

#[async_trait]
impl MessageQueue for ChannelQueue {
    async fn partitions(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.partitions.clone())
    }

    async fn receive(
        &self,
        partition: &str,
        max_messages: usize,
    ) -> Result<Option<Vec<QueueMessage>>, SourceError> {
        let receiver = self
            .receivers
            .get(partition)
            .ok_or_else(|| SourceError::Queue(format!("unknown partition {}", partition)))?;
        let mut receiver = receiver.lock().await;

        let first = match tokio::time::timeout(self.poll_interval, receiver.recv()).await {
            Err(_) => return Ok(Some(Vec::new())),
            Ok(None) => return Ok(None),
            Ok(Some(message)) => message,
        };

        let mut batch = vec![first];
        while batch.len() < max_messages {
            match receiver.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_flag_values() {
        let message = |value: Value| QueueMessage::new("{}").with_property(RELEVANCE_KEY, value);

        assert!(is_relevant(&message(Value::Bool(true)), RELEVANCE_KEY));
        assert!(is_relevant(&message("True".into()), RELEVANCE_KEY));
        assert!(is_relevant(&message(1.into()), RELEVANCE_KEY));
        assert!(!is_relevant(&message("false".into()), RELEVANCE_KEY));
        assert!(!is_relevant(&message("yes".into()), RELEVANCE_KEY));
        assert!(!is_relevant(&message(Value::Null), RELEVANCE_KEY));
        assert!(!is_relevant(&QueueMessage::new("{}"), RELEVANCE_KEY));
        assert!(!is_relevant(
            &QueueMessage::new("{}").with_property("other", true),
            RELEVANCE_KEY
        ));
    }

    #[test]
    fn test_decode_body() {
        let ok = QueueMessage::new(r#"{"lightShow":{"shows":null}}"#);
        assert_eq!(decode_body(&ok).unwrap().root.name, "lightShow");

        let not_utf8 = QueueMessage::new(vec![0xFF, 0xFE]);
        assert!(matches!(decode_body(&not_utf8), Err(DocumentError::Json(_))));
    }

    #[tokio::test]
    async fn test_channel_queue_batches_and_closes() {
        let queue = ChannelQueue::new(&["0", "1"], Duration::from_millis(20));
        let publisher = queue.publisher("0").unwrap();
        for i in 0..3u8 {
            publisher.send(QueueMessage::new(vec![i])).await.unwrap();
        }

        let batch = queue.receive("0", 2).await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        let batch = queue.receive("0", 2).await.unwrap().unwrap();
        assert_eq!(batch, vec![QueueMessage::new(vec![2])]);

        assert_eq!(queue.receive("1", 10).await.unwrap(), Some(Vec::new()));
        assert!(queue.receive("9", 10).await.is_err());

        drop(publisher);
        queue.close();
        assert_eq!(queue.receive("0", 10).await.unwrap(), None);
    }
}
