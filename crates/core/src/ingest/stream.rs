//! Line-oriented controller stream.
//!
//! The web controller pushes one XML document per line and sends an empty line when there is
//! nothing to show. Server-sent-event framing is tolerated: a `data:` prefix is stripped,
//! comment lines and the other SSE fields are skipped.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::io::StreamReader;

use super::traits::{EventSource, Inbound, SourceError, SourceId};

const IGNORED_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Opens a fresh connection to the controller.
#[async_trait]
pub trait Connector: Send + Sync {
    type Reader: AsyncBufRead + Unpin + Send;

    fn describe(&self) -> String;

    async fn connect(&self) -> Result<Self::Reader, SourceError>;
}

pub type HttpReader = StreamReader<BoxStream<'static, std::io::Result<Bytes>>, Bytes>;

pub struct HttpConnector {
    client: Client,
    url: Url,
}

impl HttpConnector {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    /// Build the events URL from the controller base URL and the events path.
    pub fn from_base(base: &str, events_path: &str) -> Result<Self, SourceError> {
        let base = Url::parse(base).map_err(|e| SourceError::Connection(e.to_string()))?;
        let url = base
            .join(events_path)
            .map_err(|e| SourceError::Connection(e.to_string()))?;
        Ok(Self::new(url))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for HttpConnector {
    type Reader = HttpReader;

    fn describe(&self) -> String {
        self.url.to_string()
    }

    async fn connect(&self) -> Result<Self::Reader, SourceError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let body = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();
        Ok(StreamReader::new(body))
    }
}

pub struct StreamSource<C: Connector> {
    connector: C,
    lines: Option<Lines<C::Reader>>,
}

impl<C: Connector> StreamSource<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            lines: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lines.is_some()
    }
}

#[async_trait]
impl<C: Connector> EventSource for StreamSource<C> {
    fn id(&self) -> SourceId {
        SourceId::Stream
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Inbound>>, SourceError> {
        if self.lines.is_none() {
            log::info!("Connecting to {}", self.connector.describe());
            let reader = self.connector.connect().await?;
            self.lines = Some(reader.lines());
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(Some(Vec::new()));
        };

        match lines.next_line().await {
            Ok(Some(line)) => {
                log::trace!("Received data");
                Ok(Some(classify_line(&line).into_iter().collect()))
            }
            Ok(None) => {
                log::info!("Response stream ended.");
                self.lines = None;
                Ok(None)
            }
            Err(e) => {
                self.lines = None;
                Err(SourceError::Io(e))
            }
        }
    }
}

/// Map one line of the stream to a payload. `None` for lines that carry no data.
pub fn classify_line(line: &str) -> Option<Inbound> {
    if line.trim().is_empty() {
        return Some(Inbound::Idle);
    }
    if line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.trim().is_empty() {
            return Some(Inbound::Idle);
        }
        return Some(Inbound::Document(data.to_string()));
    }
    if IGNORED_FIELDS.iter().any(|field| line.starts_with(field)) {
        return None;
    }
    Some(Inbound::Document(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line(""), Some(Inbound::Idle));
        assert_eq!(classify_line("  "), Some(Inbound::Idle));
        assert_eq!(classify_line("data:"), Some(Inbound::Idle));
        assert_eq!(classify_line(": keep-alive"), None);
        assert_eq!(classify_line("event: lightshow"), None);
        assert_eq!(classify_line("retry: 1000"), None);
        assert_eq!(
            classify_line("data: <lightShow/>"),
            Some(Inbound::Document("<lightShow/>".to_string()))
        );
        assert_eq!(
            classify_line("<lightShow><shows/></lightShow>"),
            Some(Inbound::Document("<lightShow><shows/></lightShow>".to_string()))
        );
    }

    #[test]
    fn test_events_url() {
        let connector =
            HttpConnector::from_base("https://ve8tn.sse.codesandbox.io/", "events").unwrap();
        assert_eq!(
            connector.url().as_str(),
            "https://ve8tn.sse.codesandbox.io/events"
        );
        assert!(HttpConnector::from_base("not a url", "events").is_err());
    }
}
