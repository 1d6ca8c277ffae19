use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::traits::{EventSource, Inbound, SourceError, SourceId};

/// Plays a single show file once, then ends.
pub struct FileSource {
    path: PathBuf,
    delivered: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delivered: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSource for FileSource {
    fn id(&self) -> SourceId {
        SourceId::File
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Inbound>>, SourceError> {
        if self.delivered {
            return Ok(None);
        }
        log::info!("Loading show file {}", self.path.display());
        let text = tokio::fs::read_to_string(&self.path).await?;
        self.delivered = true;
        Ok(Some(vec![Inbound::Document(text)]))
    }
}
