pub mod file;
pub mod ingest_loop;
pub mod manager;
pub mod queue;
pub mod stream;
pub mod traits;

pub use file::FileSource;
pub use ingest_loop::{
    clear_and_release, open_persistent, shared_register, AcquirePolicy, IngestStats,
    IngestionLoop, LoopOptions, SharedRegister,
};
pub use manager::IngestionManager;
pub use queue::{
    decode_body, is_relevant, ChannelQueue, MessageQueue, QueueSource, MAX_BATCH, RELEVANCE_KEY,
};
pub use stream::{classify_line, Connector, HttpConnector, HttpReader, StreamSource};
pub use traits::{EventSource, Inbound, QueueMessage, SourceError, SourceId};
