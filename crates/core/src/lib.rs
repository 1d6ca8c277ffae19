pub use config::{ConfigError, ConfigManager, ConfigSchema};
pub use ingest::{
    AcquirePolicy, ChannelQueue, EventSource, FileSource, HttpConnector, Inbound, IngestStats,
    IngestionLoop, IngestionManager, LoopOptions, QueueMessage, QueueSource, SharedRegister,
    SourceError, SourceId, StreamSource,
};
pub use register::{
    Level, PinConfig, PinController, ProtocolError, PulseTiming, RegisterDriver, SimulatedBoard,
    StdDelay,
};
pub use scheduler::{ShowReport, ShowScheduler};
pub use settings::{Settings, SourceKind};
pub use show::{DynamicRange, ParseError, Show, ShowParser, ShowPayload, ShowSet};

mod config;
pub mod ingest;
pub mod register;
mod scheduler;
mod settings;
pub mod show;
