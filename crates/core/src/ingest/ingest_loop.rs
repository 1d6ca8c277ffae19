use std::sync::Arc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::queue::{decode_body, is_relevant, RELEVANCE_KEY};
use super::traits::{EventSource, Inbound, QueueMessage, SourceId};
use crate::register::{PinController, ProtocolError, RegisterDriver};
use crate::scheduler::{ShowReport, ShowScheduler};
use crate::show::{ParseError, ShowParser, ShowSet};

/// The register shared by every ingestion unit. Holding the lock is the right to write.
pub type SharedRegister<P, D> = Arc<Mutex<RegisterDriver<P, D>>>;

pub fn shared_register<P, D>(driver: RegisterDriver<P, D>) -> SharedRegister<P, D>
where
    P: PinController,
    D: DelayNs,
{
    Arc::new(Mutex::new(driver))
}

/// When the register lines are held open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirePolicy {
    /// Open the lines for each document and release them straight after.
    PerDocument,
    /// The lines are opened once at startup and released at shutdown.
    Persistent,
}

#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub policy: AcquirePolicy,
    pub relevance_key: String,
    pub retry_interval: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            policy: AcquirePolicy::PerDocument,
            relevance_key: RELEVANCE_KEY.to_string(),
            retry_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: u64,
    pub parse_attempts: u64,
    pub parse_failures: u64,
    pub idle_signals: u64,
    pub ignored_messages: u64,
    pub decode_failures: u64,
    pub shows_run: u64,
    pub register_writes: u64,
    pub protocol_failures: u64,
    pub source_failures: u64,
}

/// One ingestion unit: pulls payloads from a source and plays what they describe.
///
/// Failures tied to one document or message are logged and counted, never fatal. Source
/// failures are retried after `retry_interval` for as long as the unit runs. Cancellation
/// is only observed between payloads, so a show that has started always finishes.
pub struct IngestionLoop<P: PinController, D: DelayNs> {
    source: Box<dyn EventSource>,
    register: SharedRegister<P, D>,
    options: LoopOptions,
    parser: ShowParser,
    scheduler: ShowScheduler,
    stats: IngestStats,
}

impl<P, D> IngestionLoop<P, D>
where
    P: PinController + 'static,
    D: DelayNs + Send + 'static,
{
    pub fn new(
        source: Box<dyn EventSource>,
        register: SharedRegister<P, D>,
        options: LoopOptions,
    ) -> Self {
        Self {
            source,
            register,
            options,
            parser: ShowParser::new(),
            scheduler: ShowScheduler::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn id(&self) -> SourceId {
        self.source.id()
    }

    pub async fn run(mut self, cancel: CancellationToken) -> IngestStats {
        let id = self.source.id();
        log::info!("Listening for documents on {}", id);

        'outer: loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                batch = self.source.next_batch() => batch,
            };

            match batch {
                Ok(Some(items)) => {
                    for item in items {
                        if cancel.is_cancelled() {
                            break 'outer;
                        }
                        self.handle(item).await;
                    }
                }
                Ok(None) => {
                    log::info!("Source {} ended", id);
                    break;
                }
                Err(e) => {
                    self.stats.source_failures += 1;
                    log::warn!("Listener exception on {}: {}", id, e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.options.retry_interval) => {}
                    }
                }
            }
        }

        log::info!("Listener on {} stopped", id);
        self.stats
    }

    async fn handle(&mut self, item: Inbound) {
        match item {
            Inbound::Idle => {
                self.stats.idle_signals += 1;
                log::trace!("Empty data");
                self.clear().await;
            }
            Inbound::Document(text) => {
                self.stats.documents += 1;
                let parsed = self.parse(|parser| parser.parse_xml(&text));
                if let Some(shows) = parsed {
                    self.play(shows).await;
                }
            }
            Inbound::Message(message) => self.handle_message(message).await,
        }
    }

    async fn handle_message(&mut self, message: QueueMessage) {
        if !is_relevant(&message, &self.options.relevance_key) {
            self.stats.ignored_messages += 1;
            log::trace!("Ignoring message without {}", self.options.relevance_key);
            return;
        }
        log::debug!("Message for {} detected", self.options.relevance_key);

        let document = match decode_body(&message) {
            Ok(document) => document,
            Err(e) => {
                self.stats.decode_failures += 1;
                log::warn!("Error decoding message body: {}", e);
                return;
            }
        };

        self.stats.documents += 1;
        if let Some(shows) = self.parse(|parser| parser.parse(&document)) {
            self.play(shows).await;
        }
    }

    fn parse<F>(&mut self, parse: F) -> Option<ShowSet>
    where
        F: FnOnce(&ShowParser) -> Result<ShowSet, ParseError>,
    {
        self.stats.parse_attempts += 1;
        match parse(&self.parser) {
            Ok(shows) => {
                log::info!("Loaded {} show(s)", shows.len());
                Some(shows)
            }
            Err(e) => {
                self.stats.parse_failures += 1;
                log::warn!("Error parsing show document: {}", e);
                None
            }
        }
    }

    async fn play(&mut self, shows: ShowSet) {
        let register = Arc::clone(&self.register);
        let policy = self.options.policy;
        let scheduler = self.scheduler;

        let outcome = tokio::task::spawn_blocking(move || -> Result<Vec<ShowReport>, ProtocolError> {
            let mut driver = register.lock();
            let reports = match policy {
                AcquirePolicy::PerDocument => {
                    let mut session = driver.session()?;
                    session.clear_register()?;
                    scheduler.run_all(&mut *session, &shows)
                }
                AcquirePolicy::Persistent => scheduler.run_all(&mut *driver, &shows),
            };
            reports
        })
        .await;

        match outcome {
            Ok(Ok(reports)) => {
                self.stats.shows_run += reports.len() as u64;
                self.stats.register_writes += reports.iter().map(|r| r.writes as u64).sum::<u64>();
            }
            Ok(Err(e)) => {
                self.stats.protocol_failures += 1;
                log::error!("Show aborted: {}", e);
            }
            Err(e) => {
                self.stats.protocol_failures += 1;
                log::error!("Show task failed: {}", e);
            }
        }
    }

    async fn clear(&mut self) {
        let register = Arc::clone(&self.register);
        let policy = self.options.policy;

        let outcome = tokio::task::spawn_blocking(move || -> Result<(), ProtocolError> {
            let mut driver = register.lock();
            let result = match policy {
                AcquirePolicy::PerDocument => {
                    let mut session = driver.session()?;
                    session.clear_register()
                }
                AcquirePolicy::Persistent => driver.clear_register(),
            };
            result
        })
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stats.protocol_failures += 1;
                log::error!("Failed to clear register: {}", e);
            }
            Err(e) => {
                self.stats.protocol_failures += 1;
                log::error!("Clear task failed: {}", e);
            }
        }
    }
}
