//! Orchestrator: wires the stages together and runs the health reporter.
//!
//! # Start and stop order
//!
//! ```text
//! start:  ResultsWriter ─► BatchProcessor ─► ConnectionAcceptor ─► reporter
//! stop:   ConnectionAcceptor ─► BatchProcessor ─► ResultsWriter ─► reporter
//! ```
//!
//! Consumers start before producers, so nothing is published onto a bus that
//! has no one draining it.  Shutdown runs in the opposite direction: new input
//! stops first, then each stage is given `stop_timeout` to finish.  A stage
//! that overruns its timeout is logged and left behind; the rest of the
//! shutdown proceeds.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::application::batch_processor::{BatchProcessor, DetectionModel};
use crate::application::bus::{self, BusSender};
use crate::application::results_writer::{
    HandlerDepth, ResultsWriter, SinkError, SinkFactory, WriterProbe,
};
use crate::application::worker_gauge::WorkerGauge;
use crate::infrastructure::network::connection_acceptor::{
    AcceptorConfig, AcceptorError, ClientRegistry, ConnectionAcceptor,
};
use crate::infrastructure::storage::config::{ConfigError, ServerConfig};
use crate::infrastructure::telemetry::{MetricsProvider, ProcessMetrics};

/// How long the reporter waits for the writer to list its handlers.
const HANDLER_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Error type for starting the server.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to prepare output sinks: {0}")]
    Sinks(#[from] SinkError),
    #[error(transparent)]
    Acceptor(#[from] AcceptorError),
}

/// The pluggable collaborators the server runs with.
pub struct AppComponents {
    pub model: Arc<dyn DetectionModel>,
    pub sinks: Arc<dyn SinkFactory>,
    pub metrics: Box<dyn MetricsProvider>,
}

/// One health report line, as logged by the reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub connected_clients: usize,
    pub active_workers: usize,
    /// `None` when the metrics provider failed.
    pub process: Option<ProcessMetrics>,
    pub ingest_depth: usize,
    pub result_depth: usize,
    pub handlers: Vec<HandlerDepth>,
}

impl HealthReport {
    fn log(&self) {
        let process = match self.process {
            Some(m) => format!("cpu {:.1}% rss {:.1} MB", m.cpu_percent, m.rss_mb),
            None => "cpu n/a rss n/a".to_string(),
        };
        info!(
            "clients={} workers={} {} ingest_bus={} result_bus={}",
            self.connected_clients,
            self.active_workers,
            process,
            self.ingest_depth,
            self.result_depth
        );
        for handler in &self.handlers {
            info!(
                "  handler {} queue {}/{}",
                handler.address, handler.depth, handler.capacity
            );
        }
    }
}

/// A running server.
pub struct App {
    stop_timeout: Duration,
    local_addr: SocketAddr,
    acceptor: ConnectionAcceptor,
    processor: BatchProcessor,
    writer: ResultsWriter,
    probes: Probes,
    reporter_cancel: CancellationToken,
    reporter: JoinHandle<Box<dyn MetricsProvider>>,
    stopped: bool,
}

impl App {
    /// Validates `config`, then starts every stage in dependency order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the config is invalid, the sinks cannot be
    /// prepared, or the listening socket cannot be bound.  Stages already
    /// started are stopped again before returning.
    pub async fn start(
        config: &ServerConfig,
        components: AppComponents,
        span: Span,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let listen_addr = config.listen_addr()?;
        let stop_timeout = config.stop_timeout();
        let gauge = WorkerGauge::new();

        let (ingest_tx, ingest_rx) = bus::channel("ingest", config.pipeline.ingest_bus_capacity);
        let (result_tx, result_rx) = bus::channel("result", config.pipeline.result_bus_capacity);

        let mut writer = ResultsWriter::start(
            result_rx,
            components.sinks,
            config.writer_config(),
            gauge.clone(),
            info_span!(parent: &span, "writer"),
        )?;

        info!("using detection model '{}'", components.model.name());
        let mut processor = BatchProcessor::start(
            ingest_rx,
            result_tx.clone(),
            components.model,
            config.batch_config(),
            gauge.clone(),
            info_span!(parent: &span, "processor"),
        );

        let acceptor = match ConnectionAcceptor::start(
            AcceptorConfig {
                listen_addr,
                max_frame_bytes: config.server.max_frame_bytes,
            },
            ingest_tx.clone(),
            gauge.clone(),
            info_span!(parent: &span, "acceptor"),
        )
        .await
        {
            Ok(acceptor) => acceptor,
            Err(e) => {
                processor.stop();
                processor.join(stop_timeout).await;
                writer.stop();
                writer.join(stop_timeout).await;
                return Err(e.into());
            }
        };

        let probes = Probes {
            registry: acceptor.registry(),
            writer: writer.probe(),
            ingest: ingest_tx,
            results: result_tx,
            gauge: gauge.clone(),
        };
        let reporter_cancel = CancellationToken::new();
        let reporter = spawn_reporter(
            probes.clone(),
            components.metrics,
            config.report_interval(),
            reporter_cancel.clone(),
            info_span!(parent: &span, "reporter"),
        );

        Ok(Self {
            stop_timeout,
            local_addr: acceptor.local_addr(),
            acceptor,
            processor,
            writer,
            probes,
            reporter_cancel,
            reporter,
            stopped: false,
        })
    }

    /// The address cameras connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_workers(&self) -> usize {
        self.probes.gauge.active()
    }

    /// Collects a health report now, using `metrics` for the process line.
    pub async fn health_report(&self, metrics: &mut dyn MetricsProvider) -> HealthReport {
        self.probes.collect(metrics).await
    }

    /// Stops every stage in shutdown order.
    pub async fn stop(&mut self) {
        if self.stopped {
            warn!("called stop on already stopped server");
            return;
        }
        self.stopped = true;

        info!("stopping connection acceptor");
        self.acceptor.stop();
        self.acceptor.join(self.stop_timeout).await;

        info!("stopping batch processor");
        self.processor.stop();
        self.processor.join(self.stop_timeout).await;

        info!("stopping results writer");
        self.writer.stop();
        self.writer.join(self.stop_timeout).await;

        self.reporter_cancel.cancel();
        if tokio::time::timeout(self.stop_timeout, &mut self.reporter)
            .await
            .is_err()
        {
            error!("failed to stop health reporter in reasonable time");
        }
        info!("server stopped");
    }
}

/// Read-only handles the reporter samples.
#[derive(Clone)]
struct Probes {
    registry: ClientRegistry,
    writer: WriterProbe,
    ingest: BusSender,
    results: BusSender,
    gauge: WorkerGauge,
}

impl Probes {
    async fn collect(&self, metrics: &mut dyn MetricsProvider) -> HealthReport {
        let process = match metrics.sample() {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("{e}");
                None
            }
        };
        let handlers = tokio::time::timeout(HANDLER_QUERY_TIMEOUT, self.writer.handler_depths())
            .await
            .unwrap_or_default();

        HealthReport {
            connected_clients: self.registry.count().await,
            active_workers: self.gauge.active(),
            process,
            ingest_depth: self.ingest.depth(),
            result_depth: self.results.depth(),
            handlers,
        }
    }
}

/// Logs a [`HealthReport`] every `interval` until cancelled.
///
/// Hands the metrics provider back when it ends.
fn spawn_reporter(
    probes: Probes,
    mut metrics: Box<dyn MetricsProvider>,
    interval: Duration,
    cancel: CancellationToken,
    span: Span,
) -> JoinHandle<Box<dyn MetricsProvider>> {
    let guard = probes.gauge.enter();
    tokio::spawn(
        async move {
            let _guard = guard;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => probes.collect(metrics.as_mut()).await.log(),
                }
            }
            metrics
        }
        .instrument(span),
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
