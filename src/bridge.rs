//! Lifecycle controller.
//!
//! [`Bridge`] ties the broadcast server, the event forwarder and the
//! session supervisor together and runs until it is told to stop. A
//! client connection is the only thing that starts a peripheral session.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::forwarder::EventForwarder;
use crate::ipc::{IpcServer, ServerEvent};
use crate::peripheral::PeripheralDriver;
use crate::supervisor::SessionSupervisor;

/// Why the bridge stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Interrupt signal (Ctrl-C).
    Interrupt,
    /// Termination signal.
    Terminate,
    /// Unrecovered fault somewhere in the process.
    Fault(String),
}

impl ShutdownReason {
    /// Check if the bridge stopped because something went wrong.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "interrupted"),
            Self::Terminate => write!(f, "terminated"),
            Self::Fault(msg) => write!(f, "fault: {}", msg),
        }
    }
}

/// The bridge process.
pub struct Bridge {
    config: Arc<BridgeConfig>,
    driver: Arc<dyn PeripheralDriver>,
}

impl Bridge {
    /// Create a bridge that discovers peripherals through `driver`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter)
    /// if the configuration is invalid.
    pub fn new(config: BridgeConfig, driver: Arc<dyn PeripheralDriver>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            driver,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Serve clients until `shutdown` resolves.
    ///
    /// A socket that cannot be bound is logged and retried until it binds
    /// or `shutdown` resolves. The socket is closed and the current
    /// peripheral disconnected before this returns.
    pub async fn run<F>(&self, shutdown: F) -> ShutdownReason
    where
        F: Future<Output = ShutdownReason>,
    {
        tokio::pin!(shutdown);

        let mut failed_binds = 0u32;
        let server = loop {
            match IpcServer::bind(&self.config.socket_path).await {
                Ok(server) => break Arc::new(server),
                Err(e) => {
                    failed_binds += 1;
                    if failed_binds == 1 {
                        error!("{}; retrying every {:?}", e, self.config.bind_retry_delay);
                    } else {
                        debug!("Bind attempt {} failed: {}", failed_binds, e);
                    }

                    tokio::select! {
                        reason = &mut shutdown => {
                            info!("Shutting down before the socket was bound: {}", reason);
                            return reason;
                        }
                        _ = tokio::time::sleep(self.config.bind_retry_delay) => {}
                    }
                }
            }
        };
        let mut events = server.subscribe();

        let forwarder = Arc::new(EventForwarder::new(server.clone()));
        let supervisor =
            SessionSupervisor::new(self.driver.clone(), self.config.clone(), forwarder);

        let reason = loop {
            tokio::select! {
                reason = &mut shutdown => break reason,
                event = events.recv() => match event {
                    Ok(event) => handle_server_event(&supervisor, event),
                    Err(RecvError::Lagged(skipped)) => {
                        recover_from_lag(&supervisor, server.client_count(), skipped);
                    }
                    Err(RecvError::Closed) => {
                        break ShutdownReason::Fault("server event stream closed".to_string());
                    }
                },
            }
        };

        match &reason {
            ShutdownReason::Fault(_) => error!("Shutting down: {}", reason),
            _ => info!("Shutting down: {}", reason),
        }

        server.shutdown();
        supervisor.shutdown().await;

        reason
    }
}

/// Skipped server events may include client connections, which are the
/// only thing that starts a session.
fn recover_from_lag(supervisor: &SessionSupervisor, clients: usize, skipped: u64) {
    warn!("Server event stream lagged, {} events skipped", skipped);
    if clients > 0 && supervisor.ensure_session() {
        debug!("Started a session for {} clients after lag", clients);
    }
}

fn handle_server_event(supervisor: &SessionSupervisor, event: ServerEvent) {
    match event {
        ServerEvent::Connected(client) => {
            info!("client connected: {}", client);
            if supervisor.ensure_session() {
                debug!("{} started a new session", client);
            }
        }
        ServerEvent::Disconnected(client) => {
            info!("client disconnected: {}", client);
        }
        ServerEvent::Data { client, data } => {
            info!("{} sent: {}", client, String::from_utf8_lossy(&data).trim_end());
        }
        ServerEvent::Error(msg) => {
            warn!("Transport error: {}", msg);
        }
    }
}

/// Resolve on Ctrl-C, SIGTERM or the first reported fault.
pub async fn shutdown_signal(mut faults: mpsc::UnboundedReceiver<String>) -> ShutdownReason {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => ShutdownReason::Interrupt,
            Err(e) => ShutdownReason::Fault(format!("listening for Ctrl-C: {}", e)),
        }
    };

    let terminate = async {
        match signal::unix::signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                ShutdownReason::Terminate
            }
            Err(e) => ShutdownReason::Fault(format!("listening for SIGTERM: {}", e)),
        }
    };

    let fault = async {
        match faults.recv().await {
            Some(msg) => ShutdownReason::Fault(msg),
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        reason = ctrl_c => reason,
        reason = terminate => reason,
        reason = fault => reason,
    }
}

/// Report every panic as a fault on `faults`.
///
/// The previous panic hook still runs first.
pub fn report_panics(faults: mpsc::UnboundedSender<String>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        previous(panic_info);
        let _ = faults.send(panic_info.to_string());
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::supervisor::SupervisorState;
    use crate::testing::{test_config, FakeDriver, FakePeripheral, RecordingSink};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixStream;
    use tokio::sync::oneshot;

    async fn read_line(reader: &mut BufReader<UnixStream>) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("timed out reading a line")
            .unwrap();
        line
    }

    async fn connect(path: &std::path::Path) -> BufReader<UnixStream> {
        for _ in 0..100 {
            if let Ok(stream) = UnixStream::connect(path).await {
                return BufReader::new(stream);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bridge never listened on {}", path.display());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BridgeConfig {
            notify_period: Duration::from_millis(5000),
            ..test_config()
        };

        let result = Bridge::new(config, Arc::new(FakeDriver::new()));
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[tokio::test]
    async fn test_bind_failure_is_not_fatal() {
        let dir = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        let config = BridgeConfig {
            socket_path: dir.join("bridge.sock"),
            ..test_config()
        };
        let driver = Arc::new(FakeDriver::new());
        let bridge = Bridge::new(config, driver.clone()).unwrap();

        let reason = bridge
            .run(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                ShutdownReason::Terminate
            })
            .await;

        assert_eq!(reason, ShutdownReason::Terminate);
        assert_eq!(driver.discover_calls(), 0);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_bind_is_retried_until_it_succeeds() {
        let dir = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        let config = BridgeConfig {
            read_info: false,
            enable_sensor: false,
            socket_path: dir.join("bridge.sock"),
            ..test_config()
        };
        let path = config.socket_path.clone();
        let driver = Arc::new(FakeDriver::new());
        let tag = Arc::new(FakePeripheral::new("tag-1"));
        driver.offer(tag.clone());

        let bridge = Bridge::new(config, driver.clone()).unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            bridge
                .run(async move {
                    let _ = stop_rx.await;
                    ShutdownReason::Interrupt
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!run.is_finished());
        std::fs::create_dir_all(&dir).unwrap();

        let mut client = connect(&path).await;
        tag.wait_for_call("notify_ir_temperature").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        tag.emit_reading(21.5, 20.0);
        assert_eq!(read_line(&mut client).await, "object_temperature:21.5\n");

        stop_tx.send(()).unwrap();
        assert_eq!(run.await.unwrap(), ShutdownReason::Interrupt);
        assert!(!path.exists());
        let _ = std::fs::remove_dir(&dir);
    }

    #[tokio::test]
    async fn test_lag_with_clients_starts_a_session() {
        let config = Arc::new(BridgeConfig {
            read_info: false,
            enable_sensor: false,
            ..test_config()
        });
        let driver = Arc::new(FakeDriver::new());
        driver.offer(Arc::new(FakePeripheral::new("tag-1")));
        let sink = Arc::new(RecordingSink::with_clients(1));
        let supervisor = SessionSupervisor::new(
            driver.clone(),
            config,
            Arc::new(EventForwarder::new(sink)),
        );

        recover_from_lag(&supervisor, 0, 4);
        assert_eq!(supervisor.state(), SupervisorState::Idle);

        recover_from_lag(&supervisor, 2, 4);
        assert_ne!(supervisor.state(), SupervisorState::Idle);

        let mut state = supervisor.subscribe_state();
        let ready = state.wait_for(|s| *s == SupervisorState::Ready);
        tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(2), ready)
            .await
            .expect("session never became ready"));
        assert_eq!(driver.discover_calls(), 1);
    }

    #[tokio::test]
    async fn test_two_clients_receive_the_same_reading() {
        let config = BridgeConfig {
            read_info: false,
            enable_sensor: false,
            ..test_config()
        };
        let path = config.socket_path.clone();
        let driver = Arc::new(FakeDriver::new());
        let tag = Arc::new(FakePeripheral::new("tag-1"));
        driver.offer(tag.clone());

        let bridge = Bridge::new(config, driver.clone()).unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            bridge
                .run(async move {
                    let _ = stop_rx.await;
                    ShutdownReason::Interrupt
                })
                .await
        });

        let mut first = connect(&path).await;
        let mut second = connect(&path).await;

        tag.wait_for_call("notify_ir_temperature").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        tag.emit_reading(36.2, 25.0);

        for client in [&mut first, &mut second] {
            assert_eq!(read_line(client).await, "object_temperature:36.2\n");
            assert_eq!(read_line(client).await, "ambient_temperature:25.0\n");
        }

        // The second client joined the existing session.
        assert_eq!(driver.discover_calls(), 1);

        stop_tx.send(()).unwrap();
        let reason = run.await.unwrap();

        assert_eq!(reason, ShutdownReason::Interrupt);
        assert!(!path.exists());
        assert_eq!(tag.calls().last().map(String::as_str), Some("disconnect"));
    }

    #[tokio::test]
    async fn test_no_discovery_before_a_client_connects() {
        let config = test_config();
        let path = config.socket_path.clone();
        let driver = Arc::new(FakeDriver::new());
        let bridge = Bridge::new(config, driver.clone()).unwrap();

        let reason = bridge
            .run(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ShutdownReason::Terminate
            })
            .await;

        assert_eq!(reason, ShutdownReason::Terminate);
        assert_eq!(driver.discover_calls(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_reported_fault_stops_the_bridge() {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        fault_tx.send("boom".to_string()).unwrap();

        let reason = shutdown_signal(fault_rx).await;
        assert_eq!(reason, ShutdownReason::Fault("boom".to_string()));
        assert!(reason.is_fault());
    }

    #[test]
    fn test_shutdown_reason_display() {
        assert_eq!(ShutdownReason::Interrupt.to_string(), "interrupted");
        assert_eq!(
            ShutdownReason::Fault("setup".to_string()).to_string(),
            "fault: setup"
        );
    }
}
