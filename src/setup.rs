//! Setup pipeline.
//!
//! Brings a discovered peripheral from connect to streaming readings by
//! running a fixed list of steps in order:
//!
//! 1. connect
//! 2. seven device info reads (only with `read_info`)
//! 3. enable the sensor, then wait for it to settle (only with `enable_sensor`)
//! 4. arm notifications: register the reading callback, set the period,
//!    enable notifications
//!
//! A failing step aborts the rest. Info reads are the exception: their
//! failures are logged and the pipeline moves on. Every driver call is
//! bounded by the configured operation timeout.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::data::InfoField;
use crate::error::{Error, Result};
use crate::forwarder::EventForwarder;
use crate::handle::PeripheralHandle;

/// One unit of work in the setup pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStep {
    /// Establish the session.
    Connect,
    /// Read one device information attribute.
    ReadInfo(InfoField),
    /// Power up the thermal sensor.
    EnableSensor,
    /// Wait for the sensor to warm up.
    SettleDelay,
    /// Register the reading callback, set the period, enable notifications.
    ArmNotifications,
}

impl std::fmt::Display for SetupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::ReadInfo(field) => write!(f, "read {}", field),
            Self::EnableSensor => write!(f, "enable sensor"),
            Self::SettleDelay => write!(f, "settle delay"),
            Self::ArmNotifications => write!(f, "arm notifications"),
        }
    }
}

/// What a successful pipeline run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    /// Steps that ran, in order.
    pub completed: Vec<SetupStep>,
    /// Info reads that failed and were skipped.
    pub failed_info_reads: Vec<InfoField>,
}

/// Runs the setup steps against a peripheral handle.
#[derive(Clone)]
pub struct SetupPipeline {
    config: Arc<BridgeConfig>,
    forwarder: Arc<EventForwarder>,
}

impl SetupPipeline {
    /// Create a pipeline that hands readings to `forwarder`.
    pub fn new(config: Arc<BridgeConfig>, forwarder: Arc<EventForwarder>) -> Self {
        Self { config, forwarder }
    }

    /// The ordered step list for the configuration.
    ///
    /// Info reads are skipped as a block, and so are the sensor enable and
    /// its settle delay.
    pub fn steps(&self) -> Vec<SetupStep> {
        let mut steps = vec![SetupStep::Connect];

        if self.config.read_info {
            steps.extend(InfoField::ALL.iter().map(|f| SetupStep::ReadInfo(*f)));
        }

        if self.config.enable_sensor {
            steps.push(SetupStep::EnableSensor);
            steps.push(SetupStep::SettleDelay);
        }

        steps.push(SetupStep::ArmNotifications);
        steps
    }

    /// Run every step against `handle`.
    ///
    /// On success the handle is `Ready` and readings flow to the forwarder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SetupStep`] naming the step that failed. If the
    /// handle's session ended while the pipeline was running the source is
    /// [`Error::ConnectionLost`] and the handle is left as it is.
    pub async fn run(&self, handle: &PeripheralHandle) -> Result<SetupReport> {
        let id = handle.id();
        let mut report = SetupReport::default();

        if !handle.begin_setup() {
            return Err(Error::SetupStep {
                step: SetupStep::Connect,
                source: Box::new(Error::ConnectionLost),
            });
        }

        for step in self.steps() {
            if handle.is_ended() {
                debug!("Session with {} ended, abandoning setup before {}", id, step);
                return Err(Error::SetupStep {
                    step,
                    source: Box::new(Error::ConnectionLost),
                });
            }

            info!("{}: {}", id, step);

            match self.run_step(step, handle).await {
                Ok(()) => report.completed.push(step),
                Err(e) => match step {
                    SetupStep::ReadInfo(field) => {
                        warn!("{}: failed to read {}: {}", id, field, e);
                        report.failed_info_reads.push(field);
                    }
                    _ => {
                        error!("{}: {} failed: {}", id, step, e);
                        return Err(Error::SetupStep {
                            step,
                            source: Box::new(e),
                        });
                    }
                },
            }
        }

        if !handle.mark_ready() {
            debug!("Session with {} ended before setup completed", id);
            return Err(Error::SetupStep {
                step: SetupStep::ArmNotifications,
                source: Box::new(Error::ConnectionLost),
            });
        }

        info!("{} ready, notifying every {:?}", id, self.config.notify_period);

        Ok(report)
    }

    async fn run_step(&self, step: SetupStep, handle: &PeripheralHandle) -> Result<()> {
        let peripheral = handle.peripheral();

        match step {
            SetupStep::Connect => {
                self.call("connect", peripheral.connect_and_set_up()).await
            }
            SetupStep::ReadInfo(field) => {
                let value = self.call(field.label(), peripheral.read_info(field)).await?;
                info!("\t{} = {}", field, value);
                handle.set_info(field, value);
                Ok(())
            }
            SetupStep::EnableSensor => {
                self.call("enable sensor", peripheral.enable_ir_temperature())
                    .await
            }
            SetupStep::SettleDelay => {
                debug!("Waiting {:?} for the sensor to settle", self.config.settle_delay);
                tokio::time::sleep(self.config.settle_delay).await;
                Ok(())
            }
            SetupStep::ArmNotifications => {
                handle.set_reading_callback(self.forwarder.attach(peripheral.as_ref()));

                self.call(
                    "set notification period",
                    peripheral.set_ir_temperature_period(self.config.notify_period),
                )
                .await?;

                self.call("enable notifications", peripheral.notify_ir_temperature())
                    .await
            }
        }
    }

    /// Bound one driver call by the operation timeout.
    async fn call<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
            }),
        }
    }
}
