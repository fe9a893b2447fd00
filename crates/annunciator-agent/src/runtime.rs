//! Runtime assembly.
//!
//! [`Annunciator`] builds the lease, arbiter, recovery coordinator, poller
//! and client server from an [`AnnunciatorConfig`] and owns the task
//! registry they run under.

use std::sync::Arc;
use std::time::Duration;

use annunciator_core::effects::{IntercomEffects, SignEffects};
use annunciator_core::{DisplaySnapshot, Result};
use annunciator_effects::{BridgeLink, LoggingPanelBus, SignDriver, TcpIntercomHandler};
use tokio::net::TcpListener;
use tracing::info;

use crate::arbiter::{ArbiterSettings, DisplayArbiter};
use crate::config::AnnunciatorConfig;
use crate::lease::{LeaseConfig, SignLease};
use crate::poller::UpstreamPoller;
use crate::recovery::PowerCycleCoordinator;
use crate::revert::RevertScheduler;
use crate::server::ClientProtocolServer;
use crate::tasks::TaskRegistry;

pub struct Annunciator {
    config: AnnunciatorConfig,
    tasks: Arc<TaskRegistry>,
    arbiter: DisplayArbiter,
    server: Arc<ClientProtocolServer>,
}

impl Annunciator {
    pub fn new(
        config: AnnunciatorConfig,
        sign: Arc<dyn SignEffects>,
        intercom: Arc<dyn IntercomEffects>,
    ) -> Self {
        Self::with_tasks(config, Arc::new(TaskRegistry::new()), sign, intercom)
    }

    /// Sign behind the serial bridge, intercom speech over TCP.
    pub fn with_production_handlers(config: AnnunciatorConfig) -> Self {
        let tasks = Arc::new(TaskRegistry::new());
        let sign = Arc::new(SignDriver::new(BridgeLink::new(config.sign.bridge())));
        let intercom = Arc::new(TcpIntercomHandler::new(
            config.intercom.handler(),
            Arc::new(LoggingPanelBus),
            tasks.shutdown_signal(),
        ));
        Self::with_tasks(config, tasks, sign, intercom)
    }

    fn with_tasks(
        config: AnnunciatorConfig,
        tasks: Arc<TaskRegistry>,
        sign: Arc<dyn SignEffects>,
        intercom: Arc<dyn IntercomEffects>,
    ) -> Self {
        let shutdown = tasks.shutdown_signal();

        let lease = Arc::new(SignLease::new(
            sign,
            LeaseConfig {
                attempts: config.sign.lease_attempts,
                poll_interval: config.sign.lease_poll(),
            },
            shutdown.clone(),
        ));
        let recovery = Arc::new(PowerCycleCoordinator::new(
            lease.clone(),
            intercom.clone(),
            config.sign.warmup(),
            config.sign.recovery_retry(),
            shutdown,
        ));
        let arbiter = DisplayArbiter::new(
            lease,
            intercom,
            Arc::new(RevertScheduler::new(config.revert.check_interval())),
            recovery,
            tasks.clone(),
            ArbiterSettings {
                link_down_message: config.upstream.link_down_message.clone(),
                retry_pause: config.sign.alarm_off_retry(),
            },
        );
        let server = Arc::new(ClientProtocolServer::new(
            config.server.clone(),
            arbiter.clone(),
            tasks.clone(),
        ));

        Self {
            config,
            tasks,
            arbiter,
            server,
        }
    }

    pub fn arbiter(&self) -> &DisplayArbiter {
        &self.arbiter
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        self.arbiter.snapshot()
    }

    /// Initialise the sign, then start polling and listening on the
    /// configured address.
    pub async fn start(&self) -> Result<()> {
        self.start_polling().await?;
        let server = self.server.clone();
        self.tasks.spawn(server.run());
        Ok(())
    }

    /// As [`Annunciator::start`], serving clients on an already bound
    /// listener.
    pub async fn start_with_listener(&self, listener: TcpListener) -> Result<()> {
        self.start_polling().await?;
        let server = self.server.clone();
        self.tasks.spawn(server.serve(listener));
        Ok(())
    }

    async fn start_polling(&self) -> Result<()> {
        self.arbiter.initialize().await?;
        let poller = UpstreamPoller::new(
            self.config.upstream.clone(),
            self.arbiter.clone(),
            self.tasks.shutdown_signal(),
        );
        self.tasks.spawn(poller.run());
        info!("annunciator started");
        Ok(())
    }

    pub fn trigger_shutdown(&self) {
        self.tasks.trigger_shutdown();
    }

    /// Stop background tasks, then reset the sign.
    pub async fn stop(&self, grace: Duration) {
        self.tasks.shutdown(grace).await;
        self.arbiter.stop().await;
        info!("annunciator stopped");
    }
}
