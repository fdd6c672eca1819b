//! The long-lived discovery service supervising polling and client restarts.

use std::fmt;
use std::future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::client::ClientManager;
use crate::cluster::ClusterDiscovery;
use crate::error::{DiscoveryError, Result};
use crate::node::{ClusterIdentity, MemberEntry, MembershipSet};
use crate::poller::{DiscoveryPoller, PollReport};
use crate::registry::RegistryClientFactory;
use crate::settings::{DiscoveryConfig, DiscoverySettings};

/// Lifecycle state of a [`DiscoveryService`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceState {
    /// Building the first client and background tasks.
    Starting,

    /// Accepting polls and restart requests.
    Ready,

    /// Torn down. Terminal.
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Signals processed one at a time by the supervisor task.
enum Command {
    RestartClient { done: oneshot::Sender<()> },
    Shutdown { done: oneshot::Sender<()> },
}

/// Discovers cluster members from the registry and keeps the registry client fresh.
///
/// Polls run on the caller's task against whichever client is live when they
/// begin. Client restarts and shutdown are serialized through a single
/// supervisor task, which also owns the periodic restart timer.
pub struct DiscoveryService<F>
where
    F: RegistryClientFactory,
{
    settings: Arc<DiscoverySettings>,
    poller: DiscoveryPoller,
    clients: Arc<ClientManager<F>>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ServiceState>,
    membership: watch::Receiver<MembershipSet>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl<F> DiscoveryService<F>
where
    F: RegistryClientFactory,
{
    /// Validate a raw configuration and start the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the first registry
    /// client cannot be created.
    pub async fn from_config(
        config: DiscoveryConfig,
        identity: ClusterIdentity,
        factory: F,
    ) -> Result<Self> {
        let settings = DiscoverySettings::new(config)?;

        Self::start(settings, identity, factory).await
    }

    /// Start the service: create the first client, then spawn the supervisor
    /// and membership refresh tasks.
    ///
    /// The service is ready as soon as the first client exists. The refresh
    /// task takes the first membership snapshot in the background and
    /// publishes it through [`Self::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns an error if the first registry client cannot be created.
    pub async fn start(
        settings: DiscoverySettings,
        identity: ClusterIdentity,
        factory: F,
    ) -> Result<Self> {
        let (state_tx, state) = watch::channel(ServiceState::Starting);
        let settings = Arc::new(settings);

        info!(
            "Starting discovery for {} service(s) in namespace {}",
            settings.services().len(),
            settings.namespace()
        );

        let clients = Arc::new(ClientManager::new(factory, settings.clone()).await?);
        let poller = DiscoveryPoller::new(settings.clone(), identity);

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (membership_tx, membership) = watch::channel(MembershipSet::new());
        let shutdown_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        state_tx.send_replace(ServiceState::Ready);
        info!("Discovery service ready");

        task_tracker.spawn(Self::supervise(
            clients.clone(),
            commands_rx,
            settings.restart_interval(),
            shutdown_token.clone(),
            state_tx,
        ));

        task_tracker.spawn(Self::refresh_membership(
            poller.clone(),
            clients.clone(),
            membership_tx,
            settings.refresh_interval(),
            shutdown_token.clone(),
        ));

        // Both background tasks are spawned; `wait` resolves once they finish.
        task_tracker.close();

        Ok(Self {
            settings,
            poller,
            clients,
            commands,
            state,
            membership,
            shutdown_token,
            task_tracker,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// The validated settings the service runs with.
    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Number of client restarts performed so far.
    pub fn client_generation(&self) -> u64 {
        self.clients.generation()
    }

    /// Poll the registry for the current members.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NotReady`] if the service is not running.
    /// Registry failures never surface here; they only shrink the result.
    pub async fn get_nodes(&self, only_alive: bool) -> Result<MembershipSet> {
        Ok(self.poll(only_alive).await?.membership)
    }

    /// Like [`Self::get_nodes`], but also reports failed queries and dropped records.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NotReady`] if the service is not running.
    pub async fn poll(&self, only_alive: bool) -> Result<PollReport> {
        let state = self.state();
        if state != ServiceState::Ready {
            return Err(DiscoveryError::NotReady(state));
        }

        let client = self
            .clients
            .current()
            .ok_or(DiscoveryError::NotReady(ServiceState::Stopped))?;

        Ok(self.poller.poll_with_report(&*client, only_alive).await)
    }

    /// Replace the registry client and wait until the replacement is live.
    ///
    /// Dropped without effect once the service has stopped.
    pub async fn restart_client(&self) {
        let (done, done_rx) = oneshot::channel();

        if self.commands.send(Command::RestartClient { done }).is_err() {
            debug!("Discovery service stopped, dropping client restart");
            return;
        }

        if done_rx.await.is_err() {
            debug!("Discovery service stopped before client restart ran");
        }
    }

    /// Watch the membership observed by the periodic refresh.
    ///
    /// Holds an empty set until the first snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<MembershipSet> {
        self.membership.clone()
    }

    /// Stop the service: cancel the restart timer and dispose the client once
    /// polls already running against it have finished.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let (done, done_rx) = oneshot::channel();

        if self.commands.send(Command::Shutdown { done }).is_ok() {
            let _ = done_rx.await;
        }

        self.task_tracker.wait().await;
    }

    /// Wait until the service has stopped.
    pub async fn wait(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ServiceState::Stopped).await;
        self.task_tracker.wait().await;
    }

    async fn supervise(
        clients: Arc<ClientManager<F>>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        restart_interval: Option<Duration>,
        shutdown_token: CancellationToken,
        state: watch::Sender<ServiceState>,
    ) {
        let mut restart_timer = restart_interval.map(|period| {
            info!("Registry client will be restarted every {:?}", period);
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });

        let mut pending_shutdown = None;
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::RestartClient { done }) => {
                        clients.restart().await;
                        let _ = done.send(());
                    }
                    Some(Command::Shutdown { done }) => {
                        pending_shutdown = Some(done);
                        break;
                    }
                    None => {
                        debug!("All discovery service handles dropped");
                        break;
                    }
                },

                () = next_tick(&mut restart_timer) => {
                    debug!("Scheduled registry client restart");
                    clients.restart().await;
                }
            }
        }

        info!("Stopping discovery service");

        state.send_replace(ServiceState::Stopped);
        drop(restart_timer);
        commands.close();
        shutdown_token.cancel();
        clients.shutdown().await;

        // Signals queued behind the shutdown are dropped unanswered.
        while commands.try_recv().is_ok() {}

        if let Some(done) = pending_shutdown {
            let _ = done.send(());
        }

        info!("Discovery service stopped");
    }

    async fn refresh_membership(
        poller: DiscoveryPoller,
        clients: Arc<ClientManager<F>>,
        membership: watch::Sender<MembershipSet>,
        refresh_interval: Duration,
        shutdown_token: CancellationToken,
    ) {
        // First tick fires immediately and takes the initial snapshot.
        let mut interval = tokio::time::interval(refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut initial = true;

        loop {
            tokio::select! {
                () = shutdown_token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(client) = clients.current() else {
                break;
            };

            let current = tokio::select! {
                () = shutdown_token.cancelled() => break,
                current = poller.poll(&*client, true) => current,
            };

            // Release the lease before publishing so a pending retirement can proceed.
            drop(client);

            if initial {
                initial = false;
                info!("Initial membership: {} nodes", current.len());
                membership.send_replace(current);
                continue;
            }

            let change = current.diff(&membership.borrow());
            if change.is_empty() {
                debug!("Membership unchanged ({} nodes)", current.len());
                continue;
            }

            for node in &change.joined {
                info!("Node discovered: {}", node);
            }
            for node in &change.left {
                info!("Node no longer listed: {}", node);
            }

            membership.send_replace(current);
        }

        debug!("Membership refresh task shutting down");
    }
}

impl<F> Drop for DiscoveryService<F>
where
    F: RegistryClientFactory,
{
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => future::pending().await,
    }
}

#[async_trait]
impl<F> ClusterDiscovery for DiscoveryService<F>
where
    F: RegistryClientFactory,
{
    async fn get_nodes(&self, only_alive: bool) -> Result<MembershipSet> {
        Self::get_nodes(self, only_alive).await
    }

    async fn register_node(&self, node: &MemberEntry) -> Result<()> {
        debug!("Ignoring registration of {}: discovery is read-only", node.address);
        Ok(())
    }

    async fn deregister_node(&self, node: &MemberEntry) -> Result<()> {
        debug!("Ignoring deregistration of {}: discovery is read-only", node.address);
        Ok(())
    }

    async fn mark_as_alive(&self, _node: &MemberEntry) -> Result<()> {
        Ok(())
    }
}
