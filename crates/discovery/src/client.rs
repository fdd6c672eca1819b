//! Ownership, replacement and disposal of the live registry client.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::DiscoveryError;
use crate::registry::{RegistryClient, RegistryClientFactory};
use crate::settings::DiscoverySettings;

/// A snapshot of the live client, held for the duration of a poll.
///
/// A replaced client is not disposed while any lease on it is alive.
pub struct ClientLease<C> {
    // Must drop before `_released` so waiters observe the lower strong count.
    client: Arc<C>,
    _released: ReleaseSignal,
}

impl<C> ClientLease<C> {
    /// Whether both leases refer to the same client instance.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.client, &other.client)
    }
}

impl<C> Deref for ClientLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

struct ReleaseSignal(Arc<Notify>);

impl Drop for ReleaseSignal {
    fn drop(&mut self) {
        self.0.notify_waiters();
    }
}

/// Owns the single live registry client and swaps it out on restart.
///
/// Readers take a [`ClientLease`] through [`ClientManager::current`] and keep
/// using it even if the client is replaced underneath them. A replaced client
/// is disposed only once every lease on it has been released.
pub struct ClientManager<F>
where
    F: RegistryClientFactory,
{
    factory: F,
    settings: Arc<DiscoverySettings>,
    current: ArcSwapOption<F::Client>,
    released: Arc<Notify>,
    generation: AtomicU64,
    retirements: TaskTracker,
}

impl<F> ClientManager<F>
where
    F: RegistryClientFactory,
{
    /// Create the manager along with its first client.
    ///
    /// # Errors
    ///
    /// Returns an error if the factory cannot create the first client.
    pub async fn new(factory: F, settings: Arc<DiscoverySettings>) -> Result<Self, DiscoveryError> {
        let client = factory
            .create(&settings)
            .await
            .map_err(|e| DiscoveryError::ClientCreation(e.to_string()))?;

        info!(
            "Created registry client for namespace {}",
            settings.namespace()
        );

        Ok(Self {
            factory,
            settings,
            current: ArcSwapOption::from_pointee(client),
            released: Arc::new(Notify::new()),
            generation: AtomicU64::new(0),
            retirements: TaskTracker::new(),
        })
    }

    /// Lease the live client, or `None` once shut down.
    pub fn current(&self) -> Option<ClientLease<F::Client>> {
        self.current.load_full().map(|client| ClientLease {
            client,
            _released: ReleaseSignal(self.released.clone()),
        })
    }

    /// Number of successful restarts so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the live client with a freshly created one.
    ///
    /// Returns `true` if a new client was installed. If the replacement
    /// cannot be created the current client stays live.
    pub async fn restart(&self) -> bool {
        if self.current.load().is_none() {
            debug!("Client manager is shut down, ignoring restart");
            return false;
        }

        debug!("Restarting registry client...");

        let client = match self.factory.create(&self.settings).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!("Failed to create replacement registry client, keeping current one: {}", e);
                return false;
            }
        };

        match self.current.swap(Some(client)) {
            Some(previous) => {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!("Registry client replaced (generation {})", generation);
                self.retirements.spawn(drain_and_dispose(
                    previous,
                    self.released.clone(),
                    self.settings.dispose_grace(),
                ));
                true
            }
            None => {
                // Shut down while the replacement was being created.
                if let Some(orphan) = self.current.swap(None) {
                    drain_and_dispose(orphan, self.released.clone(), self.settings.dispose_grace())
                        .await;
                }
                false
            }
        }
    }

    /// Dispose the live client once its leases are released, and wait for
    /// pending retirements.
    ///
    /// Safe to call more than once; the live client is disposed exactly once.
    pub async fn shutdown(&self) {
        if let Some(client) = self.current.swap(None) {
            debug!("Disposing registry client");
            drain_and_dispose(client, self.released.clone(), self.settings.dispose_grace()).await;
        }

        self.retirements.close();
        self.retirements.wait().await;
    }
}

/// Wait until `client` is the last reference, then dispose it.
///
/// Never disposes under an in-flight lease. Holders still present after
/// `grace` are reported once.
async fn drain_and_dispose<C: RegistryClient>(
    client: Arc<C>,
    released: Arc<Notify>,
    grace: Duration,
) {
    let warn_at = Instant::now() + grace;
    let mut warned = false;

    loop {
        let notified = released.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let in_flight = Arc::strong_count(&client) - 1;
        if in_flight == 0 {
            break;
        }

        tokio::select! {
            () = notified.as_mut() => {}
            () = tokio::time::sleep_until(warn_at), if !warned => {
                warn!(
                    "Registry client still has {} in-flight users after {:?}, deferring dispose",
                    in_flight, grace
                );
                warned = true;
            }
        }
    }

    if let Err(e) = client.dispose().await {
        warn!("Failed to dispose registry client: {}", e);
    }
}
