//! Claim dispatch: watch ObjectBucketClaims and drive reconcile passes
//!
//! kube's `Controller` never hands a reconciler an object that is already
//! gone, but deprovisioning is triggered exactly by a claim disappearing. The
//! dispatcher therefore watches claims directly and turns every applied or
//! deleted claim into an [`ObjectKey`] for [`ClaimReconciler::reconcile`].
//!
//! Failed passes are retried with exponential backoff and jitter, up to a
//! bounded number of attempts; errors that need an outside fix are not
//! retried. Passes asking for a requeue run again after a fixed delay. A key
//! redelivered while its dispatch is running gets one more pass from that
//! dispatch instead of a second concurrent one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use parking_lot::Mutex;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use tracing::{debug, error, info, warn};

use crate::config::ProvisionerArgs;
use crate::controller::ClaimReconciler;
use crate::crd::ObjectBucketClaim;
use crate::provisioner::Provisioner;
use crate::retry::{retry_with_backoff_if, RetryConfig};
use crate::store::ObjectKey;
use crate::{Error, Result};

/// Default delay before a pass that asked for a requeue runs again
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(10);

/// Default attempts per claim before waiting for its next change
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How claims are dispatched to the reconciler
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Claims reconciled concurrently
    pub concurrency: usize,
    /// Backoff for failed passes
    pub retry: RetryConfig,
    /// Delay before re-running a pass that asked for a requeue
    pub requeue_delay: Duration,
    /// Restrict the watch to one namespace
    pub namespace: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryConfig::with_max_attempts(DEFAULT_MAX_ATTEMPTS),
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            namespace: None,
        }
    }
}

impl DispatchConfig {
    /// Dispatch settings from the command line
    pub fn from_args(args: &ProvisionerArgs) -> Self {
        Self {
            concurrency: args.concurrency.max(1),
            retry: RetryConfig::with_max_attempts(args.max_requeues),
            namespace: args.namespace.clone(),
            ..Default::default()
        }
    }
}

/// Keys to reconcile for a watch event
///
/// Applied and deleted claims both map to their key; the reconciler decides
/// between provisioning and deprovisioning by looking the claim up again.
pub fn event_keys(event: Event<ObjectBucketClaim>) -> Vec<ObjectKey> {
    match event {
        Event::Apply(claim) | Event::InitApply(claim) | Event::Delete(claim) => {
            ObjectKey::for_resource(&claim).into_iter().collect()
        }
        Event::Init | Event::InitDone => Vec::new(),
    }
}

/// Keys with a running dispatch, flagged when delivered again meanwhile
#[derive(Default)]
struct InFlight {
    keys: Mutex<BTreeMap<ObjectKey, bool>>,
}

impl InFlight {
    /// Returns false if another dispatch already owns `key`; that dispatch
    /// then runs one more pass before releasing it.
    fn begin(&self, key: &ObjectKey) -> bool {
        let mut keys = self.keys.lock();
        match keys.get_mut(key) {
            Some(redelivered) => {
                *redelivered = true;
                false
            }
            None => {
                keys.insert(key.clone(), false);
                true
            }
        }
    }

    /// Release `key`, or return true if it was redelivered and needs another pass
    fn finish(&self, key: &ObjectKey) -> bool {
        let mut keys = self.keys.lock();
        match keys.get_mut(key) {
            Some(redelivered) if *redelivered => {
                *redelivered = false;
                true
            }
            _ => {
                keys.remove(key);
                false
            }
        }
    }
}

/// Feeds claim keys from a watch into a [`ClaimReconciler`]
pub struct ClaimDispatcher {
    reconciler: Arc<ClaimReconciler>,
    config: DispatchConfig,
    in_flight: InFlight,
}

impl ClaimDispatcher {
    /// Create a dispatcher for the given reconciler
    pub fn new(reconciler: Arc<ClaimReconciler>, config: DispatchConfig) -> Self {
        Self {
            reconciler,
            config,
            in_flight: InFlight::default(),
        }
    }

    /// Watch claims until the watch stream ends
    pub async fn run(self, client: Client) {
        let api: Api<ObjectBucketClaim> = match &self.config.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };

        info!(
            provisioner = %self.reconciler.provisioner_name(),
            namespace = ?self.config.namespace,
            concurrency = self.config.concurrency,
            "watching object bucket claims"
        );

        let keys = watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => Some(stream::iter(event_keys(event))),
                    Err(e) => {
                        warn!(error = %e, "claim watch error");
                        None
                    }
                }
            })
            .flatten();

        let this = &self;
        keys.for_each_concurrent(self.config.concurrency, move |key| async move {
            // Errors are logged by dispatch; the next change redelivers the claim
            let _ = this.dispatch(&key).await;
        })
        .await;

        warn!("claim watch ended");
    }

    /// Reconcile one claim, retrying failed passes and honoring requeues
    ///
    /// Returns at once if a dispatch for `key` is already running; that one
    /// picks up the redelivery.
    pub async fn dispatch(&self, key: &ObjectKey) -> Result<()> {
        if !self.in_flight.begin(key) {
            debug!(claim = %key, "dispatch already running, coalescing");
            return Ok(());
        }
        loop {
            let result = self.dispatch_once(key).await;
            if !self.in_flight.finish(key) {
                return result;
            }
            debug!(claim = %key, "claim changed during dispatch, running again");
        }
    }

    async fn dispatch_once(&self, key: &ObjectKey) -> Result<()> {
        let operation = format!("reconcile {key}");
        loop {
            let result = retry_with_backoff_if(
                &self.config.retry,
                &operation,
                Error::is_retryable,
                || self.reconciler.reconcile(key),
            )
            .await;

            match result {
                Ok(outcome) if outcome.requeue => {
                    debug!(claim = %key, delay_secs = self.config.requeue_delay.as_secs(), "requeueing");
                    tokio::time::sleep(self.config.requeue_delay).await;
                }
                Ok(_) => return Ok(()),
                Err(e) => {
                    error!(claim = %key, error = %e, "giving up on claim until its next change");
                    return Err(e);
                }
            }
        }
    }
}

/// Run the claim controller for `provisioner` until the watch ends
///
/// Connects with the ambient kube configuration. Logging is left to the
/// caller (see [`crate::telemetry::init_logging`]).
///
/// # Example
///
/// ```ignore
/// let args = Cli::parse().provisioner;
/// init_logging(args.log_json)?;
/// run_controller(&args, Arc::new(MyS3Provisioner::new())).await?;
/// ```
pub async fn run_controller(args: &ProvisionerArgs, provisioner: Arc<dyn Provisioner>) -> Result<()> {
    let client = Client::try_default().await?;
    let reconciler = Arc::new(ClaimReconciler::from_client(
        client.clone(),
        provisioner,
        &args.provisioner_name,
        args.reconciler_options(),
    ));
    ClaimDispatcher::new(reconciler, DispatchConfig::from_args(args))
        .run(client)
        .await;
    Ok(())
}
