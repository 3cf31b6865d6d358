//! Reconciler configuration
//!
//! [`ProvisionerArgs`] is the command-line/environment surface an integrator
//! flattens into their own clap CLI. [`ReconcilerOptions`] is what the
//! reconciler actually consumes, with the visibility-retry floors applied.

use std::time::Duration;

use clap::Args;
use tracing::debug;

use crate::retry::{MIN_RETRY_INTERVAL, MIN_RETRY_TIMEOUT};

/// Timing knobs for the create-until-visible retries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcilerOptions {
    /// Interval between visibility polls
    pub retry_interval: Duration,
    /// Total time to wait for a created record to become visible
    pub retry_timeout: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            retry_interval: MIN_RETRY_INTERVAL,
            retry_timeout: MIN_RETRY_TIMEOUT,
        }
    }
}

impl ReconcilerOptions {
    /// Raise values below their floor to the floor
    pub fn normalized(self) -> Self {
        let retry_interval = if self.retry_interval < MIN_RETRY_INTERVAL {
            debug!(
                requested_secs = self.retry_interval.as_secs_f64(),
                floor_secs = MIN_RETRY_INTERVAL.as_secs(),
                "retry interval below floor, raising"
            );
            MIN_RETRY_INTERVAL
        } else {
            self.retry_interval
        };

        let retry_timeout = if self.retry_timeout < MIN_RETRY_TIMEOUT {
            debug!(
                requested_secs = self.retry_timeout.as_secs_f64(),
                floor_secs = MIN_RETRY_TIMEOUT.as_secs(),
                "retry timeout below floor, raising"
            );
            MIN_RETRY_TIMEOUT
        } else {
            self.retry_timeout
        };

        Self {
            retry_interval,
            retry_timeout,
        }
    }
}

/// Command-line and environment settings for running a provisioner
///
/// Meant to be `#[command(flatten)]`-ed into the integrator's CLI.
#[derive(Args, Clone, Debug)]
pub struct ProvisionerArgs {
    /// Provisioner name StorageClasses must reference (matched case-insensitively)
    #[arg(long, env = "PROVISIONER_NAME")]
    pub provisioner_name: String,

    /// Seconds between visibility polls after a failed create (minimum 3)
    #[arg(long, env = "PROVISIONER_RETRY_INTERVAL_SECS", default_value = "3")]
    pub retry_interval_secs: u64,

    /// Seconds to wait for a created record to become visible (minimum 30)
    #[arg(long, env = "PROVISIONER_RETRY_TIMEOUT_SECS", default_value = "30")]
    pub retry_timeout_secs: u64,

    /// Only watch claims in this namespace
    #[arg(long, env = "PROVISIONER_NAMESPACE")]
    pub namespace: Option<String>,

    /// Number of claims reconciled concurrently
    #[arg(long, default_value = "8")]
    pub concurrency: usize,

    /// Attempts per claim before giving up until the next change (0 = retry forever)
    #[arg(long, default_value = "10")]
    pub max_requeues: u32,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,
}

impl ProvisionerArgs {
    /// Reconciler options derived from the arguments, floors applied
    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            retry_timeout: Duration::from_secs(self.retry_timeout_secs),
        }
        .normalized()
    }
}
