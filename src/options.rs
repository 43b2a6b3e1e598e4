use std::convert::TryFrom;
use tokio::time::Duration;

/// CoordinatorOptions tunes a node's background loops. Unset fields take their defaults.
#[derive(Clone, Debug, Default)]
pub struct CoordinatorOptions {
    /// How often the leader proposes a new value and every node reads its state. Default 5s.
    pub replication_interval: Option<Duration>,
    /// How long to wait for a leader before replicating anyway. Default 10s.
    pub leader_wait_timeout: Option<Duration>,
    /// How often to re-check for a leader while waiting for one. Default 500ms.
    pub leader_poll_interval: Option<Duration>,
    /// Number of applied values between engine snapshots. Default 8.
    pub snapshot_interval: Option<u64>,
}

#[derive(Clone, Debug)]
pub(crate) struct CoordinatorOptionsValidated {
    pub replication_interval: Duration,
    pub leader_wait_timeout: Duration,
    pub leader_poll_interval: Duration,
    pub snapshot_interval: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid options: {0}")]
pub struct OptionsError(&'static str);

impl CoordinatorOptionsValidated {
    fn validate(&self) -> Result<(), OptionsError> {
        if self.replication_interval.is_zero() {
            return Err(OptionsError("Replication interval must be non-zero"));
        }
        if self.leader_poll_interval.is_zero() {
            return Err(OptionsError("Leader poll interval must be non-zero"));
        }
        if self.leader_poll_interval >= self.leader_wait_timeout {
            return Err(OptionsError("Leader poll interval must be less than the leader wait timeout"));
        }
        if self.snapshot_interval == 0 {
            return Err(OptionsError("Snapshot interval must be at least 1"));
        }

        Ok(())
    }
}

impl TryFrom<CoordinatorOptions> for CoordinatorOptionsValidated {
    type Error = OptionsError;

    fn try_from(options: CoordinatorOptions) -> Result<Self, Self::Error> {
        let values = CoordinatorOptionsValidated {
            replication_interval: options.replication_interval.unwrap_or(Duration::from_secs(5)),
            leader_wait_timeout: options.leader_wait_timeout.unwrap_or(Duration::from_secs(10)),
            leader_poll_interval: options.leader_poll_interval.unwrap_or(Duration::from_millis(500)),
            snapshot_interval: options.snapshot_interval.unwrap_or(8),
        };

        values.validate()?;
        Ok(values)
    }
}
