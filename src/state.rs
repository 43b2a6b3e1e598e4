use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ReplicatedState is any value the cluster can agree on. Every proposal fully replaces the
/// previous value, so proposals are idempotent.
pub trait ReplicatedState: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> ReplicatedState for T where
    T: Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// StateSource produces the next value the leader proposes.
pub trait StateSource<V>: Send {
    fn next_state(&mut self) -> V;
}

impl<V, F> StateSource<V> for F
where
    F: FnMut() -> V + Send,
{
    fn next_state(&mut self) -> V {
        self()
    }
}

/// Timestamp is the wall-clock time as materialized by whichever node was leader.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub now: String,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.now)
    }
}

/// WallClock proposes the current UTC time.
#[derive(Copy, Clone, Debug, Default)]
pub struct WallClock;

impl StateSource<Timestamp> for WallClock {
    fn next_state(&mut self) -> Timestamp {
        Timestamp {
            now: Utc::now().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_state_sources() {
        let mut n = 0;
        let mut source = move || {
            n += 1;
            format!("T{}", n)
        };

        assert_eq!(StateSource::next_state(&mut source), "T1");
        assert_eq!(StateSource::next_state(&mut source), "T2");
    }

    #[test]
    fn wall_clock_is_utc() {
        let stamp = WallClock.next_state();
        assert!(stamp.now.ends_with("UTC"), "unexpected timestamp {}", stamp);
    }
}
