//! Interaction-driven preload prediction
//!
//! Counts user interactions per resource key and signals when a key has
//! accumulated enough interest to justify loading it before it is asked
//! for. The predictor only counts and signals; acting on the signal
//! (queueing the preload, checking the connection, fetching) is the
//! loader's job.
//!
//! A fired key has its counter reset, so sustained interest has to build
//! up again before the next signal. Counters are kept per key with no
//! decay; the population is bounded by the registered key set.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::ResourceKey;

/// Outcome of recording one interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorSignal {
    /// Interest noted; interactions counted so far
    Tracked(u32),
    /// Threshold reached; the counter was reset
    Fired(u32),
}

impl PredictorSignal {
    /// True if the interaction crossed the threshold
    pub fn is_fired(&self) -> bool {
        matches!(self, PredictorSignal::Fired(_))
    }

    /// Interactions counted at the time of the signal
    pub fn interactions(&self) -> u32 {
        match self {
            PredictorSignal::Tracked(count) | PredictorSignal::Fired(count) => *count,
        }
    }
}

/// Per-key interaction counter with a firing threshold
#[derive(Debug)]
pub struct InteractionPredictor {
    threshold: u32,
    counts: Mutex<HashMap<ResourceKey, u32>>,
}

impl InteractionPredictor {
    /// Create a predictor that fires once a key reaches `threshold`
    /// interactions
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// The configured firing threshold
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one interaction with `key`
    ///
    /// Returns [`PredictorSignal::Fired`] when the count reaches the
    /// threshold; the counter restarts from zero afterwards.
    pub fn record(&self, key: &ResourceKey) -> PredictorSignal {
        let mut counts = self.counts.lock();
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            let fired_at = *count;
            counts.remove(key);
            PredictorSignal::Fired(fired_at)
        } else {
            PredictorSignal::Tracked(*count)
        }
    }

    /// Current count for a key; zero if untracked
    pub fn count(&self, key: &ResourceKey) -> u32 {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of keys with a nonzero count
    pub fn tracked_keys(&self) -> usize {
        self.counts.lock().len()
    }

    /// Drop all counters
    pub fn clear(&self) {
        self.counts.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ResourceKey {
        ResourceKey::new(s)
    }

    #[test]
    fn test_fires_at_threshold() {
        let predictor = InteractionPredictor::new(2);

        assert_eq!(predictor.record(&key("workout")), PredictorSignal::Tracked(1));
        assert_eq!(predictor.record(&key("workout")), PredictorSignal::Fired(2));
    }

    #[test]
    fn test_counter_resets_after_fire() {
        let predictor = InteractionPredictor::new(2);

        predictor.record(&key("workout"));
        assert!(predictor.record(&key("workout")).is_fired());

        // Interest has to build up again from zero
        assert_eq!(predictor.count(&key("workout")), 0);
        assert_eq!(predictor.record(&key("workout")), PredictorSignal::Tracked(1));
    }

    #[test]
    fn test_threshold_one_fires_immediately() {
        let predictor = InteractionPredictor::new(1);
        assert_eq!(predictor.record(&key("plan")), PredictorSignal::Fired(1));
    }

    #[test]
    fn test_keys_counted_independently() {
        let predictor = InteractionPredictor::new(3);

        predictor.record(&key("a"));
        predictor.record(&key("a"));
        predictor.record(&key("b"));

        assert_eq!(predictor.count(&key("a")), 2);
        assert_eq!(predictor.count(&key("b")), 1);
        assert_eq!(predictor.tracked_keys(), 2);

        predictor.clear();
        assert_eq!(predictor.tracked_keys(), 0);
    }
}
