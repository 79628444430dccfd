//! Connection quality probes
//!
//! The loader reads connection quality through the
//! [`ConnectionProbe`](crate::loader::traits::ConnectionProbe) trait at
//! every preload decision. This module provides the one implementation
//! the crate owns: a probe whose reading is whatever the caller last set,
//! for hosts that push quality changes in and for tests.

use parking_lot::RwLock;

use crate::loader::traits::ConnectionProbe;
use crate::types::ConnectionQuality;

/// Probe reporting a caller-maintained quality reading
///
/// Starts at whatever quality it was constructed with; [`ManualProbe::set`]
/// changes the reading for all subsequent decisions. A host that wants to
/// keep updating the reading after the loader is built wraps the probe in
/// an `Arc`, hands a clone to the builder and keeps one for its own
/// network observer.
#[derive(Debug)]
pub struct ManualProbe {
    quality: RwLock<ConnectionQuality>,
}

impl ManualProbe {
    /// Create a probe with an initial reading
    pub fn new(quality: ConnectionQuality) -> Self {
        Self {
            quality: RwLock::new(quality),
        }
    }

    /// Probe that reports an unreadable connection
    pub fn unknown() -> Self {
        Self::new(ConnectionQuality::Unknown)
    }

    /// Probe that reports a fast connection
    pub fn fast() -> Self {
        Self::new(ConnectionQuality::Fast)
    }

    /// Probe that reports a constrained connection
    pub fn slow() -> Self {
        Self::new(ConnectionQuality::Slow)
    }

    /// Replace the reading for all subsequent decisions
    pub fn set(&self, quality: ConnectionQuality) {
        *self.quality.write() = quality;
    }
}

impl Default for ManualProbe {
    fn default() -> Self {
        Self::unknown()
    }
}

impl ConnectionProbe for ManualProbe {
    fn quality(&self) -> ConnectionQuality {
        *self.quality.read()
    }
}
