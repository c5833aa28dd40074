// src/dispatch/dependency.rs
//! Arbitration between channels that share a signal path

use std::time::Duration;

use crate::hal::ChannelDependency;

/// What a dispatch has to do before publishing to a busy device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    Immediate,
    /// Pause for the settle delay, then ramp up next to what is playing
    Settle(Duration),
    /// Wait for the device's current playback to finish
    AwaitCompletion,
}

/// Decide how to start a request whose strictest channel is `dependency`
pub fn arbitrate(dependency: ChannelDependency, device_active: bool, settle_delay: Duration) -> Arbitration {
    if !device_active {
        return Arbitration::Immediate;
    }
    match dependency {
        ChannelDependency::Independent => Arbitration::Immediate,
        ChannelDependency::PartiallyDependent => Arbitration::Settle(settle_delay),
        ChannelDependency::Dependent => Arbitration::AwaitCompletion,
    }
}

/// Strictest dependency among `dependencies`
pub fn strictest(dependencies: impl IntoIterator<Item = ChannelDependency>) -> ChannelDependency {
    dependencies.into_iter().max().unwrap_or_default()
}

/// Requested duration minus the time spent waiting, never below zero
pub fn remaining_duration(requested_ms: u64, waited_ms: u64) -> u64 {
    requested_ms.saturating_sub(waited_ms)
}
