// src/config/constants.rs
//! System-wide configuration constants

/// Signal and channel constants
pub mod signal {
    pub const MIN_AMPLITUDE: f64 = 0.0;
    pub const MAX_AMPLITUDE: f64 = 1.0;

    /// Shortest plateau a vibration motor reproduces reliably
    pub const DEFAULT_VIBRATION_MIN_SIGNAL_MS: u64 = 50;
    /// Shortest plateau an e-stim output reproduces reliably
    pub const DEFAULT_ESTIM_MIN_SIGNAL_MS: u64 = 20;

    pub const MAX_CHANNEL_COUNT: usize = 16;
    pub const MIN_CHANNEL_COUNT: usize = 1;
}

/// Intensity knob range
pub mod intensity {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 10;
    pub const DEFAULT: u8 = 5;
}

/// Dispatch and dependency arbitration timing
pub mod dispatch {
    /// Pause before a partially dependent channel ramps up next to an active one
    pub const PARTIAL_DEPENDENCY_SETTLE_MS: u64 = 100;
    pub const MAX_SETTLE_DELAY_MS: u64 = 5_000;
    /// Longest duration or offset a single request may ask for (one day)
    pub const DEFAULT_MAX_REQUEST_MS: u64 = 86_400_000;
    pub const MAX_REQUEST_MS: u64 = 604_800_000;
}

/// Playback loop constants
pub mod playback {
    /// Frames later than this are reported as late
    pub const DEFAULT_LATE_FRAME_WARNING_MS: u64 = 20;
    pub const MAX_LATE_FRAME_WARNING_MS: u64 = 1_000;
}

/// Configuration file locations, lowest precedence first
pub mod paths {
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/stim-core/config.toml";
    pub const USER_CONFIG_DIR: &str = ".config/stim-core";
    pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
    pub const LOCAL_CONFIG_FILE: &str = "config.toml";

    /// Prefix of environment overrides, e.g. `STIM_DISPATCH__SETTLE_DELAY_MS`
    pub const ENV_PREFIX: &str = "STIM_";
}
