// src/playback/mod.rs
//! Real-time playback of merged frame sequences

pub mod player;

pub use player::{DevicePlayer, Playback, PlaybackPhase, PlaybackStatus};
