// src/dispatch/intention.rs
//! Semantic purpose of a stimulation request

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a request is meant to achieve, independent of which hardware plays it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intention {
    Pace,
    Tease,
    Pain,
}

impl Intention {
    pub const ALL: [Intention; 3] = [Intention::Pace, Intention::Tease, Intention::Pain];
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intention::Pace => "pace",
            Intention::Tease => "tease",
            Intention::Pain => "pain",
        };
        f.write_str(name)
    }
}
