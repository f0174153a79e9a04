// src/task/resources.rs

//! Advisory resource hints attached to every task.
//!
//! The core never enforces these; they are passed to the command launcher,
//! which turns them into grid-engine flags when submitting to a queue.

use std::fmt;
use std::str::FromStr;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// A byte count that parses from and prints as `100M`, `1G`, `512K`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn mib(n: u64) -> Self {
        ByteSize(n * MIB)
    }

    pub const fn gib(n: u64) -> Self {
        ByteSize(n * GIB)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid size '{s}' (expected e.g. \"100M\" or \"1G\")"))?;

        let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" => KIB,
            "M" | "MB" => MIB,
            "G" | "GB" => GIB,
            "T" | "TB" => TIB,
            other => return Err(format!("invalid size unit '{other}' in '{s}'")),
        };

        value
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| format!("size '{s}' is too large"))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        if n >= GIB && n % GIB == 0 {
            write!(f, "{}G", n / GIB)
        } else if n >= MIB {
            // Round up so a grid request never asks for less than declared.
            write!(f, "{}M", n.div_ceil(MIB))
        } else if n >= KIB {
            write!(f, "{}K", n.div_ceil(KIB))
        } else {
            write!(f, "{n}")
        }
    }
}

/// Memory / CPU / disk hints for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHints {
    pub memory: ByteSize,
    pub cores: u32,
    pub disk: ByteSize,
}

impl Default for ResourceHints {
    fn default() -> Self {
        Self {
            memory: ByteSize::mib(100),
            cores: 1,
            disk: ByteSize::mib(100),
        }
    }
}

impl fmt::Display for ResourceHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory={} cores={} disk={}",
            self.memory, self.cores, self.disk
        )
    }
}
