//! Exact Kubernetes resource-quantity conversion
//!
//! CPU quantities are kept as integer nanocores so that suffix conversion
//! is an exact integer multiplication and bound comparisons never go
//! through binary floating point. Memory quantities are integer byte
//! counts. Malformed text fails with `InvalidQuantity` rather than
//! defaulting to zero.

use crate::error::{HarnessError, Result};

const NANOS_PER_CORE: u64 = 1_000_000_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_MICRO: u64 = 1_000;

/// An exact CPU quantity in nanocore units.
///
/// `"30m"` parses to exactly 0.03 cores (30_000_000 nanocores); no
/// rounding occurs at any suffix scale the metrics API reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuQuantity {
    nanos: u64,
}

impl CpuQuantity {
    pub fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis * NANOS_PER_MILLI,
        }
    }

    pub fn from_cores(cores: u64) -> Self {
        Self {
            nanos: cores * NANOS_PER_CORE,
        }
    }

    /// Parse compact CPU notation: a non-negative integer with an optional
    /// scale suffix (`m` = milli, `u` = micro, `n` = nano).
    ///
    /// Plain integers are whole cores. Parsing is pure and idempotent.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (digits, scale) = match text.as_bytes().last().copied() {
            Some(b'm') => (&text[..text.len() - 1], NANOS_PER_MILLI),
            Some(b'u') => (&text[..text.len() - 1], NANOS_PER_MICRO),
            Some(b'n') => (&text[..text.len() - 1], 1),
            _ => (text, NANOS_PER_CORE),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HarnessError::InvalidQuantity(text.to_string()));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| HarnessError::InvalidQuantity(text.to_string()))?;
        let nanos = value
            .checked_mul(scale)
            .ok_or_else(|| HarnessError::InvalidQuantity(text.to_string()))?;
        Ok(Self { nanos })
    }

    pub fn nanos(&self) -> u64 {
        self.nanos
    }

    /// Whole millicores, truncating sub-milli precision.
    pub fn millis(&self) -> u64 {
        self.nanos / NANOS_PER_MILLI
    }
}

impl std::fmt::Display for CpuQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.nanos % NANOS_PER_CORE == 0 {
            write!(f, "{}", self.nanos / NANOS_PER_CORE)
        } else if self.nanos % NANOS_PER_MILLI == 0 {
            write!(f, "{}m", self.nanos / NANOS_PER_MILLI)
        } else if self.nanos % NANOS_PER_MICRO == 0 {
            write!(f, "{}u", self.nanos / NANOS_PER_MICRO)
        } else {
            write!(f, "{}n", self.nanos)
        }
    }
}

/// Parse a memory quantity into an exact byte count.
///
/// Accepts plain integers plus the binary (`Ki`, `Mi`, `Gi`, `Ti`) and
/// decimal (`k`, `M`, `G`, `T`) suffixes VPA manifests use. All
/// multiplications are overflow-checked.
pub fn parse_memory(text: &str) -> Result<u64> {
    let text = text.trim();
    let invalid = || HarnessError::InvalidQuantity(text.to_string());

    let (digits, multiplier) = if let Some(prefix) = text.strip_suffix("Ki") {
        (prefix, 1u64 << 10)
    } else if let Some(prefix) = text.strip_suffix("Mi") {
        (prefix, 1u64 << 20)
    } else if let Some(prefix) = text.strip_suffix("Gi") {
        (prefix, 1u64 << 30)
    } else if let Some(prefix) = text.strip_suffix("Ti") {
        (prefix, 1u64 << 40)
    } else if let Some(prefix) = text.strip_suffix('k') {
        (prefix, 1_000)
    } else if let Some(prefix) = text.strip_suffix('M') {
        (prefix, 1_000_000)
    } else if let Some(prefix) = text.strip_suffix('G') {
        (prefix, 1_000_000_000)
    } else if let Some(prefix) = text.strip_suffix('T') {
        (prefix, 1_000_000_000_000)
    } else {
        (text, 1)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}
