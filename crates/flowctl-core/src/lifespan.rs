use std::fmt;

use regex::Regex;

use crate::error::{FlowError, Result};

static PATTERN: &str = r"^((?P<d>\d+)d)?((?P<h>\d+)h)?((?P<m>\d+)m)?((?P<s>\d+)s)?$";

/// A non-negative duration in seconds, parsed either from a bare float or
/// from the `XdYhZmWs` component grammar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifespan(f64);

impl Lifespan {
    pub fn from_seconds(seconds: f64) -> Result<Self> {
        if seconds.is_nan() || seconds.is_infinite() || seconds < 0.0 {
            return Err(FlowError::SchemaError(format!(
                "life-span must be a non-negative number, got {seconds}"
            )));
        }
        Ok(Self(seconds))
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }

    pub fn parse(src: &str) -> Result<Self> {
        let src = src.trim();
        if src.is_empty() {
            return Err(FlowError::SchemaError("life-span is empty".into()));
        }

        if let Ok(v) = src.parse::<f64>() {
            return Self::from_seconds(v);
        }

        let re = Regex::new(PATTERN).expect("static lifespan regex is valid");
        let caps = re
            .captures(src)
            .ok_or_else(|| FlowError::SchemaError(format!("'{src}' is not a valid life-span")))?;

        let d = component(&caps, "d")?;
        let h = component(&caps, "h")?;
        let m = component(&caps, "m")?;
        let s = component(&caps, "s")?;

        if d.is_none() && h.is_none() && m.is_none() && s.is_none() {
            return Err(FlowError::SchemaError(format!(
                "'{src}' is not a valid life-span"
            )));
        }

        let total = d.unwrap_or(0) * 86_400 + h.unwrap_or(0) * 3_600 + m.unwrap_or(0) * 60
            + s.unwrap_or(0);
        Self::from_seconds(total as f64)
    }

    /// Emits the minimal `XdYhZmWs` form for a non-negative integer-second
    /// count. `self.seconds()` must be integral.
    pub fn format_minimal(&self) -> String {
        let mut total = self.0.round() as u64;
        let d = total / 86_400;
        total %= 86_400;
        let h = total / 3_600;
        total %= 3_600;
        let m = total / 60;
        let s = total % 60;

        let mut out = String::new();
        if d > 0 {
            out.push_str(&format!("{d}d"));
        }
        if h > 0 {
            out.push_str(&format!("{h}h"));
        }
        if m > 0 {
            out.push_str(&format!("{m}m"));
        }
        if s > 0 || out.is_empty() {
            out.push_str(&format!("{s}s"));
        }
        out
    }
}

fn component(caps: &regex::Captures<'_>, name: &str) -> Result<Option<u64>> {
    match caps.name(name) {
        Some(m) => m
            .as_str()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| FlowError::SchemaError(format!("invalid life-span component: {e}"))),
        None => Ok(None),
    }
}

impl fmt::Display for Lifespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_minimal())
    }
}
