use std::collections::HashMap;

use crate::error::{Result, TracerError};

/// Parameter name for the scheduled heartbeat callback period in ms.
pub const PARAM_SCHEDULE: &str = "schedule";
/// Parameter name for the per-tracer debug toggle.
pub const PARAM_DEBUG: &str = "debug";

/// Lower-case strings accepted as a true boolean parameter.
const TRUE_VALUES: &[&str] = &["yes", "true"];

/// Per-tracer-instance configuration lookup.
///
/// The host hands each tracer an opaque bag of named string parameters;
/// keys are normalized to trimmed lower-case on construction. Typed getters
/// fall back to a default when the parameter is absent and fail fast with
/// [`TracerError::Config`] when a numeric parameter is malformed; a tracer
/// with a broken configuration must never be constructed.
#[derive(Debug, Clone, Default)]
pub struct TracerParams {
    values: HashMap<String, String>,
}

impl TracerParams {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| {
                (
                    k.as_ref().trim().to_lowercase(),
                    v.as_ref().trim().to_string(),
                )
            })
            .collect();
        Self { values }
    }

    /// Raw parameter value, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.trim().to_lowercase()).map(String::as_str)
    }

    pub fn get_str(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or(default).to_string()
    }

    pub fn get_i32(&self, name: &str, default: i32) -> Result<i32> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.parse::<i32>().map_err(|_| {
                TracerError::Config(format!("parameter {name} is not an integer: {v:?}"))
            }),
        }
    }

    pub fn get_i64(&self, name: &str, default: i64) -> Result<i64> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v.parse::<i64>().map_err(|_| {
                TracerError::Config(format!("parameter {name} is not an integer: {v:?}"))
            }),
        }
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            None => default,
            Some(v) => TRUE_VALUES.contains(&v.to_lowercase().as_str()),
        }
    }
}
