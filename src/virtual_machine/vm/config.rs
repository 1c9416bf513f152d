use crate::warn;
use std::env;

/// Default memory ceiling in bytes (1 MiB).
pub const DEFAULT_MAX_MEMORY: usize = 1 << 20;

/// Environment variable overriding [`VmConfig::max_stack_depth`].
pub const MAX_STACK_DEPTH_VAR: &str = "STACKVM_MAX_STACK_DEPTH";
/// Environment variable overriding [`VmConfig::max_memory`].
pub const MAX_MEMORY_VAR: &str = "STACKVM_MAX_MEMORY";

/// Host-side execution policy.
///
/// None of these limits are part of the machine semantics; they bound what a
/// single VM instance may allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum stack depth after any step, `None` for unbounded.
    pub max_stack_depth: Option<usize>,
    /// Maximum memory size in bytes.
    pub max_memory: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: None,
            max_memory: DEFAULT_MAX_MEMORY,
        }
    }
}

impl VmConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; unparsable ones are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(depth) = parse_var(&lookup, MAX_STACK_DEPTH_VAR) {
            config.max_stack_depth = Some(depth);
        }
        if let Some(memory) = parse_var(&lookup, MAX_MEMORY_VAR) {
            config.max_memory = memory;
        }
        config
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {}={:?}: not a non-negative integer", key, raw);
            None
        }
    }
}
