use std::{env, ffi::OsStr};

pub mod jwt;
pub mod server;

/// Reads a required environment variable, naming the variable on failure.
pub fn ensure_var<K: AsRef<OsStr>>(key: K) -> anyhow::Result<String> {
    env::var(&key).map_err(|e| anyhow::anyhow!("{}: {:?}", e, key.as_ref()))
}

/// Reads an optional environment variable. Empty values count as unset.
pub fn optional_var<K: AsRef<OsStr>>(key: K) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
