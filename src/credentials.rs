//! Upstream API key resolution
//!
//! The key is looked up on every call: the process environment first, then the configuration
//! parameters held by the [`Registry`](crate::registry::Registry). Empty values count as absent.
use crate::errors::ForwardError;
use std::collections::HashMap;

/// Name of both the environment variable and the configuration parameter holding the key.
pub const API_KEY_PARAM: &str = "CLAUDE_API_KEY";

/// Somewhere named string parameters can be read from.
pub trait ParamSource: std::fmt::Debug + Send + Sync {
    fn param(&self, name: &str) -> Option<String>;
}

/// Reads parameters from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ParamSource for ProcessEnv {
    fn param(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl ParamSource for HashMap<String, String> {
    fn param(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

pub fn resolve_api_key(
    env: &dyn ParamSource,
    params: &dyn ParamSource,
) -> Result<String, ForwardError> {
    [env, params]
        .into_iter()
        .filter_map(|source| source.param(API_KEY_PARAM))
        .find(|key| !key.is_empty())
        .ok_or(ForwardError::MissingApiKey)
}
