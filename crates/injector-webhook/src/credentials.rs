//! Connect credential injection
//!
//! Containers wrapped by `op run` need `OP_CONNECT_HOST` and
//! `OP_CONNECT_TOKEN`. Only the variables the user has not set are added, and
//! the token is always a Secret reference, never a literal.

use injector_common::{InjectorConfig, CONNECT_HOST_ENV, CONNECT_TOKEN_ENV};
use k8s_openapi::api::core::v1::{Container, EnvVar, EnvVarSource, SecretKeySelector};

use crate::container::ContainerPath;
use crate::error::Result;
use crate::patch::{self, PatchOp};

/// Which Connect variables a container already defines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectEnvState {
    /// `OP_CONNECT_HOST` is present
    pub host: bool,
    /// `OP_CONNECT_TOKEN` is present
    pub token: bool,
}

impl ConnectEnvState {
    /// Both variables are already set
    pub fn complete(&self) -> bool {
        self.host && self.token
    }
}

/// Inspect a container's env for the Connect variables
pub fn connect_configuration_set(container: &Container) -> ConnectEnvState {
    let mut state = ConnectEnvState::default();
    for env in container.env.iter().flatten() {
        match env.name.as_str() {
            CONNECT_HOST_ENV => state.host = true,
            CONNECT_TOKEN_ENV => state.token = true,
            _ => {}
        }
        if state.complete() {
            break;
        }
    }
    state
}

/// `OP_CONNECT_HOST` with a literal value
pub fn connect_host_env(host: &str) -> EnvVar {
    EnvVar {
        name: CONNECT_HOST_ENV.to_string(),
        value: Some(host.to_string()),
        ..Default::default()
    }
}

/// `OP_CONNECT_TOKEN` resolved from `secret_key` in Secret `secret_name`
pub fn connect_token_env(secret_name: &str, secret_key: &str) -> EnvVar {
    EnvVar {
        name: CONNECT_TOKEN_ENV.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.to_string(),
                key: secret_key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Env vars still missing from a container, host first
pub fn missing_connect_env(state: ConnectEnvState, config: &InjectorConfig) -> Vec<EnvVar> {
    let mut envs = Vec::with_capacity(2);
    if !state.host {
        envs.push(connect_host_env(&config.connect_host));
    }
    if !state.token {
        envs.push(connect_token_env(
            &config.token_secret_name,
            &config.token_secret_key,
        ));
    }
    envs
}

/// Patch operations adding the missing Connect variables to a container
///
/// Nothing is emitted when both variables are already present.
pub fn inject_credentials(
    container: &Container,
    path: ContainerPath,
    config: &InjectorConfig,
) -> Result<Vec<PatchOp>> {
    let envs = missing_connect_env(connect_configuration_set(container), config);
    if envs.is_empty() {
        return Ok(Vec::new());
    }

    let values = envs
        .iter()
        .map(patch::to_value)
        .collect::<Result<Vec<_>>>()?;
    let existing = container.env.as_ref().map_or(0, Vec::len);

    Ok(patch::add_all(existing, &path.field("env"), values))
}
