//! Builds the conductor API the configuration asks for.

use std::sync::Arc;

use conductor_core::{ConductorApi, ConductorManager};
use tracing::info;

use crate::config::{ConductorConfig, ConfigError};
use crate::local::LocalApi;
use crate::remote::RemoteApi;
use crate::transport::RpcTransport;

/// Construct the local or remote conductor API, as `config.use_local` says.
///
/// Only the dependency of the selected mode is built: `manager` for local
/// mode, `transport` for remote mode.
///
/// # Errors
///
/// Returns a [`ConfigError`] if `config` does not validate.
pub fn build_conductor_api<F, G>(
    config: &ConductorConfig,
    manager: F,
    transport: G,
) -> Result<Arc<dyn ConductorApi>, ConfigError>
where
    F: FnOnce() -> Arc<dyn ConductorManager>,
    G: FnOnce() -> Arc<dyn RpcTransport>,
{
    config.validate()?;

    if config.use_local {
        let api = LocalApi::new(manager());
        info!(mode = api.mode_name(), "conductor api ready");
        return Ok(Arc::new(api));
    }

    let api = RemoteApi::new(transport(), config.topic.clone(), config.call_timeout());
    info!(
        mode = api.mode_name(),
        topic = %config.topic,
        call_timeout_ms = config.call_timeout_ms,
        "conductor api ready"
    );
    Ok(Arc::new(api))
}
