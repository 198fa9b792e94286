//! Bringing up the per-thread GPI when the simulator loads an entry point.

use tracing::{debug, info, warn};

use gpi_core::{global, log, Adapter, Gpi, GpiConfig};

use crate::error::{FfiError, Result};

/// Builds the adapter for a backend name (`vpi`, `vhpi`, `fli`); `None`
/// when the backend is not available in this build.
pub type AdapterFactory<'a> = dyn Fn(&str, &GpiConfig) -> Option<Box<dyn Adapter>> + 'a;

/// Entry-point bootstrap: configuration comes from the environment.
///
/// A malformed configuration is reported and the defaults are used, since
/// the simulator has no way to receive the failure.
pub fn load(backend: &str, factory: &AdapterFactory<'_>) -> Result<()> {
    let config = match GpiConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!(%err, "ignoring invalid configuration");
            GpiConfig::default()
        }
    };
    load_with(config, backend, factory)
}

/// Install the GPI if this thread has none, then register `backend` and
/// the configured extra adapters that are not registered yet.
///
/// Several entry points may fire in one process (mixed-language
/// simulation); the first one creates the instance and later ones add to
/// it.
pub fn load_with(config: GpiConfig, backend: &str, factory: &AdapterFactory<'_>) -> Result<()> {
    if !global::is_installed() {
        log::init(config.log_level);
        global::install(Gpi::new(config));
        info!(backend, "GPI initialised");
    }
    register(backend, factory)?;
    let extra = global::with(|gpi| Ok(gpi.config().extra.clone()))?;
    for name in extra {
        if let Err(err) = register(&name, factory) {
            warn!(adapter = %name, %err, "extra adapter not activated");
        }
    }
    Ok(())
}

fn register(name: &str, factory: &AdapterFactory<'_>) -> Result<()> {
    global::with(|gpi| {
        if gpi.adapter_names().iter().any(|n| *n == name) {
            debug!(adapter = name, "already registered");
            return Ok(Ok(()));
        }
        let Some(adapter) = factory(name, gpi.config()) else {
            return Ok(Err(FfiError::UnknownAdapter(name.to_string())));
        };
        gpi.register_adapter(adapter)?;
        Ok(Ok(()))
    })?
}
