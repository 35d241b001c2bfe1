//! Module retrieval and instantiation.
//!
//! `load` is two sequential fallible stages: fetch the artifact bytes
//! ([`HostError::Load`] on failure), then validate and instantiate them
//! ([`HostError::Instantiation`]). A returned [`Instance`] is always fully
//! callable; no partially-initialized handle is observable.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::Engine;
use crate::instance::Instance;
use crate::module::Module;
use crate::HostError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a module artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    Path(PathBuf),
    Url(String),
}

impl ModuleSource {
    /// Classify a raw location string: anything with an http(s) scheme is
    /// fetched over the network, everything else is a filesystem path.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            ModuleSource::Url(raw.to_string())
        } else {
            ModuleSource::Path(PathBuf::from(raw))
        }
    }

    pub fn location(&self) -> String {
        match self {
            ModuleSource::Path(path) => path.display().to_string(),
            ModuleSource::Url(url) => url.clone(),
        }
    }
}

/// Fetches module bytes and produces a ready-to-call [`Instance`].
#[derive(Default)]
pub struct ModuleLoader {
    engine: Engine,
}

impl ModuleLoader {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Retrieve, validate, and instantiate a module. No global state is
    /// mutated; the only effect is the returned handle.
    pub fn load(&self, source: &ModuleSource) -> Result<Instance, HostError> {
        let bytes = self.fetch(source)?;
        tracing::debug!(location = %source.location(), len = bytes.len(), "module bytes retrieved");

        let module = Module::from_bytes(&self.engine, &bytes)?;
        let instance = Instance::new(&module)?;
        tracing::info!(
            location = %source.location(),
            exports = module.exports().len(),
            "module instantiated"
        );
        Ok(instance)
    }

    fn fetch(&self, source: &ModuleSource) -> Result<Vec<u8>, HostError> {
        let load_err = |reason: String| HostError::Load {
            location: source.location(),
            reason,
        };

        match source {
            ModuleSource::Path(path) => std::fs::read(path).map_err(|e| load_err(e.to_string())),
            ModuleSource::Url(url) => {
                let client = reqwest::blocking::Client::builder()
                    .timeout(FETCH_TIMEOUT)
                    .build()
                    .map_err(|e| load_err(e.to_string()))?;
                let response = client
                    .get(url)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| load_err(e.to_string()))?;
                let bytes = response.bytes().map_err(|e| load_err(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        }
    }
}
