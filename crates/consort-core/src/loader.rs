//! Plugin loaders: turn a load request into a backend.

use crate::backend::PluginBackend;
use crate::internal;
use crate::postponed::PostponedEvents;
use crate::types::{BinaryType, PluginId, PluginType};
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// What to load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub plugin_type: PluginType,
    pub binary_type: BinaryType,
    pub filename: PathBuf,
    /// Display name; derived from the plugin when `None`.
    pub name: Option<String>,
    pub label: String,
    /// Format-specific extra data (e.g. a bridged plugin's real type).
    pub extra: Option<String>,
}

impl LoadRequest {
    pub fn new(plugin_type: PluginType, filename: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            plugin_type,
            binary_type: BinaryType::Native,
            filename: filename.into(),
            name: None,
            label: label.into(),
            extra: None,
        }
    }

    /// A built-in plugin by label.
    pub fn internal(label: impl Into<String>) -> Self {
        Self::new(PluginType::Internal, PathBuf::new(), label)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_binary_type(mut self, binary_type: BinaryType) -> Self {
        self.binary_type = binary_type;
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Engine-side context handed to a loader.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub id: PluginId,
    pub client_name: String,
    pub sample_rate: f64,
    pub buffer_size: usize,
    /// The future plugin's postponed queue, for backends that receive
    /// changes asynchronously.
    pub postponed: Arc<PostponedEvents>,
    /// The engine decided this request must run out of process.
    pub bridged: bool,
}

pub trait PluginLoader: Send + Sync {
    fn load(&self, request: &LoadRequest, ctx: &LoadContext) -> Result<Box<dyn PluginBackend>>;

    /// Called when a plugin loaded by this loader is renumbered or removed,
    /// so routing tables keyed by id can follow.
    fn plugin_removed(&self, _id: PluginId) {}
}

/// Loads the built-in plugins.
#[derive(Debug, Default, Clone, Copy)]
pub struct InternalLoader;

impl PluginLoader for InternalLoader {
    fn load(&self, request: &LoadRequest, ctx: &LoadContext) -> Result<Box<dyn PluginBackend>> {
        if ctx.bridged {
            return Err(Error::BridgeUnavailable(format!(
                "no bridge loader installed for '{}'",
                request.label
            )));
        }
        match request.plugin_type {
            PluginType::Internal => internal::create(&request.label, ctx.sample_rate)
                .ok_or_else(|| Error::LoadFailed(format!("unknown internal plugin '{}'", request.label))),
            other => Err(Error::UnsupportedType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(bridged: bool) -> LoadContext {
        LoadContext {
            id: 0,
            client_name: "Consort".into(),
            sample_rate: 48000.0,
            buffer_size: 64,
            postponed: Arc::new(PostponedEvents::new(150)),
            bridged,
        }
    }

    #[test]
    fn test_internal_loader() {
        let loader = InternalLoader;
        let backend = loader.load(&LoadRequest::internal("gain"), &ctx(false)).unwrap();
        assert_eq!(backend.label(), "gain");

        assert!(matches!(
            loader.load(&LoadRequest::internal("nope"), &ctx(false)),
            Err(Error::LoadFailed(_))
        ));
        assert!(matches!(
            loader.load(&LoadRequest::new(PluginType::Lv2, "/x.so", "x"), &ctx(false)),
            Err(Error::UnsupportedType(PluginType::Lv2))
        ));
        assert!(matches!(
            loader.load(&LoadRequest::internal("gain"), &ctx(true)),
            Err(Error::BridgeUnavailable(_))
        ));
    }
}
