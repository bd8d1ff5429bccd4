//! Bridge loader: runs plugins in a `consort-bridge` child process.

use crate::backend::BridgeBackend;
use crate::config::BridgeConfig;
use crate::protocol::{BridgeArgs, BridgeReport};
use crate::shared::BridgeShared;
use crate::supervisor::Supervisor;
use crate::BridgeError;
use consort_core::{
    Error, InternalLoader, LoadContext, LoadRequest, PluginBackend, PluginId, PluginLoader,
    PluginType,
};
use consort_osc::{BridgeRouter, ChannelHandle, OscError, OscMessage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Which bridge answers for which plugin id.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<PluginId, Arc<BridgeShared>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: PluginId, shared: Arc<BridgeShared>) {
        self.routes.write().insert(id, shared);
    }

    pub fn get(&self, id: PluginId) -> Option<Arc<BridgeShared>> {
        self.routes.read().get(&id).cloned()
    }

    /// Remove `id` only while it still points at `shared`.
    pub fn remove(&self, id: PluginId, shared: &Arc<BridgeShared>) {
        let mut routes = self.routes.write();
        if routes.get(&id).is_some_and(|current| Arc::ptr_eq(current, shared)) {
            routes.remove(&id);
        }
    }

    /// Move `shared` from `old` to `new`, replacing whatever was at `new`.
    pub fn rekey(&self, old: PluginId, new: PluginId, shared: &Arc<BridgeShared>) {
        let mut routes = self.routes.write();
        if routes.get(&old).is_some_and(|current| Arc::ptr_eq(current, shared)) {
            routes.remove(&old);
        }
        routes.insert(new, shared.clone());
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

/// Wraps another loader. Requests the engine marks as bridged are spawned
/// in a child process; everything else goes to the inner loader.
///
/// Install it both as the engine's loader and as the control channel's
/// bridge router, and hand it the channel with
/// [`set_channel`](Self::set_channel).
pub struct BridgeLoader {
    inner: Arc<dyn PluginLoader>,
    config: BridgeConfig,
    channel: RwLock<Option<ChannelHandle>>,
    routes: Arc<RouteTable>,
}

impl std::fmt::Debug for BridgeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeLoader")
            .field("config", &self.config)
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

impl BridgeLoader {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_inner(Arc::new(InternalLoader), config)
    }

    pub fn with_inner(inner: Arc<dyn PluginLoader>, config: BridgeConfig) -> Self {
        Self {
            inner,
            config,
            channel: RwLock::new(None),
            routes: Arc::new(RouteTable::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn set_channel(&self, channel: Option<ChannelHandle>) {
        *self.channel.write() = channel;
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// `Bridge` requests carry the real type in `extra`; anything else is
    /// bridged as-is.
    fn real_type(request: &LoadRequest) -> Result<PluginType, BridgeError> {
        if request.plugin_type != PluginType::Bridge {
            return Ok(request.plugin_type);
        }
        match request.extra.as_deref() {
            None | Some("") => Ok(PluginType::Internal),
            Some(extra) => extra.parse().map_err(BridgeError::InvalidArgs),
        }
    }

    fn load_bridged(
        &self,
        request: &LoadRequest,
        ctx: &LoadContext,
    ) -> Result<Box<dyn PluginBackend>, BridgeError> {
        let channel = self.channel.read().clone().ok_or(BridgeError::NoChannel)?;
        let plugin_type = Self::real_type(request)?;
        if plugin_type == PluginType::Bridge {
            return Err(BridgeError::InvalidArgs("a bridge cannot host a bridge".into()));
        }
        let args = BridgeArgs {
            host_url: channel.plugin_url(ctx.id).to_string(),
            plugin_type,
            filename: request.filename.clone(),
            label: request.label.clone(),
            name: request.name.clone(),
        };

        let shared = Arc::new(BridgeShared::new(ctx.id, ctx.postponed.clone()));
        // Reports can arrive before spawn returns.
        self.routes.insert(ctx.id, shared.clone());

        let result = Supervisor::spawn(
            &args,
            ctx.sample_rate,
            ctx.buffer_size,
            shared.clone(),
            channel,
            self.config.clone(),
        )
        .and_then(|mut supervisor| {
            supervisor.wait_for_handshake()?;
            BridgeBackend::attach(supervisor, self.routes.clone())
        });
        match result {
            Ok(backend) => {
                tracing::info!(id = ctx.id, label = %request.label, "bridge ready");
                Ok(Box::new(backend))
            }
            Err(e) => {
                self.routes.remove(ctx.id, &shared);
                Err(e)
            }
        }
    }
}

impl PluginLoader for BridgeLoader {
    fn load(
        &self,
        request: &LoadRequest,
        ctx: &LoadContext,
    ) -> consort_core::Result<Box<dyn PluginBackend>> {
        if !ctx.bridged {
            return self.inner.load(request, ctx);
        }
        self.load_bridged(request, ctx).map_err(Error::from)
    }

    fn plugin_removed(&self, id: PluginId) {
        // Routes follow their backends; see `BridgeBackend::drop`.
        self.inner.plugin_removed(id);
    }
}

impl BridgeRouter for BridgeLoader {
    fn handle(&self, id: PluginId, method: &str, message: &OscMessage) -> consort_osc::Result<()> {
        let shared = self.routes.get(id).ok_or(OscError::NoBridge(id))?;
        let report = BridgeReport::parse(method, message).map_err(into_osc)?;
        tracing::trace!(id, method, "bridge report");
        shared.handle_report(report).map_err(into_osc)
    }
}

fn into_osc(err: BridgeError) -> OscError {
    match err {
        BridgeError::Osc(inner) => inner,
        other => OscError::Decode(other.to_string()),
    }
}
