//! Inbound path routing.
//!
//! ```text
//! /register                        subscribe a control UI
//! /unregister                      drop it
//! /<client>/<NN>/<method>          per-plugin command, NN = zero-padded id
//! /<client>/<NN>/bridge_<method>   report from the bridge hosting plugin NN
//! ```
//!
//! The two global methods are also accepted under the client prefix.

use crate::{OscError, Result};
use consort_core::PluginId;

pub const BRIDGE_PREFIX: &str = "bridge_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Register,
    Unregister,
    Plugin { id: PluginId, method: &'a str },
    Bridge { id: PluginId, method: &'a str },
}

impl<'a> Route<'a> {
    pub fn parse(path: &'a str, client_name: &str) -> Result<Self> {
        let invalid = || OscError::InvalidPath(path.to_string());
        let rest = path.strip_prefix('/').ok_or_else(invalid)?;
        match rest {
            "register" => return Ok(Route::Register),
            "unregister" => return Ok(Route::Unregister),
            _ => {}
        }

        let rest = rest
            .strip_prefix(client_name)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| OscError::WrongClient {
                path: path.to_string(),
                client: client_name.to_string(),
            })?;
        match rest {
            "register" => return Ok(Route::Register),
            "unregister" => return Ok(Route::Unregister),
            _ => {}
        }

        let (id, method) = rest.split_once('/').ok_or_else(invalid)?;
        if id.len() != 2 || !id.bytes().all(|b| b.is_ascii_digit()) || method.is_empty() {
            return Err(invalid());
        }
        let id: PluginId = id.parse().map_err(|_| invalid())?;
        Ok(match method.strip_prefix(BRIDGE_PREFIX) {
            Some(bridge_method) if !bridge_method.is_empty() => Route::Bridge {
                id,
                method: bridge_method,
            },
            _ => Route::Plugin { id, method },
        })
    }
}

/// `/<client>/<NN>` for a plugin id.
pub fn plugin_prefix(client_name: &str, id: PluginId) -> String {
    format!("/{}/{:02}", client_name, id)
}

pub fn plugin_path(client_name: &str, id: PluginId, method: &str) -> String {
    format!("{}/{}", plugin_prefix(client_name, id), method)
}
