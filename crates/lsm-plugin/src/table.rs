//! Dispatch table mapping method names to handlers.
//!
//! The table always contains every known method name. Each entry is either
//! bound to a handler or explicitly absent, and the router treats an absent
//! entry exactly like a name it has never heard of.
//!
//! # Example
//!
//! ```ignore
//! use lsm_plugin::DispatchTable;
//! use serde_json::Value;
//!
//! let table = DispatchTable::builder()
//!     .bind("systems", |_: Value| async move {
//!         Ok(vec![serde_json::json!({"id": "sim-01"})])
//!     })
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use lsm_protocol::{ErrorCode, ErrorResponse, ProtocolError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{PluginError, PluginResult};

/// Method answered by the router itself from the plugin configuration.
pub const INFO_METHOD: &str = "plugin_info";

/// Method after which the router closes the connection.
pub const TEARDOWN_METHOD: &str = "plugin_unregister";

/// Every method name a plugin can implement.
pub const METHODS: &[&str] = &[
    // management
    "plugin_info",
    "plugin_register",
    "plugin_unregister",
    "systems",
    "capabilities",
    "time_out_set",
    "time_out_get",
    "pools",
    "job_status",
    "job_free",
    // block storage
    "volume_create",
    "volume_delete",
    "volumes",
    "disks",
    "volume_replicate",
    "volume_replicate_range",
    "volume_replicate_range_block_size",
    "volume_resize",
    "volume_enable",
    "volume_disable",
    "volume_mask",
    "volume_unmask",
    "volume_child_dependency",
    "volume_child_dependency_rm",
    "volumes_accessible_by_access_group",
    "access_groups",
    "access_group_create",
    "access_group_delete",
    "access_group_initiator_add",
    "access_group_initiator_delete",
    "access_groups_granted_to_volume",
    "iscsi_chap_auth",
    "target_ports",
    "volume_ident_led_on",
    "volume_ident_led_off",
    // file systems
    "fs",
    "fs_create",
    "fs_delete",
    "fs_resize",
    "fs_clone",
    "fs_file_clone",
    "fs_snapshot_create",
    "fs_snapshot_delete",
    "fs_snapshots",
    "fs_snapshot_restore",
    "fs_child_dependency",
    "fs_child_dependency_rm",
    // nfs
    "exports",
    "export_fs",
    "export_remove",
    "export_auth",
    // hba raid
    "volume_raid_create",
    "volume_raid_create_cap_get",
    "pool_member_info",
    "volume_raid_info",
    "batteries",
    // cache
    "system_read_cache_pct_update",
    "volume_cache_info",
    "volume_physical_disk_cache_update",
    "volume_write_cache_policy_update",
    "volume_read_cache_policy_update",
];

/// Future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ErrorResponse>> + Send>>;

/// Type-erased handler: raw params in, raw result or structured error out.
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Immutable method table shared by every connection of a plugin.
pub struct DispatchTable {
    entries: HashMap<&'static str, Option<Handler>>,
}

impl DispatchTable {
    /// Starts building a table with every method absent.
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::new()
    }

    /// Returns the handler for a method, if one is bound.
    pub fn get(&self, method: &str) -> Option<&Handler> {
        self.entries.get(method).and_then(Option::as_ref)
    }

    /// Returns the bound method names, sorted.
    pub fn bound_methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, handler)| handler.is_some())
            .map(|(method, _)| *method)
            .collect();
        methods.sort_unstable();
        methods
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("bound", &self.bound_methods())
            .finish()
    }
}

/// Builder for [`DispatchTable`].
///
/// Binding mistakes are collected and reported by [`build`](Self::build) so
/// that bindings can be chained.
pub struct DispatchTableBuilder {
    entries: HashMap<&'static str, Option<Handler>>,
    errors: Vec<PluginError>,
}

impl DispatchTableBuilder {
    fn new() -> Self {
        Self {
            entries: METHODS.iter().map(|method| (*method, None)).collect(),
            errors: Vec::new(),
        }
    }

    /// Binds a typed handler.
    ///
    /// Params are decoded into `P` before the handler runs; unknown fields
    /// such as `flags` are ignored by ordinary derived structs. A decode
    /// failure is answered with an invalid-argument error and the handler is
    /// not called.
    pub fn bind<P, R, F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ErrorResponse>> + Send + 'static,
    {
        let Some(name) = self.resolve(method) else {
            return self;
        };
        if self.entries.get(name).is_some_and(Option::is_some) {
            self.errors
                .push(PluginError::config(format!("method {} bound twice", name)));
            return self;
        }

        let handler: Handler = Arc::new(move |params: Value| -> HandlerFuture {
            let params: P = match serde_json::from_value(params) {
                Ok(params) => params,
                Err(e) => {
                    let error = ErrorResponse::new(
                        ErrorCode::TransportInvalidArg,
                        format!("{}: invalid argument(s) {}", name, e),
                    );
                    return Box::pin(async move { Err(error) });
                }
            };

            let fut = handler(params);
            Box::pin(async move {
                let result = fut.await?;
                serde_json::to_value(result).map_err(|e| ProtocolError::from(e).to_response())
            })
        });

        self.entries.insert(name, Some(handler));
        self
    }

    /// Binds a handler if one is supplied, otherwise marks the method as
    /// explicitly unsupported.
    pub fn optional<P, R, F, Fut>(self, method: &str, handler: Option<F>) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ErrorResponse>> + Send + 'static,
    {
        match handler {
            Some(handler) => self.bind(method, handler),
            None => self.unsupported(method),
        }
    }

    /// Marks a method as unsupported, removing any earlier binding.
    pub fn unsupported(mut self, method: &str) -> Self {
        if let Some(name) = self.resolve(method) {
            self.entries.insert(name, None);
        }
        self
    }

    /// Finishes the table, reporting the first binding mistake.
    pub fn build(self) -> PluginResult<DispatchTable> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        Ok(DispatchTable {
            entries: self.entries,
        })
    }

    fn resolve(&mut self, method: &str) -> Option<&'static str> {
        if method == INFO_METHOD {
            self.errors.push(PluginError::config(format!(
                "{} is answered by the router and cannot be bound",
                INFO_METHOD
            )));
            return None;
        }

        let name = METHODS.iter().copied().find(|name| *name == method);
        if name.is_none() {
            self.errors.push(PluginError::unknown_method(method));
        }
        name
    }
}
