//! Client session with a storage plugin.

use std::path::Path;

use lsm_protocol::{Capabilities, Transport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Description and version reported by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub description: String,
    pub version: String,
    /// Plugin name taken from the registration URI, empty if unregistered.
    pub name: String,
}

/// Initiator side of a plugin connection.
///
/// Requests are strictly sequential: every method takes `&mut self` and
/// waits for the response before returning.
#[derive(Debug)]
pub struct Client<S> {
    pub(crate) transport: Transport<S>,
    pub(crate) config: ClientConfig,
    plugin_name: Option<String>,
}

impl Client<UnixStream> {
    /// Connects to a plugin socket without registering.
    pub async fn connect(path: impl AsRef<Path>, config: ClientConfig) -> ClientResult<Self> {
        let path = path.as_ref();
        debug!(socket = %path.display(), "connecting to plugin");

        let connect = UnixStream::connect(path);
        let stream = match config.io_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                ClientError::connection(format!(
                    "connection to {} timed out after {:?}",
                    path.display(),
                    limit
                ))
            })?,
            None => connect.await,
        }
        .map_err(|e| {
            ClientError::connection(format!("failed to connect to {}: {}", path.display(), e))
        })?;

        Ok(Self::new(stream, config))
    }

    /// Connects to the plugin named by the URI scheme and registers.
    ///
    /// The socket is looked up as `<socket_dir>/<scheme>`.
    pub async fn open(
        uri: &str,
        password: Option<&str>,
        timeout_ms: u32,
        config: ClientConfig,
    ) -> ClientResult<Self> {
        let plugin = plugin_name(uri)?;
        let path = config.plugin_socket(&plugin);
        let mut client = Self::connect(&path, config).await?;
        client.register(uri, password, timeout_ms).await?;
        Ok(client)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S, config: ClientConfig) -> Self {
        Self {
            transport: Transport::new(stream).with_timeout(config.io_timeout),
            config,
            plugin_name: None,
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the registered plugin name.
    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin_name.as_deref()
    }

    /// Calls a method and decodes its result.
    pub async fn invoke<T>(&mut self, method: &str, params: Map<String, Value>) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        Ok(self.transport.invoke(method, params).await?)
    }

    pub(crate) async fn call<T>(&mut self, method: &str, params: Value) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        self.invoke(method, into_params(params)).await
    }

    /// Registers with the plugin.
    ///
    /// The URI must parse; its scheme names the plugin.
    pub async fn register(
        &mut self,
        uri: &str,
        password: Option<&str>,
        timeout_ms: u32,
    ) -> ClientResult<()> {
        let plugin = plugin_name(uri)?;
        self.call::<()>(
            "plugin_register",
            json!({"uri": uri, "password": password, "timeout": timeout_ms}),
        )
        .await?;

        info!(plugin = %plugin, "registered with plugin");
        self.plugin_name = Some(plugin);
        Ok(())
    }

    /// Asks the plugin to shut down and closes the connection.
    ///
    /// The stream is shut down even when `plugin_unregister` fails; that
    /// failure is still returned.
    pub async fn close(mut self) -> ClientResult<()> {
        let result = self.call::<()>("plugin_unregister", json!({})).await;
        if let Err(e) = self.transport.shutdown().await {
            warn!(error = %e, "failed to shut down plugin connection");
        }

        info!(plugin = self.plugin_name.as_deref().unwrap_or(""), "connection closed");
        result
    }

    /// Returns the plugin description and version.
    pub async fn plugin_info(&mut self) -> ClientResult<PluginInfo> {
        let (description, version): (String, String) =
            self.call("plugin_info", json!({})).await?;
        Ok(PluginInfo {
            description,
            version,
            name: self.plugin_name.clone().unwrap_or_default(),
        })
    }

    /// Sets the plugin's timeout for talking to the storage system.
    pub async fn time_out_set(&mut self, ms: u32) -> ClientResult<()> {
        self.call("time_out_set", json!({"ms": ms})).await
    }

    /// Returns the plugin's timeout for talking to the storage system.
    pub async fn time_out_get(&mut self) -> ClientResult<u32> {
        self.call("time_out_get", json!({})).await
    }

    /// Returns the capabilities of a system.
    pub async fn capabilities(&mut self, system: &impl Serialize) -> ClientResult<Capabilities> {
        self.call("capabilities", json!({"system": system})).await
    }

    /// Lists systems.
    pub async fn systems<T: DeserializeOwned>(&mut self) -> ClientResult<Vec<T>> {
        self.call("systems", json!({})).await
    }

    /// Lists pools, optionally filtered by a `[key, value]` search.
    pub async fn pools<T: DeserializeOwned>(&mut self, search: &[&str]) -> ClientResult<Vec<T>> {
        let params = search_params("pools", search)?;
        self.invoke("pools", params).await
    }

    /// Lists volumes, optionally filtered by a `[key, value]` search.
    pub async fn volumes<T: DeserializeOwned>(&mut self, search: &[&str]) -> ClientResult<Vec<T>> {
        let params = search_params("volumes", search)?;
        self.invoke("volumes", params).await
    }

    /// Lists file systems, optionally filtered by a `[key, value]` search.
    pub async fn fs<T: DeserializeOwned>(&mut self, search: &[&str]) -> ClientResult<Vec<T>> {
        let params = search_params("fs", search)?;
        self.invoke("fs", params).await
    }

    /// Lists NFS exports, optionally filtered by a `[key, value]` search.
    pub async fn exports<T: DeserializeOwned>(&mut self, search: &[&str]) -> ClientResult<Vec<T>> {
        let params = search_params("exports", search)?;
        self.invoke("exports", params).await
    }

    /// Lists disks.
    pub async fn disks<T: DeserializeOwned>(&mut self) -> ClientResult<Vec<T>> {
        self.call("disks", json!({})).await
    }
}

/// Extracts the plugin name (the scheme) from a registration URI.
pub fn plugin_name(uri: &str) -> ClientResult<String> {
    let parsed = Url::parse(uri).map_err(|e| ClientError::InvalidUri {
        uri: uri.to_string(),
        message: e.to_string(),
    })?;
    Ok(parsed.scheme().to_string())
}

/// Builds the params of a listing call. Searches take no argument or a
/// key and a value.
fn search_params(method: &str, search: &[&str]) -> ClientResult<Map<String, Value>> {
    let (key, value) = match search {
        [] => (Value::Null, Value::Null),
        [key, value] => (Value::from(*key), Value::from(*value)),
        _ => {
            return Err(ClientError::invalid_argument(format!(
                "{} supports 0 or 2 search parameters (key, value), provided {}",
                method,
                search.len()
            )));
        }
    };

    let mut params = Map::new();
    params.insert("search_key".into(), key);
    params.insert("search_value".into(), value);
    Ok(params)
}

pub(crate) fn into_params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
