//! Multi-server connection management with deterministic tool routing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Result, TychoError};

use super::connection::ToolServerConnection;
use super::schema::ToolSchema;
use super::ToolServerSpec;

/// The aggregated, de-duplicated tool namespace across all live connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCatalog {
    tools: Vec<ToolSchema>,
}

impl ToolCatalog {
    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

struct ManagedConnection {
    name: String,
    connection: Arc<Mutex<ToolServerConnection>>,
}

/// Owns a named collection of tool-server connections, aggregates their
/// catalogs into one flat namespace, and routes calls to the owning server.
#[derive(Default)]
pub struct ConnectionManager {
    // Registration order is the collision precedence: first registered wins.
    connections: Mutex<Vec<ManagedConnection>>,
    routes: Mutex<HashMap<String, String>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to a tool server: build the transport, perform the handshake,
    /// and only then add the connection to the collection. Handshake
    /// failures surface the originating error without retry.
    pub async fn connect(&self, name: impl Into<String>, spec: &ToolServerSpec) -> Result<()> {
        let name = name.into();
        if self.has_connection(&name).await {
            return Err(TychoError::Configuration(format!(
                "tool server '{name}' is already connected"
            )));
        }

        let connection = ToolServerConnection::open(name.clone(), spec).await?;
        let mut connections = self.connections.lock().await;
        // Re-check: another task may have registered the name while the
        // handshake was in flight.
        if connections.iter().any(|c| c.name == name) {
            return Err(TychoError::Configuration(format!(
                "tool server '{name}' is already connected"
            )));
        }
        info!(server = %name, "tool server connected");
        connections.push(ManagedConnection {
            name,
            connection: Arc::new(Mutex::new(connection)),
        });
        Ok(())
    }

    /// Connect a batch of servers. In strict mode the first failure aborts
    /// and is returned; in lenient mode failures are logged and the rest of
    /// the batch proceeds with partial connectivity.
    pub async fn connect_all(
        &self,
        specs: &[(String, ToolServerSpec)],
        strict: bool,
    ) -> Result<()> {
        for (name, spec) in specs {
            match self.connect(name.clone(), spec).await {
                Ok(()) => {}
                Err(err) if strict => return Err(err),
                Err(err) => {
                    warn!(server = %name, error = %err, "tool server connection failed; continuing");
                }
            }
        }
        Ok(())
    }

    /// Disconnect every server and clear the catalog routing.
    pub async fn disconnect_all(&self) {
        let drained: Vec<ManagedConnection> = {
            let mut connections = self.connections.lock().await;
            connections.drain(..).collect()
        };
        for managed in drained {
            let mut connection = managed.connection.lock().await;
            if let Err(err) = connection.disconnect().await {
                warn!(server = %managed.name, error = %err, "disconnect failed");
            }
        }
        self.routes.lock().await.clear();
    }

    pub async fn connection_names(&self) -> Vec<String> {
        self.connections
            .lock()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Aggregate tool catalogs from all live connections into one flat
    /// namespace and refresh the routing map.
    ///
    /// On a name collision the first-registered server wins; the shadowed
    /// tool is logged, never silently dropped. A connection that fails to
    /// list leaves a degraded catalog (logged) rather than failing the
    /// aggregate.
    pub async fn all_tools(&self) -> Result<ToolCatalog> {
        let snapshot = self.connection_snapshot().await;
        let mut tools: Vec<ToolSchema> = Vec::new();
        let mut routes: HashMap<String, String> = HashMap::new();

        for (server_name, connection) in snapshot {
            let listed = {
                let mut connection = connection.lock().await;
                connection.list_tools().await
            };
            let listed = match listed {
                Ok(listed) => listed,
                Err(err) => {
                    warn!(server = %server_name, error = %err, "tool listing failed; catalog degraded");
                    continue;
                }
            };
            for tool in listed {
                match routes.get(&tool.name) {
                    Some(owner) => {
                        warn!(
                            tool = %tool.name,
                            owner = %owner,
                            shadowed = %server_name,
                            "tool name collision; first-registered server wins"
                        );
                    }
                    None => {
                        routes.insert(tool.name.clone(), server_name.clone());
                        tools.push(tool);
                    }
                }
            }
        }

        *self.routes.lock().await = routes;
        Ok(ToolCatalog { tools })
    }

    /// The server currently owning a tool name, if any.
    pub async fn route_for(&self, tool_name: &str) -> Option<String> {
        self.routes.lock().await.get(tool_name).cloned()
    }

    /// Execute a tool on its owning connection, applying that connection's
    /// call timeout. All failures come back as typed errors so callers can
    /// surface them as tool-result payloads.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        // Resolve the owner once; a later catalog refresh does not affect a
        // call already routed.
        let owner = match self.route_for(tool_name).await {
            Some(owner) => owner,
            None => {
                self.all_tools().await?;
                self.route_for(tool_name)
                    .await
                    .ok_or_else(|| TychoError::ToolNotFound(tool_name.to_owned()))?
            }
        };

        let connection = self
            .connection_by_name(&owner)
            .await
            .ok_or_else(|| TychoError::InvalidState(format!(
                "tool '{tool_name}' routes to missing server '{owner}'"
            )))?;

        let mut connection = connection.lock().await;
        connection.call_tool(tool_name, arguments).await
    }

    async fn has_connection(&self, name: &str) -> bool {
        self.connections.lock().await.iter().any(|c| c.name == name)
    }

    async fn connection_by_name(&self, name: &str) -> Option<Arc<Mutex<ToolServerConnection>>> {
        self.connections
            .lock()
            .await
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.connection.clone())
    }

    async fn connection_snapshot(&self) -> Vec<(String, Arc<Mutex<ToolServerConnection>>)> {
        self.connections
            .lock()
            .await
            .iter()
            .map(|c| (c.name.clone(), c.connection.clone()))
            .collect()
    }

    /// Register an already-open connection. Used by tests and embedders that
    /// construct transports directly.
    pub async fn register(&self, connection: ToolServerConnection) -> Result<()> {
        let name = connection.name().to_owned();
        let mut connections = self.connections.lock().await;
        if connections.iter().any(|c| c.name == name) {
            return Err(TychoError::Configuration(format!(
                "tool server '{name}' is already connected"
            )));
        }
        connections.push(ManagedConnection {
            name,
            connection: Arc::new(Mutex::new(connection)),
        });
        Ok(())
    }
}
