use std::sync::Arc;

use rowsheet_common::{RemoteError, RowError};
use rowsheet_gateway::{DocumentGateway, GoogleSheets, MemoryStore, SnapshotError};

use crate::auth::TokenProvider;
use crate::config::{BackendKind, ServerConfig};
use crate::error::ApiError;

/// The engine requests are served from.
#[derive(Clone)]
pub enum Backend {
    /// A fresh Sheets client per request, authorized with the stored token.
    Google,
    Memory(Arc<MemoryStore>),
}

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    backend: Backend,
    auth: Arc<TokenProvider>,
}

impl AppState {
    pub fn new(backend: Backend, auth: TokenProvider) -> Self {
        Self {
            backend,
            auth: Arc::new(auth),
        }
    }

    /// Memory-backed state, e.g. for tests. The token provider points at
    /// the default paths and is only used by the auth routes.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        let defaults = ServerConfig::default();
        Self::new(
            Backend::Memory(store),
            TokenProvider::new(defaults.credentials_path, defaults.token_path),
        )
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, SnapshotError> {
        let backend = match config.backend {
            BackendKind::Google => Backend::Google,
            BackendKind::Memory => Backend::Memory(Arc::new(match &config.snapshot_path {
                Some(path) => MemoryStore::with_snapshot(path)?,
                None => MemoryStore::new(),
            })),
        };
        let auth = TokenProvider::new(&config.credentials_path, &config.token_path);
        Ok(Self::new(backend, auth))
    }

    pub fn auth(&self) -> &Arc<TokenProvider> {
        &self.auth
    }

    /// Hand `f` a gateway for this request. Blocking.
    pub fn with_gateway<T>(
        &self,
        f: impl FnOnce(&dyn DocumentGateway) -> Result<T, RowError>,
    ) -> Result<T, RowError> {
        match &self.backend {
            Backend::Memory(store) => f(store.as_ref()),
            Backend::Google => {
                let token = self.auth.access_token()?;
                let sheets = GoogleSheets::new(token).map_err(RowError::remote_read)?;
                f(&sheets)
            }
        }
    }

    /// Run `f` against the gateway on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DocumentGateway) -> Result<T, RowError> + Send + 'static,
    {
        let state = self.clone();
        self.blocking(move || state.with_gateway(f)).await
    }

    /// Run any blocking closure on the blocking pool.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RowError> + Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.map_err(|e| {
            ApiError(RowError::remote_read(RemoteError::transport(format!(
                "request task failed: {e}"
            ))))
        })?
        .map_err(ApiError)
    }
}
