//! Backend selection and construction.

use std::sync::Arc;

use evrys_db::DbRuntimeSettings;
use serde::Deserialize;
use tracing::Span;

use crate::document::{DocumentConfig, DocumentStore};
use crate::error::StoreError;
use crate::sqlite::SqliteStore;
use crate::{AppendOnly, Query};

/// Which backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Document,
    WideColumn,
}

/// Settings for the embedded SQLite backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: String,
    pub busy_timeout_ms: u64,
    pub pool_max_size: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        let runtime = DbRuntimeSettings::default();
        Self {
            path: "evrys.db".to_string(),
            busy_timeout_ms: runtime.busy_timeout_ms,
            pool_max_size: runtime.pool_max_size,
        }
    }
}

/// The `[store]` configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub sqlite: SqliteConfig,
    pub document: Option<DocumentConfig>,
    #[cfg(feature = "wide-column")]
    pub wide_column: Option<crate::wide_column::WideColumnConfig>,
}

/// The capabilities of an opened backend.
///
/// Both handles point at the same backend client when the backend can
/// query.
#[derive(Clone)]
pub struct OpenedStore {
    pub append: Arc<dyn AppendOnly>,
    pub query: Option<Arc<dyn Query>>,
}

impl std::fmt::Debug for OpenedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStore")
            .field("query", &self.query.is_some())
            .finish_non_exhaustive()
    }
}

fn missing_section(field: &'static str) -> StoreError {
    StoreError::Validation {
        config: "store",
        field,
        reason: "section is required for the selected kind".to_string(),
    }
}

/// Opens the backend selected by `config.kind`.
///
/// # Errors
///
/// `Validation` when the selected backend's section is missing or invalid;
/// otherwise whatever the backend's constructor reports.
pub async fn open_store(config: &StoreConfig, span: Span) -> Result<OpenedStore, StoreError> {
    match config.kind {
        StoreKind::Sqlite => {
            let settings = DbRuntimeSettings {
                busy_timeout_ms: config.sqlite.busy_timeout_ms,
                pool_max_size: config.sqlite.pool_max_size,
            };
            let path = config.sqlite.path.clone();
            let store = tokio::task::spawn_blocking(move || SqliteStore::open(&path, settings, span))
                .await
                .map_err(|e| StoreError::connection("sqlite", e))??;
            let store = Arc::new(store);
            let query: Arc<dyn Query> = store.clone();
            Ok(OpenedStore {
                append: store,
                query: Some(query),
            })
        }
        StoreKind::Document => {
            let document = config
                .document
                .as_ref()
                .ok_or_else(|| missing_section("document"))?;
            let store = Arc::new(DocumentStore::connect(document, span).await?);
            let query: Arc<dyn Query> = store.clone();
            Ok(OpenedStore {
                append: store,
                query: Some(query),
            })
        }
        #[cfg(feature = "wide-column")]
        StoreKind::WideColumn => {
            let wide_column = config
                .wide_column
                .as_ref()
                .ok_or_else(|| missing_section("wide_column"))?;
            let store = crate::wide_column::WideColumnStore::connect(wide_column, span).await?;
            Ok(OpenedStore {
                append: Arc::new(store),
                query: None,
            })
        }
        #[cfg(not(feature = "wide-column"))]
        StoreKind::WideColumn => Err(StoreError::Validation {
            config: "store",
            field: "kind",
            reason: "wide-column support was not compiled in (enable the `wide-column` feature)"
                .to_string(),
        }),
    }
}
