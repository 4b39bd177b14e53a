// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use log::{info, warn};

use crate::{
    catalog::{TableCatalog, TableConfig},
    error::AppError,
    querier::{HttpQuerier, Querier, QuerierConfig},
};

use super::session::SqlCache;

pub const DEFAULT_SQL_CACHE_CAPACITY: usize = 1024;
pub const DEFAULT_TABLE_CACHE_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    querier: Arc<dyn Querier>,
    catalog: TableCatalog,
    sql_cache: SqlCache,
}

impl AppState {
    pub async fn bootstrap(config: AppConfig) -> Result<Self, AppError> {
        let AppConfig {
            querier,
            sql_cache_capacity,
            table_cache_capacity,
        } = config;
        info!("querier endpoint {}", querier.querier_url);
        match &querier.compiler_url {
            Some(url) => info!("sql compiler endpoint {url}"),
            None => warn!("no sql compiler endpoint configured; /api/v1/query will reject requests"),
        }
        let querier = HttpQuerier::new(querier)
            .map_err(|err| AppError::Config(format!("failed to build querier client: {err}")))?;
        let state = Self::new(Arc::new(querier), sql_cache_capacity, table_cache_capacity);
        verify_connection(state.querier()).await;
        Ok(state)
    }

    pub fn new(
        querier: Arc<dyn Querier>,
        sql_cache_capacity: usize,
        table_cache_capacity: usize,
    ) -> Self {
        Self {
            querier,
            catalog: TableCatalog::new(table_cache_capacity),
            sql_cache: SqlCache::new(sql_cache_capacity),
        }
    }

    pub fn querier(&self) -> &dyn Querier {
        self.querier.as_ref()
    }

    pub fn sql_cache(&self) -> &SqlCache {
        &self.sql_cache
    }

    /// Metadata for `(db, table)`, loaded on first use.
    ///
    /// Failures are logged and compilation continues without metadata.
    pub async fn table_config(&self, db: &str, table: &str) -> Option<Arc<TableConfig>> {
        if db.is_empty() || table.is_empty() {
            return None;
        }
        match self.catalog.get_or_load(self.querier(), db, table).await {
            Ok(config) => Some(config),
            Err(err) => {
                warn!("metadata for {db}.{table} unavailable: {err}");
                None
            }
        }
    }
}

pub struct AppConfig {
    pub querier: QuerierConfig,
    pub sql_cache_capacity: usize,
    pub table_cache_capacity: usize,
}

async fn verify_connection(querier: &dyn Querier) {
    match querier.databases().await {
        Ok(databases) => info!("connected to querier; {} databases visible", databases.len()),
        Err(err) => warn!("querier not reachable at startup: {err}"),
    }
}
