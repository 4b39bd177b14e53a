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

use std::{num::NonZeroUsize, sync::Arc};

use log::info;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::querier::{Querier, QuerierError};

pub const ENUM_LIKE_TAG_TYPES: [&str; 3] = ["int_enum", "string_enum", "bit_enum"];
pub const TAG_METRIC_TYPE: i64 = 6;
pub const MAP_METRIC_TYPE: i64 = 7;
pub const MAP_TAG_TYPE: &str = "map";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagMeta {
    pub name: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub operators: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub not_supported_operators: Vec<String>,
}

impl TagMeta {
    pub fn is_enum_like(&self) -> bool {
        ENUM_LIKE_TAG_TYPES.contains(&self.kind.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricMeta {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub is_agg: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub operators: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionMeta {
    pub name: String,
    #[serde(default)]
    pub additional_param_count: usize,
    /// `None` marks a sub-function rather than an aggregation.
    #[serde(default)]
    pub support_metric_types: Option<Vec<i64>>,
}

impl FunctionMeta {
    pub fn is_sub_function(&self) -> bool {
        self.support_metric_types.is_none()
    }
}

/// Columns and functions available on one `(db, table)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub tags: Vec<TagMeta>,
    pub metrics: Vec<MetricMeta>,
    pub functions: Vec<FunctionMeta>,
}

impl TableConfig {
    /// Looks a tag up by its own name or one of its side names.
    pub fn tag(&self, key: &str) -> Option<&TagMeta> {
        self.tags
            .iter()
            .find(|tag| tag.name == key || tag.client_name == key || tag.server_name == key)
    }

    pub fn metric(&self, key: &str) -> Option<&MetricMeta> {
        self.metrics.iter().find(|metric| metric.name == key)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionMeta> {
        self.functions.iter().find(|func| func.name == name)
    }

    pub fn is_enum_tag(&self, key: &str) -> bool {
        self.tag(key).is_some_and(TagMeta::is_enum_like)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TableKey {
    db: String,
    table: String,
}

/// Table metadata loaded once per `(db, table)` and shared across requests.
///
/// Holds at most `capacity` tables; the least recently used one is dropped
/// first.
#[derive(Clone)]
pub struct TableCatalog {
    entries: Arc<Mutex<LruCache<TableKey, Arc<TableConfig>>>>,
}

impl TableCatalog {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub async fn get(&self, db: &str, table: &str) -> Option<Arc<TableConfig>> {
        let key = TableKey {
            db: db.to_string(),
            table: table.to_string(),
        };
        self.entries.lock().await.get(&key).cloned()
    }

    pub async fn insert(&self, db: &str, table: &str, config: TableConfig) -> Arc<TableConfig> {
        let key = TableKey {
            db: db.to_string(),
            table: table.to_string(),
        };
        let config = Arc::new(config);
        self.entries.lock().await.put(key, config.clone());
        config
    }

    pub async fn get_or_load(
        &self,
        querier: &dyn Querier,
        db: &str,
        table: &str,
    ) -> Result<Arc<TableConfig>, QuerierError> {
        if let Some(config) = self.get(db, table).await {
            return Ok(config);
        }
        let config = querier.load_table_config(db, table).await?;
        info!(
            "loaded metadata for {db}.{table}: {} tags, {} metrics, {} functions",
            config.tags.len(),
            config.metrics.len(),
            config.functions.len()
        );
        Ok(self.insert(db, table, config).await)
    }
}
