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

//! Contracts with the DeepFlow querier and the SQL compiler.

mod http;
mod metadata;

pub use http::{HttpQuerier, QuerierConfig};
pub use metadata::{table_config_from_results, tag_values_from_result};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    catalog::TableConfig,
    compiler::{QueryPayload, TIME_FROM_PLACEHOLDER, TIME_TO_PLACEHOLDER, TimeRange},
};

const SUCCESS_STATUS: &str = "SUCCESS";
/// Prefix the panel puts in front of trace ids.
pub const ID_PREFIX: &str = "id-";
const FLOW_TRACING_DATABASE: &str = "flow_log";
const FLOW_TRACING_TABLE: &str = "l7_flow_log";
const FLOW_TRACING_MAX_ITERATION: u32 = 30;
const FLOW_TRACING_NETWORK_DELAY_US: u64 = 3_000_000;

#[derive(Debug, Error)]
pub enum QuerierError {
    #[error("sql compiler rejected payload: {0}")]
    Compile(String),
    #[error("querier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("querier responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected querier response: {0}")]
    Decode(String),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

/// Optional form fields sent along with a SQL statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlOptions<'a> {
    /// Panel data source granularity, sent as `data_precision`.
    pub data_precision: &'a str,
    /// Sent as `datasource` by template-variable queries.
    pub datasource: &'a str,
}

impl<'a> SqlOptions<'a> {
    pub fn data_precision(data_precision: &'a str) -> Self {
        Self {
            data_precision,
            ..Self::default()
        }
    }

    pub fn datasource(datasource: &'a str) -> Self {
        Self {
            datasource,
            ..Self::default()
        }
    }
}

/// One result row keyed by column name.
pub type Record = Map<String, Value>;

/// Columns and positional rows returned by `/v1/query/`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn records(&self) -> Vec<Record> {
        self.values
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// First column of every row as text; used by `show databases` style listings.
    pub fn first_column(&self) -> Vec<String> {
        self.values
            .iter()
            .filter_map(|row| row.first())
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "OPT_STATUS", default)]
    opt_status: Option<String>,
    #[serde(rename = "DESCRIPTION", default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<RawResult>,
}

#[derive(Deserialize)]
struct RawResult {
    columns: Option<Vec<String>>,
    #[serde(default)]
    values: Option<Vec<Vec<Value>>>,
}

/// Decodes a querier response body. `values: null` is an empty result.
pub fn decode_query_response(body: &[u8]) -> Result<QueryResult, QuerierError> {
    let envelope: QueryEnvelope = serde_json::from_slice(body)
        .map_err(|err| QuerierError::Decode(format!("invalid json: {err}")))?;
    if let Some(status) = envelope.opt_status.as_deref() {
        if !status.is_empty() && status != SUCCESS_STATUS {
            return Err(QuerierError::Decode(format!(
                "{status}: {}",
                envelope.description.unwrap_or_default()
            )));
        }
    }
    let result = envelope
        .result
        .ok_or_else(|| QuerierError::Decode("missing field `result`".into()))?;
    let columns = result
        .columns
        .ok_or_else(|| QuerierError::Decode("missing field `result.columns`".into()))?;
    let values = result.values.unwrap_or_default();
    if let Some(row) = values.iter().find(|row| row.len() != columns.len()) {
        return Err(QuerierError::Decode(format!(
            "row has {} values for {} columns",
            row.len(),
            columns.len()
        )));
    }
    Ok(QueryResult { columns, values })
}

/// A metric column the compiled SQL returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMetric {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The SQL compiler's answer for one payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub sql: String,
    #[serde(default)]
    pub return_tags: Vec<Value>,
    #[serde(default)]
    pub return_metrics: Vec<ReturnMetric>,
}

/// Return tags are either bare names or objects carrying a `name`.
pub fn tag_name(tag: &Value) -> Option<&str> {
    match tag {
        Value::String(name) => Some(name),
        Value::Object(fields) => fields.get("name").and_then(Value::as_str),
        _ => None,
    }
}

impl CompiledQuery {
    pub fn metric(&self, name: &str) -> Option<&ReturnMetric> {
        self.return_metrics.iter().find(|metric| metric.name == name)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompilerResponse {
    Resources { resource: Vec<CompiledQuery> },
    Single(CompiledQuery),
}

/// Accepts `{sql, returnTags, returnMetrics}` or `{resource: [...]}`.
pub fn decode_compiled_query(body: &[u8]) -> Result<CompiledQuery, QuerierError> {
    let response: CompilerResponse = serde_json::from_slice(body)
        .map_err(|err| QuerierError::Decode(format!("invalid compiler response: {err}")))?;
    match response {
        CompilerResponse::Single(query) => Ok(query),
        CompilerResponse::Resources { resource } => resource
            .into_iter()
            .next()
            .ok_or_else(|| QuerierError::Compile("compiler returned no resource".into())),
    }
}

/// One choice offered for a tag, as listed by `show tag <tag> values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagValue {
    pub value: Value,
    #[serde(default)]
    pub display_name: String,
}

/// Body of the querier's `L7FlowTracing` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowTracingRequest {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "DATABASE")]
    pub database: String,
    #[serde(rename = "TABLE")]
    pub table: String,
    #[serde(rename = "MAX_ITERATION")]
    pub max_iteration: u32,
    #[serde(rename = "NETWORK_DELAY_US")]
    pub network_delay_us: u64,
    pub time_start: i64,
    pub time_end: i64,
}

impl FlowTracingRequest {
    /// Traces the span `id` (with or without the `id-` prefix) within `range`.
    pub fn new(id: &str, range: TimeRange) -> Self {
        Self {
            id: id.strip_prefix(ID_PREFIX).unwrap_or(id).to_string(),
            database: FLOW_TRACING_DATABASE.to_string(),
            table: FLOW_TRACING_TABLE.to_string(),
            max_iteration: FLOW_TRACING_MAX_ITERATION,
            network_delay_us: FLOW_TRACING_NETWORK_DELAY_US,
            time_start: range.from,
            time_end: range.to,
        }
    }
}

#[derive(Deserialize)]
struct FlowTracingEnvelope {
    #[serde(rename = "DATA", default)]
    data: Option<Map<String, Value>>,
}

/// The services and spans of one trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowTrace {
    pub services: Value,
    pub tracing: Vec<Record>,
}

/// Decodes the `DATA` object of a flow tracing response. Both `services` and
/// `tracing` must be present.
pub fn decode_flow_tracing(body: &[u8]) -> Result<FlowTrace, QuerierError> {
    let envelope: FlowTracingEnvelope = serde_json::from_slice(body)
        .map_err(|err| QuerierError::Decode(format!("invalid flow tracing response: {err}")))?;
    let mut data = envelope.data.unwrap_or_default();
    let services = data.remove("services").filter(|value| !value.is_null());
    let tracing = data.remove("tracing").filter(|value| !value.is_null());
    let (Some(services), Some(tracing)) = (services, tracing) else {
        return Err(QuerierError::Decode("flow tracing returned no data".into()));
    };
    let tracing = serde_json::from_value(tracing)
        .map_err(|err| QuerierError::Decode(format!("invalid flow tracing spans: {err}")))?;
    Ok(FlowTrace { services, tracing })
}

/// Replaces the time-bound placeholders, quoted or bare, with unix seconds.
pub fn substitute_time_placeholders(sql: &str, range: TimeRange) -> String {
    let from = range.from.to_string();
    let to = range.to.to_string();
    sql.replace(&format!("'{TIME_FROM_PLACEHOLDER}'"), &from)
        .replace(&format!("'{TIME_TO_PLACEHOLDER}'"), &to)
        .replace(TIME_FROM_PLACEHOLDER, &from)
        .replace(TIME_TO_PLACEHOLDER, &to)
}

#[async_trait]
pub trait Querier: Send + Sync {
    /// Runs `sql` on the querier, sending the non-empty `options` as form fields.
    async fn execute_sql(
        &self,
        db: &str,
        sql: &str,
        options: SqlOptions<'_>,
    ) -> Result<QueryResult, QuerierError>;

    async fn compile(&self, payload: &QueryPayload) -> Result<CompiledQuery, QuerierError>;

    /// Follows one span through the services it touched.
    async fn trace_flow(&self, request: &FlowTracingRequest) -> Result<FlowTrace, QuerierError>;

    async fn databases(&self) -> Result<Vec<String>, QuerierError> {
        Ok(self
            .execute_sql("", "show databases", SqlOptions::default())
            .await?
            .first_column())
    }

    async fn tables(&self, db: &str) -> Result<Vec<String>, QuerierError> {
        Ok(self
            .execute_sql(db, "show tables", SqlOptions::default())
            .await?
            .first_column())
    }

    async fn tag_values(
        &self,
        db: &str,
        table: &str,
        tag: &str,
    ) -> Result<Vec<TagValue>, QuerierError> {
        let sql = format!("show tag {tag} values from {table}");
        let result = self.execute_sql(db, &sql, SqlOptions::default()).await?;
        Ok(tag_values_from_result(&result))
    }

    async fn load_table_config(&self, db: &str, table: &str) -> Result<TableConfig, QuerierError> {
        let none = SqlOptions::default();
        let tags = self
            .execute_sql(db, &format!("show tags from {table}"), none)
            .await?;
        let metrics = self
            .execute_sql(db, &format!("show metrics from {table}"), none)
            .await?;
        let functions = self.execute_sql(db, "show metric function", none).await?;
        Ok(table_config_from_results(&tags, &metrics, &functions))
    }
}
