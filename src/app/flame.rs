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

//! Flame data for one trace: the traced spans, their services and the full
//! detail row of every span.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    catalog::{MAP_METRIC_TYPE, MAP_TAG_TYPE, TAG_METRIC_TYPE, TableConfig, TagMeta},
    compiler::{
        CondValue, Condition, ConditionGroup, ConditionNode, Conditions, Expr, Junction,
        QueryPayload, ResourceSet, Selection, Selects, TimeRange,
    },
    editor::SELECT_GROUP_BY_DISABLE_TAGS,
    error::AppError,
    querier::{FlowTracingRequest, Querier, Record, SqlOptions, TagValue},
    query::{Operator, QueryForm, RowKind, Scalar},
};

use super::{
    frames::{Field, FieldKind, Frame, FrameMeta, value_to_string},
    state::AppState,
};

const TRACE_DB: &str = "flow_log";
const TRACE_TABLE: &str = "l7_flow_log";
const TRANSLATED_TAGS: [&str; 3] = ["l7_protocol", "response_status", "tap_side"];
const PROTOCOL_TAG: &str = "l7_protocol";
const UNNAMED_PROTOCOLS: [i64; 2] = [0, 1];
const SPAN_IDS_KEY: &str = "_ids";
const ID_KEY: &str = "_id";
const ID_COLUMN: &str = "toString(_id)";
const ORDER_KEY: &str = "start_time";
const ENUM_FUNC: &str = "Enum";
const METRICS_CATEGORY: &str = "Metrics";
const UNCATEGORIZED: &str = "N/A";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlameData {
    pub services: Value,
    pub tracing: Vec<Record>,
    /// Span detail keyed by `_id`, then by tag category.
    pub detail_list: Map<String, Value>,
}

/// Frames for an `appTracingFlame` panel. A form without a tracing id yields
/// no frames.
pub async fn flame_frames(
    state: &AppState,
    form: &QueryForm,
    range: TimeRange,
) -> Result<Vec<Frame>, AppError> {
    let Some(id) = form
        .tracing_id
        .as_ref()
        .map(|item| item.value.to_string())
        .filter(|id| !id.is_empty())
    else {
        return Ok(Vec::new());
    };
    let data = flame_data(state, &id, range).await?;
    Ok(vec![flame_frame(data)])
}

fn flame_frame(data: FlameData) -> Frame {
    let field = |name: &str, value: Value| Field {
        name: name.to_string(),
        kind: FieldKind::Other,
        values: vec![value],
    };
    Frame {
        name: String::new(),
        fields: vec![
            field("services", data.services),
            field("tracing", Value::Array(data.tracing.into_iter().map(Value::Object).collect())),
            field("detailList", Value::Object(data.detail_list)),
        ],
        meta: FrameMeta::default(),
    }
}

async fn flame_data(state: &AppState, id: &str, range: TimeRange) -> Result<FlameData, AppError> {
    let querier = state.querier();
    let trace = querier.trace_flow(&FlowTracingRequest::new(id, range)).await?;

    let mut names = HashMap::new();
    for tag in TRANSLATED_TAGS {
        let values = querier.tag_values(TRACE_DB, TRACE_TABLE, tag).await?;
        names.insert(tag, display_names(values));
    }

    let detail_list = match state.table_config(TRACE_DB, TRACE_TABLE).await {
        Some(config) if !trace.tracing.is_empty() => {
            span_details(querier, &config, &trace.tracing).await?
        }
        _ => Map::new(),
    };
    let tracing = trace
        .tracing
        .into_iter()
        .map(|span| translate_span(span, &names))
        .collect();
    Ok(FlameData {
        services: trace.services,
        tracing,
        detail_list,
    })
}

fn display_names(values: Vec<TagValue>) -> HashMap<String, String> {
    values
        .into_iter()
        .map(|item| (value_to_string(&item.value), item.display_name))
        .collect()
}

/// Adds an `Enum(<tag>)` display field for each translated tag.
fn translate_span(mut span: Record, names: &HashMap<&str, HashMap<String, String>>) -> Record {
    for tag in TRANSLATED_TAGS {
        let raw = span.get(tag).cloned().unwrap_or(Value::Null);
        let display = if tag == PROTOCOL_TAG
            && raw.as_i64().is_some_and(|code| UNNAMED_PROTOCOLS.contains(&code))
        {
            Value::String(String::new())
        } else {
            names
                .get(tag)
                .and_then(|names| names.get(&value_to_string(&raw)))
                .map(|name| Value::String(name.clone()))
                .unwrap_or(raw)
        };
        span.insert(format!("{ENUM_FUNC}({tag})"), display);
    }
    span
}

/// A column selected for span detail.
#[derive(Debug, Clone, PartialEq)]
struct DetailTag {
    category: String,
    column: String,
    is_json: bool,
    is_enum: bool,
}

impl DetailTag {
    fn result_column(&self) -> String {
        if self.is_enum {
            format!("{ENUM_FUNC}({})", self.column)
        } else {
            self.column.clone()
        }
    }
}

/// Every displayable tag of the table, split into client and server columns.
/// Attribute tags of a map category collapse into the map tag itself.
fn detail_tags(config: &TableConfig) -> Vec<DetailTag> {
    let map_tags: Vec<&TagMeta> = config
        .tags
        .iter()
        .filter(|tag| tag.kind == MAP_TAG_TYPE)
        .collect();
    let mut columns = Vec::new();
    for tag in &config.tags {
        let is_json = map_tags.iter().any(|map| map.category == tag.category);
        let is_main_json = map_tags.iter().any(|map| map.name == tag.name);
        if SELECT_GROUP_BY_DISABLE_TAGS.contains(&tag.name.as_str()) || (is_json && !is_main_json) {
            continue;
        }
        let detail = |category: String, column: &str| DetailTag {
            category,
            column: column.to_string(),
            is_json,
            is_enum: tag.is_enum_like(),
        };
        let unsided = (tag.name == tag.client_name && tag.name == tag.server_name)
            || (tag.client_name.is_empty() && tag.server_name.is_empty());
        if unsided {
            columns.push(detail(tag.category.clone(), &tag.name));
            continue;
        }
        for (side, column) in [("client", &tag.client_name), ("server", &tag.server_name)] {
            if column.is_empty() {
                continue;
            }
            let category = if is_json {
                format!("{} - {side}", tag.category)
            } else {
                tag.category.clone()
            };
            columns.push(detail(category, column.as_str()));
        }
    }
    columns
}

/// Metrics worth showing: tag-backed metrics and attributes of map metrics
/// are left out.
fn detail_metrics(config: &TableConfig) -> Vec<String> {
    let map_metrics: Vec<_> = config
        .metrics
        .iter()
        .filter(|metric| metric.kind == MAP_METRIC_TYPE)
        .collect();
    config
        .metrics
        .iter()
        .filter(|metric| {
            let is_json = map_metrics.iter().any(|map| map.category == metric.category);
            let is_main_json = map_metrics.iter().any(|map| map.name == metric.name);
            metric.kind != TAG_METRIC_TYPE && !(is_json && !is_main_json)
        })
        .map(|metric| metric.name.clone())
        .collect()
}

fn span_ids(spans: &[Record]) -> Vec<Scalar> {
    spans
        .iter()
        .filter_map(|span| span.get(SPAN_IDS_KEY))
        .flat_map(|ids| match ids {
            Value::Array(ids) => ids.clone(),
            other => vec![other.clone()],
        })
        .filter_map(|id| serde_json::from_value(id).ok())
        .collect()
}

fn detail_payload(tags: &[DetailTag], metrics: &[String], ids: Vec<Scalar>) -> QueryPayload {
    let tag_selections = tags
        .iter()
        .map(|tag| {
            if tag.is_enum {
                Selection::Expr(Expr {
                    func: ENUM_FUNC.to_string(),
                    ..Expr::key(tag.column.clone())
                })
            } else {
                Selection::Key(tag.column.clone())
            }
        })
        .collect();
    let by_id = ids
        .into_iter()
        .map(|id| ConditionNode::Leaf(Condition::tag(ID_KEY, Operator::Eq, CondValue::One(id))))
        .collect();
    QueryPayload {
        format: "sql",
        db: TRACE_DB.to_string(),
        table_name: TRACE_TABLE.to_string(),
        selects: Selects {
            tags: tag_selections,
            metrics: metrics.iter().cloned().map(Selection::Key).collect(),
        },
        conditions: Conditions {
            resource_sets: vec![ResourceSet {
                id: "0".to_string(),
                is_forbidden: false,
                condition: vec![ConditionNode::Group(ConditionGroup {
                    kind: RowKind::Tag,
                    op: Junction::Or,
                    val: by_id,
                })],
            }],
        },
        group_by: Vec::new(),
        order_by: vec![Expr::key(ORDER_KEY)],
        slimit: None,
        limit: String::new(),
        offset: String::new(),
    }
}

async fn span_details(
    querier: &dyn Querier,
    config: &TableConfig,
    spans: &[Record],
) -> Result<Map<String, Value>, AppError> {
    let ids = span_ids(spans);
    if ids.is_empty() {
        return Ok(Map::new());
    }
    let tags = detail_tags(config);
    let payload = detail_payload(&tags, &detail_metrics(config), ids);
    let compiled = querier.compile(&payload).await?;
    let result = querier
        .execute_sql(TRACE_DB, &compiled.sql, SqlOptions::default())
        .await?;
    let metric_kinds: Vec<(&str, i64)> = compiled
        .return_metrics
        .iter()
        .map(|metric| (metric.name.as_str(), metric.kind))
        .collect();
    Ok(result
        .records()
        .iter()
        .filter_map(|row| {
            let id = row.get(ID_KEY).or_else(|| row.get(ID_COLUMN))?;
            Some((value_to_string(id), span_detail(row, &tags, &metric_kinds)))
        })
        .collect())
}

/// One span's values grouped by tag category, with a trailing `Metrics` group.
fn span_detail(row: &Record, tags: &[DetailTag], metric_kinds: &[(&str, i64)]) -> Value {
    let mut categories: Vec<(&str, Vec<&DetailTag>)> = Vec::new();
    for tag in tags {
        match categories.iter_mut().find(|(name, _)| *name == tag.category) {
            Some((_, members)) => members.push(tag),
            None => categories.push((tag.category.as_str(), vec![tag])),
        }
    }

    let mut detail = Map::new();
    for (category, members) in categories {
        let values: Map<String, Value> = if members[0].is_json {
            parse_object(row.get(&members[0].result_column()))
                .into_iter()
                .map(|(name, value)| (name, display_value(Some(&value))))
                .collect()
        } else {
            members
                .iter()
                .map(|tag| {
                    let column = tag.result_column();
                    let value = display_value(row.get(&column));
                    (column, value)
                })
                .collect()
        };
        let category = if category.is_empty() { UNCATEGORIZED } else { category };
        detail.insert(category.to_string(), Value::Object(values));
    }

    let mut metrics = Map::new();
    let mut map_metrics = Map::new();
    for (name, kind) in metric_kinds {
        let value = row.get(*name);
        if *kind == MAP_METRIC_TYPE {
            map_metrics.extend(parse_object(value));
        } else {
            metrics.insert(name.to_string(), value.cloned().unwrap_or(Value::Null));
        }
    }
    metrics.extend(map_metrics);
    detail.insert(METRICS_CATEGORY.to_string(), Value::Object(metrics));
    Value::Object(detail)
}

/// Non-empty values become text; empty strings and nulls are kept as they are.
fn display_value(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(text)) => Value::String(text.clone()),
        Some(other) => Value::String(value_to_string(other)),
    }
}

/// Map columns arrive as JSON text; an empty or unreadable column is empty.
fn parse_object(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::String(text)) => serde_json::from_str(text).unwrap_or_default(),
        Some(Value::Object(fields)) => fields.clone(),
        _ => Map::new(),
    }
}
