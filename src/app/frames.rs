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

//! Shapes querier rows into table or per-series frames.

use std::{cmp::Ordering, collections::BTreeMap};

use serde::Serialize;
use serde_json::Value;

use crate::{
    catalog::MAP_METRIC_TYPE,
    compiler::{AccessRelationshipConfig, access_relationship_config},
    querier::{CompiledQuery, ID_PREFIX, QuerierError, QueryResult, Record, ReturnMetric, tag_name},
    query::{AppType, FormatAs, QueryForm},
};

const ID_COLUMN: &str = "toString(_id)";
const ID_KEY: &str = "_id";
const TIME_MARKER: &str = "time";
const DEFAULT_SERIES_PREFIX: &str = "*";
const SERIES_PREFIX_SEPARATOR: &str = "，";
const GROUP_BY_MARKER: &str = "GROUP BY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Time,
    Number,
    String,
    /// Structured JSON passed through untouched.
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameCustom {
    pub return_tags: Vec<Value>,
    pub return_metrics: Vec<ReturnMetric>,
    #[serde(flatten)]
    pub relationship: Option<AccessRelationshipConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameMeta {
    pub custom: FrameCustom,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
    pub meta: FrameMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Time,
    Metric,
    Tag,
    /// A `time`-named column with non-numeric values: shown as text, never grouped on.
    Text,
}

struct Column<'a> {
    name: &'a str,
    role: Role,
    metric: Option<&'a ReturnMetric>,
}

/// Shapes a querier result for the panel.
///
/// Time series queries that group yield one frame per distinct tag tuple;
/// everything else is a single table frame.
pub fn shape_frames(
    result: &QueryResult,
    compiled: &CompiledQuery,
    form: &QueryForm,
) -> Result<Vec<Frame>, QuerierError> {
    let records: Vec<Record> = result.records().into_iter().map(prepare_record).collect();
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let columns = classify_columns(first, compiled);
    let meta = frame_meta(compiled, form);

    let grouped = form.format_as == Some(FormatAs::TimeSeries)
        && compiled.sql.to_ascii_uppercase().contains(GROUP_BY_MARKER);
    if !grouped {
        let rows: Vec<&Record> = records.iter().collect();
        let fields = columns
            .iter()
            .map(|column| build_field(column, column.name.to_string(), &rows, true))
            .collect::<Result<Vec<_>, QuerierError>>()?;
        return Ok(vec![Frame {
            name: String::new(),
            fields,
            meta,
        }]);
    }

    let tag_keys: Vec<&str> = columns
        .iter()
        .filter(|column| column.role == Role::Tag)
        .map(|column| column.name)
        .collect();
    let time_key = columns
        .iter()
        .find(|column| column.role == Role::Time)
        .map(|column| column.name);
    let show_metrics = match form.show_metrics {
        1 => true,
        0 => false,
        _ => compiled.return_metrics.len() > 1,
    };

    let mut buckets: BTreeMap<Vec<String>, Vec<&Record>> = BTreeMap::new();
    for record in &records {
        let key = tag_keys
            .iter()
            .map(|key| record.get(*key).map(value_to_string).unwrap_or_default())
            .collect::<Vec<_>>();
        buckets.entry(key).or_default().push(record);
    }

    let mut frames = Vec::with_capacity(buckets.len());
    for mut rows in buckets.into_values() {
        if let Some(time_key) = time_key {
            sort_by_time(&mut rows, time_key);
        }
        let prefix = series_prefix(&form.alias, &tag_keys, rows[0]);
        let fields = columns
            .iter()
            .map(|column| {
                let name = match column.role {
                    Role::Metric if show_metrics => format!("{prefix}-{}", column.name),
                    Role::Metric => prefix.clone(),
                    _ => column.name.to_string(),
                };
                build_field(column, name, &rows, false)
            })
            .collect::<Result<Vec<_>, QuerierError>>()?;
        frames.push(Frame {
            name: String::new(),
            fields,
            meta: meta.clone(),
        });
    }
    Ok(frames)
}

fn prepare_record(mut record: Record) -> Record {
    if let Some(id) = record.remove(ID_COLUMN) {
        record.insert(
            ID_KEY.to_string(),
            Value::String(format!("{ID_PREFIX}{}", value_to_string(&id))),
        );
    }
    for side in [ResourceSide::Client, ResourceSide::Server] {
        if record.contains_key(&format!("{}node_type", side.prefix())) {
            add_resource_fields(&mut record, side);
        }
    }
    record
}

fn classify_columns<'a>(first: &'a Record, compiled: &'a CompiledQuery) -> Vec<Column<'a>> {
    let mut names: Vec<&str> = first.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
        .into_iter()
        .map(|name| {
            let metric = compiled.metric(name);
            let role = if metric.is_some() {
                Role::Metric
            } else if name.contains(TIME_MARKER) {
                if first.get(name).is_some_and(Value::is_number) {
                    Role::Time
                } else {
                    Role::Text
                }
            } else {
                Role::Tag
            };
            Column { name, role, metric }
        })
        .collect()
}

fn frame_meta(compiled: &CompiledQuery, form: &QueryForm) -> FrameMeta {
    let return_tags: Vec<Value> = compiled
        .return_tags
        .iter()
        .filter_map(custom_return_tag)
        .collect();
    let relationship = (form.app_type == AppType::AccessRelationship).then(|| {
        let names: Vec<&str> = return_tags.iter().filter_map(tag_name).collect();
        access_relationship_config(&form.group_by, &names)
    });
    FrameMeta {
        custom: FrameCustom {
            return_tags,
            return_metrics: compiled.return_metrics.clone(),
            relationship,
        },
    }
}

/// Time tags are dropped and quotes are stripped from the rest.
fn custom_return_tag(tag: &Value) -> Option<Value> {
    let name = tag_name(tag)?;
    if name.contains(TIME_MARKER) {
        return None;
    }
    let name = Value::String(name.replace('\'', ""));
    Some(match tag {
        Value::Object(fields) => {
            let mut fields = fields.clone();
            fields.insert("name".to_string(), name);
            Value::Object(fields)
        }
        _ => name,
    })
}

fn build_field(
    column: &Column<'_>,
    name: String,
    rows: &[&Record],
    check_map_metrics: bool,
) -> Result<Field, QuerierError> {
    let kind = match column.role {
        Role::Time => FieldKind::Time,
        Role::Metric
            if check_map_metrics
                && column.metric.is_some_and(|metric| metric.kind == MAP_METRIC_TYPE) =>
        {
            FieldKind::String
        }
        Role::Metric => FieldKind::Number,
        Role::Tag | Role::Text => FieldKind::String,
    };
    let values = rows
        .iter()
        .map(|row| {
            let value = row.get(column.name).unwrap_or(&Value::Null);
            match kind {
                FieldKind::Time => Ok(time_millis(value)),
                FieldKind::Number => metric_number(column.name, value).map(Value::from),
                FieldKind::String => Ok(Value::String(value_to_string(value))),
                FieldKind::Other => Ok(value.clone()),
            }
        })
        .collect::<Result<Vec<_>, QuerierError>>()?;
    Ok(Field { name, kind, values })
}

/// Unix seconds as milliseconds; anything but a number is null.
fn time_millis(value: &Value) -> Value {
    value
        .as_f64()
        .map(|seconds| Value::from((seconds * 1000.0).trunc() as i64))
        .unwrap_or(Value::Null)
}

fn metric_number(column: &str, value: &Value) -> Result<Option<f64>, QuerierError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        Value::String(text) => text.trim().parse().map(Some).map_err(|_| {
            QuerierError::Decode(format!("metric column `{column}` has value {value}"))
        }),
        other => Err(QuerierError::Decode(format!(
            "metric column `{column}` has value {other}"
        ))),
    }
}

/// Stable sort on the time column; rows without a numeric time go last.
fn sort_by_time(rows: &mut [&Record], time_key: &str) {
    rows.sort_by(|left, right| {
        let left = left.get(time_key).and_then(Value::as_f64);
        let right = right.get(time_key).and_then(Value::as_f64);
        match (left, right) {
            (Some(left), Some(right)) => left.total_cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn series_prefix(alias: &str, tag_keys: &[&str], first: &Record) -> String {
    let rendered = render_alias(alias, first);
    if !rendered.is_empty() {
        return rendered;
    }
    let joined = tag_keys
        .iter()
        .filter(|key| !key.contains(ID_KEY))
        .filter_map(|key| first.get(*key))
        .map(value_to_string)
        .collect::<Vec<_>>()
        .join(SERIES_PREFIX_SEPARATOR);
    if joined.is_empty() {
        DEFAULT_SERIES_PREFIX.to_string()
    } else {
        joined
    }
}

/// Replaces `${column}` with the row's value; unknown placeholders stay as written.
pub fn render_alias(alias: &str, record: &Record) -> String {
    let mut rendered = String::with_capacity(alias.len());
    let mut rest = alias;
    while let Some(start) = rest.find("${") {
        let Some(length) = rest[start..].find('}') else {
            break;
        };
        let placeholder = &rest[start..=start + length];
        let name = &placeholder[2..placeholder.len() - 1];
        rendered.push_str(&rest[..start]);
        match record.get(name) {
            Some(value) if !name.contains(char::is_whitespace) => {
                rendered.push_str(&value_to_string(value))
            }
            _ => rendered.push_str(placeholder),
        }
        rest = &rest[start + length + 1..];
    }
    rendered.push_str(rest);
    rendered
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceSide {
    Client,
    Server,
}

impl ResourceSide {
    fn prefix(self) -> &'static str {
        match self {
            ResourceSide::Client => "client_",
            ResourceSide::Server => "server_",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ResourceSide::Client => "_0",
            ResourceSide::Server => "_1",
        }
    }

    /// Auto-group columns in lookup order.
    fn auto_groups(self) -> [&'static str; 2] {
        match self {
            ResourceSide::Client => ["auto_instance", "auto_service"],
            ResourceSide::Server => ["auto_service", "auto_instance"],
        }
    }
}

fn is_resource_group_level(stem: &str) -> bool {
    stem.strip_prefix("resource_gl")
        .is_some_and(|level| level.len() == 1 && level.chars().all(|c| c.is_ascii_digit()))
}

fn resource_group_prefix(record: &Record, side: ResourceSide) -> Option<String> {
    let id_suffix = format!("_id{}", side.suffix());
    if let Some(group) = side
        .auto_groups()
        .into_iter()
        .find(|group| record.contains_key(&format!("{group}{id_suffix}")))
    {
        return Some(group.to_string());
    }
    record
        .keys()
        .filter_map(|key| key.strip_suffix(id_suffix.as_str()))
        .find(|stem| is_resource_group_level(stem))
        .map(str::to_string)
}

fn lookup(record: &Record, key: &str) -> Value {
    record.get(key).cloned().unwrap_or(Value::Null)
}

/// Adds `<side>_resource_type`, `<side>_resource_id` and `<side>_resource`.
fn add_resource_fields(record: &mut Record, side: ResourceSide) {
    let (prefix, suffix) = (side.prefix(), side.suffix());

    if record.contains_key(&format!("gprocess{suffix}")) {
        let id = lookup(record, &format!("gprocess_id{suffix}"));
        let name = lookup(record, &format!("gprocess{suffix}"));
        record.insert(format!("{prefix}resource_id"), id);
        record.insert(format!("{prefix}resource"), name);
        return;
    }

    let node_type = record
        .get(&format!("{prefix}node_type"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let group = resource_group_prefix(record, side).unwrap_or_else(|| node_type.clone());

    let (id, name) = if node_type == "ip" || node_type == "internet_ip" {
        let name = lookup(record, &format!("{group}{suffix}"));
        let id = lookup(record, &format!("{group}_id{suffix}"));
        (
            Value::String(format!("{}({})", value_to_string(&name), value_to_string(&id))),
            name,
        )
    } else {
        let id = record
            .get(&format!("{node_type}_id{suffix}"))
            .cloned()
            .unwrap_or_else(|| lookup(record, &format!("{group}_id{suffix}")));
        let name = record
            .get(&format!("{node_type}{suffix}"))
            .cloned()
            .unwrap_or_else(|| lookup(record, &format!("{group}{suffix}")));
        (id, name)
    };
    record.insert(format!("{prefix}resource_type"), Value::String(node_type));
    record.insert(format!("{prefix}resource_id"), id);
    record.insert(format!("{prefix}resource"), name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Row, SideType};
    use serde_json::json;

    fn result(columns: &[&str], values: Value) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            values: serde_json::from_value(values).unwrap(),
        }
    }

    fn compiled(sql: &str, metrics: Value) -> CompiledQuery {
        serde_json::from_value(json!({
            "sql": sql,
            "returnTags": ["tap_side", "time_60"],
            "returnMetrics": metrics
        }))
        .unwrap()
    }

    fn time_series_form() -> QueryForm {
        QueryForm {
            format_as: Some(FormatAs::TimeSeries),
            ..QueryForm::default()
        }
    }

    fn field<'a>(frame: &'a Frame, name: &str) -> &'a Field {
        frame.fields.iter().find(|field| field.name == name).unwrap()
    }

    #[test]
    fn empty_results_produce_no_frames() {
        let frames = shape_frames(
            &result(&["a"], json!([])),
            &compiled("SELECT a", json!([])),
            &QueryForm::default(),
        )
        .unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn table_frame_sorts_and_types_columns() {
        let data = result(
            &["time_60", "tap_side", "byte", "attrs", "toString(_id)"],
            json!([[120, "c", 10, "{\"a\":1}", 42], [60, "s", null, "{}", 43]]),
        );
        let query = compiled(
            "SELECT 1",
            json!([{"name": "byte", "type": 1}, {"name": "attrs", "type": 7}]),
        );
        let form = QueryForm {
            format_as: Some(FormatAs::Table),
            ..QueryForm::default()
        };
        let frames = shape_frames(&data, &query, &form).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        let names: Vec<&str> = frame.fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["_id", "attrs", "byte", "tap_side", "time_60"]);
        assert_eq!(field(frame, "_id").values, vec![json!("id-42"), json!("id-43")]);
        assert_eq!(field(frame, "attrs").kind, FieldKind::String);
        assert_eq!(field(frame, "byte").kind, FieldKind::Number);
        assert_eq!(field(frame, "byte").values, vec![json!(10.0), Value::Null]);
        assert_eq!(field(frame, "time_60").kind, FieldKind::Time);
        assert_eq!(field(frame, "time_60").values, vec![json!(120_000), json!(60_000)]);
        assert_eq!(frame.meta.custom.return_tags, vec![json!("tap_side")]);
    }

    #[test]
    fn grouped_series_split_by_tags_and_sort_by_time() {
        let data = result(
            &["time_60", "tap_side", "byte"],
            json!([[120, "c", 2], [60, "c", 1], [60, "s", 5]]),
        );
        let query = compiled("SELECT ... GROUP BY tap_side", json!([{"name": "byte", "type": 1}]));
        let frames = shape_frames(&data, &query, &time_series_form()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(field(&frames[0], "c").values, vec![json!(1.0), json!(2.0)]);
        assert_eq!(field(&frames[0], "time_60").values, vec![json!(60_000), json!(120_000)]);
        assert_eq!(field(&frames[1], "s").values, vec![json!(5.0)]);
    }

    #[test]
    fn commas_in_tag_values_keep_series_apart() {
        let data = result(
            &["time_60", "pod", "region", "byte"],
            json!([[60, "x,y", "z", 1], [60, "x", "y,z", 2]]),
        );
        let query = compiled("SELECT GROUP BY pod, region", json!([{"name": "byte", "type": 1}]));
        let frames = shape_frames(&data, &query, &time_series_form()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(field(&frames[0], "x，y,z").values, vec![json!(2.0)]);
        assert_eq!(field(&frames[1], "x,y，z").values, vec![json!(1.0)]);
    }

    #[test]
    fn null_times_sort_last_and_stay_null() {
        let data = result(
            &["time_60", "tap_side", "byte"],
            json!([[120, "c", 2], [null, "c", 9], [60, "c", 1]]),
        );
        let query = compiled("SELECT ... GROUP BY tap_side", json!([{"name": "byte", "type": 1}]));
        let frames = shape_frames(&data, &query, &time_series_form()).unwrap();
        assert_eq!(
            field(&frames[0], "time_60").values,
            vec![json!(60_000), json!(120_000), Value::Null]
        );
        assert_eq!(field(&frames[0], "c").values, vec![json!(1.0), json!(2.0), json!(9.0)]);
    }

    #[test]
    fn sub_second_times_keep_milliseconds() {
        let data = result(&["time_0.5", "byte"], json!([[1.5, 3], [2.25, 4]]));
        let query = compiled("SELECT byte", json!([{"name": "byte", "type": 1}]));
        let frames = shape_frames(&data, &query, &QueryForm::default()).unwrap();
        assert_eq!(
            field(&frames[0], "time_0.5").values,
            vec![json!(1_500), json!(2_250)]
        );
    }

    #[test]
    fn show_metrics_prefixes_series_names() {
        let data = result(
            &["time_60", "tap_side", "byte", "packet"],
            json!([[60, "c", 1, 2]]),
        );
        let query = compiled(
            "select ... group by tap_side",
            json!([{"name": "byte", "type": 1}, {"name": "packet", "type": 1}]),
        );
        let frames = shape_frames(&data, &query, &time_series_form()).unwrap();
        assert!(frames[0].fields.iter().any(|field| field.name == "c-byte"));
        assert!(frames[0].fields.iter().any(|field| field.name == "c-packet"));

        let hidden = QueryForm {
            show_metrics: 0,
            ..time_series_form()
        };
        let frames = shape_frames(&data, &query, &hidden).unwrap();
        let metric_names: Vec<&str> = frames[0]
            .fields
            .iter()
            .filter(|field| field.kind == FieldKind::Number)
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(metric_names, vec!["c", "c"]);
    }

    #[test]
    fn alias_templates_name_series() {
        let data = result(&["time_60", "pod", "pod_id", "byte"], json!([[60, "web", 7, 3]]));
        let query = compiled("SELECT GROUP BY pod", json!([{"name": "byte", "type": 1}]));
        let form = QueryForm {
            alias: "${pod}/${missing}".into(),
            ..time_series_form()
        };
        let frames = shape_frames(&data, &query, &form).unwrap();
        assert!(frames[0].fields.iter().any(|field| field.name == "web/${missing}"));

        let unaliased = shape_frames(&data, &query, &time_series_form()).unwrap();
        assert!(unaliased[0].fields.iter().any(|field| field.name == "web"));
    }

    #[test]
    fn series_without_tags_use_star() {
        let data = result(&["time_60", "byte"], json!([[60, 3]]));
        let query = compiled("SELECT GROUP BY time_60", json!([{"name": "byte", "type": 1}]));
        let frames = shape_frames(&data, &query, &time_series_form()).unwrap();
        assert!(frames[0].fields.iter().any(|field| field.name == "*"));
    }

    #[test]
    fn non_numeric_metric_values_are_errors() {
        let data = result(&["byte"], json!([[true]]));
        let query = compiled("SELECT byte", json!([{"name": "byte", "type": 1}]));
        assert!(shape_frames(&data, &query, &QueryForm::default()).is_err());
    }

    #[test]
    fn enriches_client_and_server_resources() {
        let mut record: Record = serde_json::from_value(json!({
            "client_node_type": "pod",
            "pod_0": "web-1",
            "pod_id_0": 11,
            "auto_instance_0": "web-1",
            "auto_instance_id_0": 11,
            "server_node_type": "ip",
            "auto_service_1": "10.0.0.1",
            "auto_service_id_1": 0
        }))
        .unwrap();
        record = prepare_record(record);
        assert_eq!(record["client_resource_type"], json!("pod"));
        assert_eq!(record["client_resource_id"], json!(11));
        assert_eq!(record["client_resource"], json!("web-1"));
        assert_eq!(record["server_resource_type"], json!("ip"));
        assert_eq!(record["server_resource_id"], json!("10.0.0.1(0)"));
        assert_eq!(record["server_resource"], json!("10.0.0.1"));
    }

    #[test]
    fn gprocess_takes_priority() {
        let record: Record = serde_json::from_value(json!({
            "client_node_type": "pod",
            "gprocess_0": "nginx",
            "gprocess_id_0": 5,
            "pod_0": "web-1"
        }))
        .unwrap();
        let record = prepare_record(record);
        assert_eq!(record["client_resource_id"], json!(5));
        assert_eq!(record["client_resource"], json!("nginx"));
        assert!(!record.contains_key("client_resource_type"));
    }

    #[test]
    fn relationship_meta_carries_sides() {
        let data = result(&["auto_service_id_0", "auto_service_id_1", "byte"], json!([[1, 2, 3]]));
        let query = compiled("SELECT 1", json!([{"name": "byte", "type": 1}]));
        let form = QueryForm {
            app_type: AppType::AccessRelationship,
            group_by: vec![
                Row::tag("auto_service_id_0").with_side(SideType::From),
                Row::tag("auto_service_id_1").with_side(SideType::To),
            ],
            format_as: Some(FormatAs::Table),
            ..QueryForm::default()
        };
        let frames = shape_frames(&data, &query, &form).unwrap();
        let custom = serde_json::to_value(&frames[0].meta.custom).unwrap();
        assert_eq!(custom["from"], json!(["auto_service_id_0"]));
        assert_eq!(custom["to"], json!(["auto_service_id_1"]));
        assert_eq!(custom["common"], json!([]));
    }

    #[test]
    fn renders_alias_placeholders() {
        let record: Record = serde_json::from_value(json!({"a": 1, "b": null})).unwrap();
        assert_eq!(render_alias("${a}-${b}-${c}", &record), "1-null-${c}");
        assert_eq!(render_alias("plain ${a", &record), "plain ${a");
        assert_eq!(render_alias("", &record), "");
    }
}
