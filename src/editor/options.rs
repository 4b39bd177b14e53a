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

use serde::Serialize;

use crate::{
    catalog::{
        ENUM_LIKE_TAG_TYPES, MAP_METRIC_TYPE, MAP_TAG_TYPE, TAG_METRIC_TYPE, TableConfig, TagMeta,
    },
    query::{AppType, Clause, Params, QueryForm, Row, RowKind, Scalar, SideType},
};

pub const GROUP_BY_DISABLE_TAG_TYPES: [&str; 4] = ["map", "pcap", "ip_array", "resource_array"];
pub const SELECT_GROUP_BY_DISABLE_TAGS: [&str; 8] = [
    "lb_listener",
    "pod_ingress",
    "capture_nic_host",
    "capture_nic_chost",
    "capture_nic_pod_node",
    "tap_port_host",
    "tap_port_chost",
    "tap_port_pod_node",
];
pub const DISABLE_TAGS: [&str; 2] = ["_id", "time"];
const WHERE_DISABLE_TAGS: [&str; 2] = ["start_time", "end_time"];
const RESOURCE_TAG_TYPE: &str = "resource";
const IP_TAG_TYPE: &str = "ip";
const STRING_TAG_TYPE: &str = "string";
const STRING_DISABLED_OPERATORS: [&str; 4] = ["=", "!=", "IN", "NOT IN"];
const ENUM_FUNC: &str = "Enum";
const INTERVAL_ORDER_PREFIX: &str = "interval_";
const RESOURCE_GL_MARKER: &str = "resource_gl";

/// `(operator, display name, description)` in display order.
const TAG_OPERATORS: [(&str, &str, &str); 10] = [
    ("LIKE", ":", "string, * for wildcard"),
    ("REGEXP", "~", "regular expression"),
    ("IN", "=", "resource uid, or integer"),
    ("NOT LIKE", "!:", "string, * for wildcard"),
    ("NOT REGEXP", "!~", "regular expression"),
    ("NOT IN", "!=", "resource uid, or integer"),
    ("<", "<", "Numerical filtering"),
    ("<=", "<=", "Numerical filtering"),
    (">", ">", "Numerical filtering"),
    (">=", ">=", "Numerical filtering"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    fn same(value: &str) -> Self {
        Self {
            label: value.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorOption {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Tags are typed by name, metrics by number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OptionKind {
    Tag(String),
    Metric(i64),
}

/// A selectable tag or metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOption {
    pub label: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub operator_opts: Vec<OperatorOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_type: Option<SideType>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub where_only: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_agg: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_supported_operators: Vec<String>,
}

impl FieldOption {
    fn tag_type(&self) -> &str {
        match &self.kind {
            OptionKind::Tag(kind) => kind,
            OptionKind::Metric(_) => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionOption {
    pub label: String,
    pub value: String,
    pub param_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_metric_types: Option<Vec<i64>>,
}

impl FunctionOption {
    pub fn supports(&self, metric_type: i64) -> bool {
        self.support_metric_types
            .as_ref()
            .is_some_and(|types| types.contains(&metric_type))
    }

    fn enum_func() -> Self {
        Self {
            label: ENUM_FUNC.to_string(),
            value: ENUM_FUNC.to_string(),
            param_count: 0,
            support_metric_types: None,
        }
    }
}

/// Options derived once per `(db, table)`; clauses only ever filter them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    pub tags: Vec<FieldOption>,
    pub metrics: Vec<FieldOption>,
    pub functions: Vec<FunctionOption>,
    pub sub_functions: Vec<SelectOption>,
}

impl TableOptions {
    pub fn from_config(config: &TableConfig) -> Self {
        let (sub_functions, functions): (Vec<_>, Vec<_>) = config
            .functions
            .iter()
            .partition(|func| func.is_sub_function());
        Self {
            tags: config.tags.iter().flat_map(tag_options).collect(),
            metrics: config
                .metrics
                .iter()
                .filter(|metric| metric.kind != TAG_METRIC_TYPE)
                .map(|metric| FieldOption {
                    label: format!("{} ({})", metric.name, metric.display_name),
                    value: metric.name.clone(),
                    kind: OptionKind::Metric(metric.kind),
                    operator_opts: metric
                        .operators
                        .iter()
                        .map(|op| OperatorOption {
                            label: op.clone(),
                            value: op.clone(),
                            description: String::new(),
                        })
                        .collect(),
                    side_type: None,
                    where_only: false,
                    is_agg: metric.is_agg,
                    not_supported_operators: Vec::new(),
                })
                .collect(),
            functions: functions
                .into_iter()
                .map(|func| FunctionOption {
                    label: func.name.clone(),
                    value: func.name.clone(),
                    param_count: func.additional_param_count,
                    support_metric_types: func.support_metric_types.clone(),
                })
                .collect(),
            sub_functions: sub_functions
                .into_iter()
                .map(|func| SelectOption::same(&func.name))
                .collect(),
        }
    }

    pub fn tag(&self, value: &str) -> Option<&FieldOption> {
        self.tags.iter().find(|tag| tag.value == value)
    }

    pub fn metric(&self, value: &str) -> Option<&FieldOption> {
        self.metrics.iter().find(|metric| metric.value == value)
    }
}

/// A tag with distinct side names yields a where-only option for resource and
/// IP tags, then one option per side.
fn tag_options(tag: &TagMeta) -> Vec<FieldOption> {
    let operator_opts = format_tag_operators(&tag.operators, &tag.kind);
    let option = |label: String, value: &str| FieldOption {
        label,
        value: value.to_string(),
        kind: OptionKind::Tag(tag.kind.clone()),
        operator_opts: operator_opts.clone(),
        side_type: None,
        where_only: false,
        is_agg: false,
        not_supported_operators: tag.not_supported_operators.clone(),
    };
    if tag.name == tag.client_name && tag.name == tag.server_name {
        let label = if tag.display_name.is_empty() || tag.display_name == tag.name {
            tag.name.clone()
        } else {
            format!("{} ({})", tag.name, tag.display_name)
        };
        return vec![option(label, &tag.name)];
    }

    let mut options = Vec::with_capacity(3);
    let has_sides = !tag.client_name.is_empty() || !tag.server_name.is_empty();
    if has_sides && (tag.kind == RESOURCE_TAG_TYPE || tag.kind == IP_TAG_TYPE) {
        options.push(FieldOption {
            where_only: true,
            ..option(format!("{} ({})", tag.name, tag.display_name), &tag.name)
        });
    }
    if !tag.client_name.is_empty() {
        options.push(FieldOption {
            side_type: Some(SideType::From),
            ..option(
                format!("{} ({} - client)", tag.client_name, tag.display_name),
                &tag.client_name,
            )
        });
    }
    if !tag.server_name.is_empty() {
        options.push(FieldOption {
            side_type: Some(SideType::To),
            ..option(
                format!("{} ({} - server)", tag.server_name, tag.display_name),
                &tag.server_name,
            )
        });
    }
    options
}

/// Keeps the operators with a display form, in display order. String tags
/// cannot be matched for equality.
pub fn format_tag_operators(operators: &[String], tag_type: &str) -> Vec<OperatorOption> {
    TAG_OPERATORS
        .iter()
        .filter(|(op, _, _)| operators.iter().any(|offered| offered == op))
        .filter(|(op, _, _)| !(tag_type == STRING_TAG_TYPE && STRING_DISABLED_OPERATORS.contains(op)))
        .map(|(op, label, description)| OperatorOption {
            label: label.to_string(),
            value: op.to_string(),
            description: description.to_string(),
        })
        .collect()
}

/// Tag and metric choices for one clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldOptions {
    pub tags: Vec<FieldOption>,
    pub metrics: Vec<FieldOption>,
}

impl FieldOptions {
    fn allows(&self, row: &Row) -> bool {
        let options = match row.kind {
            RowKind::Tag => &self.tags,
            RowKind::Metric => &self.metrics,
        };
        options.iter().any(|option| option.value == row.key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseOptions {
    pub select: FieldOptions,
    #[serde(rename = "where")]
    pub where_: FieldOptions,
    pub having: FieldOptions,
    pub group_by: FieldOptions,
    pub order_by: FieldOptions,
}

impl ClauseOptions {
    pub fn for_clause(&self, clause: Clause) -> &FieldOptions {
        match clause {
            Clause::Select => &self.select,
            Clause::Where => &self.where_,
            Clause::Having => &self.having,
            Clause::GroupBy => &self.group_by,
            Clause::OrderBy => &self.order_by,
        }
    }
}

fn filtered<'a>(
    options: impl IntoIterator<Item = &'a FieldOption>,
    keep: impl Fn(&FieldOption) -> bool,
) -> Vec<FieldOption> {
    options.into_iter().filter(|option| keep(option)).cloned().collect()
}

/// Restricts the table's options to what each clause of `form` may choose.
pub fn clause_options(table: &TableOptions, form: &QueryForm) -> ClauseOptions {
    let grouping = form.using_group_by();
    let group_by_keys = form.group_by_keys();
    let not_map = |tag: &FieldOption| tag.tag_type() != MAP_TAG_TYPE;

    let basic_metrics = filtered(&table.metrics, |metric| grouping || !metric.is_agg);
    let select_tags = filtered(&table.tags, |tag| {
        !tag.where_only
            && !DISABLE_TAGS.contains(&tag.value.as_str())
            && (!grouping || group_by_keys.contains(&tag.value.as_str()))
    });
    let group_by_tags = filtered(&table.tags, |tag| {
        !tag.where_only
            && !GROUP_BY_DISABLE_TAG_TYPES.contains(&tag.tag_type())
            && !DISABLE_TAGS.contains(&tag.value.as_str())
            && !SELECT_GROUP_BY_DISABLE_TAGS
                .iter()
                .any(|disabled| tag.value.contains(disabled))
    });
    let where_tags = filtered(&table.tags, |tag| {
        not_map(tag) && !WHERE_DISABLE_TAGS.contains(&tag.value.as_str())
    });
    let order_by_metrics = if grouping {
        let selected: Vec<&str> = form
            .select
            .iter()
            .filter(|row| row.is_metric())
            .map(|row| row.key.as_str())
            .collect();
        filtered(&table.metrics, |metric| selected.contains(&metric.value.as_str()))
    } else {
        basic_metrics.clone()
    };

    ClauseOptions {
        select: FieldOptions {
            tags: select_tags,
            metrics: basic_metrics.clone(),
        },
        where_: FieldOptions {
            tags: where_tags,
            metrics: basic_metrics.clone(),
        },
        having: FieldOptions {
            tags: filtered(&table.tags, not_map),
            metrics: basic_metrics.clone(),
        },
        group_by: FieldOptions {
            tags: group_by_tags,
            metrics: basic_metrics,
        },
        order_by: FieldOptions {
            tags: filtered(&table.tags, not_map),
            metrics: order_by_metrics,
        },
    }
}

/// Functions a row may apply: `Enum` for enum-like select tags, otherwise the
/// aggregations supporting the metric's type.
pub fn function_options(table: &TableOptions, clause: Clause, row: &Row) -> Vec<FunctionOption> {
    match row.kind {
        RowKind::Tag => {
            let enum_like = clause == Clause::Select
                && table
                    .tag(&row.key)
                    .is_some_and(|tag| ENUM_LIKE_TAG_TYPES.contains(&tag.tag_type()));
            if enum_like {
                vec![FunctionOption::enum_func()]
            } else {
                Vec::new()
            }
        }
        RowKind::Metric => {
            let Some(OptionKind::Metric(metric_type)) = table.metric(&row.key).map(|m| &m.kind) else {
                return Vec::new();
            };
            table
                .functions
                .iter()
                .filter(|func| func.supports(*metric_type))
                .cloned()
                .collect()
        }
    }
}

/// Number of parameters the named function takes.
pub fn param_count(table: &TableOptions, func: &str) -> usize {
    table
        .functions
        .iter()
        .find(|option| option.value == func)
        .map(|option| option.param_count)
        .unwrap_or(0)
}

/// Pads or truncates a metric row's parameters to its function's arity.
fn fit_params(row: &mut Row, table: &TableOptions) {
    if !row.is_metric() || row.func.is_empty() {
        return;
    }
    if !table.functions.iter().any(|option| option.value == row.func) {
        return;
    }
    if let Params::List(params) = &mut row.params {
        params.resize(param_count(table, &row.func), Scalar::default());
    }
}

/// Whether the metric is a map metric that can only be selected as a whole.
pub fn is_map_metric(table: &TableOptions, key: &str) -> bool {
    matches!(
        table.metric(key).map(|metric| &metric.kind),
        Some(OptionKind::Metric(MAP_METRIC_TYPE))
    )
}

/// Database choices for an app type.
pub fn database_filter(app_type: AppType, databases: &[String]) -> Vec<String> {
    match app_type {
        AppType::AppTracing | AppType::AppTracingFlame => vec!["flow_log".to_string()],
        AppType::AccessRelationship => keep(databases, &["flow_log", "flow_metrics"]),
        AppType::Profiling => keep(databases, &["profile"]),
        AppType::TrafficQuery => databases.to_vec(),
    }
}

/// Table choices for an app type.
pub fn table_filter(app_type: AppType, tables: &[String]) -> Vec<String> {
    match app_type {
        AppType::AppTracing | AppType::AppTracingFlame => vec!["l7_flow_log".to_string()],
        AppType::AccessRelationship => keep(
            tables,
            &["l4_flow_log", "l7_flow_log", "network_map", "application_map"],
        ),
        AppType::Profiling => keep(tables, &["in_process"]),
        AppType::TrafficQuery => tables.to_vec(),
    }
}

fn keep(values: &[String], allowed: &[&str]) -> Vec<String> {
    values
        .iter()
        .filter(|value| allowed.contains(&value.as_str()))
        .cloned()
        .collect()
}

/// Clears every key that its clause no longer offers. Time-bucket order-by
/// rows are always valid. Map metrics and global resource tags cannot be
/// renamed.
pub fn sanitize(form: &mut QueryForm, table: &TableOptions) {
    let options = clause_options(table, form);
    for clause in [
        Clause::Select,
        Clause::Where,
        Clause::Having,
        Clause::GroupBy,
        Clause::OrderBy,
    ] {
        let allowed = options.for_clause(clause);
        for row in form.rows_mut(clause) {
            if row.key.is_empty()
                || row.from_select.is_some()
                || row.key.starts_with(INTERVAL_ORDER_PREFIX)
            {
                continue;
            }
            if !allowed.allows(row) {
                row.clear_key();
            }
        }
    }
    for clause in Clause::ALL {
        for row in form.rows_mut(clause) {
            fit_params(row, table);
        }
    }
    for row in &mut form.select {
        if row.key.contains(RESOURCE_GL_MARKER) || (row.is_metric() && is_map_metric(table, &row.key)) {
            row.alias.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FunctionMeta, MetricMeta};

    fn tag(name: &str, client: &str, server: &str, kind: &str) -> TagMeta {
        TagMeta {
            name: name.into(),
            client_name: client.into(),
            server_name: server.into(),
            display_name: name.to_uppercase(),
            kind: kind.into(),
            operators: ["=", "!=", "IN", "NOT IN", "LIKE", "REGEXP", ">="]
                .map(String::from)
                .to_vec(),
            ..TagMeta::default()
        }
    }

    fn metric(name: &str, kind: i64, is_agg: bool) -> MetricMeta {
        MetricMeta {
            name: name.into(),
            display_name: name.into(),
            kind,
            is_agg,
            ..MetricMeta::default()
        }
    }

    fn table() -> TableOptions {
        TableOptions::from_config(&TableConfig {
            tags: vec![
                tag("auto_service", "auto_service_0", "auto_service_1", "resource"),
                tag("protocol", "protocol", "protocol", "int_enum"),
                tag("request_domain", "request_domain", "request_domain", "string"),
                tag("attribute", "attribute", "attribute", "map"),
                tag("lb_listener", "lb_listener", "lb_listener", "resource"),
                tag("start_time", "start_time", "start_time", "time"),
            ],
            metrics: vec![
                metric("byte", 1, false),
                metric("request", 1, false),
                metric("rrt_max", 3, true),
                metric("auto_service", 6, false),
            ],
            functions: vec![
                FunctionMeta {
                    name: "Sum".into(),
                    additional_param_count: 0,
                    support_metric_types: Some(vec![1]),
                },
                FunctionMeta {
                    name: "Percentile".into(),
                    additional_param_count: 1,
                    support_metric_types: Some(vec![1, 3]),
                },
                FunctionMeta {
                    name: "Math".into(),
                    additional_param_count: 1,
                    support_metric_types: None,
                },
            ],
        })
    }

    fn values(options: &[FieldOption]) -> Vec<&str> {
        options.iter().map(|option| option.value.as_str()).collect()
    }

    #[test]
    fn side_tags_expand_into_three_options() {
        let table = table();
        let service: Vec<_> = table
            .tags
            .iter()
            .filter(|tag| tag.value.starts_with("auto_service"))
            .collect();
        assert_eq!(service.len(), 3);
        assert!(service[0].where_only);
        assert_eq!(service[1].value, "auto_service_0");
        assert_eq!(service[1].side_type, Some(SideType::From));
        assert_eq!(service[2].value, "auto_service_1");
        assert_eq!(service[2].side_type, Some(SideType::To));
        assert_eq!(table.tag("protocol").unwrap().label, "protocol (PROTOCOL)");
    }

    #[test]
    fn operators_follow_display_order() {
        let ops = format_tag_operators(
            &["=", ">=", "NOT IN", "IN", "LIKE", "REGEXP"].map(String::from),
            "int_enum",
        );
        let labels: Vec<_> = ops.iter().map(|op| op.label.as_str()).collect();
        assert_eq!(labels, vec![":", "~", "=", "!=", ">="]);
        let strings = format_tag_operators(&["=", "IN", "LIKE", "NOT IN"].map(String::from), "string");
        let values: Vec<_> = strings.iter().map(|op| op.value.as_str()).collect();
        assert_eq!(values, vec!["LIKE"]);
    }

    #[test]
    fn metrics_and_functions_are_split() {
        let table = table();
        assert_eq!(values(&table.metrics), vec!["byte", "request", "rrt_max"]);
        assert_eq!(table.functions.len(), 2);
        assert_eq!(table.sub_functions, vec![SelectOption::same("Math")]);
    }

    #[test]
    fn ungrouped_forms_hide_aggregated_metrics() {
        let table = table();
        let form = QueryForm::new(AppType::TrafficQuery);
        let options = clause_options(&table, &form);
        assert_eq!(values(&options.select.metrics), vec!["byte", "request"]);
        assert_eq!(options.order_by.metrics, options.select.metrics);
        assert!(!values(&options.select.tags).contains(&"auto_service"));
        assert!(values(&options.where_.tags).contains(&"auto_service"));
        assert!(!values(&options.where_.tags).contains(&"attribute"));
        assert!(!values(&options.where_.tags).contains(&"start_time"));
    }

    #[test]
    fn grouping_restricts_select_tags_and_order_by_metrics() {
        let table = table();
        let mut form = QueryForm::new(AppType::TrafficQuery);
        form.group_by = vec![Row::tag("protocol")];
        form.select = vec![Row::tag("protocol"), Row::metric("byte", "Sum")];
        let options = clause_options(&table, &form);
        assert_eq!(values(&options.select.tags), vec!["protocol"]);
        assert_eq!(
            values(&options.select.metrics),
            vec!["byte", "request", "rrt_max"]
        );
        assert_eq!(values(&options.order_by.metrics), vec!["byte"]);
        let group_by = values(&options.group_by.tags);
        assert!(!group_by.contains(&"attribute"));
        assert!(!group_by.contains(&"lb_listener"));
        assert!(!group_by.contains(&"auto_service"));
        assert!(group_by.contains(&"auto_service_0"));
    }

    #[test]
    fn function_choices_depend_on_row() {
        let table = table();
        let enum_tag = Row::tag("protocol");
        assert_eq!(
            function_options(&table, Clause::Select, &enum_tag),
            vec![FunctionOption::enum_func()]
        );
        assert!(function_options(&table, Clause::Where, &enum_tag).is_empty());
        let names: Vec<_> = function_options(&table, Clause::Select, &Row::metric("rrt_max", ""))
            .into_iter()
            .map(|func| func.value)
            .collect();
        assert_eq!(names, vec!["Percentile"]);
        assert_eq!(param_count(&table, "Percentile"), 1);
        assert!(!is_map_metric(&table, "byte"));
    }

    #[test]
    fn app_types_filter_tables() {
        let databases = ["flow_log", "flow_metrics", "profile", "event"].map(String::from);
        assert_eq!(
            database_filter(AppType::AccessRelationship, &databases),
            vec!["flow_log", "flow_metrics"]
        );
        assert_eq!(database_filter(AppType::Profiling, &databases), vec!["profile"]);
        assert_eq!(table_filter(AppType::AppTracing, &[]), vec!["l7_flow_log"]);
        let tables = ["l7_flow_log", "network_map", "vtap_flow_port"].map(String::from);
        assert_eq!(
            table_filter(AppType::AccessRelationship, &tables),
            vec!["l7_flow_log", "network_map"]
        );
    }

    #[test]
    fn sanitize_clears_unknown_keys() {
        let table = table();
        let mut form = QueryForm::new(AppType::TrafficQuery);
        form.select = vec![Row::metric("missing", "Sum"), Row::metric("byte", "")];
        form.group_by = vec![Row::tag("whatever"), Row::tag("auto_service_0")];
        form.order_by = vec![Row::tag("interval_60")];
        sanitize(&mut form, &table);
        assert_eq!(form.select[0].key, "");
        assert_eq!(form.select[0].func, "");
        assert_eq!(form.select[1].key, "byte");
        assert_eq!(form.group_by[0].key, "");
        assert_eq!(form.group_by[1].key, "auto_service_0");
        assert_eq!(form.order_by[0].key, "interval_60");
    }

    #[test]
    fn sanitize_drops_aliases_on_map_metrics() {
        let mut table = table();
        table.metrics.push(FieldOption {
            label: "metrics".into(),
            value: "metrics".into(),
            kind: OptionKind::Metric(MAP_METRIC_TYPE),
            operator_opts: Vec::new(),
            side_type: None,
            where_only: false,
            is_agg: false,
            not_supported_operators: Vec::new(),
        });
        let mut form = QueryForm::new(AppType::TrafficQuery);
        form.select = vec![
            Row::metric("metrics", "").with_alias("m"),
            Row::metric("byte", "").with_alias("b"),
        ];
        sanitize(&mut form, &table);
        assert_eq!(form.select[0].alias, "");
        assert_eq!(form.select[1].alias, "b");
        assert!(is_map_metric(&table, "metrics"));
    }

    #[test]
    fn sanitize_sizes_function_params() {
        let table = table();
        let mut form = QueryForm::new(AppType::TrafficQuery);
        form.interval = "60".into();
        form.select = vec![Row::metric("rrt_max", "Percentile"), Row::metric("byte", "Sum")];
        form.select[1].params = Params::List(vec![Scalar::text("stale")]);
        sanitize(&mut form, &table);
        assert_eq!(form.select[0].params, Params::List(vec![Scalar::text("")]));
        assert_eq!(form.select[1].params, Params::List(vec![]));
    }
}
