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

//! The query form as the panel stores it in `queryText`.
//!
//! Field names follow the panel's camelCase JSON so a stored query round-trips
//! through this model unchanged. Loosely typed panel values (operators, sort
//! order, side type) are parsed leniently: anything unrecognized becomes unset.

mod operator;
pub mod variables;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

pub use operator::{Operator, OperatorClass};

/// A JSON scalar as it appears in row values and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Text(String::new())
    }
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    /// Integral values serialize without a fractional part.
    pub fn number(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            return Scalar::Number(serde_json::Number::from(value as i64));
        }
        serde_json::Number::from_f64(value)
            .map(Scalar::Number)
            .unwrap_or_else(|| Scalar::Text(value.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Scalar::Text(text) if text.is_empty())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Number(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.into())
    }
}

/// Function parameters: panel rows store a list, `Math` sub-functions a bare operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    List(Vec<Scalar>),
    Single(Scalar),
}

impl Default for Params {
    fn default() -> Self {
        Params::List(Vec::new())
    }
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::List(items) => items.is_empty(),
            Params::Single(value) => value.is_empty(),
        }
    }

    pub fn to_vec(&self) -> Vec<Scalar> {
        match self {
            Params::List(items) => items.clone(),
            Params::Single(value) => vec![value.clone()],
        }
    }
}

/// A post-processing function chained after a metric's aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubFunc {
    pub func: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl SubFunc {
    pub fn new(func: impl Into<String>) -> Self {
        Self {
            func: func.into(),
            op: None,
            params: None,
        }
    }

    #[cfg(test)]
    pub fn math(op: impl Into<String>, operand: impl Into<Scalar>) -> Self {
        Self {
            func: "Math".into(),
            op: Some(op.into()),
            params: Some(Params::Single(operand.into())),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }
}

/// A `{label, value}` pair picked from a select box.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Scalar>,
    #[serde(default)]
    pub value: Scalar,
    #[serde(
        default,
        rename = "isVariable",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_variable: bool,
}

impl LabelItem {
    pub fn new(value: impl Into<Scalar>) -> Self {
        Self {
            label: None,
            value: value.into(),
            is_variable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueItem {
    Labeled(LabelItem),
    Literal(Scalar),
}

/// Where a row value comes from once the panel wrapping is stripped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueSource<'a> {
    Literal(&'a Scalar),
    Variable { name: &'a str, raw: &'a Scalar },
}

impl ValueItem {
    pub fn value(&self) -> &Scalar {
        match self {
            ValueItem::Labeled(item) => &item.value,
            ValueItem::Literal(value) => value,
        }
    }

    pub fn source(&self) -> ValueSource<'_> {
        let raw = self.value();
        let flagged = matches!(self, ValueItem::Labeled(item) if item.is_variable);
        let name = raw.as_str().and_then(|text| match variable_name(text) {
            Some(name) => Some(name),
            None if flagged && !text.is_empty() => Some(text),
            None => None,
        });
        match name {
            Some(name) => ValueSource::Variable { name, raw },
            None => ValueSource::Literal(raw),
        }
    }
}

/// `$name`, `${name}` and `${name:format}` all refer to `name`.
pub fn variable_name(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('$')?;
    let name = match rest.strip_prefix('{') {
        Some(inner) => {
            let inner = inner.strip_suffix('}')?;
            inner.split(':').next().unwrap_or(inner)
        }
        None => rest,
    };
    (!name.is_empty()).then_some(name)
}

/// A row value: one picked item or a multi-select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowValue {
    List(Vec<ValueItem>),
    Single(ValueItem),
}

impl RowValue {
    pub fn literal(value: impl Into<Scalar>) -> Self {
        RowValue::Single(ValueItem::Literal(value.into()))
    }

    #[cfg(test)]
    pub fn labeled(value: impl Into<Scalar>) -> Self {
        RowValue::Single(ValueItem::Labeled(LabelItem::new(value)))
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        RowValue::List(
            values
                .into_iter()
                .map(|value| ValueItem::Labeled(LabelItem::new(value)))
                .collect(),
        )
    }

    pub fn items(&self) -> &[ValueItem] {
        match self {
            RowValue::List(items) => items,
            RowValue::Single(item) => std::slice::from_ref(item),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RowValue::List(items) => items.is_empty(),
            RowValue::Single(item) => item.value().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    #[default]
    Tag,
    Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SideType {
    From,
    To,
}

impl FromStr for SideType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "from" => Ok(SideType::From),
            "to" => Ok(SideType::To),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(()),
        }
    }
}

/// The select row a where/having/order-by row was picked from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRef {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub func: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub sub_funcs: Vec<SubFunc>,
}

/// One editable clause entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(default, rename = "type")]
    pub kind: RowKind,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub func: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<RowValue>,
    #[serde(default, rename = "as")]
    pub alias: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_funcs: Vec<SubFunc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_func: String,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort: Option<SortOrder>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub side_type: Option<SideType>,
    #[serde(default)]
    pub where_only: bool,
    #[serde(default)]
    pub is_resource_type: bool,
    #[serde(default)]
    pub is_ip_type: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_select: Option<SelectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl Row {
    pub fn blank(kind: RowKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn tag(key: impl Into<String>) -> Self {
        Self {
            kind: RowKind::Tag,
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn metric(key: impl Into<String>, func: impl Into<String>) -> Self {
        Self {
            kind: RowKind::Metric,
            key: key.into(),
            func: func.into(),
            ..Self::default()
        }
    }

    pub fn with_op(mut self, op: &str, val: RowValue) -> Self {
        self.op = op.to_string();
        self.val = Some(val);
        self
    }

    #[cfg(test)]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    #[cfg(test)]
    pub fn with_side(mut self, side: SideType) -> Self {
        self.side_type = Some(side);
        self
    }

    pub fn is_metric(&self) -> bool {
        self.kind == RowKind::Metric
    }

    /// The key the row refers to, following a select-row reference.
    pub fn real_key(&self) -> &str {
        match &self.from_select {
            Some(select) if !select.key.is_empty() => &select.key,
            _ => &self.key,
        }
    }

    pub fn has_key(&self) -> bool {
        !self.real_key().is_empty()
    }

    pub fn operator(&self) -> Option<Operator> {
        let op = self.op.trim();
        (!op.is_empty()).then(|| Operator::parse(op))
    }

    pub fn has_value(&self) -> bool {
        self.val.as_ref().is_some_and(|val| !val.is_empty())
    }

    pub fn descending(&self) -> bool {
        self.sort == Some(SortOrder::Desc)
    }

    /// Drops everything that depended on the previous key.
    pub fn clear_key(&mut self) {
        self.key.clear();
        self.op.clear();
        self.val = None;
        self.func.clear();
        self.params = Params::default();
        self.sub_funcs.clear();
        self.pre_func.clear();
        self.where_only = false;
        self.side_type = None;
        self.is_resource_type = false;
        self.is_ip_type = false;
        self.from_select = None;
    }

    pub fn clear_func(&mut self) {
        self.func.clear();
        self.params = Params::default();
        self.sub_funcs.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppType {
    #[default]
    TrafficQuery,
    AccessRelationship,
    AppTracing,
    AppTracingFlame,
    Profiling,
}

impl AppType {
    pub fn is_tracing(self) -> bool {
        matches!(self, AppType::AppTracing | AppType::AppTracingFlame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FormatAs {
    TimeSeries,
    Table,
}

impl FromStr for FormatAs {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "timeSeries" => Ok(FormatAs::TimeSeries),
            "table" => Ok(FormatAs::Table),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Clause {
    Select,
    Where,
    Having,
    GroupBy,
    OrderBy,
}

impl Clause {
    pub const ALL: [Clause; 5] = [
        Clause::Select,
        Clause::Where,
        Clause::Having,
        Clause::GroupBy,
        Clause::OrderBy,
    ];

    /// Kind of the blank row a clause starts with.
    pub fn default_kind(self) -> RowKind {
        match self {
            Clause::Where | Clause::GroupBy => RowKind::Tag,
            Clause::Select | Clause::Having | Clause::OrderBy => RowKind::Metric,
        }
    }

    pub fn blank_row(self) -> Row {
        let mut row = Row::blank(self.default_kind());
        if self == Clause::OrderBy {
            row.sort = Some(SortOrder::Asc);
        }
        row
    }
}

pub const DEFAULT_LIMIT: &str = "100";

/// The aggregate query form state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryForm {
    pub app_type: AppType,
    pub db: String,
    pub from: String,
    pub sources: String,
    pub select: Vec<Row>,
    #[serde(rename = "where")]
    pub where_: Vec<Row>,
    pub having: Vec<Row>,
    pub group_by: Vec<Row>,
    pub order_by: Vec<Row>,
    #[serde(deserialize_with = "text_or_number")]
    pub interval: String,
    #[serde(deserialize_with = "text_or_number")]
    pub slimit: String,
    #[serde(deserialize_with = "text_or_number")]
    pub limit: String,
    #[serde(deserialize_with = "text_or_number")]
    pub offset: String,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub format_as: Option<FormatAs>,
    pub alias: String,
    pub show_metrics: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracing_id: Option<LabelItem>,
}

impl Default for QueryForm {
    fn default() -> Self {
        Self::new(AppType::TrafficQuery)
    }
}

impl QueryForm {
    pub fn new(app_type: AppType) -> Self {
        Self {
            app_type,
            db: String::new(),
            from: String::new(),
            sources: String::new(),
            select: vec![Clause::Select.blank_row()],
            where_: vec![Clause::Where.blank_row()],
            having: vec![Clause::Having.blank_row()],
            group_by: vec![Clause::GroupBy.blank_row()],
            order_by: vec![Clause::OrderBy.blank_row()],
            interval: String::new(),
            slimit: String::new(),
            limit: DEFAULT_LIMIT.to_string(),
            offset: String::new(),
            format_as: Some(FormatAs::TimeSeries),
            alias: String::new(),
            show_metrics: -1,
            tracing_id: None,
        }
    }

    pub fn rows(&self, clause: Clause) -> &[Row] {
        match clause {
            Clause::Select => &self.select,
            Clause::Where => &self.where_,
            Clause::Having => &self.having,
            Clause::GroupBy => &self.group_by,
            Clause::OrderBy => &self.order_by,
        }
    }

    pub fn rows_mut(&mut self, clause: Clause) -> &mut Vec<Row> {
        match clause {
            Clause::Select => &mut self.select,
            Clause::Where => &mut self.where_,
            Clause::Having => &mut self.having,
            Clause::GroupBy => &mut self.group_by,
            Clause::OrderBy => &mut self.order_by,
        }
    }

    pub fn group_by_keys(&self) -> Vec<&str> {
        self.group_by
            .iter()
            .filter(|row| row.has_key())
            .map(|row| row.key.as_str())
            .collect()
    }

    /// Grouping is active once a group-by key or an interval is set.
    pub fn using_group_by(&self) -> bool {
        !self.interval.is_empty() || self.group_by.iter().any(Row::has_key)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<Scalar>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Scalar::as_str)
        .and_then(|text| text.parse().ok()))
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Scalar>::deserialize(deserializer)?;
    Ok(raw.map(|value| value.to_string()).unwrap_or_default())
}
