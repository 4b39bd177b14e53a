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

//! Compiles a query form into the payload consumed by the SQL compiler.
//!
//! Every stage here is synchronous and pure: the only inputs are the form,
//! the request-scoped [`CompileContext`] and, when known, the table metadata.

mod assemble;
mod compose;
mod format;
mod interval;
mod join;
mod normalize;
mod relationship;

pub use assemble::{TIME_FROM_PLACEHOLDER, TIME_TO_PLACEHOLDER, gen_query_params, validate_submission};
pub use relationship::{AccessRelationshipConfig, access_relationship_config};

use serde::Serialize;
use thiserror::Error;

use crate::{
    catalog::TableConfig,
    query::{
        Operator, RowKind, Scalar, SubFunc,
        variables::{ScopedVars, TemplateVariable},
    },
};

/// Dashboard time range in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn seconds(&self) -> i64 {
        self.to.saturating_sub(self.from)
    }
}

/// Request-scoped inputs to compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub variables: &'a [TemplateVariable],
    pub scoped_vars: &'a ScopedVars,
    pub time_range: Option<TimeRange>,
    pub table: Option<&'a TableConfig>,
}

impl<'a> CompileContext<'a> {
    pub fn new(variables: &'a [TemplateVariable], scoped_vars: &'a ScopedVars) -> Self {
        Self {
            variables,
            scoped_vars,
            time_range: None,
            table: None,
        }
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_table(mut self, table: &'a TableConfig) -> Self {
        self.table = Some(table);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("access relationship queries need a `from` and a `to` tag in GROUP BY")]
    MissingRelationshipSide,
    #[error("access relationship queries need at least one metric in SELECT")]
    MissingRelationshipSelect,
    #[error("metric `{0}` needs a function while grouping")]
    MissingMetricFunction(String),
    #[error("where and having metrics need both an operator and a value")]
    MissingMetricOperand,
    #[error("where conditions need both an operator and a value")]
    MissingWhereOperand,
    #[error("Derivative must be applied to all selected metrics or to none")]
    MixedDerivative,
}

/// A call expression: `{func, key, params, as, desc}` with empty parts omitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Expr {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub func: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Args>,
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<bool>,
}

impl Expr {
    pub fn call(func: impl Into<String>, params: Args) -> Self {
        Self {
            func: func.into(),
            params: Some(params),
            ..Self::default()
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// One function argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Expr(Box<Expr>),
    Value(Scalar),
    List(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Args {
    Single(Param),
    List(Vec<Param>),
}

/// A select or group-by entry: a bare column or an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    Key(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Selects {
    #[serde(rename = "TAGS")]
    pub tags: Vec<Selection>,
    #[serde(rename = "METRICS")]
    pub metrics: Vec<Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Junction {
    And,
    Or,
}

/// Resolved value of a condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CondValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

/// A leaf filter on a single column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub is_forbidden: bool,
    #[serde(rename = "type")]
    pub kind: RowKind,
    pub key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub func: String,
    pub op: Operator,
    pub val: CondValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Scalar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_funcs: Vec<SubFunc>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub where_only: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pre_func: String,
}

impl Condition {
    pub fn tag(key: impl Into<String>, op: Operator, val: CondValue) -> Self {
        Self {
            is_forbidden: false,
            kind: RowKind::Tag,
            key: key.into(),
            func: String::new(),
            op,
            val,
            params: Vec::new(),
            sub_funcs: Vec::new(),
            where_only: false,
            pre_func: String::new(),
        }
    }
}

/// A metric filter applied to a composed expression: `val` is `[expr, value]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedCondition {
    pub is_forbidden: bool,
    #[serde(rename = "type")]
    pub kind: RowKind,
    pub op: Operator,
    pub val: (Expr, CondValue),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionGroup {
    #[serde(rename = "type")]
    pub kind: RowKind,
    pub op: Junction,
    pub val: Vec<ConditionNode>,
}

/// A node of the boolean condition tree. Siblings are AND-ed by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Leaf(Condition),
    Composed(ComposedCondition),
    Group(ConditionGroup),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSet {
    pub id: String,
    pub is_forbidden: bool,
    pub condition: Vec<ConditionNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conditions {
    #[serde(rename = "RESOURCE_SETS")]
    pub resource_sets: Vec<ResourceSet>,
}

/// The contract handed to the SQL compiler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub format: &'static str,
    pub db: String,
    pub table_name: String,
    pub selects: Selects,
    pub conditions: Conditions,
    pub group_by: Vec<Selection>,
    pub order_by: Vec<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slimit: Option<String>,
    pub limit: String,
    pub offset: String,
}

impl QueryPayload {
    pub fn condition(&self) -> &[ConditionNode] {
        self.conditions
            .resource_sets
            .first()
            .map(|set| set.condition.as_slice())
            .unwrap_or_default()
    }
}
