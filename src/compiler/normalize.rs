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

use log::debug;

use crate::query::{
    Operator, Row, RowKind, RowValue, Scalar,
    variables::{DISABLED_SENTINEL, Resolved, resolve_item},
};

use super::{
    CompileContext, ComposedCondition, CondValue, Condition, ConditionNode, compose::compose_aliased,
};

const ENUM_FUNC: &str = "Enum";

/// A where/having row after variable substitution.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Normalized {
    Tag(Condition),
    Metric(ConditionNode),
}

enum RowResolution {
    Value(CondValue),
    Disabled,
    Any,
}

/// Turns one row into a condition. Rows without a key and rows whose
/// variable matches anything produce nothing.
pub(super) fn normalize_row(row: &Row, ctx: &CompileContext<'_>) -> Option<Normalized> {
    if !row.has_key() {
        return None;
    }
    let key = row.real_key();
    let op = row
        .operator()
        .unwrap_or_else(|| Operator::Other(String::new()));
    let (is_forbidden, val) = match resolve_row_value(row.val.as_ref(), &op, ctx) {
        RowResolution::Value(val) => (false, val),
        RowResolution::Disabled => (true, CondValue::One(Scalar::text(DISABLED_SENTINEL))),
        RowResolution::Any => {
            debug!("dropping condition on `{key}`: variable matches any value");
            return None;
        }
    };

    if row.kind == RowKind::Metric {
        let composed = !row.sub_funcs.is_empty() || (!row.pre_func.is_empty() && !row.func.is_empty());
        if composed {
            return Some(Normalized::Metric(ConditionNode::Composed(ComposedCondition {
                is_forbidden,
                kind: RowKind::Metric,
                op,
                val: (compose_aliased(row, ""), val),
            })));
        }
        let condition = Condition {
            is_forbidden,
            kind: RowKind::Metric,
            func: row.func.clone(),
            params: row_params(row),
            pre_func: row.pre_func.clone(),
            ..Condition::tag(key, op, val)
        };
        return Some(Normalized::Metric(ConditionNode::Leaf(condition)));
    }

    let func = if op.matches_text() && ctx.table.is_some_and(|table| table.is_enum_tag(key)) {
        ENUM_FUNC.to_string()
    } else {
        row.func.clone()
    };
    Some(Normalized::Tag(Condition {
        is_forbidden,
        func,
        params: row_params(row),
        sub_funcs: row.sub_funcs.clone(),
        where_only: row.where_only,
        ..Condition::tag(key, op, val)
    }))
}

fn row_params(row: &Row) -> Vec<Scalar> {
    if row.params.is_empty() {
        Vec::new()
    } else {
        row.params.to_vec()
    }
}

fn resolve_row_value(
    val: Option<&RowValue>,
    op: &Operator,
    ctx: &CompileContext<'_>,
) -> RowResolution {
    let resolve = |item| resolve_item(item, ctx.variables, ctx.scoped_vars, Some(op));
    match val {
        None => RowResolution::Value(CondValue::One(Scalar::default())),
        Some(RowValue::Single(item)) => match resolve(item) {
            Resolved::One(value) => RowResolution::Value(CondValue::One(value)),
            Resolved::Many(values) => RowResolution::Value(CondValue::Many(values)),
            Resolved::Disabled => RowResolution::Disabled,
            Resolved::Any => RowResolution::Any,
        },
        Some(RowValue::List(items)) => {
            let mut values = Vec::with_capacity(items.len());
            let mut matched_any = false;
            for item in items {
                match resolve(item) {
                    Resolved::One(value) => values.push(value),
                    Resolved::Many(many) => values.extend(many),
                    Resolved::Disabled => return RowResolution::Disabled,
                    Resolved::Any => matched_any = true,
                }
            }
            if matched_any && values.is_empty() {
                return RowResolution::Any;
            }
            RowResolution::Value(CondValue::Many(values))
        }
    }
}
