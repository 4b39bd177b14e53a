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

use crate::query::{AppType, Clause, QueryForm, Row, RowValue, SideType};

use super::{
    CompileContext, Conditions, QueryPayload, ResourceSet, ValidationError,
    format::{group_by_format, order_by_format, select_format},
    join::join_conditions,
    normalize::normalize_row,
};

/// Placeholders substituted with the dashboard range once the SQL is known.
pub const TIME_FROM_PLACEHOLDER: &str = "${__from:date:seconds}";
pub const TIME_TO_PLACEHOLDER: &str = "${__to:date:seconds}";
const DEFAULT_SLIMIT: &str = "20";
const TIME_KEY: &str = "time";
const DERIVATIVE_FUNC: &str = "Derivative";
const INTERVAL_ORDER_PREFIX: &str = "interval_";

fn time_bounds() -> [Row; 2] {
    [
        Row::tag(TIME_KEY).with_op(">=", RowValue::literal(TIME_FROM_PLACEHOLDER)),
        Row::tag(TIME_KEY).with_op("<=", RowValue::literal(TIME_TO_PLACEHOLDER)),
    ]
}

/// Compiles a submitted form into the payload the SQL compiler accepts.
///
/// The time range is always constrained with placeholders; rows without a
/// key in any clause are ignored.
pub fn gen_query_params(form: &QueryForm, ctx: &CompileContext<'_>) -> QueryPayload {
    let bounds = time_bounds();
    let normalized = form
        .where_
        .iter()
        .chain(bounds.iter())
        .chain(form.having.iter())
        .filter_map(|row| normalize_row(row, ctx))
        .collect();
    let condition = join_conditions(normalized);

    let grouped_by_tag = form.group_by.iter().any(Row::has_key);
    let slimit = (grouped_by_tag && !form.interval.is_empty()).then(|| {
        if form.slimit.is_empty() {
            DEFAULT_SLIMIT.to_string()
        } else {
            form.slimit.clone()
        }
    });

    let payload = QueryPayload {
        format: "sql",
        db: form.db.clone(),
        table_name: form.from.clone(),
        selects: select_format(form),
        conditions: Conditions {
            resource_sets: vec![ResourceSet {
                id: "0".to_string(),
                is_forbidden: false,
                condition,
            }],
        },
        group_by: group_by_format(form, ctx),
        order_by: order_by_format(form),
        slimit,
        limit: form.limit.clone(),
        offset: form.offset.clone(),
    };
    debug!(
        "compiled {}.{}: {} tag selections, {} metric selections, {} conditions",
        payload.db,
        payload.table_name,
        payload.selects.tags.len(),
        payload.selects.metrics.len(),
        payload.condition().len()
    );
    payload
}

/// Checks a form before it is run.
pub fn validate_submission(form: &QueryForm) -> Result<(), ValidationError> {
    if form.app_type == AppType::AccessRelationship {
        let has_side = |side: SideType| form.group_by.iter().any(|row| row.side_type == Some(side));
        if !has_side(SideType::From) || !has_side(SideType::To) {
            return Err(ValidationError::MissingRelationshipSide);
        }
        if !form.select.iter().any(Row::has_key) {
            return Err(ValidationError::MissingRelationshipSelect);
        }
    }

    if form.using_group_by() {
        let missing_func = [Clause::Select, Clause::Having, Clause::OrderBy]
            .into_iter()
            .flat_map(|clause| form.rows(clause))
            .find(|row| {
                row.is_metric()
                    && row.has_key()
                    && row.func.is_empty()
                    && !row.real_key().starts_with(INTERVAL_ORDER_PREFIX)
            });
        if let Some(row) = missing_func {
            return Err(ValidationError::MissingMetricFunction(
                row.real_key().to_string(),
            ));
        }
    }

    let incomplete = |row: &&Row| row.has_key() && (row.operator().is_none() || !row.has_value());
    if form
        .where_
        .iter()
        .chain(form.having.iter())
        .filter(|row| row.is_metric())
        .any(|row| incomplete(&row))
    {
        return Err(ValidationError::MissingMetricOperand);
    }
    if form.where_.iter().any(|row| incomplete(&row)) {
        return Err(ValidationError::MissingWhereOperand);
    }

    let selected: Vec<&Row> = form
        .select
        .iter()
        .filter(|row| row.is_metric() && row.has_key())
        .collect();
    let derivatives = selected
        .iter()
        .filter(|row| row.pre_func == DERIVATIVE_FUNC)
        .count();
    if derivatives > 0 && derivatives < selected.len() {
        return Err(ValidationError::MixedDerivative);
    }
    Ok(())
}
