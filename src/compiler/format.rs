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

use crate::query::{QueryForm, Row, RowKind, Scalar};

use super::{
    Args, CompileContext, Expr, Param, Selection, Selects,
    compose::{compose, compose_aliased, non_empty},
    interval::resolve_interval,
};

const INTERVAL_ORDER_PREFIX: &str = "interval_";
const TRACE_ID_KEY: &str = "_id";
const TO_STRING_FUNC: &str = "TO_STRING";

fn is_bare(row: &Row) -> bool {
    row.func.is_empty()
        && row.params.is_empty()
        && row.alias.is_empty()
        && row.sub_funcs.is_empty()
        && row.pre_func.is_empty()
}

/// Splits select rows into tag and metric selections.
pub(super) fn select_format(form: &QueryForm) -> Selects {
    let mut selects = Selects::default();
    for row in form.select.iter().filter(|row| row.has_key()) {
        let selection = if is_bare(row) {
            Selection::Key(row.real_key().to_string())
        } else {
            Selection::Expr(compose(row))
        };
        match row.kind {
            RowKind::Tag => selects.tags.push(selection),
            RowKind::Metric => selects.metrics.push(selection),
        }
    }
    if form.app_type.is_tracing() {
        selects.tags.push(Selection::Expr(Expr {
            func: TO_STRING_FUNC.to_string(),
            ..Expr::key(TRACE_ID_KEY)
        }));
    }
    selects
}

/// The time bucket, when an interval is set, followed by the grouped tags.
pub(super) fn group_by_format(form: &QueryForm, ctx: &CompileContext<'_>) -> Vec<Selection> {
    let mut group_by = Vec::with_capacity(form.group_by.len() + 1);
    if let Some(interval) = resolve_interval(&form.interval, ctx) {
        let alias = if form.interval.trim_start().starts_with('$') {
            "time_value".to_string()
        } else {
            format!("time_{}", interval.label())
        };
        group_by.push(Selection::Expr(Expr {
            func: "interval".to_string(),
            key: Some("time".to_string()),
            params: Some(Args::Single(Param::Value(interval.to_scalar()))),
            alias: Some(alias),
            desc: None,
        }));
    }
    group_by.extend(
        form.group_by
            .iter()
            .filter(|row| row.has_key())
            .map(|row| match non_empty(&row.alias) {
                Some(alias) => Selection::Expr(Expr {
                    alias: Some(alias),
                    ..Expr::key(row.real_key())
                }),
                None => Selection::Key(row.real_key().to_string()),
            }),
    );
    group_by
}

pub(super) fn order_by_format(form: &QueryForm) -> Vec<Expr> {
    form.order_by
        .iter()
        .filter(|row| row.has_key())
        .map(|row| {
            let desc = Some(row.descending());
            match row.real_key().strip_prefix(INTERVAL_ORDER_PREFIX) {
                Some(width) => Expr {
                    func: "interval".to_string(),
                    key: Some("time".to_string()),
                    params: Some(Args::Single(Param::Value(Scalar::text(width)))),
                    alias: None,
                    desc,
                },
                None => Expr {
                    desc,
                    ..compose_aliased(row, "")
                },
            }
        })
        .collect()
}
