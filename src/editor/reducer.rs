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
use serde::Deserialize;

use crate::query::{
    AppType, Clause, FormatAs, LabelItem, QueryForm, Row, RowKind, RowValue, Scalar, ValueItem,
};

const TRACING_DB: &str = "flow_log";
const TRACING_TABLE: &str = "l7_flow_log";

/// One atomic change to the form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Edit {
    SetAppType { app_type: AppType },
    SetDb { db: String },
    SetTable { from: String },
    SetSources { sources: String },
    SetInterval { interval: String },
    SetSlimit { slimit: String },
    SetLimit { limit: String },
    SetOffset { offset: String },
    /// Empty or unknown values unset the format.
    SetFormatAs { format_as: String },
    SetAlias { alias: String },
    SetShowMetrics { show_metrics: i8 },
    SetRow { clause: Clause, index: usize, row: Row },
    AddRow { clause: Clause, index: usize },
    RemoveRow { clause: Clause, index: usize },
}

/// Applies `edit` and every cascade it triggers.
pub fn reduce(mut form: QueryForm, edit: Edit) -> QueryForm {
    match edit {
        Edit::SetAppType { app_type } => {
            form = QueryForm::new(app_type);
            if app_type.is_tracing() {
                form.db = TRACING_DB.to_string();
                form.from = TRACING_TABLE.to_string();
                form.format_as = None;
                form.where_ = vec![tracing_filter()];
            }
            relationship_defaults(&mut form);
        }
        Edit::SetDb { db } => {
            form = QueryForm {
                db,
                ..QueryForm::new(form.app_type)
            };
            relationship_defaults(&mut form);
        }
        Edit::SetTable { from } => {
            form = QueryForm {
                from,
                db: form.db,
                sources: form.sources,
                ..QueryForm::new(form.app_type)
            };
            relationship_defaults(&mut form);
        }
        Edit::SetSources { sources } => form.sources = sources,
        Edit::SetInterval { interval } => {
            form.interval = interval;
            group_by_select_check(&mut form);
            select_order_by_check(&mut form);
        }
        Edit::SetSlimit { slimit } => form.slimit = slimit,
        Edit::SetLimit { limit } => {
            if limit.is_empty() {
                form.offset.clear();
            }
            form.limit = limit;
        }
        Edit::SetOffset { offset } => form.offset = offset,
        Edit::SetFormatAs { format_as } => form.format_as = format_as.parse::<FormatAs>().ok(),
        Edit::SetAlias { alias } => form.alias = alias,
        Edit::SetShowMetrics { show_metrics } => form.show_metrics = show_metrics.clamp(-1, 1),
        Edit::SetRow { clause, index, row } => {
            match form.rows_mut(clause).get_mut(index) {
                Some(slot) => *slot = row,
                None => debug!("ignoring edit of missing {clause:?} row {index}"),
            }
            cascade(&mut form, clause);
        }
        Edit::AddRow { clause, index } => {
            let rows = form.rows_mut(clause);
            let mut row = clause.blank_row();
            if let Some(current) = rows.get(index) {
                row.kind = current.kind;
            }
            let at = (index + 1).min(rows.len());
            rows.insert(at, row);
            cascade(&mut form, clause);
        }
        Edit::RemoveRow { clause, index } => {
            let rows = form.rows_mut(clause);
            if rows.len() > 1 && index < rows.len() {
                rows.remove(index);
                cascade(&mut form, clause);
            }
        }
    }
    form
}

/// Tracing only covers spans captured by eBPF or reported through OTel.
fn tracing_filter() -> Row {
    let item = |label: &str, value: i64| {
        ValueItem::Labeled(LabelItem {
            label: Some(Scalar::text(label)),
            ..LabelItem::new(value)
        })
    };
    Row::tag("tap_port_type").with_op(
        "IN",
        RowValue::List(vec![item("eBPF", 7), item("OTel", 8)]),
    )
}

fn relationship_defaults(form: &mut QueryForm) {
    if form.app_type != AppType::AccessRelationship {
        return;
    }
    form.group_by = vec![Clause::GroupBy.blank_row(), Clause::GroupBy.blank_row()];
    form.select = vec![Row::blank(RowKind::Metric)];
    form.format_as = None;
}

fn cascade(form: &mut QueryForm, clause: Clause) {
    if clause == Clause::GroupBy {
        group_by_select_check(form);
    }
    if matches!(clause, Clause::Select | Clause::GroupBy) {
        select_order_by_check(form);
    }
}

/// While grouping, select tags must be group-by keys.
fn group_by_select_check(form: &mut QueryForm) {
    if !form.using_group_by() {
        return;
    }
    let keys: Vec<String> = form.group_by_keys().into_iter().map(String::from).collect();
    form.select
        .retain(|row| row.is_metric() || !row.has_key() || keys.contains(&row.key));
    if form.select.is_empty() {
        form.select.push(Row::blank(RowKind::Metric));
    }
}

/// While grouping, order-by metrics must be selected; without grouping no
/// metric is aggregated.
fn select_order_by_check(form: &mut QueryForm) {
    if !form.using_group_by() {
        for row in form
            .select
            .iter_mut()
            .chain(form.having.iter_mut())
            .chain(form.order_by.iter_mut())
        {
            row.clear_func();
        }
        return;
    }
    let selected: Vec<String> = form
        .select
        .iter()
        .filter(|row| row.is_metric())
        .map(|row| row.key.clone())
        .collect();
    form.order_by
        .retain(|row| !row.has_key() || selected.contains(&row.key));
    if form.order_by.is_empty() {
        form.order_by.push(Clause::OrderBy.blank_row());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortOrder;
    use serde_json::json;

    fn grouped_form() -> QueryForm {
        let mut form = QueryForm::new(AppType::TrafficQuery);
        form.db = "flow_metrics".into();
        form.from = "network".into();
        form.group_by = vec![Row::tag("pod")];
        form.select = vec![Row::tag("pod"), Row::tag("region"), Row::metric("byte", "Sum")];
        form.order_by = vec![Row::metric("byte", "Sum")];
        form
    }

    #[test]
    fn app_type_change_resets_the_form() {
        let form = reduce(grouped_form(), Edit::SetAppType { app_type: AppType::TrafficQuery });
        assert_eq!(form, QueryForm::new(AppType::TrafficQuery));
    }

    #[test]
    fn tracing_fixes_table_and_filter() {
        let form = reduce(grouped_form(), Edit::SetAppType { app_type: AppType::AppTracing });
        assert_eq!((form.db.as_str(), form.from.as_str()), (TRACING_DB, TRACING_TABLE));
        assert_eq!(form.format_as, None);
        assert_eq!(
            serde_json::to_value(&form.where_[0].val).unwrap(),
            json!([{"label": "eBPF", "value": 7}, {"label": "OTel", "value": 8}])
        );
        assert_eq!(form.where_[0].op, "IN");
    }

    #[test]
    fn relationship_starts_with_two_group_by_rows() {
        let form = reduce(
            QueryForm::default(),
            Edit::SetAppType { app_type: AppType::AccessRelationship },
        );
        assert_eq!(form.group_by.len(), 2);
        assert_eq!(form.select, vec![Row::blank(RowKind::Metric)]);
        assert_eq!(form.format_as, None);
        let form = reduce(form, Edit::SetDb { db: "flow_log".into() });
        assert_eq!(form.group_by.len(), 2);
        assert_eq!(form.db, "flow_log");
    }

    #[test]
    fn table_change_keeps_database() {
        let form = reduce(grouped_form(), Edit::SetTable { from: "application".into() });
        assert_eq!(form.db, "flow_metrics");
        assert_eq!(form.from, "application");
        assert_eq!(form.select, vec![Clause::Select.blank_row()]);
    }

    #[test]
    fn group_by_change_prunes_select_tags() {
        let form = reduce(
            grouped_form(),
            Edit::SetRow {
                clause: Clause::GroupBy,
                index: 0,
                row: Row::tag("region"),
            },
        );
        let keys: Vec<_> = form.select.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["region", "byte"]);
    }

    #[test]
    fn select_change_prunes_order_by() {
        let form = reduce(
            grouped_form(),
            Edit::SetRow {
                clause: Clause::Select,
                index: 2,
                row: Row::metric("packet", "Sum"),
            },
        );
        assert_eq!(form.order_by, vec![Clause::OrderBy.blank_row()]);
    }

    #[test]
    fn ungrouping_clears_metric_functions() {
        let mut form = grouped_form();
        form.select = vec![Row::metric("byte", "Sum")];
        let form = reduce(
            form,
            Edit::SetRow {
                clause: Clause::GroupBy,
                index: 0,
                row: Row::blank(RowKind::Tag),
            },
        );
        assert_eq!(form.select[0].func, "");
        assert_eq!(form.order_by[0].func, "");
        assert_eq!(form.order_by[0].key, "byte");
    }

    #[test]
    fn interval_alone_enables_grouping() {
        let mut form = QueryForm::new(AppType::TrafficQuery);
        form.select = vec![Row::tag("pod"), Row::metric("byte", "Sum")];
        let form = reduce(form, Edit::SetInterval { interval: "60".into() });
        let keys: Vec<_> = form.select.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["byte"]);
    }

    #[test]
    fn clearing_limit_clears_offset() {
        let mut form = QueryForm::default();
        form.offset = "10".into();
        let form = reduce(form, Edit::SetLimit { limit: "".into() });
        assert_eq!(form.offset, "");
        assert_eq!(form.limit, "");
    }

    #[test]
    fn rows_are_added_after_the_index_and_never_all_removed() {
        let mut form = QueryForm::default();
        form.order_by = vec![Row::tag("pod")];
        let form = reduce(form, Edit::AddRow { clause: Clause::OrderBy, index: 0 });
        assert_eq!(form.order_by.len(), 2);
        assert_eq!(form.order_by[1].kind, RowKind::Tag);
        assert_eq!(form.order_by[1].sort, Some(SortOrder::Asc));
        let form = reduce(form, Edit::RemoveRow { clause: Clause::OrderBy, index: 0 });
        assert_eq!(form.order_by.len(), 1);
        let form = reduce(form, Edit::RemoveRow { clause: Clause::OrderBy, index: 0 });
        assert_eq!(form.order_by.len(), 1);
    }

    #[test]
    fn edits_deserialize_from_tagged_json() {
        let edit: Edit = serde_json::from_value(json!({
            "kind": "setRow",
            "clause": "groupBy",
            "index": 0,
            "row": {"type": "tag", "key": "pod"}
        }))
        .unwrap();
        assert_eq!(
            edit,
            Edit::SetRow {
                clause: Clause::GroupBy,
                index: 0,
                row: Row::tag("pod"),
            }
        );
        let edit: Edit =
            serde_json::from_value(json!({"kind": "setAppType", "appType": "profiling"})).unwrap();
        assert_eq!(edit, Edit::SetAppType { app_type: AppType::Profiling });
    }
}
