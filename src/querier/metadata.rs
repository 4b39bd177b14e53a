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

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::catalog::{FunctionMeta, MetricMeta, TableConfig, TagMeta};

use super::{QueryResult, Record, TagValue};

/// Builds table metadata from `show tags`, `show metrics` and `show metric function`.
///
/// Rows that do not decode are skipped with a warning.
pub fn table_config_from_results(
    tags: &QueryResult,
    metrics: &QueryResult,
    functions: &QueryResult,
) -> TableConfig {
    TableConfig {
        tags: decode_rows::<TagMeta>(tags, "tag"),
        metrics: decode_rows::<MetricMeta>(metrics, "metric"),
        functions: decode_rows::<FunctionMeta>(functions, "function"),
    }
}

/// Reads the `value` and `display_name` columns of `show tag <tag> values`.
pub fn tag_values_from_result(result: &QueryResult) -> Vec<TagValue> {
    decode_rows::<TagValue>(result, "tag value")
}

fn decode_rows<T: DeserializeOwned>(result: &QueryResult, what: &str) -> Vec<T> {
    result
        .records()
        .into_iter()
        .filter_map(|record| {
            let record = strip_nulls(record);
            match serde_json::from_value(Value::Object(record)) {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!("skipping {what} metadata row: {err}");
                    None
                }
            }
        })
        .collect()
}

/// Null columns fall back to the field defaults, except `support_metric_types`
/// whose null marks a sub-function.
fn strip_nulls(mut record: Record) -> Record {
    record.retain(|name, value| !value.is_null() || name == "support_metric_types");
    record
}
