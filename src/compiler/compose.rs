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

use std::borrow::Cow;

use crate::query::{Params, Row, Scalar, SubFunc};

use super::{Args, Expr, Param};

const MATH_FUNC: &str = "Math";

/// Folds a row's sub-functions over its base selection.
///
/// The first sub-function receives the base `{func, key, params}` followed by
/// its own parameters; each later one receives the previous call followed by
/// its parameters. A pre-function takes the base slot and pushes the row's
/// function to the front of the chain. An alias wraps the finished chain in
/// `as(chain, alias)`. Without sub-functions the base is returned as is.
pub fn compose(row: &Row) -> Expr {
    compose_aliased(row, &row.alias)
}

/// Clauses that do not project columns compose without the row's alias.
pub(super) fn compose_aliased(row: &Row, alias: &str) -> Expr {
    let mut chain: Vec<Cow<'_, SubFunc>> = row.sub_funcs.iter().map(Cow::Borrowed).collect();
    let mut base = Expr {
        func: row.func.clone(),
        key: Some(row.real_key().to_string()),
        params: base_params(&row.params),
        alias: None,
        desc: None,
    };
    if !row.pre_func.is_empty() && !row.func.is_empty() {
        chain.insert(
            0,
            Cow::Owned(SubFunc::new(row.func.clone()).with_params(row.params.clone())),
        );
        base.func = row.pre_func.clone();
        base.params = None;
    }
    if chain.is_empty() {
        base.alias = non_empty(alias);
        return base;
    }

    let mut composed = base;
    for (index, sub) in chain.iter().enumerate() {
        let mut args = vec![Param::Expr(Box::new(composed))];
        match (&sub.params, index) {
            (None, _) => {}
            (Some(Params::List(items)), 0) => args.extend(items.iter().cloned().map(Param::Value)),
            (Some(Params::List(items)), _) => args.push(Param::List(items.clone())),
            (Some(Params::Single(value)), _) => args.push(Param::Value(value.clone())),
        }
        composed = Expr::call(sub_func_name(sub), Args::List(args));
    }

    match non_empty(alias) {
        Some(alias) => Expr::call(
            "as",
            Args::List(vec![
                Param::Expr(Box::new(composed)),
                Param::Value(Scalar::Text(alias)),
            ]),
        ),
        None => composed,
    }
}

/// `Math` calls are named after their arithmetic operator.
fn sub_func_name(sub: &SubFunc) -> String {
    if !sub.func.eq_ignore_ascii_case(MATH_FUNC) {
        return sub.func.clone();
    }
    match sub.op.as_deref().map(str::trim) {
        Some("ADD") => "+".into(),
        Some("SUBTRACT") => "-".into(),
        Some("MULTIPLY") => "*".into(),
        Some("DIVIDE") => "/".into(),
        Some(op) if !op.is_empty() => op.to_string(),
        _ => sub.func.clone(),
    }
}

fn base_params(params: &Params) -> Option<Args> {
    if params.is_empty() {
        return None;
    }
    Some(match params {
        Params::List(items) => Args::List(items.iter().cloned().map(Param::Value).collect()),
        Params::Single(value) => Args::Single(Param::Value(value.clone())),
    })
}

pub(super) fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn avg_x(sub_funcs: Vec<SubFunc>) -> Row {
        Row {
            sub_funcs,
            ..Row::metric("x", "Avg")
        }
    }

    #[test]
    fn composes_math_chain_in_order() {
        let row = avg_x(vec![SubFunc::math("ADD", 1), SubFunc::math("MULTIPLY", 2)]);
        assert_eq!(
            serde_json::to_value(compose(&row)).unwrap(),
            json!({
                "func": "*",
                "params": [{"func": "+", "params": [{"func": "Avg", "key": "x"}, 1]}, 2]
            })
        );
    }

    #[test]
    fn composition_is_order_sensitive() {
        let forward = avg_x(vec![SubFunc::math("ADD", 1), SubFunc::math("MULTIPLY", 2)]);
        let reversed = avg_x(vec![SubFunc::math("MULTIPLY", 2), SubFunc::math("ADD", 1)]);
        assert_ne!(compose(&forward), compose(&reversed));
    }

    #[test]
    fn empty_chain_returns_base() {
        let row = Row::metric("byte", "Sum").with_alias("total");
        assert_eq!(
            serde_json::to_value(compose(&row)).unwrap(),
            json!({"func": "Sum", "key": "byte", "as": "total"})
        );
    }

    #[test]
    fn alias_wraps_composed_chain() {
        let mut row = avg_x(vec![SubFunc::new("PerSecond")]);
        row.alias = "rate".into();
        assert_eq!(
            serde_json::to_value(compose(&row)).unwrap(),
            json!({
                "func": "as",
                "params": [{"func": "PerSecond", "params": [{"func": "Avg", "key": "x"}]}, "rate"]
            })
        );
    }

    #[test]
    fn first_sub_function_spreads_list_params() {
        let row = avg_x(vec![
            SubFunc::new("TopK").with_params(Params::List(vec![Scalar::from(3), Scalar::from(1)])),
            SubFunc::new("Window").with_params(Params::List(vec![Scalar::from(5)])),
        ]);
        assert_eq!(
            serde_json::to_value(compose(&row)).unwrap(),
            json!({
                "func": "Window",
                "params": [{"func": "TopK", "params": [{"func": "Avg", "key": "x"}, 3, 1]}, [5]]
            })
        );
    }

    #[test]
    fn pre_function_takes_the_base_slot() {
        let mut row = Row::metric("byte", "Max");
        row.pre_func = "Derivative".into();
        row.params = Params::List(vec![Scalar::text("60")]);
        assert_eq!(
            serde_json::to_value(compose(&row)).unwrap(),
            json!({
                "func": "Max",
                "params": [{"func": "Derivative", "key": "byte"}, "60"]
            })
        );
    }

    #[test]
    fn math_operator_tokens_pass_through() {
        let row = avg_x(vec![SubFunc::math("/", 8)]);
        assert_eq!(compose(&row).func, "/");
    }
}
