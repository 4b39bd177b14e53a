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
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::multispace0,
    combinator::{all_consuming, success},
    error::Error as NomError,
    number::complete::double,
    sequence::delimited,
};

use crate::query::{
    Scalar, variable_name,
    variables::{TemplateVariable, find_variable, scoped_number},
};

use super::CompileContext;

/// Grafana's auto-interval variables carry this prefix in their current value.
pub const AUTO_INTERVAL_PREFIX: &str = "$__auto_interval_";
const BUILTIN_INTERVALS: [&str; 2] = ["__interval", "__interval_ms"];
const INTERVAL_MS_VAR: &str = "__interval_ms";

/// A group-by bucket width.
#[derive(Debug, Clone, PartialEq)]
pub enum IntervalValue {
    Seconds(f64),
    /// Text that could not be converted; passed through untouched.
    Raw(String),
}

impl IntervalValue {
    pub fn to_scalar(&self) -> Scalar {
        match self {
            IntervalValue::Seconds(seconds) => Scalar::number(*seconds),
            IntervalValue::Raw(raw) => Scalar::text(raw.clone()),
        }
    }

    pub fn label(&self) -> String {
        self.to_scalar().to_string()
    }
}

/// Resolves the form's interval to seconds. Returns `None` when unset.
pub fn resolve_interval(raw: &str, ctx: &CompileContext<'_>) -> Option<IntervalValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let name = variable_name(raw).unwrap_or(raw);
    if BUILTIN_INTERVALS.contains(&name) {
        return Some(
            scoped_number(ctx.scoped_vars, INTERVAL_MS_VAR)
                .map(|ms| IntervalValue::Seconds(ms / 1000.0))
                .unwrap_or_else(|| IntervalValue::Raw(raw.to_string())),
        );
    }
    let variable = find_variable(ctx.variables, raw).or_else(|| find_variable(ctx.variables, name));
    let Some(variable) = variable else {
        return Some(convert(raw, None, ctx));
    };
    let current = variable
        .current
        .as_ref()
        .and_then(|current| current.value.first())
        .map(Scalar::to_string)
        .unwrap_or_default();
    if let Ok(seconds) = current.trim().parse::<f64>() {
        return Some(IntervalValue::Seconds(seconds));
    }
    Some(convert(&current, Some(variable), ctx))
}

fn convert(text: &str, variable: Option<&TemplateVariable>, ctx: &CompileContext<'_>) -> IntervalValue {
    if text.contains(AUTO_INTERVAL_PREFIX) {
        return auto_interval(text, variable, ctx);
    }
    match parse_seconds(text) {
        Some(seconds) => IntervalValue::Seconds(seconds),
        None => {
            debug!("interval `{text}` has no known unit, passing it through");
            IntervalValue::Raw(text.to_string())
        }
    }
}

fn auto_interval(
    text: &str,
    variable: Option<&TemplateVariable>,
    ctx: &CompileContext<'_>,
) -> IntervalValue {
    let (Some(range), Some(count)) = (
        ctx.time_range,
        variable.and_then(|variable| variable.auto_count),
    ) else {
        return IntervalValue::Raw(text.to_string());
    };
    if count <= 0.0 {
        return IntervalValue::Raw(text.to_string());
    }
    let min_seconds = variable
        .and_then(|variable| variable.auto_min.as_deref())
        .and_then(parse_seconds)
        .unwrap_or(0.0);
    IntervalValue::Seconds((range.seconds() as f64 / count).max(min_seconds))
}

type NomResult<'a, T> = IResult<&'a str, T, NomError<&'a str>>;

/// Parses `<number><unit>` with units `ms`, `s`, `m`, `h`, `d`; a bare number is seconds.
pub fn parse_seconds(text: &str) -> Option<f64> {
    all_consuming(delimited(multispace0, duration, multispace0))
        .parse(text)
        .ok()
        .map(|(_, seconds)| seconds)
}

fn duration(input: &str) -> NomResult<'_, f64> {
    let (input, value) = double(input)?;
    let (input, unit) = alt((
        tag("ms"),
        tag("s"),
        tag("m"),
        tag("h"),
        tag("d"),
        success(""),
    ))
    .parse(input)?;
    let seconds = match unit {
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3_600.0,
        "d" => value * 86_400.0,
        _ => value,
    };
    Ok((input, seconds))
}
