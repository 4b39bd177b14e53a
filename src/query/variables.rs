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

//! Dashboard template variables and how row values resolve against them.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{Operator, Scalar, ValueItem, ValueSource};

pub const ALL_SENTINEL: &str = "$__all";
pub const DISABLED_SENTINEL: &str = "__disabled";
pub const ANY_SENTINEL: &str = "__any";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub current: Option<VariableCurrent>,
    #[serde(default)]
    pub options: Vec<VariableOption>,
    #[serde(default)]
    pub auto_count: Option<f64>,
    #[serde(default)]
    pub auto_min: Option<String>,
}

impl TemplateVariable {
    fn is_plain_text(&self) -> bool {
        matches!(self.kind.as_deref(), Some("textbox" | "constant"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableCurrent {
    #[serde(default)]
    pub value: VarValue,
    #[serde(default)]
    pub text: VarValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableOption {
    #[serde(default)]
    pub value: Scalar,
    #[serde(default)]
    pub text: Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Many(Vec<Scalar>),
    One(Scalar),
}

impl Default for VarValue {
    fn default() -> Self {
        VarValue::One(Scalar::default())
    }
}

impl VarValue {
    fn contains(&self, needle: &str) -> bool {
        match self {
            VarValue::One(value) => value.as_str().is_some_and(|text| text.contains(needle)),
            VarValue::Many(values) => values.iter().any(|value| value.as_str() == Some(needle)),
        }
    }

    fn is_any(&self) -> bool {
        match self {
            VarValue::One(value) => value.as_str() == Some(ANY_SENTINEL),
            VarValue::Many(values) => values
                .iter()
                .all(|value| value.as_str() == Some(ANY_SENTINEL)),
        }
    }

    pub fn first(&self) -> Option<&Scalar> {
        match self {
            VarValue::One(value) => Some(value),
            VarValue::Many(values) => values.first(),
        }
    }
}

/// Variable bindings supplied with a single request, e.g. repeated panels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopedVar {
    #[serde(default)]
    pub text: Option<VarValue>,
    pub value: VarValue,
}

pub type ScopedVars = HashMap<String, ScopedVar>;

pub fn scoped_number(scoped: &ScopedVars, name: &str) -> Option<f64> {
    match scoped.get(name)?.value.first()? {
        Scalar::Number(number) => number.as_f64(),
        Scalar::Text(text) => text.parse().ok(),
        Scalar::Bool(_) => None,
    }
}

pub fn find_variable<'a>(
    variables: &'a [TemplateVariable],
    name: &str,
) -> Option<&'a TemplateVariable> {
    variables.iter().find(|variable| variable.name == name)
}

/// A row value after template substitution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    One(Scalar),
    Many(Vec<Scalar>),
    /// The variable is switched off; the condition must not filter.
    Disabled,
    /// The variable matches anything; the condition is dropped.
    Any,
}

impl From<VarValue> for Resolved {
    fn from(value: VarValue) -> Self {
        match value {
            VarValue::One(value) => Resolved::One(value),
            VarValue::Many(values) => Resolved::Many(values),
        }
    }
}

/// Resolves one value item. Lookups that fail keep the literal.
pub fn resolve_item(
    item: &ValueItem,
    variables: &[TemplateVariable],
    scoped: &ScopedVars,
    op: Option<&Operator>,
) -> Resolved {
    match item.source() {
        ValueSource::Literal(value) => Resolved::One(value.clone()),
        ValueSource::Variable { name, raw } => {
            match resolve_variable(name, raw, variables, scoped, op) {
                Some(resolved) => resolved,
                None => {
                    debug!("template variable `{name}` is not resolvable, keeping `{raw}`");
                    Resolved::One(raw.clone())
                }
            }
        }
    }
}

fn resolve_variable(
    name: &str,
    raw: &Scalar,
    variables: &[TemplateVariable],
    scoped: &ScopedVars,
    op: Option<&Operator>,
) -> Option<Resolved> {
    let variable = find_variable(variables, name)?;
    variable.kind.as_ref()?;
    let scoped_current = scoped
        .get(name)
        .or_else(|| raw.as_str().and_then(|text| scoped.get(text)))
        .map(|bound| VariableCurrent {
            text: bound.text.clone().unwrap_or_else(|| bound.value.clone()),
            value: bound.value.clone(),
        });
    let current = scoped_current
        .or_else(|| variable.current.clone())
        .unwrap_or_default();

    if variable.is_plain_text() {
        return Some(current.value.into());
    }
    let use_text = op.is_some_and(Operator::is_like);
    if current.value.contains(ALL_SENTINEL) {
        let values = variable
            .options
            .iter()
            .filter(|option| {
                !matches!(
                    option.value.as_str(),
                    Some(ALL_SENTINEL | DISABLED_SENTINEL | ANY_SENTINEL)
                )
            })
            .map(|option| {
                if use_text {
                    option.text.clone()
                } else {
                    option.value.clone()
                }
            })
            .collect();
        return Some(Resolved::Many(values));
    }
    if current.value.contains(DISABLED_SENTINEL) {
        return Some(Resolved::Disabled);
    }
    if current.value.is_any() {
        return Some(Resolved::Any);
    }
    let picked = if use_text { current.text } else { current.value };
    Some(match picked {
        VarValue::One(value) => Resolved::One(value),
        VarValue::Many(values) => Resolved::Many(
            values
                .into_iter()
                .filter(|value| !matches!(value.as_str(), Some(ANY_SENTINEL | "Any")))
                .collect(),
        ),
    })
}

/// Substitutes `$name` and `${name}` (any `:format` suffix is ignored) with
/// the variable's current value, several values joined with commas. `$__all`
/// expands to every real option. Unknown names stay as written.
pub fn interpolate(text: &str, variables: &[TemplateVariable], scoped: &ScopedVars) -> String {
    let mut rendered = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('$') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (braced[..end].split(':').next().unwrap_or_default(), end + 2),
                None => ("", 0),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };
        match csv_value(name, variables, scoped) {
            Some(value) => {
                rendered.push_str(&value);
                rest = &after[consumed..];
            }
            None => {
                rendered.push('$');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

fn csv_value(name: &str, variables: &[TemplateVariable], scoped: &ScopedVars) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let variable = find_variable(variables, name);
    let current = match scoped.get(name) {
        Some(bound) => bound.value.clone(),
        None => variable?.current.as_ref()?.value.clone(),
    };
    let mut values = match current {
        VarValue::One(value) => vec![value],
        VarValue::Many(values) => values,
    };
    if values.iter().any(|value| value.as_str() == Some(ALL_SENTINEL)) {
        if let Some(variable) = variable {
            values = variable
                .options
                .iter()
                .filter(|option| {
                    !matches!(
                        option.value.as_str(),
                        Some(ALL_SENTINEL | DISABLED_SENTINEL | ANY_SENTINEL)
                    )
                })
                .map(|option| option.value.clone())
                .collect();
        }
    }
    Some(
        values
            .iter()
            .map(Scalar::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}
