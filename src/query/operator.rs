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

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Serialize, Serializer};

/// A comparison operator as chosen in a where/having row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    NotEq,
    In,
    NotIn,
    Like,
    NotLike,
    Regexp,
    NotRegexp,
    Other(String),
}

/// Merge class used when several conditions share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorClass {
    /// OR-merged: `key = A OR key = B`.
    Forward,
    /// AND-merged: `key != A AND key != B`.
    Reverse,
    /// Range comparisons, AND-merged.
    Other,
}

/// Merge class of an operator. `IN` and `NOT IN` are left unclassified and
/// join with AND like unknown operators.
pub fn classify(op: &Operator) -> Option<OperatorClass> {
    match op {
        Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => Some(OperatorClass::Other),
        Operator::Eq | Operator::Regexp | Operator::Like => Some(OperatorClass::Forward),
        Operator::NotEq | Operator::NotRegexp | Operator::NotLike => Some(OperatorClass::Reverse),
        Operator::In | Operator::NotIn | Operator::Other(_) => None,
    }
}

impl Operator {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "=" => Operator::Eq,
            "!=" => Operator::NotEq,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "REGEXP" => Operator::Regexp,
            "NOT REGEXP" => Operator::NotRegexp,
            _ => Operator::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Regexp => "REGEXP",
            Operator::NotRegexp => "NOT REGEXP",
            Operator::Other(raw) => raw,
        }
    }

    pub fn class(&self) -> Option<OperatorClass> {
        classify(self)
    }

    /// Negated operators, including `NOT IN` and unknown text spelled with
    /// `NOT` or `!`.
    pub fn is_negated(&self) -> bool {
        match self {
            Operator::NotEq | Operator::NotIn | Operator::NotLike | Operator::NotRegexp => true,
            Operator::Other(raw) => raw.to_ascii_uppercase().contains("NOT") || raw.contains('!'),
            _ => false,
        }
    }

    pub fn is_like(&self) -> bool {
        matches!(self, Operator::Like | Operator::NotLike)
    }

    /// LIKE and REGEXP match display text rather than stored codes.
    pub fn matches_text(&self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::NotLike | Operator::Regexp | Operator::NotRegexp
        )
    }

    /// Operators that compare against resource identifiers.
    pub fn matches_ids(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::NotEq | Operator::In | Operator::NotIn
        )
    }
}

impl FromStr for Operator {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Operator::parse(raw))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPORTED: [&str; 10] = [
        "<",
        "<=",
        ">",
        ">=",
        "=",
        "!=",
        "LIKE",
        "NOT LIKE",
        "REGEXP",
        "NOT REGEXP",
    ];

    #[test]
    fn classification_is_total_over_supported_operators() {
        for raw in SUPPORTED {
            let op = Operator::parse(raw);
            assert!(classify(&op).is_some(), "`{raw}` should classify");
            assert_eq!(classify(&op), classify(&Operator::parse(op.as_str())));
        }
    }

    #[test]
    fn classes_follow_merge_semantics() {
        assert_eq!(Operator::parse("<").class(), Some(OperatorClass::Other));
        assert_eq!(Operator::parse(">=").class(), Some(OperatorClass::Other));
        assert_eq!(Operator::parse("=").class(), Some(OperatorClass::Forward));
        assert_eq!(Operator::parse("like").class(), Some(OperatorClass::Forward));
        assert_eq!(
            Operator::parse("not  regexp").class(),
            Some(OperatorClass::Reverse)
        );
        assert_eq!(Operator::parse("!=").class(), Some(OperatorClass::Reverse));
    }

    #[test]
    fn in_lists_are_unclassified() {
        assert_eq!(Operator::parse("IN").class(), None);
        assert_eq!(Operator::parse("not in").class(), None);
    }

    #[test]
    fn negation_covers_in_lists_and_unknown_text() {
        assert!(Operator::NotIn.is_negated());
        assert!(Operator::NotRegexp.is_negated());
        assert!(!Operator::In.is_negated());
        assert!(!Operator::Regexp.is_negated());
        assert!(Operator::parse("NOT BETWEEN").is_negated());
        assert!(Operator::parse("!~").is_negated());
        assert!(!Operator::parse("BETWEEN").is_negated());
    }

    #[test]
    fn unknown_operators_are_unclassified() {
        let op = Operator::parse("BETWEEN");
        assert_eq!(op, Operator::Other("BETWEEN".into()));
        assert_eq!(op.class(), None);
        assert_eq!(op.to_string(), "BETWEEN");
    }

    #[test]
    fn parse_normalizes_case_and_spacing() {
        assert_eq!(Operator::parse(" not like "), Operator::NotLike);
        assert_eq!(Operator::parse("Regexp"), Operator::Regexp);
    }
}
