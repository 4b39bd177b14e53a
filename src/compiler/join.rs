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

use crate::query::{OperatorClass, RowKind};

use super::{
    CondValue, Condition, ConditionGroup, ConditionNode, Junction, normalize::Normalized,
    relationship::resource_id_key,
};

const SIDE_SUFFIXES: [&str; 2] = ["_0", "_1"];

/// A tag condition ready to be grouped.
enum Part {
    Plain(Condition),
    /// A where-only tag expanded over both sides. Carries no key of its own.
    Sided(ConditionGroup),
}

impl Part {
    fn key(&self) -> Option<&str> {
        match self {
            Part::Plain(condition) => Some(&condition.key),
            Part::Sided(_) => None,
        }
    }

    fn class(&self) -> Option<OperatorClass> {
        match self {
            Part::Plain(condition) => condition.op.class(),
            Part::Sided(_) => None,
        }
    }

    fn into_node(self) -> ConditionNode {
        match self {
            Part::Plain(condition) => ConditionNode::Leaf(condition),
            Part::Sided(group) => ConditionNode::Group(group),
        }
    }
}

/// Builds the condition tree from normalized rows.
///
/// Tag conditions are grouped by key in first-seen order. Within a key,
/// conditions of one operator class form a group: forward operators are
/// OR-ed, reverse and range operators AND-ed. A key with several classes
/// OR-s its class groups. Metric conditions follow the tag groups unchanged.
pub(super) fn join_conditions(items: Vec<Normalized>) -> Vec<ConditionNode> {
    let mut parts = Vec::new();
    let mut metrics = Vec::new();
    for item in items {
        match item {
            Normalized::Tag(condition) if condition.where_only => {
                parts.push(Part::Sided(expand_sides(condition)))
            }
            Normalized::Tag(condition) => {
                parts.extend(split_like(condition).into_iter().map(Part::Plain))
            }
            Normalized::Metric(node) => metrics.push(node),
        }
    }

    let mut by_key: Vec<(Option<String>, Vec<Part>)> = Vec::new();
    for part in parts {
        let key = part.key().map(str::to_string);
        match by_key.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, group)) => group.push(part),
            None => by_key.push((key, vec![part])),
        }
    }

    let mut nodes = Vec::with_capacity(by_key.len() + metrics.len());
    for (_, key_parts) in by_key {
        let mut by_class: Vec<(Option<OperatorClass>, Vec<ConditionNode>)> = Vec::new();
        for part in key_parts {
            let class = part.class();
            let node = part.into_node();
            match by_class.iter_mut().find(|(existing, _)| *existing == class) {
                Some((_, group)) => group.push(node),
                None => by_class.push((class, vec![node])),
            }
        }
        let mut class_groups: Vec<ConditionNode> = by_class
            .into_iter()
            .map(|(class, val)| {
                ConditionNode::Group(ConditionGroup {
                    kind: RowKind::Tag,
                    op: junction(class),
                    val,
                })
            })
            .collect();
        if class_groups.len() == 1 {
            nodes.append(&mut class_groups);
        } else {
            nodes.push(ConditionNode::Group(ConditionGroup {
                kind: RowKind::Tag,
                op: Junction::Or,
                val: class_groups,
            }));
        }
    }
    nodes.extend(metrics);
    nodes
}

fn junction(class: Option<OperatorClass>) -> Junction {
    match class {
        Some(OperatorClass::Forward) => Junction::Or,
        _ => Junction::And,
    }
}

/// LIKE patterns are matched one at a time.
fn split_like(condition: Condition) -> Vec<Condition> {
    if !condition.op.is_like() {
        return vec![condition];
    }
    match &condition.val {
        CondValue::Many(values) => values
            .iter()
            .map(|value| Condition {
                val: CondValue::One(value.clone()),
                ..condition.clone()
            })
            .collect(),
        CondValue::One(_) => vec![condition],
    }
}

/// Rewrites a where-only tag into conditions on its client and server columns.
///
/// Negated operators must hold on both sides, everything else on either.
fn expand_sides(condition: Condition) -> ConditionGroup {
    let op = if condition.op.is_negated() {
        Junction::And
    } else {
        Junction::Or
    };
    let mut val = Vec::new();
    for side in SIDE_SUFFIXES {
        let sided = format!("{}{side}", condition.key);
        let key = if condition.op.matches_ids() {
            resource_id_key(&sided)
        } else {
            sided
        };
        let keyed = Condition {
            key,
            ..condition.clone()
        };
        val.extend(split_like(keyed).into_iter().map(ConditionNode::Leaf));
    }
    ConditionGroup {
        kind: RowKind::Tag,
        op,
        val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Operator, Scalar};
    use serde_json::json;

    fn tag(key: &str, op: &str, val: CondValue) -> Normalized {
        Normalized::Tag(Condition::tag(key, Operator::parse(op), val))
    }

    fn one(value: &str) -> CondValue {
        CondValue::One(Scalar::text(value))
    }

    #[test]
    fn same_class_conditions_share_a_group() {
        let nodes = join_conditions(vec![
            tag("pod", "=", one("a")),
            tag("pod", "=", one("b")),
            tag("pod", "!=", one("c")),
            tag("region", "=", one("r")),
        ]);
        assert_eq!(
            serde_json::to_value(&nodes).unwrap(),
            json!([
                {"type": "tag", "op": "OR", "val": [
                    {"type": "tag", "op": "OR", "val": [
                        {"isForbidden": false, "type": "tag", "key": "pod", "op": "=", "val": "a"},
                        {"isForbidden": false, "type": "tag", "key": "pod", "op": "=", "val": "b"}
                    ]},
                    {"type": "tag", "op": "AND", "val": [
                        {"isForbidden": false, "type": "tag", "key": "pod", "op": "!=", "val": "c"}
                    ]}
                ]},
                {"type": "tag", "op": "OR", "val": [
                    {"isForbidden": false, "type": "tag", "key": "region", "op": "=", "val": "r"}
                ]}
            ])
        );
    }

    #[test]
    fn key_order_follows_first_appearance() {
        let nodes = join_conditions(vec![
            tag("b", "=", one("1")),
            tag("a", "=", one("2")),
            tag("b", "=", one("3")),
        ]);
        let keys: Vec<_> = nodes
            .iter()
            .map(|node| match node {
                ConditionNode::Group(group) => match &group.val[0] {
                    ConditionNode::Leaf(leaf) => leaf.key.clone(),
                    other => panic!("unexpected node {other:?}"),
                },
                other => panic!("unexpected node {other:?}"),
            })
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn reordering_within_a_class_keeps_the_same_leaves() {
        let forward = join_conditions(vec![tag("pod", "=", one("a")), tag("pod", "=", one("b"))]);
        let reversed = join_conditions(vec![tag("pod", "=", one("b")), tag("pod", "=", one("a"))]);
        let leaves = |nodes: &[ConditionNode]| match &nodes[0] {
            ConditionNode::Group(group) => {
                let mut values: Vec<String> = group
                    .val
                    .iter()
                    .map(|node| serde_json::to_string(node).unwrap())
                    .collect();
                values.sort();
                (group.op, values)
            }
            other => panic!("unexpected node {other:?}"),
        };
        assert_eq!(leaves(&forward), leaves(&reversed));
    }

    #[test]
    fn like_values_are_split() {
        let nodes = join_conditions(vec![tag(
            "host",
            "LIKE",
            CondValue::Many(vec![Scalar::text("a*"), Scalar::text("b*")]),
        )]);
        let ConditionNode::Group(group) = &nodes[0] else {
            panic!("expected a group");
        };
        assert_eq!(group.op, Junction::Or);
        assert_eq!(group.val.len(), 2);
    }

    #[test]
    fn where_only_expands_to_both_sides() {
        let mut condition = Condition::tag(
            "auto_service",
            Operator::In,
            CondValue::Many(vec![Scalar::from(5_i64)]),
        );
        condition.where_only = true;
        let nodes = join_conditions(vec![Normalized::Tag(condition)]);
        assert_eq!(
            serde_json::to_value(&nodes).unwrap(),
            json!([{"type": "tag", "op": "AND", "val": [
                {"type": "tag", "op": "OR", "val": [
                    {"isForbidden": false, "type": "tag", "key": "auto_service_id_0",
                     "op": "IN", "val": [5], "whereOnly": true},
                    {"isForbidden": false, "type": "tag", "key": "auto_service_id_1",
                     "op": "IN", "val": [5], "whereOnly": true}
                ]}
            ]}])
        );
    }

    #[test]
    fn negated_where_only_requires_both_sides() {
        let mut condition = Condition::tag("ip", Operator::NotLike, one("10.*"));
        condition.where_only = true;
        let group = expand_sides(condition);
        assert_eq!(group.op, Junction::And);
        let keys: Vec<_> = group
            .val
            .iter()
            .map(|node| match node {
                ConditionNode::Leaf(leaf) => leaf.key.as_str(),
                other => panic!("unexpected node {other:?}"),
            })
            .collect();
        assert_eq!(keys, vec!["ip_0", "ip_1"]);
    }

    #[test]
    fn same_key_in_lists_are_and_joined() {
        let list = |value: &str| CondValue::Many(vec![Scalar::text(value)]);
        let nodes = join_conditions(vec![
            tag("pod", "IN", list("a")),
            tag("pod", "IN", list("b")),
            tag("pod", "=", one("c")),
        ]);
        assert_eq!(
            serde_json::to_value(&nodes).unwrap(),
            json!([
                {"type": "tag", "op": "OR", "val": [
                    {"type": "tag", "op": "AND", "val": [
                        {"isForbidden": false, "type": "tag", "key": "pod", "op": "IN", "val": ["a"]},
                        {"isForbidden": false, "type": "tag", "key": "pod", "op": "IN", "val": ["b"]}
                    ]},
                    {"type": "tag", "op": "OR", "val": [
                        {"isForbidden": false, "type": "tag", "key": "pod", "op": "=", "val": "c"}
                    ]}
                ]}
            ])
        );
    }

    #[test]
    fn where_only_not_in_requires_both_sides() {
        let mut condition = Condition::tag(
            "auto_service",
            Operator::NotIn,
            CondValue::Many(vec![Scalar::from(5_i64)]),
        );
        condition.where_only = true;
        let group = expand_sides(condition);
        assert_eq!(group.op, Junction::And);
        assert_eq!(group.val.len(), 2);
    }

    #[test]
    fn metrics_follow_tags() {
        let metric = Normalized::Metric(ConditionNode::Leaf(Condition {
            kind: RowKind::Metric,
            ..Condition::tag("byte", Operator::Gt, CondValue::One(Scalar::from(1_i64)))
        }));
        let nodes = join_conditions(vec![metric, tag("pod", "=", one("a"))]);
        assert!(matches!(nodes[0], ConditionNode::Group(_)));
        assert!(matches!(&nodes[1], ConditionNode::Leaf(leaf) if leaf.key == "byte"));
    }
}
