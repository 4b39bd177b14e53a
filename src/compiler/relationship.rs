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

use serde::{Deserialize, Serialize};

use crate::query::{Row, SideType};

/// Which returned columns describe the source, destination and shared parts of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessRelationshipConfig {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub common: Vec<String>,
}

/// `x` becomes `x_id`, `x_0` becomes `x_id_0`; IP keys have no id form.
pub fn resource_id_key(key: &str) -> String {
    if key.contains("ip") {
        return key.to_string();
    }
    for side in ["_0", "_1"] {
        if let Some(stem) = key.strip_suffix(side) {
            return format!("{stem}_id{side}");
        }
    }
    format!("{key}_id")
}

/// Splits relationship group-by rows into sides.
///
/// At least one `from` and one `to` row are checked at submission time, not here.
pub fn access_relationship_config<S: AsRef<str>>(
    group_by: &[Row],
    return_tags: &[S],
) -> AccessRelationshipConfig {
    let mut config = AccessRelationshipConfig::default();
    for row in group_by.iter().filter(|row| row.has_key()) {
        let key = row.real_key();
        let side_key = || {
            if row.is_resource_type || row.is_ip_type {
                resource_id_key(key)
            } else {
                key.to_string()
            }
        };
        match row.side_type {
            Some(SideType::From) => config.from.push(side_key()),
            Some(SideType::To) => config.to.push(side_key()),
            None => {
                config.common.push(key.to_string());
                let companion = format!("Enum({key})");
                if return_tags.iter().any(|tag| tag.as_ref() == companion) {
                    config.common.push(companion);
                }
            }
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_resource_keys() {
        assert_eq!(resource_id_key("auto_service"), "auto_service_id");
        assert_eq!(resource_id_key("auto_service_0"), "auto_service_id_0");
        assert_eq!(resource_id_key("pod_1"), "pod_id_1");
        assert_eq!(resource_id_key("ip_0"), "ip_0");
        assert_eq!(resource_id_key("tunnel_tx_ip"), "tunnel_tx_ip");
    }

    #[test]
    fn splits_sides_and_appends_enum_companions() {
        let group_by = vec![
            Row::tag("auto_service_id").with_side(SideType::From),
            Row::tag("auto_service_id").with_side(SideType::To),
            Row::tag("region"),
            Row::tag(""),
        ];
        let config = access_relationship_config(&group_by, &["Enum(region)", "region"]);
        assert_eq!(
            config,
            AccessRelationshipConfig {
                from: vec!["auto_service_id".into()],
                to: vec!["auto_service_id".into()],
                common: vec!["region".into(), "Enum(region)".into()],
            }
        );
    }

    #[test]
    fn resource_rows_use_identifier_keys() {
        let mut client = Row::tag("auto_instance_0").with_side(SideType::From);
        client.is_resource_type = true;
        let mut server = Row::tag("ip_1").with_side(SideType::To);
        server.is_ip_type = true;
        let config = access_relationship_config(&[client, server], &[] as &[&str]);
        assert_eq!(config.from, vec!["auto_instance_id_0"]);
        assert_eq!(config.to, vec!["ip_1"]);
        assert!(config.common.is_empty());
    }
}
