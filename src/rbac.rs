use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use kube::api::ObjectMeta;

use crate::crd::USER_GROUP;

pub static OPERATOR_ROLE_NAME: &str = "user-operator";

fn rule(group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..PolicyRule::default()
    }
}

/// Permissions the operator needs at runtime
pub fn operator_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(OPERATOR_ROLE_NAME.to_string()),
            ..ObjectMeta::default()
        },
        rules: Some(vec![
            rule(
                USER_GROUP,
                &["users"],
                &["get", "list", "watch", "create", "update", "patch", "delete"],
            ),
            rule(USER_GROUP, &["users/status"], &["get", "update", "patch"]),
            rule(USER_GROUP, &["users/finalizers"], &["update"]),
            rule("", &["secrets"], &["get", "create", "update"]),
            rule("", &["pods"], &["get", "list", "watch"]),
            rule("events.k8s.io", &["events"], &["create", "patch"]),
        ]),
        ..ClusterRole::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbs_for(role: &ClusterRole, group: &str, resource: &str) -> Vec<String> {
        role.rules
            .iter()
            .flatten()
            .filter(|r| r.api_groups.iter().flatten().any(|g| g == group))
            .filter(|r| r.resources.iter().flatten().any(|res| res == resource))
            .flat_map(|r| r.verbs.clone())
            .collect()
    }

    #[test]
    fn secrets_are_read_and_written_by_key() {
        let role = operator_cluster_role();
        assert_eq!(verbs_for(&role, "", "secrets"), vec!["get", "create", "update"]);
    }

    #[test]
    fn users_can_be_watched_and_deleted() {
        let role = operator_cluster_role();
        let verbs = verbs_for(&role, USER_GROUP, "users");
        for verb in ["list", "watch", "delete"] {
            assert!(verbs.iter().any(|v| v == verb), "missing {verb}");
        }
        assert_eq!(verbs_for(&role, USER_GROUP, "users/finalizers"), vec!["update"]);
    }
}
