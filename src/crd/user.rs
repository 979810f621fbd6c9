use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static USER_GROUP: &str = "general.k8s-operators-training";

/// Desired credentials, projected into a `Secret` of the same name
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "general.k8s-operators-training",
    version = "v1",
    kind = "User",
    derive = "Default",
    derive = "PartialEq",
    namespaced,
    shortname = "usr",
    doc = "User is projected into a Secret with the same namespace and name, then removed",
    printcolumn = r#"{"name":"Id","jsonPath":".spec.id","type":"integer"}"#,
    printcolumn = r#"{"name":"Username","jsonPath":".spec.username","type":"string"}"#
)]
pub struct UserSpec {
    pub id: i64,
    pub username: String,
    pub password: String,
}
