//! Built-in schema for the `mongodbatlas` provider: projects, clusters,
//! database users and project IP access lists.

use super::{optional, required, FieldKind, SchemaProvider};

pub const NAME: &str = "mongodbatlas";

pub fn provider() -> SchemaProvider {
    use FieldKind::*;

    SchemaProvider::new(NAME)
        .resource(
            "project",
            &[
                required("name", String),
                required("org_id", String),
                optional("project_owner_id", String),
                optional("with_default_alerts_settings", Bool),
            ],
        )
        .resource(
            "cluster",
            &[
                required("project_id", String),
                required("name", String),
                required("provider_name", String),
                required("provider_instance_size_name", String),
                optional("cluster_type", String),
                optional("cloud_backup", Bool),
                optional("mongo_db_major_version", String),
                optional("backing_provider_name", String),
                optional("provider_region_name", String),
                optional("disk_size_gb", Number),
                optional("replication_specs", List),
                optional("labels", List),
            ],
        )
        .resource(
            "database_user",
            &[
                required("project_id", String),
                required("username", String),
                required("auth_database_name", String),
                optional("password", String),
                optional("roles", List),
                optional("scopes", List),
                optional("labels", List),
            ],
        )
        .resource(
            "project_ip_access_list",
            &[
                required("project_id", String),
                optional("cidr_block", String),
                optional("ip_address", String),
                optional("aws_security_group", String),
                optional("comment", String),
            ],
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttributeRef, Config, Value};
    use crate::provider::Provider;

    fn project_ref() -> Value {
        Value::Attribute(AttributeRef {
            resource: "newProject".to_string(),
            path: "id".to_string(),
        })
    }

    #[test]
    fn test_atlas_types() {
        let p = provider();
        let types: Vec<_> = p.resource_types().collect();
        assert_eq!(
            types,
            vec![
                "mongodbatlas_project",
                "mongodbatlas_cluster",
                "mongodbatlas_database_user",
                "mongodbatlas_project_ip_access_list",
            ]
        );
    }

    #[test]
    fn test_atlas_project_valid() {
        let config = Config::from([
            ("name".to_string(), Value::from("CDKTFProject1")),
            ("org_id".to_string(), Value::Variable("orgId".to_string())),
        ]);
        assert!(provider()
            .validate_schema("mongodbatlas_project", &config)
            .is_valid());
    }

    #[test]
    fn test_atlas_cluster_free_tier() {
        let config = Config::from([
            ("project_id".to_string(), project_ref()),
            ("name".to_string(), Value::from("atlasClusterCDK")),
            ("cluster_type".to_string(), Value::from("REPLICASET")),
            ("cloud_backup".to_string(), Value::from(false)),
            ("provider_name".to_string(), Value::from("TENANT")),
            ("backing_provider_name".to_string(), Value::from("GCP")),
            ("provider_instance_size_name".to_string(), Value::from("M0")),
            ("provider_region_name".to_string(), Value::from("CENTRAL_US")),
        ]);
        let result = provider().validate_schema("mongodbatlas_cluster", &config);
        assert!(result.is_valid(), "{:?}", result.problems);
    }

    #[test]
    fn test_atlas_access_list_missing_project() {
        let config = Config::from([("cidr_block".to_string(), Value::from("10.0.0.0/24"))]);
        let result = provider().validate_schema("mongodbatlas_project_ip_access_list", &config);
        assert_eq!(result.problems, vec!["missing required field 'project_id'"]);
    }
}
