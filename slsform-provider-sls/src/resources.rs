//! Resource type definitions for the log service provider
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - The composite identifier layout of each type

use slsform_core::provider::ResourceType;
use slsform_core::schema::ResourceSchema;

use crate::schemas;

pub const LOG_DASHBOARD: &str = "log_dashboard";
pub const LOG_MACHINE_GROUP: &str = "log_machine_group";
pub const LOGTAIL_ATTACHMENT: &str = "logtail_attachment";
pub const SLS_COLLECTION_POLICY: &str = "sls_collection_policy";

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $arity:expr, $schema:path) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn identifier_arity(&self) -> usize {
                $arity
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
        }
    };
}

// project:dashboard_name
define_resource_type!(DashboardType, LOG_DASHBOARD, 2, schemas::dashboard);
// project:name
define_resource_type!(MachineGroupType, LOG_MACHINE_GROUP, 2, schemas::machine_group);
// project:logtail_config_name:machine_group_name
define_resource_type!(
    LogtailAttachmentType,
    LOGTAIL_ATTACHMENT,
    3,
    schemas::logtail_attachment
);
// policy_name
define_resource_type!(
    CollectionPolicyType,
    SLS_COLLECTION_POLICY,
    1,
    schemas::collection_policy
);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(DashboardType),
        Box::new(MachineGroupType),
        Box::new(LogtailAttachmentType),
        Box::new(CollectionPolicyType),
    ]
}

/// Look up a resource type by name
pub fn resource_type(name: &str) -> Option<Box<dyn ResourceType>> {
    resource_types().into_iter().find(|t| t.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_has_a_matching_schema() {
        for t in resource_types() {
            assert_eq!(t.schema().resource_type, t.name());
        }
    }

    #[test]
    fn identifier_arity_per_type() {
        assert_eq!(resource_type(LOG_DASHBOARD).unwrap().identifier_arity(), 2);
        assert_eq!(resource_type(LOG_MACHINE_GROUP).unwrap().identifier_arity(), 2);
        assert_eq!(resource_type(LOGTAIL_ATTACHMENT).unwrap().identifier_arity(), 3);
        assert_eq!(resource_type(SLS_COLLECTION_POLICY).unwrap().identifier_arity(), 1);
        assert!(resource_type("log_store").is_none());
    }
}
