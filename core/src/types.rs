//! Request options and response results for the load-balancing API.
//!
//! # Design
//! Request types are plain data that `ToParams` flattens into wire
//! parameters. Result types are what `XmlResponse` decodes from (and the fake
//! server encodes into) XML. Both derive serde so test vectors can describe
//! them as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Options for creating a load balancer.
///
/// Exactly one of `availability_zones` or `subnets` should be non-empty; the
/// client does not check this, the service does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateLoadBalancer {
    pub name: String,
    pub availability_zones: Vec<String>,
    pub listeners: Vec<Listener>,
    pub scheme: Option<String>,
    pub security_groups: Vec<String>,
    pub subnets: Vec<String>,
}

/// A protocol/port mapping between the load balancer and its instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Listener {
    pub instance_port: u16,
    pub instance_protocol: String,
    pub load_balancer_port: u16,
    pub protocol: String,
    pub ssl_certificate_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteLoadBalancer {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInstances {
    pub load_balancer_name: String,
    pub instance_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregisterInstances {
    pub load_balancer_name: String,
    pub instance_ids: Vec<String>,
}

/// Describe every load balancer, or only the named ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeLoadBalancers {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeInstanceHealth {
    pub load_balancer_name: String,
    pub instance_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoadBalancerResp {
    pub dns_name: String,
    pub request_id: String,
}

/// Result of an action whose only payload is the request id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleResp {
    pub request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterInstancesResp {
    pub instance_ids: Vec<String>,
    pub request_id: String,
}

/// Result of deregistration: the instances still attached afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeregisterInstancesResp {
    pub instance_ids: Vec<String>,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeLoadBalancersResp {
    pub load_balancer_descriptions: Vec<LoadBalancerDescription>,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerDescription {
    pub load_balancer_name: String,
    pub dns_name: String,
    pub canonical_hosted_zone_name: String,
    pub canonical_hosted_zone_name_id: String,
    pub created_time: Option<DateTime<Utc>>,
    pub scheme: String,
    pub health_check: HealthCheck,
    pub listener_descriptions: Vec<ListenerDescription>,
    pub instances: Vec<Instance>,
    pub availability_zones: Vec<String>,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub source_security_group: SourceSecurityGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    pub healthy_threshold: u32,
    pub interval: u32,
    pub target: String,
    pub timeout: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheck {
    /// The health check the service assigns when none is configured.
    fn default() -> Self {
        Self {
            healthy_threshold: 10,
            interval: 30,
            target: "TCP:80".to_string(),
            timeout: 5,
            unhealthy_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerDescription {
    pub listener: Listener,
    pub policy_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSecurityGroup {
    pub group_name: String,
    pub owner_alias: String,
}

impl Default for SourceSecurityGroup {
    /// The service's well-known default group.
    fn default() -> Self {
        Self {
            group_name: "amazon-elb-sg".to_string(),
            owner_alias: "amazon-elb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeInstanceHealthResp {
    pub instance_states: Vec<InstanceState>,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceState {
    pub description: String,
    pub instance_id: String,
    pub reason_code: String,
    pub state: String,
}
