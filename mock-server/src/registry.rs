//! In-memory state of the fake service.
//!
//! Holds the load balancers, the set of known instance ids, queued fault
//! injections and the log of handled actions. Nothing here locks; `FakeElb`
//! owns the single `Registry` behind its mutex.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use elb_core::{
    Action, HealthCheck, Instance, ListenerDescription, LoadBalancerDescription, Params,
    ServiceError, SourceSecurityGroup,
};

/// Hosted zone id reported for every load balancer.
pub const CANONICAL_HOSTED_ZONE_NAME_ID: &str = "Z3DZXE0Q79N41H";

/// Scheme reported when the create request named none.
pub const DEFAULT_SCHEME: &str = "internet-facing";

/// The DNS name assigned to a load balancer called `name`.
pub fn dns_name(name: &str) -> String {
    format!("{name}-some-aws-stuff.us-east-1.elb.amazonaws.com")
}

/// One load balancer record.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub name: String,
    pub dns_name: String,
    /// Attached instance ids, in attach order.
    pub instances: Vec<String>,
    /// The create request's parameters, kept verbatim.
    pub params: Params,
    pub created_time: DateTime<Utc>,
}

impl LoadBalancer {
    pub fn new(name: &str, params: Params, created_time: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            dns_name: dns_name(name),
            instances: Vec::new(),
            params,
            created_time,
        }
    }

    /// Attach `id` unless it is already attached.
    pub fn attach(&mut self, id: &str) {
        if !self.instances.iter().any(|i| i == id) {
            self.instances.push(id.to_string());
        }
    }

    pub fn detach(&mut self, id: &str) {
        self.instances.retain(|i| i != id);
    }

    /// The record as reported by `DescribeLoadBalancers`.
    pub fn description(&self) -> LoadBalancerDescription {
        let listener_descriptions = self
            .params
            .listeners()
            .into_iter()
            .map(|mut listener| {
                listener.protocol = listener.protocol.to_uppercase();
                listener.instance_protocol = listener.instance_protocol.to_uppercase();
                ListenerDescription {
                    listener,
                    policy_names: Vec::new(),
                }
            })
            .collect();

        LoadBalancerDescription {
            load_balancer_name: self.name.clone(),
            dns_name: self.dns_name.clone(),
            canonical_hosted_zone_name: self.dns_name.clone(),
            canonical_hosted_zone_name_id: CANONICAL_HOSTED_ZONE_NAME_ID.to_string(),
            created_time: Some(self.created_time),
            scheme: self
                .params
                .get("Scheme")
                .unwrap_or(DEFAULT_SCHEME)
                .to_string(),
            health_check: self.health_check(),
            listener_descriptions,
            instances: self
                .instances
                .iter()
                .map(|id| Instance {
                    instance_id: id.clone(),
                })
                .collect(),
            availability_zones: self.params.members("AvailabilityZones"),
            subnets: self.params.members("Subnets"),
            security_groups: self.params.members("SecurityGroups"),
            source_security_group: self.source_security_group(),
        }
    }

    /// The stored `HealthCheck.*` fields, each falling back to the default
    /// when absent or not a number.
    fn health_check(&self) -> HealthCheck {
        let default = HealthCheck::default();
        let number = |field: &str, fallback: u32| {
            self.params
                .get(&format!("HealthCheck.{field}"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };
        HealthCheck {
            healthy_threshold: number("HealthyThreshold", default.healthy_threshold),
            interval: number("Interval", default.interval),
            timeout: number("Timeout", default.timeout),
            unhealthy_threshold: number("UnhealthyThreshold", default.unhealthy_threshold),
            target: self
                .params
                .get("HealthCheck.Target")
                .map_or(default.target, str::to_string),
        }
    }

    fn source_security_group(&self) -> SourceSecurityGroup {
        let default = SourceSecurityGroup::default();
        let field = |name: &str, fallback: String| {
            self.params
                .get(&format!("SourceSecurityGroup.{name}"))
                .map_or(fallback, str::to_string)
        };
        SourceSecurityGroup {
            group_name: field("GroupName", default.group_name),
            owner_alias: field("OwnerAlias", default.owner_alias),
        }
    }
}

/// Everything the fake service remembers between requests.
#[derive(Debug, Default)]
pub struct Registry {
    load_balancers: BTreeMap<String, LoadBalancer>,
    instances: BTreeSet<String>,
    instance_count: u64,
    failures: HashMap<Action, ServiceError>,
    requests: Vec<Action>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- load balancers ---

    /// Store `lb`, replacing any record with the same name.
    pub fn insert_load_balancer(&mut self, lb: LoadBalancer) {
        self.load_balancers.insert(lb.name.clone(), lb);
    }

    pub fn remove_load_balancer(&mut self, name: &str) -> Option<LoadBalancer> {
        self.load_balancers.remove(name)
    }

    pub fn load_balancer(&self, name: &str) -> Result<&LoadBalancer, ServiceError> {
        self.load_balancers
            .get(name)
            .ok_or_else(|| ServiceError::load_balancer_not_found(name))
    }

    pub fn load_balancer_mut(&mut self, name: &str) -> Result<&mut LoadBalancer, ServiceError> {
        self.load_balancers
            .get_mut(name)
            .ok_or_else(|| ServiceError::load_balancer_not_found(name))
    }

    /// All records, ordered by name.
    pub fn load_balancers(&self) -> impl Iterator<Item = &LoadBalancer> {
        self.load_balancers.values()
    }

    // --- instances ---

    /// Create a new known instance and return its id (`i-1`, `i-2`, ...).
    pub fn new_instance(&mut self) -> String {
        self.instance_count += 1;
        let id = format!("i-{}", self.instance_count);
        self.instances.insert(id.clone());
        id
    }

    /// Forget an instance. Load balancers it is attached to keep the id.
    pub fn remove_instance(&mut self, id: &str) {
        self.instances.remove(id);
    }

    pub fn check_instance(&self, id: &str) -> Result<(), ServiceError> {
        if self.instances.contains(id) {
            Ok(())
        } else {
            Err(ServiceError::invalid_instance(id))
        }
    }

    // --- fault injection and request log ---

    /// Make the next request for `action` fail with `err`.
    pub fn fail_next(&mut self, action: Action, err: ServiceError) {
        self.failures.insert(action, err);
    }

    /// Take the injected failure for `action`, if one is queued.
    pub fn take_failure(&mut self, action: &Action) -> Option<ServiceError> {
        self.failures.remove(action)
    }

    pub fn record(&mut self, action: Action) {
        self.requests.push(action);
    }

    pub fn requests(&self) -> &[Action] {
        &self.requests
    }
}
