//! Request parameters and the member-indexed list convention.
//!
//! # Design
//! The query API flattens every request into string pairs. Lists become
//! `<List>.member.<n>` (scalars) or `<List>.member.<n>.<Field>` (structs),
//! numbered from 1 in input order. `Params` keeps keys in a `BTreeMap`, so
//! iteration is already the lexicographic order the signer needs.
//!
//! The reading side (`members`, `listeners`) is used by the fake server to
//! take the same conventions apart again.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::action::Action;
use crate::types::{
    CreateLoadBalancer, DeleteLoadBalancer, DeregisterInstances, DescribeInstanceHealth,
    DescribeLoadBalancers, Listener, RegisterInstances,
};

/// Characters left unescaped by the query API: RFC 3986 unreserved.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a key or value the way the service expects.
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, UNRESERVED).to_string()
}

/// An ordered set of request parameters with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Params for `action`, with `Action` already set.
    pub fn for_action(action: Action) -> Self {
        let mut params = Self::new();
        params.insert("Action", action.as_str());
        params
    }

    /// Build from decoded form pairs. When a key repeats, the first value wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.entry(k.into()).or_insert_with(|| v.into());
        }
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert unless `value` is absent or empty.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<&str>) {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.insert(key, v);
        }
    }

    /// Insert only if `key` is not already present.
    pub fn insert_default(&mut self, key: &str, value: impl Into<String>) {
        self.0.entry(key.to_string()).or_insert_with(|| value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// The value for `key`. Empty values read as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as `k=v&k=v`, keys sorted, both sides percent-encoded.
    pub fn to_query(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Append `list` as `<list>.member.<n>`.
    pub fn push_members<S: AsRef<str>>(&mut self, list: &str, values: &[S]) {
        for (i, value) in values.iter().enumerate() {
            self.insert(member_key(list, i + 1), value.as_ref());
        }
    }

    /// Append instance ids as `Instances.member.<n>.InstanceId`.
    pub fn push_instance_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        for (i, id) in ids.iter().enumerate() {
            self.insert(field_key("Instances", i + 1, "InstanceId"), id.as_ref());
        }
    }

    pub fn push_listeners(&mut self, listeners: &[Listener]) {
        for (i, l) in listeners.iter().enumerate() {
            let n = i + 1;
            self.insert(field_key("Listeners", n, "InstancePort"), l.instance_port.to_string());
            self.insert(field_key("Listeners", n, "InstanceProtocol"), l.instance_protocol.as_str());
            self.insert(field_key("Listeners", n, "Protocol"), l.protocol.as_str());
            self.insert(
                field_key("Listeners", n, "LoadBalancerPort"),
                l.load_balancer_port.to_string(),
            );
            self.insert_opt(
                field_key("Listeners", n, "SSLCertificateId"),
                l.ssl_certificate_id.as_deref(),
            );
        }
    }

    /// Read `<list>.member.1`, `.2`, ... up to the first missing index.
    pub fn members(&self, list: &str) -> Vec<String> {
        (1..)
            .map_while(|n| self.get(&member_key(list, n)).map(str::to_string))
            .collect()
    }

    /// Read `Instances.member.<n>.InstanceId` up to the first missing index.
    pub fn instance_ids(&self) -> Vec<String> {
        (1..)
            .map_while(|n| {
                self.get(&field_key("Instances", n, "InstanceId"))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Read listeners back, stopping at the first index without a `Protocol`.
    ///
    /// Ports that are missing or not numbers read as 0.
    pub fn listeners(&self) -> Vec<Listener> {
        (1..)
            .map_while(|n| {
                let protocol = self.get(&field_key("Listeners", n, "Protocol"))?;
                let field = |name: &str| self.get(&field_key("Listeners", n, name));
                Some(Listener {
                    instance_port: parse_or_default(field("InstancePort")),
                    instance_protocol: field("InstanceProtocol").unwrap_or_default().to_string(),
                    load_balancer_port: parse_or_default(field("LoadBalancerPort")),
                    protocol: protocol.to_string(),
                    ssl_certificate_id: field("SSLCertificateId").map(str::to_string),
                })
            })
            .collect()
    }
}

/// `<list>.member.<n>`
pub fn member_key(list: &str, n: usize) -> String {
    format!("{list}.member.{n}")
}

/// `<list>.member.<n>.<field>`
pub fn field_key(list: &str, n: usize, field: &str) -> String {
    format!("{list}.member.{n}.{field}")
}

fn parse_or_default<T: std::str::FromStr + Default>(value: Option<&str>) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or_default()
}

/// A request that can be flattened into wire parameters.
pub trait ToParams {
    fn action(&self) -> Action;
    fn to_params(&self) -> Params;
}

impl ToParams for CreateLoadBalancer {
    fn action(&self) -> Action {
        Action::CreateLoadBalancer
    }

    fn to_params(&self) -> Params {
        let mut params = Params::for_action(self.action());
        params.insert("LoadBalancerName", self.name.as_str());
        params.insert_opt("Scheme", self.scheme.as_deref());
        params.push_members("AvailabilityZones", &self.availability_zones);
        params.push_members("Subnets", &self.subnets);
        params.push_members("SecurityGroups", &self.security_groups);
        params.push_listeners(&self.listeners);
        params
    }
}

impl ToParams for DeleteLoadBalancer {
    fn action(&self) -> Action {
        Action::DeleteLoadBalancer
    }

    fn to_params(&self) -> Params {
        let mut params = Params::for_action(self.action());
        params.insert("LoadBalancerName", self.name.as_str());
        params
    }
}

impl ToParams for RegisterInstances {
    fn action(&self) -> Action {
        Action::RegisterInstancesWithLoadBalancer
    }

    fn to_params(&self) -> Params {
        let mut params = Params::for_action(self.action());
        params.insert("LoadBalancerName", self.load_balancer_name.as_str());
        params.push_instance_ids(&self.instance_ids);
        params
    }
}

impl ToParams for DeregisterInstances {
    fn action(&self) -> Action {
        Action::DeregisterInstancesFromLoadBalancer
    }

    fn to_params(&self) -> Params {
        let mut params = Params::for_action(self.action());
        params.insert("LoadBalancerName", self.load_balancer_name.as_str());
        params.push_instance_ids(&self.instance_ids);
        params
    }
}

impl ToParams for DescribeLoadBalancers {
    fn action(&self) -> Action {
        Action::DescribeLoadBalancers
    }

    fn to_params(&self) -> Params {
        let mut params = Params::for_action(self.action());
        params.push_members("LoadBalancerNames", &self.names);
        params
    }
}

impl ToParams for DescribeInstanceHealth {
    fn action(&self) -> Action {
        Action::DescribeInstanceHealth
    }

    fn to_params(&self) -> Params {
        let mut params = Params::for_action(self.action());
        params.insert("LoadBalancerName", self.load_balancer_name.as_str());
        params.push_instance_ids(&self.instance_ids);
        params
    }
}
