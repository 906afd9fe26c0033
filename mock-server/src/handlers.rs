//! One function per action.
//!
//! Each handler validates its parameters, mutates the registry and returns the
//! typed result. Validation failures are `ServiceError`s and leave the
//! registry as it was, except for the register/deregister batch, where ids
//! before the first unknown one have already been applied.

use chrono::Utc;
use elb_core::{
    codec, Action, CreateLoadBalancerResp, DeregisterInstancesResp, DescribeInstanceHealthResp,
    DescribeLoadBalancersResp, InstanceState, Params, RegisterInstancesResp, ServiceError,
    SimpleResp, XmlResponse,
};
use tracing::info;

use crate::registry::{LoadBalancer, Registry};
use crate::validate::{exactly_one, listener_ports, required};

const LISTENER_FIELDS: [&str; 4] = [
    "Listeners.member.1.InstancePort",
    "Listeners.member.1.InstanceProtocol",
    "Listeners.member.1.Protocol",
    "Listeners.member.1.LoadBalancerPort",
];

/// Run `action` and encode its result as the success envelope.
pub fn dispatch(
    registry: &mut Registry,
    action: &Action,
    params: &Params,
    request_id: &str,
) -> Result<String, ServiceError> {
    match action {
        Action::CreateLoadBalancer => respond(create_load_balancer(registry, params, request_id)?),
        Action::DeleteLoadBalancer => respond(delete_load_balancer(registry, params, request_id)?),
        Action::RegisterInstancesWithLoadBalancer => {
            respond(register_instances(registry, params, request_id)?)
        }
        Action::DeregisterInstancesFromLoadBalancer => {
            respond(deregister_instances(registry, params, request_id)?)
        }
        Action::DescribeLoadBalancers => {
            respond(describe_load_balancers(registry, params, request_id)?)
        }
        Action::DescribeInstanceHealth => {
            respond(describe_instance_health(registry, params, request_id)?)
        }
        Action::Unrecognized(_) => Err(ServiceError::unrecognized_action()),
    }
}

fn respond<R: XmlResponse>(result: R) -> Result<String, ServiceError> {
    codec::encode(&result).map_err(|e| ServiceError::new(500, "InternalFailure", e.to_string()))
}

pub fn create_load_balancer(
    registry: &mut Registry,
    params: &Params,
    request_id: &str,
) -> Result<CreateLoadBalancerResp, ServiceError> {
    exactly_one(params, "AvailabilityZones.member.1", "Subnets.member.1")?;
    required(params, &LISTENER_FIELDS)?;
    listener_ports(params)?;
    required(params, &["LoadBalancerName"])?;

    let name = params.get("LoadBalancerName").unwrap_or_default();
    let lb = LoadBalancer::new(name, params.clone(), Utc::now());
    let dns_name = lb.dns_name.clone();
    registry.insert_load_balancer(lb);
    info!(load_balancer = name, %dns_name, "load balancer created");

    Ok(CreateLoadBalancerResp {
        dns_name,
        request_id: request_id.to_string(),
    })
}

/// Removing an unknown name succeeds.
pub fn delete_load_balancer(
    registry: &mut Registry,
    params: &Params,
    request_id: &str,
) -> Result<SimpleResp, ServiceError> {
    required(params, &["LoadBalancerName"])?;
    let name = params.get("LoadBalancerName").unwrap_or_default();
    if registry.remove_load_balancer(name).is_some() {
        info!(load_balancer = name, "load balancer deleted");
    }
    Ok(SimpleResp {
        request_id: request_id.to_string(),
    })
}

pub fn register_instances(
    registry: &mut Registry,
    params: &Params,
    request_id: &str,
) -> Result<RegisterInstancesResp, ServiceError> {
    required(params, &["LoadBalancerName"])?;
    let name = params.get("LoadBalancerName").unwrap_or_default();
    registry.load_balancer(name)?;
    required(params, &["Instances.member.1.InstanceId"])?;

    for id in params.instance_ids() {
        registry.check_instance(&id)?;
        registry.load_balancer_mut(name)?.attach(&id);
    }

    Ok(RegisterInstancesResp {
        instance_ids: registry.load_balancer(name)?.instances.clone(),
        request_id: request_id.to_string(),
    })
}

pub fn deregister_instances(
    registry: &mut Registry,
    params: &Params,
    request_id: &str,
) -> Result<DeregisterInstancesResp, ServiceError> {
    required(params, &["LoadBalancerName"])?;
    let name = params.get("LoadBalancerName").unwrap_or_default();
    registry.load_balancer(name)?;

    for id in params.instance_ids() {
        registry.check_instance(&id)?;
        registry.load_balancer_mut(name)?.detach(&id);
    }

    Ok(DeregisterInstancesResp {
        instance_ids: registry.load_balancer(name)?.instances.clone(),
        request_id: request_id.to_string(),
    })
}

/// Named load balancers in request order, or all of them ordered by name.
pub fn describe_load_balancers(
    registry: &Registry,
    params: &Params,
    request_id: &str,
) -> Result<DescribeLoadBalancersResp, ServiceError> {
    let names = params.members("LoadBalancerNames");
    let load_balancer_descriptions = if names.is_empty() {
        registry.load_balancers().map(LoadBalancer::description).collect()
    } else {
        names
            .iter()
            .map(|name| registry.load_balancer(name).map(LoadBalancer::description))
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(DescribeLoadBalancersResp {
        load_balancer_descriptions,
        request_id: request_id.to_string(),
    })
}

/// Every instance reads as pending. With no ids, reports every attached one.
pub fn describe_instance_health(
    registry: &Registry,
    params: &Params,
    request_id: &str,
) -> Result<DescribeInstanceHealthResp, ServiceError> {
    let name = params.get("LoadBalancerName").unwrap_or_default();
    let lb = registry.load_balancer(name)?;

    let mut ids = params.instance_ids();
    if ids.is_empty() {
        ids = lb.instances.clone();
    }
    let instance_states = ids
        .into_iter()
        .map(|id| {
            registry.check_instance(&id)?;
            Ok(pending_state(id))
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    Ok(DescribeInstanceHealthResp {
        instance_states,
        request_id: request_id.to_string(),
    })
}

fn pending_state(instance_id: String) -> InstanceState {
    InstanceState {
        description: "Instance is in pending state.".to_string(),
        instance_id,
        reason_code: "Instance".to_string(),
        state: "OutOfService".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_params(name: &str) -> Params {
        Params::from_pairs([
            ("LoadBalancerName", name),
            ("AvailabilityZones.member.1", "us-east-1a"),
            ("Listeners.member.1.InstancePort", "80"),
            ("Listeners.member.1.InstanceProtocol", "http"),
            ("Listeners.member.1.Protocol", "http"),
            ("Listeners.member.1.LoadBalancerPort", "80"),
        ])
    }

    fn with_testlb() -> Registry {
        let mut reg = Registry::new();
        create_load_balancer(&mut reg, &create_params("testlb"), "r").unwrap();
        reg
    }

    fn instance_params(name: &str, ids: &[&str]) -> Params {
        let mut params = Params::new();
        params.insert("LoadBalancerName", name);
        params.push_instance_ids(ids);
        params
    }

    #[test]
    fn create_stores_record_with_dns_name() {
        let mut reg = Registry::new();
        let resp = create_load_balancer(&mut reg, &create_params("testlb"), "req-1").unwrap();
        assert_eq!(resp.dns_name, "testlb-some-aws-stuff.us-east-1.elb.amazonaws.com");
        assert_eq!(resp.request_id, "req-1");
        assert!(reg.load_balancer("testlb").is_ok());
    }

    #[test]
    fn create_checks_composition_before_required_fields() {
        let mut reg = Registry::new();
        let params = Params::from_pairs([("LoadBalancerName", "testlb")]);
        let err = create_load_balancer(&mut reg, &params, "r").unwrap_err();
        assert!(err.message.starts_with("Either"));
    }

    #[test]
    fn create_requires_listener_fields_then_name() {
        let mut reg = Registry::new();
        let mut params = create_params("testlb");
        params.remove("Listeners.member.1.Protocol");
        let err = create_load_balancer(&mut reg, &params, "r").unwrap_err();
        assert_eq!(err.message, "Listeners.member.1.Protocol is required.");

        let mut params = create_params("testlb");
        params.remove("LoadBalancerName");
        let err = create_load_balancer(&mut reg, &params, "r").unwrap_err();
        assert_eq!(err.message, "LoadBalancerName is required.");
        assert!(reg.load_balancers().next().is_none());
    }

    #[test]
    fn create_over_existing_name_resets_instances() {
        let mut reg = with_testlb();
        let id = reg.new_instance();
        register_instances(&mut reg, &instance_params("testlb", &[id.as_str()]), "r").unwrap();
        create_load_balancer(&mut reg, &create_params("testlb"), "r").unwrap();
        assert!(reg.load_balancer("testlb").unwrap().instances.is_empty());
    }

    #[test]
    fn delete_unknown_name_succeeds() {
        let mut reg = Registry::new();
        let params = Params::from_pairs([("LoadBalancerName", "nope")]);
        let resp = delete_load_balancer(&mut reg, &params, "req-9").unwrap();
        assert_eq!(resp.request_id, "req-9");
    }

    #[test]
    fn register_applies_valid_prefix_before_unknown_id() {
        let mut reg = with_testlb();
        let id = reg.new_instance();
        let err = register_instances(&mut reg, &instance_params("testlb", &[id.as_str(), "i-nope"]), "r")
            .unwrap_err();
        assert_eq!(err.code, "InvalidInstance");
        assert!(err.message.contains("i-nope"));
        assert_eq!(reg.load_balancer("testlb").unwrap().instances, vec![id]);
    }

    #[test]
    fn register_checks_load_balancer_before_instance_ids() {
        let mut reg = Registry::new();
        let err = register_instances(&mut reg, &instance_params("absentLB", &[]), "r").unwrap_err();
        assert_eq!(err.code, "LoadBalancerNotFound");

        let mut reg = with_testlb();
        let err = register_instances(&mut reg, &instance_params("testlb", &[]), "r").unwrap_err();
        assert_eq!(err.message, "Instances.member.1.InstanceId is required.");
    }

    #[test]
    fn register_twice_attaches_once() {
        let mut reg = with_testlb();
        let id = reg.new_instance();
        register_instances(&mut reg, &instance_params("testlb", &[id.as_str()]), "r").unwrap();
        let resp = register_instances(&mut reg, &instance_params("testlb", &[id.as_str()]), "r").unwrap();
        assert_eq!(resp.instance_ids, vec![id]);
    }

    #[test]
    fn deregister_reports_remaining_instances() {
        let mut reg = with_testlb();
        let a = reg.new_instance();
        let b = reg.new_instance();
        register_instances(&mut reg, &instance_params("testlb", &[a.as_str(), b.as_str()]), "r").unwrap();
        let resp = deregister_instances(&mut reg, &instance_params("testlb", &[a.as_str()]), "r").unwrap();
        assert_eq!(resp.instance_ids, vec![b]);
    }

    #[test]
    fn describe_named_keeps_request_order() {
        let mut reg = with_testlb();
        create_load_balancer(&mut reg, &create_params("alpha"), "r").unwrap();
        let mut params = Params::new();
        params.push_members("LoadBalancerNames", &["testlb", "alpha"]);
        let resp = describe_load_balancers(&reg, &params, "r").unwrap();
        let names: Vec<_> = resp
            .load_balancer_descriptions
            .iter()
            .map(|d| d.load_balancer_name.as_str())
            .collect();
        assert_eq!(names, vec!["testlb", "alpha"]);

        let resp = describe_load_balancers(&reg, &Params::new(), "r").unwrap();
        assert_eq!(resp.load_balancer_descriptions[0].load_balancer_name, "alpha");
    }

    #[test]
    fn describe_unknown_name_is_not_found() {
        let reg = with_testlb();
        let mut params = Params::new();
        params.push_members("LoadBalancerNames", &["testlb", "ghost"]);
        let err = describe_load_balancers(&reg, &params, "r").unwrap_err();
        assert_eq!(err.message, "There is no ACTIVE Load Balancer named 'ghost'");
    }

    #[test]
    fn instance_health_without_ids_lists_attached() {
        let mut reg = with_testlb();
        let id = reg.new_instance();
        register_instances(&mut reg, &instance_params("testlb", &[id.as_str()]), "r").unwrap();
        let resp =
            describe_instance_health(&reg, &instance_params("testlb", &[]), "r").unwrap();
        assert_eq!(resp.instance_states.len(), 1);
        let state = &resp.instance_states[0];
        assert_eq!(state.instance_id, id);
        assert_eq!(state.state, "OutOfService");
        assert_eq!(state.reason_code, "Instance");
        assert_eq!(state.description, "Instance is in pending state.");
    }

    #[test]
    fn instance_health_rejects_unknown_instance() {
        let reg = with_testlb();
        let err = describe_instance_health(&reg, &instance_params("testlb", &["i-x"]), "r")
            .unwrap_err();
        assert_eq!(err.code, "InvalidInstance");
    }

    #[test]
    fn unrecognized_action_is_rejected() {
        let mut reg = Registry::new();
        let action = Action::parse("Bogus");
        let err = dispatch(&mut reg, &action, &Params::new(), "r").unwrap_err();
        assert_eq!(err.code, "InvalidParameterValue");
        assert_eq!(err.message, "Unrecognized Action");
    }
}
