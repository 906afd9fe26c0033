//! Request validation: required fields, mutually exclusive field pairs and
//! listener ports.

use elb_core::params::field_key;
use elb_core::{Params, ServiceError};

/// Every field in `fields` must be present and non-empty.
///
/// Fails on the first missing field, in the order given.
pub fn required(params: &Params, fields: &[&str]) -> Result<(), ServiceError> {
    match fields.iter().find(|field| !params.contains(field)) {
        Some(field) => Err(ServiceError::validation(format!("{field} is required."))),
        None => Ok(()),
    }
}

/// Exactly one of `a` and `b` must be present.
pub fn exactly_one(params: &Params, a: &str, b: &str) -> Result<(), ServiceError> {
    match (params.contains(a), params.contains(b)) {
        (true, true) => Err(ServiceError::validation(format!(
            "Only one of {a} or {b} may be specified"
        ))),
        (false, false) => Err(ServiceError::validation(format!(
            "Either {a} or {b} must be specified"
        ))),
        _ => Ok(()),
    }
}

/// Every listener port that is present must be a number in `0..=65535`.
///
/// Listeners are read up to the first index without a `Protocol`.
pub fn listener_ports(params: &Params) -> Result<(), ServiceError> {
    for n in (1..).take_while(|&n| params.contains(&field_key("Listeners", n, "Protocol"))) {
        for field in ["InstancePort", "LoadBalancerPort"] {
            let key = field_key("Listeners", n, field);
            if let Some(value) = params.get(&key) {
                if value.parse::<u16>().is_err() {
                    return Err(ServiceError::validation(format!(
                        "Invalid value {value} for {key}"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: &str = "AvailabilityZones.member.1";
    const SUBNETS: &str = "Subnets.member.1";

    #[test]
    fn required_reports_first_missing_field() {
        let params = Params::from_pairs([("LoadBalancerName", "testlb")]);
        assert!(required(&params, &["LoadBalancerName"]).is_ok());
        let err = required(&params, &["LoadBalancerName", "A", "B"]).unwrap_err();
        assert_eq!(err.code, "ValidationError");
        assert_eq!(err.status_code, 400);
        assert_eq!(err.message, "A is required.");
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let params = Params::from_pairs([("LoadBalancerName", "")]);
        let err = required(&params, &["LoadBalancerName"]).unwrap_err();
        assert_eq!(err.message, "LoadBalancerName is required.");
    }

    #[test]
    fn both_sides_present_is_rejected() {
        let params = Params::from_pairs([(ZONES, "us-east-1a"), (SUBNETS, "subnet-1")]);
        let err = exactly_one(&params, ZONES, SUBNETS).unwrap_err();
        assert_eq!(err.code, "ValidationError");
        assert_eq!(
            err.message,
            "Only one of AvailabilityZones.member.1 or Subnets.member.1 may be specified"
        );
    }

    #[test]
    fn neither_side_present_is_rejected() {
        let err = exactly_one(&Params::new(), ZONES, SUBNETS).unwrap_err();
        assert_eq!(
            err.message,
            "Either AvailabilityZones.member.1 or Subnets.member.1 must be specified"
        );
    }

    #[test]
    fn listener_ports_must_fit_a_port_number() {
        let mut params = Params::from_pairs([
            ("Listeners.member.1.Protocol", "http"),
            ("Listeners.member.1.InstancePort", "80"),
            ("Listeners.member.1.LoadBalancerPort", "8080"),
            ("Listeners.member.2.Protocol", "tcp"),
            ("Listeners.member.2.InstancePort", "http"),
        ]);
        let err = listener_ports(&params).unwrap_err();
        assert_eq!(err.code, "ValidationError");
        assert_eq!(err.message, "Invalid value http for Listeners.member.2.InstancePort");

        params.insert("Listeners.member.2.InstancePort", "65535");
        assert!(listener_ports(&params).is_ok());
        params.insert("Listeners.member.1.LoadBalancerPort", "65536");
        assert!(listener_ports(&params).is_err());
    }

    #[test]
    fn one_side_present_is_accepted() {
        let params = Params::from_pairs([(SUBNETS, "subnet-1")]);
        assert!(exactly_one(&params, ZONES, SUBNETS).is_ok());
    }
}
