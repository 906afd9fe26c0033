//! Wire names of the supported load-balancer actions.

use std::fmt;

/// An action, as carried in the `Action` request parameter.
///
/// Names the server does not know parse to `Unrecognized`, so dispatch is an
/// exhaustive match rather than a table lookup that can miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    CreateLoadBalancer,
    DeleteLoadBalancer,
    RegisterInstancesWithLoadBalancer,
    DeregisterInstancesFromLoadBalancer,
    DescribeLoadBalancers,
    DescribeInstanceHealth,
    Unrecognized(String),
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::CreateLoadBalancer,
        Action::DeleteLoadBalancer,
        Action::RegisterInstancesWithLoadBalancer,
        Action::DeregisterInstancesFromLoadBalancer,
        Action::DescribeLoadBalancers,
        Action::DescribeInstanceHealth,
    ];

    pub fn parse(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .unwrap_or_else(|| Action::Unrecognized(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::CreateLoadBalancer => "CreateLoadBalancer",
            Action::DeleteLoadBalancer => "DeleteLoadBalancer",
            Action::RegisterInstancesWithLoadBalancer => "RegisterInstancesWithLoadBalancer",
            Action::DeregisterInstancesFromLoadBalancer => "DeregisterInstancesFromLoadBalancer",
            Action::DescribeLoadBalancers => "DescribeLoadBalancers",
            Action::DescribeInstanceHealth => "DescribeInstanceHealth",
            Action::Unrecognized(name) => name,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
