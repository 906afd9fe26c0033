//! Signed request builder, transport call, and response parser.
//!
//! # Design
//! Every action is split into `build_request` (encode, stamp, sign, produce an
//! `HttpRequest`) and `parse_response` (turn an `HttpResponse` into a typed
//! result or a `ServiceError`). Both are pure, so they can be tested without a
//! network. The typed action methods run build → `Transport::send` → parse
//! exactly once; there are no retries.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::codec::{self, XmlResponse};
use crate::config::{ClientConfig, Credentials, Endpoint};
use crate::error::{ConfigError, ElbError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::params::ToParams;
use crate::signer::RequestSigner;
use crate::types::{
    CreateLoadBalancer, CreateLoadBalancerResp, DeleteLoadBalancer, DeregisterInstances,
    DeregisterInstancesResp, DescribeInstanceHealth, DescribeInstanceHealthResp,
    DescribeLoadBalancers, DescribeLoadBalancersResp, RegisterInstances, RegisterInstancesResp,
    SimpleResp,
};

/// Client for the load-balancing query API.
///
/// Holds only immutable credentials, the endpoint and a transport.
#[derive(Debug, Clone)]
pub struct ElbClient<T = UreqTransport> {
    credentials: Credentials,
    endpoint: Endpoint,
    transport: T,
}

impl ElbClient<UreqTransport> {
    pub fn new(credentials: Credentials, endpoint: Endpoint) -> Self {
        Self::with_transport(credentials, endpoint, UreqTransport::new())
    }

    /// A client configured from the environment; see `ClientConfig::from_env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ClientConfig::from_env()?;
        Ok(Self::new(config.credentials, config.endpoint))
    }
}

impl<T: Transport> ElbClient<T> {
    pub fn with_transport(credentials: Credentials, endpoint: Endpoint, transport: T) -> Self {
        Self {
            credentials,
            endpoint,
            transport,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Encode `request`, stamp it with `timestamp`, sign it, and produce the
    /// GET request carrying it as the query string.
    pub fn build_request(
        &self,
        request: &impl ToParams,
        timestamp: DateTime<Utc>,
    ) -> Result<HttpRequest, ElbError> {
        let method = HttpMethod::Get;
        let mut params = request.to_params();
        RequestSigner::new(&self.credentials).sign(
            &method,
            self.endpoint.host(),
            self.endpoint.path(),
            &mut params,
            timestamp,
        )?;
        Ok(HttpRequest {
            method,
            url: self.endpoint.url_with_query(&params.to_query()),
            headers: Vec::new(),
            body: None,
        })
    }

    /// Decode a 200 response into `R`; anything else becomes a service error.
    pub fn parse_response<R: XmlResponse>(&self, response: HttpResponse) -> Result<R, ElbError> {
        if response.status != 200 {
            return Err(codec::decode_error(&response).into());
        }
        Ok(codec::decode(&response.body)?)
    }

    fn call<R: XmlResponse>(&self, request: &impl ToParams) -> Result<R, ElbError> {
        let action = request.action();
        let http_request = self.build_request(request, Utc::now())?;
        debug!(%action, host = self.endpoint.host(), "sending request");
        let response = self.transport.send(&http_request)?;
        debug!(%action, status = response.status, "received response");
        self.parse_response(response)
    }

    pub fn create_load_balancer(
        &self,
        options: &CreateLoadBalancer,
    ) -> Result<CreateLoadBalancerResp, ElbError> {
        self.call(options)
    }

    pub fn delete_load_balancer(&self, name: &str) -> Result<SimpleResp, ElbError> {
        self.call(&DeleteLoadBalancer {
            name: name.to_string(),
        })
    }

    pub fn register_instances_with_load_balancer(
        &self,
        instance_ids: &[&str],
        load_balancer_name: &str,
    ) -> Result<RegisterInstancesResp, ElbError> {
        self.call(&RegisterInstances {
            load_balancer_name: load_balancer_name.to_string(),
            instance_ids: to_strings(instance_ids),
        })
    }

    pub fn deregister_instances_from_load_balancer(
        &self,
        instance_ids: &[&str],
        load_balancer_name: &str,
    ) -> Result<DeregisterInstancesResp, ElbError> {
        self.call(&DeregisterInstances {
            load_balancer_name: load_balancer_name.to_string(),
            instance_ids: to_strings(instance_ids),
        })
    }

    /// Describe the named load balancers, or every one if `names` is empty.
    pub fn describe_load_balancers(
        &self,
        names: &[&str],
    ) -> Result<DescribeLoadBalancersResp, ElbError> {
        self.call(&DescribeLoadBalancers {
            names: to_strings(names),
        })
    }

    pub fn describe_instance_health(
        &self,
        load_balancer_name: &str,
        instance_ids: &[&str],
    ) -> Result<DescribeInstanceHealthResp, ElbError> {
        self.call(&DescribeInstanceHealth {
            load_balancer_name: load_balancer_name.to_string(),
            instance_ids: to_strings(instance_ids),
        })
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::TimeZone;

    use super::*;
    use crate::error::TransportError;
    use crate::params::Params;
    use crate::types::Listener;

    /// Replays one canned response and records the request it was sent.
    struct CannedTransport {
        response: Result<HttpResponse, String>,
        sent: RefCell<Vec<HttpRequest>>,
    }

    impl CannedTransport {
        fn ok(status: u16, body: &str) -> Self {
            Self {
                response: Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.to_string(),
                }),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn last_query(&self) -> Params {
            let sent = self.sent.borrow();
            let url = url::Url::parse(&sent.last().unwrap().url).unwrap();
            Params::from_pairs(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())))
        }
    }

    impl Transport for CannedTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent.borrow_mut().push(request.clone());
            match &self.response {
                Ok(resp) => Ok(resp.clone()),
                Err(message) => Err(TransportError::new(message.clone())),
            }
        }
    }

    fn client<T: Transport>(transport: T) -> ElbClient<T> {
        ElbClient::with_transport(
            Credentials::new("abc", "123"),
            Endpoint::parse("http://localhost:3000").unwrap(),
            transport,
        )
    }

    fn testlb() -> CreateLoadBalancer {
        CreateLoadBalancer {
            name: "testlb".to_string(),
            availability_zones: vec!["us-east-1a".to_string(), "us-east-1b".to_string()],
            listeners: vec![Listener {
                instance_port: 80,
                instance_protocol: "http".to_string(),
                load_balancer_port: 80,
                protocol: "http".to_string(),
                ssl_certificate_id: None,
            }],
            ..Default::default()
        }
    }

    const CREATE_OK: &str = "<CreateLoadBalancerResponse><CreateLoadBalancerResult><DNSName>testlb-339187009.us-east-1.elb.amazonaws.com</DNSName></CreateLoadBalancerResult><ResponseMetadata><RequestId>r1</RequestId></ResponseMetadata></CreateLoadBalancerResponse>";

    #[test]
    fn build_request_is_a_signed_get() {
        let c = client(CannedTransport::ok(200, ""));
        let ts = Utc.with_ymd_and_hms(2012, 12, 27, 11, 51, 52).unwrap();
        let req = c.build_request(&testlb(), ts).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.url.starts_with("http://localhost:3000/?"));
        assert!(req.body.is_none());
        assert!(req.url.contains("AvailabilityZones.member.1=us-east-1a"));
        assert!(req.url.contains("Timestamp=2012-12-27T11%3A51%3A52Z"));
        assert!(req.url.contains("Signature="));
    }

    #[test]
    fn build_request_is_deterministic_for_a_fixed_timestamp() {
        let c = client(CannedTransport::ok(200, ""));
        let ts = Utc.with_ymd_and_hms(2012, 12, 27, 11, 51, 52).unwrap();
        let a = c.build_request(&testlb(), ts).unwrap();
        let b = c.build_request(&testlb(), ts).unwrap();
        assert_eq!(a.url, b.url);
    }

    #[test]
    fn create_sends_expected_params_and_decodes() {
        let transport = CannedTransport::ok(200, CREATE_OK);
        let resp = client(&transport).create_load_balancer(&testlb()).unwrap();
        assert_eq!(resp.dns_name, "testlb-339187009.us-east-1.elb.amazonaws.com");

        let values = transport.last_query();
        assert_eq!(values.get("Version"), Some("2012-06-01"));
        assert_eq!(values.get("Action"), Some("CreateLoadBalancer"));
        assert!(values.get("Timestamp").is_some());
        assert_eq!(values.get("LoadBalancerName"), Some("testlb"));
        assert_eq!(values.get("AvailabilityZones.member.2"), Some("us-east-1b"));
        assert_eq!(values.get("Listeners.member.1.LoadBalancerPort"), Some("80"));
        assert!(values.get("Signature").is_some());
    }

    #[test]
    fn register_sends_indexed_instance_ids() {
        let body = "<RegisterInstancesWithLoadBalancerResponse><RegisterInstancesWithLoadBalancerResult><Instances><member><InstanceId>i-b44db8ca</InstanceId></member></Instances></RegisterInstancesWithLoadBalancerResult><ResponseMetadata><RequestId>r</RequestId></ResponseMetadata></RegisterInstancesWithLoadBalancerResponse>";
        let transport = CannedTransport::ok(200, body);
        let resp = client(&transport)
            .register_instances_with_load_balancer(&["i-b44db8ca", "i-461ecf38"], "testlb")
            .unwrap();
        assert_eq!(resp.instance_ids, vec!["i-b44db8ca"]);
        let values = transport.last_query();
        assert_eq!(values.get("Action"), Some("RegisterInstancesWithLoadBalancer"));
        assert_eq!(values.get("Instances.member.1.InstanceId"), Some("i-b44db8ca"));
        assert_eq!(values.get("Instances.member.2.InstanceId"), Some("i-461ecf38"));
    }

    #[test]
    fn non_200_returns_service_error_only() {
        let body = "<ErrorResponse><Error><Type>Sender</Type><Code>LoadBalancerNotFound</Code><Message>There is no ACTIVE Load Balancer named 'absentLB'</Message></Error><RequestId>x</RequestId></ErrorResponse>";
        let transport = CannedTransport::ok(400, body);
        let err = client(&transport)
            .register_instances_with_load_balancer(&["i-1"], "absentLB")
            .unwrap_err();
        let service = err.as_service().unwrap();
        assert_eq!(service.status_code, 400);
        assert_eq!(service.code, "LoadBalancerNotFound");
        assert_eq!(
            err.to_string(),
            "There is no ACTIVE Load Balancer named 'absentLB' (LoadBalancerNotFound)"
        );
    }

    #[test]
    fn malformed_success_body_is_a_decode_error() {
        let transport = CannedTransport::ok(200, "<CreateLoadBalancerResponse>");
        let err = client(&transport).create_load_balancer(&testlb()).unwrap_err();
        assert!(matches!(err, ElbError::Decode(_)));
    }

    #[test]
    fn transport_failure_is_surfaced_unchanged() {
        let transport = CannedTransport::failing("connection refused");
        let err = client(&transport).delete_load_balancer("testlb").unwrap_err();
        match err {
            ElbError::Transport(inner) => assert_eq!(inner.to_string(), "connection refused"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn describe_without_names_sends_no_members() {
        let body = "<DescribeLoadBalancersResponse><DescribeLoadBalancersResult><LoadBalancerDescriptions/></DescribeLoadBalancersResult><ResponseMetadata><RequestId>r</RequestId></ResponseMetadata></DescribeLoadBalancersResponse>";
        let transport = CannedTransport::ok(200, body);
        let resp = client(&transport).describe_load_balancers(&[]).unwrap();
        assert!(resp.load_balancer_descriptions.is_empty());
        assert!(!transport.last_query().contains("LoadBalancerNames.member.1"));
    }
}
