//! Client core for the Elastic Load Balancing query API.
//!
//! # Overview
//! Builds signed, parameter-encoded GET requests and decodes the XML
//! responses. The same codec is used in reverse by the fake server in the
//! `elb-mock-server` crate, so both sides agree on every envelope shape.
//!
//! # Design
//! - `params` flattens typed requests into member-indexed parameters.
//! - `signer` stamps `Version`/`Timestamp` and adds the signature.
//! - `codec` reads and writes the XML envelopes.
//! - `ElbClient` composes the three around a `Transport`, one attempt per call.

pub mod action;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod params;
pub mod signer;
pub mod types;

pub use action::Action;
pub use client::ElbClient;
pub use codec::{EncodeError, XmlResponse};
pub use config::{ClientConfig, Credentials, Endpoint};
pub use error::{ConfigError, DecodeError, ElbError, ServiceError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use params::{Params, ToParams};
pub use signer::{RequestSigner, API_VERSION};
pub use types::{
    CreateLoadBalancer, CreateLoadBalancerResp, DeleteLoadBalancer, DeregisterInstances,
    DeregisterInstancesResp, DescribeInstanceHealth, DescribeInstanceHealthResp,
    DescribeLoadBalancers, DescribeLoadBalancersResp, HealthCheck, Instance, InstanceState,
    Listener, ListenerDescription, LoadBalancerDescription, RegisterInstances,
    RegisterInstancesResp, SimpleResp, SourceSecurityGroup,
};
