//! A fake load-balancing service for tests.
//!
//! `FakeElb` answers the same query API as the real service: form parameters
//! in (GET query string or POST body), XML envelopes out. State lives in one
//! `Registry` behind a single mutex that is held for the whole of each
//! request, so every request sees and leaves a consistent registry.
//!
//! Tests drive the fake through the harness methods on `FakeElb` (known
//! instances, fault injection, request log) and reach it over HTTP either via
//! `router()` with `tower::ServiceExt::oneshot` or through a `LocalServer`.

pub mod handlers;
pub mod registry;
pub mod validate;

use std::{io, net::SocketAddr, sync::Arc, thread};

use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use elb_core::{codec, Action, Params, ServiceError};
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::registry::{LoadBalancer, Registry};

/// Handle to the fake service. Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct FakeElb {
    registry: Arc<Mutex<Registry>>,
}

impl FakeElb {
    pub fn new() -> Self {
        Self::default()
    }

    /// The HTTP surface: `GET /?<query>` and `POST /` with a form body.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(query_request).post(form_request))
            .with_state(self.clone())
    }

    /// Handle one request given its decoded form parameters.
    ///
    /// Returns the status and XML body. Injected failures win over everything
    /// else, including unknown actions.
    pub fn handle(&self, params: &Params) -> (StatusCode, String) {
        let action = Action::parse(params.get("Action").unwrap_or_default());
        let request_id = Uuid::new_v4().to_string();

        let mut registry = self.registry.lock();
        debug!(%action, %request_id, "handling request");
        let result = match registry.take_failure(&action) {
            Some(err) => Err(err),
            None => handlers::dispatch(&mut registry, &action, params, &request_id),
        };
        registry.record(action.clone());

        match result {
            Ok(body) => (StatusCode::OK, body),
            Err(err) => {
                warn!(%action, %request_id, code = %err.code, message = %err.message, "request failed");
                error_response(&err, &request_id)
            }
        }
    }

    // --- harness API ---

    /// Create a known instance and return its id.
    pub fn new_instance(&self) -> String {
        self.registry.lock().new_instance()
    }

    /// Forget a known instance.
    pub fn remove_instance(&self, id: &str) {
        self.registry.lock().remove_instance(id);
    }

    /// Create an empty load balancer called `name` without going through
    /// validation.
    pub fn new_load_balancer(&self, name: &str) {
        let mut params = Params::for_action(Action::CreateLoadBalancer);
        params.insert("LoadBalancerName", name);
        self.registry
            .lock()
            .insert_load_balancer(LoadBalancer::new(name, params, Utc::now()));
    }

    pub fn remove_load_balancer(&self, name: &str) {
        self.registry.lock().remove_load_balancer(name);
    }

    /// Instances attached to `name`, or `None` if there is no such load
    /// balancer.
    pub fn load_balancer_instances(&self, name: &str) -> Option<Vec<String>> {
        self.registry
            .lock()
            .load_balancer(name)
            .ok()
            .map(|lb| lb.instances.clone())
    }

    /// Names of all load balancers, sorted.
    pub fn load_balancer_names(&self) -> Vec<String> {
        self.registry
            .lock()
            .load_balancers()
            .map(|lb| lb.name.clone())
            .collect()
    }

    /// Make the next request for `action` fail with `err`, before any
    /// validation runs.
    pub fn fail_next(&self, action: Action, err: ServiceError) {
        self.registry.lock().fail_next(action, err);
    }

    /// Actions handled so far, oldest first.
    pub fn requests(&self) -> Vec<Action> {
        self.registry.lock().requests().to_vec()
    }
}

fn error_response(err: &ServiceError, request_id: &str) -> (StatusCode, String) {
    let status = StatusCode::from_u16(err.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match codec::encode_error(err, request_id) {
        Ok(body) => (status, body),
        Err(encode_err) => {
            error!(%encode_err, "failed to encode error response");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

fn xml_response((status, body): (StatusCode, String)) -> Response {
    (status, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

async fn query_request(
    State(elb): State<FakeElb>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    xml_response(elb.handle(&Params::from_pairs(pairs)))
}

async fn form_request(
    State(elb): State<FakeElb>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    xml_response(elb.handle(&Params::from_pairs(pairs)))
}

/// A fresh fake service's router.
pub fn app() -> Router {
    FakeElb::new().router()
}

/// Serve `elb` on `listener` until the task is dropped.
pub async fn run(listener: TcpListener, elb: FakeElb) -> Result<(), io::Error> {
    axum::serve(listener, elb.router()).await
}

/// A `FakeElb` served over real HTTP on a background thread.
///
/// Binds `127.0.0.1` on an ephemeral port. Dropping the server stops it and
/// waits for the thread to exit.
pub struct LocalServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl LocalServer {
    pub fn start(elb: FakeElb) -> Result<Self, io::Error> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (shutdown, stop) = oneshot::channel::<()>();

        let thread = thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(err) => {
                        error!(%err, "failed to register listener");
                        return;
                    }
                };
                let served = axum::serve(listener, elb.router())
                    .with_graceful_shutdown(async {
                        let _ = stop.await;
                    })
                    .await;
                if let Err(err) = served {
                    error!(%err, "fake server stopped");
                }
            });
        });
        debug!(%addr, "fake server started");

        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:53211/`.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_params(name: &str) -> Params {
        Params::from_pairs([
            ("Action", "CreateLoadBalancer"),
            ("LoadBalancerName", name),
            ("AvailabilityZones.member.1", "us-east-1a"),
            ("Listeners.member.1.InstancePort", "80"),
            ("Listeners.member.1.InstanceProtocol", "http"),
            ("Listeners.member.1.Protocol", "http"),
            ("Listeners.member.1.LoadBalancerPort", "80"),
        ])
    }

    #[test]
    fn handle_create_returns_success_envelope() {
        let elb = FakeElb::new();
        let (status, body) = elb.handle(&create_params("testlb"));
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<CreateLoadBalancerResponse"));
        assert!(body.contains("testlb-some-aws-stuff.us-east-1.elb.amazonaws.com"));
        assert_eq!(elb.load_balancer_names(), vec!["testlb"]);
    }

    #[test]
    fn missing_action_is_unrecognized() {
        let elb = FakeElb::new();
        let (status, body) = elb.handle(&Params::new());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("<Code>InvalidParameterValue</Code>"));
        assert!(body.contains("<Message>Unrecognized Action</Message>"));
    }

    #[test]
    fn injected_failure_precedes_validation_and_is_consumed() {
        let elb = FakeElb::new();
        elb.fail_next(
            Action::CreateLoadBalancer,
            ServiceError::new(503, "ServiceUnavailable", "try later"),
        );
        let (status, body) = elb.handle(&create_params("testlb"));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("<Type>Receiver</Type>"));
        assert!(elb.load_balancer_names().is_empty());

        let (status, _) = elb.handle(&create_params("testlb"));
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn requests_are_logged_in_order() {
        let elb = FakeElb::new();
        elb.handle(&create_params("testlb"));
        elb.handle(&Params::from_pairs([("Action", "DeleteLoadBalancer")]));
        elb.handle(&Params::from_pairs([("Action", "Bogus")]));
        assert_eq!(
            elb.requests(),
            vec![
                Action::CreateLoadBalancer,
                Action::DeleteLoadBalancer,
                Action::Unrecognized("Bogus".to_string()),
            ]
        );
    }

    #[test]
    fn harness_load_balancers_and_instances() {
        let elb = FakeElb::new();
        elb.new_load_balancer("harness");
        assert_eq!(elb.load_balancer_instances("harness"), Some(Vec::new()));
        assert_eq!(elb.load_balancer_instances("ghost"), None);

        let id = elb.new_instance();
        let mut params = Params::from_pairs([
            ("Action", "RegisterInstancesWithLoadBalancer"),
            ("LoadBalancerName", "harness"),
        ]);
        params.push_instance_ids(&[id.as_str()]);
        let (status, _) = elb.handle(&params);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(elb.load_balancer_instances("harness"), Some(vec![id]));

        elb.remove_load_balancer("harness");
        assert!(elb.load_balancer_names().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let elb = FakeElb::new();
        let other = elb.clone();
        other.new_load_balancer("shared");
        assert_eq!(elb.load_balancer_names(), vec!["shared"]);
    }
}
