use std::{env, io};

use elb_mock_server::FakeElb;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let instances: usize = match env::var("ELB_FAKE_INSTANCES") {
        Ok(value) => value.parse().map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("ELB_FAKE_INSTANCES={value:?}: {err}"),
            )
        })?,
        Err(_) => 0,
    };

    let elb = FakeElb::new();
    for _ in 0..instances {
        let id = elb.new_instance();
        info!(instance = %id, "instance created");
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    elb_mock_server::run(listener, elb).await
}
