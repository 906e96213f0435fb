//! `hostConnectivityCheck`: probe a TCP endpoint when the owning object
//! asks for it.

use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use super::{DataCtx, KeywordOutcome};
use crate::platform::{ConnectivityOptions, ValidationContext};
use crate::pointer::{self, ResolveOptions};

const ENABLE_KEY: &str = "enableHostConnectivityCheck";

pub(super) fn validate(
    data: &DataCtx<'_>,
    ctx: &ValidationContext,
) -> Result<KeywordOutcome, String> {
    let host = data.data.as_str().unwrap_or_default().to_string();

    // Hosts listed in an array take their settings from the object owning
    // the array.
    let owner = match data.parent {
        Some(Value::Array(_)) => {
            let ns = data.namespace();
            pointer::resolve(
                &ns.scoped,
                "@/",
                &ns.data_path,
                ResolveOptions {
                    stringify: false,
                    base64_decode: false,
                },
            )
            .ok()
        }
        Some(parent) => Some(parent.clone()),
        None => None,
    };
    let Some(owner) = owner else {
        return Ok(KeywordOutcome::Valid);
    };

    if owner.get(ENABLE_KEY).and_then(Value::as_bool) != Some(true) {
        return Ok(KeywordOutcome::Valid);
    }
    let Some(port) = owner
        .get("port")
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
    else {
        return Ok(KeywordOutcome::Valid);
    };

    let opts = ctx.connectivity;
    Ok(KeywordOutcome::Deferred(Box::new(move || {
        probe(host, port, opts).boxed()
    })))
}

/// Try to open a TCP connection to `host:port`, retrying every
/// `poll_interval` until `timeout` has elapsed.
pub async fn probe(
    host: String,
    port: u16,
    opts: ConnectivityOptions,
) -> Result<Option<Value>, String> {
    let deadline = Instant::now() + opts.timeout;
    let mut last_error = String::from("timed out");

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match time::timeout(remaining, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => {
                debug!(%host, port, "host reachable");
                return Ok(None);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = "timed out".into(),
        }
        let pause = opts
            .poll_interval
            .min(deadline.saturating_duration_since(Instant::now()));
        if pause == Duration::ZERO {
            break;
        }
        time::sleep(pause).await;
    }

    warn!(%host, port, error = %last_error, "host connectivity check failed");
    Err(format!("{host}:{port} is not reachable: {last_error}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::keywords::test_support::{context, run, run_deferred, MockPlatform};
    use crate::keywords::Keyword;
    use crate::platform::DeviceType;

    fn ctx() -> ValidationContext {
        let mut ctx = context(MockPlatform::new(DeviceType::BigIp));
        ctx.connectivity = ConnectivityOptions {
            timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(50),
        };
        ctx
    }

    #[tokio::test]
    async fn reachable_host_passes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let root = json!({"C": {
            "class": "Telemetry_Consumer",
            "host": "127.0.0.1",
            "port": port,
            "enableHostConnectivityCheck": true
        }});
        let outcome = run(Keyword::HostConnectivityCheck, &json!(true), &root, "/C/host", &ctx()).unwrap();
        assert_eq!(run_deferred(outcome).await, Ok(None));
    }

    #[tokio::test]
    async fn unreachable_host_fails_after_timeout() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = probe("127.0.0.1".into(), port, ctx().connectivity).await.unwrap_err();
        assert!(err.contains(&format!("127.0.0.1:{port} is not reachable")));
    }

    #[test]
    fn check_disabled_on_owner() {
        let root = json!({"C": {"host": "192.0.2.1", "port": 80}});
        let out = run(Keyword::HostConnectivityCheck, &json!(true), &root, "/C/host", &ctx()).unwrap();
        assert!(matches!(out, KeywordOutcome::Valid));
    }

    #[test]
    fn array_hosts_use_owning_object() {
        let root = json!({"C": {
            "class": "Telemetry_Consumer",
            "port": 80,
            "enableHostConnectivityCheck": true,
            "fallbackHosts": ["192.0.2.1"]
        }});
        let out = run(
            Keyword::HostConnectivityCheck,
            &json!(true),
            &root,
            "/C/fallbackHosts/0",
            &ctx(),
        )
        .unwrap();
        assert!(matches!(out, KeywordOutcome::Deferred(_)));
    }
}
