//! Integration tests for HTTP transport

use std::net::SocketAddr;
use std::time::Duration;

use assert_matches::assert_matches;
use axum::{Json, Router, routing::post};
use hrpc_client::{
    ClientBuilder, Error, Invocation, Outcome, RemoteErrors, Request, Response, RpcClient,
    TransportError,
};
use hrpc_transport_http::{HttpOptions, HttpTransport};
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use url::Url;

async fn handle(Json(request): Json<Request>) -> Json<Response> {
    let id = request.id.clone();
    let response = match request.method.steps() {
        [Invocation::GetAttr(method), Invocation::Call(args)] if method == "add" => {
            Response::value(id, json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
        }
        [Invocation::GetAttr(method), Invocation::Call(_)] if method == "session" => {
            Response::value(id, json!(request.session_id))
        }
        [Invocation::GetAttr(method), Invocation::Call(_)] if method == "child" => {
            Response::reference(id, "obj://99", json!("<child>"))
        }
        _ => Response::failure(
            id,
            RemoteErrors {
                error_type: "AttributeError".to_string(),
                message: request.method.to_string(),
                tb: String::new(),
                stack: json!([]),
            },
        ),
    };
    Json(response)
}

/// Serve `app` on an ephemeral port from a runtime owned by the test.
fn serve(app: Router) -> (Runtime, Url) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let runtime = Runtime::new().unwrap();

    let listener = runtime
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    runtime.spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (runtime, Url::parse(&format!("http://{addr}/rpc")).unwrap())
}

fn unused_endpoint() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/rpc")).unwrap()
}

fn client(options: HttpOptions) -> RpcClient<HttpTransport> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(10))
        .try_build(|sink| HttpTransport::new(options, sink))
        .unwrap()
}

#[test]
fn test_round_trip() {
    let (_server, endpoint) = serve(Router::new().route("/rpc", post(handle)));
    let client = client(HttpOptions::new(endpoint));

    let calc = client.remote("obj://42");
    let sum = client
        .evaluate(&calc.call("add", [json!(1), json!(2)]))
        .unwrap();

    assert_eq!(sum, Outcome::Value(json!(3)));
}

#[test]
fn test_session_id_is_sent() {
    let (_server, endpoint) = serve(Router::new().route("/rpc", post(handle)));
    let client = client(HttpOptions::new(endpoint));

    let session = client
        .evaluate(&client.remote("obj://42").call("session", []))
        .unwrap();

    assert_eq!(session, Outcome::Value(json!(client.session_id())));
}

#[test]
fn test_intermediate_and_remote_error() {
    let (server, endpoint) = serve(Router::new().route("/rpc", post(handle)));
    let mut options = HttpOptions::new(endpoint);
    options.runtime = Some(server.handle().clone());
    let client = client(options);

    let child = client
        .evaluate(&client.remote("obj://42").call("child", []))
        .unwrap()
        .into_proxy()
        .unwrap();
    assert_eq!(child.uri(), "obj://99");

    let result = client.evaluate(&child.call("missing", []));
    assert_matches!(
        result,
        Err(Error::Remote(err)) if err.error_type == "AttributeError" && err.message == ".missing()"
    );
}

#[test]
fn test_connection_refused_is_transport_error() {
    let client = client(HttpOptions::new(unused_endpoint()));

    let result = client.evaluate(&client.remote("obj://42").call("add", []));

    assert_matches!(
        result,
        Err(Error::Transport(TransportError::ConnectionFailed(_)))
    );
    assert_eq!(client.pending_requests(), 0);
}

#[test]
fn test_non_envelope_body_is_codec_error() {
    let app = Router::new().route("/rpc", post(|| async { "not json" }));
    let (_server, endpoint) = serve(app);
    let client = client(HttpOptions::new(endpoint));

    let result = client.evaluate(&client.remote("obj://42").attr("x"));

    assert_matches!(result, Err(Error::Transport(TransportError::Codec(_))));
}

#[test]
fn test_ping() {
    let (_server, endpoint) = serve(Router::new().route("/rpc", post(handle)));
    let client = client(HttpOptions::new(endpoint));
    assert!(client.transport().ping());

    let client = self::client(HttpOptions::new(unused_endpoint()));
    assert!(!client.transport().ping());
}
