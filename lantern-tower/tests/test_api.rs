#![cfg(feature = "http")]

mod common;

use http::{Request, Response};
use lantern_core::test::with_captured_transactions;
use lantern_core::TransactionData;
use lantern_tower::{ApiEndpoint, ApiLayer, ErrorReportingFlag, API_REQUEST_EVENT};
use tower::{Layer, ServiceExt};

use common::{block_on, ExampleError, TestBody};

async fn hello(_request: Request<()>) -> Result<Response<TestBody>, ExampleError> {
    Ok(Response::new(TestBody::new(&["Hello!"])))
}

fn call(endpoint: ApiEndpoint, method: &str, uri: &str) -> TransactionData {
    let transactions = with_captured_transactions(|| {
        let service = ApiLayer::new(endpoint).layer(tower::service_fn(hello));
        let request = Request::builder().method(method).uri(uri).body(()).unwrap();
        block_on(service.oneshot(request)).unwrap();
    });
    assert_eq!(transactions.len(), 1);
    transactions.into_iter().next().unwrap()
}

#[test]
fn test_route() {
    let transaction = call(
        ApiEndpoint::new("GrapeExample::Api").path("hello"),
        "GET",
        "/hello",
    );
    assert_eq!(
        transaction.action.as_deref(),
        Some("GET::GrapeExample::Api#/hello")
    );
    assert_eq!(transaction.metadata["path"], "/hello");
    assert_eq!(transaction.metadata["method"], "GET");
    assert_eq!(transaction.events_named(API_REQUEST_EVENT).count(), 1);
}

#[test]
fn test_route_param() {
    let endpoint = ApiEndpoint::new("GrapeExample::Api")
        .namespace("users")
        .namespace(":id");
    let transaction = call(endpoint, "GET", "/users/1");
    assert_eq!(
        transaction.action.as_deref(),
        Some("GET::GrapeExample::Api#/users/:id/")
    );
    assert_eq!(transaction.metadata["path"], "/users/:id/");
    // the request path stays available
    assert_eq!(transaction.metadata["request_path"], "/users/1");
}

#[test]
fn test_namespaced_paths() {
    let symbols = ApiEndpoint::new("GrapeExample::Api")
        .namespace("v1")
        .namespace("beta")
        .path("ping");
    let prefixed = ApiEndpoint::new("GrapeExample::Api")
        .namespace("/v1")
        .namespace("/beta")
        .path("/ping");
    for endpoint in [symbols, prefixed] {
        let transaction = call(endpoint, "POST", "/v1/beta/ping");
        assert_eq!(
            transaction.action.as_deref(),
            Some("POST::GrapeExample::Api#/v1/beta/ping")
        );
        assert_eq!(transaction.metadata["path"], "/v1/beta/ping");
        assert_eq!(transaction.metadata["method"], "POST");
    }
}

#[test]
fn test_error_is_recorded() {
    let transactions = with_captured_transactions(|| {
        let endpoint = ApiEndpoint::new("GrapeExample::Api").path("ping");
        let service = ApiLayer::new(endpoint).layer(tower::service_fn(
            |_req: Request<()>| async { Err::<Response<TestBody>, _>(ExampleError) },
        ));
        let request = Request::post("/ping").body(()).unwrap();
        assert!(block_on(service.oneshot(request)).is_err());
    });

    let transaction = &transactions[0];
    let error = transaction.error.as_ref().unwrap();
    assert_eq!(error.class, "ExampleError");
    assert_eq!(error.message, "error message");
    assert_eq!(
        transaction.action.as_deref(),
        Some("POST::GrapeExample::Api#/ping")
    );
}

#[test]
fn test_error_reporting_opt_out() {
    let transactions = with_captured_transactions(|| {
        let endpoint = ApiEndpoint::new("GrapeExample::Api").path("ping");
        let service = ApiLayer::new(endpoint).layer(tower::service_fn(
            |req: Request<()>| async move {
                if let Some(flag) = req.extensions().get::<ErrorReportingFlag>() {
                    flag.disable();
                }
                Err::<Response<TestBody>, _>(ExampleError)
            },
        ));
        let request = Request::post("/ping").body(()).unwrap();
        assert!(block_on(service.oneshot(request)).is_err());
    });

    assert_eq!(transactions.len(), 1);
    assert!(transactions[0].error.is_none());
}
