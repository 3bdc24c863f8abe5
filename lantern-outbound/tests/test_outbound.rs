use lantern_core::test::with_captured_transactions;
use lantern_core::Namespace;
use lantern_outbound::{
    install_hook, instrumentor_for, CallData, Hook, OutboundHook, OutboundInstrumentor,
};

#[test]
fn test_instruments_request() {
    let transactions = with_captured_transactions(|| {
        let transaction = lantern_core::start_transaction(Namespace::HttpRequest);
        let result = OutboundInstrumentor::new("excon").instrument(
            "excon.request",
            &CallData::new("www.google.com").method("get").scheme("http"),
            || "done",
        );
        assert_eq!(result, "done");
        transaction.complete();
    });

    assert_eq!(transactions.len(), 1);
    let events = &transactions[0].events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "request.excon");
    assert_eq!(events[0].title, "GET http://www.google.com");
    assert_eq!(events[0].body, "");
    assert!(!events[0].is_open());
}

#[test]
fn test_instruments_response() {
    let transactions = with_captured_transactions(|| {
        let transaction = lantern_core::start_transaction(Namespace::HttpRequest);
        OutboundInstrumentor::new("excon").instrument(
            "excon.response",
            &CallData::new("www.google.com"),
            || (),
        );
        transaction.complete();
    });

    let events = &transactions[0].events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "response.excon");
    assert_eq!(events[0].title, "www.google.com");
    assert_eq!(events[0].body, "");
}

#[test]
fn test_other_names_pass_through() {
    let transactions = with_captured_transactions(|| {
        let transaction = lantern_core::start_transaction(Namespace::HttpRequest);
        let value = OutboundInstrumentor::new("excon").instrument(
            "excon.retry",
            &CallData::new("www.google.com"),
            || 42,
        );
        assert_eq!(value, 42);
        transaction.complete();
    });

    assert!(transactions[0].events.is_empty());
}

#[test]
fn test_without_transaction() {
    let transactions = with_captured_transactions(|| {
        let value = OutboundInstrumentor::new("excon").instrument(
            "excon.request",
            &CallData::new("www.google.com").method("get"),
            || 7,
        );
        assert_eq!(value, 7);
    });

    assert!(transactions.is_empty());
}

#[test]
fn test_hook_installs_client_default() {
    let hook = OutboundHook::new("present-client", || true);
    assert!(hook.dependencies_present());
    assert!(install_hook(&hook));
    assert!(!install_hook(&hook));

    let instrumentor = instrumentor_for("present-client").unwrap();
    assert_eq!(instrumentor.client(), "present-client");
}

#[test]
fn test_absent_dependency_is_noop() {
    let hook = OutboundHook::new("absent-client", || false);
    assert!(!hook.dependencies_present());
    assert!(!install_hook(&hook));
    assert!(instrumentor_for("absent-client").is_none());

    let transactions = with_captured_transactions(|| {
        let transaction = lantern_core::start_transaction(Namespace::HttpRequest);
        let value = instrumentor_for("absent-client")
            .map(|instrumentor| {
                instrumentor.instrument("absent-client.request", &CallData::new("host"), || 1)
            })
            .unwrap_or(1);
        assert_eq!(value, 1);
        transaction.complete();
    });

    assert!(transactions[0].events.is_empty());
}
