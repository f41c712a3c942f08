use super::bridge::await_result;
use super::engine::route_notification;
use super::{
    Acknowledgement, ContentVerifier, DenialMessage, DispatchConfig, NotificationMessage,
    PayloadShape, Resolution, Route, SubscriberService, TopicIdentifier, VerificationMessage,
    WebhookListener, resolve,
};
use crate::transport::content::{APPLICATION_JSON, TEXT_PLAIN};
use crate::transport::message::{
    CONTENT_TYPE, HUB_CHALLENGE, HUB_LEASE_SECONDS, HUB_MODE, HUB_REASON, HUB_TOPIC,
};
use crate::transport::{Content, Headers, Method, WebhookRequest};
use crate::utils::error::{
    ConfigurationError, DeliveryError, DispatchError, HandlerError, WebSubError,
};

use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;

const PATH: &str = "/callback";

fn orders_config() -> DispatchConfig {
    DispatchConfig::by_header_and_payload_key("x-topic")
        .map_header("orders", "onOrderEvent")
        .map_payload("type", "created", "onOrderCreated")
}

fn orders_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("X-Topic", "orders");
    headers
}

fn challenge(mode: &str, topic: &str, challenge: &str) -> WebhookRequest {
    WebhookRequest::get(PATH)
        .with_query(HUB_MODE, mode)
        .with_query(HUB_TOPIC, topic)
        .with_query(HUB_CHALLENGE, challenge)
}

fn json_post(body: Value) -> WebhookRequest {
    WebhookRequest::post(PATH).with_content(&Content::json(body))
}

fn listener_for(service: SubscriberService) -> WebhookListener {
    let mut listener = WebhookListener::with_handler_timeout(Duration::from_millis(500));
    listener.attach(PATH, service).unwrap();
    listener
}

/// Notification handler that forwards every message into a channel.
fn recording_service(
    config: DispatchConfig,
) -> (SubscriberService, mpsc::UnboundedReceiver<(String, Value)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let generic = tx.clone();
    let created = tx.clone();
    let event = tx;
    let service = SubscriberService::builder()
        .topic("orders")
        .dispatch(config)
        .on_notification(move |message: NotificationMessage| {
            let tx = generic.clone();
            async move {
                let body = message.content.as_json().cloned().unwrap_or(Value::Null);
                tx.send(("notification".to_string(), body)).ok();
                Ok::<(), HandlerError>(())
            }
        })
        .on_event(
            "onOrderCreated",
            PayloadShape::record(&["type", "id"]),
            move |payload: Value, _message: NotificationMessage| {
                let tx = created.clone();
                async move {
                    tx.send(("onOrderCreated".to_string(), payload)).ok();
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .on_event(
            "onOrderEvent",
            PayloadShape::Json,
            move |payload: Value, _message: NotificationMessage| {
                let tx = event.clone();
                async move {
                    tx.send(("onOrderEvent".to_string(), payload)).ok();
                    Ok::<(), HandlerError>(())
                }
            },
        )
        .build()
        .unwrap();
    (service, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<(String, Value)>) -> (String, Value) {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("handler was not invoked")
        .expect("handler channel closed")
}

#[derive(Debug)]
struct Rejection(&'static str);

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for Rejection {}

struct RejectAll;

impl ContentVerifier for RejectAll {
    fn verify(&self, _request: &WebhookRequest) -> Result<(), DispatchError> {
        Err(DispatchError::VerificationFailed {
            reason: "bad signature".to_string(),
        })
    }
}

#[test]
fn test_validate_requires_topic_header() {
    let config = DispatchConfig {
        strategy: TopicIdentifier::ByHeader,
        ..DispatchConfig::default()
    }
    .map_header("orders", "onOrderEvent");
    assert_eq!(
        config.validate(),
        Err(ConfigurationError::MissingTopicHeader {
            strategy: "by_header"
        })
    );

    let blank = DispatchConfig::by_header_and_payload_key(" ").map_header("a", "b");
    assert!(matches!(
        blank.validate(),
        Err(ConfigurationError::MissingTopicHeader { .. })
    ));
}

#[test]
fn test_validate_requires_resource_map() {
    assert!(matches!(
        DispatchConfig::by_header("x-topic").validate(),
        Err(ConfigurationError::EmptyResourceMap { map: "header", .. })
    ));
    assert!(matches!(
        DispatchConfig::by_payload_key().validate(),
        Err(ConfigurationError::EmptyResourceMap { .. })
    ));
    assert!(matches!(
        DispatchConfig::by_header_and_payload_key("x-topic").validate(),
        Err(ConfigurationError::EmptyResourceMap { .. })
    ));
    assert!(DispatchConfig::none().validate().is_ok());
    assert!(orders_config().validate().is_ok());
}

#[test]
fn test_resources_lists_every_reachable_handler() {
    let config = orders_config().map_header_payload("orders", "type", "created", "onOrderCreated");
    assert_eq!(config.resources(), vec!["onOrderCreated", "onOrderEvent"]);
}

#[test]
fn test_dispatch_config_deserializes() {
    let config: DispatchConfig = serde_json::from_value(json!({
        "strategy": "by_header",
        "topic_header": "x-topic",
        "header_resources": { "orders": "onOrderEvent" }
    }))
    .unwrap();
    assert_eq!(config, DispatchConfig::by_header("x-topic").map_header("orders", "onOrderEvent"));
}

#[test]
fn test_build_rejects_unhandled_resource() {
    let result = SubscriberService::builder()
        .dispatch(DispatchConfig::by_header("x-topic").map_header("orders", "onOrderEvent"))
        .build();
    assert_eq!(
        result.unwrap_err(),
        ConfigurationError::UnknownResource {
            name: "onOrderEvent".to_string()
        }
    );
}

#[test]
fn test_resolve_verification_family() {
    let config = DispatchConfig::none();
    assert_eq!(
        resolve(&config, &challenge("subscribe", "orders", "c")).unwrap(),
        Resolution::Verification
    );
    assert_eq!(
        resolve(&config, &challenge("unsubscribe", "orders", "c")).unwrap(),
        Resolution::Verification
    );
    let denied = WebhookRequest::get(PATH).with_query(HUB_MODE, "denied");
    assert_eq!(resolve(&config, &denied).unwrap(), Resolution::Denial);
}

#[test]
fn test_resolve_rejects_other_methods() {
    let request = WebhookRequest::new(Method::parse("put"), PATH);
    let err = resolve(&DispatchConfig::none(), &request).unwrap_err();
    assert_eq!(
        err,
        DispatchError::MethodNotAllowed {
            method: "PUT".to_string()
        }
    );
    assert_eq!(err.status(), 405);
}

#[test]
fn test_resolve_decodes_notification() {
    let resolution = resolve(&DispatchConfig::none(), &json_post(json!({ "a": 1 }))).unwrap();
    assert_eq!(
        resolution,
        Resolution::Notification {
            route: Route::Generic,
            content: Content::json(json!({ "a": 1 })),
        }
    );
}

#[test]
fn test_route_by_header() {
    let config = DispatchConfig::by_header("x-topic").map_header("orders", "onOrderEvent");
    let content = Content::text("ignored");

    assert_eq!(
        route_notification(&config, &orders_headers(), &content).unwrap(),
        Route::Resource("onOrderEvent".to_string())
    );

    let err = route_notification(&config, &Headers::new(), &content).unwrap_err();
    assert!(matches!(err, DispatchError::NoMatchingResource { .. }));

    let mut unknown = Headers::new();
    unknown.insert("x-topic", "refunds");
    let err = route_notification(&config, &unknown, &content).unwrap_err();
    assert_eq!(err.status(), 404);
}

#[test]
fn test_route_by_payload_key() {
    let config = DispatchConfig::by_payload_key()
        .map_payload("type", "created", "onOrderCreated")
        .map_payload("version", "2", "onV2");

    let route = |body: Value| route_notification(&config, &Headers::new(), &Content::json(body));
    assert_eq!(
        route(json!({ "type": "created" })).unwrap(),
        Route::Resource("onOrderCreated".to_string())
    );
    assert_eq!(
        route(json!({ "version": 2 })).unwrap(),
        Route::Resource("onV2".to_string())
    );
    assert!(matches!(
        route(json!({ "type": "deleted" })),
        Err(DispatchError::NoMatchingResource { .. })
    ));
    assert!(matches!(
        route(json!(["type", "created"])),
        Err(DispatchError::MalformedPayload { .. })
    ));
    assert!(matches!(
        route_notification(&config, &Headers::new(), &Content::text("type=created")),
        Err(DispatchError::MalformedPayload { .. })
    ));
}

#[test]
fn test_route_combined_prefers_combined_entry() {
    let body = Content::json(json!({ "type": "created" }));

    let without_combined = orders_config();
    assert_eq!(
        route_notification(&without_combined, &orders_headers(), &body).unwrap(),
        Route::Resource("onOrderEvent".to_string())
    );

    let with_combined =
        orders_config().map_header_payload("orders", "type", "created", "onOrderCreated");
    assert_eq!(
        route_notification(&with_combined, &orders_headers(), &body).unwrap(),
        Route::Resource("onOrderCreated".to_string())
    );
}

#[test]
fn test_route_combined_falls_back_to_payload_key() {
    let config = orders_config();
    let body = Content::json(json!({ "type": "created" }));
    assert_eq!(
        route_notification(&config, &Headers::new(), &body).unwrap(),
        Route::Resource("onOrderCreated".to_string())
    );

    // a body that is not JSON only disables the payload lookups
    assert_eq!(
        route_notification(&config, &orders_headers(), &Content::text("hello")).unwrap(),
        Route::Resource("onOrderEvent".to_string())
    );
    assert!(matches!(
        route_notification(&config, &Headers::new(), &Content::text("hello")),
        Err(DispatchError::NoMatchingResource { .. })
    ));
}

#[test]
fn test_verification_message_from_query() {
    let request = challenge("subscribe", "orders", "abc").with_query(HUB_LEASE_SECONDS, "300");
    let message = VerificationMessage::from_request(&request);
    assert_eq!(message.mode, "subscribe");
    assert_eq!(message.topic, "orders");
    assert_eq!(message.challenge, "abc");
    assert_eq!(message.lease_seconds, Some(300));

    let empty = VerificationMessage::from_request(&WebhookRequest::get(PATH));
    assert_eq!(empty.topic, "");
    assert_eq!(empty.lease_seconds, None);
}

#[test]
fn test_payload_shape_conversion() {
    let json = Content::json(json!({ "type": "created", "id": 7 }));
    assert_eq!(
        PayloadShape::record(&["type", "id"]).convert(&json).unwrap(),
        json!({ "type": "created", "id": 7 })
    );
    assert!(matches!(
        PayloadShape::record(&["total"]).convert(&json),
        Err(DispatchError::MalformedPayload { .. })
    ));
    assert_eq!(
        PayloadShape::Json.convert(&Content::text("[1,2]")).unwrap(),
        json!([1, 2])
    );
    assert_eq!(
        PayloadShape::Text.convert(&Content::text("hi")).unwrap(),
        json!("hi")
    );
    assert!(PayloadShape::Json.convert(&Content::text("hi")).is_err());
}

#[tokio::test]
async fn test_auto_accept_for_declared_topic() {
    let service = SubscriberService::builder().topic("foo").build().unwrap();
    let listener = listener_for(service);

    let response = listener.handle(challenge("subscribe", "foo", "xyz")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "xyz");

    let response = listener.handle(challenge("subscribe", "bar", "xyz")).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_verification_requires_parameters() {
    let service = SubscriberService::builder().topic("foo").build().unwrap();
    let listener = listener_for(service);

    let missing_challenge = WebhookRequest::get(PATH)
        .with_query(HUB_MODE, "subscribe")
        .with_query(HUB_TOPIC, "foo");
    assert_eq!(listener.handle(missing_challenge).await.status, 404);

    let missing_mode = WebhookRequest::get(PATH)
        .with_query(HUB_TOPIC, "foo")
        .with_query(HUB_CHALLENGE, "xyz");
    assert_eq!(listener.handle(missing_mode).await.status, 404);
}

#[tokio::test]
async fn test_verification_handler_decides() {
    let service = SubscriberService::builder()
        .topic("foo")
        .on_verification(|message: VerificationMessage| async move {
            if message.mode == "subscribe" {
                Ok(())
            } else {
                Err::<(), HandlerError>(Box::new(Rejection("unsubscribe refused")))
            }
        })
        .build()
        .unwrap();
    let listener = listener_for(service);

    let accepted = listener.handle(challenge("subscribe", "foo", "c1")).await;
    assert_eq!(accepted.status, 200);
    assert_eq!(accepted.body_text(), "c1");

    let rejected = listener.handle(challenge("unsubscribe", "foo", "c2")).await;
    assert_eq!(rejected.status, 404);
    assert_eq!(rejected.body_text(), "unsubscribe refused");
}

#[tokio::test]
async fn test_verification_timeout_is_rejection() {
    let service = SubscriberService::builder()
        .on_verification(|_message: VerificationMessage| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), HandlerError>(())
        })
        .build()
        .unwrap();
    let mut listener = WebhookListener::with_handler_timeout(Duration::from_millis(50));
    listener.attach(PATH, service).unwrap();

    let response = listener.handle(challenge("subscribe", "foo", "c")).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_denial_handler_response() {
    let service = SubscriberService::builder()
        .on_denial(|message: DenialMessage| async move {
            Ok::<_, HandlerError>(
                Acknowledgement::new()
                    .with_body(json!({ "seen": message.reason }))
                    .with_header("x-ack", "1"),
            )
        })
        .build()
        .unwrap();
    let listener = listener_for(service);

    let request = WebhookRequest::get(PATH)
        .with_query(HUB_MODE, "denied")
        .with_query(HUB_REASON, "topic unknown");
    let response = listener.handle(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("x-ack"), Some("1"));
    assert_eq!(response.headers.get(CONTENT_TYPE), Some(APPLICATION_JSON));
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({ "seen": "topic unknown" }));
}

#[tokio::test]
async fn test_denial_without_handler_or_failing() {
    let denied = || WebhookRequest::get(PATH).with_query(HUB_MODE, "denied");

    let listener = listener_for(SubscriberService::builder().build().unwrap());
    assert_eq!(listener.handle(denied()).await.status, 404);

    let failing = SubscriberService::builder()
        .on_denial(|_message: DenialMessage| async {
            Err::<Acknowledgement, HandlerError>(Box::new(Rejection("boom")))
        })
        .build()
        .unwrap();
    let response = listener_for(failing).handle(denied()).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body_text(), "boom");
}

#[tokio::test]
async fn test_notification_is_acknowledged_and_delivered() {
    let (service, mut rx) = recording_service(DispatchConfig::none());
    let listener = listener_for(service);

    let response = listener
        .handle(json_post(json!({ "id": 1 })).with_header("x-trace", "t-1"))
        .await;
    assert_eq!(response.status, 202);
    assert!(response.body.is_empty());

    let (handler, body) = recv(&mut rx).await;
    assert_eq!(handler, "notification");
    assert_eq!(body, json!({ "id": 1 }));
}

#[tokio::test]
async fn test_notification_mirrors_headers() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let service = SubscriberService::builder()
        .on_notification(move |message: NotificationMessage| {
            let tx = tx.clone();
            async move {
                tx.send(message).ok();
                Ok::<(), HandlerError>(())
            }
        })
        .build()
        .unwrap();
    let listener = listener_for(service);

    let request = WebhookRequest::post(PATH)
        .with_body("text/plain; charset=utf-8", "hello".to_string())
        .with_header("x-trace", "t-1");
    assert_eq!(listener.handle(request).await.status, 202);

    let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.content, Content::text("hello"));
    assert_eq!(message.content_type, TEXT_PLAIN);
    assert_eq!(message.headers.get("x-trace"), Some("t-1"));
    assert_eq!(message.headers.get(CONTENT_TYPE), Some("text/plain; charset=utf-8"));
}

#[tokio::test]
async fn test_unsupported_content_type_is_bad_request() {
    let strategies = [
        DispatchConfig::none(),
        DispatchConfig::by_header("x-topic").map_header("orders", "onOrderEvent"),
        DispatchConfig::by_payload_key().map_payload("type", "created", "onOrderCreated"),
        orders_config(),
    ];
    for config in strategies {
        let (service, _rx) = recording_service(config);
        let listener = listener_for(service);
        let request = WebhookRequest::post(PATH)
            .with_body("text/turtle", "<a> <b> <c> .".to_string())
            .with_header("x-topic", "orders");
        assert_eq!(listener.handle(request).await.status, 400);
    }
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (service, _rx) = recording_service(DispatchConfig::none());
    let listener = listener_for(service);
    let request = WebhookRequest::post(PATH).with_body(APPLICATION_JSON, "{ nope".to_string());
    assert_eq!(listener.handle(request).await.status, 400);
}

#[tokio::test]
async fn test_event_handler_receives_converted_payload() {
    let (service, mut rx) = recording_service(orders_config());
    let listener = listener_for(service);

    let response = listener
        .handle(json_post(json!({ "type": "created", "id": 42 })))
        .await;
    assert_eq!(response.status, 202);
    let (handler, payload) = recv(&mut rx).await;
    assert_eq!(handler, "onOrderCreated");
    assert_eq!(payload, json!({ "type": "created", "id": 42 }));

    let response = listener
        .handle(json_post(json!({ "type": "shipped" })).with_header("x-topic", "orders"))
        .await;
    assert_eq!(response.status, 202);
    let (handler, _) = recv(&mut rx).await;
    assert_eq!(handler, "onOrderEvent");
}

#[tokio::test]
async fn test_shape_mismatch_skips_handler() {
    let (service, mut rx) = recording_service(orders_config());
    let listener = listener_for(service);

    // onOrderCreated requires an `id`
    let response = listener.handle(json_post(json!({ "type": "created" }))).await;
    assert_eq!(response.status, 400);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unmatched_notification_is_not_found() {
    let (service, _rx) = recording_service(orders_config());
    let listener = listener_for(service);
    let response = listener.handle(json_post(json!({ "type": "deleted" }))).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_failing_notification_handler_still_acknowledged() {
    let service = SubscriberService::builder()
        .on_notification(|_message: NotificationMessage| async {
            Err::<(), HandlerError>(Box::new(Rejection("handler exploded")))
        })
        .build()
        .unwrap();
    let listener = listener_for(service);
    let response = listener.handle(json_post(json!({}))).await;
    assert_eq!(response.status, 202);
}

#[tokio::test]
async fn test_content_verifier_rejects_delivery() {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let service = SubscriberService::builder()
        .verifier(RejectAll)
        .on_notification(move |_message: NotificationMessage| {
            let tx = tx.clone();
            async move {
                tx.send(()).ok();
                Ok::<(), HandlerError>(())
            }
        })
        .build()
        .unwrap();
    let listener = listener_for(service);

    assert_eq!(listener.handle(json_post(json!({}))).await.status, 403);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_listener_paths() {
    let mut listener = WebhookListener::new();
    listener
        .attach("/callback/", SubscriberService::builder().build().unwrap())
        .unwrap();
    let err = listener
        .attach("callback", SubscriberService::builder().build().unwrap())
        .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::DuplicateServicePath {
            path: "/callback".to_string()
        }
    );
    assert_eq!(listener.paths(), vec!["/callback"]);

    let response = listener.handle(WebhookRequest::get("/elsewhere")).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_await_result_keeps_own_errors() {
    let own = await_result(Duration::from_secs(1), async {
        Err::<(), HandlerError>(Box::new(DispatchError::MissingParameter { name: "hub.topic" }))
    })
    .await
    .unwrap_err();
    assert!(matches!(
        own,
        WebSubError::Dispatch(DispatchError::MissingParameter { .. })
    ));

    let foreign = await_result(Duration::from_secs(1), async {
        Err::<(), HandlerError>(Box::new(Rejection("nope")))
    })
    .await
    .unwrap_err();
    assert!(foreign.is_service_execution());
    assert_eq!(foreign.detail(), "nope");

    let timed_out = await_result(Duration::from_millis(20), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<(), HandlerError>(())
    })
    .await
    .unwrap_err();
    assert!(matches!(
        timed_out,
        WebSubError::Delivery(DeliveryError::Timeout { timeout_ms: 20 })
    ));
}
