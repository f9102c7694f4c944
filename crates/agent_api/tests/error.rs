use agent_api::error::parse_error_message;
use agent_api::{classify_status, ApiError, ErrorClass};
use reqwest::StatusCode;

#[test]
fn status_codes_map_onto_failure_classes() {
    assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorClass::Auth);
    assert_eq!(classify_status(StatusCode::FORBIDDEN), ErrorClass::Auth);
    assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ErrorClass::RateLimit);
    assert_eq!(classify_status(StatusCode::NOT_FOUND), ErrorClass::NotFound);
    assert_eq!(
        classify_status(StatusCode::METHOD_NOT_ALLOWED),
        ErrorClass::MethodNotSupported
    );
    assert_eq!(classify_status(StatusCode::BAD_GATEWAY), ErrorClass::ServerError);
    assert_eq!(classify_status(StatusCode::BAD_REQUEST), ErrorClass::Client);
}

#[test]
fn client_error_reporting_a_rate_limit_is_classified_as_rate_limit() {
    let error = ApiError::from_status(
        StatusCode::BAD_REQUEST,
        r#"{"error":{"message":"Rate limit reached for requests"}}"#,
    );
    assert_eq!(error.class(), ErrorClass::RateLimit);
    assert_eq!(error.rate_limit_reason(), "Rate limit reached for requests");
}

#[test]
fn cancellation_and_stream_failures_are_not_transport() {
    assert_eq!(ApiError::Cancelled.class(), ErrorClass::Cancelled);
    assert_eq!(
        ApiError::StreamFailed {
            message: "agent crashed".to_owned()
        }
        .class(),
        ErrorClass::ServerError
    );
}

#[test]
fn stream_error_frame_reporting_a_rate_limit_is_classified_as_rate_limit() {
    let error = ApiError::StreamFailed {
        message: "Too many requests, slow down".to_owned(),
    };
    assert_eq!(error.class(), ErrorClass::RateLimit);
    assert_eq!(error.rate_limit_reason(), "Too many requests, slow down");
}

#[test]
fn dropped_stream_is_a_transport_failure() {
    let error = ApiError::Disconnected {
        message: "unexpected EOF".to_owned(),
    };
    assert_eq!(error.class(), ErrorClass::Transport);
}

#[test]
fn parse_error_message_reads_detail_field() {
    let message = parse_error_message(StatusCode::NOT_FOUND, r#"{"detail":"Agent agent-1 not found"}"#);
    assert_eq!(message, "Agent agent-1 not found");
}

#[test]
fn parse_error_message_reads_nested_error_message() {
    let body = r#"{"error":{"type":"invalid_request","message":"invalid agent"}}"#;
    assert_eq!(parse_error_message(StatusCode::BAD_REQUEST, body), "invalid agent");
}

#[test]
fn parse_error_message_falls_back_to_raw_body_then_reason() {
    assert_eq!(
        parse_error_message(StatusCode::INTERNAL_SERVER_ERROR, "raw failure text"),
        "raw failure text"
    );
    assert_eq!(
        parse_error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
        "Service Unavailable"
    );
}
