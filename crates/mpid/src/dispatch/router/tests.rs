//! Router behaviour tests for MPI dispatch.

use std::io::Cursor;
use std::sync::Arc;

use mockall::mock;
use mockall::predicate::eq;
use rstest::rstest;

use super::*;
use crate::protocol::{StatusCode, parse_request};
use crate::session::{SessionError, SessionRegistry};

mock! {
    Handler {}
    impl MpiHandler for Handler {
        fn open(
            &self,
            client_name: &str,
            max_payload_size_bytes: usize,
        ) -> Result<SessionId, ModuleError>;
        fn close(&self, session: &str) -> Result<(), ModuleError>;
        fn set(
            &self,
            session: &str,
            component: &str,
            object: &str,
            payload: &str,
        ) -> Result<(), ModuleError>;
        fn get(&self, session: &str, component: &str, object: &str) -> Result<String, ModuleError>;
        fn set_desired(&self, session: &str, payload: &str) -> Result<(), ModuleError>;
        fn get_reported(&self, session: &str) -> Result<String, ModuleError>;
    }
}

fn request(uri: &str, body: &str) -> Request {
    let raw = format!(
        "POST /osconfig/{uri} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    parse_request(&mut Cursor::new(raw.into_bytes()), 4096).expect("test request")
}

fn route(handler: MockHandler, uri: &str, body: &str) -> Result<String, DispatchError> {
    MpiRouter::new(Arc::new(handler)).route(&request(uri, body))
}

fn unknown_session() -> ModuleError {
    ModuleError::Session(SessionError::UnknownSession(String::from("stale")))
}

fn real_session_id() -> SessionId {
    SessionRegistry::new()
        .open("client", 0)
        .expect("mint session id")
}

// ---------------------------------------------------------------------------
// Operation parsing
// ---------------------------------------------------------------------------

#[rstest]
#[case("MpiOpen", Operation::Open)]
#[case("MpiClose", Operation::Close)]
#[case("MpiSet", Operation::Set)]
#[case("MpiGet", Operation::Get)]
#[case("MpiSetDesired", Operation::SetDesired)]
#[case("MpiGetReported", Operation::GetReported)]
fn operations_round_trip_their_tokens(#[case] uri: &str, #[case] expected: Operation) {
    let operation = Operation::parse(uri).expect("known operation");
    assert_eq!(operation, expected);
    assert_eq!(operation.as_str(), uri);
}

#[rstest]
#[case::unknown("MpiFoo")]
#[case::wrong_case("mpiopen")]
fn unknown_tokens_are_not_found(#[case] uri: &str) {
    let error = route(MockHandler::new(), uri, "{}").expect_err("unknown operation");
    assert!(matches!(error, DispatchError::UnknownOperation { .. }));
    assert_eq!(error.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Body validation
// ---------------------------------------------------------------------------

#[rstest]
#[case::empty("")]
#[case::not_json("not json")]
#[case::array("[1,2,3]")]
#[case::string("\"MpiOpen\"")]
fn bodies_must_be_json_objects(#[case] body: &str) {
    let error = route(MockHandler::new(), "MpiOpen", body).expect_err("malformed body");
    assert!(matches!(error, DispatchError::MalformedBody { .. }));
    assert_eq!(error.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[case::open_name("MpiOpen", r#"{"MaxPayloadSizeBytes":0}"#, "ClientName")]
#[case::open_size("MpiOpen", r#"{"ClientName":"c"}"#, "MaxPayloadSizeBytes")]
#[case::close("MpiClose", "{}", "ClientSession")]
#[case::set_session("MpiSet", r#"{"ComponentName":"c","ObjectName":"o","Payload":1}"#, "ClientSession")]
#[case::set_component("MpiSet", r#"{"ClientSession":"s","ObjectName":"o","Payload":1}"#, "ComponentName")]
#[case::set_object("MpiSet", r#"{"ClientSession":"s","ComponentName":"c","Payload":1}"#, "ObjectName")]
#[case::set_payload("MpiSet", r#"{"ClientSession":"s","ComponentName":"c","ObjectName":"o"}"#, "Payload")]
#[case::get_object("MpiGet", r#"{"ClientSession":"s","ComponentName":"c"}"#, "ObjectName")]
#[case::desired_payload("MpiSetDesired", r#"{"ClientSession":"s"}"#, "Payload")]
#[case::reported("MpiGetReported", r#"{"Payload":{}}"#, "ClientSession")]
fn first_missing_field_is_reported(
    #[case] uri: &str,
    #[case] body: &str,
    #[case] expected: &'static str,
) {
    let error = route(MockHandler::new(), uri, body).expect_err("missing field");
    assert!(
        matches!(error, DispatchError::MissingField { field, .. } if field == expected),
        "unexpected error {error:?}"
    );
    assert_eq!(error.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[case::negative_size(r#"{"ClientName":"c","MaxPayloadSizeBytes":-1}"#)]
#[case::fractional_size(r#"{"ClientName":"c","MaxPayloadSizeBytes":1.5}"#)]
#[case::text_size(r#"{"ClientName":"c","MaxPayloadSizeBytes":"10"}"#)]
#[case::numeric_name(r#"{"ClientName":7,"MaxPayloadSizeBytes":0}"#)]
fn mistyped_open_fields_are_rejected(#[case] body: &str) {
    let error = route(MockHandler::new(), "MpiOpen", body).expect_err("invalid field");
    assert!(matches!(error, DispatchError::InvalidField { .. }));
    assert_eq!(error.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Handler invocation
// ---------------------------------------------------------------------------

#[test]
fn open_returns_session_as_json_string() {
    let id = real_session_id();
    let expected = format!("\"{id}\"");
    let mut handler = MockHandler::new();
    handler
        .expect_open()
        .with(eq("client"), eq(256_usize))
        .times(1)
        .return_once(move |_, _| Ok(id));

    let body = route(
        handler,
        "MpiOpen",
        r#"{"ClientName":"client","MaxPayloadSizeBytes":256}"#,
    )
    .expect("open succeeds");

    assert_eq!(body, expected);
}

#[test]
fn set_reserializes_payload() {
    let mut handler = MockHandler::new();
    handler
        .expect_set()
        .with(
            eq("session"),
            eq("CommandRunner"),
            eq("commandArguments"),
            eq(r#"{"CommandId":"1","Action":3}"#),
        )
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let body = route(
        handler,
        "MpiSet",
        r#"{"ClientSession":"session","ComponentName":"CommandRunner","ObjectName":"commandArguments","Payload": { "CommandId" : "1", "Action" : 3 }}"#,
    )
    .expect("set succeeds");

    assert!(body.is_empty());
}

#[test]
fn get_returns_module_body_verbatim() {
    let mut handler = MockHandler::new();
    handler
        .expect_get()
        .with(eq("session"), eq("CommandRunner"), eq("commandStatus"))
        .times(1)
        .returning(|_, _, _| Ok(String::from(r#"{"CommandId":"1"}"#)));

    let body = route(
        handler,
        "MpiGet",
        r#"{"ClientSession":"session","ComponentName":"CommandRunner","ObjectName":"commandStatus"}"#,
    )
    .expect("get succeeds");

    assert_eq!(body, r#"{"CommandId":"1"}"#);
}

#[test]
fn desired_and_reported_forward_documents() {
    let mut handler = MockHandler::new();
    handler
        .expect_set_desired()
        .with(eq("session"), eq(r#"{"A":{"b":true}}"#))
        .times(1)
        .returning(|_, _| Ok(()));
    handler
        .expect_get_reported()
        .with(eq("session"))
        .times(1)
        .returning(|_| Ok(String::from("{}")));
    let router = MpiRouter::new(Arc::new(handler));

    let desired = router
        .route(&request(
            "MpiSetDesired",
            r#"{"ClientSession":"session","Payload":{"A":{"b":true}}}"#,
        ))
        .expect("set desired succeeds");
    let reported = router
        .route(&request("MpiGetReported", r#"{"ClientSession":"session"}"#))
        .expect("get reported succeeds");

    assert!(desired.is_empty());
    assert_eq!(reported, "{}");
}

#[rstest]
#[case::close("MpiClose", r#"{"ClientSession":"stale"}"#)]
#[case::get_reported("MpiGetReported", r#"{"ClientSession":"stale"}"#)]
fn module_failures_are_bad_requests(#[case] uri: &str, #[case] body: &str) {
    let mut handler = MockHandler::new();
    handler.expect_close().returning(|_| Err(unknown_session()));
    handler
        .expect_get_reported()
        .returning(|_| Err(unknown_session()));

    let error = route(handler, uri, body).expect_err("module failure");

    assert!(matches!(error, DispatchError::Module { .. }));
    assert_eq!(error.status(), StatusCode::BAD_REQUEST);
}
