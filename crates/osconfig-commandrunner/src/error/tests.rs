//! Unit tests for command error types.

use rstest::rstest;

use super::*;

#[test]
fn canceled_message_includes_id() {
    let error = CommandError::Canceled { id: "abc".into() };
    let message = error.to_string();
    assert!(message.contains("abc"), "expected id in message: {message}");
    assert!(
        message.contains("canceled"),
        "expected 'canceled' in message: {message}"
    );
}

#[test]
fn invalid_json_keeps_source() {
    let source = serde_json::from_str::<serde_json::Value>("{").expect_err("truncated JSON");
    let error = CommandError::invalid_json(source);
    assert!(std::error::Error::source(&error).is_some());
}

#[rstest]
#[case::canceled(CommandError::Canceled { id: "a".into() }, libc::ECANCELED)]
#[case::not_found(CommandError::NotFound { id: "a".into() }, libc::ENOENT)]
#[case::invalid(CommandError::invalid("empty CommandId"), libc::EINVAL)]
#[case::object(CommandError::UnknownObject { object: "x".into() }, libc::EINVAL)]
fn errno_reflects_failure_class(#[case] error: CommandError, #[case] expected: i32) {
    assert_eq!(error.errno(), expected);
}
