use crate::base::neterror::{DelegateError, NetError};
use crate::base::taskstate::TaskState;
use crate::delegate::Callback;

#[test]
fn test_net_error_roundtrip() {
    let original = NetError::ConnectionRefused;
    let code = original.as_i32();
    assert_eq!(code, -102);
    assert!(matches!(NetError::from(code), NetError::ConnectionRefused));

    let local = NetError::JsonParseError;
    assert_eq!(NetError::from(local.as_i32()), NetError::JsonParseError);
}

#[test]
fn test_unknown_error() {
    let err = NetError::from(-9999);
    assert!(matches!(err, NetError::Unknown(-9999)));
    assert_eq!(err.as_i32(), -9999);
}

#[test]
fn test_collision_avoidance() {
    // Chromium reserves -900..=-906 for blob errors.
    let blob_range = -906..=-900;
    for err in [NetError::HttpBodyError, NetError::InvalidUtf8, NetError::JsonParseError] {
        assert!(!blob_range.contains(&err.as_i32()));
    }
}

#[test]
fn test_cancellation() {
    assert!(NetError::Aborted.is_cancellation());
    assert!(!NetError::ConnectionReset.is_cancellation());
}

#[test]
fn test_contract_violation_message() {
    let err = DelegateError::ContractViolation(Callback::DidFinishDownloading);
    assert!(err.to_string().contains("DidFinishDownloading"));
}

#[test]
fn test_task_state_terminal() {
    assert!(!TaskState::Suspended.is_terminal());
    assert!(!TaskState::Running.is_terminal());
    assert!(TaskState::Completed.is_terminal());
    assert_eq!(TaskState::default(), TaskState::Suspended);
}
