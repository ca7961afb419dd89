//! Properties of session identifiers and tokens

use actionmap::auth::{is_valid_session_id, SessionStore};
use actionmap::error::AuthError;
use proptest::prelude::*;
use tempfile::TempDir;

#[test]
fn test_session_id_shape() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&"[0-9a-f]{32}", |id| {
            assert!(is_valid_session_id(&id));
            Ok(())
        })
        .unwrap();

    runner
        .run(&"[0-9a-zA-Z./]{0,40}", |id| {
            let well_formed = id.len() == 32
                && id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
            assert_eq!(is_valid_session_id(&id), well_formed);
            Ok(())
        })
        .unwrap();
}

/// Only the issued token verifies; every other token is refused.
#[test]
fn test_only_issued_token_verifies() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::new(temp_dir.path());
    let issued = store.issue("default", None).unwrap();
    let mut runner = proptest::test_runner::TestRunner::new(proptest::test_runner::Config {
        cases: 64,
        ..Default::default()
    });

    runner
        .run(&"[0-9a-f]{0,64}", |token| {
            prop_assume!(token != issued.token);
            let result = store.verify("default", &issued.id, &token);
            assert!(matches!(result, Err(AuthError::InvalidToken)));
            Ok(())
        })
        .unwrap();

    assert!(store.verify("default", &issued.id, &issued.token).is_ok());
}
