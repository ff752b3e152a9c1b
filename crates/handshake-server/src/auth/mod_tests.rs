use chrono::Duration;
use uuid::Uuid;

use super::{hash_password, mint_token, verify_password, verify_token};

#[test]
fn password_hash_round_trips() {
    let hash = hash_password("hunter222").unwrap();
    assert!(verify_password("hunter222", &hash).unwrap());
    assert!(!verify_password("wrong", &hash).unwrap());
}

#[test]
fn token_round_trips_to_the_same_user() {
    let user = Uuid::new_v4();
    let token = mint_token(user, "test-secret", Duration::seconds(60)).unwrap();
    assert_eq!(verify_token(&token, "test-secret").unwrap(), user);
}

#[test]
fn token_rejected_with_wrong_secret() {
    let user = Uuid::new_v4();
    let token = mint_token(user, "test-secret", Duration::seconds(60)).unwrap();
    assert!(verify_token(&token, "other-secret").is_err());
}

#[test]
fn expired_token_is_rejected() {
    let user = Uuid::new_v4();
    let token = mint_token(user, "test-secret", Duration::seconds(-1)).unwrap();
    assert!(verify_token(&token, "test-secret").is_err());
}
