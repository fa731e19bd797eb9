use livreo_backend::auth::{Role, TokenService};
use uuid::Uuid;

const SECRET: &str = "an-integration-test-secret-of-decent-length";

#[test]
fn issue_then_verify_round_trips_the_claims() {
    let service = TokenService::new(SECRET, 604800);
    let user_id = Uuid::new_v4();

    let (token, issued) = service
        .issue(user_id, "lectrice@example.com", Role::Client, "Awa")
        .expect("issue should succeed");

    // Three-part compact form
    assert_eq!(token.split('.').count(), 3);

    let verified = service.verify(&token).expect("fresh token should verify");
    assert_eq!(verified, issued);
    assert_eq!(verified.sub, user_id);
    assert_eq!(verified.email, "lectrice@example.com");
    assert!(verified.exp - verified.iat == 604800);
}

#[test]
fn verification_fails_closed_on_expiry() {
    let service = TokenService::new(SECRET, 0);

    let (token, _) = service
        .issue(Uuid::new_v4(), "lectrice@example.com", Role::Client, "Awa")
        .expect("issue should succeed");

    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert!(service.verify(&token).is_none());
}

#[test]
fn any_bit_flip_in_the_signature_yields_no_session() {
    let service = TokenService::new(SECRET, 3600);
    let (token, _) = service
        .issue(Uuid::new_v4(), "admin@example.com", Role::Admin, "Admin")
        .expect("issue should succeed");

    let parts: Vec<&str> = token.split('.').collect();
    let signature = parts[2];

    // Flip each character of the signature in turn; none may verify.
    for index in 0..signature.len() {
        let mut tampered: Vec<u8> = signature.as_bytes().to_vec();
        tampered[index] = if tampered[index] == b'A' { b'B' } else { b'A' };
        let tampered_token = format!(
            "{}.{}.{}",
            parts[0],
            parts[1],
            String::from_utf8(tampered).expect("ascii signature")
        );
        assert!(
            service.verify(&tampered_token).is_none(),
            "tampered signature at index {} must not verify",
            index
        );
    }
}

#[test]
fn tokens_from_another_secret_are_rejected() {
    let service = TokenService::new(SECRET, 3600);
    let other = TokenService::new("a-completely-different-signing-secret!", 3600);

    let (token, _) = other
        .issue(Uuid::new_v4(), "lectrice@example.com", Role::Client, "Awa")
        .expect("issue should succeed");

    assert!(service.verify(&token).is_none());
}
