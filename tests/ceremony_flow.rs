mod common;

use anyhow::{anyhow, Result};
use common::{login_response, registration_response, service, service_with, SimulatedEngine};
use keyhold::webauthn::{
    CeremonyError, CeremonyKind, Ceremonies, CredentialId, CredentialStore, EngineError,
    LoginChallenge, StoreError, UserIdentity,
};
use serde_json::json;
use std::{sync::Arc, thread, time::Duration};

fn options(challenge: LoginChallenge) -> Result<serde_json::Value> {
    match challenge {
        LoginChallenge::Options(options) => Ok(options),
        LoginChallenge::NotRegistered => Err(anyhow!("expected login options")),
    }
}

#[test]
fn register_list_remove() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(None, &alice)?;
    assert_eq!(options["publicKey"]["rp"]["id"], "localhost");
    assert_eq!(options["publicKey"]["user"]["name"], "alice");

    let credential =
        service.finish_registration(None, &alice, &registration_response(&options, &[1, 2, 3])?)?;
    assert_eq!(credential.id.as_slice(), &[1, 2, 3]);
    assert_eq!(credential.sign_count, 0);

    let listed = service.list_credentials(&alice);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, credential.id);

    assert!(service.remove_credential(&alice, &credential.id));
    assert!(service.list_credentials(&alice).is_empty());
    assert!(!service.remove_credential(&alice, &credential.id));
    Ok(())
}

#[test]
fn unknown_identity_lists_nothing() -> Result<()> {
    let service = service()?;
    assert!(service.list_credentials(&"nobody".into()).is_empty());
    assert_eq!(service.store().user_count(), 0);
    Ok(())
}

#[test]
fn superseded_challenge_is_rejected() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    let first = service.begin_registration(None, &alice)?;
    let _second = service.begin_registration(None, &alice)?;

    let result = service.finish_registration(None, &alice, &registration_response(&first, &[9])?);
    assert!(matches!(
        result,
        Err(CeremonyError::Verification(EngineError::ChallengeMismatch))
    ));

    // The failed attempt consumed the only live session.
    let result = service.finish_registration(None, &alice, &registration_response(&first, &[9])?);
    assert!(matches!(result, Err(CeremonyError::NoPendingRegistration)));
    assert!(service.list_credentials(&alice).is_empty());
    Ok(())
}

#[test]
fn session_is_consumed_by_success() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(None, &alice)?;
    let response = registration_response(&options, &[4])?;
    service.finish_registration(None, &alice, &response)?;

    assert!(!service
        .sessions()
        .has_session(CeremonyKind::Registration, &alice));
    let replay = service.finish_registration(None, &alice, &response);
    assert!(matches!(replay, Err(CeremonyError::NoPendingRegistration)));
    assert_eq!(service.list_credentials(&alice).len(), 1);
    Ok(())
}

#[test]
fn second_registration_excludes_existing_credential() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(None, &alice)?;
    service.finish_registration(None, &alice, &registration_response(&options, &[7, 7])?)?;

    let options = service.begin_registration(None, &alice)?;
    let excluded = options["publicKey"]["excludeCredentials"]
        .as_array()
        .ok_or_else(|| anyhow!("missing excludeCredentials"))?;
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0]["id"], CredentialId::from(&[7u8, 7][..]).to_base64url());
    assert_eq!(excluded[0]["transports"], json!(["internal"]));

    let reuse = service.finish_registration(None, &alice, &registration_response(&options, &[7, 7])?);
    assert!(matches!(
        reuse,
        Err(CeremonyError::Verification(EngineError::ExcludedCredential))
    ));
    assert_eq!(service.list_credentials(&alice).len(), 1);
    Ok(())
}

#[test]
fn duplicate_credential_is_rejected_by_store() -> Result<()> {
    let service = service_with(SimulatedEngine::lenient(), Duration::from_secs(60))?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(None, &alice)?;
    service.finish_registration(None, &alice, &registration_response(&options, &[5])?)?;

    let options = service.begin_registration(None, &alice)?;
    let result = service.finish_registration(None, &alice, &registration_response(&options, &[5])?);
    assert!(matches!(
        result,
        Err(CeremonyError::Store(StoreError::DuplicateCredential))
    ));
    assert_eq!(service.list_credentials(&alice).len(), 1);
    Ok(())
}

#[test]
fn finish_without_begin_never_creates_user() -> Result<()> {
    let service = service()?;
    let mallory = UserIdentity::from("mallory");

    let result = service.finish_registration(None, &mallory, &json!({}));
    assert!(matches!(result, Err(CeremonyError::UserForbidden)));
    let result = service.finish_login(None, &mallory, &json!({}));
    assert!(matches!(result, Err(CeremonyError::UserForbidden)));

    assert_eq!(service.store().get(&mallory), Err(StoreError::NotFound));
    assert_eq!(service.store().user_count(), 0);
    Ok(())
}

#[test]
fn login_for_unknown_identity_is_not_registered() -> Result<()> {
    let service = service()?;
    let bob = UserIdentity::from("bob");

    assert_eq!(service.begin_login(None, &bob)?, LoginChallenge::NotRegistered);
    assert!(!service.sessions().has_session(CeremonyKind::Login, &bob));
    assert_eq!(service.store().user_count(), 0);
    Ok(())
}

#[test]
fn login_persists_counter() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(None, &alice)?;
    service.finish_registration(None, &alice, &registration_response(&options, &[1])?)?;

    let options = self::options(service.begin_login(None, &alice)?)?;
    assert_eq!(options["publicKey"]["allowCredentials"][0]["id"], "AQ");

    let credential = service.finish_login(None, &alice, &login_response(&options, &[1], 5)?)?;
    assert_eq!(credential.sign_count, 5);
    assert_eq!(service.list_credentials(&alice)[0].sign_count, 5);

    // A regressed counter is refused and leaves the stored value alone.
    let options = self::options(service.begin_login(None, &alice)?)?;
    let result = service.finish_login(None, &alice, &login_response(&options, &[1], 3)?);
    assert!(matches!(
        result,
        Err(CeremonyError::Verification(EngineError::CounterRegression {
            stored: 5,
            reported: 3
        }))
    ));
    assert_eq!(service.list_credentials(&alice)[0].sign_count, 5);
    assert!(!service.sessions().has_session(CeremonyKind::Login, &alice));
    Ok(())
}

#[test]
fn login_with_foreign_credential_fails() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(None, &alice)?;
    service.finish_registration(None, &alice, &registration_response(&options, &[1])?)?;

    let options = self::options(service.begin_login(None, &alice)?)?;
    let result = service.finish_login(None, &alice, &login_response(&options, &[2], 1)?);
    assert!(matches!(
        result,
        Err(CeremonyError::Verification(EngineError::UnknownCredential))
    ));

    let result = service.finish_login(None, &alice, &login_response(&options, &[1], 1)?);
    assert!(matches!(result, Err(CeremonyError::NoPendingLogin)));
    Ok(())
}

#[test]
fn expired_session_is_rejected() -> Result<()> {
    let service = service_with(SimulatedEngine::default(), Duration::from_millis(1))?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(None, &alice)?;
    thread::sleep(Duration::from_millis(10));

    let result = service.finish_registration(None, &alice, &registration_response(&options, &[1])?);
    assert!(matches!(
        result,
        Err(CeremonyError::Verification(EngineError::ChallengeExpired))
    ));
    assert!(service.list_credentials(&alice).is_empty());
    Ok(())
}

#[test]
fn rejected_origin_touches_nothing() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    for origin in ["https://evil.example.net", "not a url", "https://example.com:8443"] {
        let result = service.begin_registration(Some(origin), &alice);
        assert!(matches!(result, Err(CeremonyError::InvalidOrigin(_))));
        let result = service.begin_login(Some(origin), &alice);
        assert!(matches!(result, Err(CeremonyError::InvalidOrigin(_))));
    }

    assert_eq!(service.store().user_count(), 0);
    assert_eq!(service.sessions().len(CeremonyKind::Registration), 0);
    Ok(())
}

#[test]
fn origin_selects_relying_party() -> Result<()> {
    let service = service()?;
    let alice = UserIdentity::from("alice");

    let options = service.begin_registration(Some("https://example.com/register.html"), &alice)?;
    assert_eq!(options["publicKey"]["rp"]["id"], "example.com");
    assert_eq!(
        options["publicKey"]["rp"]["icon"],
        "https://example.com/favicon.ico"
    );
    assert_eq!(options["publicKey"]["timeout"], 60_000);
    Ok(())
}

#[test]
fn concurrent_identities_do_not_leak() -> Result<()> {
    let service: Arc<dyn Ceremonies> = Arc::new(service()?);

    let handles: Vec<_> = (0u8..16)
        .map(|n| {
            let service = Arc::clone(&service);
            thread::spawn(move || -> Result<()> {
                let identity = UserIdentity::new(format!("user-{n}"));
                for round in 0u8..4 {
                    let options = service.begin_registration(None, &identity)?;
                    service.finish_registration(
                        None,
                        &identity,
                        &registration_response(&options, &[n, round])?,
                    )?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("registration thread panicked"))??;
    }

    for n in 0u8..16 {
        let credentials = service.list_credentials(&UserIdentity::new(format!("user-{n}")));
        assert_eq!(credentials.len(), 4);
        assert!(credentials.iter().all(|c| c.id.as_slice()[0] == n));
    }
    Ok(())
}
