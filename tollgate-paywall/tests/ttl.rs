mod common;

use std::{sync::Arc, time::Duration};

use common::{Call, ScriptedAgent, Step};
use tollgate_core::{
    agent::{SeizeRequest, TopUpRequest},
    config::GateConfig,
    token::{BrowseSessionToken, TokenCipher},
    types::{AmountValue, UnixMillis, WalletKey},
};
use tollgate_paywall::{
    breaker::FailureCircuitBreaker,
    store::SessionStore,
    ttl::{RechargeReport, TtlEnforcer},
};

const TTL: Duration = Duration::from_secs(600);
const ISSUED: UnixMillis = UnixMillis(1_700_000_000_000);

fn cipher() -> TokenCipher {
    TokenCipher::new([42u8; 32])
}

fn enforcer(agent: &ScriptedAgent, store: &SessionStore) -> TtlEnforcer<ScriptedAgent> {
    let config = GateConfig::builder()
        .session_ttl(TTL)
        .max_failures(2)
        .top_up_amount(250u64)
        .build();
    TtlEnforcer::new(Arc::new(agent.clone()), store.clone(), cipher(), &config)
}

fn sealed_token(user_id: Option<&str>, issued_at: Option<UnixMillis>) -> String {
    let mut token = BrowseSessionToken::new(WalletKey::new("0xCafe"), user_id.map(String::from));
    token.issued_at = issued_at;
    cipher().seal(&token).unwrap()
}

fn after(duration: Duration) -> UnixMillis {
    UnixMillis(ISSUED.0 + duration.as_millis() as u64)
}

#[tokio::test]
async fn test_token_within_ttl_passes_untouched() {
    let agent = ScriptedAgent::succeeding();
    let store = SessionStore::new();
    let sealed = sealed_token(Some("user-1"), Some(ISSUED));

    let check = enforcer(&agent, &store)
        .enforce_at(Some(&sealed), after(TTL))
        .await
        .unwrap();

    assert!(!check.reissue);
    assert_eq!(check.recharge, None);
    assert_eq!(check.token.issued_at, Some(ISSUED));
    assert_eq!(check.sealed_reissue(&cipher()).unwrap(), None);
    assert!(agent.calls().is_empty());
}

#[tokio::test]
async fn test_unstamped_token_starts_window() {
    let agent = ScriptedAgent::succeeding();
    let store = SessionStore::new();
    let sealed = sealed_token(None, None);

    let check = enforcer(&agent, &store)
        .enforce_at(Some(&sealed), ISSUED)
        .await
        .unwrap();

    assert!(check.reissue);
    assert_eq!(check.token.issued_at, Some(ISSUED));
    assert!(agent.calls().is_empty());

    let reissued = check.sealed_reissue(&cipher()).unwrap().unwrap();
    assert_eq!(cipher().open(&reissued).unwrap(), check.token);
}

#[tokio::test]
async fn test_expired_token_seizes_then_refills_and_slides() {
    let agent = ScriptedAgent::succeeding();
    let store = SessionStore::new();
    let sealed = sealed_token(Some("user-1"), Some(ISSUED));
    let now = after(TTL + Duration::from_millis(1));

    let check = enforcer(&agent, &store)
        .enforce_at(Some(&sealed), now)
        .await
        .unwrap();

    let wallet = WalletKey::new("0xcafe");
    assert_eq!(
        agent.calls(),
        vec![
            Call::Seize(SeizeRequest {
                user_id: "user-1".to_string(),
                wallet: wallet.clone(),
            }),
            Call::TopUp(TopUpRequest {
                user_id: "user-1".to_string(),
                wallet: wallet.clone(),
                amount: AmountValue(250),
            }),
        ]
    );
    assert_eq!(
        check.recharge,
        Some(RechargeReport {
            seized: true,
            refilled: true,
        })
    );
    assert!(check.reissue);
    assert_eq!(check.token.issued_at, Some(now));
    assert_eq!(store.total_top_ups(&wallet), 1);
    assert!(!store.is_swap_locked(&wallet));
}

#[tokio::test]
async fn test_expired_window_slides_to_current_time() {
    let agent = ScriptedAgent::succeeding();
    let store = SessionStore::new();
    let issued = UnixMillis::now().checked_sub(TTL * 2).unwrap();
    let sealed = sealed_token(None, Some(issued));

    let check = enforcer(&agent, &store)
        .enforce(Some(&sealed))
        .await
        .unwrap();

    let window_start = check.token.issued_at.unwrap();
    assert!(UnixMillis::now().saturating_since(window_start) < Duration::from_secs(1));
    // Unbound tokens are charged to the wallet itself.
    assert!(matches!(&agent.calls()[0], Call::Seize(req) if req.user_id == "0xcafe"));
}

#[tokio::test]
async fn test_failed_seizure_still_refills() {
    let agent = ScriptedAgent::succeeding().with_seize(Step::Reject);
    let store = SessionStore::new();
    let sealed = sealed_token(Some("user-1"), Some(ISSUED));

    let check = enforcer(&agent, &store)
        .enforce_at(Some(&sealed), after(TTL * 3))
        .await
        .unwrap();

    assert_eq!(
        check.recharge,
        Some(RechargeReport {
            seized: false,
            refilled: true,
        })
    );
    assert_eq!(agent.seize_count(), 1);
    assert_eq!(agent.top_up_count(), 1);
    assert!(check.reissue);
}

#[tokio::test]
async fn test_recharge_skipped_while_top_up_in_flight() {
    let agent = ScriptedAgent::succeeding();
    let store = SessionStore::new();
    let wallet = WalletKey::new("0xcafe");
    let sealed = sealed_token(Some("user-1"), Some(ISSUED));

    let guard = store.try_swap_guard(&wallet).unwrap();
    let check = enforcer(&agent, &store)
        .enforce_at(Some(&sealed), after(TTL * 2))
        .await
        .unwrap();
    drop(guard);

    assert_eq!(check.recharge, None);
    assert!(!check.reissue);
    assert_eq!(check.token.issued_at, Some(ISSUED));
    assert!(agent.calls().is_empty());
}

#[tokio::test]
async fn test_recharge_skipped_for_suspended_wallet() {
    let agent = ScriptedAgent::succeeding();
    let store = SessionStore::new();
    let wallet = WalletKey::new("0xcafe");
    let breaker = FailureCircuitBreaker::new(store.clone(), 2);
    breaker.record_failure(&wallet);
    breaker.record_failure(&wallet);

    let sealed = sealed_token(Some("user-1"), Some(ISSUED));
    let check = enforcer(&agent, &store)
        .enforce_at(Some(&sealed), after(TTL * 2))
        .await
        .unwrap();

    assert_eq!(check.recharge, None);
    assert!(!check.reissue);
    assert!(agent.calls().is_empty());
}

#[tokio::test]
async fn test_unusable_tokens_mean_no_session() {
    let agent = ScriptedAgent::succeeding();
    let store = SessionStore::new();
    let enforcer = enforcer(&agent, &store);

    assert!(enforcer.enforce(None).await.is_none());
    assert!(enforcer.enforce(Some("not-a-token")).await.is_none());

    let foreign = TokenCipher::new([1u8; 32])
        .seal(&BrowseSessionToken::new(WalletKey::new("0xabc"), None))
        .unwrap();
    assert!(enforcer.enforce(Some(&foreign)).await.is_none());
    assert!(agent.calls().is_empty());
    assert!(store.is_empty());
}
