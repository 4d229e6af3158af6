//! Integration tests for `SqliteStore` and the engines running on top of it,
//! against an in-memory database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone as _, Utc};
use coursegate_core::{
  Error as CoreError,
  account::Account,
  catalog::{Catalog, Product},
  checkout::{ClaimOutcome, LinkAttempt, NewCheckout, PurchaseRecord},
  clock::{Clock as _, ManualClock},
  progress::AdvanceOutcome,
  progression::ProgressionEngine,
  reconcile::Reconciler,
  store::{AccountStore, CheckoutStore, ProgressStore, PurchaseStore},
};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() }

struct Harness {
  store:       Arc<SqliteStore>,
  clock:       Arc<ManualClock>,
  progression: Arc<ProgressionEngine<SqliteStore>>,
  reconciler:  Arc<Reconciler<SqliteStore>>,
}

async fn harness_with(catalog: Catalog) -> Harness {
  let store = Arc::new(store().await);
  let clock = Arc::new(ManualClock::new(t0()));
  let progression =
    ProgressionEngine::new(store.clone(), clock.clone(), Arc::new(catalog));
  let reconciler = Reconciler::new(store.clone(), clock.clone());
  Harness {
    store,
    clock,
    progression: Arc::new(progression),
    reconciler: Arc::new(reconciler),
  }
}

async fn harness() -> Harness { harness_with(Catalog::new()).await }

fn guest_checkout(email: &str) -> NewCheckout {
  NewCheckout {
    checkout_session_id: None,
    email:               email.into(),
    product_key:         "rust-101".into(),
    amount_cents:        4_900,
    currency:            None,
    description:         Some("Rust 101".into()),
  }
}

async fn account(s: &SqliteStore, email: &str) -> Account {
  s.create_account(email, "$argon2id$test".into(), t0())
    .await
    .unwrap()
    .expect("fresh email")
}

// ─── Progress store ──────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_progress_creates_once() {
  let s = store().await;
  let account_id = Uuid::new_v4();

  let first = s.ensure_progress(account_id, "rust-101", t0()).await.unwrap();
  assert_eq!(first.current_module, 1);
  assert_eq!(first.last_completed_at, Some(t0()));
  assert_eq!(first.created_at, t0());

  let later = t0() + Duration::hours(5);
  let again = s.ensure_progress(account_id, "rust-101", later).await.unwrap();
  assert_eq!(again, first);
}

#[tokio::test]
async fn get_progress_missing_returns_none() {
  let s = store().await;
  let result = s.get_progress(Uuid::new_v4(), "rust-101").await.unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn compare_and_advance_checks_expected_module() {
  let s = store().await;
  let account_id = Uuid::new_v4();
  s.ensure_progress(account_id, "rust-101", t0()).await.unwrap();

  let stale = s
    .compare_and_advance(account_id, "rust-101", 2, t0())
    .await
    .unwrap();
  assert!(stale.is_none());

  let at = t0() + Duration::days(1);
  let advanced = s
    .compare_and_advance(account_id, "rust-101", 1, at)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(advanced.current_module, 2);
  assert_eq!(advanced.last_completed_at, Some(at));
}

#[tokio::test]
async fn list_progress_is_per_account() {
  let s = store().await;
  let ada = Uuid::new_v4();
  let bob = Uuid::new_v4();
  s.ensure_progress(ada, "rust-101", t0()).await.unwrap();
  s.ensure_progress(ada, "async-201", t0()).await.unwrap();
  s.ensure_progress(bob, "rust-101", t0()).await.unwrap();

  let records = s.list_progress(ada).await.unwrap();
  let keys: Vec<_> = records.iter().map(|r| r.product_key.as_str()).collect();
  assert_eq!(keys, ["async-201", "rust-101"]);
}

// ─── Progression engine ──────────────────────────────────────────────────────

#[tokio::test]
async fn first_query_starts_at_module_one() {
  let h = harness().await;
  let account_id = Uuid::new_v4();

  let record = h.progression.get_progress(account_id, "rust-101").await.unwrap();
  assert_eq!(record.current_module, 1);
  assert_eq!(record.last_completed_at, Some(t0()));

  h.clock.advance(Duration::hours(30));
  let again = h.progression.get_progress(account_id, "rust-101").await.unwrap();
  assert_eq!(again, record);
}

#[tokio::test]
async fn enrolment_scenario() {
  let h = harness().await;
  let account_id = Uuid::new_v4();
  h.progression.get_progress(account_id, "X").await.unwrap();

  h.clock.set(t0() + Duration::minutes(1));
  let early = h.progression.request_advance(account_id, "X", 2).await.unwrap();
  let AdvanceOutcome::WaitRequired(wait) = early else {
    panic!("expected cooldown, got {early:?}");
  };
  assert_eq!(wait.can_complete_at, t0() + Duration::hours(24));
  assert_eq!(wait.hours_remaining, 23);
  assert_eq!(wait.minutes_remaining, 59);

  let untouched = h.store.get_progress(account_id, "X").await.unwrap().unwrap();
  assert_eq!(untouched.current_module, 1);

  let later = t0() + Duration::hours(25);
  h.clock.set(later);
  let outcome = h.progression.request_advance(account_id, "X", 2).await.unwrap();
  let AdvanceOutcome::Advanced(record) = outcome else {
    panic!("expected advance, got {outcome:?}");
  };
  assert_eq!(record.current_module, 2);
  assert_eq!(record.last_completed_at, Some(later));
}

#[tokio::test]
async fn spaced_advances_step_by_one() {
  let h = harness().await;
  let account_id = Uuid::new_v4();
  h.progression.get_progress(account_id, "rust-101").await.unwrap();

  for expected in 2..=6 {
    h.clock.advance(Duration::hours(24));
    let outcome = h
      .progression
      .request_advance(account_id, "rust-101", expected)
      .await
      .unwrap();
    match outcome {
      AdvanceOutcome::Advanced(r) => assert_eq!(r.current_module, expected),
      other => panic!("expected advance to {expected}, got {other:?}"),
    }
  }
}

#[tokio::test]
async fn immediate_second_advance_hits_cooldown() {
  let h = harness().await;
  let account_id = Uuid::new_v4();
  h.progression.get_progress(account_id, "rust-101").await.unwrap();

  h.clock.advance(Duration::hours(24));
  let first = h.progression.request_advance(account_id, "rust-101", 2).await.unwrap();
  assert!(matches!(first, AdvanceOutcome::Advanced(_)));

  let completed_at = h.clock.now();
  let second = h.progression.request_advance(account_id, "rust-101", 3).await.unwrap();
  let AdvanceOutcome::WaitRequired(wait) = second else {
    panic!("expected cooldown, got {second:?}");
  };
  assert_eq!(wait.can_complete_at, completed_at + Duration::hours(24));
  assert_eq!(wait.total_minutes_remaining, 24 * 60);
}

#[tokio::test]
async fn configured_wait_time_is_used() {
  let store = Arc::new(store().await);
  let clock = Arc::new(ManualClock::new(t0()));
  let engine = ProgressionEngine::new(store, clock.clone(), Arc::new(Catalog::new()))
    .with_wait_time(Duration::minutes(30));
  let account_id = Uuid::new_v4();
  engine.get_progress(account_id, "rust-101").await.unwrap();

  clock.advance(Duration::minutes(29));
  let early = engine.request_advance(account_id, "rust-101", 2).await.unwrap();
  assert!(matches!(early, AdvanceOutcome::WaitRequired(_)));

  clock.advance(Duration::minutes(1));
  let on_time = engine.request_advance(account_id, "rust-101", 2).await.unwrap();
  assert!(matches!(on_time, AdvanceOutcome::Advanced(_)));
}

#[tokio::test]
async fn skipping_or_repeating_a_module_is_rejected() {
  let h = harness().await;
  let account_id = Uuid::new_v4();
  h.progression.get_progress(account_id, "rust-101").await.unwrap();
  h.clock.advance(Duration::days(2));

  for target in [0, 1, 3, 10] {
    let err = h
      .progression
      .request_advance(account_id, "rust-101", target)
      .await
      .unwrap_err();
    assert!(
      matches!(err, CoreError::InvalidTransition { current: 1, requested } if requested == target),
      "target {target}: {err:?}"
    );
  }

  let record = h.store.get_progress(account_id, "rust-101").await.unwrap().unwrap();
  assert_eq!(record.current_module, 1);
  assert_eq!(record.last_completed_at, Some(t0()));
}

#[tokio::test]
async fn catalog_bounds_the_completion_sentinel() {
  let catalog = Catalog::new().with_product("short", Product {
    title:        "Short course".into(),
    module_count: 2,
    description:  None,
  });
  let h = harness_with(catalog).await;
  let account_id = Uuid::new_v4();
  h.progression.get_progress(account_id, "short").await.unwrap();

  // 1 → 2 → 3 (3 is the "finished" sentinel for a two-module course).
  for target in [2, 3] {
    h.clock.advance(Duration::hours(24));
    let outcome = h.progression.request_advance(account_id, "short", target).await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Advanced(_)));
  }

  h.clock.advance(Duration::hours(24));
  let err = h.progression.request_advance(account_id, "short", 4).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::ModuleOutOfRange { requested: 4, module_count: 2, .. }
  ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_advances_move_one_step() {
  let h = harness().await;
  let account_id = Uuid::new_v4();
  h.progression.get_progress(account_id, "rust-101").await.unwrap();
  h.clock.advance(Duration::hours(24));

  let mut tasks = JoinSet::new();
  for _ in 0..16 {
    let engine = h.progression.clone();
    tasks.spawn(async move { engine.request_advance(account_id, "rust-101", 2).await });
  }

  let mut advanced = 0;
  while let Some(joined) = tasks.join_next().await {
    match joined.unwrap() {
      Ok(AdvanceOutcome::Advanced(_)) => advanced += 1,
      Ok(AdvanceOutcome::WaitRequired(_)) | Err(CoreError::InvalidTransition { .. }) => {}
      Err(e) => panic!("unexpected error: {e}"),
    }
  }

  assert_eq!(advanced, 1);
  let record = h.store.get_progress(account_id, "rust-101").await.unwrap().unwrap();
  assert_eq!(record.current_module, 2);
}

// ─── Checkout & purchase stores ──────────────────────────────────────────────

#[tokio::test]
async fn create_checkout_normalises_email() {
  let s = store().await;
  let checkout = s.create_checkout(guest_checkout("  A@X.com "), t0()).await.unwrap();
  assert_eq!(checkout.email, "a@x.com");
  assert!(checkout.account_id.is_none());

  let fetched = s.get_checkout(&checkout.checkout_session_id).await.unwrap();
  assert_eq!(fetched, Some(checkout));
}

#[tokio::test]
async fn redelivered_provider_checkout_is_unchanged() {
  let s = store().await;
  let mut input = guest_checkout("a@x.com");
  input.checkout_session_id = Some("cs_test_1".into());
  let first = s.create_checkout(input.clone(), t0()).await.unwrap();

  input.amount_cents = 1;
  let again = s.create_checkout(input, t0()).await.unwrap();
  assert_eq!(again, first);
}

#[tokio::test]
async fn link_checkout_first_writer_wins() {
  let s = store().await;
  let ada = account(&s, "ada@x.com").await;
  let bob = account(&s, "bob@x.com").await;
  let checkout = s.create_checkout(guest_checkout("a@x.com"), t0()).await.unwrap();
  let id = checkout.checkout_session_id.as_str();

  let first = s.link_checkout(id, ada.account_id).await.unwrap();
  assert!(matches!(first, LinkAttempt::Linked(ref c) if c.account_id == Some(ada.account_id)));

  let second = s.link_checkout(id, bob.account_id).await.unwrap();
  assert!(
    matches!(second, LinkAttempt::AlreadyLinked(ref c) if c.account_id == Some(ada.account_id))
  );

  let missing = s.link_checkout("cs_nope", ada.account_id).await.unwrap();
  assert_eq!(missing, LinkAttempt::NotFound);
}

#[tokio::test]
async fn purchase_requires_matching_link() {
  let s = store().await;
  let ada = account(&s, "ada@x.com").await;
  let bob = account(&s, "bob@x.com").await;
  let checkout = s.create_checkout(guest_checkout("a@x.com"), t0()).await.unwrap();

  // Unlinked: nothing is written.
  let early = PurchaseRecord::from_checkout(&checkout, ada.account_id, Utc::now());
  assert!(!s.insert_purchase_if_absent(early).await.unwrap());

  s.link_checkout(&checkout.checkout_session_id, ada.account_id).await.unwrap();

  // Linked to someone else: nothing is written.
  let wrong = PurchaseRecord::from_checkout(&checkout, bob.account_id, Utc::now());
  assert!(!s.insert_purchase_if_absent(wrong).await.unwrap());

  let right = PurchaseRecord::from_checkout(&checkout, ada.account_id, Utc::now());
  assert!(s.insert_purchase_if_absent(right.clone()).await.unwrap());

  let duplicate = PurchaseRecord::from_checkout(&checkout, ada.account_id, Utc::now());
  assert!(!s.insert_purchase_if_absent(duplicate).await.unwrap());

  let stored = s
    .purchase_for_checkout(&checkout.checkout_session_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored, right);
}

#[tokio::test]
async fn duplicate_account_email_is_refused() {
  let s = store().await;
  account(&s, "ada@x.com").await;
  let dup = s.create_account(" ADA@x.com", "$argon2id$other".into(), t0()).await.unwrap();
  assert!(dup.is_none());

  let found = s.find_account_by_email("Ada@X.com").await.unwrap().unwrap();
  assert_eq!(found.email, "ada@x.com");
  assert_eq!(found.password_hash, "$argon2id$test");
}

// ─── Reconciliation engine ───────────────────────────────────────────────────

#[tokio::test]
async fn guest_checkout_scenario() {
  let h = harness().await;
  let c1 = h.store.create_checkout(guest_checkout("a@x.com"), t0()).await.unwrap();
  let u1 = account(&h.store, "a@x.com").await;

  let first = h.reconciler.link_account(u1.account_id, "a@x.com").await.unwrap();
  assert_eq!(first.linked_count, 1);

  let p1 = h
    .store
    .purchase_for_checkout(&c1.checkout_session_id)
    .await
    .unwrap()
    .expect("purchase created");
  assert_eq!(p1.account_id, u1.account_id);
  assert_eq!(p1.purchased_at, c1.created_at);
  assert_eq!(p1.amount_cents, c1.amount_cents);

  let second = h.reconciler.link_account(u1.account_id, "a@x.com").await.unwrap();
  assert_eq!(second.linked_count, 0);
  assert_eq!(second.repaired_count, 0);

  let purchases = h.store.list_purchases(u1.account_id).await.unwrap();
  assert_eq!(purchases, vec![p1]);
}

#[tokio::test]
async fn link_account_matches_email_case_insensitively() {
  let h = harness().await;
  h.store.create_checkout(guest_checkout("Ada@X.com"), t0()).await.unwrap();
  h.store.create_checkout(guest_checkout("ada@x.com"), t0()).await.unwrap();
  h.store.create_checkout(guest_checkout("bob@x.com"), t0()).await.unwrap();
  let ada = account(&h.store, "ada@x.com").await;

  let report = h.reconciler.link_account(ada.account_id, "ADA@x.com ").await.unwrap();
  assert_eq!(report.linked_count, 2);
  assert_eq!(h.store.list_purchases(ada.account_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn link_account_unknown_account_has_no_effect() {
  let h = harness().await;
  let checkout = h.store.create_checkout(guest_checkout("a@x.com"), t0()).await.unwrap();
  let ghost = Uuid::new_v4();

  let err = h.reconciler.link_account(ghost, "a@x.com").await.unwrap_err();
  assert!(matches!(err, CoreError::AccountNotFound(id) if id == ghost));

  let still = h.store.get_checkout(&checkout.checkout_session_id).await.unwrap().unwrap();
  assert!(still.account_id.is_none());
}

#[tokio::test]
async fn link_specific_checkout_ignores_email() {
  let h = harness().await;
  let checkout = h.store.create_checkout(guest_checkout("typo@x.con"), t0()).await.unwrap();
  let ada = account(&h.store, "ada@x.com").await;
  let id = checkout.checkout_session_id.as_str();

  assert!(h.reconciler.link_specific_checkout(id, ada.account_id).await.unwrap());
  // Same account again: success, no second purchase.
  assert!(h.reconciler.link_specific_checkout(id, ada.account_id).await.unwrap());
  assert_eq!(h.store.list_purchases(ada.account_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn link_specific_checkout_owned_elsewhere_is_skipped() {
  let h = harness().await;
  let checkout = h.store.create_checkout(guest_checkout("ada@x.com"), t0()).await.unwrap();
  let ada = account(&h.store, "ada@x.com").await;
  let bob = account(&h.store, "bob@x.com").await;
  let id = checkout.checkout_session_id.as_str();

  assert!(h.reconciler.link_specific_checkout(id, ada.account_id).await.unwrap());
  assert!(!h.reconciler.link_specific_checkout(id, bob.account_id).await.unwrap());

  assert!(h.store.list_purchases(bob.account_id).await.unwrap().is_empty());
  let purchase = h.store.purchase_for_checkout(id).await.unwrap().unwrap();
  assert_eq!(purchase.account_id, ada.account_id);
}

#[tokio::test]
async fn link_specific_checkout_unknown_checkout() {
  let h = harness().await;
  let ada = account(&h.store, "ada@x.com").await;

  let err = h
    .reconciler
    .link_specific_checkout("cs_missing", ada.account_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::CheckoutNotFound(ref id) if id == "cs_missing"));
}

#[tokio::test]
async fn claim_checkout_distinguishes_fresh_links() {
  let h = harness().await;
  let checkout = h.store.create_checkout(guest_checkout("ada@x.com"), t0()).await.unwrap();
  let ada = account(&h.store, "ada@x.com").await;
  let bob = account(&h.store, "bob@x.com").await;
  let id = checkout.checkout_session_id.as_str();

  let first = h.reconciler.claim_checkout(id, ada.account_id).await.unwrap();
  assert_eq!(first, ClaimOutcome::Linked);
  assert!(first.is_new_link());

  let again = h.reconciler.claim_checkout(id, ada.account_id).await.unwrap();
  assert_eq!(again, ClaimOutcome::AlreadyOwned);
  assert!(again.is_owned() && !again.is_new_link());

  let other = h.reconciler.claim_checkout(id, bob.account_id).await.unwrap();
  assert_eq!(other, ClaimOutcome::OwnedElsewhere);
  assert!(!other.is_owned());
}

#[tokio::test]
async fn records_are_stamped_by_the_caller_clock() {
  let h = harness().await;
  let checkout = h
    .store
    .create_checkout(guest_checkout("ada@x.com"), h.clock.now())
    .await
    .unwrap();
  assert_eq!(checkout.created_at, t0());

  h.clock.advance(Duration::hours(2));
  let ada = h
    .store
    .create_account("ada@x.com", "$argon2id$test".into(), h.clock.now())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(ada.created_at, t0() + Duration::hours(2));

  h.clock.advance(Duration::minutes(5));
  h.reconciler.link_account(ada.account_id, "ada@x.com").await.unwrap();
  let purchase = h
    .store
    .purchase_for_checkout(&checkout.checkout_session_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(purchase.purchased_at, t0());
  assert_eq!(purchase.recorded_at, t0() + Duration::minutes(125));
  assert!(purchase.recorded_at >= purchase.purchased_at);
}

#[tokio::test]
async fn interrupted_link_is_repaired() {
  let h = harness().await;
  let checkout = h.store.create_checkout(guest_checkout("ada@x.com"), t0()).await.unwrap();
  let ada = account(&h.store, "ada@x.com").await;

  // Linked, then "crashed" before the purchase was written.
  h.store
    .link_checkout(&checkout.checkout_session_id, ada.account_id)
    .await
    .unwrap();

  let report = h.reconciler.link_account(ada.account_id, "ada@x.com").await.unwrap();
  assert_eq!(report.linked_count, 0);
  assert_eq!(report.repaired_count, 1);
  assert!(
    h.store
      .purchase_for_checkout(&checkout.checkout_session_id)
      .await
      .unwrap()
      .is_some()
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entry_points_create_one_purchase() {
  let h = harness().await;
  let checkout = h.store.create_checkout(guest_checkout("ada@x.com"), t0()).await.unwrap();
  let ada = account(&h.store, "ada@x.com").await;
  let account_id = ada.account_id;

  let mut tasks = JoinSet::new();
  for i in 0..12 {
    let reconciler = h.reconciler.clone();
    let id = checkout.checkout_session_id.clone();
    tasks.spawn(async move {
      if i % 2 == 0 {
        reconciler.link_account(account_id, "ada@x.com").await.map(|r| r.linked_count)
      } else {
        reconciler
          .link_specific_checkout(&id, account_id)
          .await
          .map(usize::from)
      }
    });
  }
  while let Some(joined) = tasks.join_next().await {
    joined.unwrap().unwrap();
  }

  let purchases = h.store.list_purchases(account_id).await.unwrap();
  assert_eq!(purchases.len(), 1);
  assert_eq!(purchases[0].checkout_session_id, checkout.checkout_session_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sweeps_link_each_checkout_once() {
  let h = harness().await;
  for _ in 0..5 {
    h.store.create_checkout(guest_checkout("ada@x.com"), t0()).await.unwrap();
  }
  let ada = account(&h.store, "ada@x.com").await;
  let account_id = ada.account_id;

  let mut tasks = JoinSet::new();
  for _ in 0..8 {
    let reconciler = h.reconciler.clone();
    tasks.spawn(async move { reconciler.link_account(account_id, "ada@x.com").await });
  }

  let mut total = 0;
  while let Some(joined) = tasks.join_next().await {
    total += joined.unwrap().unwrap().linked_count;
  }

  assert_eq!(total, 5);
  assert_eq!(h.store.list_purchases(account_id).await.unwrap().len(), 5);
}
