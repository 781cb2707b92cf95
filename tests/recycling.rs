//! Daily recycling across days, collections and partial failures.

mod common;

use std::sync::Arc;

use common::{FaultyStore, add_consumer, monday, seeded_store, tuesday};
use leadflow::clock::FixedClock;
use leadflow::domain::{Assignment, AssignmentAction, AssignmentKind, AssignmentStatus, PlanTier};
use leadflow::recycling::Recycler;
use leadflow::store::AssignmentStore;

/// Store with consumer `c-1` holding every lead as a subscription assignment
fn holding_store(leads: usize) -> (Arc<FaultyStore>, Vec<String>) {
    let (store, ids) = seeded_store(leads);
    add_consumer(&store, "c-1", PlanTier::Basic);
    let rows: Vec<Assignment> = ids
        .iter()
        .map(|id| Assignment::new("c-1", id.as_str(), AssignmentKind::Subscription))
        .collect();
    store.commit_allocation("c-1", 0, 0, &rows).unwrap();
    (Arc::new(FaultyStore::new(store)), ids)
}

fn park(store: &FaultyStore, kind: AssignmentKind, lead: &str, days: u32) {
    store
        .update_assignment(kind, "c-1", lead, AssignmentStatus::FollowUp, Some(days))
        .unwrap();
}

fn get(store: &FaultyStore, kind: AssignmentKind, lead: &str) -> Assignment {
    store.get_assignment(kind, "c-1", lead).unwrap().unwrap()
}

#[test]
fn test_countdown_of_one_resurfaces_in_same_run() {
    let (store, ids) = holding_store(1);
    park(&store, AssignmentKind::Subscription, &ids[0], 1);

    let report = Recycler::new(store.clone(), Arc::new(FixedClock::on(monday()))).run_daily();

    assert!(report.is_complete());
    let a = get(&store, AssignmentKind::Subscription, &ids[0]);
    assert_eq!(a.countdown_days, Some(0));
    assert_eq!(a.status, AssignmentStatus::New);
    assert_eq!(a.action, AssignmentAction::CallNow);
}

#[test]
fn test_second_run_same_day_is_noop() {
    let (store, ids) = holding_store(1);
    park(&store, AssignmentKind::Subscription, &ids[0], 3);
    let recycler = Recycler::new(store.clone(), Arc::new(FixedClock::on(monday())));

    recycler.run_daily();
    let again = recycler.run_daily();

    assert!(again.subscription.unwrap().already_ran);
    assert_eq!(get(&store, AssignmentKind::Subscription, &ids[0]).countdown_days, Some(2));
}

#[test]
fn test_countdown_runs_down_over_days() {
    let (store, ids) = holding_store(2);
    park(&store, AssignmentKind::Subscription, &ids[0], 2);
    let clock = Arc::new(FixedClock::on(monday()));
    let recycler = Recycler::new(store.clone(), clock.clone());

    recycler.run_daily();
    let after_first = get(&store, AssignmentKind::Subscription, &ids[0]);
    assert_eq!(after_first.countdown_days, Some(1));
    assert_eq!(after_first.action, AssignmentAction::Pending);

    clock.set(tuesday().and_hms_opt(0, 5, 0).unwrap());
    let report = recycler.run_daily();
    assert_eq!(report.subscription.unwrap().reset, 1);
    assert!(get(&store, AssignmentKind::Subscription, &ids[0]).is_actionable());

    // untouched assignment has no countdown and never changes
    let other = get(&store, AssignmentKind::Subscription, &ids[1]);
    assert_eq!(other.countdown_days, None);
    assert!(other.is_actionable());
}

#[test]
fn test_failing_collection_does_not_block_the_other() {
    let (store, ids) = holding_store(1);
    store.record_purchase("c-1", &ids[0]).unwrap();
    park(&store, AssignmentKind::Subscription, &ids[0], 2);
    park(&store, AssignmentKind::Purchased, &ids[0], 2);
    store.fail_collection(AssignmentKind::Purchased);
    let recycler = Recycler::new(store.clone(), Arc::new(FixedClock::on(monday())));

    let report = recycler.run_daily();

    assert!(!report.is_complete());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].collection, AssignmentKind::Purchased);
    assert_eq!(report.subscription.unwrap().decremented, 1);
    assert_eq!(get(&store, AssignmentKind::Purchased, &ids[0]).countdown_days, Some(2));

    // a retry the same day only sweeps what failed
    store.heal();
    let retry = recycler.run_daily();
    assert!(retry.is_complete());
    assert!(retry.subscription.unwrap().already_ran);
    assert_eq!(retry.purchased.unwrap().decremented, 1);
    assert_eq!(get(&store, AssignmentKind::Subscription, &ids[0]).countdown_days, Some(1));
    assert_eq!(get(&store, AssignmentKind::Purchased, &ids[0]).countdown_days, Some(1));
}
