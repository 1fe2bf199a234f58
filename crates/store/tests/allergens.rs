#![forbid(unsafe_code)]

use std::sync::Arc;

use palate_api::{ApiError, MockApi};
use palate_core::{Substitute, SubstituteSet};
use palate_store::{AllergenStore, FetchState};

fn set_for(name: &str) -> SubstituteSet {
    SubstituteSet {
        category: "test".into(),
        matched_entity: name.into(),
        substitutes: vec![Substitute {
            name: format!("{} substitute", name),
            description: "stands in nicely".into(),
            link: None,
        }],
    }
}

fn mock() -> MockApi {
    let mut api = MockApi::new();
    api.substitutes.insert("egg".into(), set_for("egg"));
    api.substitutes.insert("milk".into(), set_for("milk"));
    api
}

#[tokio::test(flavor = "current_thread")]
async fn toggle_on_fetches_once_and_reuses_across_toggles() {
    let api = Arc::new(mock());
    let store = AllergenStore::new(api.clone());

    assert!(store.toggle("egg"));
    let settled = store.wait_settled("egg").await;
    assert!(matches!(settled, FetchState::Ready(_)));
    assert_eq!(api.substitute_calls(), 1);

    // Deselect keeps the cached substitutes.
    assert!(!store.toggle("egg"));
    let egg = store.entry("egg");
    assert!(!egg.selected);
    assert!(matches!(egg.state, FetchState::Ready(_)));

    // Reselect reuses them without another call.
    assert!(store.toggle("egg"));
    assert!(matches!(store.state("egg"), FetchState::Ready(_)));
    assert_eq!(api.substitute_calls(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn reselect_after_error_retries() {
    let api = Arc::new(mock());
    api.substitute_failures.lock().unwrap().insert("egg".into(), 1);
    let store = AllergenStore::new(api.clone());

    store.toggle("egg");
    let first = store.wait_settled("egg").await;
    assert!(matches!(first, FetchState::Error(ApiError::Remote { status: 500, .. })));

    // Toggling off and on again is the retry gesture.
    store.toggle("egg");
    store.toggle("egg");
    let second = store.wait_settled("egg").await;
    assert!(matches!(second, FetchState::Ready(_)));
    assert_eq!(api.substitute_calls(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn names_have_independent_lifecycles() {
    let api = Arc::new(mock());
    api.substitute_failures.lock().unwrap().insert("egg".into(), u32::MAX);
    let store = AllergenStore::new(api.clone());

    store.toggle("egg");
    store.toggle("milk");
    let egg = store.wait_settled("egg").await;
    let milk = store.wait_settled("milk").await;

    assert!(matches!(egg, FetchState::Error(_)));
    match milk {
        FetchState::Ready(set) => assert_eq!(set.matched_entity, "milk"),
        other => panic!("milk should be ready, got {:?}", other),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn selected_list_is_sorted_for_exclusions() {
    let api = Arc::new(mock());
    let store = AllergenStore::new(api);

    store.toggle("peanut");
    store.toggle("egg");
    store.toggle("milk");
    assert_eq!(store.selected(), vec!["egg", "milk", "peanut"]);

    store.toggle("milk");
    assert_eq!(store.selected(), vec!["egg", "peanut"]);
}

#[tokio::test(flavor = "current_thread")]
async fn entries_cover_deselected_names_with_history() {
    let api = Arc::new(mock());
    let store = AllergenStore::new(api);

    store.toggle("egg");
    store.wait_settled("egg").await;
    store.toggle("egg");
    store.toggle("peanut");

    let entries = store.entries();
    let egg = entries.iter().find(|e| e.name == "egg").unwrap();
    assert!(!egg.selected);
    assert!(matches!(egg.state, FetchState::Ready(_)));

    // Selected but the lookup has not settled (or was never started).
    let peanut = entries.iter().find(|e| e.name == "peanut").unwrap();
    assert!(peanut.selected);
}
