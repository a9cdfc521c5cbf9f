use runview_core::{update, Effect, Msg, ReconcilerState, ViewMode};

fn live_run() -> ReconcilerState {
    let state = update(ReconcilerState::new(), Msg::StreamConnected).0;
    update(
        state,
        Msg::StreamRecord {
            live_count: 1,
            records_extracted: 1,
        },
    )
    .0
}

#[test]
fn page_change_forces_paginated_and_refetches() {
    let state = live_run();
    let (state, effects) = update(state, Msg::PageChanged { page: 2 });

    assert_eq!(state.mode(), ViewMode::Paginated);
    assert_eq!(state.page(), 2);
    assert_eq!(
        effects,
        vec![Effect::RefetchResults {
            page: 2,
            page_size: 25
        }]
    );
}

#[test]
fn page_size_change_resets_to_first_page() {
    let state = live_run();
    let (state, _effects) = update(state, Msg::PageChanged { page: 3 });
    let (state, effects) = update(state, Msg::PageSizeChanged { page_size: 50 });

    assert_eq!(state.page(), 0);
    assert_eq!(state.page_size(), 50);
    assert_eq!(
        effects,
        vec![Effect::RefetchResults {
            page: 0,
            page_size: 50
        }]
    );
}

#[test]
fn toggle_flips_the_mode_unconditionally() {
    let state = live_run();
    assert_eq!(state.mode(), ViewMode::Live);

    let (state, effects) = update(state, Msg::ViewToggled);
    assert!(effects.is_empty());
    assert_eq!(state.mode(), ViewMode::Paginated);

    let (state, _effects) = update(state, Msg::ViewToggled);
    assert_eq!(state.mode(), ViewMode::Live);
}

#[test]
fn manual_refresh_refetches_both_sources() {
    let state = live_run();
    let (_state, effects) = update(state, Msg::RefreshRequested);

    assert_eq!(
        effects,
        vec![
            Effect::RefetchResults {
                page: 0,
                page_size: 25
            },
            Effect::RefetchRunMetadata,
        ]
    );
}

#[test]
fn dismissed_warning_stays_hidden_until_a_new_one() {
    let state = live_run();
    let (state, _effects) = update(
        state,
        Msg::StreamParseFailed {
            message: "first".to_string(),
        },
    );
    let (state, _effects) = update(state, Msg::WarningDismissed);
    assert_eq!(state.view().warning, None);

    // Dismissing is per-message: different trouble resurfaces the banner.
    let (state, _effects) = update(
        state,
        Msg::StreamParseFailed {
            message: "second".to_string(),
        },
    );
    assert_eq!(state.view().warning.as_deref(), Some("second"));
}

#[test]
fn query_outcomes_update_the_mirror() {
    let state = ReconcilerState::new();
    let (state, _effects) = update(state, Msg::ResultsLoading);
    assert!(state.view().is_loading);

    let (state, _effects) = update(
        state,
        Msg::ResultsLoaded {
            total: 101,
            page: 1,
            page_size: 25,
        },
    );
    let view = state.view();
    assert!(!view.is_loading);
    assert_eq!(view.persisted_total, 101);
    assert_eq!(view.page_count, 5);

    let (state, _effects) = update(
        state,
        Msg::ResultsFailed {
            message: "backend unavailable".to_string(),
        },
    );
    let view = state.view();
    assert!(!view.is_loading);
    assert_eq!(view.warning.as_deref(), Some("backend unavailable"));
}

#[test]
fn unbinding_restores_the_baseline() {
    let state = live_run();
    let (state, _effects) = update(state, Msg::PageChanged { page: 4 });
    let (state, effects) = update(state, Msg::RunUnbound);

    assert!(effects.is_empty());
    assert_eq!(state, ReconcilerState::new());
}

#[test]
fn update_is_noop() {
    let state = ReconcilerState::new();
    let (next, effects) = update(state.clone(), Msg::NoOp);

    assert_eq!(state, next);
    assert!(effects.is_empty());
}
