use crate::{Effect, Msg, ReconcilerState, RunPhase, ViewMode};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ReconcilerState, msg: Msg) -> (ReconcilerState, Vec<Effect>) {
    let effects = match msg {
        Msg::StreamConnected => {
            // A fresh connection resets the live mirror and reasserts the
            // live view, overriding any earlier manual pagination.
            state.connected = true;
            state.stream_phase = Some(RunPhase::Pending);
            state.stream_records_extracted = 0;
            state.live_count = 0;
            state.total_expected = None;
            state.run_error = None;
            state.warning = None;
            state.dismissed_warning = None;
            state.refetch_latched = false;
            state.settle_epoch += 1;
            state.mode = ViewMode::Live;
            Vec::new()
        }
        Msg::StreamRecord {
            live_count,
            records_extracted,
        } => {
            state.live_count = live_count;
            state.stream_records_extracted = records_extracted;
            if !state.stream_phase.is_some_and(RunPhase::is_terminal) {
                state.stream_phase = Some(RunPhase::Running);
            }
            Vec::new()
        }
        Msg::StreamStatus {
            phase,
            records_extracted,
            error,
        } => {
            let was_terminal = state.stream_phase.is_some_and(RunPhase::is_terminal);
            state.stream_phase = Some(phase);
            state.stream_records_extracted = records_extracted;
            state.run_error = error;
            if phase.is_terminal() && !was_terminal {
                terminal_transition(&mut state)
            } else {
                Vec::new()
            }
        }
        Msg::StreamCompleted {
            total_records,
            live_count,
        } => {
            let was_terminal = state.stream_phase.is_some_and(RunPhase::is_terminal);
            state.connected = false;
            state.total_expected = Some(total_records);
            state.live_count = live_count;
            if was_terminal {
                Vec::new()
            } else {
                state.stream_phase = Some(RunPhase::Completed);
                state.stream_records_extracted = total_records;
                terminal_transition(&mut state)
            }
        }
        Msg::StreamParseFailed { message } => {
            state.warning = Some(message);
            Vec::new()
        }
        Msg::StreamTransportFailed { message } => {
            state.connected = false;
            state.warning = Some(message);
            Vec::new()
        }
        Msg::PageChanged { page } => {
            state.page = page;
            state.mode = ViewMode::Paginated;
            state.settle_epoch += 1;
            vec![Effect::RefetchResults {
                page,
                page_size: state.page_size,
            }]
        }
        Msg::PageSizeChanged { page_size } => {
            state.page_size = page_size;
            state.page = 0;
            state.mode = ViewMode::Paginated;
            state.settle_epoch += 1;
            vec![Effect::RefetchResults { page: 0, page_size }]
        }
        Msg::ViewToggled => {
            state.mode = match state.mode {
                ViewMode::Live => ViewMode::Paginated,
                ViewMode::Paginated => ViewMode::Live,
            };
            state.settle_epoch += 1;
            Vec::new()
        }
        Msg::RefreshRequested => {
            vec![
                Effect::RefetchResults {
                    page: state.page,
                    page_size: state.page_size,
                },
                Effect::RefetchRunMetadata,
            ]
        }
        Msg::WarningDismissed => {
            state.dismissed_warning = state.warning.clone();
            Vec::new()
        }
        Msg::SettleElapsed { epoch } => {
            if epoch == state.settle_epoch
                && state.stream_phase.is_some_and(RunPhase::is_terminal)
            {
                state.mode = ViewMode::Paginated;
            }
            Vec::new()
        }
        Msg::ResultsLoading => {
            state.results_loading = true;
            Vec::new()
        }
        Msg::ResultsLoaded {
            total,
            page,
            page_size,
        } => {
            state.results_loading = false;
            state.persisted_total = total;
            state.page = page;
            state.page_size = page_size;
            Vec::new()
        }
        Msg::ResultsFailed { message } => {
            state.results_loading = false;
            state.warning = Some(message);
            Vec::new()
        }
        Msg::MetadataLoading => {
            state.metadata_loading = true;
            Vec::new()
        }
        Msg::MetadataLoaded {
            phase,
            records_extracted,
            error,
            updated_at,
            source_urls,
        } => {
            state.metadata_loading = false;
            state.metadata_phase = Some(phase);
            state.metadata_records_extracted = records_extracted;
            state.metadata_error = error;
            state.updated_at = updated_at;
            state.source_urls = source_urls;
            Vec::new()
        }
        Msg::MetadataFailed { message } => {
            state.metadata_loading = false;
            state.warning = Some(message);
            Vec::new()
        }
        Msg::RunUnbound => {
            state.reset();
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

/// A terminal phase just showed up on the live stream: refresh the persisted
/// sources exactly once per connection and arm the settle timer that will
/// hand the table over to them.
fn terminal_transition(state: &mut ReconcilerState) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(3);
    if !state.refetch_latched {
        state.refetch_latched = true;
        effects.push(Effect::RefetchResults {
            page: state.page,
            page_size: state.page_size,
        });
        effects.push(Effect::RefetchRunMetadata);
    }
    state.settle_epoch += 1;
    effects.push(Effect::ScheduleSettle {
        epoch: state.settle_epoch,
        delay: state.config.settle_delay,
    });
    effects
}
