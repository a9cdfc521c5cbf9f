//! Runview core: pure view-reconciliation state machine.
//!
//! Everything the results view decides (which source feeds the table, when
//! to auto-switch modes, when the external queries must refresh) is computed
//! here from one ordered inbox of messages. No IO, no clocks; timers and
//! fetches are requested as [`Effect`]s and their outcomes come back as
//! [`Msg`]s.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use state::{ReconcilerConfig, ReconcilerState, RunPhase, ViewMode};
pub use update::update;
pub use view_model::{RowSource, RunViewModel};
