//! Generation session - state machine, controller, and persistence
//!
//! [`SessionState`] is folded from decoded events by a pure reducer.
//! [`GenerationSessionController`] owns one state, runs the stream readers,
//! and publishes each new state on a [`SessionBus`].

mod bus;
mod controller;
mod messages;
mod state;
mod store;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, SessionBus};
pub use controller::{GenerationSessionController, STREAM_CLOSED_MESSAGE};
pub use messages::SessionError;
pub use state::{Phase, SessionState, fold};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError};
