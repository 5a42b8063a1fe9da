//! Data types for the topic state store
//!
//! This module contains the records persisted by both on-disk layouts.

mod event_state;
mod level;
mod topic_state;

pub use event_state::EventState;
pub use level::{Level, UnknownLevel};
pub use topic_state::TopicState;
