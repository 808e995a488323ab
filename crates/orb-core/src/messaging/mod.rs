//! Messenger abstractions: the inbound event model, the outbound port, and
//! decorators stacked on top of a concrete messenger.

pub mod deadline;
pub mod port;
pub mod throttled;
pub mod types;
