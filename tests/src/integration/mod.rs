//! Cross-component scenarios against the in-memory store and mock ports.

mod monitoring_scenario;
mod unsubscribe_flow;
