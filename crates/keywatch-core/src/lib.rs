//! # Keywatch Core
//!
//! Domain model, ports, and batch sweep services for the key monitoring
//! pipeline. The crate is laid out hexagonally:
//!
//! - `domain/` — entities, validated value types, and the error taxonomy.
//!   Pure data and rules, no I/O.
//! - `ports/` — the trait boundary to the outside world: persistence, key
//!   retrieval, outbound mail, the registration source, and the clock.
//! - `adapters/` — the in-memory store (also the snapshotable production
//!   store) and mock collaborators for tests.
//! - `service/` — one module per pipeline component: scheduler, expiry
//!   sweep, lookup executor, change detector, notifier, registration
//!   processor, unsubscribe processor.
//!
//! ## Pipeline
//!
//! ```text
//! Registration ──→ User/Email ──→ LookupTask ──→ Key ──→ KeyChange ──→ Notification
//!      ↑                              │(jittered      (UNCHECKED       (emailed to every
//!  MessageSource                      │ or immediate)  → CHECKED)       ACTIVE address)
//!                                     │
//!                            Expiry sweep reclassifies
//!                            overdue PENDING → EXPIRED
//! ```
//!
//! Unsubscribe is an independent side channel reached by token; the axum
//! endpoint for it lives in the gateway crate.
//!
//! Sweeps are synchronous, run-to-completion, and must not run concurrently
//! with themselves; they take `&mut` on the store so in-process exclusion
//! holds by construction.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
