//! Ports: the trait boundary between the pipeline and its collaborators.

pub mod outbound;

pub use outbound::{
    Mailer, MessageSource, RawKeyFetcher, Storage, SystemTimeSource, TimeSource,
};
