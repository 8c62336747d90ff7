//! # lwm2m-core
//!
//! Resource and observation core of an LWM2M client. It models the
//! addressable nodes of the object tree, tracks which of them a server has
//! subscribed to via CoAP Observe, and decides when a value change must go
//! out as a notification. Message encoding, DTLS, and transport live in
//! collaborator layers that plug in through [`ObservationHandler`].
#![warn(
    missing_debug_implementations,
    missing_docs,
    missing_copy_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use retx_timer;
pub use tracing;

pub use crate::{
    base::{BaseType, Mode, Operation, ResourceBase, Token, MAX_TOKEN_LEN},
    error::{Error, Result},
    handler::{ObservationHandler, SharedHandler, WeakHandler},
    report::{AttributeError, ReportHandler},
};
pub use retx_timer::{RetransmissionTimer, TimerError, TimerKind};

pub mod base;
pub mod error;
pub mod handler;
pub mod report;
