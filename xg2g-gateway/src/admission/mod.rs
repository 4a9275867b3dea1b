//! Session admission: ordered capacity rules over a runtime snapshot.

pub mod controller;
pub mod runtime;

pub use controller::{AdmissionController, AdmissionDecision, AdmissionLimits, AdmissionRequest};
pub use runtime::{RuntimeCounters, RuntimeState};
