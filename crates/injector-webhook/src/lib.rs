//! Mutating admission webhook injecting the op CLI into Pods
//!
//! Pods opting in through the `operator.1password.io/inject` annotation get:
//! - an in-memory `op-bin` volume and a `copy-op-bin` init container filling it
//! - their selected containers' commands wrapped with `op run --`
//! - `OP_CONNECT_HOST` / `OP_CONNECT_TOKEN` where the user has not set them
//! - `operator.1password.io/status: injected`, so re-admission is a no-op
//!
//! Everything is expressed as a JSON patch; the pod itself is never modified.

#![deny(missing_docs)]

pub mod container;
pub mod credentials;
pub mod defaults;
pub mod error;
pub mod handler;
pub mod mutate;
pub mod patch;
pub mod policy;

pub use error::{Result, WebhookError};
pub use handler::{webhook_router, WebhookState};
pub use mutate::{Decision, Mutator, SkipReason};
pub use patch::{PatchOp, PatchValue};
