//! Health checking for services.
//!
//! A [`Checker`] owns a set of named [`Check`]s and reduces their latest state to a single aggregate
//! [`CheckerResult`]. Checks either run in the foreground, whenever a fresh result is needed, or periodically in the
//! background. Results are cached for a configurable duration, status changes are reported to listeners, and check
//! invocations can be wrapped with [`interceptor`]s.
//!
//! [`Handler`] serves results over HTTP, with its own [`middleware`] chain and a pluggable [`ResultWriter`].
#![deny(missing_docs)]

mod cache;
mod check;
pub use self::check::{Check, CheckContext, CheckStatusListener, Probe, ProbeFuture, ProbeReport};

mod checker;
pub use self::checker::{Checker, CheckerResult, StatusListener};

mod config;
pub use self::config::{CheckerBuilder, CheckerConfiguration};

mod error;
pub use self::error::{ConfigurationError, GenericError};

mod handler;
pub use self::handler::{Handler, HandlerBuilder, JsonResultWriter, ResultWriter};

pub mod interceptor;
pub mod middleware;
mod runner;
mod scheduler;

mod state;
pub use self::state::CheckState;

mod status;
pub use self::status::{aggregate, AvailabilityStatus};

mod telemetry;

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;
