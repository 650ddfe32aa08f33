//! `spine-runtime` – from authorized intent to executed contract.
//!
//! # Modules
//!
//! - [`resolver`] – [`CapabilityResolver`][resolver::CapabilityResolver]:
//!   capability name → ordered candidate cluster types, filtered by the
//!   intent's `HARDWARE` statement; first survivor wins.
//! - [`issuer`] – [`ContractIssuer`][issuer::ContractIssuer]: builds the
//!   four cross-referencing contracts from an authorized intent.
//! - [`execution`] – [`ExecutionSpine`][execution::ExecutionSpine]:
//!   validates a bundle, dispatches it to an adapter and logs the
//!   lifecycle.
//! - [`pipeline`] – [`Pipeline`][pipeline::Pipeline]: parse → authorize →
//!   resolve → issue → execute, with failure events at every stage.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod execution;
pub mod issuer;
pub mod pipeline;
pub mod resolver;
pub mod telemetry;

pub use execution::ExecutionSpine;
pub use issuer::{ContractIssuer, DEFAULT_DEADLINE_SECONDS};
pub use pipeline::{AdapterMode, INTAKE_KEY, Pipeline, PipelineConfig, Submission, intake_key};
pub use resolver::{CapabilityResolver, DEFAULT_CAPABILITY, ResolvedCapability};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
