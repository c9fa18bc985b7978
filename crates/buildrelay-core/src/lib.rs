//! buildrelay core library
//!
//! Domain model, configuration, commit gate and observability shared by the
//! build-system client, the browser automation and the pipeline orchestrator.

pub mod clock;
pub mod config;
pub mod domain;
pub mod facts;
pub mod fakes;
pub mod gate;
pub mod git;
pub mod marker;
pub mod obs;
pub mod progress;
pub mod telemetry;

pub use clock::{AnchoredClock, Clock, SystemClock};
pub use config::{
    example_config, JenkinsConfig, JobParameter, PollingConfig, RelayConfig, RepositoryConfig,
    TemConfig, WebDriverConfig, DEFAULT_CONFIG_FILE,
};
pub use domain::{
    BuildHandle, CommitMarker, Confidence, ConfigError, ExecutionId, GateError, HandleSource,
    Interrupted, MarkerError, Outcome, Stage, TrackingLocation, VcsError,
};
pub use facts::{FactSource, UselessFactsApi};
pub use gate::{should_proceed, CommitGate, GateDecision};
pub use git::{install_aliases, remove_aliases, verify_repository, GitVcs, Vcs};
pub use marker::{FileMarkerStore, MarkerStore};
pub use obs::{
    emit_pipeline_finished, emit_pipeline_started, emit_stage_failed, emit_stage_finished,
    emit_stage_started, RunSpan,
};
pub use progress::{
    format_minutes_seconds, NullObserver, PipelineObserver, ProgressEvent, TracingObserver,
};
pub use telemetry::init_tracing;

/// buildrelay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
