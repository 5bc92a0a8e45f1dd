//! Application Layer
//!
//! Use cases that coordinate the domain: the refresh orchestrator.

mod refresh_orchestrator;

pub use refresh_orchestrator::{
    OrchestratorConfig, OrchestratorHandle, Phase, RefreshOrchestrator, StateSubscriber,
};
