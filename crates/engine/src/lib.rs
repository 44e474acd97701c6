pub mod batch;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod request;
pub mod speculative;

pub use batch::{BatchPlan, execute_batch, plan_batch};
pub use client::{MutationClient, MutationPhase};
pub use config::EngineConfig;
pub use dispatch::StoreCall;
pub use error::EngineError;
pub use executor::{execute, plan_single};
pub use request::{MutationOptions, MutationOutput, MutationRequest, MutationResult, Payload};
pub use speculative::{CacheEdit, Rollback, SpeculativeEdit, from_fn};
