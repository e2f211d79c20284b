//! Graph-structured recurrent neural network runtime: a mutable node/
//! connection arena, two forward-evaluation paths (a generic recurrent
//! evaluator and a packed-slab fast path for static acyclic graphs), a
//! BPTT-lite backward pass with eligibility/extended traces, and a training
//! orchestrator wrapping adaptive optimizers, mixed-precision loss scaling,
//! gradient clipping and error smoothing.
//!
//! Module layout follows `gran-prix`'s split of concerns into `graph`,
//! `optim`, and top-level leaf libraries (`activation`, `cost`) — see
//! `DESIGN.md` for the full grounding ledger.

pub mod activation;
pub mod cost;
pub mod errors;
pub mod graph;
pub mod optim;
pub mod pool;
pub mod train;
pub mod types;

pub use activation::Activation;
pub use cost::Cost;
pub use errors::{EngineError, EngineResult};
pub use graph::connection::Connection;
pub use graph::node::Node;
pub use graph::Network;
pub use optim::clip::{ClipMode, GradClipConfig};
pub use optim::{OptimizerConfig, OptimizerKind};
pub use pool::{ActivationPool, VecPool};
pub use train::orchestrator::{CheckpointHooks, IterationMetrics, ScheduleHook, TrainOptions, TrainResult};
pub use train::smoothing::{SmoothingKind, SmoothingState};
pub use train::{AccumulationReduction, MixedPrecisionConfig, MixedPrecisionState, TrainSetParams};
pub use types::{ConnId, NodeId, NodeKind};
