//! Training orchestrator: the iteration loop wrapping `train_set` with
//! error smoothing, early stopping, plateau detection, and external-hook
//! call sites. No direct teacher analogue — grounded on the `Sequential`
//! iteration-loop idiom (`gran-prix/src/models/mod.rs`) extended per
//! `spec.md` §4.7, with hook-calling sites shaped after how
//! `GraphOptimizer::optimize`/`Verifier::verify` (`src/graph/optimizer.rs`,
//! `src/graph/verifier.rs`) are standalone units taking `&mut Graph`.

use crate::cost::Cost;
use crate::errors::{EngineError, EngineResult};
use crate::graph::Network;
use crate::optim::clip::GradClipConfig;
use crate::optim::OptimizerConfig;
use crate::train::smoothing::{smooth, SmoothingKind, SmoothingState};
use crate::train::{AccumulationReduction, MixedPrecisionConfig, MixedPrecisionState, TrainSetParams};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type HookResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, Copy, Debug)]
pub struct IterationMetrics {
    pub iteration: u64,
    pub error: f64,
    pub plateau_error: f64,
    pub grad_norm: f64,
}

pub struct CheckpointHooks {
    pub last: bool,
    pub best: bool,
    pub save: Box<dyn FnMut(&Network, u64) -> HookResult>,
}

pub struct ScheduleHook {
    pub iterations: u64,
    pub function: Box<dyn FnMut(&mut Network, u64) -> HookResult>,
}

pub struct TrainOptions {
    pub iterations: Option<u64>,
    pub target_error: Option<f64>,
    pub rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub optimizer: OptimizerConfig,
    pub dropout: f64,
    pub batch_size: usize,
    pub accumulation_steps: usize,
    pub accumulation_reduction: AccumulationReduction,
    pub gradient_clip: Option<GradClipConfig>,
    pub mixed_precision: Option<MixedPrecisionConfig>,
    pub cost: Cost,

    pub moving_average_window: usize,
    pub moving_average_type: SmoothingKind,
    pub ema_alpha: Option<f64>,
    pub trimmed_ratio: f64,

    pub plateau_moving_average_window: usize,
    pub plateau_moving_average_type: SmoothingKind,
    pub plateau_ema_alpha: Option<f64>,

    pub early_stop_patience: Option<u64>,
    pub early_stop_min_delta: f64,

    pub checkpoint: Option<CheckpointHooks>,
    pub schedule: Option<ScheduleHook>,
    pub metrics_hook: Option<Box<dyn FnMut(IterationMetrics) -> HookResult>>,

    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions {
            iterations: None,
            target_error: None,
            rate: 0.3,
            momentum: 0.0,
            weight_decay: 0.0,
            optimizer: OptimizerConfig::default(),
            dropout: 0.0,
            batch_size: 1,
            accumulation_steps: 1,
            accumulation_reduction: AccumulationReduction::Average,
            gradient_clip: None,
            mixed_precision: None,
            cost: Cost::Mse,
            moving_average_window: 1,
            moving_average_type: SmoothingKind::Ema,
            ema_alpha: None,
            trimmed_ratio: 0.1,
            plateau_moving_average_window: 1,
            plateau_moving_average_type: SmoothingKind::Ema,
            plateau_ema_alpha: None,
            early_stop_patience: None,
            early_stop_min_delta: 0.0,
            checkpoint: None,
            schedule: None,
            metrics_hook: None,
            cancel: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TrainResult {
    pub error: f64,
    pub iterations: u64,
    pub time_ms: u64,
}

impl TrainOptions {
    fn validate(&self, dataset_len: usize) -> EngineResult<()> {
        if dataset_len == 0 {
            return Err(EngineError::InvalidOption("dataset is empty".into()));
        }
        if self.iterations.is_none() && self.target_error.is_none() {
            return Err(EngineError::InvalidOption("neither iterations nor target_error supplied".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(EngineError::InvalidOption("dropout must be in [0, 1)".into()));
        }
        if self.batch_size > dataset_len {
            return Err(EngineError::InvalidOption("batch_size exceeds dataset length".into()));
        }
        if self.accumulation_steps < 1 {
            return Err(EngineError::InvalidOption("accumulation_steps must be >= 1".into()));
        }
        if self.optimizer.kind.is_nested_lookahead() {
            return Err(EngineError::NestedLookahead);
        }
        Ok(())
    }
}

impl Network {
    pub fn train(&mut self, dataset: &[(Vec<f64>, Vec<f64>)], mut opts: TrainOptions) -> EngineResult<TrainResult> {
        opts.validate(dataset.len())?;

        self.dropout = opts.dropout;
        self.current_grad_clip = opts.gradient_clip.clone();
        self.mixed_precision = opts.mixed_precision.clone().map(|cfg| MixedPrecisionState { cfg, ..Default::default() });

        let mut ma_buffer: VecDeque<f64> = VecDeque::with_capacity(opts.moving_average_window.max(1));
        let mut plateau_buffer: VecDeque<f64> = VecDeque::with_capacity(opts.plateau_moving_average_window.max(1));
        let mut ma_state = SmoothingState::default();
        let mut plateau_state = SmoothingState::default();

        let mut best = f64::INFINITY;
        let mut no_improve: u64 = 0;
        let mut monitored_error = f64::INFINITY;
        let mut plateau_error = f64::INFINITY;
        let mut performed: u64 = 0;

        let max_iterations = opts.iterations.unwrap_or(u64::MAX);

        for iter in 1..=max_iterations {
            if let Some(cancel) = &opts.cancel {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
            }

            self.call_maybe_prune(self.global_epoch + iter);

            let params = TrainSetParams {
                dataset,
                batch_size: opts.batch_size,
                accumulation_steps: opts.accumulation_steps,
                accumulation_reduction: opts.accumulation_reduction,
                rate: opts.rate,
                momentum: opts.momentum,
                weight_decay: opts.weight_decay,
                cost: opts.cost,
                optimizer: opts.optimizer.clone(),
            };
            let raw_error = self.train_set(&params)?;
            performed = iter;

            push_bounded(&mut ma_buffer, raw_error, opts.moving_average_window.max(1));
            monitored_error = smooth(&ma_buffer, opts.moving_average_type, opts.ema_alpha, opts.moving_average_window.max(1), opts.trimmed_ratio, &mut ma_state);

            push_bounded(&mut plateau_buffer, raw_error, opts.plateau_moving_average_window.max(1));
            plateau_error = smooth(&plateau_buffer, opts.plateau_moving_average_type, opts.plateau_ema_alpha, opts.plateau_moving_average_window.max(1), opts.trimmed_ratio, &mut plateau_state);

            if let Some(hook) = &mut opts.metrics_hook {
                let metrics = IterationMetrics {
                    iteration: iter,
                    error: monitored_error,
                    plateau_error,
                    grad_norm: self.last_grad_norm,
                };
                if let Err(e) = hook(metrics) {
                    tracing::warn!(error = %e, "metrics_hook failed, continuing");
                }
            }

            if let Some(ckpt) = &mut opts.checkpoint {
                if ckpt.last {
                    if let Err(e) = (ckpt.save)(self, iter) {
                        tracing::warn!(error = %e, "checkpoint.save (last) failed, continuing");
                    }
                }
                if ckpt.best && monitored_error < best {
                    if let Err(e) = (ckpt.save)(self, iter) {
                        tracing::warn!(error = %e, "checkpoint.save (best) failed, continuing");
                    }
                }
            }

            if let Some(sched) = &mut opts.schedule {
                if sched.iterations > 0 && iter % sched.iterations == 0 {
                    if let Err(e) = (sched.function)(self, iter) {
                        tracing::warn!(error = %e, "schedule hook failed, continuing");
                    }
                }
            }

            if monitored_error < best - opts.early_stop_min_delta {
                best = monitored_error;
                no_improve = 0;
            } else if opts.early_stop_patience.is_some() {
                no_improve += 1;
            }

            if let Some(patience) = opts.early_stop_patience {
                if no_improve >= patience {
                    tracing::info!(iter, "early stopping: no improvement for {} iterations", no_improve);
                    break;
                }
            }
            if let Some(target) = opts.target_error {
                if monitored_error <= target {
                    break;
                }
            }
        }

        for node in &mut self.nodes {
            node.mask = 1.0;
        }
        self.dropout = 0.0;
        self.global_epoch += performed;

        Ok(TrainResult {
            error: monitored_error,
            iterations: performed,
            time_ms: 0,
        })
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64, cap: usize) {
    buffer.push_back(value);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}
