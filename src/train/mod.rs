//! Training engine: `train_set` (per-sample forward+backward driver,
//! micro-batch/accumulation flush, optimizer step, mixed-precision
//! bookkeeping). Grounded on `gran-prix`'s `Sequential::forward`/`backward`/
//! `update` loop shape (`src/models/mod.rs`), generalized from a layer
//! stack to a node graph and from one fixed `Optimizer` to the dispatched
//! `OptimizerKind`.

pub mod orchestrator;
pub mod smoothing;

use crate::cost::Cost;
use crate::errors::EngineResult;
use crate::graph::node::is_sgd;
use crate::graph::Network;
use crate::optim::OptimizerConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AccumulationReduction {
    Average,
    Sum,
}

impl Default for AccumulationReduction {
    fn default() -> Self {
        AccumulationReduction::Average
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MixedPrecisionConfig {
    pub loss_scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    pub increase_every: u32,
    /// Single-shot test hook: forces the next optimizer step to behave as
    /// if an overflow was detected, per the Mixed-precision overflow
    /// recovery scenario in §8.
    #[serde(default)]
    pub force_next_overflow: bool,
}

impl Default for MixedPrecisionConfig {
    fn default() -> Self {
        MixedPrecisionConfig {
            loss_scale: 1024.0,
            min_scale: 1.0,
            max_scale: 65536.0,
            increase_every: 2000,
            force_next_overflow: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MixedPrecisionState {
    pub cfg: MixedPrecisionConfig,
    pub good_steps: u32,
    pub scale_up_count: u64,
    pub scale_down_count: u64,
}

pub struct TrainSetParams<'a> {
    pub dataset: &'a [(Vec<f64>, Vec<f64>)],
    pub batch_size: usize,
    pub accumulation_steps: usize,
    pub accumulation_reduction: AccumulationReduction,
    pub rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub cost: Cost,
    pub optimizer: OptimizerConfig,
}

impl Network {
    /// Drives one epoch over `dataset`. Returns the mean cost over
    /// successfully processed samples.
    pub fn train_set(&mut self, params: &TrainSetParams) -> EngineResult<f64> {
        self.training = true;
        let sgd_mode = is_sgd(&params.optimizer.kind);

        let mut cumulative_error = 0.0;
        let mut processed = 0u64;
        let mut micro_batches = 0usize;
        let last = params.dataset.len().saturating_sub(1);

        for (i, (input, target)) in params.dataset.iter().enumerate() {
            if input.len() != self.input_count || target.len() != self.output_count {
                tracing::warn!(sample = i, "dimension mismatch, skipping sample");
                continue;
            }

            self.sample_dropout_mask();
            let output = self.activate_generic(input)?;

            let n = self.nodes.len();
            for o in 0..self.output_count {
                let idx = n - self.output_count + o;
                self.propagate_node(idx, params.rate, params.momentum, params.weight_decay, sgd_mode, sgd_mode, Some(target[o]));
            }
            for idx in (self.input_count..n - self.output_count).rev() {
                self.propagate_node(idx, params.rate, params.momentum, params.weight_decay, sgd_mode, sgd_mode, None);
            }

            cumulative_error += params.cost.calculate(target, &output)?;
            processed += 1;

            let at_boundary = i % params.batch_size == params.batch_size - 1 || i == last;
            if at_boundary && !sgd_mode {
                micro_batches += 1;
                if micro_batches >= params.accumulation_steps || i == last {
                    self.optimizer_step(&params.optimizer, params.accumulation_reduction, params.accumulation_steps);
                    micro_batches = 0;
                }
            }
        }

        self.training = false;
        if processed == 0 {
            Ok(0.0)
        } else {
            Ok(cumulative_error / processed as f64)
        }
    }

    /// Flushes accumulated gradients through the configured adaptive
    /// optimizer: overflow detection/recovery, clipping, reduction, and
    /// per-node application.
    pub(crate) fn optimizer_step(&mut self, cfg: &OptimizerConfig, reduction: AccumulationReduction, accumulation_steps: usize) {
        self.optimizer_step += 1;

        if let Some(mp) = &self.mixed_precision {
            let overflow = mp.cfg.force_next_overflow || self.nodes.iter().any(|n| !n.bias.is_finite() || !n.bias_total_delta.is_finite());
            if overflow {
                self.zero_accumulated_gradients();
                let mp = self.mixed_precision.as_mut().unwrap();
                mp.cfg.loss_scale = (mp.cfg.loss_scale / 2.0).max(mp.cfg.min_scale);
                mp.good_steps = 0;
                mp.scale_down_count += 1;
                mp.cfg.force_next_overflow = false;
                self.last_overflow_step = Some(self.optimizer_step);
                self.last_grad_norm = 0.0;
                tracing::warn!(step = self.optimizer_step, "mixed-precision overflow, halving loss scale");
                return;
            }
        }

        if let Some(clip_cfg) = self.current_grad_clip.clone() {
            self.apply_gradient_clipping(&clip_cfg);
        }

        if accumulation_steps > 1 && reduction == AccumulationReduction::Average {
            let divisor = accumulation_steps as f64;
            for conn in self.conn_pool.iter_mut() {
                conn.total_delta_weight /= divisor;
            }
            for node in self.nodes.iter_mut() {
                node.bias_total_delta /= divisor;
            }
        }

        let mut cfg_with_t = cfg.clone();
        cfg_with_t.t = self.optimizer_step;
        let mut sum_sq = 0.0;
        let n = self.nodes.len();
        for idx in self.input_count..n {
            sum_sq += self.apply_batch_updates_with_optimizer(idx, &cfg_with_t);
        }
        self.last_grad_norm = sum_sq.sqrt();

        if let Some(mp) = &mut self.mixed_precision {
            mp.good_steps += 1;
            if mp.good_steps >= mp.cfg.increase_every && mp.cfg.loss_scale < mp.cfg.max_scale {
                mp.cfg.loss_scale = (mp.cfg.loss_scale * 2.0).min(mp.cfg.max_scale);
                mp.good_steps = 0;
                mp.scale_up_count += 1;
                tracing::debug!(step = self.optimizer_step, scale = mp.cfg.loss_scale, "loss scale increased");
            }
        }
    }

    fn zero_accumulated_gradients(&mut self) {
        for conn in self.conn_pool.iter_mut() {
            conn.total_delta_weight = 0.0;
        }
        for node in self.nodes.iter_mut() {
            node.bias_total_delta = 0.0;
        }
    }
}
