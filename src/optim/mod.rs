//! Adaptive optimizer library. Generalizes `gran-prix`'s `Optimizer` trait
//! (`src/optim/mod.rs`, `SGD::step`) into a tagged enum per design note §9,
//! with per-connection/per-bias state carried in
//! `graph::connection::OptimizerState` rather than on the optimizer itself
//! (there is one logical optimizer per training run, but every learnable
//! scalar needs its own moment estimates).

pub mod clip;

use crate::graph::connection::OptimizerState;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Sgd,
    RmsProp,
    Adagrad,
    Adam,
    AdamW,
    AmsGrad,
    Adamax,
    Nadam,
    RAdam,
    Lion,
    AdaBelief,
    Lookahead { base: Box<OptimizerKind>, k: u32, alpha: f64 },
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::RmsProp => "rmsprop",
            OptimizerKind::Adagrad => "adagrad",
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::AmsGrad => "amsgrad",
            OptimizerKind::Adamax => "adamax",
            OptimizerKind::Nadam => "nadam",
            OptimizerKind::RAdam => "radam",
            OptimizerKind::Lion => "lion",
            OptimizerKind::AdaBelief => "adabelief",
            OptimizerKind::Lookahead { .. } => "lookahead",
        }
    }

    pub fn is_nested_lookahead(&self) -> bool {
        matches!(self, OptimizerKind::Lookahead { base, .. } if matches!(**base, OptimizerKind::Lookahead { .. }))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    pub rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    /// Global optimizer step, supplied by the orchestrator for bias
    /// correction (Adam family) and Lookahead's `k`-step cadence.
    pub t: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            kind: OptimizerKind::Sgd,
            rate: 0.3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            t: 0,
        }
    }
}

/// Computes the weight delta for one scalar parameter under `kind`, given
/// its accumulated gradient `g` (the flushed `total_delta_weight`/
/// `bias_total_delta`) and mutating its per-parameter optimizer state.
/// Returns the delta to add to the parameter; callers are responsible for
/// actually applying it (so the same state update can be reused by
/// Lookahead's inner base-optimizer call).
pub fn apply_optimizer_step(kind: &OptimizerKind, cfg: &OptimizerConfig, state: &mut OptimizerState, weight: f64, g: f64) -> f64 {
    let t = cfg.t.max(1) as f64;
    match kind {
        OptimizerKind::Sgd => cfg.rate * g,
        OptimizerKind::RmsProp => {
            state.v = cfg.beta2 * state.v + (1.0 - cfg.beta2) * g * g;
            -cfg.rate * g / (state.v.sqrt() + cfg.eps)
        }
        OptimizerKind::Adagrad => {
            state.v += g * g;
            -cfg.rate * g / (state.v.sqrt() + cfg.eps)
        }
        OptimizerKind::Adam => {
            state.m = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            state.v = cfg.beta2 * state.v + (1.0 - cfg.beta2) * g * g;
            let mhat = state.m / (1.0 - cfg.beta1.powf(t));
            let vhat = state.v / (1.0 - cfg.beta2.powf(t));
            -cfg.rate * mhat / (vhat.sqrt() + cfg.eps)
        }
        OptimizerKind::AdamW => {
            state.m = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            state.v = cfg.beta2 * state.v + (1.0 - cfg.beta2) * g * g;
            let mhat = state.m / (1.0 - cfg.beta1.powf(t));
            let vhat = state.v / (1.0 - cfg.beta2.powf(t));
            -cfg.rate * mhat / (vhat.sqrt() + cfg.eps) - cfg.rate * cfg.weight_decay * weight
        }
        OptimizerKind::AmsGrad => {
            state.m = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            state.v = cfg.beta2 * state.v + (1.0 - cfg.beta2) * g * g;
            let mhat = state.m / (1.0 - cfg.beta1.powf(t));
            let vhat = state.v / (1.0 - cfg.beta2.powf(t));
            state.v_max = state.v_max.max(vhat);
            -cfg.rate * mhat / (state.v_max.sqrt() + cfg.eps)
        }
        OptimizerKind::Adamax => {
            state.m = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            state.v_max = (cfg.beta2 * state.v_max).max(g.abs());
            -(cfg.rate / (1.0 - cfg.beta1.powf(t))) * state.m / (state.v_max + cfg.eps)
        }
        OptimizerKind::Nadam => {
            state.m = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            state.v = cfg.beta2 * state.v + (1.0 - cfg.beta2) * g * g;
            let mhat = state.m / (1.0 - cfg.beta1.powf(t));
            let vhat = state.v / (1.0 - cfg.beta2.powf(t));
            let mbar = cfg.beta1 * mhat + (1.0 - cfg.beta1) * g / (1.0 - cfg.beta1.powf(t));
            -cfg.rate * mbar / (vhat.sqrt() + cfg.eps)
        }
        OptimizerKind::RAdam => {
            state.m = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            state.v = cfg.beta2 * state.v + (1.0 - cfg.beta2) * g * g;
            let mhat = state.m / (1.0 - cfg.beta1.powf(t));
            let rho_inf = 2.0 / (1.0 - cfg.beta2) - 1.0;
            let beta2_t = cfg.beta2.powf(t);
            let rho_t = rho_inf - 2.0 * t * beta2_t / (1.0 - beta2_t);
            if rho_t > 4.0 {
                let vhat = (state.v / (1.0 - beta2_t)).sqrt();
                let r = (((rho_t - 4.0) * (rho_t - 2.0) * rho_inf) / ((rho_inf - 4.0) * (rho_inf - 2.0) * rho_t)).sqrt();
                -cfg.rate * r * mhat / (vhat + cfg.eps)
            } else {
                -cfg.rate * mhat
            }
        }
        OptimizerKind::Lion => {
            let c = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            let update = if c > 0.0 {
                1.0
            } else if c < 0.0 {
                -1.0
            } else {
                0.0
            };
            state.m = cfg.beta2 * state.m + (1.0 - cfg.beta2) * g;
            -cfg.rate * (update + cfg.weight_decay * weight)
        }
        OptimizerKind::AdaBelief => {
            state.m = cfg.beta1 * state.m + (1.0 - cfg.beta1) * g;
            let diff = g - state.m;
            state.v = cfg.beta2 * state.v + (1.0 - cfg.beta2) * diff * diff + cfg.eps;
            let mhat = state.m / (1.0 - cfg.beta1.powf(t));
            let shat = state.v / (1.0 - cfg.beta2.powf(t));
            -cfg.rate * mhat / (shat.sqrt() + cfg.eps)
        }
        OptimizerKind::Lookahead { base, k, alpha } => {
            let fast_delta = apply_optimizer_step(base, cfg, state, weight, g);
            let fast_weight = weight + fast_delta;
            state.step_count += 1;
            let slow = state.slow.unwrap_or(weight);
            if state.step_count % (*k).max(1) as u64 == 0 {
                let new_slow = slow + alpha * (fast_weight - slow);
                state.slow = Some(new_slow);
                new_slow - weight
            } else {
                state.slow = Some(slow);
                fast_delta
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sgd_matches_rate_times_gradient() {
        let cfg = OptimizerConfig {
            kind: OptimizerKind::Sgd,
            rate: 0.1,
            ..Default::default()
        };
        let mut state = OptimizerState::default();
        let delta = apply_optimizer_step(&cfg.kind, &cfg, &mut state, 0.0, 2.0);
        assert!((delta - 0.2).abs() < 1e-12);
    }

    #[test]
    fn nested_lookahead_is_detected() {
        let inner = OptimizerKind::Lookahead {
            base: Box::new(OptimizerKind::Adam),
            k: 5,
            alpha: 0.5,
        };
        let outer = OptimizerKind::Lookahead {
            base: Box::new(inner),
            k: 5,
            alpha: 0.5,
        };
        assert!(outer.is_nested_lookahead());
    }

    #[test]
    fn adam_moves_weight_towards_reducing_gradient_sign() {
        let cfg = OptimizerConfig {
            kind: OptimizerKind::Adam,
            rate: 0.1,
            t: 1,
            ..Default::default()
        };
        let mut state = OptimizerState::default();
        let delta = apply_optimizer_step(&cfg.kind, &cfg, &mut state, 1.0, 1.0);
        assert!(delta < 0.0);
    }
}
