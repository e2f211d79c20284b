//! Edge record. Grounded on `gran-prix`'s index-addressed graph nodes
//! (`src/graph/node.rs`, `NodeId`-keyed `Op { inputs: Vec<NodeId>, .. }`) —
//! the same non-owning-index idiom applied to a weighted edge instead of an
//! operation input list.

use crate::types::NodeId;
use serde::{Deserialize, Serialize};

pub const FLAG_ENABLED: u8 = 1 << 0;
pub const FLAG_DROPCONNECT: u8 = 1 << 1;
pub const FLAG_HAS_GATER: u8 = 1 << 2;

/// Per-connection Adam/RMSProp/etc. optimizer state. Kept out of
/// `#[derive(Serialize, Deserialize)]` scope conceptually (it is transient
/// training scratch, not part of the persisted network shape) but derived
/// anyway for uniformity with the rest of the struct; `Network::clear`
/// resets it alongside the other transient fields.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct OptimizerState {
    pub m: f64,
    pub v: f64,
    pub v_max: f64,
    pub slow: Option<f64>,
    pub step_count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
    pub gain: f64,
    pub gater: Option<NodeId>,
    pub eligibility: f64,
    pub xtrace_nodes: Vec<NodeId>,
    pub xtrace_values: Vec<f64>,
    pub previous_delta_weight: f64,
    pub total_delta_weight: f64,
    pub flags: u8,
    #[serde(default)]
    pub opt_state: OptimizerState,
}

impl Connection {
    pub fn new(from: NodeId, to: NodeId, weight: f64) -> Self {
        Connection {
            from,
            to,
            weight,
            gain: 1.0,
            gater: None,
            eligibility: 0.0,
            xtrace_nodes: Vec::new(),
            xtrace_values: Vec::new(),
            previous_delta_weight: 0.0,
            total_delta_weight: 0.0,
            flags: FLAG_ENABLED,
            opt_state: OptimizerState::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flags & FLAG_ENABLED != 0
    }

    pub fn is_self(&self) -> bool {
        self.from == self.to
    }

    pub fn clear_transient(&mut self) {
        self.eligibility = 0.0;
        self.xtrace_nodes.clear();
        self.xtrace_values.clear();
        self.previous_delta_weight = 0.0;
        self.total_delta_weight = 0.0;
        self.opt_state = OptimizerState::default();
        if self.gater.is_none() {
            self.gain = 1.0;
        }
    }
}

/// Cantor pairing of two non-negative integers: a stable, order-sensitive
/// combination used as a NEAT-style innovation id.
pub fn cantor_pair(a: u64, b: u64) -> u64 {
    (a + b) * (a + b + 1) / 2 + b
}

pub fn innovation_id(from: NodeId, to: NodeId) -> u64 {
    cantor_pair(from.0 as u64, to.0 as u64)
}
