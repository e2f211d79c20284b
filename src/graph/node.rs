//! Neuron record and its forward/backward/optimizer-application semantics.
//!
//! The algorithms are node-centric in `spec.md` §4.4 but, under the
//! arena-with-indices ownership model (§9), a node cannot borrow its
//! neighbours directly — so `activate`/`propagate`/
//! `apply_batch_updates_with_optimizer` are implemented as `Network`
//! methods taking a node index, mirroring how `gran-prix`'s `Graph::execute`
//! / `Graph::backward` (`src/graph/mod.rs`) walk the arena by `NodeId`
//! rather than recursing through owned references.

use crate::activation::Activation;
use crate::graph::connection::{FLAG_ENABLED, FLAG_HAS_GATER};
use crate::graph::Network;
use crate::optim::{apply_optimizer_step, OptimizerConfig, OptimizerKind};
use crate::types::{ConnId, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct NodeError {
    pub responsibility: f64,
    pub projected: f64,
    pub gated: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub bias: f64,
    pub squash: Activation,
    pub state: f64,
    pub old_state: f64,
    pub activation: f64,
    pub derivative: f64,
    pub mask: f64,
    pub error: NodeError,
    pub incoming: Vec<ConnId>,
    pub outgoing: Vec<ConnId>,
    pub self_conn: Option<ConnId>,
    pub gated: Vec<ConnId>,
    #[serde(default)]
    pub bias_opt_state: crate::graph::connection::OptimizerState,
    #[serde(default)]
    pub bias_previous_delta: f64,
    #[serde(default)]
    pub bias_total_delta: f64,
}

impl Node {
    pub fn new(kind: NodeKind, squash: Activation) -> Self {
        Node {
            kind,
            bias: 0.0,
            squash,
            state: 0.0,
            old_state: 0.0,
            activation: 0.0,
            derivative: 0.0,
            mask: 1.0,
            error: NodeError::default(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            self_conn: None,
            gated: Vec::new(),
            bias_opt_state: Default::default(),
            bias_previous_delta: 0.0,
            bias_total_delta: 0.0,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, NodeKind::Input)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.kind, NodeKind::Output)
    }

    pub fn clear_transient(&mut self) {
        self.state = 0.0;
        self.old_state = 0.0;
        self.activation = 0.0;
        self.derivative = 0.0;
        self.error = NodeError::default();
        self.bias_previous_delta = 0.0;
        self.bias_total_delta = 0.0;
        self.bias_opt_state = Default::default();
    }
}

impl Network {
    /// Input-node shortcut: passes the value straight through, per §4.4.
    pub(crate) fn activate_node_input(&mut self, idx: usize, value: f64) {
        let node = &mut self.nodes[idx];
        if node.mask == 0.0 {
            node.activation = 0.0;
            node.state = 0.0;
            return;
        }
        node.activation = value;
        node.state = 0.0;
        node.old_state = 0.0;
    }

    /// Non-input node forward step: state accumulation, squash, gater gain
    /// propagation, eligibility/xtrace update.
    pub(crate) fn activate_node(&mut self, idx: usize) {
        if self.nodes[idx].mask == 0.0 {
            self.nodes[idx].activation = 0.0;
            return;
        }

        let bias = self.nodes[idx].bias;
        let mut state = bias;
        let incoming: Vec<ConnId> = self.nodes[idx].incoming.clone();
        for cid in &incoming {
            let conn = &self.conn_pool[cid.0];
            if conn.flags & FLAG_ENABLED == 0 {
                continue;
            }
            let from_activation = self.nodes[conn.from.0].activation;
            state += from_activation * conn.weight * conn.gain;
        }

        // Self-term. Branch-free zero dummy per the Open Question in §9:
        // `self_gain`/`self_weight` default to 0 rather than guarding the
        // whole expression on `self_conn.is_some()`.
        let old_state = self.nodes[idx].state;
        let (self_weight, self_gain) = match self.nodes[idx].self_conn {
            Some(scid) => {
                let c = &self.conn_pool[scid.0];
                (c.weight, c.gain)
            }
            None => (0.0, 0.0),
        };
        state += old_state * self_weight * self_gain;

        self.nodes[idx].old_state = old_state;
        self.nodes[idx].state = state;

        let squash = self.nodes[idx].squash;
        let activation = squash.call(state) * self.nodes[idx].mask;
        let derivative = squash.derivative(state);
        self.nodes[idx].activation = activation;
        self.nodes[idx].derivative = derivative;

        // Gain propagation: every connection this node gates picks up the
        // node's freshly computed activation as its gain for this tick.
        let gated: Vec<ConnId> = self.nodes[idx].gated.clone();
        for gid in &gated {
            self.conn_pool[gid.0].gain = activation;
        }

        self.update_traces(idx, old_state, self_weight, self_gain, activation, derivative);
    }

    fn update_traces(
        &mut self,
        idx: usize,
        old_state: f64,
        self_weight: f64,
        self_gain: f64,
        activation: f64,
        derivative: f64,
    ) {
        let mut conn_ids: Vec<ConnId> = self.nodes[idx].incoming.clone();
        if let Some(scid) = self.nodes[idx].self_conn {
            conn_ids.push(scid);
        }
        for cid in &conn_ids {
            let from_activation;
            let from_idx;
            {
                let conn = &self.conn_pool[cid.0];
                from_idx = conn.from.0;
                from_activation = self.nodes[from_idx].activation;
            }
            let eligibility_now;
            let xtrace_nodes;
            let prev_values;
            {
                let conn = &mut self.conn_pool[cid.0];
                let prev_eligibility = conn.eligibility;
                conn.eligibility = self_gain * self_weight * prev_eligibility + conn.gain * from_activation;
                xtrace_nodes = conn.xtrace_nodes.clone();
                eligibility_now = conn.eligibility;
                prev_values = conn.xtrace_values.clone();
            }

            let mut new_values = Vec::with_capacity(xtrace_nodes.len());
            for (i, gater) in xtrace_nodes.iter().enumerate() {
                let prev = prev_values[i];
                let influence = self.node_influence(*gater, NodeId(idx), old_state);
                let updated = self_gain * self_weight * prev + derivative * eligibility_now * influence;
                new_values.push(updated);
            }
            let conn = &mut self.conn_pool[cid.0];
            conn.xtrace_values = new_values;
        }
        let _ = activation;
    }

    /// `n.influence`: the sum of weights of connections originating at
    /// `source` and gated by `gater`, plus `old_state` when `gater` is
    /// `source`'s own self-gater.
    fn node_influence(&self, gater: NodeId, source: NodeId, source_old_state: f64) -> f64 {
        let mut influence = 0.0;
        for gid in &self.nodes[gater.0].gated {
            let conn = &self.conn_pool[gid.0];
            if conn.from == source {
                influence += conn.weight;
            }
        }
        if let Some(scid) = self.nodes[source.0].self_conn {
            if self.conn_pool[scid.0].gater == Some(gater) {
                influence += source_old_state;
            }
        }
        influence
    }

    /// Backward step for one node. `target` is `Some` only for output
    /// nodes being driven by a supervised sample.
    pub(crate) fn propagate_node(
        &mut self,
        idx: usize,
        rate: f64,
        momentum: f64,
        weight_decay: f64,
        is_sgd: bool,
        apply_updates: bool,
        target: Option<f64>,
    ) {
        if self.nodes[idx].is_input() {
            return;
        }

        let activation = self.nodes[idx].activation;
        let derivative = self.nodes[idx].derivative;

        let (projected, gated) = if let Some(t) = target {
            let r = (t - activation) * derivative;
            (r, 0.0)
        } else {
            let outgoing: Vec<ConnId> = self.nodes[idx].outgoing.clone();
            let mut projected = 0.0;
            for cid in &outgoing {
                let conn = &self.conn_pool[cid.0];
                if conn.is_self() {
                    continue;
                }
                projected += self.nodes[conn.to.0].error.responsibility * conn.weight * conn.gain;
            }
            projected *= derivative;

            let gated_list: Vec<ConnId> = self.nodes[idx].gated.clone();
            let mut gated = 0.0;
            for gid in &gated_list {
                let conn = &self.conn_pool[gid.0];
                let influence_term = conn.weight * self.nodes[conn.from.0].activation;
                gated += influence_term * self.nodes[conn.to.0].error.responsibility;
            }
            gated *= derivative;
            (projected, gated)
        };

        let responsibility = projected + gated;
        self.nodes[idx].error.projected = projected;
        self.nodes[idx].error.gated = gated;
        self.nodes[idx].error.responsibility = responsibility;

        let mut conn_ids: Vec<ConnId> = self.nodes[idx].incoming.clone();
        if let Some(scid) = self.nodes[idx].self_conn {
            conn_ids.push(scid);
        }
        for cid in &conn_ids {
            let conn = &self.conn_pool[cid.0];
            let xtrace_sum: f64 = conn
                .xtrace_nodes
                .iter()
                .zip(conn.xtrace_values.iter())
                .map(|(n, v)| self.nodes[n.0].error.responsibility * v)
                .sum();
            let gradient = projected * conn.eligibility + xtrace_sum;
            let decay_term = if is_sgd { weight_decay * conn.weight } else { 0.0 };
            let conn = &mut self.conn_pool[cid.0];
            conn.total_delta_weight += rate * gradient + momentum * conn.previous_delta_weight - decay_term;
            if apply_updates {
                conn.weight += conn.total_delta_weight;
                conn.previous_delta_weight = conn.total_delta_weight;
                conn.total_delta_weight = 0.0;
            }
        }

        let node = &mut self.nodes[idx];
        node.bias_total_delta += rate * responsibility + momentum * node.bias_previous_delta;
        if apply_updates {
            node.bias += node.bias_total_delta;
            node.bias_previous_delta = node.bias_total_delta;
            node.bias_total_delta = 0.0;
        }
    }

    /// Applies a configured adaptive optimizer to every learnable parameter
    /// (connection weights + bias) of one node, using the accumulated
    /// `total_delta_weight`/`bias_total_delta` as the raw gradient signal.
    /// Returns the sum of squared parameter deltas applied, for grad-norm
    /// bookkeeping.
    pub(crate) fn apply_batch_updates_with_optimizer(&mut self, idx: usize, cfg: &OptimizerConfig) -> f64 {
        if self.nodes[idx].is_input() {
            return 0.0;
        }
        let mut sum_sq = 0.0;

        let mut conn_ids: Vec<ConnId> = self.nodes[idx].incoming.clone();
        if let Some(scid) = self.nodes[idx].self_conn {
            conn_ids.push(scid);
        }
        for cid in &conn_ids {
            let conn = &mut self.conn_pool[cid.0];
            let g = conn.total_delta_weight;
            let delta = apply_optimizer_step(&cfg.kind, cfg, &mut conn.opt_state, conn.weight, g);
            conn.weight += delta;
            conn.previous_delta_weight = delta;
            conn.total_delta_weight = 0.0;
            sum_sq += delta * delta;
        }

        let node = &mut self.nodes[idx];
        let g = node.bias_total_delta;
        let delta = apply_optimizer_step(&cfg.kind, cfg, &mut node.bias_opt_state, node.bias, g);
        node.bias += delta;
        node.bias_previous_delta = delta;
        node.bias_total_delta = 0.0;
        sum_sq += delta * delta;

        sum_sq
    }

    pub(crate) fn reset_gated_gain_if_ungated(&mut self, cid: ConnId) {
        let conn = &mut self.conn_pool[cid.0];
        if conn.gater.is_none() {
            conn.gain = 1.0;
            conn.flags &= !FLAG_HAS_GATER;
        }
    }
}

pub(crate) fn is_sgd(kind: &OptimizerKind) -> bool {
    matches!(kind, OptimizerKind::Sgd)
}
