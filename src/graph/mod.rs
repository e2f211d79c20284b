//! Graph store. Owns nodes and connections, implements structural mutation,
//! topology/slab caching, and both forward paths. Grounded on `gran-prix`'s
//! `Graph` (`src/graph/mod.rs`): `nodes: Vec<Node>` arena, index-addressed
//! edges, dirty-flag-free-but-analogous `clear_values`/`clear_gradients`
//! reset methods (here generalized into `Network::clear`).

pub mod connection;
pub mod json;
pub mod node;
pub mod slab;
pub mod topo;

use crate::activation::Activation;
use crate::errors::{EngineError, EngineResult};
use crate::graph::connection::{Connection, FLAG_HAS_GATER};
use crate::graph::node::Node;
use crate::graph::slab::Slab;
use crate::types::{ConnId, NodeId, NodeKind};
use rand::Rng;

pub struct Network {
    pub input_count: usize,
    pub output_count: usize,
    pub nodes: Vec<Node>,
    pub(crate) conn_pool: Vec<Connection>,
    pub(crate) connections: Vec<ConnId>,
    pub(crate) self_conns: Vec<ConnId>,
    pub(crate) gates: Vec<ConnId>,
    pub dropout: f64,
    pub enforce_acyclic: bool,
    pub training: bool,

    pub(crate) topo_order: Vec<usize>,
    pub(crate) topo_dirty: bool,
    pub(crate) topo_clean: bool,
    pub(crate) node_index_dirty: bool,

    pub(crate) slab: Slab,
    pub(crate) slab_dirty: bool,
    pub(crate) adj_dirty: bool,
    pub slab_async_builds: u64,
    pub(crate) activation_pool: crate::pool::ActivationPool,

    pub current_grad_clip: Option<crate::optim::clip::GradClipConfig>,
    pub mixed_precision: Option<crate::train::MixedPrecisionState>,
    pub optimizer_step: u64,
    pub last_grad_norm: f64,
    pub last_overflow_step: Option<u64>,
    pub global_epoch: u64,

    pub maybe_prune: Option<Box<dyn FnMut(&mut Network, u64)>>,
    last_stats: serde_json::Value,
}

impl Network {
    /// Builds a network shell with `input_count` input nodes and
    /// `output_count` output nodes and no connections. Used internally by
    /// `new`/`from_json`.
    pub fn empty(input_count: usize, output_count: usize) -> Self {
        let mut nodes = Vec::with_capacity(input_count + output_count);
        for _ in 0..input_count {
            nodes.push(Node::new(NodeKind::Input, Activation::Identity));
        }
        for _ in 0..output_count {
            nodes.push(Node::new(NodeKind::Output, Activation::Logistic));
        }
        Network {
            input_count,
            output_count,
            nodes,
            conn_pool: Vec::new(),
            connections: Vec::new(),
            self_conns: Vec::new(),
            gates: Vec::new(),
            dropout: 0.0,
            enforce_acyclic: true,
            training: false,
            topo_order: Vec::new(),
            topo_dirty: true,
            topo_clean: false,
            node_index_dirty: false,
            slab: Slab::default(),
            slab_dirty: true,
            adj_dirty: true,
            slab_async_builds: 0,
            activation_pool: crate::pool::ActivationPool::new(),
            current_grad_clip: None,
            mixed_precision: None,
            optimizer_step: 0,
            last_grad_norm: 0.0,
            last_overflow_step: None,
            global_epoch: 0,
            maybe_prune: None,
            last_stats: serde_json::Value::Null,
        }
    }

    /// Minimally connected network: every input wired to every output with
    /// a small random weight, matching the NEAT-lineage "minimal"
    /// construction convention (see `other_examples` NEAT ports).
    pub fn new(input_count: usize, output_count: usize) -> Self {
        let mut net = Network::empty(input_count, output_count);
        for i in 0..input_count {
            for o in 0..output_count {
                let w = net.random_weight();
                net.connect(NodeId(i), NodeId(input_count + o), Some(w));
            }
        }
        net
    }

    pub fn node_id(&self, idx: usize) -> NodeId {
        NodeId(idx)
    }

    pub fn connection(&self, id: ConnId) -> &Connection {
        &self.conn_pool[id.0]
    }

    pub fn connection_mut(&mut self, id: ConnId) -> &mut Connection {
        &mut self.conn_pool[id.0]
    }

    /// Non-self, non-gate-specific connection ids, in insertion order.
    pub fn connection_ids(&self) -> &[ConnId] {
        &self.connections
    }

    pub fn self_connection_ids(&self) -> &[ConnId] {
        &self.self_conns
    }

    pub fn gated_connection_ids(&self) -> &[ConnId] {
        &self.gates
    }

    fn random_weight(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..1.0)
    }

    pub(crate) fn validate_input_len(&self, input: &[f64]) -> EngineResult<()> {
        if input.len() != self.input_count {
            return Err(EngineError::DimensionMismatch {
                expected: self.input_count,
                found: input.len(),
            });
        }
        Ok(())
    }

    // ---- structural mutation -------------------------------------------

    /// Inserts a new node. Hidden/constant nodes are inserted just before
    /// the output block so the "inputs first, outputs last" invariant
    /// holds; input/output nodes are appended to their own block.
    /// Reindexes every connection endpoint/gater reference accordingly.
    pub fn add_node(&mut self, kind: NodeKind, squash: Activation) -> NodeId {
        let at = match kind {
            NodeKind::Input => self.input_count,
            NodeKind::Output => self.nodes.len(),
            NodeKind::Hidden | NodeKind::Constant => self.nodes.len() - self.output_count,
        };
        for conn in self.conn_pool.iter_mut() {
            if conn.from.0 >= at {
                conn.from.0 += 1;
            }
            if conn.to.0 >= at {
                conn.to.0 += 1;
            }
            if let Some(g) = &mut conn.gater {
                if g.0 >= at {
                    g.0 += 1;
                }
            }
        }
        self.nodes.insert(at, Node::new(kind, squash));
        match kind {
            NodeKind::Input => self.input_count += 1,
            NodeKind::Output => self.output_count += 1,
            _ => {}
        }
        self.topo_dirty = true;
        self.slab_dirty = true;
        NodeId(at)
    }

    /// `connect(from, to, weight?)`: silently refuses (returns `None`,
    /// never `Err`) when acyclic mode is enforced and the edge would run
    /// against node order, per §7's "silent acyclic-violating connect".
    pub fn connect(&mut self, from: NodeId, to: NodeId, weight: Option<f64>) -> Option<ConnId> {
        if self.enforce_acyclic && from != to && from.0 > to.0 {
            return None;
        }
        let w = weight.unwrap_or_else(|| self.random_weight());
        let conn = Connection::new(from, to, w);
        let cid = ConnId(self.conn_pool.len());
        self.conn_pool.push(conn);

        if from == to {
            self.nodes[from.0].self_conn = Some(cid);
            self.self_conns.push(cid);
        } else {
            self.nodes[from.0].outgoing.push(cid);
            self.nodes[to.0].incoming.push(cid);
            self.connections.push(cid);
        }
        self.topo_dirty = true;
        self.slab_dirty = true;
        Some(cid)
    }

    /// Idempotent: succeeds silently if no matching edge exists. Ungates
    /// the edge first if it was gated.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        let cid = if from == to {
            self.nodes[from.0].self_conn
        } else {
            self.nodes[from.0]
                .outgoing
                .iter()
                .copied()
                .find(|&c| self.conn_pool[c.0].to == to)
        };
        let Some(cid) = cid else { return };

        if self.conn_pool[cid.0].gater.is_some() {
            self.ungate(cid);
        }

        if from == to {
            self.nodes[from.0].self_conn = None;
            self.self_conns.retain(|&c| c != cid);
        } else {
            self.nodes[from.0].outgoing.retain(|&c| c != cid);
            self.nodes[to.0].incoming.retain(|&c| c != cid);
            self.connections.retain(|&c| c != cid);
        }
        self.topo_dirty = true;
        self.slab_dirty = true;
    }

    pub fn gate(&mut self, gater: NodeId, conn: ConnId) {
        self.conn_pool[conn.0].gater = Some(gater);
        self.conn_pool[conn.0].flags |= FLAG_HAS_GATER;
        self.nodes[gater.0].gated.push(conn);
        if !self.gates.contains(&conn) {
            self.gates.push(conn);
        }

        // Lazily extend the xtrace node set of every connection feeding
        // this gated edge's source, per design note §9 ("rebuild indices
        // lazily when a gater changes"). `update_traces` reads
        // `xtrace_nodes` off a node's *incoming* (+ self) connections when
        // that node activates, so the sibling set has to be the source
        // node's incoming edges, not its outgoing ones — otherwise the
        // extended trace is attached to edges whose xtrace is read at the
        // wrong activation and the gated-gradient term never accumulates.
        let from = self.conn_pool[conn.0].from;
        let mut siblings: Vec<ConnId> = self.nodes[from.0].incoming.clone();
        if let Some(scid) = self.nodes[from.0].self_conn {
            siblings.push(scid);
        }
        for sibling in siblings {
            let c = &mut self.conn_pool[sibling.0];
            if !c.xtrace_nodes.contains(&gater) {
                c.xtrace_nodes.push(gater);
                c.xtrace_values.push(0.0);
            }
        }

        self.slab_dirty = true;
    }

    pub fn ungate(&mut self, conn: ConnId) {
        let Some(gater) = self.conn_pool[conn.0].gater.take() else {
            return;
        };
        self.nodes[gater.0].gated.retain(|&c| c != conn);
        self.gates.retain(|&c| c != conn);
        self.reset_gated_gain_if_ungated(conn);
        self.slab_dirty = true;
    }

    /// Bulk-gate `conns` using `gaters`, cycling `gaters[i % gaters.len()]`
    /// when there are more connections than gating nodes — the exact
    /// mapping preserved from the Open Question in §9 for test
    /// reproducibility.
    pub fn gate_all(&mut self, gaters: &[NodeId], conns: &[ConnId]) {
        if gaters.is_empty() {
            return;
        }
        for (i, &conn) in conns.iter().enumerate() {
            self.gate(gaters[i % gaters.len()], conn);
        }
    }

    /// Removes a hidden/constant node that has no incident edges. Returns
    /// `false` (no-op) if the node still has edges or is an input/output.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let idx = id.0;
        if idx >= self.nodes.len() {
            return false;
        }
        let node = &self.nodes[idx];
        if matches!(node.kind, NodeKind::Input | NodeKind::Output) {
            return false;
        }
        if !node.incoming.is_empty() || !node.outgoing.is_empty() || node.self_conn.is_some() || !node.gated.is_empty() {
            return false;
        }
        self.nodes.remove(idx);
        for conn in self.conn_pool.iter_mut() {
            if conn.from.0 > idx {
                conn.from.0 -= 1;
            }
            if conn.to.0 > idx {
                conn.to.0 -= 1;
            }
            if let Some(g) = &mut conn.gater {
                if g.0 > idx {
                    g.0 -= 1;
                }
            }
        }
        self.topo_dirty = true;
        self.slab_dirty = true;
        true
    }

    /// Resets per-forward/backward transient state (`state`, `activation`,
    /// `old_state`, traces, accumulators) without touching structure.
    /// Named by the clear round-trip law in §8 but not otherwise specified
    /// as an operation in §4.5.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.clear_transient();
        }
        for conn in &mut self.conn_pool {
            conn.clear_transient();
        }
    }

    pub fn last_stats(&self) -> serde_json::Value {
        self.last_stats.clone()
    }

    pub fn set_last_stats(&mut self, stats: serde_json::Value) {
        self.last_stats = stats;
    }

    pub(crate) fn call_maybe_prune(&mut self, step: u64) {
        if let Some(mut hook) = self.maybe_prune.take() {
            hook(self, step);
            self.maybe_prune = Some(hook);
        }
    }

    /// Resamples each hidden node's `mask` to 0 with probability
    /// `self.dropout`, 1 otherwise. Input/output/constant nodes are never
    /// masked. No-op when `dropout == 0.0`. Called once per training
    /// sample by `train_set`; the orchestrator resets every mask to 1 at
    /// the end of a training run.
    pub(crate) fn sample_dropout_mask(&mut self) {
        if self.dropout <= 0.0 {
            return;
        }
        let mut rng = rand::thread_rng();
        for node in &mut self.nodes {
            if matches!(node.kind, NodeKind::Hidden) {
                node.mask = if rng.gen::<f64>() < self.dropout { 0.0 } else { 1.0 };
            }
        }
    }

    // ---- forward ----------------------------------------------------

    pub fn activate(&mut self, input: &[f64]) -> EngineResult<Vec<f64>> {
        self.validate_input_len(input)?;
        if !self.training && self.enforce_acyclic && self.gates.is_empty() && self.self_conns.is_empty() && self.dropout == 0.0 {
            self.ensure_topo_order();
            if self.can_use_fast_slab() {
                return self.fast_slab_activate(input);
            }
        }
        self.activate_generic(input)
    }

    /// Generic recurrent evaluator: iterates nodes in definition order,
    /// supports gating, self-loops, dropout and stochastic depth (via
    /// per-node `mask`).
    pub fn activate_generic(&mut self, input: &[f64]) -> EngineResult<Vec<f64>> {
        self.validate_input_len(input)?;
        for i in 0..self.nodes.len() {
            if i < self.input_count {
                self.activate_node_input(i, input[i]);
            } else {
                self.activate_node(i);
            }
        }
        let n = self.nodes.len();
        let mut out = self.activation_pool.acquire(self.output_count);
        for (slot, nd) in out.iter_mut().zip(&self.nodes[n - self.output_count..]) {
            *slot = nd.activation;
        }
        let result = out.clone();
        self.activation_pool.release(out);
        Ok(result)
    }
}
