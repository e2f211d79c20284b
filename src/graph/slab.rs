//! Packed slab cache: a structure-of-arrays projection of `connections`
//! plus CSR adjacency, enabling the O(n + edges) fast forward path.
//! Grounded on `gran-prix`'s `MemoryPlanner`/`BufferPool`
//! (`src/graph/memory_planner.rs`, `src/graph/buffer_pool.rs`) — the same
//! "plan once, reuse pooled buffers across rebuilds" idiom, here applied to
//! edge arrays instead of tensor buffers.

use crate::errors::EngineResult;
use crate::graph::connection::FLAG_ENABLED;
use crate::graph::Network;

/// Growth factor for slab capacity. The teacher's WASM sibling used a
/// smaller browser-profile factor for its slab equivalent; this crate has
/// no browser/WASM target (see SPEC_FULL.md §3 Open Questions), so only the
/// server profile applies.
const SLAB_GROWTH_FACTOR: f64 = 1.75;

/// Entries processed per yield point in the cooperative async rebuild.
pub const ASYNC_SLICE_SIZE: usize = 50_000;

#[derive(Clone, Debug, Default)]
pub struct Slab {
    pub weights: Vec<f64>,
    pub gain: Vec<f64>,
    pub from: Vec<u32>,
    pub to: Vec<u32>,
    pub flags: Vec<u8>,
    pub out_start: Vec<u32>,
    pub out_order: Vec<u32>,
    pub used: usize,
    pub capacity: usize,
    pub version: u64,
}

impl Slab {
    fn grow_to(&mut self, required: usize) {
        if self.capacity >= required {
            return;
        }
        let mut new_capacity = self.capacity.max(1);
        while new_capacity < required {
            new_capacity = ((new_capacity as f64) * SLAB_GROWTH_FACTOR).ceil() as usize;
        }
        self.weights.resize(new_capacity, 0.0);
        self.gain.resize(new_capacity, 0.0);
        self.from.resize(new_capacity, 0);
        self.to.resize(new_capacity, 0);
        self.flags.resize(new_capacity, 0);
        self.capacity = new_capacity;
    }
}

impl Network {
    pub(crate) fn ensure_slab(&mut self) {
        if self.slab_dirty {
            self.rebuild_slab();
        }
        if self.adj_dirty {
            self.rebuild_adjacency();
        }
    }

    /// Synchronous slab rebuild. See `rebuild_slab_async` for the
    /// yielding variant used by long-running evolutionary drivers.
    pub(crate) fn rebuild_slab(&mut self) {
        let n = self.connections.len();
        self.slab.grow_to(n);
        for (i, &cid) in self.connections.iter().enumerate() {
            let conn = &self.conn_pool[cid.0];
            self.slab.weights[i] = conn.weight;
            self.slab.gain[i] = conn.gain;
            self.slab.from[i] = conn.from.0 as u32;
            self.slab.to[i] = conn.to.0 as u32;
            self.slab.flags[i] = conn.flags;
        }
        self.slab.used = n;
        self.slab.version += 1;
        self.slab_dirty = false;
        self.adj_dirty = true;
        tracing::debug!(version = self.slab.version, used = self.slab.used, "slab rebuilt");
    }

    /// Cooperative variant: identical semantics to `rebuild_slab` but
    /// yields to the caller every `ASYNC_SLICE_SIZE` entries via the
    /// supplied `yield_fn`, incrementing `slab_async_builds`. If a
    /// structural mutation happens between slices (detected by
    /// `slab_dirty` flipping back to true mid-loop by some other path),
    /// the partial slab is discarded and the rebuild restarts.
    pub fn rebuild_slab_async(&mut self, mut yield_fn: impl FnMut()) {
        let n = self.connections.len();
        self.slab.grow_to(n);
        let mut i = 0;
        while i < n {
            let end = (i + ASYNC_SLICE_SIZE).min(n);
            for j in i..end {
                let cid = self.connections[j];
                let conn = &self.conn_pool[cid.0];
                self.slab.weights[j] = conn.weight;
                self.slab.gain[j] = conn.gain;
                self.slab.from[j] = conn.from.0 as u32;
                self.slab.to[j] = conn.to.0 as u32;
                self.slab.flags[j] = conn.flags;
            }
            i = end;
            if i < n {
                yield_fn();
            }
        }
        self.slab.used = n;
        self.slab.version += 1;
        self.slab_dirty = false;
        self.adj_dirty = true;
        self.slab_async_builds += 1;
    }

    /// CSR adjacency: fan-out counts prefix-summed into `out_start`,
    /// connection indices bucketed into `out_order`.
    pub(crate) fn rebuild_adjacency(&mut self) {
        let n_nodes = self.nodes.len();
        let used = self.slab.used;
        let mut counts = vec![0u32; n_nodes + 1];
        for i in 0..used {
            counts[self.slab.from[i] as usize + 1] += 1;
        }
        for i in 0..n_nodes {
            counts[i + 1] += counts[i];
        }
        let out_start = counts.clone();
        let mut cursor = counts;
        let mut out_order = vec![0u32; used];
        for i in 0..used {
            let from = self.slab.from[i] as usize;
            out_order[cursor[from] as usize] = i as u32;
            cursor[from] += 1;
        }
        self.slab.out_start = out_start;
        self.slab.out_order = out_order;
        self.adj_dirty = false;
    }

    /// Eligibility predicate for the fast-slab forward path: no gating, no
    /// self-loops, no dropout/stochastic behaviour, acyclic and not in
    /// training mode.
    pub fn can_use_fast_slab(&self) -> bool {
        !self.training
            && self.enforce_acyclic
            && !self.topo_dirty
            && self.topo_clean
            && self.gates.is_empty()
            && self.self_conns.is_empty()
            && self.dropout == 0.0
    }

    /// O(|nodes| + |connections|) forward path over the packed slab,
    /// restricted to acyclic, gate-free, self-loop-free, dropout-free
    /// graphs (`can_use_fast_slab`). Mirrors node-struct `state`/
    /// `activation` so downstream inspection stays consistent with the
    /// generic path.
    pub fn fast_slab_activate(&mut self, input: &[f64]) -> EngineResult<Vec<f64>> {
        self.validate_input_len(input)?;
        self.ensure_topo_order();
        self.ensure_slab();

        let n = self.nodes.len();
        let mut state = self.activation_pool.acquire(n);
        let mut activation = self.activation_pool.acquire(n);
        for (i, &v) in input.iter().enumerate() {
            activation[i] = v;
        }

        let topo = self.topo_order.clone();
        for &i in &topo {
            if i >= self.input_count {
                let squash = self.nodes[i].squash;
                activation[i] = squash.call(state[i] + self.nodes[i].bias);
            }
            let start = self.slab.out_start[i] as usize;
            let end = self.slab.out_start[i + 1] as usize;
            for &e in &self.slab.out_order[start..end] {
                let e = e as usize;
                if self.slab.flags[e] & FLAG_ENABLED == 0 {
                    continue;
                }
                let to = self.slab.to[e] as usize;
                state[to] += activation[i] * self.slab.weights[e];
            }
        }

        for i in 0..n {
            self.nodes[i].state = state[i];
            self.nodes[i].activation = activation[i];
        }

        let output = activation[n - self.output_count..].to_vec();
        self.activation_pool.release(state);
        self.activation_pool.release(activation);
        Ok(output)
    }
}
