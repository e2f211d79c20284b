//! Topological order cache. Grounded on the Kahn's-algorithm forward pass in
//! `other_examples/6a71a69c_aryavolkan-evolve__rust-evolve-native-src-neat_network.rs.rs`
//! (vec-based in-degree counting with a raw-order cycle fallback), adapted
//! to the connection-arena shape here.

use crate::graph::Network;

impl Network {
    /// Recomputes `topo_order` from `connections` (self-edges excluded).
    /// On cycle, falls back to the raw node order and leaves `topo_clean`
    /// false so the fast-slab path stays disabled.
    pub(crate) fn rebuild_topo_order(&mut self) {
        let n = self.nodes.len();
        let mut indegree = vec![0u32; n];
        for &cid in &self.connections {
            let conn = &self.conn_pool[cid.0];
            if conn.is_self() {
                continue;
            }
            indegree[conn.to.0] += 1;
        }

        let mut queue: std::collections::VecDeque<usize> = std::collections::VecDeque::new();
        for i in 0..n {
            if indegree[i] == 0 || self.nodes[i].is_input() {
                queue.push_back(i);
            }
        }
        // Inputs may have been pushed twice if already in-degree 0; dedupe
        // by tracking visitation instead of relying on queue uniqueness.
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            for &cid in &self.nodes[i].outgoing {
                let conn = &self.conn_pool[cid.0];
                if conn.is_self() || !conn.is_enabled() {
                    continue;
                }
                let to = conn.to.0;
                if indegree[to] > 0 {
                    indegree[to] -= 1;
                    if indegree[to] == 0 && !visited[to] {
                        queue.push_back(to);
                    }
                }
            }
        }

        if order.len() == n {
            self.topo_order = order;
            self.topo_clean = true;
        } else {
            self.topo_order = (0..n).collect();
            self.topo_clean = false;
        }
        self.topo_dirty = false;
    }

    pub(crate) fn ensure_topo_order(&mut self) {
        if self.topo_dirty {
            self.rebuild_topo_order();
        }
    }
}
