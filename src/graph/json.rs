//! Network <-> JSON conversion per the wire format in SPEC_FULL.md §6.
//! DTO structs mirror `gran-prix`'s `#[derive(Serialize, Deserialize)]`
//! usage on `Tensor`/`Linear` (`src/tensor/mod.rs`, `src/layers/linear.rs`).

use crate::activation::Activation;
use crate::errors::{EngineError, EngineResult};
use crate::graph::connection::Connection;
use crate::graph::node::Node;
use crate::graph::Network;
use crate::types::{NodeId, NodeKind};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct NodeJson {
    #[serde(rename = "type")]
    kind: String,
    bias: f64,
    squash: String,
    mask: f64,
    index: usize,
}

#[derive(Serialize, Deserialize)]
struct ConnectionJson {
    from: usize,
    to: usize,
    weight: f64,
    gain: f64,
    gater: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct NetworkJson {
    input: usize,
    output: usize,
    dropout: f64,
    #[serde(default = "default_enforce_acyclic")]
    enforce_acyclic: bool,
    nodes: Vec<NodeJson>,
    connections: Vec<ConnectionJson>,
}

fn default_enforce_acyclic() -> bool {
    true
}

impl Network {
    pub fn to_json(&self) -> serde_json::Value {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| NodeJson {
                kind: n.kind.name().to_string(),
                bias: n.bias,
                squash: n.squash.name().to_string(),
                mask: n.mask,
                index: i,
            })
            .collect();

        let mut connections = Vec::with_capacity(self.connections.len() + self.self_conns.len());
        for &cid in self.connections.iter().chain(self.self_conns.iter()) {
            let c: &Connection = &self.conn_pool[cid.0];
            connections.push(ConnectionJson {
                from: c.from.0,
                to: c.to.0,
                weight: c.weight,
                gain: c.gain,
                gater: c.gater.map(|g| g.0),
            });
        }

        let doc = NetworkJson {
            input: self.input_count,
            output: self.output_count,
            dropout: self.dropout,
            enforce_acyclic: self.enforce_acyclic,
            nodes,
            connections,
        };
        serde_json::to_value(doc).expect("NetworkJson is always representable")
    }

    pub fn from_json(value: &serde_json::Value) -> EngineResult<Network> {
        let doc: NetworkJson = serde_json::from_value(value.clone())?;

        let mut net = Network::empty(doc.input, doc.output);
        net.dropout = doc.dropout;
        net.nodes.clear();
        // Replay with acyclic enforcement off: the persisted connection
        // order doesn't have to respect `from.0 < to.0`, and a network
        // saved with enforce_acyclic = false may contain genuinely
        // recurrent edges that connect() would otherwise refuse.
        net.enforce_acyclic = false;

        for n in &doc.nodes {
            let kind = NodeKind::from_name(&n.kind)
                .ok_or_else(|| EngineError::InvalidOption(format!("unknown node type {}", n.kind)))?;
            let squash = Activation::from_name(&n.squash)
                .ok_or_else(|| EngineError::UnknownActivation(n.squash.clone()))?;
            let mut node = Node::new(kind, squash);
            node.bias = n.bias;
            node.mask = n.mask;
            net.nodes.push(node);
        }

        for c in &doc.connections {
            let from = NodeId(c.from);
            let to = NodeId(c.to);
            let cid = net.connect(from, to, Some(c.weight));
            if let Some(cid) = cid {
                net.conn_pool[cid.0].gain = c.gain;
                if let Some(g) = c.gater {
                    net.gate(NodeId(g), cid);
                }
            }
        }

        net.enforce_acyclic = doc.enforce_acyclic;

        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use crate::activation::Activation;
    use crate::graph::Network;
    use crate::types::NodeKind;

    #[test]
    fn round_trip_preserves_activation_output() {
        let mut net = Network::new(2, 1);
        let hidden = net.add_node(NodeKind::Hidden, Activation::Tanh);
        net.connect(net.node_id(0), hidden, Some(0.3));
        net.connect(net.node_id(1), hidden, Some(-0.2));
        net.connect(hidden, net.node_id(net.nodes.len() - 1), Some(0.7));

        let input = [0.4, -0.6];
        let before = net.activate(&input).unwrap();

        let json = net.to_json();
        let mut restored = Network::from_json(&json).unwrap();
        let after = restored.activate(&input).unwrap();

        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn round_trip_preserves_recurrent_edges_and_enforce_acyclic_flag() {
        let mut net = Network::empty(1, 1);
        net.enforce_acyclic = false;
        let hidden = net.add_node(NodeKind::Hidden, Activation::Tanh);
        let input = net.node_id(0);
        let output = net.node_id(net.nodes.len() - 1);
        net.connect(input, hidden, Some(0.3));
        net.connect(hidden, output, Some(0.7));
        // Backward edge: only legal because enforce_acyclic is false.
        net.connect(output, hidden, Some(-0.5));
        assert_eq!(net.connection_ids().len(), 3);

        let json = net.to_json();
        let restored = Network::from_json(&json).unwrap();

        assert!(!restored.enforce_acyclic);
        assert_eq!(restored.connection_ids().len(), 3);
        let has_backward_edge = restored
            .connection_ids()
            .iter()
            .any(|&cid| restored.connection(cid).from == output && restored.connection(cid).to == hidden);
        assert!(has_backward_edge, "backward edge was dropped on JSON round trip");
    }
}
