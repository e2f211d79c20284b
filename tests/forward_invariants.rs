use neurite_core::{Activation, Network, NodeKind};

#[test]
fn activate_output_length_matches_output_count() {
    let mut net = Network::new(3, 2);
    let out = net.activate(&[0.1, 0.2, 0.3]).unwrap();
    assert_eq!(out.len(), 2);
}

#[test]
fn activate_rejects_wrong_input_length() {
    let mut net = Network::new(3, 2);
    let err = net.activate(&[0.1, 0.2]).unwrap_err();
    assert!(matches!(err, neurite_core::EngineError::DimensionMismatch { expected: 3, found: 2 }));
}

#[test]
fn connect_populates_incoming_and_outgoing() {
    let mut net = Network::new(0, 0);
    let a = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let b = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let cid = net.connect(a, b, Some(0.5)).unwrap();
    assert!(net.nodes[b.0].incoming.contains(&cid));
    assert!(net.nodes[a.0].outgoing.contains(&cid));
}

#[test]
fn self_connection_is_excluded_from_incoming_and_outgoing() {
    let mut net = Network::new(0, 0);
    let a = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let cid = net.connect(a, a, Some(0.4)).unwrap();
    assert_eq!(net.nodes[a.0].self_conn, Some(cid));
    assert!(!net.nodes[a.0].incoming.contains(&cid));
    assert!(!net.nodes[a.0].outgoing.contains(&cid));
}

#[test]
fn disconnect_is_idempotent() {
    let mut net = Network::new(1, 1);
    let from = net.node_id(0);
    let to = net.node_id(1);
    net.disconnect(from, to);
    net.disconnect(from, to);
}

#[test]
fn gate_then_ungate_clears_flag_and_list_membership() {
    let mut net = Network::new(1, 1);
    let from = net.node_id(0);
    let gater = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let cid = net.nodes[from.0].outgoing[0];
    net.gate(gater, cid);
    assert!(net.nodes[gater.0].gated.contains(&cid));
    net.ungate(cid);
    assert!(!net.nodes[gater.0].gated.contains(&cid));
}

#[test]
fn gate_registers_xtrace_on_sources_incoming_not_outgoing() {
    // I -> H -> O, with G gating H -> O.
    let mut net = Network::new(0, 0);
    let i = net.add_node(NodeKind::Hidden, Activation::Identity);
    let h = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let o = net.add_node(NodeKind::Hidden, Activation::Identity);
    let g = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let i_h = net.connect(i, h, Some(0.5)).unwrap();
    let h_o = net.connect(h, o, Some(0.3)).unwrap();

    net.gate(g, h_o);

    // update_traces reads xtrace_nodes off a node's incoming (+ self)
    // connections when that node activates, so the gater belongs on
    // H's incoming edge (I -> H), never on the gated edge itself.
    assert!(net.connection(i_h).xtrace_nodes.contains(&g));
    assert!(!net.connection(h_o).xtrace_nodes.contains(&g));
}

#[test]
fn gated_connection_weight_moves_during_training() {
    use neurite_core::{Cost, OptimizerConfig, OptimizerKind, TrainSetParams};

    // I -> H -> O, with G gating H -> O and also feeding H directly.
    // Hidden nodes are inserted just before the output block, so their ids
    // are only stable once every insertion is done — fetch `i`/`o` fresh
    // afterward rather than capturing them from `add_node`'s own return.
    let mut net = Network::empty(1, 1);
    let h = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let g = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let i = net.node_id(0);
    let o = net.node_id(net.nodes.len() - 1);

    net.connect(i, h, Some(0.4));
    let h_o = net.connect(h, o, Some(0.3)).unwrap();
    net.connect(i, g, Some(0.6));
    net.gate(g, h_o);

    let before = net.connection(h_o).weight;

    let dataset = vec![(vec![0.8], vec![0.2]), (vec![0.2], vec![0.9])];
    let params = TrainSetParams {
        dataset: &dataset,
        batch_size: 1,
        accumulation_steps: 1,
        accumulation_reduction: neurite_core::AccumulationReduction::Average,
        rate: 0.5,
        momentum: 0.0,
        weight_decay: 0.0,
        cost: Cost::Mse,
        optimizer: OptimizerConfig {
            kind: OptimizerKind::Sgd,
            ..Default::default()
        },
    };
    for _ in 0..5 {
        net.train_set(&params).unwrap();
    }

    let after = net.connection(h_o).weight;
    assert!((before - after).abs() > 1e-9, "gated connection weight never moved: {before} vs {after}");
}

#[test]
fn enforce_acyclic_silently_refuses_backward_connect() {
    let mut net = Network::new(0, 0);
    let a = net.add_node(NodeKind::Hidden, Activation::Tanh);
    let b = net.add_node(NodeKind::Hidden, Activation::Tanh);
    assert!(net.connect(a, b, Some(0.1)).is_some());
    assert!(net.connect(b, a, Some(0.1)).is_none());
}

#[test]
fn fast_slab_path_matches_generic_path_on_acyclic_network() {
    let mut net = Network::new(5, 3);
    for _ in 0..30 {
        let h = net.add_node(NodeKind::Hidden, Activation::Relu);
        let first_output = net.node_id(net.nodes.len() - net.output_count);
        net.connect(net.node_id(0), h, Some(0.2));
        net.connect(h, first_output, Some(-0.3));
    }
    let input = [0.1, -0.2, 0.3, 0.4, -0.5];

    let fast = net.activate(&input).unwrap();
    assert!(net.can_use_fast_slab());

    net.training = true;
    let generic = net.activate_generic(&input).unwrap();
    net.training = false;

    for (a, b) in fast.iter().zip(generic.iter()) {
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }
}

#[test]
fn clear_resets_transient_state_but_keeps_structure() {
    let mut net = Network::new(2, 1);
    net.activate(&[0.5, -0.5]).unwrap();
    assert!(net.nodes.iter().any(|n| n.activation != 0.0));
    let conn_count_before = net.connection_ids().len();
    net.clear();
    assert!(net.nodes[net.input_count..].iter().all(|n| n.activation == 0.0));
    assert_eq!(net.connection_ids().len(), conn_count_before);
}
