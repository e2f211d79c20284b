use neurite_core::{
    Activation, ClipMode, Cost, GradClipConfig, MixedPrecisionConfig, Network, NodeKind,
    OptimizerConfig, OptimizerKind, TrainOptions, TrainSetParams,
};

#[test]
fn linear_network_fits_doubling_function_under_sgd() {
    let mut net = Network::new(1, 1);
    net.nodes[1].squash = Activation::Identity;
    let cid = net.nodes[0].outgoing[0];
    net.connection_mut(cid).weight = 0.1;
    net.nodes[1].bias = 0.0;

    let dataset: Vec<(Vec<f64>, Vec<f64>)> = (0..20).map(|i| {
        let x = i as f64 * 0.1 - 1.0;
        (vec![x], vec![2.0 * x])
    }).collect();

    let opts = TrainOptions {
        iterations: Some(200),
        rate: 0.1,
        cost: Cost::Mse,
        optimizer: OptimizerConfig { kind: OptimizerKind::Sgd, ..Default::default() },
        ..Default::default()
    };
    let result = net.train(&dataset, opts).unwrap();

    assert!(result.error <= 1e-3, "final error {}", result.error);
    let weight = net.connection(cid).weight;
    assert!((weight - 2.0).abs() < 0.02, "weight converged to {}", weight);
}

#[test]
fn xor_mlp_learns_with_adam() {
    let mut net = Network::new(2, 1);
    net.disconnect(net.node_id(0), net.node_id(2));
    net.disconnect(net.node_id(1), net.node_id(2));

    let hidden: Vec<_> = (0..4).map(|_| net.add_node(NodeKind::Hidden, Activation::Tanh)).collect();
    for &h in &hidden {
        net.connect(net.node_id(0), h, None);
        net.connect(net.node_id(1), h, None);
        net.connect(h, net.node_id(net.nodes.len() - 1), None);
    }

    let dataset = vec![
        (vec![0.0, 0.0], vec![0.0]),
        (vec![0.0, 1.0], vec![1.0]),
        (vec![1.0, 0.0], vec![1.0]),
        (vec![1.0, 1.0], vec![0.0]),
    ];

    let opts = TrainOptions {
        iterations: Some(3000),
        rate: 0.1,
        cost: Cost::Mse,
        optimizer: OptimizerConfig { kind: OptimizerKind::Adam, rate: 0.2, ..Default::default() },
        batch_size: 4,
        accumulation_steps: 1,
        ..Default::default()
    };
    let result = net.train(&dataset, opts).unwrap();
    assert!(result.error <= 0.25, "xor final error {}", result.error);

    for (input, target) in &dataset {
        let out = net.activate(input).unwrap();
        let predicted_high = out[0] > 0.5;
        let target_high = target[0] > 0.5;
        assert_eq!(predicted_high, target_high, "input {:?} out {:?}", input, out);
    }
}

#[test]
fn gradient_clipping_rescales_injected_gradient_to_unit_norm() {
    let mut net = Network::new(1, 1);
    let ids: Vec<_> = net.connection_ids().to_vec();
    for id in &ids {
        net.connection_mut(*id).total_delta_weight = 10.0;
    }
    net.current_grad_clip = Some(GradClipConfig {
        mode: ClipMode::Norm,
        max_norm: Some(1.0),
        percentile: None,
        separate_bias: false,
    });
    net.apply_gradient_clipping(&net.current_grad_clip.clone().unwrap());

    let sum_sq: f64 = ids.iter().map(|id| net.connection(*id).total_delta_weight.powi(2)).sum::<f64>()
        + net.nodes[net.input_count..].iter().map(|n| n.bias_total_delta * n.bias_total_delta).sum::<f64>();
    assert!((sum_sq.sqrt() - 1.0).abs() < 1e-9);
}

#[test]
fn mixed_precision_overflow_is_recovered_mid_training() {
    let mut net = Network::new(1, 1);
    net.mixed_precision = Some(neurite_core::MixedPrecisionState {
        cfg: MixedPrecisionConfig { force_next_overflow: true, ..Default::default() },
        ..Default::default()
    });

    let params = TrainSetParams {
        dataset: &[(vec![0.5], vec![1.0])],
        batch_size: 1,
        accumulation_steps: 1,
        accumulation_reduction: neurite_core::AccumulationReduction::Average,
        rate: 0.1,
        momentum: 0.0,
        weight_decay: 0.0,
        cost: Cost::Mse,
        optimizer: OptimizerConfig { kind: OptimizerKind::Adam, ..Default::default() },
    };
    let before_scale = net.mixed_precision.as_ref().unwrap().cfg.loss_scale;
    net.train_set(&params).unwrap();
    let after_scale = net.mixed_precision.as_ref().unwrap().cfg.loss_scale;

    assert!(after_scale < before_scale);
    assert!(net.last_overflow_step.is_some());
}

#[test]
fn dropout_masks_some_hidden_nodes_during_training() {
    let mut net = Network::new(1, 1);
    for _ in 0..200 {
        let h = net.add_node(NodeKind::Hidden, Activation::Tanh);
        net.connect(net.node_id(0), h, Some(0.1));
        net.connect(h, net.node_id(net.nodes.len() - 1), Some(0.1));
    }
    net.dropout = 0.5;

    let params = TrainSetParams {
        dataset: &[(vec![0.3], vec![0.3])],
        batch_size: 1,
        accumulation_steps: 1,
        accumulation_reduction: neurite_core::AccumulationReduction::Average,
        rate: 0.1,
        momentum: 0.0,
        weight_decay: 0.0,
        cost: Cost::Mse,
        optimizer: OptimizerConfig { kind: OptimizerKind::Sgd, ..Default::default() },
    };
    net.train_set(&params).unwrap();

    let hidden_masks: Vec<f64> = net.nodes.iter().filter(|n| matches!(n.kind, NodeKind::Hidden)).map(|n| n.mask).collect();
    assert!(hidden_masks.iter().any(|&m| m == 0.0), "expected at least one masked hidden node out of 200");
    assert!(hidden_masks.iter().any(|&m| m == 1.0), "expected at least one unmasked hidden node out of 200");

    let input_output_masks_untouched = net.nodes[..net.input_count].iter().all(|n| n.mask == 1.0)
        && net.nodes[net.nodes.len() - net.output_count..].iter().all(|n| n.mask == 1.0);
    assert!(input_output_masks_untouched, "dropout must never mask input/output nodes");
}

#[test]
fn train_resets_dropout_and_masks_after_loop() {
    let mut net = Network::new(1, 1);
    for _ in 0..20 {
        let h = net.add_node(NodeKind::Hidden, Activation::Tanh);
        net.connect(net.node_id(0), h, Some(0.1));
        net.connect(h, net.node_id(net.nodes.len() - 1), Some(0.1));
    }

    let dataset = vec![(vec![0.3], vec![0.3])];
    let opts = TrainOptions {
        iterations: Some(5),
        rate: 0.1,
        cost: Cost::Mse,
        optimizer: OptimizerConfig { kind: OptimizerKind::Sgd, ..Default::default() },
        dropout: 0.5,
        ..Default::default()
    };
    net.train(&dataset, opts).unwrap();

    assert_eq!(net.dropout, 0.0);
    assert!(net.nodes.iter().all(|n| n.mask == 1.0));
}

#[test]
fn early_stopping_via_median_smoothing_terminates_before_iteration_cap() {
    let mut net = Network::new(1, 1);
    let dataset = vec![(vec![0.3], vec![0.3])];

    let opts = TrainOptions {
        iterations: Some(200),
        rate: 0.2,
        cost: Cost::Mse,
        optimizer: OptimizerConfig { kind: OptimizerKind::Sgd, ..Default::default() },
        moving_average_window: 5,
        moving_average_type: neurite_core::SmoothingKind::Median,
        early_stop_patience: Some(3),
        early_stop_min_delta: 1e-6,
        ..Default::default()
    };
    let result = net.train(&dataset, opts).unwrap();
    assert!(result.iterations < 200, "expected early stop, ran {} iterations", result.iterations);
}
