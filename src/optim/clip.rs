//! Gradient clipping. Operates directly on the accumulated
//! `total_delta_weight`/`bias_total_delta` scratch values before the
//! optimizer step consumes them.

use crate::graph::Network;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClipMode {
    Norm,
    LayerwiseNorm,
    Percentile,
    LayerwisePercentile,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradClipConfig {
    pub mode: ClipMode,
    pub max_norm: Option<f64>,
    pub percentile: Option<f64>,
    #[serde(default)]
    pub separate_bias: bool,
}

/// One group's worth of mutable references into the scratch deltas it
/// covers, so clipping can be applied in place without re-walking the
/// graph for every group.
struct Group {
    weight_conns: Vec<crate::types::ConnId>,
    bias_nodes: Vec<usize>,
}

impl Network {
    fn non_input_node_indices(&self) -> Vec<usize> {
        (self.input_count..self.nodes.len()).collect()
    }

    fn group_connections(&self, idx: usize) -> Vec<crate::types::ConnId> {
        let mut ids = self.nodes[idx].incoming.clone();
        if let Some(scid) = self.nodes[idx].self_conn {
            ids.push(scid);
        }
        ids
    }

    fn grad_clip_groups(&self, layerwise: bool) -> Vec<Group> {
        if layerwise {
            self.non_input_node_indices()
                .into_iter()
                .map(|idx| Group {
                    weight_conns: self.group_connections(idx),
                    bias_nodes: vec![idx],
                })
                .collect()
        } else {
            let indices = self.non_input_node_indices();
            let mut weight_conns = Vec::new();
            for &idx in &indices {
                weight_conns.extend(self.group_connections(idx));
            }
            vec![Group {
                weight_conns,
                bias_nodes: indices,
            }]
        }
    }

    pub fn apply_gradient_clipping(&mut self, cfg: &GradClipConfig) {
        let layerwise = matches!(cfg.mode, ClipMode::LayerwiseNorm | ClipMode::LayerwisePercentile);
        let groups = self.grad_clip_groups(layerwise);
        let by_norm = matches!(cfg.mode, ClipMode::Norm | ClipMode::LayerwiseNorm);

        for group in groups {
            let mut values: Vec<f64> = group.weight_conns.iter().map(|&c| self.conn_pool[c.0].total_delta_weight).collect();
            if cfg.separate_bias {
                // biases clipped as their own group below
            } else {
                values.extend(group.bias_nodes.iter().map(|&n| self.nodes[n].bias_total_delta));
            }

            if by_norm {
                let max_norm = cfg.max_norm.unwrap_or(f64::INFINITY);
                let norm = (values.iter().map(|v| v * v).sum::<f64>()).sqrt();
                if norm > max_norm && norm > 0.0 {
                    let scale = max_norm / norm;
                    for &c in &group.weight_conns {
                        self.conn_pool[c.0].total_delta_weight *= scale;
                    }
                    if !cfg.separate_bias {
                        for &n in &group.bias_nodes {
                            self.nodes[n].bias_total_delta *= scale;
                        }
                    }
                }
            } else {
                let p = cfg.percentile.unwrap_or(100.0);
                let mut abs_sorted: Vec<f64> = values.iter().map(|v| v.abs()).collect();
                abs_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let n = abs_sorted.len();
                if n == 0 {
                    continue;
                }
                let rank = (((p / 100.0) * n as f64).floor() as isize - 1).clamp(0, n as isize - 1) as usize;
                let threshold = abs_sorted[rank];
                for &c in &group.weight_conns {
                    let v = &mut self.conn_pool[c.0].total_delta_weight;
                    *v = v.clamp(-threshold, threshold);
                }
                if !cfg.separate_bias {
                    for &n in &group.bias_nodes {
                        let v = &mut self.nodes[n].bias_total_delta;
                        *v = v.clamp(-threshold, threshold);
                    }
                }
            }

            if cfg.separate_bias {
                let mut bias_values: Vec<f64> = group.bias_nodes.iter().map(|&n| self.nodes[n].bias_total_delta).collect();
                if by_norm {
                    let max_norm = cfg.max_norm.unwrap_or(f64::INFINITY);
                    let norm = (bias_values.iter().map(|v| v * v).sum::<f64>()).sqrt();
                    if norm > max_norm && norm > 0.0 {
                        let scale = max_norm / norm;
                        for &n in &group.bias_nodes {
                            self.nodes[n].bias_total_delta *= scale;
                        }
                    }
                } else {
                    let p = cfg.percentile.unwrap_or(100.0);
                    let mut abs_sorted: Vec<f64> = bias_values.iter().map(|v| v.abs()).collect();
                    abs_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                    let n = abs_sorted.len();
                    if n > 0 {
                        let rank = (((p / 100.0) * n as f64).floor() as isize - 1).clamp(0, n as isize - 1) as usize;
                        let threshold = abs_sorted[rank];
                        for &n in &group.bias_nodes {
                            let v = &mut self.nodes[n].bias_total_delta;
                            *v = v.clamp(-threshold, threshold);
                        }
                    }
                }
                bias_values.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Network;
    use crate::types::NodeKind;

    #[test]
    fn norm_clipping_rescales_to_max_norm() {
        let mut net = Network::new(1, 1);
        for conn in net.conn_pool.iter_mut() {
            conn.total_delta_weight = 10.0;
        }
        let cfg = GradClipConfig {
            mode: ClipMode::Norm,
            max_norm: Some(1.0),
            percentile: None,
            separate_bias: false,
        };
        net.apply_gradient_clipping(&cfg);
        let norm: f64 = net
            .non_input_node_indices()
            .iter()
            .flat_map(|&idx| {
                let mut v: Vec<f64> = net.group_connections(idx).iter().map(|&c| net.conn_pool[c.0].total_delta_weight).collect();
                v.push(net.nodes[idx].bias_total_delta);
                v
            })
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn layerwise_groups_one_per_non_input_node() {
        let net = Network::new(2, 3);
        let groups = net.grad_clip_groups(true);
        assert_eq!(groups.len(), net.non_input_node_indices().len());
        let _ = NodeKind::Hidden;
    }
}
