//! Cost ("loss") library. Generalizes `gran-prix`'s `Loss` trait
//! (`src/loss/mod.rs`, `MSE`) into a closed tagged enum, per the same
//! design-note §9 rationale as `activation::Activation`.

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

const PROB_EPS: f64 = 1e-15;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cost {
    Mse,
    Mae,
    Mape,
    Msle,
    BinaryMisclass,
    CrossEntropy,
    SoftmaxCrossEntropy,
    Focal { gamma: f64 },
    LabelSmoothing { epsilon: f64 },
    Hinge,
}

fn clamp_p(p: f64) -> f64 {
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

fn check_len(target: &[f64], output: &[f64]) -> EngineResult<()> {
    if target.len() != output.len() {
        return Err(EngineError::DimensionMismatch {
            expected: target.len(),
            found: output.len(),
        });
    }
    Ok(())
}

fn stable_softmax(output: &[f64]) -> Vec<f64> {
    let max = output.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = output.iter().map(|&o| (o - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl Cost {
    pub fn calculate(&self, target: &[f64], output: &[f64]) -> EngineResult<f64> {
        check_len(target, output)?;
        let n = target.len() as f64;
        let value = match self {
            Cost::Mse => target
                .iter()
                .zip(output)
                .map(|(t, o)| (t - o).powi(2))
                .sum::<f64>()
                / n,
            Cost::Mae => target.iter().zip(output).map(|(t, o)| (t - o).abs()).sum::<f64>() / n,
            Cost::Mape => {
                target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| ((t - o) / t.abs().max(PROB_EPS)).abs())
                    .sum::<f64>()
                    / n
            }
            Cost::Msle => target
                .iter()
                .zip(output)
                .map(|(t, o)| ((1.0 + t).max(PROB_EPS).ln() - (1.0 + o).max(PROB_EPS).ln()).powi(2))
                .sum::<f64>()
                / n,
            Cost::BinaryMisclass => {
                target
                    .iter()
                    .zip(output)
                    .filter(|(t, o)| t.round() != o.round())
                    .count() as f64
                    / n
            }
            Cost::CrossEntropy => {
                -target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| {
                        let p = clamp_p(*o);
                        t * p.ln() + (1.0 - t) * (1.0 - p).ln()
                    })
                    .sum::<f64>()
                    / n
            }
            Cost::SoftmaxCrossEntropy => {
                let probs = stable_softmax(output);
                -target
                    .iter()
                    .zip(probs)
                    .map(|(t, p)| t * clamp_p(p).ln())
                    .sum::<f64>()
            }
            Cost::Focal { gamma } => {
                -target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| {
                        let p = clamp_p(*o);
                        (1.0 - p).powf(*gamma) * t * p.ln() + p.powf(*gamma) * (1.0 - t) * (1.0 - p).ln()
                    })
                    .sum::<f64>()
                    / n
            }
            Cost::LabelSmoothing { epsilon } => {
                -target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| {
                        let smoothed = t * (1.0 - epsilon) + epsilon / 2.0;
                        let p = clamp_p(*o);
                        smoothed * p.ln() + (1.0 - smoothed) * (1.0 - p).ln()
                    })
                    .sum::<f64>()
                    / n
            }
            Cost::Hinge => target
                .iter()
                .zip(output)
                .map(|(t, o)| (1.0 - t * o).max(0.0))
                .sum::<f64>()
                / n,
        };
        Ok(value)
    }

    pub fn name(&self) -> String {
        match self {
            Cost::Mse => "mse".into(),
            Cost::Mae => "mae".into(),
            Cost::Mape => "mape".into(),
            Cost::Msle => "msle".into(),
            Cost::BinaryMisclass => "binary-misclass".into(),
            Cost::CrossEntropy => "cross-entropy".into(),
            Cost::SoftmaxCrossEntropy => "softmax-ce".into(),
            Cost::Focal { .. } => "focal".into(),
            Cost::LabelSmoothing { .. } => "label-smoothing".into(),
            Cost::Hinge => "hinge".into(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "mse" => Cost::Mse,
            "mae" => Cost::Mae,
            "mape" => Cost::Mape,
            "msle" => Cost::Msle,
            "binary-misclass" => Cost::BinaryMisclass,
            "cross-entropy" => Cost::CrossEntropy,
            "softmax-ce" => Cost::SoftmaxCrossEntropy,
            "focal" => Cost::Focal { gamma: 2.0 },
            "label-smoothing" => Cost::LabelSmoothing { epsilon: 0.1 },
            "hinge" => Cost::Hinge,
            _ => return None,
        })
    }
}

impl Default for Cost {
    fn default() -> Self {
        Cost::Mse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_zero_for_perfect_prediction() {
        let t = [0.1, 0.5, 0.9];
        assert!(Cost::Mse.calculate(&t, &t).unwrap() < 1e-15);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let err = Cost::Mse.calculate(&[1.0, 2.0], &[1.0]).unwrap_err();
        matches!(err, EngineError::DimensionMismatch { .. });
    }

    #[test]
    fn softmax_cross_entropy_is_stable_for_large_logits() {
        let t = [0.0, 1.0, 0.0];
        let o = [1000.0, 1000.0, -1000.0];
        let v = Cost::SoftmaxCrossEntropy.calculate(&t, &o).unwrap();
        assert!(v.is_finite());
    }

    #[test]
    fn name_round_trip() {
        for c in [Cost::Mse, Cost::Mae, Cost::CrossEntropy, Cost::Hinge] {
            let name = c.name();
            assert_eq!(Cost::from_name(&name).unwrap().name(), name);
        }
    }
}
