//! Error-smoothing strategies used for both the monitored-error buffer and
//! the independent plateau buffer in the orchestrator loop.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SmoothingKind {
    Sma,
    Ema,
    AdaptiveEma,
    Median,
    Gaussian,
    Trimmed,
    Wma,
}

impl Default for SmoothingKind {
    fn default() -> Self {
        SmoothingKind::Ema
    }
}

/// Running state the `ema`/`adaptive-ema` strategies need carried across
/// calls (their output depends on more than just the current buffer
/// contents).
#[derive(Clone, Copy, Debug, Default)]
pub struct SmoothingState {
    ema: Option<f64>,
    fast_ema: Option<f64>,
}

fn mean(buffer: &VecDeque<f64>) -> f64 {
    buffer.iter().sum::<f64>() / buffer.len() as f64
}

fn variance(buffer: &VecDeque<f64>, m: f64) -> f64 {
    buffer.iter().map(|x| (x - m).powi(2)).sum::<f64>() / buffer.len() as f64
}

pub fn smooth(buffer: &VecDeque<f64>, kind: SmoothingKind, alpha: Option<f64>, window: usize, trimmed_ratio: f64, state: &mut SmoothingState) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    let latest = *buffer.back().unwrap();
    let alpha_base = alpha.unwrap_or(2.0 / (window as f64 + 1.0));

    match kind {
        SmoothingKind::Sma => mean(buffer),
        SmoothingKind::Ema => {
            let next = match state.ema {
                None => latest,
                Some(e) => e + alpha_base * (latest - e),
            };
            state.ema = Some(next);
            next
        }
        SmoothingKind::AdaptiveEma => {
            let baseline = match state.ema {
                None => latest,
                Some(e) => e + alpha_base * (latest - e),
            };
            state.ema = Some(baseline);

            let m = mean(buffer);
            let var = variance(buffer, m);
            let alpha_fast = (alpha_base * (1.0 + 2.0 * var / m.powi(2).max(1e-8))).min(0.95);
            let fast = match state.fast_ema {
                None => latest,
                Some(e) => e + alpha_fast * (latest - e),
            };
            state.fast_ema = Some(fast);

            fast.min(baseline)
        }
        SmoothingKind::Median => {
            let mut sorted: Vec<f64> = buffer.iter().copied().collect();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            sorted[sorted.len() / 2]
        }
        SmoothingKind::Gaussian => {
            let n = buffer.len();
            let sigma = (window as f64 / 3.0).max(1e-8);
            let center = (n - 1) as f64;
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for (i, x) in buffer.iter().enumerate() {
                let d = (i as f64 - center) / sigma;
                let w = (-0.5 * d * d).exp();
                weighted_sum += w * x;
                weight_total += w;
            }
            weighted_sum / weight_total
        }
        SmoothingKind::Trimmed => {
            let r = trimmed_ratio.clamp(0.0, 0.49);
            let mut sorted: Vec<f64> = buffer.iter().copied().collect();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = sorted.len();
            let mut drop = ((n as f64) * r).floor() as usize;
            if drop * 2 >= n {
                drop = 0;
            }
            let kept = &sorted[drop..n - drop];
            kept.iter().sum::<f64>() / kept.len() as f64
        }
        SmoothingKind::Wma => {
            let n = buffer.len();
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for (i, x) in buffer.iter().enumerate() {
                let w = (i + 1) as f64;
                weighted_sum += w * x;
                weight_total += w;
            }
            let _ = n;
            weighted_sum / weight_total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(values: &[f64]) -> VecDeque<f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn sma_is_arithmetic_mean() {
        let b = buf(&[1.0, 2.0, 3.0]);
        let mut state = SmoothingState::default();
        assert!((smooth(&b, SmoothingKind::Sma, None, 3, 0.1, &mut state) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn median_is_middle_element() {
        let b = buf(&[5.0, 1.0, 3.0]);
        let mut state = SmoothingState::default();
        assert_eq!(smooth(&b, SmoothingKind::Median, None, 3, 0.1, &mut state), 3.0);
    }

    #[test]
    fn wma_weights_recent_values_more() {
        let b = buf(&[0.0, 0.0, 10.0]);
        let mut state = SmoothingState::default();
        let v = smooth(&b, SmoothingKind::Wma, None, 3, 0.1, &mut state);
        assert!(v > 10.0 / 3.0);
    }

    #[test]
    fn ema_converges_towards_constant_series() {
        let mut state = SmoothingState::default();
        let mut last = 0.0;
        for _ in 0..50 {
            let b = buf(&[1.0]);
            last = smooth(&b, SmoothingKind::Ema, Some(0.3), 5, 0.1, &mut state);
        }
        assert!((last - 1.0).abs() < 1e-6);
    }
}
