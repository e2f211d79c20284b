//! Activation ("squash") library.
//!
//! `gran-prix` models `ReLU`/`Sigmoid` as `#[typetag::serde]` trait objects
//! (`src/activations/mod.rs`). Design note §9 calls for a tagged enum
//! instead so the forward/backward hot paths stay monomorphic; `typetag` is
//! dropped accordingly (see DESIGN.md).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Identity,
    Logistic,
    Tanh,
    Relu,
    Step,
    Softsign,
    Sinusoid,
    Gaussian,
    BentIdentity,
    Bipolar,
    BipolarSigmoid,
    HardTanh,
    Absolute,
    Inverse,
    Selu,
    Softplus,
    Swish,
    Gelu,
    Mish,
}

const SELU_ALPHA: f64 = 1.6732632423543772;
const SELU_SCALE: f64 = 1.0507009873554805;
const GELU_K: f64 = 0.7978845608028654; // sqrt(2/pi)
const GELU_C: f64 = 0.044715;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `ln(1 + e^x)`, stable for `|x| > 30`.
fn softplus(x: f64) -> f64 {
    if x > 30.0 {
        x
    } else if x < -30.0 {
        x.exp()
    } else {
        (1.0 + x.exp()).ln()
    }
}

impl Activation {
    pub fn call(self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Logistic => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
            Activation::Step => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Softsign => x / (1.0 + x.abs()),
            Activation::Sinusoid => x.sin(),
            Activation::Gaussian => (-x * x).exp(),
            Activation::BentIdentity => (((x * x) + 1.0).sqrt() - 1.0) / 2.0 + x,
            Activation::Bipolar => {
                if x > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            Activation::BipolarSigmoid => 2.0 * sigmoid(x) - 1.0,
            Activation::HardTanh => x.clamp(-1.0, 1.0),
            Activation::Absolute => x.abs(),
            Activation::Inverse => 1.0 - x,
            Activation::Selu => {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * (x.exp() - 1.0)
                }
            }
            Activation::Softplus => softplus(x),
            Activation::Swish => x * sigmoid(x),
            Activation::Gelu => {
                let u = GELU_K * (x + GELU_C * x * x * x);
                0.5 * x * (1.0 + u.tanh())
            }
            Activation::Mish => x * softplus(x).tanh(),
        }
    }

    /// `f'(x)`, the derivative with respect to the pre-activation state.
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Activation::Identity => 1.0,
            Activation::Logistic => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Step => 0.0,
            Activation::Softsign => {
                let d = 1.0 + x.abs();
                1.0 / (d * d)
            }
            Activation::Sinusoid => x.cos(),
            Activation::Gaussian => -2.0 * x * (-x * x).exp(),
            Activation::BentIdentity => x / (2.0 * ((x * x) + 1.0).sqrt()) + 1.0,
            Activation::Bipolar => 0.0,
            Activation::BipolarSigmoid => {
                let f = self.call(x);
                (1.0 - f * f) / 2.0
            }
            Activation::HardTanh => {
                if x > -1.0 && x < 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Absolute => {
                if x >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            Activation::Inverse => -1.0,
            Activation::Selu => {
                if x > 0.0 {
                    SELU_SCALE
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp()
                }
            }
            Activation::Softplus => sigmoid(x),
            Activation::Swish => {
                let s = sigmoid(x);
                let f = x * s;
                s + f * (1.0 - s)
            }
            Activation::Gelu => {
                let u = GELU_K * (x + GELU_C * x * x * x);
                let t = u.tanh();
                let du = GELU_K * (1.0 + 3.0 * GELU_C * x * x);
                0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * du
            }
            Activation::Mish => {
                let sp = softplus(x);
                let t = sp.tanh();
                let s = sigmoid(x);
                t + x * s * (1.0 - t * t)
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Logistic => "logistic",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::Step => "step",
            Activation::Softsign => "softsign",
            Activation::Sinusoid => "sinusoid",
            Activation::Gaussian => "gaussian",
            Activation::BentIdentity => "bent-identity",
            Activation::Bipolar => "bipolar",
            Activation::BipolarSigmoid => "bipolar-sigmoid",
            Activation::HardTanh => "hard-tanh",
            Activation::Absolute => "absolute",
            Activation::Inverse => "inverse",
            Activation::Selu => "selu",
            Activation::Softplus => "softplus",
            Activation::Swish => "swish",
            Activation::Gelu => "gelu",
            Activation::Mish => "mish",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "identity" => Activation::Identity,
            "logistic" => Activation::Logistic,
            "tanh" => Activation::Tanh,
            "relu" => Activation::Relu,
            "step" => Activation::Step,
            "softsign" => Activation::Softsign,
            "sinusoid" => Activation::Sinusoid,
            "gaussian" => Activation::Gaussian,
            "bent-identity" => Activation::BentIdentity,
            "bipolar" => Activation::Bipolar,
            "bipolar-sigmoid" => Activation::BipolarSigmoid,
            "hard-tanh" => Activation::HardTanh,
            "absolute" => Activation::Absolute,
            "inverse" => Activation::Inverse,
            "selu" => Activation::Selu,
            "softplus" => Activation::Softplus,
            "swish" => Activation::Swish,
            "gelu" => Activation::Gelu,
            "mish" => Activation::Mish,
            _ => return None,
        })
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Logistic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_variants_finite_on_wide_range() {
        let variants = [
            Activation::Identity,
            Activation::Logistic,
            Activation::Tanh,
            Activation::Relu,
            Activation::Step,
            Activation::Softsign,
            Activation::Sinusoid,
            Activation::Gaussian,
            Activation::BentIdentity,
            Activation::Bipolar,
            Activation::BipolarSigmoid,
            Activation::HardTanh,
            Activation::Absolute,
            Activation::Inverse,
            Activation::Selu,
            Activation::Softplus,
            Activation::Swish,
            Activation::Gelu,
            Activation::Mish,
        ];
        for a in variants {
            for x in [-1000.0, -50.0, -1.0, 0.0, 1.0, 50.0, 1000.0] {
                assert!(a.call(x).is_finite(), "{:?} not finite at {}", a, x);
                assert!(a.derivative(x).is_finite(), "{:?}' not finite at {}", a, x);
            }
        }
    }

    #[test]
    fn name_round_trip() {
        let variants = [
            Activation::Identity,
            Activation::Logistic,
            Activation::Tanh,
            Activation::Relu,
            Activation::Softplus,
            Activation::Mish,
        ];
        for a in variants {
            assert_eq!(Activation::from_name(a.name()), Some(a));
        }
        assert_eq!(Activation::from_name("nonexistent"), None);
    }

    #[test]
    fn softplus_stable_for_large_magnitude() {
        assert!(Activation::Softplus.call(1000.0).is_finite());
        assert!(Activation::Softplus.call(-1000.0) >= 0.0);
        assert!((Activation::Softplus.call(1000.0) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn logistic_derivative_matches_numeric() {
        let x = 0.37;
        let h = 1e-6;
        let numeric = (Activation::Logistic.call(x + h) - Activation::Logistic.call(x - h)) / (2.0 * h);
        assert!((Activation::Logistic.derivative(x) - numeric).abs() < 1e-6);
    }
}
