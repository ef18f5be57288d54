use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::EncodedVector;

/// Half-width of the band reported around every prediction.
///
/// This is a fixed presentation margin, not a statistical confidence bound:
/// it says nothing about the model's actual uncertainty.
pub(crate) const PRICE_MARGIN: f64 = 20_000.0;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum EstimateError {
    #[error("model expects {expected} features, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
    #[error("model produced a non-finite price from log-scale output {0}")]
    NonFinite(f64),
}

/// A single node of a regression tree, addressed by index within its tree.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Node {
    /// Rows with `x[feature] <= threshold` go to `left`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct Tree {
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => i = if x[feature] <= threshold { left } else { right },
                Node::Leaf { value } => return value,
            }
        }
    }

    /// Children must point forward, which rules out cycles and guarantees
    /// `predict` terminates.
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = *node
            {
                if feature >= n_features {
                    return Err(format!(
                        "node {i} splits on feature {feature}, model has {n_features}"
                    ));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {i} has a non-finite threshold"));
                }
                for child in [left, right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {i} has invalid child index {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A trained regressor predicting `ln(1 + price)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Regressor {
    /// Additive ensemble of regression trees, as exported from gradient
    /// boosting libraries.
    GradientBoosting {
        n_features: usize,
        base_score: f64,
        trees: Vec<Tree>,
    },
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
}

impl Regressor {
    pub(crate) fn n_features(&self) -> usize {
        match self {
            Self::GradientBoosting { n_features, .. } => *n_features,
            Self::Linear { coefficients, .. } => coefficients.len(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::GradientBoosting {
                n_features,
                base_score,
                trees,
            } => {
                if !base_score.is_finite() {
                    return Err("base score is not finite".to_string());
                }
                for (t, tree) in trees.iter().enumerate() {
                    tree.validate(*n_features)
                        .map_err(|e| format!("tree {t}: {e}"))?;
                }
                Ok(())
            }
            Self::Linear {
                intercept,
                coefficients,
            } => {
                if intercept.is_finite() && coefficients.iter().all(|c| c.is_finite()) {
                    Ok(())
                } else {
                    Err("linear model has non-finite parameters".to_string())
                }
            }
        }
    }

    fn predict(&self, x: &[f64]) -> f64 {
        match self {
            Self::GradientBoosting {
                base_score, trees, ..
            } => base_score + trees.iter().map(|tree| tree.predict(x)).sum::<f64>(),
            Self::Linear {
                intercept,
                coefficients,
            } => {
                intercept
                    + coefficients
                        .iter()
                        .zip(x)
                        .map(|(c, v)| c * v)
                        .sum::<f64>()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct PredictionResult {
    pub(crate) point_estimate: f64,
    pub(crate) interval_low: f64,
    pub(crate) interval_high: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct PriceEstimator {
    model: Regressor,
}

impl PriceEstimator {
    /// The model must already have passed [`Regressor::validate`].
    pub(crate) fn new(model: Regressor) -> Self {
        Self { model }
    }

    pub(crate) fn estimate(&self, x: &EncodedVector) -> Result<PredictionResult, EstimateError> {
        let expected = self.model.n_features();
        if x.len() != expected {
            return Err(EstimateError::WidthMismatch {
                expected,
                actual: x.len(),
            });
        }
        let log_price = self.model.predict(x.as_slice());
        let point_estimate = log_price.exp_m1();
        if !point_estimate.is_finite() {
            return Err(EstimateError::NonFinite(log_price));
        }
        Ok(PredictionResult {
            point_estimate,
            interval_low: point_estimate - PRICE_MARGIN,
            interval_high: point_estimate + PRICE_MARGIN,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FeatureCodec, PolynomialExpander, ZipcodeEncoder};
    use crate::features::sample_record;

    fn codec() -> FeatureCodec {
        let encoder = ZipcodeEncoder::new(vec!["98001".to_string()]);
        FeatureCodec::new(encoder, PolynomialExpander::new(7)).unwrap()
    }

    fn stump(width: usize) -> Regressor {
        Regressor::GradientBoosting {
            n_features: width,
            base_score: 12.0,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split {
                        feature: 0,
                        threshold: 2000.0,
                        left: 1,
                        right: 2,
                    },
                    Node::Leaf { value: 0.5 },
                    Node::Leaf { value: 1.0 },
                ],
            }],
        }
    }

    #[test]
    fn interval_is_fixed_margin() {
        let codec = codec();
        let estimator = PriceEstimator::new(stump(codec.width()));
        let result = estimator
            .estimate(&codec.encode(&sample_record(1500.0, "98001")).unwrap())
            .unwrap();
        assert_eq!(result.interval_low, result.point_estimate - 20_000.0);
        assert_eq!(result.interval_high, result.point_estimate + 20_000.0);
    }

    #[test]
    fn inverts_log_target() {
        let codec = codec();
        let estimator = PriceEstimator::new(stump(codec.width()));
        let small = estimator
            .estimate(&codec.encode(&sample_record(1500.0, "98001")).unwrap())
            .unwrap();
        let large = estimator
            .estimate(&codec.encode(&sample_record(2500.0, "98001")).unwrap())
            .unwrap();
        assert_eq!(small.point_estimate, 12.5f64.exp_m1());
        assert_eq!(large.point_estimate, 13.0f64.exp_m1());
    }

    #[test]
    fn linear_model() {
        let codec = codec();
        let mut coefficients = vec![0.0; codec.width()];
        coefficients[0] = 0.001;
        let estimator = PriceEstimator::new(Regressor::Linear {
            intercept: 11.0,
            coefficients,
        });
        let result = estimator
            .estimate(&codec.encode(&sample_record(1000.0, "98001")).unwrap())
            .unwrap();
        assert!((result.point_estimate - 12.0f64.exp_m1()).abs() < 1e-6);
    }

    #[test]
    fn rejects_wrong_width() {
        let codec = codec();
        let estimator = PriceEstimator::new(stump(codec.width() + 1));
        let err = estimator
            .estimate(&codec.encode(&sample_record(1500.0, "98001")).unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            EstimateError::WidthMismatch {
                expected: codec.width() + 1,
                actual: codec.width()
            }
        );
    }

    #[test]
    fn validate_catches_bad_trees() {
        let looping = Regressor::GradientBoosting {
            n_features: 3,
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![Node::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 0,
                    right: 0,
                }],
            }],
        };
        assert!(looping.validate().is_err());

        let out_of_range = Regressor::GradientBoosting {
            n_features: 3,
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split {
                        feature: 7,
                        threshold: 1.0,
                        left: 1,
                        right: 2,
                    },
                    Node::Leaf { value: 0.0 },
                    Node::Leaf { value: 0.0 },
                ],
            }],
        };
        assert!(out_of_range.validate().is_err());
        assert!(stump(3).validate().is_ok());
    }

    #[test]
    fn model_json_format() {
        let json = r#"{
            "kind": "gradient_boosting",
            "n_features": 2,
            "base_score": 12.0,
            "trees": [{"nodes": [
                {"split": {"feature": 1, "threshold": 0.5, "left": 1, "right": 2}},
                {"leaf": {"value": -0.25}},
                {"leaf": {"value": 0.25}}
            ]}]
        }"#;
        let model: Regressor = serde_json::from_str(json).unwrap();
        assert_eq!(model.n_features(), 2);
        assert!(model.validate().is_ok());
        assert_eq!(model.predict(&[0.0, 1.0]), 12.25);
    }
}
