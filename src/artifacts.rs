use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    codec::{FeatureCodec, PolynomialExpander, ZipcodeEncoder, ZIPCODE_COLUMN},
    estimator::{PriceEstimator, Regressor},
    settings::ModelSettings,
};

/// The trained artifacts could not be loaded, so no prediction can be
/// served. Fatal at startup.
#[derive(Debug, Error)]
pub(crate) enum ModelUnavailableError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("incompatible artifacts: {0}")]
    Incompatible(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct EncoderArtifact {
    pub(crate) feature: String,
    pub(crate) categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct PolynomialArtifact {
    pub(crate) degree: u32,
    pub(crate) include_bias: bool,
    pub(crate) feature_names_in: Vec<String>,
}

/// The encoder, polynomial expander and regressor, checked against each
/// other.
pub(crate) struct Artifacts {
    codec: FeatureCodec,
    estimator: PriceEstimator,
}

impl Artifacts {
    pub(crate) fn load(settings: &ModelSettings) -> Result<Self, ModelUnavailableError> {
        let encoder: EncoderArtifact = read_json(&settings.encoder_path)?;
        let poly: PolynomialArtifact = read_json(&settings.poly_path)?;
        let model: Regressor = read_json(&settings.model_path)?;
        let artifacts = Self::from_parts(encoder, poly, model)?;
        info!(
            "Loaded model artifacts: {} zipcode categories, {} model features",
            artifacts.codec.categories().len(),
            artifacts.codec.width()
        );
        debug!("Model columns: {:?}", artifacts.codec.feature_names());
        Ok(artifacts)
    }

    pub(crate) fn from_parts(
        encoder: EncoderArtifact,
        poly: PolynomialArtifact,
        model: Regressor,
    ) -> Result<Self, ModelUnavailableError> {
        if encoder.feature != ZIPCODE_COLUMN {
            return Err(incompatible(format!(
                "encoder was fitted on `{}`, expected `{ZIPCODE_COLUMN}`",
                encoder.feature
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = encoder.categories.iter().find(|c| !seen.insert(*c)) {
            return Err(incompatible(format!("duplicate zipcode category `{dup}`")));
        }
        if poly.degree != 2 || poly.include_bias {
            return Err(incompatible(format!(
                "expected a degree-2 expansion without bias, got degree {} (bias: {})",
                poly.degree, poly.include_bias
            )));
        }

        let expander = PolynomialExpander::new(poly.feature_names_in.len());
        let codec = FeatureCodec::new(ZipcodeEncoder::new(encoder.categories), expander)
            .map_err(|e| incompatible(e.to_string()))?;
        let expected_names = codec.base_column_names();
        if let Some((i, (want, got))) = expected_names
            .iter()
            .zip(&poly.feature_names_in)
            .enumerate()
            .find(|(_, (want, got))| want != got)
        {
            return Err(incompatible(format!(
                "column {i} of the expander is `{got}`, expected `{want}`"
            )));
        }

        if model.n_features() != codec.width() {
            return Err(incompatible(format!(
                "model expects {} features, expander produces {}",
                model.n_features(),
                codec.width()
            )));
        }
        model.validate().map_err(incompatible)?;

        Ok(Self {
            codec,
            estimator: PriceEstimator::new(model),
        })
    }

    pub(crate) fn into_parts(self) -> (FeatureCodec, PriceEstimator) {
        (self.codec, self.estimator)
    }
}

fn incompatible(reason: String) -> ModelUnavailableError {
    ModelUnavailableError::Incompatible(reason)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelUnavailableError> {
    let text = fs::read_to_string(path).map_err(|source| ModelUnavailableError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ModelUnavailableError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Artifacts for two zipcode categories (`98001`, `98100`) and a single
/// stump splitting on living area at 2000 sqft.
#[cfg(test)]
pub(crate) fn sample_parts() -> (EncoderArtifact, PolynomialArtifact, Regressor) {
    use crate::estimator::{Node, Tree};

    let categories = vec!["98001".to_string(), "98100".to_string()];
    let mut feature_names_in: Vec<String> = crate::features::Feature::NUMERIC
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    feature_names_in.extend(categories.iter().map(|c| format!("zipcode_{c}")));
    let width = PolynomialExpander::new(feature_names_in.len()).n_features_out();
    (
        EncoderArtifact {
            feature: ZIPCODE_COLUMN.to_string(),
            categories,
        },
        PolynomialArtifact {
            degree: 2,
            include_bias: false,
            feature_names_in,
        },
        Regressor::GradientBoosting {
            n_features: width,
            base_score: 12.5,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split {
                        feature: 0,
                        threshold: 2000.0,
                        left: 1,
                        right: 2,
                    },
                    Node::Leaf { value: -0.1 },
                    Node::Leaf { value: 0.3 },
                ],
            }],
        },
    )
}

#[cfg(test)]
pub(crate) fn sample_artifacts() -> Artifacts {
    let (encoder, poly, model) = sample_parts();
    Artifacts::from_parts(encoder, poly, model).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_parts_are_compatible() {
        let (codec, _) = sample_artifacts().into_parts();
        assert_eq!(codec.width(), 44);
    }

    #[test]
    fn rejects_model_width_mismatch() {
        let (encoder, poly, _) = sample_parts();
        let model = Regressor::Linear {
            intercept: 12.0,
            coefficients: vec![0.0; 10],
        };
        assert!(matches!(
            Artifacts::from_parts(encoder, poly, model),
            Err(ModelUnavailableError::Incompatible(_))
        ));
    }

    #[test]
    fn rejects_reordered_columns() {
        let (encoder, mut poly, model) = sample_parts();
        poly.feature_names_in.swap(0, 1);
        let err = Artifacts::from_parts(encoder, poly, model).err().unwrap();
        assert!(err.to_string().contains("column 0"));
    }

    #[test]
    fn rejects_bias_column() {
        let (encoder, mut poly, model) = sample_parts();
        poly.include_bias = true;
        assert!(Artifacts::from_parts(encoder, poly, model).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ModelSettings {
            encoder_path: dir.path().join("encoder.json"),
            poly_path: dir.path().join("poly.json"),
            model_path: dir.path().join("model.json"),
        };
        assert!(matches!(
            Artifacts::load(&settings),
            Err(ModelUnavailableError::Read { .. })
        ));
    }

    #[test]
    fn load_round_trips_files() {
        let dir = tempfile::tempdir().unwrap();
        let (encoder, poly, model) = sample_parts();
        let settings = ModelSettings {
            encoder_path: dir.path().join("encoder.json"),
            poly_path: dir.path().join("poly.json"),
            model_path: dir.path().join("model.json"),
        };
        fs::write(&settings.encoder_path, serde_json::to_string(&encoder).unwrap()).unwrap();
        fs::write(&settings.poly_path, serde_json::to_string(&poly).unwrap()).unwrap();
        fs::write(&settings.model_path, serde_json::to_string(&model).unwrap()).unwrap();
        let (codec, _) = Artifacts::load(&settings).unwrap().into_parts();
        assert_eq!(codec.categories(), &["98001", "98100"]);
    }

    #[test]
    fn demo_artifacts_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/saved_model");
        let settings = ModelSettings {
            encoder_path: dir.join("encoder.json"),
            poly_path: dir.join("poly.json"),
            model_path: dir.join("model.json"),
        };
        let (codec, estimator) = Artifacts::load(&settings).unwrap().into_parts();
        assert_eq!(codec.width(), 54);

        let record =
            crate::features::FeatureRecord::new(2500.0, 3, 2.0, 6000.0, 1.0, 20, "98004").unwrap();
        let price = estimator
            .estimate(&codec.encode(&record).unwrap())
            .unwrap()
            .point_estimate;
        assert!((price.ln_1p() - 13.41).abs() < 1e-9);
    }
}
