//! Turns a [`FeatureRecord`] into the exact column layout the regressor was
//! trained on: numeric features, one-hot zipcode indicators, then every
//! degree-2 monomial of those columns.

use std::collections::HashMap;

use thiserror::Error;

use crate::features::{Feature, FeatureRecord};

pub(crate) const ZIPCODE_COLUMN: &str = "zipcode";

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum EncodingError {
    #[error("polynomial expander expects {expected} input columns, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },
}

/// One-hot encoder over the zipcode categories seen during training.
///
/// A zipcode outside the category list encodes as all zeros, which is how
/// the training encoder treated unknown categories.
#[derive(Debug, Clone)]
pub(crate) struct ZipcodeEncoder {
    categories: Vec<String>,
    index: HashMap<String, usize>,
}

impl ZipcodeEncoder {
    pub(crate) fn new(categories: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(categories.len());
        for (i, category) in categories.iter().enumerate() {
            index.entry(category.clone()).or_insert(i);
        }
        Self { categories, index }
    }

    pub(crate) fn len(&self) -> usize {
        self.categories.len()
    }

    pub(crate) fn categories(&self) -> &[String] {
        &self.categories
    }

    pub(crate) fn column_names(&self) -> impl Iterator<Item = String> + '_ {
        self.categories
            .iter()
            .map(|category| format!("{ZIPCODE_COLUMN}_{category}"))
    }

    fn encode_into(&self, zipcode: &str, out: &mut Vec<f64>) {
        let start = out.len();
        out.resize(start + self.categories.len(), 0.0);
        if let Some(&i) = self.index.get(zipcode) {
            out[start + i] = 1.0;
        }
    }
}

/// Degree-2 polynomial expansion without a bias column.
///
/// Output layout: every input column, then `x[i] * x[j]` for each `i <= j`
/// in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PolynomialExpander {
    n_features_in: usize,
}

impl PolynomialExpander {
    pub(crate) fn new(n_features_in: usize) -> Self {
        Self { n_features_in }
    }

    pub(crate) fn n_features_in(&self) -> usize {
        self.n_features_in
    }

    pub(crate) fn n_features_out(&self) -> usize {
        let n = self.n_features_in;
        n + n * (n + 1) / 2
    }

    pub(crate) fn transform(&self, input: &[f64]) -> Result<Vec<f64>, EncodingError> {
        if input.len() != self.n_features_in {
            return Err(EncodingError::WidthMismatch {
                expected: self.n_features_in,
                actual: input.len(),
            });
        }
        let mut out = Vec::with_capacity(self.n_features_out());
        out.extend_from_slice(input);
        for (i, &a) in input.iter().enumerate() {
            for &b in &input[i..] {
                out.push(a * b);
            }
        }
        Ok(out)
    }

    /// Names of the output columns, e.g. `a`, `a^2`, `a b`.
    pub(crate) fn feature_names(&self, names_in: &[String]) -> Vec<String> {
        let mut names = names_in.to_vec();
        for (i, a) in names_in.iter().enumerate() {
            names.push(format!("{a}^2"));
            for b in &names_in[i + 1..] {
                names.push(format!("{a} {b}"));
            }
        }
        names
    }
}

/// The model-ready feature vector.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncodedVector(Vec<f64>);

impl EncodedVector {
    pub(crate) fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FeatureCodec {
    encoder: ZipcodeEncoder,
    expander: PolynomialExpander,
}

impl FeatureCodec {
    pub(crate) fn new(
        encoder: ZipcodeEncoder,
        expander: PolynomialExpander,
    ) -> Result<Self, EncodingError> {
        let base = Feature::NUMERIC.len() + encoder.len();
        if base != expander.n_features_in() {
            return Err(EncodingError::WidthMismatch {
                expected: expander.n_features_in(),
                actual: base,
            });
        }
        Ok(Self { encoder, expander })
    }

    pub(crate) fn encode(&self, record: &FeatureRecord) -> Result<EncodedVector, EncodingError> {
        let mut base = Vec::with_capacity(self.expander.n_features_in());
        base.extend(Feature::NUMERIC.iter().map(|&f| record.value(f)));
        self.encoder.encode_into(record.zipcode(), &mut base);
        Ok(EncodedVector(self.expander.transform(&base)?))
    }

    /// Column names before polynomial expansion.
    pub(crate) fn base_column_names(&self) -> Vec<String> {
        Feature::NUMERIC
            .iter()
            .map(|f| f.name().to_string())
            .chain(self.encoder.column_names())
            .collect()
    }

    pub(crate) fn feature_names(&self) -> Vec<String> {
        self.expander.feature_names(&self.base_column_names())
    }

    pub(crate) fn width(&self) -> usize {
        self.expander.n_features_out()
    }

    pub(crate) fn categories(&self) -> &[String] {
        self.encoder.categories()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sample_record;

    fn codec() -> FeatureCodec {
        let encoder = ZipcodeEncoder::new(vec!["98001".to_string(), "98100".to_string()]);
        FeatureCodec::new(encoder, PolynomialExpander::new(8)).unwrap()
    }

    #[test]
    fn expansion_order() {
        let expander = PolynomialExpander::new(3);
        let out = expander.transform(&[2.0, 3.0, 5.0]).unwrap();
        assert_eq!(out, vec![2.0, 3.0, 5.0, 4.0, 6.0, 10.0, 9.0, 15.0, 25.0]);

        let names = expander.feature_names(&["a".into(), "b".into(), "c".into()]);
        assert_eq!(
            names,
            vec!["a", "b", "c", "a^2", "a b", "a c", "b^2", "b c", "c^2"]
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = codec();
        let record = sample_record(1500.0, "98100");
        let first = codec.encode(&record).unwrap();
        let second = codec.encode(&record).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 8 + 36);
        assert_eq!(&first.as_slice()[6..8], &[0.0, 1.0]);
    }

    #[test]
    fn unknown_zipcode_encodes_as_zeros() {
        let codec = codec();
        let encoded = codec.encode(&sample_record(1500.0, "98765")).unwrap();
        assert_eq!(&encoded.as_slice()[6..8], &[0.0, 0.0]);
        assert_eq!(encoded.len(), codec.width());
    }

    #[test]
    fn numeric_columns_lead() {
        let codec = codec();
        let encoded = codec.encode(&sample_record(1500.0, "98001")).unwrap();
        assert_eq!(
            &encoded.as_slice()[..6],
            &[1500.0, 3.0, 2.0, 5000.0, 1.0, 20.0]
        );
        // sqft_living^2 directly follows the base columns
        assert_eq!(encoded.as_slice()[8], 1500.0 * 1500.0);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let encoder = ZipcodeEncoder::new(vec!["98001".to_string()]);
        assert_eq!(
            FeatureCodec::new(encoder, PolynomialExpander::new(8)).unwrap_err(),
            EncodingError::WidthMismatch {
                expected: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn names_match_artifact_columns() {
        let codec = codec();
        let names = codec.feature_names();
        assert_eq!(names.len(), codec.width());
        assert_eq!(names[6], "zipcode_98001");
        assert_eq!(names[8], "sqft_living^2");
        assert_eq!(names[9], "sqft_living no_of_bedrooms");
    }
}
