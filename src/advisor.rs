use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    codec::{EncodingError, FeatureCodec},
    database::{Database, QueryLogEntry},
    estimator::{EstimateError, PredictionResult, PriceEstimator},
    features::{FeatureRecord, Purpose, ValidationError},
    market::MarketTrends,
    rules::RuleEngine,
};

/// Half-width of the price window used for the listing search link.
const SEARCH_MARGIN: f64 = 50_000.0;
const REALTOR_SEARCH_URL: &str = "https://www.realtor.com/realestateandhomes-search";
pub(crate) const INTERNAL_ERROR_MESSAGE: &str =
    "Sorry, something went wrong on our end. Please try again later.";

#[derive(Debug, Error)]
pub(crate) enum AdviceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to encode features: {0}")]
    Encoding(#[from] EncodingError),
    #[error("failed to estimate price: {0}")]
    Estimate(#[from] EstimateError),
}

impl AdviceError {
    /// Whether the caller sent bad input, as opposed to a server fault.
    pub(crate) fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// The message shown to the caller. Server faults get a generic text;
    /// their detail belongs in the log.
    pub(crate) fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            INTERNAL_ERROR_MESSAGE.to_string()
        }
    }
}

/// Outcome of a step whose failure is tolerated: either the real value or a
/// stand-in together with the error that forced it.
#[derive(Debug)]
pub(crate) enum Recovered<T> {
    Clean(T),
    Substituted { value: T, cause: anyhow::Error },
}

impl<T> Recovered<T> {
    pub(crate) fn from_result(result: anyhow::Result<T>, fallback: T) -> Self {
        match result {
            Ok(value) => Self::Clean(value),
            Err(cause) => Self::Substituted {
                value: fallback,
                cause,
            },
        }
    }

    pub(crate) fn into_value(self) -> T {
        match self {
            Self::Clean(value) | Self::Substituted { value, .. } => value,
        }
    }
}

/// Inclusive zipcode bounds accepted from callers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ZipcodeRange {
    pub(crate) min: u32,
    pub(crate) max: u32,
}

impl ZipcodeRange {
    fn check(self, zipcode: &str) -> Result<(), ValidationError> {
        match zipcode.parse::<u32>() {
            Ok(z) if (self.min..=self.max).contains(&z) => Ok(()),
            _ => Err(ValidationError::ZipcodeOutOfRange {
                min: self.min,
                max: self.max,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Advice {
    pub(crate) prediction: PredictionResult,
    pub(crate) recommendations: Vec<String>,
    pub(crate) realtor_url: String,
    /// `false` when the query log rejected the entry as a duplicate or
    /// could not be written.
    pub(crate) logged: bool,
}

/// The prediction pipeline: validate, encode, estimate, recommend, log.
pub(crate) struct Advisor {
    codec: FeatureCodec,
    estimator: PriceEstimator,
    rules: RuleEngine,
    trends: Arc<MarketTrends>,
    zipcodes: ZipcodeRange,
    db: Database,
}

impl Advisor {
    pub(crate) fn new(
        codec: FeatureCodec,
        estimator: PriceEstimator,
        trends: Arc<MarketTrends>,
        zipcodes: ZipcodeRange,
        db: Database,
    ) -> Self {
        Self {
            codec,
            estimator,
            rules: RuleEngine::default(),
            trends,
            zipcodes,
            db,
        }
    }

    pub(crate) fn trends(&self) -> &MarketTrends {
        &self.trends
    }

    pub(crate) fn advise(
        &self,
        features: FeatureRecord,
        purpose: Purpose,
    ) -> Result<Advice, AdviceError> {
        self.zipcodes.check(features.zipcode())?;
        debug!("Features prepared for prediction: {features:?}, purpose: {purpose}");

        let encoded = self.codec.encode(&features)?;
        let prediction = self.estimator.estimate(&encoded)?;
        debug!(
            "Predicted price: {}, interval: [{}, {}]",
            prediction.point_estimate, prediction.interval_low, prediction.interval_high
        );

        let recommendations = self.rules.evaluate(purpose, &features, &self.trends);
        let realtor_url = realtor_url(features.zipcode(), prediction.point_estimate);

        let entry = QueryLogEntry::new(features, purpose, prediction.point_estimate);
        let outcome = Recovered::from_result(self.db.append_query(&entry), false);
        if let Recovered::Substituted { cause, .. } = &outcome {
            warn!("Error inserting query: {cause:#}");
        }
        let logged = outcome.into_value();

        Ok(Advice {
            prediction,
            recommendations,
            realtor_url,
            logged,
        })
    }
}

/// Listing search around the predicted price, in whole dollars.
#[allow(clippy::cast_possible_truncation)]
fn realtor_url(zipcode: &str, price: f64) -> String {
    let low = (price - SEARCH_MARGIN).max(0.0).round() as i64;
    let high = (price + SEARCH_MARGIN).round() as i64;
    format!("{REALTOR_SEARCH_URL}/{zipcode}/price-{low}-{high}")
}

#[cfg(test)]
pub(crate) fn test_advisor(db: Database) -> Advisor {
    use rand::{rngs::StdRng, SeedableRng};

    let (codec, estimator) = crate::artifacts::sample_artifacts().into_parts();
    let trends = MarketTrends::generate(98001, 98200, &mut StdRng::seed_from_u64(11));
    Advisor::new(
        codec,
        estimator,
        Arc::new(trends),
        ZipcodeRange {
            min: 98001,
            max: 99001,
        },
        db,
    )
}
