use std::sync::Arc;

use async_graphql::{Context, ErrorExtensions, InputObject, Object, Result, SimpleObject};
use tracing::error;

use crate::{
    advisor::{Advice, AdviceError, Advisor},
    features::{FeatureRecord, Purpose},
};

#[derive(InputObject)]
pub(crate) struct PredictionInput {
    sqft_living: f64,
    bedrooms: i32,
    bathrooms: f64,
    sqft_lot: f64,
    floors: f64,
    house_age: i32,
    zipcode: String,
    purpose: Purpose,
}

/// Fixed-width band around the prediction.
///
/// This is a constant margin, not a statistical confidence interval.
#[derive(SimpleObject)]
pub(crate) struct PriceBand {
    low: f64,
    high: f64,
}

#[derive(SimpleObject)]
pub(crate) struct PredictionResponse {
    predicted_price: f64,
    confidence_interval: PriceBand,
    recommendations: Vec<String>,
    realtor_url: String,
}

impl From<Advice> for PredictionResponse {
    fn from(advice: Advice) -> Self {
        Self {
            predicted_price: advice.prediction.point_estimate,
            confidence_interval: PriceBand {
                low: advice.prediction.interval_low,
                high: advice.prediction.interval_high,
            },
            recommendations: advice.recommendations,
            realtor_url: advice.realtor_url,
        }
    }
}

fn to_graphql_error(e: &AdviceError) -> async_graphql::Error {
    if !e.is_client_error() {
        error!("Prediction failed: {e}");
    }
    let code = if e.is_client_error() {
        "BAD_USER_INPUT"
    } else {
        "INTERNAL_SERVER_ERROR"
    };
    async_graphql::Error::new(e.public_message()).extend_with(|_, ext| ext.set("code", code))
}

#[derive(Default)]
pub(super) struct PredictionMutation;

#[Object]
impl PredictionMutation {
    /// Estimates the price of a property and returns tips for the given purpose.
    async fn predict(
        &self,
        ctx: &Context<'_>,
        input: PredictionInput,
    ) -> Result<PredictionResponse> {
        let advisor = ctx.data::<Arc<Advisor>>()?;
        let features = FeatureRecord::new(
            input.sqft_living,
            i64::from(input.bedrooms),
            input.bathrooms,
            input.sqft_lot,
            input.floors,
            i64::from(input.house_age),
            &input.zipcode,
        )
        .map_err(|e| to_graphql_error(&e.into()))?;
        advisor
            .advise(features, input.purpose)
            .map(PredictionResponse::from)
            .map_err(|e| to_graphql_error(&e))
    }
}
