use std::sync::Arc;

use async_graphql::{Context, Object, Result, SimpleObject};

use crate::{
    advisor::Advisor,
    market::{Competition, LocationType, PriceTrend, TrendRecord},
};

/// Randomly generated market conditions for one zipcode.
///
/// These values are produced at server start and are not real market data.
#[derive(SimpleObject)]
pub(crate) struct MarketTrend {
    zipcode: String,
    median_price: u32,
    price_trend: PriceTrend,
    competition: Competition,
    location_type: LocationType,
    median_days_on_market: u32,
    suggestions: Vec<String>,
    /// Always `true`.
    synthetic: bool,
}

impl From<&TrendRecord> for MarketTrend {
    fn from(record: &TrendRecord) -> Self {
        Self {
            zipcode: record.zipcode.clone(),
            median_price: record.median_price,
            price_trend: record.price_trend,
            competition: record.competition,
            location_type: record.location_type,
            median_days_on_market: record.median_days_on_market,
            suggestions: record.suggestions.clone(),
            synthetic: true,
        }
    }
}

#[derive(Default)]
pub(super) struct MarketTrendQuery;

#[Object]
impl MarketTrendQuery {
    /// Synthetic demo trend for `zipcode`, or `null` outside the generated range.
    async fn market_trend(&self, ctx: &Context<'_>, zipcode: String) -> Result<Option<MarketTrend>> {
        let advisor = ctx.data::<Arc<Advisor>>()?;
        Ok(advisor.trends().get(zipcode.trim()).map(MarketTrend::from))
    }
}

#[cfg(test)]
mod tests {
    use crate::api::TestSchema;

    #[tokio::test]
    async fn known_zipcode() {
        let schema = TestSchema::new();
        let query = r#"
        {
            marketTrend(zipcode: "98100") {
                zipcode
                locationType
                synthetic
            }
        }"#;
        let res = schema.execute(query).await;
        assert_eq!(
            res.data.to_string(),
            r#"{marketTrend: {zipcode: "98100", locationType: URBAN, synthetic: true}}"#
        );
    }

    #[tokio::test]
    async fn suggestions_match_the_table() {
        let schema = TestSchema::new();
        let res = schema
            .execute(r#"{ marketTrend(zipcode: "98150") { medianPrice suggestions } }"#)
            .await;
        let data = res.data.into_json().unwrap();
        let suggestions = data["marketTrend"]["suggestions"].as_array().unwrap();
        assert!(suggestions.len() >= 4);
        let days = suggestions.last().unwrap().as_str().unwrap();
        assert!(days.starts_with("⏳ On average, homes in this area take approximately"));
        let price = data["marketTrend"]["medianPrice"].as_u64().unwrap();
        assert!((250_000..=750_000).contains(&price));
    }

    #[tokio::test]
    async fn unknown_zipcode_is_null() {
        let schema = TestSchema::new();
        let res = schema
            .execute(r#"{ marketTrend(zipcode: "99999") { zipcode } }"#)
            .await;
        assert_eq!(res.data.to_string(), "{marketTrend: null}");
    }
}
