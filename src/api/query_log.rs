use async_graphql::{
    connection::{query, Connection, EmptyFields},
    ComplexObject, Context, Object, Result, SimpleObject,
};
use chrono::{DateTime, FixedOffset, Utc};

use crate::{
    api::{self, Keyed},
    database::{Database, QueryLogEntry, TryFromKeyValue},
    export::DATE_FORMAT,
    features::Purpose,
};

/// A logged prediction request.
#[derive(SimpleObject)]
#[graphql(complex)]
pub(crate) struct QueryRecord {
    #[graphql(skip)]
    key: Vec<u8>,
    sqft_living: f64,
    bedrooms: u32,
    bathrooms: f64,
    sqft_lot: f64,
    floors: f64,
    house_age: u32,
    zipcode: String,
    purpose: Purpose,
    predicted_price: f64,
    #[graphql(skip)]
    recorded_at: DateTime<Utc>,
}

#[ComplexObject]
impl QueryRecord {
    /// When the prediction was made, in the server's display offset.
    async fn timestamp(&self, ctx: &Context<'_>) -> Result<String> {
        let offset = ctx.data::<FixedOffset>()?;
        Ok(self
            .recorded_at
            .with_timezone(offset)
            .format(DATE_FORMAT)
            .to_string())
    }
}

impl TryFromKeyValue for QueryRecord {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> anyhow::Result<Self> {
        let entry = QueryLogEntry::try_from_key_value(key, value)?;
        let f = &entry.features;
        Ok(QueryRecord {
            key: key.to_vec(),
            sqft_living: f.sqft_living(),
            bedrooms: f.bedrooms(),
            bathrooms: f.bathrooms(),
            sqft_lot: f.sqft_lot(),
            floors: f.floors(),
            house_age: f.house_age(),
            zipcode: f.zipcode().to_string(),
            purpose: entry.purpose,
            predicted_price: entry.predicted_price,
            recorded_at: entry.timestamp,
        })
    }
}

impl Keyed for QueryRecord {
    fn key(&self) -> &[u8] {
        &self.key
    }
}

#[derive(Default)]
pub(super) struct QueryLogQuery;

#[Object]
impl QueryLogQuery {
    /// Logged predictions, most recent first.
    async fn queries(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        before: Option<String>,
        first: Option<i32>,
        last: Option<i32>,
    ) -> Result<Connection<String, QueryRecord, EmptyFields, EmptyFields>> {
        query(
            after,
            before,
            first,
            last,
            |after, before, first, last| async move {
                api::load_connection(
                    ctx,
                    Database::query_log::<QueryRecord>,
                    after,
                    before,
                    first,
                    last,
                )
            },
        )
        .await
    }
}
