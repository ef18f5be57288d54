use std::{fmt, str::FromStr};

use async_graphql::Enum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons a submitted property description is rejected before prediction.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum ValidationError {
    #[error("Missing required field: {0}")]
    Missing(&'static str),
    #[error("Please enter valid numerical values for all fields. `{field}` is not a valid {expected}: {value}")]
    NotNumeric {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("`{field}` must be {constraint}")]
    OutOfDomain {
        field: &'static str,
        constraint: &'static str,
    },
    #[error("Invalid zipcode `{0}`. It should contain digits only.")]
    MalformedZipcode(String),
    #[error("Invalid zipcode. It should be between {min} and {max}.")]
    ZipcodeOutOfRange { min: u32, max: u32 },
    #[error("Invalid purpose `{0}`. Expected `buy` or `sell`.")]
    InvalidPurpose(String),
    #[error("Invalid request format")]
    NotAnObject,
}

/// Whether the user is looking to buy or to sell.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Purpose {
    Buy,
    Sell,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

impl FromStr for Purpose {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(ValidationError::InvalidPurpose(other.to_string())),
        }
    }
}

/// The numeric inputs of a [`FeatureRecord`], in training column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feature {
    SqftLiving,
    Bedrooms,
    Bathrooms,
    SqftLot,
    Floors,
    HouseAge,
}

impl Feature {
    pub(crate) const NUMERIC: [Feature; 6] = [
        Feature::SqftLiving,
        Feature::Bedrooms,
        Feature::Bathrooms,
        Feature::SqftLot,
        Feature::Floors,
        Feature::HouseAge,
    ];

    /// Column name used by the trained artifacts.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::SqftLiving => "sqft_living",
            Self::Bedrooms => "no_of_bedrooms",
            Self::Bathrooms => "no_of_bathrooms",
            Self::SqftLot => "sqft_lot",
            Self::Floors => "no_of_floors",
            Self::HouseAge => "house_age",
        }
    }
}

/// A validated property description. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredFeatures")]
pub(crate) struct FeatureRecord {
    sqft_living: f64,
    bedrooms: u32,
    bathrooms: f64,
    sqft_lot: f64,
    floors: f64,
    house_age: u32,
    zipcode: String,
}

impl FeatureRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        sqft_living: f64,
        bedrooms: i64,
        bathrooms: f64,
        sqft_lot: f64,
        floors: f64,
        house_age: i64,
        zipcode: &str,
    ) -> Result<Self, ValidationError> {
        let sqft_living = positive("sqft_living", sqft_living)?;
        let bedrooms = non_negative_count("no_of_bedrooms", bedrooms)?;
        let bathrooms = non_negative("no_of_bathrooms", bathrooms)?;
        let sqft_lot = positive("sqft_lot", sqft_lot)?;
        let floors = positive("no_of_floors", floors)?;
        let house_age = non_negative_count("house_age", house_age)?;
        let zipcode = zipcode.trim();
        if zipcode.is_empty() || !zipcode.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::MalformedZipcode(zipcode.to_string()));
        }
        Ok(Self {
            sqft_living,
            bedrooms,
            bathrooms,
            sqft_lot,
            floors,
            house_age,
            zipcode: zipcode.to_string(),
        })
    }

    /// Parses the JSON body of a prediction request.
    ///
    /// Numeric fields accept JSON numbers as well as numeric strings, since
    /// HTML forms submit everything as text.
    pub(crate) fn from_json(body: &Value) -> Result<(Self, Purpose), ValidationError> {
        let fields = body.as_object().ok_or(ValidationError::NotAnObject)?;
        let record = Self::new(
            float_field(fields, "sqft_living")?,
            int_field(fields, "no_of_bedrooms")?,
            float_field(fields, "no_of_bathrooms")?,
            float_field(fields, "sqft_lot")?,
            float_field(fields, "no_of_floors")?,
            int_field(fields, "house_age")?,
            &text_field(fields, "zipcode")?,
        )?;
        let purpose = text_field(fields, "purpose")?.parse()?;
        Ok((record, purpose))
    }

    pub(crate) fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::SqftLiving => self.sqft_living,
            Feature::Bedrooms => f64::from(self.bedrooms),
            Feature::Bathrooms => self.bathrooms,
            Feature::SqftLot => self.sqft_lot,
            Feature::Floors => self.floors,
            Feature::HouseAge => f64::from(self.house_age),
        }
    }

    pub(crate) fn sqft_living(&self) -> f64 {
        self.sqft_living
    }

    pub(crate) fn bedrooms(&self) -> u32 {
        self.bedrooms
    }

    pub(crate) fn bathrooms(&self) -> f64 {
        self.bathrooms
    }

    pub(crate) fn sqft_lot(&self) -> f64 {
        self.sqft_lot
    }

    pub(crate) fn floors(&self) -> f64 {
        self.floors
    }

    pub(crate) fn house_age(&self) -> u32 {
        self.house_age
    }

    pub(crate) fn zipcode(&self) -> &str {
        &self.zipcode
    }
}

/// The serialized shape of a [`FeatureRecord`]. Decoding goes through
/// [`FeatureRecord::new`] so stored records are validated like submitted
/// ones.
#[derive(Deserialize)]
struct StoredFeatures {
    sqft_living: f64,
    bedrooms: u32,
    bathrooms: f64,
    sqft_lot: f64,
    floors: f64,
    house_age: u32,
    zipcode: String,
}

impl TryFrom<StoredFeatures> for FeatureRecord {
    type Error = ValidationError;

    fn try_from(stored: StoredFeatures) -> Result<Self, Self::Error> {
        Self::new(
            stored.sqft_living,
            i64::from(stored.bedrooms),
            stored.bathrooms,
            stored.sqft_lot,
            stored.floors,
            i64::from(stored.house_age),
            &stored.zipcode,
        )
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::OutOfDomain {
            field,
            constraint: "a finite number greater than zero",
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::OutOfDomain {
            field,
            constraint: "a finite number not less than zero",
        })
    }
}

fn non_negative_count(field: &'static str, value: i64) -> Result<u32, ValidationError> {
    u32::try_from(value).map_err(|_| ValidationError::OutOfDomain {
        field,
        constraint: "a whole number between 0 and 4294967295",
    })
}

fn required<'a>(fields: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ValidationError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(ValidationError::Missing(field)),
        Some(value) => Ok(value),
    }
}

fn float_field(fields: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    let value = required(fields, field)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ValidationError::NotNumeric {
        field,
        expected: "number",
        value: value.to_string(),
    })
}

fn int_field(fields: &Map<String, Value>, field: &'static str) -> Result<i64, ValidationError> {
    let value = required(fields, field)?;
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    };
    parsed.ok_or_else(|| ValidationError::NotNumeric {
        field,
        expected: "whole number",
        value: value.to_string(),
    })
}

/// `3.0` counts as a whole number; `2.5` does not.
#[allow(clippy::cast_possible_truncation)]
fn whole(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

fn text_field(fields: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match required(fields, field)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_u64() => Ok(n.to_string()),
        other => Err(ValidationError::NotNumeric {
            field,
            expected: "text value",
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) fn sample_record(sqft_living: f64, zipcode: &str) -> FeatureRecord {
    FeatureRecord::new(sqft_living, 3, 2.0, 5000.0, 1.0, 20, zipcode).unwrap()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_numeric_strings() {
        let body = json!({
            "sqft_living": "1500",
            "no_of_bedrooms": "3",
            "no_of_bathrooms": "2.5",
            "sqft_lot": 5000,
            "no_of_floors": 2,
            "house_age": 20,
            "zipcode": "98001",
            "purpose": "sell",
        });
        let (record, purpose) = FeatureRecord::from_json(&body).unwrap();
        assert_eq!(record.sqft_living(), 1500.0);
        assert_eq!(record.bedrooms(), 3);
        assert_eq!(record.bathrooms(), 2.5);
        assert_eq!(record.floors(), 2.0);
        assert_eq!(record.zipcode(), "98001");
        assert_eq!(purpose, Purpose::Sell);
    }

    #[test]
    fn rejects_non_numeric_bedrooms() {
        let body = json!({
            "sqft_living": 1500,
            "no_of_bedrooms": "abc",
            "no_of_bathrooms": 2,
            "sqft_lot": 5000,
            "no_of_floors": 1,
            "house_age": 20,
            "zipcode": "98001",
            "purpose": "buy",
        });
        let err = FeatureRecord::from_json(&body).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NotNumeric {
                field: "no_of_bedrooms",
                ..
            }
        ));
    }

    #[test]
    fn accepts_whole_floats_for_counts() {
        let mut body = json!({
            "sqft_living": 1500,
            "no_of_bedrooms": 3.0,
            "no_of_bathrooms": 2,
            "sqft_lot": 5000,
            "no_of_floors": 1,
            "house_age": 20.0,
            "zipcode": "98001",
            "purpose": "buy",
        });
        let (record, _) = FeatureRecord::from_json(&body).unwrap();
        assert_eq!(record.bedrooms(), 3);
        assert_eq!(record.house_age(), 20);

        body["no_of_bedrooms"] = json!("4.0");
        let (record, _) = FeatureRecord::from_json(&body).unwrap();
        assert_eq!(record.bedrooms(), 4);

        body["no_of_bedrooms"] = json!(2.5);
        assert!(matches!(
            FeatureRecord::from_json(&body).unwrap_err(),
            ValidationError::NotNumeric {
                field: "no_of_bedrooms",
                ..
            }
        ));
    }

    #[test]
    fn deserializing_validates() {
        let stored = json!({
            "sqft_living": -1.0,
            "bedrooms": 3,
            "bathrooms": 2.0,
            "sqft_lot": 5000.0,
            "floors": 1.0,
            "house_age": 20,
            "zipcode": "98001",
        });
        assert!(serde_json::from_value::<FeatureRecord>(stored).is_err());

        let record = sample_record(1500.0, "98001");
        let bytes = bincode::serialize(&record).unwrap();
        assert_eq!(bincode::deserialize::<FeatureRecord>(&bytes).unwrap(), record);

        let mut bad = record.clone();
        bad.zipcode = "98O01".to_string();
        let bytes = bincode::serialize(&bad).unwrap();
        assert!(bincode::deserialize::<FeatureRecord>(&bytes).is_err());
    }

    #[test]
    fn reports_missing_field() {
        let body = json!({ "sqft_living": 1500, "purpose": "buy" });
        assert_eq!(
            FeatureRecord::from_json(&body).unwrap_err(),
            ValidationError::Missing("no_of_bedrooms")
        );
    }

    #[test]
    fn rejects_out_of_domain_values() {
        assert!(FeatureRecord::new(0.0, 3, 2.0, 5000.0, 1.0, 20, "98001").is_err());
        assert!(FeatureRecord::new(1500.0, -1, 2.0, 5000.0, 1.0, 20, "98001").is_err());
        assert!(FeatureRecord::new(1500.0, 3, f64::NAN, 5000.0, 1.0, 20, "98001").is_err());
        assert!(FeatureRecord::new(1500.0, 3, 2.0, 5000.0, 1.0, 20, "98O01").is_err());
        assert!(FeatureRecord::new(1500.0, 0, 0.0, 5000.0, 1.0, 0, "98001").is_ok());
    }

    #[test]
    fn rejects_unknown_purpose() {
        assert_eq!(
            "rent".parse::<Purpose>().unwrap_err(),
            ValidationError::InvalidPurpose("rent".to_string())
        );
    }
}
