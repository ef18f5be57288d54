//! Synthetic per-zipcode market trends.
//!
//! Every value here is drawn at random when the server starts. None of it
//! comes from real market data; it exists to give recommendations some
//! local color and must be presented as demo data.

use std::collections::HashMap;

use async_graphql::Enum;
use rand::Rng;
use serde::Serialize;

const MEDIAN_PRICE_RANGE: (u32, u32) = (250_000, 750_000);
const DAYS_ON_MARKET_RANGE: (u32, u32) = (20, 120);
const LUXURY_PRICE: u32 = 600_000;
const AFFORDABLE_PRICE: u32 = 350_000;

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PriceTrend {
    Up,
    Down,
    Stable,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Competition {
    High,
    Medium,
    Low,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum LocationType {
    Urban,
    Suburban,
    Rural,
}

const PRICE_TRENDS: [PriceTrend; 3] = [PriceTrend::Up, PriceTrend::Down, PriceTrend::Stable];
const COMPETITION_LEVELS: [Competition; 3] =
    [Competition::High, Competition::Medium, Competition::Low];

struct ZipRange {
    first: u32,
    last: u32,
    location: LocationType,
}

/// Washington state zipcode bands. Anything not listed is rural.
const LOCATION_RANGES: [ZipRange; 3] = [
    // Seattle, Bellevue, Tacoma
    ZipRange {
        first: 98001,
        last: 98199,
        location: LocationType::Urban,
    },
    // Everett, Olympia
    ZipRange {
        first: 98201,
        last: 98549,
        location: LocationType::Suburban,
    },
    // Yakima, Goldendale, eastern WA
    ZipRange {
        first: 98551,
        last: 99000,
        location: LocationType::Rural,
    },
];

pub(crate) fn location_type(zipcode: u32) -> LocationType {
    LOCATION_RANGES
        .iter()
        .find(|range| (range.first..=range.last).contains(&zipcode))
        .map_or(LocationType::Rural, |range| range.location)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TrendRecord {
    pub(crate) zipcode: String,
    pub(crate) median_price: u32,
    pub(crate) price_trend: PriceTrend,
    pub(crate) competition: Competition,
    pub(crate) location_type: LocationType,
    pub(crate) median_days_on_market: u32,
    pub(crate) suggestions: Vec<String>,
}

impl TrendRecord {
    fn draw<R: Rng>(zipcode: u32, rng: &mut R) -> Self {
        let location_type = location_type(zipcode);
        let median_price = rng.gen_range(MEDIAN_PRICE_RANGE.0..=MEDIAN_PRICE_RANGE.1);
        let price_trend = PRICE_TRENDS[rng.gen_range(0..PRICE_TRENDS.len())];
        let competition = COMPETITION_LEVELS[rng.gen_range(0..COMPETITION_LEVELS.len())];
        let median_days_on_market =
            rng.gen_range(DAYS_ON_MARKET_RANGE.0..=DAYS_ON_MARKET_RANGE.1);
        let suggestions = suggestions(
            price_trend,
            competition,
            median_price,
            location_type,
            median_days_on_market,
        );
        Self {
            zipcode: zipcode.to_string(),
            median_price,
            price_trend,
            competition,
            location_type,
            median_days_on_market,
            suggestions,
        }
    }
}

fn suggestions(
    price_trend: PriceTrend,
    competition: Competition,
    median_price: u32,
    location_type: LocationType,
    median_days_on_market: u32,
) -> Vec<String> {
    let mut out = Vec::with_capacity(5);
    out.push(match price_trend {
        PriceTrend::Up => "📈 Home values in this area are currently rising, making it a great time to invest in property for long-term growth.",
        PriceTrend::Down => "📉 The market in this area is declining. Sellers should consider pricing their homes aggressively to attract buyers.",
        PriceTrend::Stable => "⚖️ The market is stable, offering a balanced environment for both buyers and sellers with steady long-term investment potential.",
    }.to_string());
    out.push(match competition {
        Competition::High => "🔥 The market is highly competitive, with multiple offers expected. Buyers should be prepared to act quickly and make strong offers.",
        Competition::Medium => "🤝 The market has fair competition, providing opportunities for negotiation between buyers and sellers.",
        Competition::Low => "❄️ The market is slow, with fewer buyers. Sellers may need to offer incentives such as closing cost assistance to attract interest.",
    }.to_string());
    if median_price > LUXURY_PRICE {
        out.push("💎 This is a high-end area! Staging your home and investing in premium upgrades can help attract top-tier buyers.".to_string());
    } else if median_price < AFFORDABLE_PRICE {
        out.push("🏠 This is an affordable market, making it an excellent opportunity for first-time buyers to enter the housing market.".to_string());
    }
    out.push(match location_type {
        LocationType::Urban => "🏙️ Urban areas are ideal for condos and townhomes, which tend to have faster resale times due to high demand.",
        LocationType::Suburban => "🏡 Suburban zones are highly desirable for families, with homes featuring yards and proximity to schools being particularly attractive.",
        LocationType::Rural => "🌄 Rural markets appeal to niche buyers looking for large lots and a quiet lifestyle. Highlight the tranquility and space your property offers.",
    }.to_string());
    out.push(format!(
        "⏳ On average, homes in this area take approximately {median_days_on_market} days to sell. Adjust your strategy accordingly."
    ));
    out
}

/// Read-only trend table, built once at startup and shared by reference.
#[derive(Debug, Default)]
pub(crate) struct MarketTrends {
    records: HashMap<String, TrendRecord>,
}

impl MarketTrends {
    /// Draws one record per zipcode in `start..=end`.
    pub(crate) fn generate<R: Rng>(start: u32, end: u32, rng: &mut R) -> Self {
        let records = (start..=end)
            .map(|zipcode| (zipcode.to_string(), TrendRecord::draw(zipcode, rng)))
            .collect();
        Self { records }
    }

    pub(crate) fn get(&self, zipcode: &str) -> Option<&TrendRecord> {
        self.records.get(zipcode)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
