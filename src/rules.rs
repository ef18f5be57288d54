//! Threshold rules that turn property features into buying/selling tips.

use crate::{
    features::{Feature, FeatureRecord, Purpose},
    market::MarketTrends,
};

const BUYER_PREFIX: &str = "✅ Buyer Tip: ";
const SELLER_PREFIX: &str = "💰 Seller Tip: ";
const SELLER_SUFFIX: &str = " Consider staging or upgrades to maximize your home's appeal.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparator {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl Comparator {
    #[allow(clippy::float_cmp)]
    pub(crate) fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Rule {
    pub(crate) comparator: Comparator,
    pub(crate) threshold: f64,
    pub(crate) message: &'static str,
}

impl Rule {
    const fn new(comparator: Comparator, threshold: f64, message: &'static str) -> Self {
        Self {
            comparator,
            threshold,
            message,
        }
    }
}

pub(crate) type RuleTable = [(Feature, &'static [Rule])];

/// Expert pricing rules, in the order their messages are reported.
pub(crate) const EXPERT_RULES: &RuleTable = &[
    (
        Feature::SqftLiving,
        &[
            Rule::new(Comparator::Lt, 1000.0, "🏡 Consider purchasing a home with at least 1200 sqft, as larger homes tend to have better resale value and appeal to a broader audience."),
            Rule::new(Comparator::Gt, 3000.0, "📏 Larger homes, while desirable, may have a smaller buyer pool. Ensure your pricing is competitive to attract serious buyers."),
            Rule::new(Comparator::Gt, 4000.0, "💎 Luxury homes often take longer to sell. Invest in professional staging and high-quality marketing to stand out in the market."),
        ],
    ),
    (
        Feature::Bedrooms,
        &[
            Rule::new(Comparator::Lt, 2.0, "🛏️ Homes with 3 or more bedrooms are more attractive to families and have a wider buyer base, making them easier to sell."),
            Rule::new(Comparator::Gt, 5.0, "🏡 Homes with 6 or more bedrooms cater to a niche market. Price carefully and highlight unique features to attract the right buyers."),
        ],
    ),
    (
        Feature::Bathrooms,
        &[
            Rule::new(Comparator::Eq, 1.0, "🚿 Adding a second bathroom can significantly increase your home's resale value and appeal to a larger pool of buyers."),
            Rule::new(Comparator::Gt, 3.0, "💎 Luxury buyers typically expect at least 3.5 bathrooms in high-end homes. Ensure your property meets these expectations."),
        ],
    ),
    (
        Feature::HouseAge,
        &[
            Rule::new(Comparator::Gt, 50.0, "🏚️ Older homes may require renovations or upgrades. Buyers should budget for potential repairs to modernize the property."),
            Rule::new(Comparator::Lt, 5.0, "🏠 Newer homes often come with modern features and lower maintenance costs, making them highly desirable in the market."),
        ],
    ),
    (
        Feature::SqftLot,
        &[
            Rule::new(Comparator::Lt, 5000.0, "🌳 Homes with smaller lots tend to sell faster but may have lower long-term appreciation. Ideal for buyers looking for low-maintenance properties."),
            Rule::new(Comparator::Gt, 15000.0, "🏞️ Large lots offer privacy and space but require more upkeep. Highlight the potential for outdoor activities or future development."),
        ],
    ),
    (
        Feature::Floors,
        &[
            Rule::new(Comparator::Eq, 1.0, "🏡 Single-story homes are ideal for retirees and families with small children due to their accessibility and ease of movement."),
            Rule::new(Comparator::Gt, 2.0, "🏢 Multi-level homes can be harder to sell due to accessibility concerns. Consider highlighting unique features to attract buyers."),
        ],
    ),
];

#[derive(Debug, Clone, Copy)]
pub(crate) struct RuleEngine {
    table: &'static RuleTable,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(EXPERT_RULES)
    }
}

impl RuleEngine {
    pub(crate) fn new(table: &'static RuleTable) -> Self {
        Self { table }
    }

    /// Collects every matching rule message, walking features in record
    /// order, then appends the zipcode's market suggestions.
    pub(crate) fn evaluate(
        &self,
        purpose: Purpose,
        record: &FeatureRecord,
        trends: &MarketTrends,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for feature in Feature::NUMERIC {
            let value = record.value(feature);
            let rules = self
                .table
                .iter()
                .filter(|(f, _)| *f == feature)
                .flat_map(|(_, rules)| rules.iter());
            for rule in rules {
                if rule.comparator.holds(value, rule.threshold) {
                    out.push(tip(purpose, rule.message));
                }
            }
        }
        if let Some(trend) = trends.get(record.zipcode()) {
            out.extend(trend.suggestions.iter().cloned());
        }
        out
    }
}

fn tip(purpose: Purpose, message: &str) -> String {
    match purpose {
        Purpose::Buy => format!("{BUYER_PREFIX}{message}"),
        Purpose::Sell => format!("{SELLER_PREFIX}{message}{SELLER_SUFFIX}"),
    }
}
