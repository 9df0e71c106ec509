use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const PAID: &str = "paid";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Customer {
    #[serde(deserialize_with = "identifier")]
    pub customer_id: String,
    pub city: String,
    #[serde(deserialize_with = "flag")]
    pub is_active: bool,
}

/// One record of the daily order file, with its nested line items.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "identifier")]
    pub order_id: String,
    #[serde(deserialize_with = "identifier")]
    pub customer_id: String,
    pub channel: String,
    pub created_at: String,
    pub payment_status: String,
    #[serde(default)]
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct OrderLine {
    pub qty: i64,
    pub unit_price: f64,
    /// The item object as written, keys in file order (`qty` and `unit_price` included).
    pub attributes: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for OrderLine {
    type Error = String;

    fn try_from(attributes: Map<String, Value>) -> Result<Self, Self::Error> {
        let qty = attributes
            .get("qty")
            .and_then(Value::as_i64)
            .ok_or_else(|| "line item qty is missing or not an integer".to_string())?;
        let unit_price = attributes
            .get("unit_price")
            .and_then(Value::as_f64)
            .ok_or_else(|| "line item unit_price is missing or not a number".to_string())?;

        Ok(Self {
            qty,
            unit_price,
            attributes,
        })
    }
}

/// A line item with the order-level fields copied onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub order_id: String,
    pub customer_id: String,
    pub channel: String,
    pub created_at: String,
    pub payment_status: String,
    pub qty: i64,
    pub unit_price: f64,
    pub attributes: Map<String, Value>,
    /// Position of the originating record in the order file.
    pub source_row: i64,
}

impl Order {
    /// Expands the nested lines, copying the order fields onto each of them.
    pub fn line_items(&self, source_row: i64) -> impl Iterator<Item = OrderItem> + '_ {
        self.items.iter().map(move |line| OrderItem {
            order_id: self.order_id.clone(),
            customer_id: self.customer_id.clone(),
            channel: self.channel.clone(),
            created_at: self.created_at.clone(),
            payment_status: self.payment_status.clone(),
            qty: line.qty,
            unit_price: line.unit_price,
            attributes: line.attributes.clone(),
            source_row,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Refund {
    #[serde(deserialize_with = "identifier")]
    pub order_id: String,
    pub amount: f64,
}

/// Revenue of one valid order, as appended to `orders_clean`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRevenueFact {
    pub order_id: String,
    pub customer_id: String,
    pub channel: String,
    pub city: String,
    pub created_at: String,
    pub date: NaiveDate,
    pub items_sold: i64,
    pub gross_revenue: f64,
    pub refunds_amount: f64,
    pub net_revenue: f64,
}

/// Metrics for one (date, city, channel) combination, as appended to `daily_city_sales`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummaryFact {
    pub date: NaiveDate,
    pub city: String,
    pub channel: String,
    pub orders_count: i64,
    pub unique_customers: i64,
    pub items_sold: i64,
    pub gross_revenue_eur: f64,
    pub refunds_eur: f64,
    pub net_revenue_eur: f64,
}

/// Renders an attribute value the way it should appear in a text column.
pub fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdentifier {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

/// Identifiers show up as strings in some exports and as numbers in others.
fn identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawIdentifier::deserialize(deserializer)? {
        RawIdentifier::Text(text) => text,
        RawIdentifier::Signed(value) => value.to_string(),
        RawIdentifier::Unsigned(value) => value.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Number(i64),
    Text(String),
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match RawFlag::deserialize(deserializer)? {
        RawFlag::Bool(value) => Ok(value),
        RawFlag::Number(value) => Ok(value != 0),
        RawFlag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(true),
            "false" | "f" | "no" | "n" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean flag {other:?}"
            ))),
        },
    }
}
