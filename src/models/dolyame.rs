use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Money amount in kopecks. Dolyame exchanges rubles with two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Kopecks(pub i64);

impl Kopecks {
    /// `None` when the amount does not fit into `i64` kopecks.
    pub fn from_rubles(rubles: i64) -> Option<Self> {
        rubles.checked_mul(100).map(Self)
    }

    pub fn as_rubles(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Serialize for Kopecks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_rubles())
    }
}

impl<'de> Deserialize<'de> for Kopecks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rubles = f64::deserialize(deserializer)?;
        let kopecks = (rubles * 100.0).round();
        if !kopecks.is_finite() || kopecks < i64::MIN as f64 || kopecks >= i64::MAX as f64 {
            return Err(serde::de::Error::custom(format!(
                "amount out of range: {}",
                rubles
            )));
        }
        Ok(Self(kopecks as i64))
    }
}

/// What the application sells through Dolyame: one item, paid in full.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub id: String,
    pub item_name: String,
    pub price: Kopecks,
    pub email: String,
    pub success_url: String,
    pub fail_url: String,
}

impl PaymentOrder {
    pub fn item(&self) -> OrderItem {
        OrderItem {
            name: self.item_name.clone(),
            price: self.price,
            quantity: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub name: String,
    pub price: Kopecks,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    pub order: OrderPayload,
    pub client_info: ClientInfo,
    pub notification_url: String,
    pub success_url: String,
    pub fail_url: String,
}

#[derive(Debug, Serialize)]
pub struct OrderPayload {
    pub id: String,
    pub amount: Kopecks,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CommitRequest {
    pub amount: Kopecks,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize)]
pub struct RefundRequest {
    pub amount: Kopecks,
    pub returned_items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderResponse {
    pub link: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundResponse {
    pub refund_id: String,
    pub amount: Kopecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderInfo {
    pub status: String,
    pub amount: Kopecks,
    #[serde(default)]
    pub residual_amount: Option<Kopecks>,
    #[serde(default)]
    pub link: Option<String>,
}
