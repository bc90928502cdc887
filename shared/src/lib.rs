use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status every purchase starts with until the gateway reports an outcome.
pub const STATUS_PENDING: &str = "PENDING";

/// Catalog entry. `price` is in minor units (kopecks).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub is_active: bool,
    pub category: String,
    pub subcategory: String,
    pub image: String,
    pub background_color: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: i64,
    pub email: String,
    pub nickname: String,
    pub shop_item_id: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shop_item: Option<ShopItem>,
    pub purchase_date: DateTime<Utc>,
    pub amount: i64,
    pub status: String,
    pub payment_id: Option<String>,
    pub delivered: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub service_id: i64,
    pub email: String,
    pub nickname: String,
}

/// Body of `POST /api/payment/create`.
///
/// `amount` and `description` are accepted for compatibility with older
/// clients, the catalog price is what gets charged.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitPaymentRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub nick: String,
    pub product_id: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InitPaymentResponse {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CancelPaymentRequest {
    pub purchase_id: i64,
    /// Partial refund in minor units, full cancel when absent.
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelPaymentResponse {
    pub status: String,
    pub original_amount: Option<i64>,
    pub new_amount: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackRequest {
    pub player_nick: String,
    pub reason: String,
    pub contact_method: String,
    pub contact_info: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamApplicationRequest {
    pub player_nick: String,
    pub server: String,
    pub role: String,
    pub hours: String,
    pub history: String,
    pub discord: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TelegramResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl TelegramResponse {
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

struct Field<'a> {
    value: &'a str,
    required: Option<&'static str>,
    min: usize,
    max: usize,
    length_message: &'static str,
}

impl Field<'_> {
    fn check(&self, errors: &mut Vec<String>) {
        if self.value.trim().is_empty() {
            if let Some(required) = self.required {
                errors.push(required.to_string());
                return;
            }
            if self.value.is_empty() {
                return;
            }
        }

        let len = self.value.chars().count();
        if len < self.min || len > self.max {
            errors.push(self.length_message.to_string());
        }
    }
}

fn collect(fields: &[Field]) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    for field in fields {
        field.check(&mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        collect(&[
            Field {
                value: &self.player_nick,
                required: Some("Игровой ник обязателен"),
                min: 2,
                max: 50,
                length_message: "Ник должен быть от 2 до 50 символов",
            },
            Field {
                value: &self.reason,
                required: Some("Укажите причину обращения"),
                min: 0,
                max: 100,
                length_message: "Причина не должна превышать 100 символов",
            },
            Field {
                value: &self.contact_method,
                required: Some("Укажите способ связи"),
                min: 0,
                max: 50,
                length_message: "Способ связи не должен превышать 50 символов",
            },
            Field {
                value: &self.contact_info,
                required: Some("Укажите контактные данные"),
                min: 0,
                max: 100,
                length_message: "Контактные данные не должны превышать 100 символов",
            },
            Field {
                value: &self.message,
                required: Some("Сообщение обязательно"),
                min: 10,
                max: 2000,
                length_message: "Сообщение должно быть от 10 до 2000 символов",
            },
        ])
    }
}

impl TeamApplicationRequest {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        collect(&[
            Field {
                value: &self.player_nick,
                required: Some("Игровой ник обязателен"),
                min: 2,
                max: 50,
                length_message: "Ник должен быть от 2 до 50 символов",
            },
            Field {
                value: &self.server,
                required: Some("Укажите сервер"),
                min: 0,
                max: 50,
                length_message: "Сервер не должен превышать 50 символов",
            },
            Field {
                value: &self.role,
                required: Some("Укажите желаемую роль"),
                min: 0,
                max: 50,
                length_message: "Роль не должна превышать 50 символов",
            },
            Field {
                value: &self.hours,
                required: Some("Укажите количество часов"),
                min: 0,
                max: 50,
                length_message: "Часы не должны превышать 50 символов",
            },
            Field {
                value: &self.history,
                required: None,
                min: 0,
                max: 1000,
                length_message: "История наказаний не должна превышать 1000 символов",
            },
            Field {
                value: &self.discord,
                required: Some("Укажите Discord"),
                min: 0,
                max: 100,
                length_message: "Discord не должен превышать 100 символов",
            },
            Field {
                value: &self.reason,
                required: Some("Укажите причину/мотивацию"),
                min: 20,
                max: 2000,
                length_message: "Причина должна быть от 20 до 2000 символов",
            },
        ])
    }
}
