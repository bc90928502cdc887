use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::external_services::signature::{SignablePayload, Signature, SignedRequest, TokenCodec};
use crate::external_services::{boolean, optional_string_or_number, string_or_number, GatewayError};

/// Receipt item names are cut to this many characters by the gateway.
const RECEIPT_ITEM_NAME_LIMIT: usize = 128;

#[skip_serializing_none]
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
/**
https://www.tbank.ru/kassa/dev/payments/#tag/Standartnyj-platezh/operation/Init
 */
pub struct InitRequest {
    /**
    Идентификатор терминала
     */
    pub terminal_key: String,

    /**
    Сумма в копейках
     */
    pub amount: i64,

    /**
    Идентификатор заказа в системе магазина
     */
    pub order_id: String,

    /**
    Описание заказа
     */
    pub description: String,

    pub token: Option<Signature>,

    /**
    Данные чека. Передается, но не участвует в подписи
     */
    pub receipt: Option<Receipt>,
}

impl SignedRequest for InitRequest {
    fn signable_fields(&self) -> SignablePayload {
        SignablePayload::new()
            .with("TerminalKey", self.terminal_key.as_str())
            .with("Amount", self.amount)
            .with("OrderId", self.order_id.as_str())
            .with("Description", self.description.as_str())
    }

    fn set_token(&mut self, token: Signature) {
        self.token = Some(token);
    }
}

#[skip_serializing_none]
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
/**
https://www.tbank.ru/kassa/dev/payments/#tag/Otmena-platezha/operation/Cancel
 */
pub struct CancelRequest {
    pub terminal_key: String,

    /**
    Идентификатор платежа в системе банка
     */
    pub payment_id: String,

    /**
    Сумма к возврату в копейках. Если не передана, отменяется вся сумма
     */
    pub amount: Option<i64>,

    pub token: Option<Signature>,

    pub receipt: Option<Receipt>,
}

impl SignedRequest for CancelRequest {
    fn signable_fields(&self) -> SignablePayload {
        let mut fields = SignablePayload::new()
            .with("TerminalKey", self.terminal_key.as_str())
            .with("PaymentId", self.payment_id.as_str());
        fields.insert_optional("Amount", self.amount);

        fields
    }

    fn set_token(&mut self, token: Signature) {
        self.token = Some(token);
    }
}

#[skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Receipt {
    pub email: Option<String>,
    pub phone: Option<String>,
    /**
    Система налогообложения: osn, usn_income, usn_income_outcome, esn, patent
     */
    pub taxation: String,
    pub items: Vec<ReceiptItem>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ReceiptItem {
    pub name: String,
    /**
    Цена за единицу в копейках
     */
    pub price: i64,
    pub quantity: u32,
    /**
    Стоимость позиции в копейках
     */
    pub amount: i64,
    /**
    Ставка НДС: none, vat0, vat10, vat20
     */
    pub tax: String,
}

impl Receipt {
    pub fn single_item(email: &str, taxation: &str, name: &str, amount: i64) -> Self {
        Self {
            email: (!email.is_empty()).then(|| email.to_string()),
            phone: None,
            taxation: taxation.to_string(),
            items: vec![ReceiptItem {
                name: name.chars().take(RECEIPT_ITEM_NAME_LIMIT).collect(),
                price: amount,
                quantity: 1,
                amount,
                tax: "none".to_string(),
            }],
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct InitResponse {
    #[serde(deserialize_with = "boolean")]
    pub success: bool,

    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub error_code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub details: Option<String>,

    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub payment_id: Option<String>,

    /**
    Ссылка на платежную форму
     */
    #[serde(rename = "PaymentURL", default)]
    pub payment_url: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct CancelResponse {
    #[serde(deserialize_with = "boolean")]
    pub success: bool,

    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub error_code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub details: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub original_amount: Option<i64>,

    #[serde(default)]
    pub new_amount: Option<i64>,
}

fn rejected(code: Option<String>, message: Option<String>, details: Option<String>) -> GatewayError {
    GatewayError::Rejected {
        code,
        message: message.unwrap_or_else(|| "Unknown error".to_string()),
        details: details.unwrap_or_default(),
    }
}

/**
Уведомление об изменении статуса платежа (webhook)
 */
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    #[serde(default)]
    pub terminal_key: String,

    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,

    #[serde(deserialize_with = "boolean")]
    pub success: bool,

    /**
    AUTHORIZED, CONFIRMED, REVERSED, REFUNDED, PARTIAL_REFUNDED, REJECTED
     */
    pub status: String,

    #[serde(deserialize_with = "string_or_number")]
    pub payment_id: String,

    #[serde(deserialize_with = "string_or_number")]
    pub error_code: String,

    pub amount: i64,

    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub card_id: Option<String>,

    /**
    Замаскированный номер карты
     */
    #[serde(default)]
    pub pan: Option<String>,

    /**
    Срок действия карты, MMYY
     */
    #[serde(default)]
    pub exp_date: Option<String>,

    pub token: String,
}

impl Notification {
    /// Signed fields of a notification. The terminal key is the configured
    /// one, the card fields take part only when the gateway sent them.
    pub fn signable_fields(&self, terminal_key: &str) -> SignablePayload {
        let mut fields = SignablePayload::new()
            .with("TerminalKey", terminal_key)
            .with("OrderId", self.order_id.as_str())
            .with("Success", self.success)
            .with("Status", self.status.as_str())
            .with("PaymentId", self.payment_id.as_str())
            .with("ErrorCode", self.error_code.as_str())
            .with("Amount", self.amount);

        fields.insert_optional("CardId", present(&self.card_id));
        fields.insert_optional("Pan", present(&self.pan));
        fields.insert_optional("ExpDate", present(&self.exp_date));

        fields
    }

    pub fn verify(&self, codec: &TokenCodec) -> bool {
        codec.check(self.signable_fields(codec.terminal_key()), &self.token)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub(crate) mod handler {
    use std::sync::Arc;

    use async_trait::async_trait;
    use reqwest::Response;
    use serde::de::DeserializeOwned;
    use tracing::{debug, info, warn};

    use crate::external_services::signature::TokenCodec;
    use crate::external_services::tinkoff::{
        rejected, CancelRequest, CancelResponse, InitRequest, InitResponse, Receipt,
    };
    use crate::external_services::GatewayError;
    use crate::purchase_handler::{
        CancelledPayment, InitiatedPayment, PaymentCancel, PaymentGateway, PaymentOrder,
    };

    pub struct TinkoffInvoiceHandler {
        client: reqwest::Client,
        api_url: String,
        codec: Arc<TokenCodec>,
        taxation: Option<String>,
    }

    impl TinkoffInvoiceHandler {
        pub fn new(
            client: reqwest::Client,
            api_url: &str,
            codec: Arc<TokenCodec>,
            taxation: Option<String>,
        ) -> Self {
            Self {
                client,
                api_url: api_url.trim_end_matches('/').to_string(),
                codec,
                taxation,
            }
        }

        fn receipt(&self, email: &str, name: &str, amount: i64) -> Option<Receipt> {
            self.taxation
                .as_deref()
                .map(|taxation| Receipt::single_item(email, taxation, name, amount))
        }

        pub fn init_request(&self, order: &PaymentOrder) -> InitRequest {
            let request = InitRequest {
                terminal_key: self.codec.terminal_key().to_string(),
                amount: order.amount,
                order_id: order.order_id.clone(),
                description: order.description.clone(),
                token: None,
                receipt: self.receipt(&order.email, &order.item_title, order.amount),
            };

            self.codec.seal(request)
        }

        pub fn cancel_request(&self, cancel: &PaymentCancel) -> CancelRequest {
            let refund = cancel.amount.unwrap_or(cancel.purchase_amount);
            let request = CancelRequest {
                terminal_key: self.codec.terminal_key().to_string(),
                payment_id: cancel.payment_id.clone(),
                amount: cancel.amount,
                token: None,
                receipt: self.receipt(&cancel.email, &cancel.item_title, refund),
            };

            self.codec.seal(request)
        }

        async fn read_response<T: DeserializeOwned>(
            response: Response,
            operation: &str,
        ) -> Result<T, GatewayError> {
            let status = response.status();
            let body = response.text().await?;

            debug!(operation, %status, %body, "Tinkoff response");

            match serde_json::from_str(&body) {
                Ok(parsed) => Ok(parsed),
                Err(_) if !status.is_success() => Err(GatewayError::WrongStatusCode {
                    code: status.as_u16(),
                    body,
                }),
                Err(err) => Err(err.into()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for TinkoffInvoiceHandler {
        async fn init_payment(&self, order: &PaymentOrder) -> Result<InitiatedPayment, GatewayError> {
            let request = self.init_request(order);

            debug!(
                request = %serde_json::to_string(&request)?,
                "Tinkoff Init request"
            );

            let response = self
                .client
                .post(format!("{}/Init", self.api_url))
                .json(&request)
                .send()
                .await?;

            let body: InitResponse = Self::read_response(response, "Init").await?;

            if !body.success {
                warn!(order_id = %order.order_id, code = ?body.error_code, "Tinkoff rejected Init");
                return Err(rejected(body.error_code, body.message, body.details));
            }

            let Some(payment_url) = body.payment_url else {
                return Err(GatewayError::FieldMissing {
                    field: "PaymentURL",
                    operation: "Init",
                });
            };

            info!(
                order_id = %order.order_id,
                payment_id = ?body.payment_id,
                status = ?body.status,
                "Payment initiated"
            );

            Ok(InitiatedPayment {
                payment_url,
                payment_id: body.payment_id,
            })
        }

        async fn cancel_payment(
            &self,
            cancel: &PaymentCancel,
        ) -> Result<CancelledPayment, GatewayError> {
            let request = self.cancel_request(cancel);

            debug!(
                request = %serde_json::to_string(&request)?,
                "Tinkoff Cancel request"
            );

            let response = self
                .client
                .post(format!("{}/Cancel", self.api_url))
                .json(&request)
                .send()
                .await?;

            let body: CancelResponse = Self::read_response(response, "Cancel").await?;

            if !body.success {
                warn!(payment_id = %cancel.payment_id, code = ?body.error_code, "Tinkoff rejected Cancel");
                return Err(rejected(body.error_code, body.message, body.details));
            }

            let Some(status) = body.status else {
                return Err(GatewayError::FieldMissing {
                    field: "Status",
                    operation: "Cancel",
                });
            };

            info!(payment_id = %cancel.payment_id, %status, "Payment cancelled");

            Ok(CancelledPayment {
                status,
                original_amount: body.original_amount,
                new_amount: body.new_amount,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::handler::TinkoffInvoiceHandler;
    use super::*;
    use crate::purchase_handler::{PaymentCancel, PaymentOrder};
    use crate::secret::Secret;

    const INIT_TOKEN: &str = "2c7e5e369609798798ac5556f4a9e548b1ff6478f29174fdb3b155ac1f4e3bb2";
    const CANCEL_TOKEN: &str = "74f051d135a9c943701045e79ee51f990412082b9927d6665f0fbc0b693ba899";
    const PARTIAL_CANCEL_TOKEN: &str =
        "4ffb358ab05272459d2d3f1712cbc51aab006115db8d654e3fed4fa00f631658";
    const NOTIFICATION_TOKEN: &str =
        "612d94adae30a5d55421cbf882472fe7723ea4e90062bf8e1a8bef64641f0063";
    const CARD_NOTIFICATION_TOKEN: &str =
        "47430ca71578508e282aeb5ff057a6e5dca4a45ae75cabfa278418ae15b83e76";

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new("TestTerm", Secret::new("secret123".to_string())).unwrap())
    }

    fn handler(taxation: Option<&str>) -> TinkoffInvoiceHandler {
        TinkoffInvoiceHandler::new(
            reqwest::Client::new(),
            "https://securepay.tinkoff.ru/v2/",
            codec(),
            taxation.map(str::to_string),
        )
    }

    fn order() -> PaymentOrder {
        PaymentOrder {
            order_id: "42".to_string(),
            amount: 19900,
            description: "Order #42".to_string(),
            email: "buyer@example.com".to_string(),
            item_title: "Premium account, 30 days".to_string(),
        }
    }

    fn cancel(amount: Option<i64>) -> PaymentCancel {
        PaymentCancel {
            payment_id: "700000085".to_string(),
            amount,
            purchase_amount: 19900,
            email: "buyer@example.com".to_string(),
            item_title: "Premium account, 30 days".to_string(),
        }
    }

    fn notification_json() -> Value {
        serde_json::json!({
            "TerminalKey": "TestTerm",
            "OrderId": "42",
            "Success": true,
            "Status": "CONFIRMED",
            "PaymentId": 700000085,
            "ErrorCode": "0",
            "Amount": 19900,
            "Token": NOTIFICATION_TOKEN,
        })
    }

    #[test]
    fn init_request_is_signed_without_password() {
        let request = handler(None).init_request(&order());

        assert_eq!(request.token.as_ref().map(Signature::as_str), Some(INIT_TOKEN));

        let body = serde_json::to_string(&request).unwrap();
        assert!(!body.contains("Password"));
        assert!(!body.contains("secret123"));
        assert!(!body.contains("Receipt"));
        assert!(body.contains(r#""Token":"2c7e5e36"#));
    }

    #[test]
    fn receipt_is_transmitted_but_not_signed() {
        let request = handler(Some("usn_income")).init_request(&order());

        assert_eq!(request.token.as_ref().map(Signature::as_str), Some(INIT_TOKEN));

        let body: Value = serde_json::to_value(&request).unwrap();
        assert_eq!(body["Receipt"]["Taxation"], "usn_income");
        assert_eq!(body["Receipt"]["Email"], "buyer@example.com");
        assert_eq!(body["Receipt"]["Items"][0]["Amount"], 19900);
        assert_eq!(body["Receipt"]["Items"][0]["Quantity"], 1);
        assert_eq!(body["Amount"], 19900);
        assert_eq!(body["OrderId"], "42");
    }

    #[test]
    fn cancel_signs_amount_only_when_given() {
        let full = handler(None).cancel_request(&cancel(None));
        assert_eq!(full.token.as_ref().map(Signature::as_str), Some(CANCEL_TOKEN));
        let body = serde_json::to_string(&full).unwrap();
        assert!(!body.contains("Amount"));

        let partial = handler(Some("osn")).cancel_request(&cancel(Some(5000)));
        assert_eq!(
            partial.token.as_ref().map(Signature::as_str),
            Some(PARTIAL_CANCEL_TOKEN)
        );
        let body: Value = serde_json::to_value(&partial).unwrap();
        assert_eq!(body["Amount"], 5000);
        assert_eq!(body["Receipt"]["Items"][0]["Amount"], 5000);
        assert!(body.get("Password").is_none());
    }

    #[test]
    fn receipt_item_name_is_truncated() {
        let receipt = Receipt::single_item("", "osn", &"я".repeat(200), 100);

        assert_eq!(receipt.items[0].name.chars().count(), 128);
        assert_eq!(receipt.email, None);
    }

    #[test]
    fn notification_without_card_fields_verifies() {
        let notification: Notification = serde_json::from_value(notification_json()).unwrap();

        assert_eq!(notification.payment_id, "700000085");
        assert!(notification.verify(&codec()));
    }

    #[test]
    fn notification_with_card_fields_verifies() {
        let mut json = notification_json();
        json["CardId"] = 123.into();
        json["Pan"] = "430000******0777".into();
        json["ExpDate"] = "1230".into();
        json["Token"] = CARD_NOTIFICATION_TOKEN.into();

        let notification: Notification = serde_json::from_value(json).unwrap();

        assert!(notification.verify(&codec()));
    }

    #[test]
    fn optional_field_on_one_side_is_rejected() {
        for (field, value) in [
            ("CardId", Value::from(123)),
            ("Pan", Value::from("430000******0777")),
            ("ExpDate", Value::from("1230")),
        ] {
            let mut json = notification_json();
            json[field] = value;
            let notification: Notification = serde_json::from_value(json).unwrap();

            assert!(!notification.verify(&codec()), "extra {field}");
        }

        let mut json = notification_json();
        json["Token"] = CARD_NOTIFICATION_TOKEN.into();
        let notification: Notification = serde_json::from_value(json).unwrap();
        assert!(!notification.verify(&codec()));
    }

    #[test]
    fn empty_optional_fields_count_as_absent() {
        let mut json = notification_json();
        json["Pan"] = "".into();
        json["CardId"] = Value::Null;
        let notification: Notification = serde_json::from_value(json).unwrap();

        assert!(notification.verify(&codec()));
    }

    #[test]
    fn tampered_notification_is_rejected() {
        let tampered: [(&str, Value); 5] = [
            ("Amount", 1.into()),
            ("Status", "REJECTED".into()),
            ("OrderId", "43".into()),
            ("Success", false.into()),
            ("Token", NOTIFICATION_TOKEN.replace('6', "7").into()),
        ];

        for (field, value) in tampered {
            let mut json = notification_json();
            json[field] = value;
            let notification: Notification = serde_json::from_value(json).unwrap();

            assert!(!notification.verify(&codec()), "tampered {field}");
        }
    }

    #[test]
    fn notification_is_checked_against_configured_terminal() {
        let other = TokenCodec::new("OtherTerm", Secret::new("secret123".to_string())).unwrap();
        let notification: Notification = serde_json::from_value(notification_json()).unwrap();

        assert!(!notification.verify(&other));
    }

    #[test]
    fn init_response_parses_numeric_payment_id() {
        let body = r#"{"Success":true,"ErrorCode":"0","TerminalKey":"TestTerm","Status":"NEW","PaymentId":"3093639567","OrderId":"42","Amount":19900,"PaymentURL":"https://securepayments.tinkoff.ru/new/fU1ppgqa"}"#;
        let response: InitResponse = serde_json::from_str(body).unwrap();

        assert!(response.success);
        assert_eq!(response.payment_id.as_deref(), Some("3093639567"));
        assert_eq!(
            response.payment_url.as_deref(),
            Some("https://securepayments.tinkoff.ru/new/fU1ppgqa")
        );

        let failed: InitResponse = serde_json::from_str(
            r#"{"Success":false,"ErrorCode":"204","Message":"Неверный токен","Details":"Проверьте пару TerminalKey/SecretKey"}"#,
        )
        .unwrap();
        let err = rejected(failed.error_code, failed.message, failed.details);
        assert_eq!(
            err.to_string(),
            "Tinkoff Error: Неверный токен Проверьте пару TerminalKey/SecretKey"
        );
    }
}
