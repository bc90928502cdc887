use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use shared::{Purchase, ShopItem, TelegramResponse, STATUS_PENDING};

use crate::api::AppState;
use crate::database_connection::{NewPurchase, PurchaseStore, StoreError};
use crate::external_services::signature::TokenCodec;
use crate::external_services::telegram::Notifier;
use crate::external_services::tinkoff::Notification;
use crate::external_services::GatewayError;
use crate::purchase_handler::{
    CancelledPayment, InitiatedPayment, PaymentCancel, PaymentGateway, PaymentHandler,
    PaymentOrder,
};
use crate::rate_limit::RateLimiter;
use crate::secret::Secret;

pub const TEST_TERMINAL_KEY: &str = "TestTerm";
pub const TEST_PASSWORD: &str = "secret123";
pub const TEST_ADMIN_TOKEN: &str = "admin-token";

pub const TEST_ITEM_ID: i64 = 1;
pub const TEST_ITEM_PRICE: i64 = 19900;
pub const ARCHIVED_ITEM_ID: i64 = 2;

pub fn codec() -> TokenCodec {
    TokenCodec::new(TEST_TERMINAL_KEY, Secret::new(TEST_PASSWORD.to_string())).unwrap()
}

/// Notification as the gateway would send it for `order_id`, signed with the test terminal.
pub fn signed_notification(order_id: &str, status: &str, payment_id: &str) -> Notification {
    let mut notification = Notification {
        terminal_key: TEST_TERMINAL_KEY.to_string(),
        order_id: order_id.to_string(),
        success: true,
        status: status.to_string(),
        payment_id: payment_id.to_string(),
        error_code: "0".to_string(),
        amount: TEST_ITEM_PRICE,
        card_id: None,
        pan: None,
        exp_date: None,
        token: String::new(),
    };

    let codec = codec();
    notification.token = codec
        .token_for(notification.signable_fields(codec.terminal_key()))
        .to_string();

    notification
}

fn shop_item(id: i64, title: &str, price: i64, is_active: bool) -> ShopItem {
    ShopItem {
        id,
        title: title.to_string(),
        description: format!("{title} for your account"),
        price,
        is_active,
        category: "privileges".to_string(),
        subcategory: "vip".to_string(),
        image: format!("/images/{id}.png"),
        background_color: "#1f2937".to_string(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<Vec<ShopItem>>,
    purchases: Mutex<Vec<Purchase>>,
}

impl MemoryStore {
    /// One active item at [`TEST_ITEM_PRICE`] and one archived item.
    pub fn with_catalog() -> Self {
        Self {
            items: Mutex::new(vec![
                shop_item(TEST_ITEM_ID, "VIP", TEST_ITEM_PRICE, true),
                shop_item(ARCHIVED_ITEM_ID, "Legacy VIP", 9900, false),
            ]),
            purchases: Mutex::default(),
        }
    }

    pub fn deactivate(&self, id: i64) {
        for item in self.items.lock().unwrap().iter_mut() {
            if item.id == id {
                item.is_active = false;
            }
        }
    }

    fn find_item(&self, id: i64) -> Option<ShopItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    fn update(&self, id: i64, apply: impl FnOnce(&mut Purchase)) {
        if let Some(purchase) = self
            .purchases
            .lock()
            .unwrap()
            .iter_mut()
            .find(|purchase| purchase.id == id)
        {
            apply(purchase);
        }
    }
}

#[async_trait]
impl PurchaseStore for MemoryStore {
    async fn active_shop_items(&self) -> Result<Vec<ShopItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.is_active)
            .cloned()
            .collect())
    }

    async fn shop_item(&self, id: i64) -> Result<Option<ShopItem>, StoreError> {
        Ok(self.find_item(id))
    }

    async fn create_purchase(&self, purchase: NewPurchase) -> Result<Purchase, StoreError> {
        let mut purchases = self.purchases.lock().unwrap();

        let created = Purchase {
            id: purchases.len() as i64 + 1,
            email: purchase.email,
            nickname: purchase.nickname,
            shop_item_id: purchase.shop_item_id,
            shop_item: None,
            purchase_date: Utc::now(),
            amount: purchase.amount,
            status: STATUS_PENDING.to_string(),
            payment_id: None,
            delivered: false,
        };
        purchases.push(created.clone());

        Ok(created)
    }

    async fn purchase(&self, id: i64) -> Result<Option<Purchase>, StoreError> {
        let purchase = self
            .purchases
            .lock()
            .unwrap()
            .iter()
            .find(|purchase| purchase.id == id)
            .cloned();

        Ok(purchase.map(|purchase| Purchase {
            shop_item: self.find_item(purchase.shop_item_id),
            ..purchase
        }))
    }

    async fn set_payment_id(&self, id: i64, payment_id: &str) -> Result<(), StoreError> {
        self.update(id, |purchase| purchase.payment_id = Some(payment_id.to_string()));
        Ok(())
    }

    async fn update_status(
        &self,
        id: i64,
        status: &str,
        payment_id: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update(id, |purchase| {
            purchase.status = status.to_string();
            if let Some(payment_id) = payment_id {
                purchase.payment_id = Some(payment_id.to_string());
            }
        });
        Ok(())
    }
}

/// Gateway that answers locally and records what it was asked to do.
#[derive(Default)]
pub struct FakeGateway {
    failing: bool,
    orders: Mutex<Vec<PaymentOrder>>,
    cancels: Mutex<Vec<PaymentCancel>>,
}

impl FakeGateway {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn orders(&self) -> Vec<PaymentOrder> {
        self.orders.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<PaymentCancel> {
        self.cancels.lock().unwrap().clone()
    }

    fn rejection() -> GatewayError {
        GatewayError::Rejected {
            code: Some("204".to_string()),
            message: "Неверный токен".to_string(),
            details: String::new(),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn init_payment(&self, order: &PaymentOrder) -> Result<InitiatedPayment, GatewayError> {
        self.orders.lock().unwrap().push(order.clone());

        if self.failing {
            return Err(Self::rejection());
        }

        let payment_id = 700_000_000 + order.order_id.parse::<i64>().unwrap_or_default();

        Ok(InitiatedPayment {
            payment_url: format!("https://pay.example/{}", order.order_id),
            payment_id: Some(payment_id.to_string()),
        })
    }

    async fn cancel_payment(
        &self,
        cancel: &PaymentCancel,
    ) -> Result<CancelledPayment, GatewayError> {
        self.cancels.lock().unwrap().push(cancel.clone());

        if self.failing {
            return Err(Self::rejection());
        }

        let (status, new_amount) = match cancel.amount {
            Some(amount) if amount < cancel.purchase_amount => {
                ("PARTIAL_REFUNDED", cancel.purchase_amount - amount)
            }
            _ => ("REFUNDED", 0),
        };

        Ok(CancelledPayment {
            status: status.to_string(),
            original_amount: Some(cancel.purchase_amount),
            new_amount: Some(new_amount),
        })
    }
}

/// Notifier that keeps the rendered messages instead of sending them.
pub struct FakeNotifier {
    response: TelegramResponse,
    messages: Mutex<Vec<String>>,
}

impl FakeNotifier {
    pub fn delivering() -> Self {
        Self {
            response: TelegramResponse::sent("Сообщение успешно отправлено"),
            messages: Mutex::default(),
        }
    }

    pub fn broken() -> Self {
        Self {
            response: TelegramResponse::failed("Ошибка при отправке в Telegram"),
            messages: Mutex::default(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_message(&self, text: String) -> TelegramResponse {
        self.messages.lock().unwrap().push(text);
        self.response.clone()
    }
}

/// Application state wired to in-memory fakes.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<FakeNotifier>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(FakeGateway::default(), FakeNotifier::delivering())
    }

    pub fn with(gateway: FakeGateway, notifier: FakeNotifier) -> Self {
        let store = Arc::new(MemoryStore::with_catalog());
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(notifier);

        let payments = PaymentHandler::new(store.clone(), gateway.clone(), Arc::new(codec()));

        let state = AppState {
            store: store.clone(),
            payments: Arc::new(payments),
            notifier: notifier.clone(),
            limiter: Arc::new(RateLimiter::default()),
            admin_token: Some(Secret::new(TEST_ADMIN_TOKEN.to_string())),
        };

        Self {
            store,
            gateway,
            notifier,
            state,
        }
    }
}
