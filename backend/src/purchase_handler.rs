use std::sync::Arc;

use async_trait::async_trait;
use shared::{CancelPaymentResponse, InitPaymentRequest};
use thiserror::Error;
use tracing::{info, warn};

use crate::database_connection::{NewPurchase, PurchaseStore, StoreError};
use crate::external_services::signature::TokenCodec;
use crate::external_services::tinkoff::Notification;
use crate::external_services::GatewayError;

/// Everything the gateway needs to open a payment form.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub order_id: String,
    pub amount: i64,
    pub description: String,
    pub email: String,
    pub item_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiatedPayment {
    pub payment_url: String,
    pub payment_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentCancel {
    pub payment_id: String,
    /// Partial refund, `None` cancels the whole payment.
    pub amount: Option<i64>,
    pub purchase_amount: i64,
    pub email: String,
    pub item_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelledPayment {
    pub status: String,
    pub original_amount: Option<i64>,
    pub new_amount: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn init_payment(&self, order: &PaymentOrder) -> Result<InitiatedPayment, GatewayError>;

    async fn cancel_payment(&self, cancel: &PaymentCancel)
        -> Result<CancelledPayment, GatewayError>;
}

#[derive(Error, Debug)]
pub enum PaymentFlowError {
    #[error("Nick and Email are required")]
    MissingContact,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Purchase not found")]
    PurchaseNotFound,

    #[error("Purchase {0} has no gateway payment id")]
    NoPaymentId(i64),

    #[error("Refund amount must be between 1 and {max}")]
    WrongRefundAmount { max: i64 },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, PartialEq)]
pub enum NotificationOutcome {
    /// Token mismatch, nothing was touched.
    Rejected,
    Applied { purchase_id: i64 },
    /// Intermediate status arriving after the purchase was settled.
    Stale { purchase_id: i64 },
    /// Valid notification for an order this shop doesn't know.
    Unmatched,
}

/// Statuses after which the gateway only reports refunds, never progress.
const FINAL_STATUSES: &[&str] = &[
    "CONFIRMED",
    "REJECTED",
    "REVERSED",
    "REFUNDED",
    "PARTIAL_REFUNDED",
    "CANCELED",
    "DEADLINE_EXPIRED",
];

pub fn is_final_status(status: &str) -> bool {
    FINAL_STATUSES.contains(&status)
}

pub struct PaymentHandler {
    store: Arc<dyn PurchaseStore>,
    gateway: Arc<dyn PaymentGateway>,
    codec: Arc<TokenCodec>,
}

impl PaymentHandler {
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        gateway: Arc<dyn PaymentGateway>,
        codec: Arc<TokenCodec>,
    ) -> Self {
        Self {
            store,
            gateway,
            codec,
        }
    }

    /// Records a pending purchase at the catalog price and returns the payment form URL.
    pub async fn create_payment(&self, request: InitPaymentRequest) -> Result<String, PaymentFlowError> {
        if request.nick.trim().is_empty() || request.email.trim().is_empty() {
            return Err(PaymentFlowError::MissingContact);
        }

        let shop_item = match self.store.shop_item(request.product_id).await? {
            Some(item) if item.is_active => item,
            _ => return Err(PaymentFlowError::ProductNotFound),
        };

        if request.amount > 0 && request.amount != shop_item.price {
            warn!(
                product_id = shop_item.id,
                requested = request.amount,
                price = shop_item.price,
                "Client amount differs from catalog price, charging catalog price"
            );
        }

        let purchase = self
            .store
            .create_purchase(NewPurchase {
                email: request.email,
                nickname: request.nick,
                shop_item_id: shop_item.id,
                amount: shop_item.price,
            })
            .await?;

        let order_id = purchase.id.to_string();
        let order = PaymentOrder {
            description: format!("Order #{order_id}"),
            order_id,
            amount: purchase.amount,
            email: purchase.email.clone(),
            item_title: shop_item.title,
        };

        let payment = self.gateway.init_payment(&order).await?;

        if let Some(payment_id) = &payment.payment_id {
            self.store.set_payment_id(purchase.id, payment_id).await?;
        }

        Ok(payment.payment_url)
    }

    /// Applies a gateway notification. The token is checked before any field is trusted.
    pub async fn handle_notification(
        &self,
        notification: &Notification,
    ) -> Result<NotificationOutcome, PaymentFlowError> {
        if !notification.verify(&self.codec) {
            warn!(
                order_id = %notification.order_id,
                terminal_key = %notification.terminal_key,
                "Notification token mismatch"
            );
            return Ok(NotificationOutcome::Rejected);
        }

        let Ok(purchase_id) = notification.order_id.parse::<i64>() else {
            warn!(order_id = %notification.order_id, "Notification for unknown order id format");
            return Ok(NotificationOutcome::Unmatched);
        };

        let Some(purchase) = self.store.purchase(purchase_id).await? else {
            warn!(purchase_id, "Notification for missing purchase");
            return Ok(NotificationOutcome::Unmatched);
        };

        if is_final_status(&purchase.status) && !is_final_status(&notification.status) {
            warn!(
                purchase_id,
                current = %purchase.status,
                received = %notification.status,
                "Late notification ignored, purchase already settled"
            );
            return Ok(NotificationOutcome::Stale { purchase_id });
        }

        let payment_id = Some(notification.payment_id.as_str()).filter(|id| !id.is_empty());
        self.store
            .update_status(purchase_id, &notification.status, payment_id)
            .await?;

        info!(
            purchase_id,
            status = %notification.status,
            success = notification.success,
            "Purchase status updated"
        );

        Ok(NotificationOutcome::Applied { purchase_id })
    }

    /// Asks the gateway to cancel or refund. The status changes only when the
    /// gateway confirms it with a notification.
    pub async fn cancel_payment(
        &self,
        purchase_id: i64,
        amount: Option<i64>,
    ) -> Result<CancelPaymentResponse, PaymentFlowError> {
        let Some(purchase) = self.store.purchase(purchase_id).await? else {
            return Err(PaymentFlowError::PurchaseNotFound);
        };

        let Some(payment_id) = purchase.payment_id else {
            return Err(PaymentFlowError::NoPaymentId(purchase_id));
        };

        if let Some(amount) = amount {
            if amount <= 0 || amount > purchase.amount {
                return Err(PaymentFlowError::WrongRefundAmount {
                    max: purchase.amount,
                });
            }
        }

        let cancel = PaymentCancel {
            payment_id,
            amount,
            purchase_amount: purchase.amount,
            email: purchase.email,
            item_title: purchase
                .shop_item
                .map(|item| item.title)
                .unwrap_or_else(|| format!("Order #{purchase_id}")),
        };

        let cancelled = self.gateway.cancel_payment(&cancel).await?;

        Ok(CancelPaymentResponse {
            status: cancelled.status,
            original_amount: cancelled.original_amount,
            new_amount: cancelled.new_amount,
        })
    }
}
