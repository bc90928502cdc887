use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{Purchase, ShopItem, STATUS_PENDING};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{FromRow, MySql, Pool};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Purchase about to be inserted. Status always starts as `PENDING`.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub email: String,
    pub nickname: String,
    pub shop_item_id: i64,
    pub amount: i64,
}

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn active_shop_items(&self) -> Result<Vec<ShopItem>, StoreError>;

    async fn shop_item(&self, id: i64) -> Result<Option<ShopItem>, StoreError>;

    async fn create_purchase(&self, purchase: NewPurchase) -> Result<Purchase, StoreError>;

    /// Purchase together with its catalog item.
    async fn purchase(&self, id: i64) -> Result<Option<Purchase>, StoreError>;

    async fn set_payment_id(&self, id: i64, payment_id: &str) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        id: i64,
        status: &str,
        payment_id: Option<&str>,
    ) -> Result<(), StoreError>;
}

#[derive(FromRow)]
struct ShopItemRow {
    id: i64,
    title: String,
    description: String,
    price: i64,
    is_active: bool,
    category: String,
    subcategory: String,
    image: String,
    background_color: String,
}

impl From<ShopItemRow> for ShopItem {
    fn from(row: ShopItemRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            price: row.price,
            is_active: row.is_active,
            category: row.category,
            subcategory: row.subcategory,
            image: row.image,
            background_color: row.background_color,
        }
    }
}

#[derive(FromRow)]
struct PurchaseRow {
    id: i64,
    email: String,
    nickname: String,
    shop_item_id: i64,
    purchase_date: DateTime<Utc>,
    amount: i64,
    status: String,
    payment_id: Option<String>,
    delivered: bool,
}

impl PurchaseRow {
    fn into_purchase(self, shop_item: Option<ShopItem>) -> Purchase {
        Purchase {
            id: self.id,
            email: self.email,
            nickname: self.nickname,
            shop_item_id: self.shop_item_id,
            shop_item,
            purchase_date: self.purchase_date,
            amount: self.amount,
            status: self.status,
            payment_id: self.payment_id,
            delivered: self.delivered,
        }
    }
}

const SHOP_ITEM_COLUMNS: &str =
    "id, title, description, price, is_active, category, subcategory, image, background_color";

#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: Pool<MySql>,
}

impl DatabaseConnection {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        info!("Database connection established");

        Ok(Self { pool })
    }
}

#[async_trait]
impl PurchaseStore for DatabaseConnection {
    async fn active_shop_items(&self) -> Result<Vec<ShopItem>, StoreError> {
        let rows: Vec<ShopItemRow> = sqlx::query_as(&format!(
            "SELECT {SHOP_ITEM_COLUMNS} FROM shop_items WHERE is_active = TRUE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ShopItem::from).collect())
    }

    async fn shop_item(&self, id: i64) -> Result<Option<ShopItem>, StoreError> {
        let row: Option<ShopItemRow> =
            sqlx::query_as(&format!("SELECT {SHOP_ITEM_COLUMNS} FROM shop_items WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(ShopItem::from))
    }

    async fn create_purchase(&self, purchase: NewPurchase) -> Result<Purchase, StoreError> {
        let purchase_date = Utc::now();

        let result = sqlx::query(
            "INSERT INTO purchases (email, nickname, shop_item_id, purchase_date, amount, status, delivered) VALUES (?, ?, ?, ?, ?, ?, FALSE)",
        )
        .bind(&purchase.email)
        .bind(&purchase.nickname)
        .bind(purchase.shop_item_id)
        .bind(purchase_date)
        .bind(purchase.amount)
        .bind(STATUS_PENDING)
        .execute(&self.pool)
        .await?;

        Ok(Purchase {
            id: result.last_insert_id() as i64,
            email: purchase.email,
            nickname: purchase.nickname,
            shop_item_id: purchase.shop_item_id,
            shop_item: None,
            purchase_date,
            amount: purchase.amount,
            status: STATUS_PENDING.to_string(),
            payment_id: None,
            delivered: false,
        })
    }

    async fn purchase(&self, id: i64) -> Result<Option<Purchase>, StoreError> {
        let row: Option<PurchaseRow> = sqlx::query_as(
            "SELECT id, email, nickname, shop_item_id, purchase_date, amount, status, payment_id, delivered FROM purchases WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let shop_item = self.shop_item(row.shop_item_id).await?;

        Ok(Some(row.into_purchase(shop_item)))
    }

    async fn set_payment_id(&self, id: i64, payment_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE purchases SET payment_id = ? WHERE id = ?")
            .bind(payment_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_status(
        &self,
        id: i64,
        status: &str,
        payment_id: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE purchases SET status = ?, payment_id = COALESCE(?, payment_id) WHERE id = ?")
            .bind(status)
            .bind(payment_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
