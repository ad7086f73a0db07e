use crate::{
    collaborators::CourseCatalog,
    config::AppConfig,
    entities::cart::{self, CartStatus},
    entities::cart_item,
    entities::{Cart, CartItem, CartItemModel, CartModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Cart service for the pre-checkout shopping flow.
///
/// A student has at most one active cart. Items carry a price/title snapshot
/// taken from the catalog at add time; re-adding a course that is already in
/// the cart refreshes that snapshot instead of failing, so the cart always
/// holds the catalog's latest quote until checkout freezes it.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: Arc<dyn CourseCatalog>,
    config: Arc<AppConfig>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<dyn CourseCatalog>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            config,
        }
    }

    /// Returns the student's active cart, creating one when none exists.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, student_id: Uuid) -> Result<CartModel, ServiceError> {
        if let Some(cart) = self.find_active_cart(&*self.db, student_id).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let cart_id = Uuid::new_v4();
        let cart = cart::ActiveModel {
            id: Set(cart_id),
            student_id: Set(student_id),
            currency: Set(self.config.default_currency.clone()),
            total: Set(Decimal::ZERO),
            status: Set(CartStatus::Active),
            expires_at: Set(now + Duration::days(self.config.cart_ttl_days)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let cart = cart.insert(&*self.db).await?;

        self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;
        info!(cart_id = %cart_id, student_id = %student_id, "created cart");
        Ok(cart)
    }

    /// Adds a course to the student's cart, snapshotting price and display
    /// fields from the catalog. Re-adding refreshes the snapshot.
    #[instrument(skip(self))]
    pub async fn add_course(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let course = self
            .catalog
            .course(course_id)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("Course {} not found", course_id)))?;

        let cart = self.get_or_create_cart(student_id).await?;

        let txn = self.db.begin().await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::CourseId.eq(course_id))
            .one(&txn)
            .await?;

        let now = Utc::now();
        if let Some(item) = existing {
            // Refresh the snapshot with the catalog's current quote.
            let mut item: cart_item::ActiveModel = item.into();
            item.title = Set(course.title.clone());
            item.thumbnail_url = Set(course.thumbnail_url.clone());
            item.instructor_name = Set(course.instructor_name.clone());
            item.unit_price = Set(course.price);
            item.updated_at = Set(now);
            item.update(&txn).await?;
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                course_id: Set(course_id),
                title: Set(course.title.clone()),
                thumbnail_url: Set(course.thumbnail_url.clone()),
                instructor_name: Set(course.instructor_name.clone()),
                unit_price: Set(course.price),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        let updated = self.recalculate_total(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                course_id,
            })
            .await;

        info!(cart_id = %cart.id, course_id = %course_id, "added course to cart");
        self.load_with_items(updated).await
    }

    /// Removes a course from the student's cart. Fails with `NotFound` when
    /// the course is not in the cart.
    #[instrument(skip(self))]
    pub async fn remove_course(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let cart = self
            .find_active_cart(&*self.db, student_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let txn = self.db.begin().await?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::CourseId.eq(course_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Course {} is not in the cart", course_id))
            })?;

        item.delete(&txn).await?;
        let updated = self.recalculate_total(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                course_id,
            })
            .await;

        self.load_with_items(updated).await
    }

    /// Empties the student's cart. Succeeds even when the cart is already
    /// empty or absent.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, student_id: Uuid) -> Result<(), ServiceError> {
        let Some(cart) = self.find_active_cart(&*self.db, student_id).await? else {
            return Ok(());
        };

        let txn = self.db.begin().await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let mut active: cart::ActiveModel = cart.clone().into();
        active.total = Set(Decimal::ZERO);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        info!(cart_id = %cart.id, "cleared cart");
        Ok(())
    }

    /// The student's active cart with items, if any.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, student_id: Uuid) -> Result<Option<CartWithItems>, ServiceError> {
        match self.find_active_cart(&*self.db, student_id).await? {
            Some(cart) => Ok(Some(self.load_with_items(cart).await?)),
            None => Ok(None),
        }
    }

    /// Marks expired active carts. Returns the number of carts swept.
    pub async fn expire_stale(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let update = cart::ActiveModel {
            status: Set(CartStatus::Expired),
            updated_at: Set(now),
            ..Default::default()
        };
        let result = Cart::update_many()
            .set(update)
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .filter(cart::Column::ExpiresAt.lt(now))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(count = result.rows_affected, "expired stale carts");
        }
        Ok(result.rows_affected)
    }

    async fn find_active_cart(
        &self,
        conn: &impl ConnectionTrait,
        student_id: Uuid,
    ) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::StudentId.eq(student_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .order_by_desc(cart::Column::CreatedAt)
            .one(conn)
            .await?)
    }

    async fn load_with_items(&self, cart: CartModel) -> Result<CartWithItems, ServiceError> {
        let items = cart.find_related(CartItem).all(&*self.db).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Total is the sum of item prices; no tax or shipping applies to course
    /// sales.
    async fn recalculate_total(
        &self,
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(conn)
            .await?;

        let total: Decimal = items.iter().map(|item| item.unit_price).sum();

        let mut cart: cart::ActiveModel = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?
            .into();
        cart.total = Set(total);
        cart.updated_at = Set(Utc::now());
        Ok(cart.update(conn).await?)
    }
}

/// Cart with its line items.
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
}
