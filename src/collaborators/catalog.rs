use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Course facts resolved from the catalog at cart-add and checkout time.
/// Once copied into a cart item or order snapshot these values are frozen;
/// the catalog is never re-queried to "correct" them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSnapshot {
    pub id: Uuid,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub instructor_name: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub allow_installments: bool,
}

/// Read-only view of the course catalog, owned by another subsystem.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn course(&self, course_id: Uuid) -> Option<CourseSnapshot>;
}

/// In-memory catalog used by tests and local development.
#[derive(Default)]
pub struct InMemoryCatalog {
    courses: RwLock<HashMap<Uuid, CourseSnapshot>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: CourseSnapshot) {
        self.courses
            .write()
            .expect("catalog lock")
            .insert(snapshot.id, snapshot);
    }

    /// Changes a course price in place; existing carts and orders must keep
    /// their frozen snapshots.
    pub fn set_price(&self, course_id: Uuid, price: Decimal) {
        if let Some(course) = self
            .courses
            .write()
            .expect("catalog lock")
            .get_mut(&course_id)
        {
            course.price = price;
        }
    }
}

#[async_trait]
impl CourseCatalog for InMemoryCatalog {
    async fn course(&self, course_id: Uuid) -> Option<CourseSnapshot> {
        self.courses
            .read()
            .expect("catalog lock")
            .get(&course_id)
            .cloned()
    }
}
