//! Read-only facade over balances and movement history.
//!
//! Everything here is derived from committed rows. The service holds no
//! locks, writes nothing, and can be pointed at a read replica.

use std::sync::Arc;

use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::stock_level::{self, Entity as StockLevelEntity};
use crate::entities::stock_movement::{self, Entity as StockMovementEntity, MovementType};
use crate::errors::ServiceError;

const MAX_LIST_LIMIT: u64 = 1000;

/// Balance row joined with the product it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockLevelView {
    pub product_id: i64,
    pub sku: String,
    pub product_name: String,
    pub location: String,
    pub quantity_on_hand: i64,
    pub quantity_reserved: i64,
    pub available: i64,
    pub reorder_level: i64,
    pub reorder_quantity: i64,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_stock_take_date: Option<DateTimeWithTimeZone>,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTimeWithTimeZone,
}

impl StockLevelView {
    fn from_parts(level: stock_level::Model, sku: String, product_name: String) -> Self {
        Self {
            product_id: level.product_id,
            sku,
            product_name,
            location: level.location,
            quantity_on_hand: level.quantity_on_hand,
            quantity_reserved: level.quantity_reserved,
            available: level.quantity_on_hand - level.quantity_reserved,
            reorder_level: level.reorder_level,
            reorder_quantity: level.reorder_quantity,
            last_stock_take_date: level.last_stock_take_date,
            updated_at: level.updated_at,
        }
    }
}

/// The foreign key makes a missing product impossible; the join API still
/// hands it back as an option.
fn view_from_joined(row: (stock_level::Model, Option<product::Model>)) -> StockLevelView {
    let (level, joined) = row;
    let (sku, name) = joined.map(|p| (p.sku, p.name)).unwrap_or_default();
    StockLevelView::from_parts(level, sku, name)
}

/// Movement history filters; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MovementHistoryFilter {
    pub product_id: Option<i64>,
    pub location: Option<String>,
    pub movement_type: Option<MovementType>,
    pub reference_number: Option<String>,
    pub from: Option<DateTimeWithTimeZone>,
    pub to: Option<DateTimeWithTimeZone>,
}

fn validate_paging(page: u64, limit: u64) -> Result<(), ServiceError> {
    if page == 0 {
        return Err(ServiceError::ValidationError(
            "Page number must be greater than 0".to_string(),
        ));
    }
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(ServiceError::ValidationError(format!(
            "Limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct StockQueryService {
    db_pool: Arc<DbPool>,
}

impl StockQueryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Looks up one balance row. Distinguishes an unknown product from a
    /// product that simply has no activity at the location yet.
    #[instrument(skip(self))]
    pub async fn get_stock_level(
        &self,
        product_id: i64,
        location: &str,
    ) -> Result<StockLevelView, ServiceError> {
        let db = self.db_pool.as_ref();

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let level = StockLevelEntity::find()
            .filter(stock_level::Column::ProductId.eq(product_id))
            .filter(stock_level::Column::Location.eq(location))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No stock level for product {} at {}",
                    product_id, location
                ))
            })?;

        Ok(StockLevelView::from_parts(level, product.sku, product.name))
    }

    /// Pages through balance rows, optionally pinned to one location or
    /// one product.
    #[instrument(skip(self))]
    pub async fn list_stock_levels(
        &self,
        page: u64,
        limit: u64,
        location: Option<String>,
        product_id: Option<i64>,
    ) -> Result<(Vec<StockLevelView>, u64), ServiceError> {
        validate_paging(page, limit)?;

        let db = self.db_pool.as_ref();
        let mut query = StockLevelEntity::find()
            .find_also_related(ProductEntity)
            .order_by_asc(stock_level::Column::ProductId)
            .order_by_asc(stock_level::Column::Location);
        if let Some(location) = location {
            query = query.filter(stock_level::Column::Location.eq(location));
        }
        if let Some(product_id) = product_id {
            query = query.filter(stock_level::Column::ProductId.eq(product_id));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let rows = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((rows.into_iter().map(view_from_joined).collect(), total))
    }

    /// Rows whose available quantity has fallen to their reorder level.
    /// Rows with the threshold disabled (zero) never appear.
    #[instrument(skip(self))]
    pub async fn low_stock(
        &self,
        location: Option<String>,
    ) -> Result<Vec<StockLevelView>, ServiceError> {
        use sea_orm::sea_query::Expr;

        let db = self.db_pool.as_ref();
        let mut query = StockLevelEntity::find()
            .find_also_related(ProductEntity)
            .filter(stock_level::Column::ReorderLevel.gt(0))
            .filter(
                Expr::expr(
                    Expr::col(stock_level::Column::QuantityOnHand)
                        .sub(Expr::col(stock_level::Column::QuantityReserved)),
                )
                .lte(Expr::col(stock_level::Column::ReorderLevel)),
            )
            .order_by_asc(stock_level::Column::ProductId)
            .order_by_asc(stock_level::Column::Location);
        if let Some(location) = location {
            query = query.filter(stock_level::Column::Location.eq(location));
        }

        let rows = query.all(db).await.map_err(ServiceError::DatabaseError)?;
        Ok(rows.into_iter().map(view_from_joined).collect())
    }

    /// Rows with nothing left to promise: everything on hand is reserved,
    /// or the row is empty.
    #[instrument(skip(self))]
    pub async fn out_of_stock(
        &self,
        location: Option<String>,
    ) -> Result<Vec<StockLevelView>, ServiceError> {
        use sea_orm::sea_query::Expr;

        let db = self.db_pool.as_ref();
        let mut query = StockLevelEntity::find()
            .find_also_related(ProductEntity)
            .filter(
                Expr::expr(
                    Expr::col(stock_level::Column::QuantityOnHand)
                        .sub(Expr::col(stock_level::Column::QuantityReserved)),
                )
                .lte(0),
            )
            .order_by_asc(stock_level::Column::ProductId)
            .order_by_asc(stock_level::Column::Location);
        if let Some(location) = location {
            query = query.filter(stock_level::Column::Location.eq(location));
        }

        let rows = query.all(db).await.map_err(ServiceError::DatabaseError)?;
        Ok(rows.into_iter().map(view_from_joined).collect())
    }

    /// Pages through the movement ledger, newest first.
    #[instrument(skip(self, filter))]
    pub async fn movement_history(
        &self,
        page: u64,
        limit: u64,
        filter: MovementHistoryFilter,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        validate_paging(page, limit)?;

        let db = self.db_pool.as_ref();
        let mut query = StockMovementEntity::find().order_by_desc(stock_movement::Column::Id);
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(location) = filter.location {
            query = query.filter(stock_movement::Column::Location.eq(location));
        }
        if let Some(movement_type) = filter.movement_type {
            query = query.filter(stock_movement::Column::MovementType.eq(movement_type.as_str()));
        }
        if let Some(reference_number) = filter.reference_number {
            query = query.filter(stock_movement::Column::ReferenceNumber.eq(reference_number));
        }
        if let Some(from) = filter.from {
            query = query.filter(stock_movement::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(stock_movement::Column::CreatedAt.lte(to));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let movements = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((movements, total))
    }
}
