//! Generic persistence over soft-deletable entities
//!
//! Every store in [`Repository`](super::Repository) is composed from these
//! functions. Reads never return rows whose `is_deleted` flag is set.

use crate::errors::Result;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect,
};

/// An entity with an integer id and an `is_deleted` flag.
pub trait LiveEntity: EntityTrait {
    fn id_column() -> Self::Column;

    fn deleted_column() -> Self::Column;

    /// Matches rows that have not been soft-deleted
    fn live() -> Condition {
        Condition::all().add(Self::deleted_column().eq(false))
    }
}

/// First live row matching `filter`
pub async fn find_live<E, C>(db: &C, filter: Condition) -> Result<Option<E::Model>>
where
    E: LiveEntity,
    C: ConnectionTrait,
{
    E::find()
        .filter(E::live())
        .filter(filter)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Live row with the given id
pub async fn find_live_by_id<E, C>(db: &C, id: i32) -> Result<Option<E::Model>>
where
    E: LiveEntity,
    C: ConnectionTrait,
{
    find_live::<E, C>(db, Condition::all().add(E::id_column().eq(id))).await
}

/// Page of live rows in insertion order
pub async fn list_live<E, C>(db: &C, skip: u64, limit: u64) -> Result<Vec<E::Model>>
where
    E: LiveEntity,
    C: ConnectionTrait,
{
    E::find()
        .filter(E::live())
        .order_by_asc(E::id_column())
        .offset(skip)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All live rows matching `filter`, in insertion order
pub async fn list_live_where<E, C>(db: &C, filter: Condition) -> Result<Vec<E::Model>>
where
    E: LiveEntity,
    C: ConnectionTrait,
{
    E::find()
        .filter(E::live())
        .filter(filter)
        .order_by_asc(E::id_column())
        .all(db)
        .await
        .map_err(Into::into)
}

/// Insert a single row and return it as stored
pub async fn create<A, C>(db: &C, model: A) -> Result<<A::Entity as EntityTrait>::Model>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    C: ConnectionTrait,
{
    model.insert(db).await.map_err(Into::into)
}

/// Write the changed fields of a single row
pub async fn update<A, C>(db: &C, model: A) -> Result<<A::Entity as EntityTrait>::Model>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    C: ConnectionTrait,
{
    model.update(db).await.map_err(Into::into)
}

/// Flag a row as deleted. The row stays in the table.
pub async fn soft_delete<A, C>(db: &C, mut model: A) -> Result<<A::Entity as EntityTrait>::Model>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    A::Entity: LiveEntity,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    C: ConnectionTrait,
{
    model.set(<A::Entity as LiveEntity>::deleted_column(), true.into());
    update(db, model).await
}
