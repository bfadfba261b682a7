//! PostgreSQL ledger store.
//!
//! Each read-write unit is one `SERIALIZABLE` transaction with a local
//! `lock_timeout`; every `lock_*` call is a `SELECT ... FOR UPDATE`. Snapshots
//! are `REPEATABLE READ, READ ONLY` transactions and take no row locks.
//!
//! Lock timeouts (`55P03`), serialization failures (`40001`) and detected
//! deadlocks (`40P01`) surface as `ConcurrencyConflict` so the engines can
//! retry them; every other database error is a `Storage` error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    AccessMode, ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ActiveValue::Unchanged,
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IsolationLevel, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, TransactionTrait,
};
use stockledger_core::ledger::{
    Batch, Carrier, CarrierKind, CarrierStatus, LedgerError, LedgerTransaction, Lot, PaymentMethod,
    ReasonCode, Subject, UnitCosts,
};
use stockledger_core::store::{CarrierFilter, LedgerSnapshot, LedgerStore, LedgerTx};
use stockledger_shared::config::LedgerConfig;
use stockledger_shared::types::{
    ActorId, BatchId, CarrierId, LedgerTransactionId, LotId, Money, OwnerId, ProductVariantId,
    SupplierId,
};

use crate::entities::{batches, carriers, ledger_transactions, lots};

/// SQLSTATE codes that mean "try again".
const RETRYABLE_SQLSTATES: [&str; 3] = [
    "55P03", // lock_not_available
    "40001", // serialization_failure
    "40P01", // deadlock_detected
];

/// Ledger store backed by a `SeaORM` connection pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
    lock_timeout_ms: u64,
}

impl PgLedgerStore {
    /// Creates a store on an existing pool.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: &LedgerConfig) -> Self {
        Self {
            db,
            lock_timeout_ms: config.lock_timeout_ms,
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;
    type Snapshot = PgSnapshot;

    async fn begin(&self) -> Result<Self::Tx, LedgerError> {
        let txn = self
            .db
            .begin_with_config(
                Some(IsolationLevel::Serializable),
                Some(AccessMode::ReadWrite),
            )
            .await
            .map_err(map_db_err)?;

        // SET LOCAL is scoped to this transaction only
        let sql = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms);
        txn.execute_unprepared(&sql).await.map_err(map_db_err)?;

        Ok(PgLedgerTx { txn })
    }

    async fn snapshot(&self) -> Result<Self::Snapshot, LedgerError> {
        let txn = self
            .db
            .begin_with_config(
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            )
            .await
            .map_err(map_db_err)?;

        Ok(PgSnapshot { txn })
    }
}

/// One serializable read-write transaction.
pub struct PgLedgerTx {
    txn: DatabaseTransaction,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn get_or_create_batch(&mut self, name: &str) -> Result<Batch, LedgerError> {
        let candidate = batches::ActiveModel {
            id: Set(BatchId::new().into_inner()),
            name: Set(name.to_string()),
            created_at: Set(chrono::Utc::now()),
        };
        batches::Entity::insert(candidate)
            .on_conflict(
                OnConflict::column(batches::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await
            .map_err(map_db_err)?;

        // The batch row lock serializes intakes into the same batch.
        let model = batches::Entity::find()
            .filter(batches::Column::Name.eq(name))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| LedgerError::Storage(format!("batch {name} vanished after insert")))?;

        Ok(Batch {
            id: BatchId::from_uuid(model.id),
            name: model.name,
            created_at: model.created_at,
        })
    }

    async fn lock_lot(&mut self, id: LotId) -> Result<Option<Lot>, LedgerError> {
        let model = lots::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(model.map(lot_from_model))
    }

    async fn lock_lot_by_key(
        &mut self,
        product_variant_id: ProductVariantId,
        batch_id: BatchId,
    ) -> Result<Option<Lot>, LedgerError> {
        let model = lots::Entity::find()
            .filter(lots::Column::ProductVariantId.eq(product_variant_id.into_inner()))
            .filter(lots::Column::BatchId.eq(batch_id.into_inner()))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(model.map(lot_from_model))
    }

    async fn insert_lot(&mut self, lot: &Lot) -> Result<(), LedgerError> {
        lots::ActiveModel {
            id: Set(lot.id.into_inner()),
            product_variant_id: Set(lot.product_variant_id.into_inner()),
            batch_id: Set(lot.batch_id.into_inner()),
            quantity_on_hand: Set(lot.quantity_on_hand),
            cost_price: Set(lot.costs.cost_price.amount()),
            mrp: Set(lot.costs.mrp.amount()),
            selling_price: Set(lot.costs.selling_price.amount()),
            wholesale_price: Set(lot.costs.wholesale_price.amount()),
            manufactured_on: Set(lot.manufactured_on),
            expires_on: Set(lot.expires_on),
            supplier_id: Set(lot.supplier_id.map(SupplierId::into_inner)),
            grn_id: Set(lot.grn_id.map(CarrierId::into_inner)),
            created_at: Set(lot.created_at),
            updated_at: Set(lot.updated_at),
        }
        .insert(&self.txn)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn update_lot(&mut self, lot: &Lot) -> Result<(), LedgerError> {
        lots::ActiveModel {
            id: Unchanged(lot.id.into_inner()),
            product_variant_id: NotSet,
            batch_id: NotSet,
            quantity_on_hand: Set(lot.quantity_on_hand),
            cost_price: Set(lot.costs.cost_price.amount()),
            mrp: Set(lot.costs.mrp.amount()),
            selling_price: Set(lot.costs.selling_price.amount()),
            wholesale_price: Set(lot.costs.wholesale_price.amount()),
            manufactured_on: Set(lot.manufactured_on),
            expires_on: Set(lot.expires_on),
            supplier_id: Set(lot.supplier_id.map(SupplierId::into_inner)),
            grn_id: Set(lot.grn_id.map(CarrierId::into_inner)),
            created_at: NotSet,
            updated_at: Set(lot.updated_at),
        }
        .update(&self.txn)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn insert_carrier(&mut self, carrier: &Carrier) -> Result<(), LedgerError> {
        carriers::ActiveModel {
            id: Set(carrier.id.into_inner()),
            seq: NotSet,
            kind: Set(carrier.kind.as_str().to_string()),
            owner_id: Set(carrier.owner_id.into_inner()),
            reference: Set(carrier.reference.clone()),
            opening: Set(carrier.opening.amount()),
            accrued: Set(carrier.accrued.amount()),
            settled: Set(carrier.settled.amount()),
            status: Set(carrier.status.as_str().to_string()),
            created_at: Set(carrier.created_at),
            updated_at: Set(carrier.updated_at),
        }
        .insert(&self.txn)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn lock_carrier(&mut self, id: CarrierId) -> Result<Option<Carrier>, LedgerError> {
        carriers::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(map_db_err)?
            .map(carrier_from_model)
            .transpose()
    }

    async fn lock_open_carriers(
        &mut self,
        owner_id: OwnerId,
        kind: CarrierKind,
    ) -> Result<Vec<Carrier>, LedgerError> {
        carriers::Entity::find()
            .filter(carriers::Column::OwnerId.eq(owner_id.into_inner()))
            .filter(carriers::Column::Kind.eq(kind.as_str()))
            .filter(carriers::Column::Status.eq(CarrierStatus::Open.as_str()))
            .order_by_asc(carriers::Column::CreatedAt)
            .order_by_asc(carriers::Column::Seq)
            .lock_exclusive()
            .all(&self.txn)
            .await
            .map_err(map_db_err)?
            .into_iter()
            .map(carrier_from_model)
            .collect()
    }

    async fn has_carriers(
        &mut self,
        owner_id: OwnerId,
        kind: CarrierKind,
    ) -> Result<bool, LedgerError> {
        let found = carriers::Entity::find()
            .filter(carriers::Column::OwnerId.eq(owner_id.into_inner()))
            .filter(carriers::Column::Kind.eq(kind.as_str()))
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(found.is_some())
    }

    async fn update_carrier(&mut self, carrier: &Carrier) -> Result<(), LedgerError> {
        carriers::ActiveModel {
            id: Unchanged(carrier.id.into_inner()),
            seq: NotSet,
            kind: NotSet,
            owner_id: NotSet,
            reference: NotSet,
            opening: NotSet,
            accrued: Set(carrier.accrued.amount()),
            settled: Set(carrier.settled.amount()),
            status: Set(carrier.status.as_str().to_string()),
            created_at: NotSet,
            updated_at: Set(carrier.updated_at),
        }
        .update(&self.txn)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn append_transaction(&mut self, txn: &LedgerTransaction) -> Result<(), LedgerError> {
        let model = ledger_transactions::ActiveModel {
            id: Set(txn.id.into_inner()),
            seq: NotSet,
            subject_kind: Set(txn.subject.kind_str().to_string()),
            subject_id: Set(txn.subject.uuid()),
            delta: Set(txn.delta),
            reason: Set(txn.reason.as_str().to_string()),
            method: Set(txn.method.map(|m| m.as_str().to_string())),
            actor_id: Set(txn.actor.into_inner()),
            recorded_at: Set(txn.recorded_at),
        };
        ledger_transactions::Entity::insert(model)
            .exec_without_returning(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.txn.commit().await.map_err(map_db_err)
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.txn.rollback().await.map_err(map_db_err)
    }
}

/// One read-only snapshot transaction.
pub struct PgSnapshot {
    txn: DatabaseTransaction,
}

#[async_trait]
impl LedgerSnapshot for PgSnapshot {
    async fn lots(&self) -> Result<Vec<Lot>, LedgerError> {
        let models = lots::Entity::find()
            .order_by_asc(lots::Column::CreatedAt)
            .order_by_asc(lots::Column::Id)
            .all(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(lot_from_model).collect())
    }

    async fn lots_below(&self, threshold: Decimal) -> Result<Vec<Lot>, LedgerError> {
        let models = lots::Entity::find()
            .filter(lots::Column::QuantityOnHand.lt(threshold))
            .order_by_asc(lots::Column::QuantityOnHand)
            .order_by_asc(lots::Column::Id)
            .all(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(lot_from_model).collect())
    }

    async fn lot(&self, id: LotId) -> Result<Option<Lot>, LedgerError> {
        let model = lots::Entity::find_by_id(id.into_inner())
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(model.map(lot_from_model))
    }

    async fn carrier(&self, id: CarrierId) -> Result<Option<Carrier>, LedgerError> {
        carriers::Entity::find_by_id(id.into_inner())
            .one(&self.txn)
            .await
            .map_err(map_db_err)?
            .map(carrier_from_model)
            .transpose()
    }

    async fn carriers(&self, filter: CarrierFilter) -> Result<Vec<Carrier>, LedgerError> {
        let mut query = carriers::Entity::find();
        if let Some(owner_id) = filter.owner_id {
            query = query.filter(carriers::Column::OwnerId.eq(owner_id.into_inner()));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(carriers::Column::Kind.eq(kind.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(carriers::Column::Status.eq(status.as_str()));
        }

        query
            .order_by_asc(carriers::Column::CreatedAt)
            .order_by_asc(carriers::Column::Seq)
            .all(&self.txn)
            .await
            .map_err(map_db_err)?
            .into_iter()
            .map(carrier_from_model)
            .collect()
    }

    async fn transactions(&self, subject: Subject) -> Result<Vec<LedgerTransaction>, LedgerError> {
        ledger_transactions::Entity::find()
            .filter(ledger_transactions::Column::SubjectKind.eq(subject.kind_str()))
            .filter(ledger_transactions::Column::SubjectId.eq(subject.uuid()))
            .order_by_asc(ledger_transactions::Column::Seq)
            .all(&self.txn)
            .await
            .map_err(map_db_err)?
            .into_iter()
            .map(transaction_from_model)
            .collect()
    }

    async fn finish(self) -> Result<(), LedgerError> {
        self.txn.commit().await.map_err(map_db_err)
    }
}

/// Maps a database error onto the ledger error taxonomy.
#[must_use]
pub fn map_db_err(err: DbErr) -> LedgerError {
    match sqlstate(&err) {
        Some(code) if RETRYABLE_SQLSTATES.contains(&code.as_str()) => {
            LedgerError::ConcurrencyConflict(err.to_string())
        }
        _ => LedgerError::Storage(err.to_string()),
    }
}

fn sqlstate(err: &DbErr) -> Option<String> {
    let (DbErr::Exec(RuntimeErr::SqlxError(source))
    | DbErr::Query(RuntimeErr::SqlxError(source))
    | DbErr::Conn(RuntimeErr::SqlxError(source))) = err
    else {
        return None;
    };

    match source {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

fn corrupt(column: &str, detail: String) -> LedgerError {
    LedgerError::Storage(format!("corrupt {column} column: {detail}"))
}

fn lot_from_model(model: lots::Model) -> Lot {
    Lot {
        id: LotId::from_uuid(model.id),
        product_variant_id: ProductVariantId::from_uuid(model.product_variant_id),
        batch_id: BatchId::from_uuid(model.batch_id),
        quantity_on_hand: model.quantity_on_hand,
        costs: UnitCosts {
            cost_price: Money::new(model.cost_price),
            mrp: Money::new(model.mrp),
            selling_price: Money::new(model.selling_price),
            wholesale_price: Money::new(model.wholesale_price),
        },
        manufactured_on: model.manufactured_on,
        expires_on: model.expires_on,
        supplier_id: model.supplier_id.map(SupplierId::from_uuid),
        grn_id: model.grn_id.map(CarrierId::from_uuid),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn carrier_from_model(model: carriers::Model) -> Result<Carrier, LedgerError> {
    let kind: CarrierKind = model.kind.parse().map_err(|e| corrupt("carriers.kind", e))?;
    let status: CarrierStatus = model
        .status
        .parse()
        .map_err(|e| corrupt("carriers.status", e))?;

    Ok(Carrier {
        id: CarrierId::from_uuid(model.id),
        kind,
        owner_id: OwnerId::from_uuid(model.owner_id),
        reference: model.reference,
        opening: Money::new(model.opening),
        accrued: Money::new(model.accrued),
        settled: Money::new(model.settled),
        status,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn transaction_from_model(
    model: ledger_transactions::Model,
) -> Result<LedgerTransaction, LedgerError> {
    let subject = Subject::from_parts(&model.subject_kind, model.subject_id)
        .map_err(|e| corrupt("ledger_transactions.subject_kind", e))?;
    let reason: ReasonCode = model
        .reason
        .parse()
        .map_err(|e| corrupt("ledger_transactions.reason", e))?;
    let method = model
        .method
        .as_deref()
        .map(str::parse::<PaymentMethod>)
        .transpose()
        .map_err(|e| corrupt("ledger_transactions.method", e))?;

    Ok(LedgerTransaction {
        id: LedgerTransactionId::from_uuid(model.id),
        subject,
        delta: model.delta,
        reason,
        method,
        actor: ActorId::from_uuid(model.actor_id),
        recorded_at: model.recorded_at,
    })
}
