//! Ledger schema migration.
//!
//! Creates batches, lots, carriers and the append-only transaction log.
//! The table CHECK constraints restate the ledger invariants so a row that
//! slips past the engine is still refused by the database.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(BATCHES_SQL).await?;
        db.execute_unprepared(CARRIERS_SQL).await?;
        db.execute_unprepared(LOTS_SQL).await?;
        db.execute_unprepared(LEDGER_TRANSACTIONS_SQL).await?;

        // Append-only log
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const BATCHES_SQL: &str = r"
CREATE TABLE batches (
    id          UUID PRIMARY KEY,
    name        VARCHAR(100) NOT NULL UNIQUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const CARRIERS_SQL: &str = r"
CREATE TABLE carriers (
    id          UUID PRIMARY KEY,
    seq         BIGSERIAL NOT NULL,
    kind        VARCHAR(32) NOT NULL
                CHECK (kind IN ('grn', 'customer_credit', 'cash_session')),
    owner_id    UUID NOT NULL,
    reference   VARCHAR(100) NOT NULL,
    opening     NUMERIC NOT NULL CHECK (opening >= 0),
    accrued     NUMERIC NOT NULL DEFAULT 0 CHECK (accrued >= 0),
    settled     NUMERIC NOT NULL DEFAULT 0,
    status      VARCHAR(16) NOT NULL
                CHECK (status IN ('open', 'settled', 'closed')),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_carriers_settled_bounds
        CHECK (settled >= 0 AND settled <= opening + accrued)
);

CREATE INDEX idx_carriers_owner ON carriers(owner_id, kind, created_at, seq);
CREATE INDEX idx_carriers_unsettled ON carriers(owner_id, kind, created_at, seq)
    WHERE status = 'open';
";

const LOTS_SQL: &str = r"
CREATE TABLE lots (
    id                  UUID PRIMARY KEY,
    product_variant_id  UUID NOT NULL,
    batch_id            UUID NOT NULL REFERENCES batches(id),
    quantity_on_hand    NUMERIC NOT NULL CHECK (quantity_on_hand >= 0),
    cost_price          NUMERIC NOT NULL CHECK (cost_price >= 0),
    mrp                 NUMERIC NOT NULL CHECK (mrp >= 0),
    selling_price       NUMERIC NOT NULL CHECK (selling_price >= 0),
    wholesale_price     NUMERIC NOT NULL CHECK (wholesale_price >= 0),
    manufactured_on     DATE,
    expires_on          DATE,
    supplier_id         UUID,
    grn_id              UUID REFERENCES carriers(id),
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_lots_variant_batch UNIQUE (product_variant_id, batch_id)
);

CREATE INDEX idx_lots_quantity ON lots(quantity_on_hand);
";

const LEDGER_TRANSACTIONS_SQL: &str = r"
CREATE TABLE ledger_transactions (
    id            UUID PRIMARY KEY,
    seq           BIGSERIAL NOT NULL,
    subject_kind  VARCHAR(16) NOT NULL CHECK (subject_kind IN ('lot', 'carrier')),
    subject_id    UUID NOT NULL,
    delta         NUMERIC NOT NULL,
    reason        VARCHAR(32) NOT NULL,
    method        VARCHAR(16),
    actor_id      UUID NOT NULL,
    recorded_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_ledger_transactions_subject
    ON ledger_transactions(subject_kind, subject_id, seq);
";

const TRIGGERS_SQL: &str = r"
CREATE OR REPLACE FUNCTION reject_ledger_transaction_change()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'ledger_transactions is append-only';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_ledger_transactions_append_only
    BEFORE UPDATE OR DELETE ON ledger_transactions
    FOR EACH ROW EXECUTE FUNCTION reject_ledger_transaction_change();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_ledger_transactions_append_only ON ledger_transactions;
DROP FUNCTION IF EXISTS reject_ledger_transaction_change();
DROP TABLE IF EXISTS ledger_transactions;
DROP TABLE IF EXISTS lots;
DROP TABLE IF EXISTS carriers;
DROP TABLE IF EXISTS batches;
";
