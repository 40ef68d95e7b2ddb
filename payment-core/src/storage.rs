//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `payments` - Payment records (key: payment_id)
//! - `transactions` - Append-only ledger entries (key: entry_id)
//! - `disputes` - Dispute records (key: dispute_id)
//! - `indices` - Secondary indices for lookups and scans
//!
//! Payments and disputes carry an optimistic-concurrency version; a commit
//! with a stale version fails with [`Error::VersionConflict`]. Ledger entries
//! are never versioned because they are never updated.

use crate::{
    error::{Error, Result},
    types::{Dispute, DisputeStatus, Payment, PaymentStatus, Transaction},
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_PAYMENTS: &str = "payments";
const CF_TRANSACTIONS: &str = "transactions";
const CF_DISPUTES: &str = "disputes";
const CF_INDICES: &str = "indices";

// Index key tags (first byte of every index key)
const IDX_PAYMENT_STATUS: u8 = 0x01;
const IDX_PAYMENT_ENTRY: u8 = 0x02;
const IDX_DISPUTE_STATUS: u8 = 0x03;
const IDX_IDEMPOTENCY: u8 = 0x04;
const IDX_ORDER_REF: u8 = 0x05;
const IDX_DISPUTE_PAYMENT: u8 = 0x06;

/// Storage wrapper for RocksDB
pub struct PaymentStore {
    db: Arc<DB>,
    // Serializes the version check with the write that follows it. Cross-
    // process exclusion comes from the distributed payment locks; the version
    // check catches anything that slips past them.
    commit_guard: Mutex<()>,
}

impl PaymentStore {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy ledger workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_PAYMENTS, Self::cf_options_payments()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_DISPUTES, Self::cf_options_disputes()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened payment store");

        Ok(Self {
            db: Arc::new(db),
            commit_guard: Mutex::new(()),
        })
    }

    // Column family options

    fn cf_options_payments() -> Options {
        let mut opts = Options::default();
        // Hot read path, favor speed over ratio
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_disputes() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups on idempotency keys and order refs benefit from blooms
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Payment operations

    /// Get payment by ID
    pub fn get_payment(&self, payment_id: Uuid) -> Result<Payment> {
        self.read_payment_opt(payment_id)?
            .ok_or(Error::PaymentNotFound(payment_id))
    }

    fn read_payment_opt(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        match self.db.get_cf(cf, payment_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Commit a payment and its new ledger entries atomically.
    ///
    /// The payment's `version` must match the stored one (0 for a new
    /// record); on success it is bumped in place. Secondary indices move in
    /// the same write batch, so a scan never sees a stale status.
    pub fn commit_payment(&self, payment: &mut Payment, entries: &[Transaction]) -> Result<()> {
        let _guard = self.commit_guard.lock();

        let stored = self.read_payment_opt(payment.id)?;
        self.check_payment_version(payment, &stored)?;

        let mut batch = WriteBatch::default();
        self.stage_payment(&mut batch, payment, stored.as_ref())?;
        self.stage_entries(&mut batch, payment, entries)?;

        payment.version += 1;
        self.write_payment_record(&mut batch, payment)?;

        self.db.write(batch)?;

        tracing::debug!(
            payment_id = %payment.id,
            status = %payment.status,
            version = payment.version,
            entries = entries.len(),
            "Payment committed"
        );

        Ok(())
    }

    /// Commit a payment together with its dispute, atomically.
    ///
    /// Used when a dispute transition and a payment transition must land
    /// together (open, resolve). Both version checks apply.
    pub fn commit_payment_with_dispute(
        &self,
        payment: &mut Payment,
        dispute: &mut Dispute,
        entries: &[Transaction],
    ) -> Result<()> {
        let _guard = self.commit_guard.lock();

        let stored_payment = self.read_payment_opt(payment.id)?;
        self.check_payment_version(payment, &stored_payment)?;

        let stored_dispute = self.read_dispute_opt(dispute.id)?;
        self.check_dispute_version(dispute, &stored_dispute)?;

        if stored_dispute.is_none() {
            // One dispute per payment, ever
            if let Some(existing) = self.dispute_for_payment(payment.id)? {
                if existing != dispute.id {
                    return Err(Error::DuplicateDispute(payment.id));
                }
            }
        }

        let mut batch = WriteBatch::default();
        self.stage_payment(&mut batch, payment, stored_payment.as_ref())?;
        self.stage_entries(&mut batch, payment, entries)?;
        self.stage_dispute(&mut batch, dispute, stored_dispute.as_ref())?;

        payment.version += 1;
        self.write_payment_record(&mut batch, payment)?;

        dispute.version += 1;
        self.write_dispute_record(&mut batch, dispute)?;

        self.db.write(batch)?;

        tracing::debug!(
            payment_id = %payment.id,
            dispute_id = %dispute.id,
            payment_status = %payment.status,
            dispute_status = %dispute.status,
            "Payment and dispute committed"
        );

        Ok(())
    }

    fn check_payment_version(&self, payment: &Payment, stored: &Option<Payment>) -> Result<()> {
        match stored {
            Some(s) if s.version != payment.version => Err(Error::VersionConflict {
                expected: payment.version,
                found: s.version,
            }),
            None if payment.version != 0 => Err(Error::VersionConflict {
                expected: payment.version,
                found: 0,
            }),
            _ => Ok(()),
        }
    }

    // Stages index maintenance for a payment commit. The record itself is
    // written after the caller bumps the version.
    fn stage_payment(
        &self,
        batch: &mut WriteBatch,
        payment: &Payment,
        stored: Option<&Payment>,
    ) -> Result<()> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        if stored.is_none() {
            if let Some(existing) = self.payment_by_idempotency_key(&payment.idempotency_key)? {
                if existing != payment.id {
                    return Err(Error::DuplicateIdempotencyKey(
                        payment.idempotency_key.clone(),
                    ));
                }
            }
            batch.put_cf(
                cf_indices,
                idempotency_key(&payment.idempotency_key),
                payment.id.as_bytes(),
            );
        }

        // Status index moves with the payment
        if let Some(s) = stored {
            if s.status != payment.status {
                batch.delete_cf(cf_indices, payment_status_key(s.status, payment.id));
            }
        }
        batch.put_cf(
            cf_indices,
            payment_status_key(payment.status, payment.id),
            [],
        );

        // Order ref index is written when the ref first appears
        let had_order_ref = stored.map(|s| s.gateway_order_ref.is_some()).unwrap_or(false);
        if !had_order_ref {
            if let Some(order_ref) = &payment.gateway_order_ref {
                batch.put_cf(cf_indices, order_ref_key(order_ref), payment.id.as_bytes());
            }
        }

        Ok(())
    }

    fn write_payment_record(&self, batch: &mut WriteBatch, payment: &Payment) -> Result<()> {
        let cf = self.cf_handle(CF_PAYMENTS)?;
        let value = bincode::serialize(payment)?;
        batch.put_cf(cf, payment.id.as_bytes(), &value);
        Ok(())
    }

    fn stage_entries(
        &self,
        batch: &mut WriteBatch,
        payment: &Payment,
        entries: &[Transaction],
    ) -> Result<()> {
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        for entry in entries {
            if entry.payment_id != payment.id {
                return Err(Error::InvariantViolation(format!(
                    "entry {} belongs to payment {}, not {}",
                    entry.id, entry.payment_id, payment.id
                )));
            }
            if entry.amount.is_sign_negative() {
                return Err(Error::InvariantViolation(format!(
                    "entry {} has negative amount {}",
                    entry.id, entry.amount
                )));
            }

            let value = bincode::serialize(entry)?;
            batch.put_cf(cf_transactions, entry.id.as_bytes(), &value);
            batch.put_cf(
                cf_indices,
                payment_entry_key(payment.id, entry.id),
                [],
            );
        }

        Ok(())
    }

    // Dispute operations

    /// Get dispute by ID
    pub fn get_dispute(&self, dispute_id: Uuid) -> Result<Dispute> {
        self.read_dispute_opt(dispute_id)?
            .ok_or(Error::DisputeNotFound(dispute_id))
    }

    fn read_dispute_opt(&self, dispute_id: Uuid) -> Result<Option<Dispute>> {
        let cf = self.cf_handle(CF_DISPUTES)?;
        match self.db.get_cf(cf, dispute_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Commit a dispute on its own (evidence, review marker).
    ///
    /// Payment-affecting dispute changes go through
    /// [`PaymentStore::commit_payment_with_dispute`] instead.
    pub fn commit_dispute(&self, dispute: &mut Dispute) -> Result<()> {
        let _guard = self.commit_guard.lock();

        let stored = self.read_dispute_opt(dispute.id)?;
        self.check_dispute_version(dispute, &stored)?;

        if stored.is_none() {
            if let Some(existing) = self.dispute_for_payment(dispute.payment_id)? {
                if existing != dispute.id {
                    return Err(Error::DuplicateDispute(dispute.payment_id));
                }
            }
        }

        let mut batch = WriteBatch::default();
        self.stage_dispute(&mut batch, dispute, stored.as_ref())?;

        dispute.version += 1;
        self.write_dispute_record(&mut batch, dispute)?;

        self.db.write(batch)?;
        Ok(())
    }

    fn check_dispute_version(&self, dispute: &Dispute, stored: &Option<Dispute>) -> Result<()> {
        match stored {
            Some(s) if s.version != dispute.version => Err(Error::VersionConflict {
                expected: dispute.version,
                found: s.version,
            }),
            None if dispute.version != 0 => Err(Error::VersionConflict {
                expected: dispute.version,
                found: 0,
            }),
            _ => Ok(()),
        }
    }

    fn stage_dispute(
        &self,
        batch: &mut WriteBatch,
        dispute: &Dispute,
        stored: Option<&Dispute>,
    ) -> Result<()> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        if stored.is_none() {
            batch.put_cf(
                cf_indices,
                dispute_payment_key(dispute.payment_id),
                dispute.id.as_bytes(),
            );
        }

        if let Some(s) = stored {
            if s.status != dispute.status {
                batch.delete_cf(cf_indices, dispute_status_key(s.status, dispute.id));
            }
        }
        batch.put_cf(
            cf_indices,
            dispute_status_key(dispute.status, dispute.id),
            [],
        );

        Ok(())
    }

    fn write_dispute_record(&self, batch: &mut WriteBatch, dispute: &Dispute) -> Result<()> {
        let cf = self.cf_handle(CF_DISPUTES)?;
        let value = bincode::serialize(dispute)?;
        batch.put_cf(cf, dispute.id.as_bytes(), &value);
        Ok(())
    }

    // Lookups

    /// Payment holding the given idempotency key, if any
    pub fn payment_by_idempotency_key(&self, key: &str) -> Result<Option<Uuid>> {
        self.read_index_value(&idempotency_key(key))
    }

    /// Payment holding the given gateway order reference, if any
    pub fn payment_by_order_ref(&self, order_ref: &str) -> Result<Option<Uuid>> {
        self.read_index_value(&order_ref_key(order_ref))
    }

    /// Dispute attached to the given payment, if any
    pub fn dispute_for_payment(&self, payment_id: Uuid) -> Result<Option<Uuid>> {
        self.read_index_value(&dispute_payment_key(payment_id))
    }

    fn read_index_value(&self, key: &[u8]) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, key)? {
            Some(value) => {
                let bytes: [u8; 16] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("malformed index value".to_string()))?;
                Ok(Some(Uuid::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    // Scans

    /// IDs of all payments currently in `status`
    pub fn payments_with_status(&self, status: PaymentStatus) -> Result<Vec<Uuid>> {
        let prefix = [IDX_PAYMENT_STATUS, status as u8];
        let keys = self.scan_index_prefix(&prefix)?;

        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            if key.len() == 2 + 16 {
                let bytes: [u8; 16] = key[2..18].try_into().expect("length checked");
                ids.push(Uuid::from_bytes(bytes));
            }
        }
        Ok(ids)
    }

    /// IDs of all disputes currently in `status`
    pub fn disputes_with_status(&self, status: DisputeStatus) -> Result<Vec<Uuid>> {
        let prefix = [IDX_DISPUTE_STATUS, status as u8];
        let keys = self.scan_index_prefix(&prefix)?;

        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            if key.len() == 2 + 16 {
                let bytes: [u8; 16] = key[2..18].try_into().expect("length checked");
                ids.push(Uuid::from_bytes(bytes));
            }
        }
        Ok(ids)
    }

    /// Ledger entries of a payment, oldest first.
    ///
    /// Entry IDs are UUIDv7, so byte order in the index is creation order.
    pub fn entries_for_payment(&self, payment_id: Uuid) -> Result<Vec<Transaction>> {
        let mut prefix = vec![IDX_PAYMENT_ENTRY];
        prefix.extend_from_slice(payment_id.as_bytes());

        let keys = self.scan_index_prefix(&prefix)?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if key.len() == 1 + 16 + 16 {
                let bytes: [u8; 16] = key[17..33].try_into().expect("length checked");
                entries.push(self.get_transaction(Uuid::from_bytes(bytes))?);
            }
        }
        Ok(entries)
    }

    /// Get a single ledger entry by ID
    pub fn get_transaction(&self, entry_id: Uuid) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::Storage(format!("Ledger entry {} not found", entry_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    fn scan_index_prefix(&self, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut keys = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    // Statistics

    /// Approximate record counts
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_payments: self.approximate_count(CF_PAYMENTS)?,
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
            total_disputes: self.approximate_count(CF_DISPUTES)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Payment store closed");
        Ok(())
    }
}

// Index key builders

fn payment_status_key(status: PaymentStatus, payment_id: Uuid) -> Vec<u8> {
    let mut key = vec![IDX_PAYMENT_STATUS, status as u8];
    key.extend_from_slice(payment_id.as_bytes());
    key
}

fn payment_entry_key(payment_id: Uuid, entry_id: Uuid) -> Vec<u8> {
    let mut key = vec![IDX_PAYMENT_ENTRY];
    key.extend_from_slice(payment_id.as_bytes());
    key.extend_from_slice(entry_id.as_bytes());
    key
}

fn dispute_status_key(status: DisputeStatus, dispute_id: Uuid) -> Vec<u8> {
    let mut key = vec![IDX_DISPUTE_STATUS, status as u8];
    key.extend_from_slice(dispute_id.as_bytes());
    key
}

fn idempotency_key(key: &str) -> Vec<u8> {
    let mut k = vec![IDX_IDEMPOTENCY];
    k.extend_from_slice(key.as_bytes());
    k
}

fn order_ref_key(order_ref: &str) -> Vec<u8> {
    let mut k = vec![IDX_ORDER_REF];
    k.extend_from_slice(order_ref.as_bytes());
    k
}

fn dispute_payment_key(payment_id: Uuid) -> Vec<u8> {
    let mut k = vec![IDX_DISPUTE_PAYMENT];
    k.extend_from_slice(payment_id.as_bytes());
    k
}

/// Approximate record counts
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Payments stored
    pub total_payments: u64,
    /// Ledger entries stored
    pub total_transactions: u64,
    /// Disputes stored
    pub total_disputes: u64,
}
