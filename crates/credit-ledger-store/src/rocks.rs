//! `RocksDB` storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use credit_ledger_core::{Transaction, TransactionId, UserId, Wallet};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{WalletDelta, WalletStore};

/// RocksDB-backed storage implementation.
///
/// Wallet writes go through an internal lock so the version check and the
/// subsequent write form one atomic check-and-set. Transaction appends do
/// not take the lock; they are plain inserts with no read dependency.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    // Serializes wallet read-check-write cycles across threads.
    wallet_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            wallet_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        let cf = self.cf(cf::WALLETS)?;
        self.db
            .get_cf(&cf, keys::wallet_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Stage a transaction and its index entries into a write batch.
    fn stage_transaction(&self, batch: &mut WriteBatch, transaction: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let value = Self::serialize(transaction)?;
        batch.put_cf(&cf_tx, keys::transaction_key(&transaction.id), &value);
        batch.put_cf(
            &cf_by_user,
            keys::user_transaction_key(&transaction.user_id, &transaction.id),
            [],
        );

        if let Some(reference_id) = &transaction.reference_id {
            let cf_by_ref = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;
            batch.put_cf(
                &cf_by_ref,
                keys::reference_key(&transaction.user_id, reference_id, &transaction.id),
                [],
            );
        }

        Ok(())
    }

    /// Collect the index keys under a prefix in a column family.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        let mut matched = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            matched.push(key.to_vec());
        }
        Ok(matched)
    }

    fn lock_wallets(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.wallet_lock
            .lock()
            .map_err(|_| StoreError::Database("wallet lock poisoned".to_string()))
    }

    /// Load the transactions carrying exactly `reference_id`.
    ///
    /// The prefix scan over-approximates when a reference contains a 0x00
    /// byte, so each hit is re-checked against the stored reference.
    fn transactions_with_reference(
        &self,
        user_id: &UserId,
        reference_id: &str,
    ) -> Result<Vec<Transaction>> {
        let prefix = keys::reference_prefix(user_id, reference_id);
        let matched = self.scan_prefix(cf::TRANSACTIONS_BY_REFERENCE, &prefix)?;

        let mut transactions = Vec::with_capacity(matched.len());
        for key in matched {
            let tx_id = keys::extract_transaction_id(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                if tx.reference_id.as_deref() == Some(reference_id) {
                    transactions.push(tx);
                }
            }
        }

        Ok(transactions)
    }

    /// Version-checked wallet update. Caller must hold the wallet lock.
    fn apply_delta_locked(
        &self,
        user_id: &UserId,
        expected_version: u64,
        delta: &WalletDelta,
        transaction: Option<&Transaction>,
    ) -> Result<Wallet> {
        let mut wallet = self.read_wallet(user_id)?.ok_or(StoreError::NotFound {
            entity: "wallet",
            id: user_id.to_string(),
        })?;

        if wallet.version != expected_version {
            return Err(StoreError::VersionConflict {
                user_id: user_id.to_string(),
                expected: expected_version,
                actual: wallet.version,
            });
        }

        let new_balance = wallet.balance + delta.balance;
        if new_balance < 0 {
            return Err(StoreError::NegativeBalance {
                balance: wallet.balance,
                delta: delta.balance,
            });
        }

        wallet.balance = new_balance;
        wallet.purchased_credits += delta.purchased;
        wallet.bonus_credits += delta.bonus;
        if let Some(expires_at) = delta.expires_at {
            wallet.expires_at = Some(expires_at);
        }
        wallet.version += 1;
        wallet.updated_at = chrono::Utc::now();

        let cf_wallets = self.cf(cf::WALLETS)?;
        let value = Self::serialize(&wallet)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_wallets, keys::wallet_key(user_id), &value);
        if let Some(tx) = transaction {
            self.stage_transaction(&mut batch, tx)?;
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(wallet)
    }
}

impl WalletStore for RocksStore {
    // =========================================================================
    // Wallet Operations
    // =========================================================================

    fn get_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        self.read_wallet(user_id)
    }

    fn get_or_create_wallet(&self, user_id: &UserId) -> Result<Wallet> {
        // Lock so two concurrent first-touch callers cannot both insert.
        let _guard = self.lock_wallets()?;

        if let Some(wallet) = self.read_wallet(user_id)? {
            return Ok(wallet);
        }

        let wallet = Wallet::new(*user_id);
        let cf = self.cf(cf::WALLETS)?;
        let value = Self::serialize(&wallet)?;
        self.db
            .put_cf(&cf, keys::wallet_key(user_id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(user_id = %user_id, "Wallet created");
        Ok(wallet)
    }

    fn apply_wallet_delta(
        &self,
        user_id: &UserId,
        expected_version: u64,
        delta: &WalletDelta,
        transaction: Option<&Transaction>,
    ) -> Result<Wallet> {
        let _guard = self.lock_wallets()?;
        self.apply_delta_locked(user_id, expected_version, delta, transaction)
    }

    fn apply_grant(
        &self,
        user_id: &UserId,
        expected_version: u64,
        delta: &WalletDelta,
        transaction: &Transaction,
    ) -> Result<Wallet> {
        let _guard = self.lock_wallets()?;

        // Reference reuse is checked under the same lock that orders
        // wallet writes, so two racing grants for one reference cannot
        // both commit.
        if let Some(reference_id) = &transaction.reference_id {
            let existing = self.transactions_with_reference(user_id, reference_id)?;
            if existing
                .iter()
                .any(|tx| tx.transaction_type == transaction.transaction_type)
            {
                return Err(StoreError::DuplicateReference {
                    reference_id: reference_id.clone(),
                });
            }
        }

        self.apply_delta_locked(user_id, expected_version, delta, Some(transaction))
    }

    // =========================================================================
    // Transaction Log Operations
    // =========================================================================

    fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_transaction(&mut batch, transaction)?;
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        self.db
            .get_cf(&cf, keys::transaction_key(transaction_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let prefix = keys::user_transactions_prefix(user_id);
        let mut all_keys = self.scan_prefix(cf::TRANSACTIONS_BY_USER, &prefix)?;

        // ULID ordering is oldest-first; reverse for newest-first.
        all_keys.reverse();

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::extract_transaction_id(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn find_transactions_by_reference(
        &self,
        user_id: &UserId,
        reference_id: &str,
    ) -> Result<Vec<Transaction>> {
        self.transactions_with_reference(user_id, reference_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger_core::Transaction;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let first = store.get_or_create_wallet(&user_id).unwrap();
        let second = store.get_or_create_wallet(&user_id).unwrap();

        assert_eq!(first.balance, 0);
        assert_eq!(first.version, second.version);
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn get_wallet_does_not_create() {
        let (store, _dir) = create_test_store();
        assert!(store.get_wallet(&UserId::generate()).unwrap().is_none());
    }

    #[test]
    fn apply_delta_updates_balance_and_version() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let wallet = store.get_or_create_wallet(&user_id).unwrap();

        let delta = WalletDelta {
            balance: 100,
            purchased: 100,
            ..WalletDelta::default()
        };
        let updated = store
            .apply_wallet_delta(&user_id, wallet.version, &delta, None)
            .unwrap();

        assert_eq!(updated.balance, 100);
        assert_eq!(updated.purchased_credits, 100);
        assert_eq!(updated.version, wallet.version + 1);
    }

    #[test]
    fn stale_version_conflicts() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let wallet = store.get_or_create_wallet(&user_id).unwrap();

        store
            .apply_wallet_delta(&user_id, wallet.version, &WalletDelta::balance(50), None)
            .unwrap();

        // Second writer still holds the original version.
        let result =
            store.apply_wallet_delta(&user_id, wallet.version, &WalletDelta::balance(-50), None);
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));

        // Balance is untouched by the rejected write.
        let current = store.get_wallet(&user_id).unwrap().unwrap();
        assert_eq!(current.balance, 50);
    }

    #[test]
    fn negative_balance_rejected() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let wallet = store.get_or_create_wallet(&user_id).unwrap();

        let result =
            store.apply_wallet_delta(&user_id, wallet.version, &WalletDelta::balance(-1), None);
        assert!(matches!(
            result,
            Err(StoreError::NegativeBalance {
                balance: 0,
                delta: -1
            })
        ));
    }

    #[test]
    fn apply_delta_missing_wallet() {
        let (store, _dir) = create_test_store();
        let result =
            store.apply_wallet_delta(&UserId::generate(), 1, &WalletDelta::balance(10), None);
        assert!(matches!(
            result,
            Err(StoreError::NotFound {
                entity: "wallet",
                ..
            })
        ));
    }

    #[test]
    fn delta_and_transaction_commit_together() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let wallet = store.get_or_create_wallet(&user_id).unwrap();

        let tx = Transaction::purchase(
            user_id,
            100,
            "100 credits".into(),
            Some("cs_abc".into()),
            serde_json::Value::Null,
        );
        let delta = WalletDelta {
            balance: 100,
            purchased: 100,
            ..WalletDelta::default()
        };
        store
            .apply_wallet_delta(&user_id, wallet.version, &delta, Some(&tx))
            .unwrap();

        let listed = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].amount, 100);

        let by_ref = store
            .find_transactions_by_reference(&user_id, "cs_abc")
            .unwrap();
        assert_eq!(by_ref.len(), 1);
        assert_eq!(by_ref[0].id, tx.id);
    }

    #[test]
    fn history_is_newest_first_and_paginated() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.get_or_create_wallet(&user_id).unwrap();

        // Delay between inserts so the ULIDs land in distinct milliseconds.
        let tx1 = Transaction::purchase(
            user_id,
            100,
            "First".into(),
            None,
            serde_json::Value::Null,
        );
        store.put_transaction(&tx1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));

        let tx2 = Transaction::usage(user_id, 40, "Second".into(), None, serde_json::Value::Null);
        store.put_transaction(&tx2).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));

        let tx3 = Transaction::refund(user_id, 10, "Third".into(), None, serde_json::Value::Null);
        store.put_transaction(&tx3).unwrap();

        let all = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].description, "Third");
        assert_eq!(all[2].description, "First");

        let page = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].description, "Second");

        let past_end = store.list_transactions_by_user(&user_id, 10, 5).unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn histories_are_isolated_per_user() {
        let (store, _dir) = create_test_store();
        let alice = UserId::generate();
        let bob = UserId::generate();

        store
            .put_transaction(&Transaction::purchase(
                alice,
                100,
                "Alice purchase".into(),
                None,
                serde_json::Value::Null,
            ))
            .unwrap();
        store
            .put_transaction(&Transaction::purchase(
                bob,
                25,
                "Bob purchase".into(),
                None,
                serde_json::Value::Null,
            ))
            .unwrap();

        let alice_txs = store.list_transactions_by_user(&alice, 10, 0).unwrap();
        assert_eq!(alice_txs.len(), 1);
        assert_eq!(alice_txs[0].amount, 100);
    }

    #[test]
    fn reference_lookup_scoped_to_reference() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let tx1 = Transaction::purchase(
            user_id,
            100,
            "Purchase".into(),
            Some("ref_1".into()),
            serde_json::Value::Null,
        );
        let tx2 = Transaction::usage(
            user_id,
            30,
            "Usage".into(),
            Some("ref_2".into()),
            serde_json::Value::Null,
        );
        store.put_transaction(&tx1).unwrap();
        store.put_transaction(&tx2).unwrap();

        let found = store
            .find_transactions_by_reference(&user_id, "ref_1")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, tx1.id);

        assert!(store
            .find_transactions_by_reference(&user_id, "ref_3")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn reference_lookup_ignores_prefixed_references() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        // "cs_1" is a strict prefix of "cs_12"; the lookup for either must
        // not see the other.
        let tx_long = Transaction::purchase(
            user_id,
            100,
            "100 credits".into(),
            Some("cs_12".into()),
            serde_json::Value::Null,
        );
        let tx_short = Transaction::purchase(
            user_id,
            100,
            "100 credits".into(),
            Some("cs_1".into()),
            serde_json::Value::Null,
        );
        store.put_transaction(&tx_long).unwrap();
        store.put_transaction(&tx_short).unwrap();

        let found = store
            .find_transactions_by_reference(&user_id, "cs_1")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, tx_short.id);

        let found = store
            .find_transactions_by_reference(&user_id, "cs_12")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, tx_long.id);
    }

    #[test]
    fn apply_grant_rejects_reused_reference() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let wallet = store.get_or_create_wallet(&user_id).unwrap();

        let delta = WalletDelta {
            balance: 100,
            purchased: 100,
            ..WalletDelta::default()
        };
        let tx = Transaction::purchase(
            user_id,
            100,
            "100 credits".into(),
            Some("cs_abc".into()),
            serde_json::Value::Null,
        );
        let updated = store
            .apply_grant(&user_id, wallet.version, &delta, &tx)
            .unwrap();
        assert_eq!(updated.balance, 100);

        // Redelivery with a fresh version still fails on the reference.
        let replay = Transaction::purchase(
            user_id,
            100,
            "100 credits".into(),
            Some("cs_abc".into()),
            serde_json::Value::Null,
        );
        let result = store.apply_grant(&user_id, updated.version, &delta, &replay);
        assert!(matches!(
            result,
            Err(StoreError::DuplicateReference { .. })
        ));
        assert_eq!(store.get_wallet(&user_id).unwrap().unwrap().balance, 100);
    }

    #[test]
    fn apply_grant_allows_prefixed_reference() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let wallet = store.get_or_create_wallet(&user_id).unwrap();

        let delta = WalletDelta {
            balance: 100,
            purchased: 100,
            ..WalletDelta::default()
        };
        let first = Transaction::purchase(
            user_id,
            100,
            "100 credits".into(),
            Some("cs_12".into()),
            serde_json::Value::Null,
        );
        let updated = store
            .apply_grant(&user_id, wallet.version, &delta, &first)
            .unwrap();

        // A distinct payment whose reference is a prefix of the first.
        let second = Transaction::purchase(
            user_id,
            100,
            "100 credits".into(),
            Some("cs_1".into()),
            serde_json::Value::Null,
        );
        let updated = store
            .apply_grant(&user_id, updated.version, &delta, &second)
            .unwrap();
        assert_eq!(updated.balance, 200);
    }

    #[test]
    fn concurrent_first_touch_creates_one_wallet() {
        let (store, _dir) = create_test_store();
        let store = std::sync::Arc::new(store);
        let user_id = UserId::generate();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.get_or_create_wallet(&user_id).unwrap())
            })
            .collect();

        let wallets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created_at = wallets[0].created_at;
        assert!(wallets.iter().all(|w| w.created_at == created_at));
    }
}
