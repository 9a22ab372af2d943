//! Invoice (nota) number generation.
//!
//! The counter lives in the remote `settings` table as two rows:
//! `nota_prefix` and `nota_last_number`. Numbers are formatted as
//! `{prefix}-{padded}` where the zero-padding width equals the length of the
//! previously stored number string — whatever width the back office last
//! wrote is the width that continues, and it grows naturally on rollover.
//!
//! Two terminals can race on the counter, so the write-back is a
//! compare-and-swap: the update is filtered on the value this call read, and
//! an empty match means another writer got there first — re-read and retry,
//! bounded.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::store::{DataStore, Filter};

pub const SETTING_NOTA_PREFIX: &str = "nota_prefix";
pub const SETTING_NOTA_LAST_NUMBER: &str = "nota_last_number";

const DEFAULT_PREFIX: &str = "NOTA";
const SEED_COUNTER: &str = "000";
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Format the next counter value, preserving the previous string's width.
/// `None` when the stored value is not a number.
pub fn next_counter_value(last: &str) -> Option<String> {
    let trimmed = last.trim();
    let n: u64 = trimmed.parse().ok()?;
    let width = trimmed.len();
    Some(format!("{:0width$}", n + 1, width = width))
}

pub fn format_nota(prefix: &str, counter: &str) -> String {
    format!("{prefix}-{counter}")
}

/// Remote-backed nota counter.
pub struct NotaCounter {
    store: Arc<dyn DataStore>,
}

impl NotaCounter {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    async fn read_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let rows = self
            .store
            .select("settings", &[Filter::eq("key", key)])
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get("value").and_then(|v| v.as_str()).map(String::from)))
    }

    /// Reserve and return the next nota number.
    ///
    /// The counter row is written back before the number is handed out, so a
    /// crash after this call can skip a number but never reuse one.
    pub async fn next_nota(&self) -> LedgerResult<String> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let prefix = self
                .read_setting(SETTING_NOTA_PREFIX)
                .await?
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

            let last = match self.read_setting(SETTING_NOTA_LAST_NUMBER).await? {
                Some(value) => value,
                None => {
                    // First use on a fresh project: seed the counter row.
                    self.store
                        .insert(
                            "settings",
                            vec![json!({
                                "key": SETTING_NOTA_LAST_NUMBER,
                                "value": SEED_COUNTER,
                            })],
                        )
                        .await?;
                    SEED_COUNTER.to_string()
                }
            };

            let next = next_counter_value(&last)
                .ok_or_else(|| LedgerError::CounterNotNumeric(last.clone()))?;

            let updated = self
                .store
                .update(
                    "settings",
                    &[
                        Filter::eq("key", SETTING_NOTA_LAST_NUMBER),
                        Filter::eq("value", &last),
                    ],
                    json!({ "value": next }),
                )
                .await?;

            if updated.is_empty() {
                warn!(attempt, "nota counter moved underneath us, retrying");
                continue;
            }

            let nota = format_nota(&prefix, &next);
            info!(nota = %nota, "nota number reserved");
            return Ok(nota);
        }

        Err(LedgerError::CounterConflict(MAX_CAS_ATTEMPTS))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn seeded(prefix: &str, last: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            "settings",
            vec![
                json!({"key": SETTING_NOTA_PREFIX, "value": prefix}),
                json!({"key": SETTING_NOTA_LAST_NUMBER, "value": last}),
            ],
        );
        store
    }

    #[test]
    fn test_padding_width_follows_stored_string() {
        assert_eq!(next_counter_value("007").as_deref(), Some("008"));
        assert_eq!(next_counter_value("7").as_deref(), Some("8"));
        assert_eq!(next_counter_value("999").as_deref(), Some("1000"));
        assert_eq!(next_counter_value("0099").as_deref(), Some("0100"));
        assert_eq!(next_counter_value("abc"), None);
        assert_eq!(next_counter_value(""), None);
    }

    #[tokio::test]
    async fn test_next_nota_preserves_width() {
        let store = seeded("INV", "007");
        let counter = NotaCounter::new(store.clone());
        assert_eq!(counter.next_nota().await.unwrap(), "INV-008");

        let store = seeded("INV", "7");
        let counter = NotaCounter::new(store);
        assert_eq!(counter.next_nota().await.unwrap(), "INV-8");
    }

    #[tokio::test]
    async fn test_sequential_calls_are_distinct() {
        let store = seeded("NOTA", "098");
        let counter = NotaCounter::new(store);
        assert_eq!(counter.next_nota().await.unwrap(), "NOTA-099");
        assert_eq!(counter.next_nota().await.unwrap(), "NOTA-100");
        assert_eq!(counter.next_nota().await.unwrap(), "NOTA-101");
    }

    #[tokio::test]
    async fn test_missing_counter_row_is_seeded() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            "settings",
            vec![json!({"key": SETTING_NOTA_PREFIX, "value": "CTK"})],
        );
        let counter = NotaCounter::new(store.clone());
        assert_eq!(counter.next_nota().await.unwrap(), "CTK-001");
        assert_eq!(counter.next_nota().await.unwrap(), "CTK-002");
    }

    #[tokio::test]
    async fn test_non_numeric_counter_errors() {
        let store = seeded("INV", "VII");
        let counter = NotaCounter::new(store);
        assert!(matches!(
            counter.next_nota().await,
            Err(LedgerError::CounterNotNumeric(v)) if v == "VII"
        ));
    }

    /// Delegates to an inner `MemoryStore` but, on the first counter
    /// write-back, sneaks in a competing increment first — the CAS filter no
    /// longer matches and the caller must retry against the fresh value.
    struct RacingStore {
        inner: Arc<MemoryStore>,
        raced: AtomicBool,
    }

    #[async_trait]
    impl DataStore for RacingStore {
        async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, StoreError> {
            self.inner.select(table, filters).await
        }

        async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
            self.inner.insert(table, rows).await
        }

        async fn update(
            &self,
            table: &str,
            filters: &[Filter],
            patch: Value,
        ) -> Result<Vec<Value>, StoreError> {
            if table == "settings" && !self.raced.swap(true, Ordering::SeqCst) {
                self.inner
                    .update(
                        "settings",
                        &[Filter::eq("key", SETTING_NOTA_LAST_NUMBER)],
                        json!({ "value": "150" }),
                    )
                    .await?;
            }
            self.inner.update(table, filters, patch).await
        }

        async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
            self.inner.delete(table, filters).await
        }

        async fn fetch_order(&self, order_id: &str) -> Result<Option<Value>, StoreError> {
            self.inner.fetch_order(order_id).await
        }

        async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
            self.inner.rpc(function, args).await
        }
    }

    #[tokio::test]
    async fn test_cas_conflict_retries_against_fresh_value() {
        let inner = seeded("INV", "100");
        let store: Arc<dyn DataStore> = Arc::new(RacingStore {
            inner,
            raced: AtomicBool::new(false),
        });
        let counter = NotaCounter::new(store);
        // First attempt reads 100 but a competing writer bumps the counter to
        // 150 before the write-back lands; the retry must build on 150.
        assert_eq!(counter.next_nota().await.unwrap(), "INV-151");
    }

    /// Always loses the race: every write-back attempt sees a different
    /// stored value than the one it read.
    struct ContendedStore {
        inner: Arc<MemoryStore>,
        bumps: AtomicU32,
    }

    #[async_trait]
    impl DataStore for ContendedStore {
        async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, StoreError> {
            self.inner.select(table, filters).await
        }

        async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
            self.inner.insert(table, rows).await
        }

        async fn update(
            &self,
            table: &str,
            filters: &[Filter],
            patch: Value,
        ) -> Result<Vec<Value>, StoreError> {
            if table == "settings" {
                let bump = 500 + self.bumps.fetch_add(1, Ordering::SeqCst);
                self.inner
                    .update(
                        "settings",
                        &[Filter::eq("key", SETTING_NOTA_LAST_NUMBER)],
                        json!({ "value": bump.to_string() }),
                    )
                    .await?;
            }
            self.inner.update(table, filters, patch).await
        }

        async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
            self.inner.delete(table, filters).await
        }

        async fn fetch_order(&self, order_id: &str) -> Result<Option<Value>, StoreError> {
            self.inner.fetch_order(order_id).await
        }

        async fn rpc(&self, function: &str, args: Value) -> Result<Value, StoreError> {
            self.inner.rpc(function, args).await
        }
    }

    #[tokio::test]
    async fn test_cas_exhaustion_surfaces_conflict() {
        let inner = seeded("INV", "100");
        let store: Arc<dyn DataStore> = Arc::new(ContendedStore {
            inner,
            bumps: AtomicU32::new(0),
        });
        let counter = NotaCounter::new(store);
        assert!(matches!(
            counter.next_nota().await,
            Err(LedgerError::CounterConflict(_))
        ));
    }
}
