//! Typed value helpers.
//!
//! Values are encoded with `bincode` and stamped with the wall-clock time
//! of the write in unix nanoseconds.

use std::time::{SystemTime, UNIX_EPOCH};

use kestrel_core::api::{GetRequest, PutRequest};
use kestrel_core::{Error, Key, Result, Value};
use kestrel_routing::into_result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::Db;

/// Returns the current wall-clock time in unix nanoseconds.
#[must_use]
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
}

/// Reads and decodes the value at `key`.
///
/// Returns the value and the timestamp of its write, or `None` if the key
/// is absent or holds an empty value.
///
/// # Errors
///
/// Returns the operation's error, or `Error::Codec` if the stored bytes do
/// not decode as `T`.
pub async fn get_value<T, D>(db: &D, key: impl Into<Key>) -> Result<Option<(T, i64)>>
where
    T: DeserializeOwned,
    D: Db + ?Sized,
{
    let response = into_result(db.get(GetRequest::new(key)).await)?;
    let Some(value) = response.value.filter(|value| !value.bytes.is_empty()) else {
        return Ok(None);
    };
    let decoded = bincode::deserialize(&value.bytes).map_err(|e| Error::Codec {
        reason: e.to_string(),
    })?;
    Ok(Some((decoded, value.timestamp)))
}

/// Encodes `value` and writes it at `key` with the current time.
///
/// # Errors
///
/// Returns `Error::Codec` if `value` cannot be encoded, or the operation's
/// error.
pub async fn put_value<T, D>(db: &D, key: impl Into<Key>, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    D: Db + ?Sized,
{
    let bytes = bincode::serialize(value).map_err(|e| Error::Codec {
        reason: e.to_string(),
    })?;
    let request = PutRequest::new(key, Value::new(bytes, now_nanos()));
    into_result(db.put(request).await)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::test_db::MemDb;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        owner: String,
        balance: i64,
        tags: Vec<String>,
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let db = MemDb::default();
        let account = Account {
            owner: "ada".to_string(),
            balance: 42,
            tags: vec!["gold".to_string()],
        };

        let before = now_nanos();
        put_value(&db, "acct/ada", &account).await.unwrap();
        let (read, timestamp) = get_value::<Account, _>(&db, "acct/ada")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(read, account);
        assert!(timestamp >= before);
    }

    #[tokio::test]
    async fn test_missing_and_empty_values() {
        let db = MemDb::default();
        assert_eq!(get_value::<u64, _>(&db, "absent").await.unwrap(), None);

        db.insert_raw("empty", Value::new(Vec::new(), 1));
        assert_eq!(get_value::<u64, _>(&db, "empty").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decode_failure_is_codec_error() {
        let db = MemDb::default();
        db.insert_raw("short", Value::new(vec![1u8], 1));

        let err = get_value::<u64, _>(&db, "short").await.unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
    }

    #[tokio::test]
    async fn test_operation_error_is_returned() {
        let db = MemDb::default();
        db.fail_with(Error::Remote {
            message: "store unavailable".to_string(),
            retryable: false,
        });

        let err = put_value(&db, "k", &1u32).await.unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }
}
