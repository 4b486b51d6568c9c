// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key/value cache collaborator.
//!
//! Values are raw bytes; [`get_json`] and [`set_json`] add serde encoding on
//! top. Every operation takes the call's [`Context`] and fails with
//! [`CacheError::Cancelled`] once it is done.

mod memory;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::Context;
use crate::error::CacheError;

pub use memory::{CacheStats, MemoryCache};

/// A byte cache with per-entry time-to-live.
pub trait Cache: Send + Sync {
    /// Value for `key`, or `None` on a miss or expired entry.
    fn get(&self, ctx: &Context, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value`. `ttl` of `None` uses the cache default; a zero
    /// duration never expires.
    fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Remove `key`. Returns whether it was present.
    fn delete(&self, ctx: &Context, key: &str) -> Result<bool, CacheError>;

    fn exists(&self, ctx: &Context, key: &str) -> Result<bool, CacheError>;

    fn clear(&self, ctx: &Context) -> Result<(), CacheError>;
}

/// Read and decode a JSON value.
pub fn get_json<T, C>(cache: &C, ctx: &Context, key: &str) -> Result<Option<T>, CacheError>
where
    T: DeserializeOwned,
    C: Cache + ?Sized,
{
    match cache.get(ctx, key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode a value as JSON and store it.
pub fn set_json<T, C>(
    cache: &C,
    ctx: &Context,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError>
where
    T: Serialize + ?Sized,
    C: Cache + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    cache.set(ctx, key, bytes, ttl)
}

/// Cache placeholder used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _ctx: &Context, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::NoAdapter)
    }

    fn set(
        &self,
        _ctx: &Context,
        _key: &str,
        _value: Vec<u8>,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Err(CacheError::NoAdapter)
    }

    fn delete(&self, _ctx: &Context, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::NoAdapter)
    }

    fn exists(&self, _ctx: &Context, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::NoAdapter)
    }

    fn clear(&self, _ctx: &Context) -> Result<(), CacheError> {
        Err(CacheError::NoAdapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_json_helpers() {
        let ctx = Context::background();
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let user = User {
            id: 7,
            name: "ada".to_string(),
        };

        set_json(cache.as_ref(), &ctx, "user:7", &user, None).unwrap();
        let back: Option<User> = get_json(cache.as_ref(), &ctx, "user:7").unwrap();
        assert_eq!(back, Some(user));

        let missing: Option<User> = get_json(cache.as_ref(), &ctx, "user:8").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_json_decode_error() {
        let ctx = Context::background();
        let cache = MemoryCache::new();
        cache.set(&ctx, "raw", b"not json".to_vec(), None).unwrap();
        assert!(matches!(
            get_json::<User, _>(&cache, &ctx, "raw"),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_noop_cache() {
        let ctx = Context::background();
        let cache = NoopCache;
        assert!(matches!(cache.get(&ctx, "a"), Err(CacheError::NoAdapter)));
        assert!(matches!(
            cache.set(&ctx, "a", Vec::new(), None),
            Err(CacheError::NoAdapter)
        ));
        assert!(matches!(cache.clear(&ctx), Err(CacheError::NoAdapter)));
        assert_eq!(
            CacheError::NoAdapter.to_string(),
            crate::error::NO_ADAPTER
        );
    }
}
