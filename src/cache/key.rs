//! Key Derivation Module
//!
//! Turns a namespace, an operation identity and its arguments into a
//! deterministic cache key. Every stored key has the shape
//! `"<namespace>:<derived>"`, so a namespace prefix selects exactly the
//! entries of that namespace.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::{CacheError, Result};

// == Constants ==
/// Separator between the namespace and the derived key, and between
/// segments of a default key.
pub const KEY_SEPARATOR: char = ':';

/// Maximum namespace length in bytes
pub const MAX_NAMESPACE_LENGTH: usize = 64;

// == Cache Namespace ==
/// Logical cache name for one aggregate type ("books", "categories", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheNamespace(String);

impl CacheNamespace {
    /// Validates and wraps a namespace name.
    ///
    /// Only `[A-Za-z0-9_.-]` is accepted: the separator and store glob
    /// characters can never appear, so namespace prefixes never overlap.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if name.is_empty() || name.len() > MAX_NAMESPACE_LENGTH || !valid_chars {
            return Err(CacheError::InvalidNamespace(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by every storage key of this namespace (`"books:"`).
    pub fn key_prefix(&self) -> String {
        format!("{}{}", self.0, KEY_SEPARATOR)
    }
}

impl TryFrom<String> for CacheNamespace {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CacheNamespace> for String {
    fn from(ns: CacheNamespace) -> Self {
        ns.0
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Cache Key ==
/// A derived key bound to its namespace. Computed per call, never persisted
/// on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: CacheNamespace,
    derived: String,
}

impl CacheKey {
    pub fn new(namespace: CacheNamespace, derived: impl Into<String>) -> Self {
        Self {
            namespace,
            derived: derived.into(),
        }
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    pub fn derived(&self) -> &str {
        &self.derived
    }

    /// Full key as written to both tiers: `"<namespace>:<derived>"`.
    pub fn storage_key(&self) -> String {
        format!("{}{}{}", self.namespace, KEY_SEPARATOR, self.derived)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.namespace, KEY_SEPARATOR, self.derived)
    }
}

// == Key Expression Error ==
/// Returned by a [`KeyBuilder`] that cannot produce a key for its input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct KeyExpressionError(pub String);

impl KeyExpressionError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Typed custom key function supplied per operation.
pub type KeyBuilder<A> =
    Arc<dyn Fn(&A) -> std::result::Result<String, KeyExpressionError> + Send + Sync>;

/// Wraps a closure as a [`KeyBuilder`].
pub fn key_builder<A, F>(f: F) -> KeyBuilder<A>
where
    F: Fn(&A) -> std::result::Result<String, KeyExpressionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

// == Key Arguments ==
/// Argument values that contribute to a default key, in call order.
pub trait KeyArgs {
    fn key_segments(&self) -> Vec<String>;
}

impl KeyArgs for () {
    fn key_segments(&self) -> Vec<String> {
        Vec::new()
    }
}

impl KeyArgs for str {
    fn key_segments(&self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl<T: KeyArgs + ?Sized> KeyArgs for &T {
    fn key_segments(&self) -> Vec<String> {
        (**self).key_segments()
    }
}

macro_rules! impl_key_args_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl KeyArgs for $t {
                fn key_segments(&self) -> Vec<String> {
                    vec![self.to_string()]
                }
            }
        )*
    };
}

impl_key_args_scalar!(
    String, bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize,
    uuid::Uuid
);

macro_rules! impl_key_args_tuple {
    ($($name:ident),+) => {
        impl<$($name: fmt::Display),+> KeyArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn key_segments(&self) -> Vec<String> {
                let ($($name,)+) = self;
                vec![$($name.to_string()),+]
            }
        }
    };
}

impl_key_args_tuple!(A);
impl_key_args_tuple!(A, B);
impl_key_args_tuple!(A, B, C);
impl_key_args_tuple!(A, B, C, D);
impl_key_args_tuple!(A, B, C, D, E);
impl_key_args_tuple!(A, B, C, D, E, F);

impl<T: fmt::Display> KeyArgs for [T] {
    fn key_segments(&self) -> Vec<String> {
        self.iter().map(|v| v.to_string()).collect()
    }
}

impl<T: fmt::Display> KeyArgs for Vec<T> {
    fn key_segments(&self) -> Vec<String> {
        self.as_slice().key_segments()
    }
}

// == Key Codec ==
/// Deterministic key derivation. Pure: no state, no side effects beyond a
/// warning log when a custom key builder fails.
pub struct KeyCodec;

impl KeyCodec {
    /// Derives the default key for `operation_id` called with `args`.
    pub fn derive_key(namespace: &CacheNamespace, operation_id: &str, args: &[String]) -> CacheKey {
        CacheKey::new(namespace.clone(), Self::default_key(operation_id, args))
    }

    /// Derives a key from typed arguments, preferring `builder` when given.
    ///
    /// A builder error or an empty custom key falls back to the default key.
    pub fn derive<A: KeyArgs>(
        namespace: &CacheNamespace,
        operation_id: &str,
        args: &A,
        builder: Option<&KeyBuilder<A>>,
    ) -> CacheKey {
        if let Some(build) = builder {
            match build(args) {
                Ok(custom) if !custom.is_empty() => {
                    return CacheKey::new(namespace.clone(), custom);
                }
                Ok(_) => {
                    warn!(
                        namespace = %namespace,
                        operation = operation_id,
                        "Key builder returned an empty key, using default key"
                    );
                }
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        operation = operation_id,
                        error = %e,
                        "Key builder failed, using default key"
                    );
                }
            }
        }
        Self::derive_key(namespace, operation_id, &args.key_segments())
    }

    /// Canonical concatenation: `op:arg1:arg2`, each segment escaped so
    /// that distinct argument lists never produce the same string.
    pub fn default_key(operation_id: &str, args: &[String]) -> String {
        let mut key = escape_segment(operation_id);
        for arg in args {
            key.push(KEY_SEPARATOR);
            key.push_str(&escape_segment(arg));
        }
        key
    }
}

fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '\\' || c == KEY_SEPARATOR {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
