//! Trace and span identifiers and the trace context that links them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing a hex identifier.
#[derive(Debug, Error, PartialEq)]
pub enum IdParseError {
    /// The input does not have the required number of hex digits.
    #[error("Expected {expected} hex digits, got {actual}")]
    InvalidLength {
        /// Required number of hex digits.
        expected: usize,
        /// Number of characters received.
        actual: usize,
    },

    /// The input contains uppercase hex digits.
    #[error("Identifier must be lowercase hex")]
    NotLowercase,

    /// The input contains non-hex characters.
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The identifier is all zeros.
    #[error("Identifier cannot be all zeros")]
    AllZeros,
}

fn decode_id<const N: usize>(s: &str) -> Result<[u8; N], IdParseError> {
    if s.len() != N * 2 {
        return Err(IdParseError::InvalidLength {
            expected: N * 2,
            actual: s.len(),
        });
    }
    if s.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(IdParseError::NotLowercase);
    }

    let mut bytes = [0_u8; N];
    hex::decode_to_slice(s, &mut bytes)?;

    if bytes.iter().all(|b| *b == 0) {
        return Err(IdParseError::AllZeros);
    }
    Ok(bytes)
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// The invalid all-zero identifier.
            pub const INVALID: Self = Self([0; $len]);

            /// Creates an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes of this identifier.
            #[must_use]
            pub const fn to_bytes(self) -> [u8; $len] {
                self.0
            }

            /// Parses an identifier from lowercase hex of exact length.
            ///
            /// # Errors
            ///
            /// Returns an error if the input has the wrong length, is not
            /// lowercase hex, or is all zeros.
            pub fn from_hex(s: &str) -> Result<Self, IdParseError> {
                decode_id::<{ $len }>(s).map(Self)
            }

            /// Returns true unless this is the all-zero identifier.
            #[must_use]
            pub fn is_valid(&self) -> bool {
                *self != Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// A 128-bit trace identifier, rendered as 32 lowercase hex digits.
    TraceId,
    16
);

hex_id!(
    /// A 64-bit span identifier, rendered as 16 lowercase hex digits.
    SpanId,
    8
);

impl TraceId {
    /// Generates a random, valid trace ID.
    #[must_use]
    pub fn random() -> Self {
        loop {
            let id = Self(rand::random::<u128>().to_be_bytes());
            if id.is_valid() {
                return id;
            }
        }
    }
}

impl SpanId {
    /// Generates a random, valid span ID.
    #[must_use]
    pub fn random() -> Self {
        loop {
            let id = Self(rand::random::<u64>().to_be_bytes());
            if id.is_valid() {
                return id;
            }
        }
    }
}

fn default_sampled() -> bool {
    true
}

/// Identifies one span within one logical request.
///
/// A root context has no parent. Child contexts keep the trace ID, get a
/// fresh span ID and record their parent's span ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceContext {
    /// The trace this span belongs to.
    pub trace_id: TraceId,
    /// This span's ID.
    pub span_id: SpanId,
    /// The parent span ID (None for root spans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Whether spans of this trace are recorded and exported.
    #[serde(default = "default_sampled")]
    pub sampled: bool,
}

impl TraceContext {
    /// Creates a fresh, sampled root context.
    #[must_use]
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_span_id: None,
            sampled: true,
        }
    }

    /// Creates a child context of this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            parent_span_id: Some(self.span_id),
            sampled: self.sampled,
        }
    }

    /// Returns true if this context has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}
