use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Defines a 16-byte identifier that travels as 32 lowercase hex chars.
macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Generate a new random id
            pub fn random() -> Result<Self, IdError> {
                let mut bytes = [0u8; 16];
                getrandom::getrandom(&mut bytes).map_err(|_| IdError::Entropy)?;
                Ok(Self(bytes))
            }

            /// Parse from hex string (32 hex chars)
            pub fn from_hex(s: &str) -> Result<Self, IdError> {
                if s.len() != 32 {
                    return Err(IdError::InvalidLength);
                }
                let mut bytes = [0u8; 16];
                hex::decode_to_slice(s, &mut bytes).map_err(|_| IdError::InvalidHex)?;
                Ok(Self(bytes))
            }

            /// Format as hex string
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// The first eight hex characters, which is how ids are shown in tables
            pub fn short(&self) -> String {
                let mut hex = self.to_hex();
                hex.truncate(8);
                hex
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
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
    /// Id of a single transaction event
    EventId
);

hex_id!(
    /// Id of the session replay attached to an event
    ReplayId
);

hex_id!(
    /// Id of the profile captured alongside an event
    ProfileId
);

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid length")]
    InvalidLength,
    #[error("failed to gather entropy for a random id")]
    Entropy,
}
