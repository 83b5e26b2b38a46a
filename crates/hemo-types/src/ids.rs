use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Identifier for a physical blood unit.
///
/// Format: `BB{bank:02}-{YYYYMMDD}-{4 hex}`, e.g. `BB07-20260812-A9F3`.
/// The bank part identifies the collecting blood bank, the date part the
/// collection date, and the suffix disambiguates units collected the same
/// day at the same bank.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(String);

impl UnitId {
    /// Generate a fresh unit id for a collection at the given bank and date.
    pub fn generate(bank_id: u32, collection_date: NaiveDate) -> Self {
        let suffix: [u8; 2] = rand::random();
        Self(format!(
            "BB{:02}-{}-{}",
            bank_id,
            collection_date.format("%Y%m%d"),
            hex::encode_upper(suffix)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UnitId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 || !parts[0].starts_with("BB") || parts[1].len() != 8 {
            return Err(TypeError::InvalidIdentifier(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, ":")).unwrap_or(s);
                Uuid::parse_str(raw)
                    .map(Self)
                    .map_err(|_| TypeError::InvalidIdentifier(s.to_string()))
            }
        }
    };
}

uuid_id!(
    /// Identifier for a donor's donation request.
    DonationRequestId,
    "don"
);

uuid_id!(
    /// Identifier for a hospital's blood request.
    HospitalRequestId,
    "req"
);

/// Human-readable request number shown to hospitals.
///
/// Format: `REQ-{year}-{NNNNNN}`, numbered per calendar year.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestNumber(String);

impl RequestNumber {
    pub fn new(year: i32, ordinal: u64) -> Self {
        Self(format!("REQ-{year}-{ordinal:06}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
