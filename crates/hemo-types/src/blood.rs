use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// ABO/Rh blood group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodGroup {
    APos,
    ANeg,
    BPos,
    BNeg,
    AbPos,
    AbNeg,
    OPos,
    ONeg,
}

impl BloodGroup {
    /// All groups, in display order.
    pub const ALL: [BloodGroup; 8] = [
        Self::APos,
        Self::ANeg,
        Self::BPos,
        Self::BNeg,
        Self::AbPos,
        Self::AbNeg,
        Self::OPos,
        Self::ONeg,
    ];

    /// Conventional label, e.g. `O+`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::APos => "A+",
            Self::ANeg => "A-",
            Self::BPos => "B+",
            Self::BNeg => "B-",
            Self::AbPos => "AB+",
            Self::AbNeg => "AB-",
            Self::OPos => "O+",
            Self::ONeg => "O-",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BloodGroup {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A+" => Ok(Self::APos),
            "A-" => Ok(Self::ANeg),
            "B+" => Ok(Self::BPos),
            "B-" => Ok(Self::BNeg),
            "AB+" => Ok(Self::AbPos),
            "AB-" => Ok(Self::AbNeg),
            "O+" => Ok(Self::OPos),
            "O-" => Ok(Self::ONeg),
            other => Err(TypeError::UnknownBloodGroup(other.to_string())),
        }
    }
}

/// Blood component type after separation.
///
/// Each component carries a different shelf life; the defaults here can be
/// overridden by the workflow's shelf-life policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    /// Red blood cells, 42 days at 2-6°C.
    Rbc,
    /// Plasma, 1 year frozen.
    Plasma,
    /// Platelets, 5 days at 20-24°C.
    Platelets,
    /// Unseparated whole blood, 35 days.
    WholeBlood,
}

impl ComponentType {
    pub const ALL: [ComponentType; 4] =
        [Self::Rbc, Self::Plasma, Self::Platelets, Self::WholeBlood];

    /// Default shelf life in days from collection.
    pub fn default_shelf_life_days(&self) -> u32 {
        match self {
            Self::Rbc => 42,
            Self::Plasma => 365,
            Self::Platelets => 5,
            Self::WholeBlood => 35,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rbc => write!(f, "RBC"),
            Self::Plasma => write!(f, "Plasma"),
            Self::Platelets => write!(f, "Platelets"),
            Self::WholeBlood => write!(f, "Whole Blood"),
        }
    }
}

impl FromStr for ComponentType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace([' ', '_'], "").as_str() {
            "RBC" => Ok(Self::Rbc),
            "PLASMA" => Ok(Self::Plasma),
            "PLATELETS" => Ok(Self::Platelets),
            "WHOLEBLOOD" => Ok(Self::WholeBlood),
            other => Err(TypeError::UnknownComponentType(other.to_string())),
        }
    }
}
