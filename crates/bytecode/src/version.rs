// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//


use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::opcodes::{Encoding, OpcodeTable, opcodes_27, opcodes_36, opcodes_37};

/// One revision of the instruction set. Each version selects an opcode table, an instruction
/// encoding and (in the decompiler) a grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Version {
    #[serde(rename = "2.7")]
    V2_7,
    #[serde(rename = "3.6")]
    V3_6,
    #[serde(rename = "3.7")]
    V3_7,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported bytecode version: {0}")]
pub struct UnknownVersion(pub String);

impl Version {
    pub const ALL: [Version; 3] = [Version::V2_7, Version::V3_6, Version::V3_7];

    pub fn is_py3(&self) -> bool {
        !matches!(self, Version::V2_7)
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Version::V2_7 => Encoding::Variable,
            Version::V3_6 | Version::V3_7 => Encoding::Wordcode,
        }
    }

    /// The static opcode table for this version. Tables are built once and shared.
    pub fn opcodes(&self) -> &'static OpcodeTable {
        match self {
            Version::V2_7 => opcodes_27(),
            Version::V3_6 => opcodes_36(),
            Version::V3_7 => opcodes_37(),
        }
    }
}

impl FromStr for Version {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2.7" => Ok(Version::V2_7),
            "3.6" => Ok(Version::V3_6),
            "3.7" => Ok(Version::V3_7),
            other => Err(UnknownVersion(other.to_string())),
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::V2_7 => write!(f, "2.7"),
            Version::V3_6 => write!(f, "3.6"),
            Version::V3_7 => write!(f, "3.7"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for v in Version::ALL {
            assert_eq!(v.to_string().parse::<Version>().unwrap(), v);
        }
        assert!("3.12".parse::<Version>().is_err());
    }

    #[test]
    fn serde_uses_dotted_tags() {
        let v: Version = serde_json::from_str("\"3.6\"").unwrap();
        assert_eq!(v, Version::V3_6);
        assert_eq!(serde_json::to_string(&Version::V2_7).unwrap(), "\"2.7\"");
    }
}
