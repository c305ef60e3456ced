//! Object identifiers
//!
//! An [`ObjectId`] is four little-endian `u32` parts:
//!
//! ```text
//! part 0: hash                       scrambles ordering across the id space
//! part 1: (cell_tag << 16) | type    where the object was born and what it is
//! part 2: counter, low 32 bits
//! part 3: counter, high 32 bits
//! ```
//!
//! The text form is `a-b-c-d`, each part in unpadded lowercase hex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ObjectError, Result};

/// Identifies the master cell that generated an id
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct CellTag(pub u16);

impl fmt::Display for CellTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of object kinds known to the master
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u16)]
pub enum ObjectType {
    Null = 0,
    Transaction = 1,
    Chunk = 100,
    ChunkList = 101,
    ErasureChunk = 102,
    StringNode = 300,
    MapNode = 303,
    Account = 500,
    ClusterNode = 800,
    DataCenter = 805,
    MasterJob = 900,
}

impl ObjectType {
    /// All non-null types, in tag order
    pub const ALL: [ObjectType; 10] = [
        ObjectType::Transaction,
        ObjectType::Chunk,
        ObjectType::ChunkList,
        ObjectType::ErasureChunk,
        ObjectType::StringNode,
        ObjectType::MapNode,
        ObjectType::Account,
        ObjectType::ClusterNode,
        ObjectType::DataCenter,
        ObjectType::MasterJob,
    ];

    /// Whether objects of this type are chunks (regular or erasure)
    pub fn is_chunk(&self) -> bool {
        matches!(self, ObjectType::Chunk | ObjectType::ErasureChunk)
    }
}

impl TryFrom<u16> for ObjectType {
    type Error = ObjectError;

    fn try_from(value: u16) -> Result<Self> {
        if value == 0 {
            return Ok(ObjectType::Null);
        }
        ObjectType::ALL
            .iter()
            .copied()
            .find(|ty| *ty as u16 == value)
            .ok_or(ObjectError::UnknownType(value))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectType::Null => "null",
            ObjectType::Transaction => "transaction",
            ObjectType::Chunk => "chunk",
            ObjectType::ChunkList => "chunk_list",
            ObjectType::ErasureChunk => "erasure_chunk",
            ObjectType::StringNode => "string_node",
            ObjectType::MapNode => "map_node",
            ObjectType::Account => "account",
            ObjectType::ClusterNode => "cluster_node",
            ObjectType::DataCenter => "data_center",
            ObjectType::MasterJob => "master_job",
        };
        f.write_str(name)
    }
}

/// 128-bit master object identifier
///
/// Ordering is lexicographic over the parts, which makes iteration over
/// id-keyed ordered collections identical on every replica.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ObjectId {
    parts: [u32; 4],
}

impl ObjectId {
    /// The all-zero id; never assigned to a live object
    pub const NULL: ObjectId = ObjectId { parts: [0; 4] };

    pub const fn from_parts(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self {
            parts: [a, b, c, d],
        }
    }

    /// Assemble an id from its logical components
    pub fn make(object_type: ObjectType, cell_tag: CellTag, counter: u64, hash: u32) -> Self {
        Self::from_parts(
            hash,
            ((cell_tag.0 as u32) << 16) | object_type as u32,
            (counter & 0xffff_ffff) as u32,
            (counter >> 32) as u32,
        )
    }

    pub fn parts(&self) -> [u32; 4] {
        self.parts
    }

    pub fn is_null(&self) -> bool {
        self.parts == [0; 4]
    }

    /// Type encoded in the id, `None` if the tag is not a known type
    pub fn object_type(&self) -> Option<ObjectType> {
        ObjectType::try_from((self.parts[1] & 0xffff) as u16).ok()
    }

    pub fn cell_tag(&self) -> CellTag {
        CellTag((self.parts[1] >> 16) as u16)
    }

    pub fn counter(&self) -> u64 {
        ((self.parts[3] as u64) << 32) | self.parts[2] as u64
    }

    pub fn hash_part(&self) -> u32 {
        self.parts[0]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.parts;
        write!(f, "{:x}-{:x}-{:x}-{:x}", a, b, c, d)
    }
}

impl FromStr for ObjectId {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| ObjectError::InvalidId {
            text: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = [0u32; 4];
        let mut count = 0;
        for (index, chunk) in s.split('-').enumerate() {
            if index >= 4 {
                return Err(invalid("expected 4 parts"));
            }
            if chunk.is_empty() {
                return Err(invalid("empty part"));
            }
            parts[index] = u32::from_str_radix(chunk, 16).map_err(|e| invalid(&e.to_string()))?;
            count += 1;
        }
        if count != 4 {
            return Err(invalid("expected 4 parts"));
        }

        Ok(ObjectId { parts })
    }
}

/// Type encoded in `id`, [`ObjectType::Null`] for unknown tags
pub fn type_from_id(id: ObjectId) -> ObjectType {
    id.object_type().unwrap_or(ObjectType::Null)
}

pub fn cell_tag_from_id(id: ObjectId) -> CellTag {
    id.cell_tag()
}

pub fn counter_from_id(id: ObjectId) -> u64 {
    id.counter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_and_decompose() {
        let id = ObjectId::make(ObjectType::Chunk, CellTag(7), 0x1_0000_0002, 0xdead);

        assert_eq!(id.object_type(), Some(ObjectType::Chunk));
        assert_eq!(id.cell_tag(), CellTag(7));
        assert_eq!(id.counter(), 0x1_0000_0002);
        assert_eq!(id.hash_part(), 0xdead);
        assert_eq!(id.parts(), [0xdead, (7 << 16) | 100, 2, 1]);
    }

    #[test]
    fn test_display_matches_text_form() {
        let id = ObjectId::from_parts(0xabc, 0x10064, 0x1, 0x0);
        assert_eq!(id.to_string(), "abc-10064-1-0");
    }

    #[test]
    fn test_parse_text_form() {
        let id: ObjectId = "abc-10064-1-0".parse().unwrap();
        assert_eq!(id, ObjectId::from_parts(0xabc, 0x10064, 0x1, 0x0));
        assert_eq!(id.object_type(), Some(ObjectType::Chunk));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<ObjectId>().is_err());
        assert!("1-2-3".parse::<ObjectId>().is_err());
        assert!("1-2-3-4-5".parse::<ObjectId>().is_err());
        assert!("1--3-4".parse::<ObjectId>().is_err());
        assert!("g-2-3-4".parse::<ObjectId>().is_err());
        assert!("100000000-2-3-4".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_unknown_type_tag() {
        let id = ObjectId::from_parts(1, 0x1_0fff, 1, 0);
        assert_eq!(id.object_type(), None);
        assert_eq!(type_from_id(id), ObjectType::Null);
        assert_eq!(ObjectType::try_from(0x0fff), Err(ObjectError::UnknownType(0x0fff)));
    }

    #[test]
    fn test_type_tag_roundtrip_for_all_types() {
        for ty in ObjectType::ALL {
            assert_eq!(ObjectType::try_from(ty as u16), Ok(ty));
            let id = ObjectId::make(ty, CellTag(3), 42, 1);
            assert_eq!(type_from_id(id), ty);
            assert_eq!(cell_tag_from_id(id), CellTag(3));
            assert_eq!(counter_from_id(id), 42);
        }
    }

    #[test]
    fn test_null_id() {
        assert!(ObjectId::NULL.is_null());
        assert!(ObjectId::default().is_null());
        assert!(!ObjectId::from_parts(0, 0, 0, 1).is_null());
    }

    #[test]
    fn test_ordering_is_by_parts() {
        let a = ObjectId::from_parts(1, 0, 0, 9);
        let b = ObjectId::from_parts(2, 0, 0, 0);
        assert!(a < b);
    }
}
