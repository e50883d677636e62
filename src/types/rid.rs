use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PageId, RID_SIZE, SlotId, error::DatabaseError};

/// Record locator: the heap page holding a row and the row's ordinal slot
/// inside that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: SlotId,
}

impl Rid {
    pub fn new(page_id: PageId, slot: SlotId) -> Self {
        Self { page_id, slot }
    }

    pub fn to_bytes(&self) -> [u8; RID_SIZE] {
        let mut buf = [0u8; RID_SIZE];
        buf[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < RID_SIZE {
            return Err(DatabaseError::serialization(format!(
                "RID needs {} bytes, got {}",
                RID_SIZE,
                bytes.len()
            )));
        }
        let page_id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let slot = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self { page_id, slot })
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}
