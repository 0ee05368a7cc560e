//! MVCC record types stored in the lock and write column families.
//!
//! Records are hand-encoded (little-endian) rather than run through a serde
//! format: the layouts are part of the on-disk contract and stay stable
//! independent of serialization-library internals.
//!
//! ## LockInfo wire format
//!
//! ```text
//!   [lock_ts: u64] [ttl: u64] [for_update_ts: u64] [lock_type: u8]
//!   [key_len: u32] [key] [primary_len: u32] [primary_lock]
//!   [has_short: u8] [short_len: u32] [short_value]
//! ```
//!
//! ## WriteInfo wire format
//!
//! ```text
//!   [op: u8] [start_ts: u64] [has_short: u8] [short_len: u32] [short_value]
//! ```

use serde::{Deserialize, Serialize};

use basalt_common::error::EngineError;

/// Values at or below this size ride inline in the lock record and are moved
/// to the data CF at commit time.
pub const SHORT_VALUE_LIMIT: usize = 64;

/// Kind of lock placed by a prewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LockType {
    Put = 0,
    Delete = 1,
    Lock = 2,
}

impl LockType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(LockType::Put),
            1 => Some(LockType::Delete),
            2 => Some(LockType::Lock),
            _ => None,
        }
    }
}

/// Operation recorded by a commit or rollback in the write CF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WriteOp {
    Put = 0,
    Delete = 1,
    Rollback = 2,
    Lock = 3,
}

impl WriteOp {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(WriteOp::Put),
            1 => Some(WriteOp::Delete),
            2 => Some(WriteOp::Rollback),
            3 => Some(WriteOp::Lock),
            _ => None,
        }
    }
}

impl From<LockType> for WriteOp {
    fn from(lt: LockType) -> Self {
        match lt {
            LockType::Put => WriteOp::Put,
            LockType::Delete => WriteOp::Delete,
            LockType::Lock => WriteOp::Lock,
        }
    }
}

/// A lock held on one user key. At most one lock exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// The key this lock covers.
    pub key: Vec<u8>,
    /// Primary key of the owning transaction; lock resolution starts there.
    pub primary_lock: Vec<u8>,
    pub lock_ts: u64,
    pub ttl: u64,
    pub for_update_ts: u64,
    pub lock_type: LockType,
    /// Small Put values are carried inline instead of going to the data CF.
    pub short_value: Option<Vec<u8>>,
}

impl LockInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            8 + 8
                + 8
                + 1
                + 4
                + self.key.len()
                + 4
                + self.primary_lock.len()
                + 1
                + 4
                + self.short_value.as_ref().map_or(0, |v| v.len()),
        );
        buf.extend_from_slice(&self.lock_ts.to_le_bytes());
        buf.extend_from_slice(&self.ttl.to_le_bytes());
        buf.extend_from_slice(&self.for_update_ts.to_le_bytes());
        buf.push(self.lock_type as u8);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&(self.primary_lock.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.primary_lock);
        match &self.short_value {
            Some(v) => {
                buf.push(1);
                buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
                buf.extend_from_slice(v);
            }
            None => {
                buf.push(0);
                buf.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self, EngineError> {
        let mut cursor = Cursor::new(raw, CF_NAME_LOCK);
        let lock_ts = cursor.read_u64()?;
        let ttl = cursor.read_u64()?;
        let for_update_ts = cursor.read_u64()?;
        let lock_type = LockType::from_byte(cursor.read_u8()?).ok_or_else(|| {
            corruption(CF_NAME_LOCK, raw, "unknown lock type")
        })?;
        let key = cursor.read_bytes()?;
        let primary_lock = cursor.read_bytes()?;
        let has_short = cursor.read_u8()? == 1;
        let short = cursor.read_bytes()?;
        Ok(Self {
            key,
            primary_lock,
            lock_ts,
            ttl,
            for_update_ts,
            lock_type,
            short_value: has_short.then_some(short),
        })
    }
}

/// A committed write (or rollback marker) for one user key version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteInfo {
    pub op: WriteOp,
    /// Start timestamp of the transaction that produced this record.
    pub start_ts: u64,
    pub short_value: Option<Vec<u8>>,
}

impl WriteInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(1 + 8 + 1 + 4 + self.short_value.as_ref().map_or(0, |v| v.len()));
        buf.push(self.op as u8);
        buf.extend_from_slice(&self.start_ts.to_le_bytes());
        match &self.short_value {
            Some(v) => {
                buf.push(1);
                buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
                buf.extend_from_slice(v);
            }
            None => {
                buf.push(0);
                buf.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        buf
    }

    pub fn decode(raw: &[u8]) -> Result<Self, EngineError> {
        let mut cursor = Cursor::new(raw, CF_NAME_WRITE);
        let op = WriteOp::from_byte(cursor.read_u8()?)
            .ok_or_else(|| corruption(CF_NAME_WRITE, raw, "unknown write op"))?;
        let start_ts = cursor.read_u64()?;
        let has_short = cursor.read_u8()? == 1;
        let short = cursor.read_bytes()?;
        Ok(Self {
            op,
            start_ts,
            short_value: has_short.then_some(short),
        })
    }
}

/// One mutation of a prewrite batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    Lock { key: Vec<u8> },
}

impl Mutation {
    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } | Mutation::Lock { key } => key,
        }
    }

    pub fn lock_type(&self) -> LockType {
        match self {
            Mutation::Put { .. } => LockType::Put,
            Mutation::Delete { .. } => LockType::Delete,
            Mutation::Lock { .. } => LockType::Lock,
        }
    }
}

/// Per-request transaction outcome reported back to the client alongside any
/// data. Locked keys are collected here rather than failing the request, so
/// the caller can resolve the locks and retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnResultInfo {
    pub locked: Vec<LockInfo>,
}

impl TxnResultInfo {
    pub fn is_empty(&self) -> bool {
        self.locked.is_empty()
    }
}

const CF_NAME_LOCK: &str = "lock";
const CF_NAME_WRITE: &str = "write";

fn corruption(cf: &str, raw: &[u8], reason: &str) -> EngineError {
    EngineError::Corruption {
        cf: if cf == CF_NAME_LOCK { "lock" } else { "write" },
        key: raw.to_vec(),
        reason: reason.to_string(),
    }
}

/// Bounds-checked little-endian reader over a record payload.
struct Cursor<'a> {
    raw: &'a [u8],
    offset: usize,
    cf: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(raw: &'a [u8], cf: &'a str) -> Self {
        Self { raw, offset: 0, cf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], EngineError> {
        if self.raw.len() < self.offset + n {
            return Err(corruption(self.cf, self.raw, "truncated record"));
        }
        let slice = &self.raw[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, EngineError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, EngineError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64, EngineError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, EngineError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_info_roundtrip() {
        let lock = LockInfo {
            key: b"k1".to_vec(),
            primary_lock: b"k0".to_vec(),
            lock_ts: 10,
            ttl: 3000,
            for_update_ts: 0,
            lock_type: LockType::Put,
            short_value: Some(b"v".to_vec()),
        };
        assert_eq!(LockInfo::decode(&lock.encode()).unwrap(), lock);

        let bare = LockInfo {
            short_value: None,
            lock_type: LockType::Delete,
            ..lock
        };
        assert_eq!(LockInfo::decode(&bare.encode()).unwrap(), bare);
    }

    #[test]
    fn write_info_roundtrip() {
        for op in [WriteOp::Put, WriteOp::Delete, WriteOp::Rollback, WriteOp::Lock] {
            let info = WriteInfo {
                op,
                start_ts: 77,
                short_value: (op == WriteOp::Put).then(|| b"inline".to_vec()),
            };
            assert_eq!(WriteInfo::decode(&info.encode()).unwrap(), info);
        }
    }

    #[test]
    fn truncated_records_are_corruption() {
        let lock = LockInfo {
            key: b"k".to_vec(),
            primary_lock: b"k".to_vec(),
            lock_ts: 1,
            ttl: 1,
            for_update_ts: 0,
            lock_type: LockType::Put,
            short_value: None,
        };
        let enc = lock.encode();
        assert!(LockInfo::decode(&enc[..enc.len() - 3]).is_err());
        assert!(WriteInfo::decode(&[9]).is_err());
    }
}
