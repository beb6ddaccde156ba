//! Slot record types and their stable on-disk encoding.
//!
//! Values are encoded by hand rather than through a reflective serializer so
//! the format stays portable across rewrites (spec.md §9): every field is a
//! length-prefixed byte string, read back in the same order it was written.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One metric definition inside a slot's monitoring config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetricEntry {
    pub name: String,
    pub hostname: String,
}

/// Opaque-to-the-registry monitoring config, preserved across rebinds and
/// addressed by stable alias once `SetMetricConfig` stamps each entry's
/// `hostname`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetricConfig {
    pub metrics: Vec<MetricEntry>,
}

/// Value stored at each `ag-{alias}` key.
///
/// A slot is Empty when both `instance_id` and `ip` are empty strings, and
/// Bound otherwise (invariant 3 in spec.md §3: no half-bound state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InstanceData {
    pub instance_id: String,
    pub ip: String,
    pub metric_config: MetricConfig,
}

impl InstanceData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty_slot(&self) -> bool {
        self.instance_id.is_empty()
    }

    /// Encode as a sequence of length-prefixed fields:
    /// `instance_id | ip | metric_count | (name | hostname)*`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_str(&mut buf, &self.instance_id);
        write_str(&mut buf, &self.ip);
        buf.extend_from_slice(&(self.metric_config.metrics.len() as u32).to_be_bytes());
        for entry in &self.metric_config.metrics {
            write_str(&mut buf, &entry.name);
            write_str(&mut buf, &entry.hostname);
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;
        let instance_id = read_str(bytes, &mut cursor)?;
        let ip = read_str(bytes, &mut cursor)?;
        let count = read_u32(bytes, &mut cursor)? as usize;
        let mut metrics = Vec::with_capacity(count);
        for _ in 0..count {
            let name = read_str(bytes, &mut cursor)?;
            let hostname = read_str(bytes, &mut cursor)?;
            metrics.push(MetricEntry { name, hostname });
        }
        Ok(Self {
            instance_id,
            ip,
            metric_config: MetricConfig { metrics },
        })
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > bytes.len() {
        return Err(Error::StorageError("truncated slot record".into()));
    }
    let v = u32::from_be_bytes(bytes[*cursor..*cursor + 4].try_into().unwrap());
    *cursor += 4;
    Ok(v)
}

fn read_str(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u32(bytes, cursor)? as usize;
    if *cursor + len > bytes.len() {
        return Err(Error::StorageError("truncated slot record".into()));
    }
    let s = String::from_utf8(bytes[*cursor..*cursor + len].to_vec())
        .map_err(|e| Error::StorageError(format!("invalid utf8 in slot record: {e}")))?;
    *cursor += len;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_empty() {
        let data = InstanceData::empty();
        assert!(data.is_empty_slot());
        let decoded = InstanceData::decode(&data.encode()).unwrap();
        assert_eq!(data, decoded);
    }

    #[test]
    fn roundtrip_bound_with_metrics() {
        let data = InstanceData {
            instance_id: "i-aaaaaa".into(),
            ip: "192.0.2.11".into(),
            metric_config: MetricConfig {
                metrics: vec![
                    MetricEntry { name: "cpu".into(), hostname: "old-alias".into() },
                    MetricEntry { name: "mem".into(), hostname: "old-alias".into() },
                ],
            },
        };
        let decoded = InstanceData::decode(&data.encode()).unwrap();
        assert_eq!(data, decoded);
        assert!(!decoded.is_empty_slot());
    }

    #[test]
    fn decode_truncated_errors() {
        let bytes = [0u8, 0, 0, 5, b'h', b'i'];
        assert!(InstanceData::decode(&bytes).is_err());
    }
}
