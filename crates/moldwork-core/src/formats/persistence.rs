//! # Persistence Format
//!
//! Binary serialization for molds and configs in canonical form.
//!
//! Format: Header (6 bytes) + postcard-serialized canonical tree.
//! - 4 bytes: Magic ("MOLD")
//! - 1 byte: Version
//! - 1 byte: Payload kind (1 = mold, 2 = config)
//!
//! Sizes and the header are checked before the payload is decoded, so a
//! corrupted or hostile blob is rejected without allocating for it.

use crate::canonical::{CanonicalConfig, CanonicalMold};
use crate::primitives;
use crate::types::{MoldError, MoldResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

const HEADER_SIZE: usize = 6;

// =============================================================================
// FILE HEADER
// =============================================================================

/// What a persisted blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Mold,
    Config,
}

impl PayloadKind {
    fn tag(self) -> u8 {
        match self {
            PayloadKind::Mold => 1,
            PayloadKind::Config => 2,
        }
    }

    fn from_tag(tag: u8) -> MoldResult<Self> {
        match tag {
            1 => Ok(PayloadKind::Mold),
            2 => Ok(PayloadKind::Config),
            other => Err(MoldError::InvalidContext(format!(
                "unknown payload kind {}",
                other
            ))),
        }
    }
}

/// The persistence header precedes every payload.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub kind: PayloadKind,
}

impl PersistenceHeader {
    #[must_use]
    pub fn new(kind: PayloadKind) -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
            kind,
        }
    }

    /// Validate the header against the expected payload kind.
    pub fn validate(&self, expected: PayloadKind) -> MoldResult<()> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(MoldError::InvalidContext("invalid magic bytes".to_string()));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(MoldError::InvalidContext(format!(
                "unsupported format version {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        if self.kind != expected {
            return Err(MoldError::WrongContext(format!(
                "payload holds a {:?}, expected a {:?}",
                self.kind, expected
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[5] = self.kind.tag();
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> MoldResult<Self> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(MoldError::InvalidContext("header too short".to_string()));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
            kind: PayloadKind::from_tag(header[5])?,
        })
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

fn encode<T: Serialize>(kind: PayloadKind, value: &T) -> MoldResult<Vec<u8>> {
    let payload =
        postcard::to_stdvec(value).map_err(|e| MoldError::InternalError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new(kind).to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

fn decode<T: DeserializeOwned>(kind: PayloadKind, bytes: &[u8]) -> MoldResult<T> {
    if bytes.len() < HEADER_SIZE {
        return Err(MoldError::InvalidContext(format!(
            "data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > primitives::MAX_PAYLOAD_SIZE {
        return Err(MoldError::InvalidContext(format!(
            "data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            primitives::MAX_PAYLOAD_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate(kind)?;

    postcard::from_bytes(&bytes[HEADER_SIZE..])
        .map_err(|e| MoldError::InvalidContext(format!("failed to decode payload: {}", e)))
}

/// Serialize a mold (header + payload).
pub fn mold_to_bytes(mold: &CanonicalMold) -> MoldResult<Vec<u8>> {
    encode(PayloadKind::Mold, mold)
}

/// Deserialize a mold. The header and size limits are checked first.
pub fn mold_from_bytes(bytes: &[u8]) -> MoldResult<CanonicalMold> {
    decode(PayloadKind::Mold, bytes)
}

/// Serialize a config (header + payload).
pub fn config_to_bytes(config: &CanonicalConfig) -> MoldResult<Vec<u8>> {
    encode(PayloadKind::Config, config)
}

/// Deserialize a config. The header and size limits are checked first.
pub fn config_from_bytes(bytes: &[u8]) -> MoldResult<CanonicalConfig> {
    decode(PayloadKind::Config, bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{
        CanonicalDefault, CanonicalKeyval, CanonicalRestriction, ConfigElement, MoldElement,
    };
    use crate::restriction::RestrictionRule;
    use crate::types::{Value, ValueType, Version, VersionWindow};

    fn mold() -> CanonicalMold {
        CanonicalMold {
            version: Version::new(1, 2, 0),
            documentation: Vec::new(),
            elements: vec![MoldElement::Keyval(CanonicalKeyval {
                name: "ratio".to_string(),
                window: VersionWindow::default(),
                value_type: Some(ValueType::Float),
                defaults: vec![CanonicalDefault {
                    introduced: Version::INITIAL,
                    value: Value::Float(0.5),
                }],
                restrictions: vec![CanonicalRestriction {
                    window: VersionWindow::since(Version::new(1, 2, 0)),
                    rule: RestrictionRule::Range { min: 0.0, max: 1.0 },
                    documentation: Vec::new(),
                }],
                documentation: Vec::new(),
                renamed_from: None,
            })],
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = PersistenceHeader::new(PayloadKind::Config);
        let restored = PersistenceHeader::from_bytes(&header.to_bytes()).expect("parse header");

        assert_eq!(restored.magic, *primitives::MAGIC_BYTES);
        assert_eq!(restored.version, primitives::FORMAT_VERSION);
        assert_eq!(restored.kind, PayloadKind::Config);
    }

    #[test]
    fn bytes_roundtrip_bit_exact() {
        let bytes1 = mold_to_bytes(&mold()).expect("first serialize");
        let restored = mold_from_bytes(&bytes1).expect("deserialize");
        assert_eq!(restored, mold());
        let bytes2 = mold_to_bytes(&restored).expect("second serialize");
        assert_eq!(bytes1, bytes2, "save -> load -> save must produce identical bytes");
    }

    #[test]
    fn config_is_not_a_mold() {
        let config = CanonicalConfig {
            version: Version::INITIAL,
            elements: vec![ConfigElement::Keyval {
                name: "ratio".to_string(),
                value: Some(Value::Float(0.25)),
            }],
        };
        let bytes = config_to_bytes(&config).expect("serialize");
        assert_eq!(config_from_bytes(&bytes).expect("deserialize"), config);

        let err = mold_from_bytes(&bytes).expect_err("kind mismatch");
        assert!(matches!(err, MoldError::WrongContext(_)));
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        bytes[5] = 1;
        assert!(matches!(mold_from_bytes(&bytes), Err(MoldError::InvalidContext(_))));
    }

    #[test]
    fn truncated_payload_rejected() {
        let bytes = mold_to_bytes(&mold()).expect("serialize");
        assert!(mold_from_bytes(&bytes[..bytes.len() - 3]).is_err());
        assert!(mold_from_bytes(&bytes[..4]).is_err());
    }
}
