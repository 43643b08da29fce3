//! Capability bitstrings.
//!
//! A responder advertises what it supports as a string of two-character
//! flags. The flag for capability `id` starts at offset `id * 2` and the
//! capability is supported exactly when that flag is `"01"`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

const SUPPORTED: &str = "01";
const UNSUPPORTED: &str = "00";

/// Numeric capability identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityType(pub u32);

impl CapabilityType {
    pub const VOLUMES: Self = Self(20);
    pub const VOLUME_CREATE: Self = Self(21);
    pub const VOLUME_RESIZE: Self = Self(22);
    pub const VOLUME_REPLICATE: Self = Self(23);
    pub const VOLUME_REPLICATE_CLONE: Self = Self(24);
    pub const VOLUME_REPLICATE_COPY: Self = Self(25);
    pub const VOLUME_REPLICATE_MIRROR_ASYNC: Self = Self(26);
    pub const VOLUME_REPLICATE_MIRROR_SYNC: Self = Self(27);
    pub const VOLUME_COPY_RANGE_BLOCK_SIZE: Self = Self(28);
    pub const VOLUME_COPY_RANGE: Self = Self(29);
    pub const VOLUME_COPY_RANGE_CLONE: Self = Self(30);
    pub const VOLUME_COPY_RANGE_COPY: Self = Self(31);
    pub const VOLUME_DELETE: Self = Self(33);
    pub const VOLUME_ENABLE: Self = Self(34);
    pub const VOLUME_DISABLE: Self = Self(35);
    pub const VOLUME_MASK: Self = Self(36);
    pub const VOLUME_UNMASK: Self = Self(37);
    pub const ACCESS_GROUPS: Self = Self(38);
    pub const ACCESS_GROUP_CREATE_WWPN: Self = Self(39);
    pub const ACCESS_GROUP_DELETE: Self = Self(40);
    pub const ACCESS_GROUP_INITIATOR_ADD_WWPN: Self = Self(41);
    pub const ACCESS_GROUP_INITIATOR_DELETE: Self = Self(42);
    pub const VOLUMES_ACCESSIBLE_BY_ACCESS_GROUP: Self = Self(43);
    pub const ACCESS_GROUPS_GRANTED_TO_VOLUME: Self = Self(44);
    pub const VOLUME_CHILD_DEPENDENCY: Self = Self(45);
    pub const VOLUME_CHILD_DEPENDENCY_RM: Self = Self(46);
    pub const ACCESS_GROUP_CREATE_ISCSI_IQN: Self = Self(47);
    pub const ACCESS_GROUP_INITIATOR_ADD_ISCSI_IQN: Self = Self(48);
    pub const VOLUME_ISCSI_CHAP_AUTHENTICATION: Self = Self(53);
    pub const VOLUME_RAID_INFO: Self = Self(54);
    pub const VOLUME_THIN: Self = Self(55);
    pub const BATTERIES: Self = Self(56);
    pub const VOLUME_CACHE_INFO: Self = Self(57);
    pub const VOLUME_PHYSICAL_DISK_CACHE_SET: Self = Self(58);
    pub const VOLUME_PHYSICAL_DISK_CACHE_SET_SYSTEM_LEVEL: Self = Self(59);
    pub const VOLUME_WRITE_CACHE_POLICY_SET_WRITE_BACK: Self = Self(60);
    pub const VOLUME_WRITE_CACHE_POLICY_SET_AUTO: Self = Self(61);
    pub const VOLUME_WRITE_CACHE_POLICY_SET_WRITE_THROUGH: Self = Self(62);
    pub const VOLUME_WRITE_CACHE_POLICY_SET_IMPACT_READ: Self = Self(63);
    pub const VOLUME_WRITE_CACHE_POLICY_SET_WB_IMPACT_OTHER: Self = Self(64);
    pub const VOLUME_READ_CACHE_POLICY_SET: Self = Self(65);
    pub const VOLUME_READ_CACHE_POLICY_SET_IMPACT_WRITE: Self = Self(66);
    pub const FS: Self = Self(100);
    pub const FS_DELETE: Self = Self(101);
    pub const FS_RESIZE: Self = Self(102);
    pub const FS_CREATE: Self = Self(103);
    pub const FS_CLONE: Self = Self(104);
    pub const FILE_CLONE: Self = Self(105);
    pub const FS_SNAPSHOTS: Self = Self(106);
    pub const FS_SNAPSHOT_CREATE: Self = Self(107);
    pub const FS_SNAPSHOT_DELETE: Self = Self(109);
    pub const FS_SNAPSHOT_RESTORE: Self = Self(110);
    pub const FS_SNAPSHOT_RESTORE_SPECIFIC_FILES: Self = Self(111);
    pub const FS_CHILD_DEPENDENCY: Self = Self(112);
    pub const FS_CHILD_DEPENDENCY_RM: Self = Self(113);
    pub const FS_CHILD_DEPENDENCY_RM_SPECIFIC_FILES: Self = Self(114);
    pub const EXPORT_AUTH: Self = Self(120);
    pub const EXPORTS: Self = Self(121);
    pub const EXPORT_FS: Self = Self(122);
    pub const EXPORT_REMOVE: Self = Self(123);
    pub const EXPORT_CUSTOM_PATH: Self = Self(124);
    pub const SYS_READ_CACHE_PCT_UPDATE: Self = Self(158);
    pub const SYS_READ_CACHE_PCT_GET: Self = Self(159);
    pub const SYS_FW_VERSION_GET: Self = Self(160);
    pub const SYS_MODE_GET: Self = Self(161);
    pub const DISK_LOCATION: Self = Self(163);
    pub const DISK_RPM: Self = Self(164);
    pub const DISK_LINK_TYPE: Self = Self(165);
    pub const VOLUME_LED: Self = Self(171);
    pub const TARGET_PORTS: Self = Self(216);
    pub const DISKS: Self = Self(220);
    pub const POOL_MEMBER_INFO: Self = Self(221);
    pub const VOLUME_RAID_CREATE: Self = Self(222);
    pub const DISK_VPD83_GET: Self = Self(223);

    /// Byte offset of this capability's flag in the capability string.
    pub fn offset(self) -> usize {
        self.0 as usize * 2
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CapabilityType {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Capability bitstring returned by the `capabilities` method.
///
/// ```text
/// {"class": "Capabilities", "cap": "0000...0101..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default = "Capabilities::class_name")]
    pub class: String,
    pub cap: String,
}

impl Capabilities {
    fn class_name() -> String {
        "Capabilities".to_string()
    }

    /// Wraps a raw capability string.
    pub fn new(cap: impl Into<String>) -> Self {
        Self {
            class: Self::class_name(),
            cap: cap.into(),
        }
    }

    /// Builds a capability string with exactly the given capabilities set.
    ///
    /// The string is long enough to hold the highest capability id.
    pub fn from_supported(supported: &[CapabilityType]) -> Self {
        let slots = supported.iter().map(|c| c.0 as usize + 1).max().unwrap_or(0);
        let mut cap = UNSUPPORTED.repeat(slots);
        for capability in supported {
            let offset = capability.offset();
            cap.replace_range(offset..offset + 2, SUPPORTED);
        }
        Self::new(cap)
    }

    /// Returns true if the capability is supported.
    ///
    /// An id whose flag lies past the end of the string is an error rather
    /// than "unsupported".
    pub fn is_supported(&self, capability: CapabilityType) -> ProtocolResult<bool> {
        let offset = capability.offset();
        self.cap
            .get(offset..offset + 2)
            .map(|flag| flag == SUPPORTED)
            .ok_or(ProtocolError::CapabilityOutOfRange {
                capability: capability.0,
                len: self.cap.len() / 2,
            })
    }

    /// Returns true if every listed capability is supported.
    ///
    /// Stops at the first unsupported capability; an empty list is trivially
    /// supported.
    pub fn is_supported_all(&self, capabilities: &[CapabilityType]) -> ProtocolResult<bool> {
        for capability in capabilities {
            if !self.is_supported(*capability)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_offsets() {
        let caps = Capabilities::new("000001");
        assert!(!caps.is_supported(CapabilityType(0)).unwrap());
        assert!(!caps.is_supported(CapabilityType(1)).unwrap());
        assert!(caps.is_supported(CapabilityType(2)).unwrap());
    }

    #[test]
    fn only_exact_01_is_supported() {
        let caps = Capabilities::new("10110001");
        assert!(!caps.is_supported(CapabilityType(0)).unwrap());
        assert!(!caps.is_supported(CapabilityType(1)).unwrap());
        assert!(!caps.is_supported(CapabilityType(2)).unwrap());
        assert!(caps.is_supported(CapabilityType(3)).unwrap());
    }

    #[test]
    fn out_of_range_is_an_error() {
        let caps = Capabilities::new("0101");
        let result = caps.is_supported(CapabilityType::VOLUMES);
        assert!(matches!(
            result,
            Err(ProtocolError::CapabilityOutOfRange {
                capability: 20,
                len: 2
            })
        ));

        let caps = Capabilities::new("01010");
        assert!(caps.is_supported(CapabilityType(2)).is_err());
    }

    #[test]
    fn supported_all() {
        let caps = Capabilities::from_supported(&[
            CapabilityType::VOLUMES,
            CapabilityType::VOLUME_CREATE,
            CapabilityType::FS,
        ]);
        assert!(
            caps.is_supported_all(&[CapabilityType::VOLUMES, CapabilityType::FS])
                .unwrap()
        );
        assert!(
            !caps
                .is_supported_all(&[CapabilityType::VOLUMES, CapabilityType::VOLUME_DELETE])
                .unwrap()
        );
        assert!(caps.is_supported_all(&[]).unwrap());
        assert!(
            caps.is_supported_all(&[CapabilityType::VOLUMES, CapabilityType::DISKS])
                .is_err()
        );
    }

    #[test]
    fn supported_all_stops_at_first_unsupported() {
        let caps = Capabilities::from_supported(&[CapabilityType(1)]);
        // Capability 0 is unsupported, so the out-of-range id is never checked.
        assert!(
            !caps
                .is_supported_all(&[CapabilityType(0), CapabilityType(999)])
                .unwrap()
        );
    }

    #[test]
    fn from_supported_layout() {
        let caps = Capabilities::from_supported(&[CapabilityType(0), CapabilityType(3)]);
        assert_eq!(caps.cap, "01000001");
        assert_eq!(Capabilities::from_supported(&[]).cap, "");
    }

    #[test]
    fn capabilities_json() {
        let parsed: Capabilities = serde_json::from_str(r#"{"class":"Capabilities","cap":"0001"}"#).unwrap();
        assert!(parsed.is_supported(CapabilityType(1)).unwrap());

        let parsed: Capabilities = serde_json::from_str(r#"{"cap":"01"}"#).unwrap();
        assert_eq!(parsed.class, "Capabilities");
    }
}
