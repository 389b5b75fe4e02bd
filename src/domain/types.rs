//! Shared value types for the pod resource graph

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Resource Identifier
// =============================================================================

/// OData-style identifier of a resource, e.g. `/redfish/v1/Systems/1`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of a member collection below this resource
    pub fn child(&self, segment: &str) -> ResourceId {
        ResourceId(format!("{}/{}", self.0.trim_end_matches('/'), segment))
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for ResourceId {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Enabled,
    Disabled,
    StandbyOffline,
    StandbySpare,
    InTest,
    Starting,
    Absent,
    UnavailableOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Health {
    #[serde(rename = "OK")]
    Ok,
    Warning,
    Critical,
}

/// Redfish-style state and health pair.
///
/// Inventories that omit a status are treated as enabled and healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub state: Option<State>,
    pub health: Option<Health>,
}

impl Default for Status {
    fn default() -> Self {
        Self::enabled()
    }
}

impl Status {
    pub fn new(state: State, health: Health) -> Self {
        Self {
            state: Some(state),
            health: Some(health),
        }
    }

    pub fn enabled() -> Self {
        Self::new(State::Enabled, Health::Ok)
    }

    pub fn is_enabled_and_healthy(&self) -> bool {
        self.state == Some(State::Enabled) && self.health == Some(Health::Ok)
    }

    /// Healthy and either enabled or parked in standby
    pub fn is_available(&self) -> bool {
        self.health == Some(Health::Ok)
            && matches!(self.state, Some(State::Enabled) | Some(State::StandbyOffline))
    }
}

// =============================================================================
// Protocols
// =============================================================================

/// Transport protocol of a fabric, endpoint, or device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "NVMe")]
    Nvme,
    #[serde(rename = "NVMeOverFabrics")]
    NvmeOverFabrics,
    #[serde(rename = "PCIe")]
    Pcie,
    #[serde(rename = "FPGA-oF")]
    FpgaOverFabrics,
    #[serde(rename = "iSCSI")]
    Iscsi,
    #[serde(rename = "SAS")]
    Sas,
    #[serde(rename = "SATA")]
    Sata,
    #[serde(rename = "USB")]
    Usb,
}

impl Protocol {
    /// Protocols an attach request may name
    pub const ATTACHABLE: [Protocol; 4] = [
        Protocol::Nvme,
        Protocol::NvmeOverFabrics,
        Protocol::Pcie,
        Protocol::FpgaOverFabrics,
    ];

    pub fn is_attachable(&self) -> bool {
        Self::ATTACHABLE.contains(self)
    }

    /// Fabrics that expose initiators only through PCIe port topology
    pub fn is_pcie_class(&self) -> bool {
        matches!(self, Protocol::Pcie | Protocol::Nvme)
    }

    pub fn durable_name_format(&self) -> DurableNameFormat {
        match self {
            Protocol::Iscsi => DurableNameFormat::Iqn,
            Protocol::Nvme | Protocol::NvmeOverFabrics => DurableNameFormat::Nqn,
            _ => DurableNameFormat::Uuid,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Nvme => write!(f, "NVMe"),
            Protocol::NvmeOverFabrics => write!(f, "NVMeOverFabrics"),
            Protocol::Pcie => write!(f, "PCIe"),
            Protocol::FpgaOverFabrics => write!(f, "FPGA-oF"),
            Protocol::Iscsi => write!(f, "iSCSI"),
            Protocol::Sas => write!(f, "SAS"),
            Protocol::Sata => write!(f, "SATA"),
            Protocol::Usb => write!(f, "USB"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nvme" => Ok(Protocol::Nvme),
            "nvmeoverfabrics" | "nvme-of" | "nvmeof" => Ok(Protocol::NvmeOverFabrics),
            "pcie" => Ok(Protocol::Pcie),
            "fpga-of" | "fpgaof" | "fpgaoverfabrics" => Ok(Protocol::FpgaOverFabrics),
            "iscsi" => Ok(Protocol::Iscsi),
            "sas" => Ok(Protocol::Sas),
            "sata" => Ok(Protocol::Sata),
            "usb" => Ok(Protocol::Usb),
            other => Err(Error::NotSupported {
                what: format!("protocol '{}'", other),
            }),
        }
    }
}

/// Ethernet transport protocols advertised by a network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportProtocol {
    #[serde(rename = "RoCE")]
    Roce,
    #[serde(rename = "RoCEv2")]
    RoceV2,
    #[serde(rename = "iWARP")]
    Iwarp,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl TransportProtocol {
    pub fn is_rdma(&self) -> bool {
        matches!(
            self,
            TransportProtocol::Roce | TransportProtocol::RoceV2 | TransportProtocol::Iwarp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurableNameFormat {
    #[serde(rename = "iQN")]
    Iqn,
    #[serde(rename = "NQN")]
    Nqn,
    #[serde(rename = "UUID")]
    Uuid,
}

// =============================================================================
// Roles and Kinds
// =============================================================================

/// Role of a fabric endpoint or of an entity connected to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRole {
    Initiator,
    Target,
    Both,
}

impl EntityRole {
    pub fn acts_as_initiator(&self) -> bool {
        matches!(self, EntityRole::Initiator | EntityRole::Both)
    }

    pub fn acts_as_target(&self) -> bool {
        matches!(self, EntityRole::Target | EntityRole::Both)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemType {
    #[default]
    Physical,
    Virtual,
}

/// Trusted platform module interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TpmInterfaceType {
    #[serde(rename = "TPM1_2")]
    Tpm1_2,
    #[serde(rename = "TPM2_0")]
    Tpm2_0,
    #[serde(rename = "TCM1_0")]
    Tcm1_0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorType {
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "GPU")]
    Gpu,
    #[serde(rename = "FPGA")]
    Fpga,
    #[serde(rename = "DSP")]
    Dsp,
    Accelerator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionSet {
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86-64")]
    X86_64,
    #[serde(rename = "IA-64")]
    Ia64,
    #[serde(rename = "ARM-A32")]
    ArmA32,
    #[serde(rename = "ARM-A64")]
    ArmA64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryDeviceType {
    #[serde(rename = "DDR3")]
    Ddr3,
    #[serde(rename = "DDR4")]
    Ddr4,
    #[serde(rename = "DDR4_SDRAM")]
    Ddr4Sdram,
    #[serde(rename = "DDR5")]
    Ddr5,
    #[serde(rename = "LPDDR4")]
    Lpddr4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "HDD")]
    Hdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    UpstreamPort,
    DownstreamPort,
    InterswitchPort,
    ManagementPort,
}
