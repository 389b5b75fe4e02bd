//! Tagged union over every entity kind held in the resource graph

use super::fabric::{Endpoint, Fabric, Port, Switch, Zone};
use super::node::ComposedNode;
use super::storage::{Drive, SimpleStorage, Storage, Volume};
use super::system::{Chassis, ComputerSystem, EthernetInterface, Memory, Processor};
use super::types::ResourceId;
use serde::{Deserialize, Serialize};

/// Any resource-graph entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    ComputerSystem(ComputerSystem),
    Processor(Processor),
    Memory(Memory),
    EthernetInterface(EthernetInterface),
    Chassis(Chassis),
    SimpleStorage(SimpleStorage),
    Storage(Storage),
    Drive(Drive),
    Volume(Volume),
    Fabric(Fabric),
    Switch(Switch),
    Port(Port),
    Endpoint(Endpoint),
    Zone(Zone),
    ComposedNode(ComposedNode),
}

/// Typed view over one `Resource` variant
pub trait Entity: Clone + Send + Sync + 'static {
    /// Human-readable kind, used in errors and logs
    const KIND: &'static str;

    fn id(&self) -> &ResourceId;
    fn from_resource(resource: &Resource) -> Option<&Self>;
    fn into_resource(self) -> Resource;
}

macro_rules! impl_entity {
    ($($variant:ident => $kind:literal),+ $(,)?) => {
        $(
            impl Entity for $variant {
                const KIND: &'static str = $kind;

                fn id(&self) -> &ResourceId {
                    &self.id
                }

                fn from_resource(resource: &Resource) -> Option<&Self> {
                    match resource {
                        Resource::$variant(e) => Some(e),
                        _ => None,
                    }
                }

                fn into_resource(self) -> Resource {
                    Resource::$variant(self)
                }
            }
        )+

        impl Resource {
            pub fn id(&self) -> &ResourceId {
                match self {
                    $(Resource::$variant(e) => &e.id,)+
                }
            }

            pub fn kind(&self) -> &'static str {
                match self {
                    $(Resource::$variant(_) => $kind,)+
                }
            }
        }
    };
}

impl_entity! {
    ComputerSystem => "Computer system",
    Processor => "Processor",
    Memory => "Memory",
    EthernetInterface => "Ethernet interface",
    Chassis => "Chassis",
    SimpleStorage => "Simple storage",
    Storage => "Storage",
    Drive => "Drive",
    Volume => "Volume",
    Fabric => "Fabric",
    Switch => "Switch",
    Port => "Port",
    Endpoint => "Endpoint",
    Zone => "Zone",
    ComposedNode => "Composed node",
}
