//! provisiond library
//!
//! Bare-metal node provisioning: a provision state machine, a conductor that
//! drives nodes through it against pluggable hardware backends, and an HTTP
//! API with microversion negotiation.

pub mod api;
pub mod backend;
pub mod cli;
pub mod conductor;
pub mod config;
pub mod error;
pub mod fsm;
pub mod node;
pub mod patch;
pub mod registry;
pub mod states;
pub mod version;

// Re-export main types for convenience
pub use backend::{BackendError, DriverRegistry, FakeBackend, HardwareBackend};
pub use conductor::{Conductor, ConductorSettings};
pub use config::ServiceConfig;
pub use error::{ProvisionError, Result};
pub use fsm::{ProvisionMachine, Transition, TransitionError};
pub use node::{NewNode, Node};
pub use registry::{NodeFilter, NodeRegistry};
pub use states::{BootDevice, Event, PowerState, PowerTarget, ProvisionAction, ProvisionState};
pub use version::{ApiVersion, Feature, VersionError};
