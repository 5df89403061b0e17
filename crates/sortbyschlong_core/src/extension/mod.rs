//! Host-facing extension object.
//!
//! `instance` holds the protocol state machine, `object` wraps it in the
//! reference-counted shape the host sees, and `capability` names the two
//! views the host can select on it.

pub mod capability;
pub mod command_string;
pub mod context;
pub mod instance;
pub mod object;

pub use capability::{Capability, Initializable, InterfaceId, MenuContributor};
pub use command_string::{CommandStringKind, TextBuffer};
pub use context::{ActivationContext, InvocationSite, DEFAULT_QUALIFYING_SITES};
pub use instance::{
    CommandIdRange, ContributeRequest, ExtensionEnv, ExtensionInstance, InstanceState,
    InvocationRequest, CONTRIBUTE_DEFAULT_ONLY,
};
pub use object::{ExtensionObject, InstanceRef};
