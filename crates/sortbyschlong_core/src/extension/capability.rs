//! Capability sets an extension object exposes to the host.
//!
//! One object carries both sets; the host selects a view with
//! `query_capability` and may hold both views at once.

use crate::error::HostResult;
use crate::extension::command_string::{CommandStringKind, TextBuffer};
use crate::extension::context::ActivationContext;
use crate::extension::instance::{ContributeRequest, InvocationRequest};
use std::fmt::{Debug, Formatter};

/// Capability identifiers the host can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceId {
    /// Identity / lifetime view every object answers to.
    Base,
    Initializable,
    MenuContributor,
}

impl InterfaceId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Initializable => "initializable",
            Self::MenuContributor => "menu_contributor",
        }
    }
}

/// Activation half of the host contract.
pub trait Initializable {
    /// Records where the menu was opened. Repeatable; every call starts over.
    fn activate(&self, context: ActivationContext) -> HostResult<()>;
}

/// Menu half of the host contract.
pub trait MenuContributor {
    /// Returns the number of command identifiers consumed (0 on any skip).
    fn contribute_menu(&self, request: ContributeRequest) -> u32;

    /// Writes verb or help text for `id` into `buffer`; returns units written.
    fn describe_command(
        &self,
        id: u32,
        kind: CommandStringKind,
        buffer: &mut TextBuffer<'_>,
    ) -> HostResult<usize>;

    fn invoke(&self, request: &InvocationRequest) -> HostResult<()>;
}

/// Borrowed view returned by a capability query.
pub enum Capability<'a> {
    Base,
    Initializable(&'a dyn Initializable),
    MenuContributor(&'a dyn MenuContributor),
}

impl Capability<'_> {
    pub fn interface_id(&self) -> InterfaceId {
        match self {
            Self::Base => InterfaceId::Base,
            Self::Initializable(_) => InterfaceId::Initializable,
            Self::MenuContributor(_) => InterfaceId::MenuContributor,
        }
    }
}

impl Debug for Capability<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Capability")
            .field(&self.interface_id())
            .finish()
    }
}
