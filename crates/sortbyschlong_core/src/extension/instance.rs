//! Extension instance state machine.
//!
//! # Responsibility
//! - Track activation, the live command-id range and dispatch invocations.
//!
//! # Invariants
//! - At most one live [`CommandIdRange`]; each contribution call drops the
//!   previous one before building, even if the build then fails.
//! - Lookups outside the live range fail with no side effects.
//! - The range only counts items actually appended to the native menu.
//!
//! Calls on one instance are serialized by the host (apartment threading);
//! this type is plain `&mut self` state and does not catch panics itself.

use crate::catalog::CommandCatalog;
use crate::error::{HostError, HostResult};
use crate::extension::command_string::{CommandStringKind, TextBuffer};
use crate::extension::context::{ActivationContext, InvocationSite, DEFAULT_QUALIFYING_SITES};
use crate::launcher::ActionLauncher;
use crate::menu::builder::COMMAND_ID_CEILING;
use crate::menu::{MenuBackend, MenuBuilder, MenuHandle, MenuStrategy};
use log::{debug, info, warn};
use std::sync::Arc;

/// Host flag: only the default (double-click) verb is wanted.
pub const CONTRIBUTE_DEFAULT_ONLY: u32 = 0x0000_0001;

/// Collaborators and policy shared by every instance a factory creates.
pub struct ExtensionEnv {
    catalog: Arc<CommandCatalog>,
    menu_backend: Arc<dyn MenuBackend>,
    launcher: Arc<dyn ActionLauncher>,
    strategy: MenuStrategy,
    qualifying_sites: Vec<InvocationSite>,
}

impl ExtensionEnv {
    pub fn new(
        catalog: Arc<CommandCatalog>,
        menu_backend: Arc<dyn MenuBackend>,
        launcher: Arc<dyn ActionLauncher>,
    ) -> Self {
        Self {
            catalog,
            menu_backend,
            launcher,
            strategy: MenuStrategy::default(),
            qualifying_sites: DEFAULT_QUALIFYING_SITES.to_vec(),
        }
    }

    pub fn with_strategy(mut self, strategy: MenuStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_qualifying_sites(mut self, sites: Vec<InvocationSite>) -> Self {
        self.qualifying_sites = sites;
        self
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn strategy(&self) -> &MenuStrategy {
        &self.strategy
    }

    pub fn qualifying_sites(&self) -> &[InvocationSite] {
        &self.qualifying_sites
    }
}

/// Protocol state of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Uninitialized,
    Activated,
    MenuContributed,
    /// Only observable from inside an invocation.
    Dispatching,
}

/// Identifiers handed out by the most recent successful contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandIdRange {
    first: u32,
    commands: Vec<usize>,
}

impl CommandIdRange {
    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn count(&self) -> u32 {
        self.commands.len() as u32
    }

    /// Offset of `id` inside the range.
    pub fn offset_of(&self, id: u32) -> Option<usize> {
        let offset = id.checked_sub(self.first)? as usize;
        (offset < self.commands.len()).then_some(offset)
    }

    /// Catalog logical index behind `offset`.
    pub fn logical_index(&self, offset: usize) -> Option<usize> {
        self.commands.get(offset).copied()
    }
}

/// Arguments of one menu contribution call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributeRequest {
    pub menu: MenuHandle,
    pub insertion_hint: u32,
    pub id_first: u32,
    pub id_last: u32,
    pub flags: u32,
}

impl ContributeRequest {
    pub fn is_default_only(&self) -> bool {
        self.flags & CONTRIBUTE_DEFAULT_ONLY != 0
    }
}

/// Invocation as requested by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationRequest {
    /// Offset into the most recent command range.
    Index(u32),
    /// String verb; never supported.
    Verb(String),
}

/// One host-driven extension instance.
pub struct ExtensionInstance {
    env: Arc<ExtensionEnv>,
    state: InstanceState,
    context: Option<ActivationContext>,
    qualifies_for_menu: bool,
    command_ids: Option<CommandIdRange>,
}

impl ExtensionInstance {
    pub fn new(env: Arc<ExtensionEnv>) -> Self {
        Self {
            env,
            state: InstanceState::Uninitialized,
            context: None,
            qualifies_for_menu: false,
            command_ids: None,
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn context(&self) -> Option<&ActivationContext> {
        self.context.as_ref()
    }

    pub fn qualifies_for_menu(&self) -> bool {
        self.qualifies_for_menu
    }

    pub fn command_ids(&self) -> Option<&CommandIdRange> {
        self.command_ids.as_ref()
    }

    /// Drops all activation-derived state; back to `Uninitialized`.
    pub fn reset(&mut self) {
        self.state = InstanceState::Uninitialized;
        self.context = None;
        self.qualifies_for_menu = false;
        self.command_ids = None;
    }

    /// Records the activation context. Repeated calls start over.
    pub fn activate(&mut self, context: ActivationContext) -> HostResult<()> {
        self.reset();
        self.qualifies_for_menu = context.qualifies(self.env.qualifying_sites());
        self.context = Some(context);
        self.state = InstanceState::Activated;
        debug!(
            "event=activate module=instance status=ok site={} qualifies={}",
            context.site.as_str(),
            self.qualifies_for_menu
        );
        Ok(())
    }

    /// Contributes menu entries; returns the number of identifiers consumed.
    pub fn contribute_menu(&mut self, request: ContributeRequest) -> u32 {
        if request.is_default_only() {
            debug!(
                "event=contribute_menu module=instance status=skip reason={}",
                HostError::DefaultOnlyQuery.as_str()
            );
            return 0;
        }
        if !self.qualifies_for_menu {
            debug!("event=contribute_menu module=instance status=skip reason=not_qualifying");
            return 0;
        }

        // Ids from an earlier menu die with any new request, even a rejected one.
        self.command_ids = None;
        self.state = InstanceState::Activated;

        let backend = self.env.menu_backend.as_ref();
        if request.menu.is_null() || !backend.is_menu(request.menu) {
            warn!(
                "event=contribute_menu module=instance status=skip reason={} menu={:#x}",
                HostError::InvalidHandle.as_str(),
                request.menu.as_raw()
            );
            return 0;
        }
        if request.id_first >= COMMAND_ID_CEILING || request.id_last < request.id_first {
            warn!(
                "event=contribute_menu module=instance status=skip reason={} id_first={} id_last={}",
                HostError::OutOfRange.as_str(),
                request.id_first,
                request.id_last
            );
            return 0;
        }

        let builder = MenuBuilder::new(backend, &self.env.strategy);
        match builder.build(
            request.menu,
            &self.env.catalog,
            request.id_first,
            request.id_last,
        ) {
            Ok(built) => {
                let consumed = built.consumed();
                info!(
                    "event=contribute_menu module=instance status=ok strategy={} insertion_hint={} first_id={} last_id={} consumed={}",
                    self.env.strategy.as_str(),
                    request.insertion_hint,
                    built.first_id,
                    built.last_id,
                    consumed
                );
                self.command_ids = Some(CommandIdRange {
                    first: built.first_id,
                    commands: built.commands,
                });
                self.state = InstanceState::MenuContributed;
                consumed
            }
            Err(err) => {
                warn!(
                    "event=contribute_menu module=instance status=error error={}",
                    err
                );
                0
            }
        }
    }

    /// Answers a verb / help text / validate query for `id`.
    ///
    /// Returns the number of text units written (0 for validate).
    pub fn describe_command(
        &self,
        id: u32,
        kind: CommandStringKind,
        buffer: &mut TextBuffer<'_>,
    ) -> HostResult<usize> {
        let (offset, logical_index) = self.resolve(id)?;
        let command = self
            .env
            .catalog
            .get(logical_index)
            .ok_or(HostError::OutOfRange)?;

        let text = match kind {
            CommandStringKind::Validate => return Ok(0),
            CommandStringKind::VerbNarrow | CommandStringKind::VerbWide => command.verb_key(),
            CommandStringKind::HelpNarrow | CommandStringKind::HelpWide => command.help_text(),
            CommandStringKind::Unknown(raw) => {
                debug!(
                    "event=describe_command module=instance status=error reason=unknown_kind raw={:#x}",
                    raw
                );
                return Err(HostError::UnsupportedRequest);
            }
        };
        if kind.is_wide() != Some(buffer.is_wide()) {
            return Err(HostError::UnsupportedRequest);
        }

        let written = buffer.write_terminated(text)?;
        debug!(
            "event=describe_command module=instance status=ok offset={} kind={} units={}",
            offset,
            kind.as_str(),
            written
        );
        Ok(written)
    }

    /// Dispatches an invocation to the action launcher.
    ///
    /// A failed launch is logged and still reported as success: the feature
    /// is cosmetic and a host error dialog would be worse than nothing.
    pub fn invoke(&mut self, request: &InvocationRequest) -> HostResult<()> {
        let offset = match request {
            InvocationRequest::Verb(verb) => {
                debug!(
                    "event=invoke module=instance status=error reason={} verb={:?}",
                    HostError::UnsupportedVerbForm.as_str(),
                    verb
                );
                return Err(HostError::UnsupportedVerbForm);
            }
            InvocationRequest::Index(offset) => *offset,
        };

        let range = self.command_ids.as_ref().ok_or(HostError::OutOfRange)?;
        let id = range
            .first()
            .checked_add(offset)
            .ok_or(HostError::OutOfRange)?;
        let (_, logical_index) = self.resolve(id)?;
        let command = self
            .env
            .catalog
            .get(logical_index)
            .ok_or(HostError::OutOfRange)?;

        let previous = self.state;
        self.state = InstanceState::Dispatching;
        let started = self.env.launcher.launch(command.verb_key());
        self.state = previous;

        if started {
            info!(
                "event=invoke module=instance status=ok key={}",
                command.verb_key()
            );
        } else {
            warn!(
                "event=invoke module=instance status=degraded key={} reason=launch_failed",
                command.verb_key()
            );
        }
        Ok(())
    }

    fn resolve(&self, id: u32) -> HostResult<(usize, usize)> {
        let range = self.command_ids.as_ref().ok_or(HostError::OutOfRange)?;
        let offset = range.offset_of(id).ok_or(HostError::OutOfRange)?;
        let logical_index = range.logical_index(offset).ok_or(HostError::OutOfRange)?;
        Ok((offset, logical_index))
    }
}
