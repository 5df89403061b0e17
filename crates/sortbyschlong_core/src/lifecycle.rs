//! Instance factory and module-wide lifetime counters.
//!
//! # Responsibility
//! - Create extension objects with their first reference.
//! - Count live instances and host lock requests so the module can answer
//!   whether it may be unloaded.
//!
//! # Invariants
//! - Counters never go below zero; an unbalanced decrement saturates and logs.
//! - `can_unload` is true only when both counters are zero.
//! - There is no reset; the module glue owns exactly one `static` instance.

use crate::error::HostError;
use crate::extension::instance::ExtensionEnv;
use crate::extension::object::{ExtensionObject, InstanceRef};
use log::{debug, error};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Live-instance and lock counters for one loaded module.
#[derive(Debug)]
pub struct ModuleCounters {
    active_instances: AtomicUsize,
    active_locks: AtomicUsize,
}

impl Default for ModuleCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleCounters {
    pub const fn new() -> Self {
        Self {
            active_instances: AtomicUsize::new(0),
            active_locks: AtomicUsize::new(0),
        }
    }

    /// Returns the new live-instance count.
    pub fn instance_created(&self) -> usize {
        self.active_instances.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the new live-instance count.
    pub fn instance_destroyed(&self) -> usize {
        saturating_decrement(&self.active_instances, "instance_destroyed")
    }

    /// Returns the new lock count.
    pub fn lock_module(&self) -> usize {
        self.active_locks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the new lock count.
    pub fn unlock_module(&self) -> usize {
        saturating_decrement(&self.active_locks, "unlock_module")
    }

    pub fn active_instances(&self) -> usize {
        self.active_instances.load(Ordering::Acquire)
    }

    pub fn active_locks(&self) -> usize {
        self.active_locks.load(Ordering::Acquire)
    }

    pub fn can_unload(&self) -> bool {
        self.active_instances() == 0 && self.active_locks() == 0
    }
}

fn saturating_decrement(counter: &AtomicUsize, operation: &'static str) -> usize {
    match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
        value.checked_sub(1)
    }) {
        Ok(previous) => previous - 1,
        Err(_) => {
            error!(
                "event=counter_underflow module=lifecycle status=error operation={}",
                operation
            );
            0
        }
    }
}

/// Instance creation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryError {
    /// The host asked for an aggregated object; aggregation is unsupported.
    NoAggregation,
    /// Memory for the object could not be obtained.
    Allocation,
}

impl Display for FactoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAggregation => write!(f, "aggregation is not supported"),
            Self::Allocation => write!(f, "failed to allocate extension instance"),
        }
    }
}

impl Error for FactoryError {}

impl From<FactoryError> for HostError {
    fn from(value: FactoryError) -> Self {
        match value {
            FactoryError::NoAggregation => HostError::InvalidHandle,
            FactoryError::Allocation => HostError::AllocationFailure,
        }
    }
}

/// Creates extension objects that share one environment.
#[derive(Clone)]
pub struct ClassFactory {
    counters: &'static ModuleCounters,
    env: Arc<ExtensionEnv>,
}

impl ClassFactory {
    pub fn new(counters: &'static ModuleCounters, env: Arc<ExtensionEnv>) -> Self {
        Self { counters, env }
    }

    pub fn counters(&self) -> &'static ModuleCounters {
        self.counters
    }

    pub fn env(&self) -> &Arc<ExtensionEnv> {
        &self.env
    }

    /// Creates a plain object holding one reference.
    pub fn create_instance(&self) -> Result<InstanceRef, FactoryError> {
        self.create_instance_with_header((), false)
    }

    /// Creates an object whose native header is `header`.
    ///
    /// `aggregated` reports whether the host passed an outer object.
    pub fn create_instance_with_header<H>(
        &self,
        header: H,
        aggregated: bool,
    ) -> Result<InstanceRef<H>, FactoryError> {
        if aggregated {
            debug!("event=create_instance module=lifecycle status=error reason=no_aggregation");
            return Err(FactoryError::NoAggregation);
        }
        ExtensionObject::allocate(header, self.counters, Arc::clone(&self.env)).map_err(|_| {
            error!("event=create_instance module=lifecycle status=error reason=allocation");
            FactoryError::Allocation
        })
    }

    /// Pins (`true`) or unpins (`false`) the module; returns the lock count.
    pub fn lock_server(&self, lock: bool) -> usize {
        let locks = if lock {
            self.counters.lock_module()
        } else {
            self.counters.unlock_module()
        };
        debug!(
            "event=lock_server module=lifecycle status=ok lock={} active_locks={}",
            lock, locks
        );
        locks
    }
}
