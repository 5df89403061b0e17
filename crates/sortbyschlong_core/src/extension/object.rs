//! Reference-counted extension object handed to the host.
//!
//! # Responsibility
//! - Own one [`ExtensionInstance`] behind an atomic reference count.
//! - Route every host call through [`at_host_boundary`].
//!
//! # Invariants
//! - An object starts with one reference and is destroyed exactly once, by
//!   whichever release brings the count to zero, on any thread.
//! - Module counters see one `instance_created` per allocation and one
//!   `instance_destroyed` per destruction.
//! - Allocation failure is reported, never aborts the process.
//!
//! The layout is `#[repr(C)]` with `header` first so a native shim can put
//! its dispatch tables there and recover the object from an interface
//! pointer.

use crate::boundary::at_host_boundary;
use crate::error::{HostError, HostResult};
use crate::extension::capability::{Capability, Initializable, InterfaceId, MenuContributor};
use crate::extension::command_string::{CommandStringKind, TextBuffer};
use crate::extension::context::ActivationContext;
use crate::extension::instance::{
    ContributeRequest, ExtensionEnv, ExtensionInstance, InvocationRequest,
};
use crate::lifecycle::ModuleCounters;
use log::debug;
use std::alloc::{self, Layout};
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Host-visible object: native header, reference count and instance state.
#[repr(C)]
pub struct ExtensionObject<H = ()> {
    header: H,
    ref_count: AtomicU32,
    counters: &'static ModuleCounters,
    instance: Mutex<ExtensionInstance>,
}

impl<H> ExtensionObject<H> {
    /// Allocates a new object holding one reference.
    pub(crate) fn allocate(
        header: H,
        counters: &'static ModuleCounters,
        env: Arc<ExtensionEnv>,
    ) -> HostResult<InstanceRef<H>> {
        let layout = Layout::new::<Self>();
        // SAFETY: layout has non-zero size (the object always holds an atomic).
        let raw = unsafe { alloc::alloc(layout) }.cast::<Self>();
        let ptr = NonNull::new(raw).ok_or(HostError::AllocationFailure)?;
        // SAFETY: `ptr` is freshly allocated for `Self` and uninitialized.
        unsafe {
            ptr.as_ptr().write(Self {
                header,
                ref_count: AtomicU32::new(1),
                counters,
                instance: Mutex::new(ExtensionInstance::new(env)),
            });
        }
        let active = counters.instance_created();
        debug!(
            "event=instance_create module=object status=ok active_instances={}",
            active
        );
        Ok(InstanceRef { ptr })
    }

    pub fn header(&self) -> &H {
        &self.header
    }

    /// Current reference count; only meaningful for diagnostics.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Runs `f` with exclusive access to the instance state.
    ///
    /// A lock poisoned by a caught panic is taken over as is.
    pub fn with_instance<R>(&self, f: impl FnOnce(&mut ExtensionInstance) -> R) -> R {
        let mut guard = self.instance.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Selects one capability view of this object.
    pub fn query_capability(&self, id: InterfaceId) -> Option<Capability<'_>> {
        let capability = match id {
            InterfaceId::Base => Capability::Base,
            InterfaceId::Initializable => Capability::Initializable(self),
            InterfaceId::MenuContributor => Capability::MenuContributor(self),
        };
        Some(capability)
    }

    /// Adds one reference; returns the new count.
    ///
    /// # Safety
    /// `this` must point to a live object.
    pub unsafe fn retain_raw(this: *const Self) -> u32 {
        (*this).ref_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drops one reference; destroys the object when it was the last one.
    /// Returns the new count.
    ///
    /// # Safety
    /// `this` must point to a live object and the caller must own one of its
    /// references. `this` must not be used after the count reaches zero.
    pub unsafe fn release_raw(this: *const Self) -> u32 {
        let previous = (*this).ref_count.fetch_sub(1, Ordering::Release);
        if previous != 1 {
            return previous - 1;
        }
        // Pairs with the release decrements of every other owner.
        fence(Ordering::Acquire);
        Self::destroy(this as *mut Self);
        0
    }

    unsafe fn destroy(this: *mut Self) {
        let counters = (*this).counters;
        ptr::drop_in_place(this);
        alloc::dealloc(this.cast::<u8>(), Layout::new::<Self>());
        let active = counters.instance_destroyed();
        debug!(
            "event=instance_destroy module=object status=ok active_instances={}",
            active
        );
    }
}

impl<H> Initializable for ExtensionObject<H> {
    fn activate(&self, context: ActivationContext) -> HostResult<()> {
        let result = at_host_boundary("activate", Err(HostError::HostApiFailure), || {
            self.with_instance(|instance| instance.activate(context))
        });
        if result.is_err() {
            self.with_instance(ExtensionInstance::reset);
        }
        result
    }
}

impl<H> MenuContributor for ExtensionObject<H> {
    fn contribute_menu(&self, request: ContributeRequest) -> u32 {
        at_host_boundary("contribute_menu", 0, || {
            self.with_instance(|instance| instance.contribute_menu(request))
        })
    }

    fn describe_command(
        &self,
        id: u32,
        kind: CommandStringKind,
        buffer: &mut TextBuffer<'_>,
    ) -> HostResult<usize> {
        at_host_boundary("describe_command", Err(HostError::HostApiFailure), || {
            self.with_instance(|instance| instance.describe_command(id, kind, buffer))
        })
    }

    fn invoke(&self, request: &InvocationRequest) -> HostResult<()> {
        at_host_boundary("invoke", Err(HostError::HostApiFailure), || {
            self.with_instance(|instance| instance.invoke(request))
        })
    }
}

/// Owned reference to an [`ExtensionObject`].
///
/// `Clone` retains, `Drop` releases. Native shims convert to and from raw
/// pointers with [`InstanceRef::into_raw`] / [`InstanceRef::from_raw`].
pub struct InstanceRef<H = ()> {
    ptr: NonNull<ExtensionObject<H>>,
}

// SAFETY: the count is atomic and the instance state sits behind a mutex;
// the header is only shared, so it must itself be shareable.
unsafe impl<H: Send + Sync> Send for InstanceRef<H> {}
unsafe impl<H: Send + Sync> Sync for InstanceRef<H> {}

impl<H> InstanceRef<H> {
    /// Gives up ownership of this reference without releasing it.
    pub fn into_raw(self) -> *mut ExtensionObject<H> {
        ManuallyDrop::new(self).ptr.as_ptr()
    }

    /// Takes ownership of one reference previously leaked by `into_raw` or
    /// added by `retain_raw`.
    ///
    /// # Safety
    /// `ptr` must point to a live object and the caller must own the
    /// reference being transferred.
    pub unsafe fn from_raw(ptr: *mut ExtensionObject<H>) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    pub fn as_ptr(&self) -> *const ExtensionObject<H> {
        self.ptr.as_ptr()
    }
}

impl<H> Deref for InstanceRef<H> {
    type Target = ExtensionObject<H>;

    fn deref(&self) -> &Self::Target {
        // SAFETY: holding an `InstanceRef` keeps the object alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl<H> Clone for InstanceRef<H> {
    fn clone(&self) -> Self {
        // SAFETY: `self` owns a reference, so the object is live.
        unsafe {
            ExtensionObject::retain_raw(self.ptr.as_ptr());
        }
        Self { ptr: self.ptr }
    }
}

impl<H> Drop for InstanceRef<H> {
    fn drop(&mut self) {
        // SAFETY: `self` owns exactly one reference and is not used again.
        unsafe {
            ExtensionObject::release_raw(self.ptr.as_ptr());
        }
    }
}
