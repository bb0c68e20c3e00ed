//! Thread-local environment manager
//!
//! Each OS thread keeps its own `JNIEnv*` per bridge. The first request on a
//! thread attaches it to the VM; later requests return the cached handle.
//! Threads never read each other's slots, so there is nothing to lock.
//! Threads are not detached when they exit: call
//! [`Bridge::detach_current_thread`] before a worker thread finishes if the
//! VM should forget it. Only threads the bridge attached itself can be
//! detached that way; environments handed over by the host or by VM creation
//! belong to their owners.

use crate::bridge::{Bridge, BridgeId};
use crate::error::{BridgeError, BridgeResult};
use crate::handle::EnvHandle;
use crate::runtime::JavaRuntime;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// A thread's cached environment
#[derive(Debug, Clone, Copy)]
struct Slot {
    env: EnvHandle,
    /// Set when the bridge attached the thread itself
    owned: bool,
}

thread_local! {
    static ATTACHED: RefCell<FxHashMap<BridgeId, Slot>> = RefCell::new(FxHashMap::default());
}

fn slot(bridge: BridgeId) -> Option<Slot> {
    ATTACHED
        .try_with(|slots| slots.borrow().get(&bridge).copied())
        .ok()
        .flatten()
}

fn store(bridge: BridgeId, slot: Slot) {
    let _ = ATTACHED.try_with(|slots| {
        slots.borrow_mut().insert(bridge, slot);
    });
}

/// Cached environment of the calling thread for `bridge`.
///
/// Returns `None` while the thread-local storage is being torn down.
pub(crate) fn cached(bridge: BridgeId) -> Option<EnvHandle> {
    slot(bridge).map(|slot| slot.env)
}

/// Cache an environment the calling thread already had, such as the host
/// thread running the initialization callback or the thread that created
/// the VM. The bridge never detaches these.
pub(crate) fn seed(bridge: BridgeId, env: EnvHandle) {
    store(bridge, Slot { env, owned: false });
}

/// Drop the calling thread's cached environment if the bridge attached it
fn forget_owned(bridge: BridgeId) -> Option<EnvHandle> {
    ATTACHED
        .try_with(|slots| {
            let mut slots = slots.borrow_mut();
            match slots.get(&bridge) {
                Some(slot) if slot.owned => slots.remove(&bridge).map(|slot| slot.env),
                _ => None,
            }
        })
        .ok()
        .flatten()
}

impl<R: JavaRuntime> Bridge<R> {
    /// The calling thread's environment, attaching the thread on first use.
    ///
    /// Fails with [`BridgeError::Uninitialized`] without touching the VM when
    /// none is registered. Attaching blocks on VM internals, once per thread.
    pub fn env(&self) -> BridgeResult<EnvHandle> {
        let vm = self.vm().ok_or(BridgeError::Uninitialized)?;

        if let Some(env) = cached(self.id()) {
            return Ok(env);
        }

        match self.runtime().attach_current_thread(vm) {
            Ok(env) => {
                store(self.id(), Slot { env, owned: true });
                jvm_debug!("Attached thread {:?} to the Java VM", std::thread::current().id());
                Ok(env)
            }
            Err(code) => {
                jvm_error!(
                    "Could not attach thread {:?} to the Java VM (code {})",
                    std::thread::current().id(),
                    code
                );
                Err(BridgeError::AttachFailed(code))
            }
        }
    }

    /// Whether the calling thread has a cached environment
    pub fn is_thread_attached(&self) -> bool {
        cached(self.id()).is_some()
    }

    /// Detach the calling thread and drop its cached environment.
    ///
    /// Returns `true` if the VM detached the thread. Only a thread attached by
    /// [`Bridge::env`] is detached; host threads and the thread that created
    /// the VM keep their environment. Any local references the thread still
    /// holds become invalid.
    pub fn detach_current_thread(&self) -> bool {
        let Some(vm) = self.vm() else {
            return false;
        };
        if forget_owned(self.id()).is_none() {
            return false;
        }
        match self.runtime().detach_current_thread(vm) {
            Ok(()) => true,
            Err(code) => {
                jvm_warn!("DetachCurrentThread failed with code {}", code);
                false
            }
        }
    }
}
