//! Typed wrappers around raw JNI pointers
//!
//! Every wrapper is non-null. Constructing one is `unsafe` because the JNI
//! runtime dereferences the pointer later; the rest of the bridge then works
//! with safe, `Copy` values.

use jni::sys::{_jmethodID, _jobject, JNIEnv, JavaVM};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

/// The process-wide Java VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct VmHandle(NonNull<JavaVM>);

// The invocation interface is callable from any thread.
unsafe impl Send for VmHandle {}
unsafe impl Sync for VmHandle {}

impl VmHandle {
    /// Wrap a raw `JavaVM*`, returning `None` for NULL.
    ///
    /// # Safety
    /// A non-null pointer must point to a live VM for the rest of the process.
    pub unsafe fn from_raw(ptr: *mut JavaVM) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw `JavaVM*`
    pub fn as_raw(self) -> *mut JavaVM {
        self.0.as_ptr()
    }
}

/// A thread's `JNIEnv*`.
///
/// Not `Send`: an environment is only valid on the thread it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EnvHandle(NonNull<JNIEnv>);

impl EnvHandle {
    /// Wrap a raw `JNIEnv*`, returning `None` for NULL.
    ///
    /// # Safety
    /// A non-null pointer must be the environment of the calling thread.
    pub unsafe fn from_raw(ptr: *mut JNIEnv) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw `JNIEnv*`
    pub fn as_raw(self) -> *mut JNIEnv {
        self.0.as_ptr()
    }
}

/// A Java object reference (local or global).
///
/// Only global references may be shared across threads. The bridge stores
/// nothing but global references; local references it returns belong to the
/// caller's current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectRef(NonNull<_jobject>);

unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    /// Wrap a raw `jobject`, returning `None` for NULL.
    ///
    /// # Safety
    /// A non-null pointer must be a valid reference for the VM it is used with.
    pub unsafe fn from_raw(ptr: jni::sys::jobject) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw `jobject`
    pub fn as_raw(self) -> jni::sys::jobject {
        self.0.as_ptr()
    }
}

/// A class reference; classes are ordinary objects in JNI.
pub type ClassRef = ObjectRef;

/// A resolved method identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MethodId(NonNull<_jmethodID>);

// Method IDs stay valid while their class is loaded, on every thread.
unsafe impl Send for MethodId {}
unsafe impl Sync for MethodId {}

impl MethodId {
    /// Wrap a raw `jmethodID`, returning `None` for NULL.
    ///
    /// # Safety
    /// A non-null pointer must come from `GetMethodID`/`GetStaticMethodID`.
    pub unsafe fn from_raw(ptr: jni::sys::jmethodID) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw `jmethodID`
    pub fn as_raw(self) -> jni::sys::jmethodID {
        self.0.as_ptr()
    }
}

/// A lazily filled class cache entry, typically a `static`.
///
/// Filled at most once with a global reference. Concurrent first fills may
/// both resolve; the first compare-and-swap wins.
#[derive(Debug, Default)]
pub struct ClassSlot(AtomicPtr<_jobject>);

impl ClassSlot {
    /// Create an empty slot
    pub const fn new() -> Self {
        Self(AtomicPtr::new(ptr::null_mut()))
    }

    /// Cached class, if any
    pub fn get(&self) -> Option<ClassRef> {
        NonNull::new(self.0.load(Ordering::Acquire)).map(ObjectRef)
    }

    /// Store `class` if the slot is empty.
    ///
    /// Returns `Err(winner)` when another thread filled the slot first.
    pub(crate) fn fill(&self, class: ClassRef) -> Result<ClassRef, ClassRef> {
        match self.0.compare_exchange(
            ptr::null_mut(),
            class.as_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(class),
            Err(existing) => match NonNull::new(existing) {
                Some(winner) => Err(ObjectRef(winner)),
                None => Ok(class),
            },
        }
    }
}

/// A lazily filled method identifier cache entry
#[derive(Debug, Default)]
pub struct MethodSlot(AtomicPtr<_jmethodID>);

impl MethodSlot {
    /// Create an empty slot
    pub const fn new() -> Self {
        Self(AtomicPtr::new(ptr::null_mut()))
    }

    /// Cached method identifier, if any
    pub fn get(&self) -> Option<MethodId> {
        NonNull::new(self.0.load(Ordering::Acquire)).map(MethodId)
    }

    /// Store `method` if the slot is empty and return whichever ID won.
    pub(crate) fn fill(&self, method: MethodId) -> MethodId {
        match self.0.compare_exchange(
            ptr::null_mut(),
            method.as_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => method,
            Err(existing) => NonNull::new(existing).map_or(method, MethodId),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_object(addr: usize) -> ObjectRef {
        unsafe { ObjectRef::from_raw(addr as jni::sys::jobject).unwrap() }
    }

    #[test]
    fn test_null_pointers_are_rejected() {
        unsafe {
            assert!(VmHandle::from_raw(ptr::null_mut()).is_none());
            assert!(EnvHandle::from_raw(ptr::null_mut()).is_none());
            assert!(ObjectRef::from_raw(ptr::null_mut()).is_none());
            assert!(MethodId::from_raw(ptr::null_mut()).is_none());
        }
    }

    #[test]
    fn test_class_slot_first_fill_wins() {
        let slot = ClassSlot::new();
        assert!(slot.get().is_none());

        let first = fake_object(0x1000);
        let second = fake_object(0x2000);

        assert_eq!(slot.fill(first), Ok(first));
        assert_eq!(slot.fill(second), Err(first));
        assert_eq!(slot.get(), Some(first));
    }

    #[test]
    fn test_method_slot_keeps_first_id() {
        let slot = MethodSlot::new();
        let a = unsafe { MethodId::from_raw(0x10 as jni::sys::jmethodID).unwrap() };
        let b = unsafe { MethodId::from_raw(0x20 as jni::sys::jmethodID).unwrap() };

        assert_eq!(slot.fill(a), a);
        assert_eq!(slot.fill(b), a);
        assert_eq!(slot.get(), Some(a));
    }
}
