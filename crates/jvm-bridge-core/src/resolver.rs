//! Class and method resolution
//!
//! Classes are resolved with the strategy the registry selected at
//! initialization:
//! - **Classloader**: `classLoader.loadClass(binaryName)`, needed inside a
//!   managed host where `FindClass` from a native thread only sees the
//!   system class space
//! - **Direct lookup**: `FindClass(internalName)`
//!
//! Names are accepted dotted (`java.lang.String`) or slashed
//! (`java/lang/String`). On failure the pending Java exception is described
//! and then re-thrown, so the caller can still inspect it.

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{ClassRef, ClassSlot, EnvHandle, MethodId, MethodSlot, ObjectRef};
use crate::registry::{EmbeddingContext, ResolutionStrategy};
use crate::runtime::JavaRuntime;
use std::ffi::CString;

const LOAD_CLASS: &str = "loadClass";
const LOAD_CLASS_SIG: &str = "(Ljava/lang/String;)Ljava/lang/Class;";

/// `java.lang.String` form expected by `ClassLoader.loadClass`
fn binary_name(name: &str) -> BridgeResult<CString> {
    to_c_name(name, name.replace('/', "."))
}

/// `java/lang/String` form expected by `FindClass`
fn internal_name(name: &str) -> BridgeResult<CString> {
    to_c_name(name, name.replace('.', "/"))
}

fn to_c_name(original: &str, converted: String) -> BridgeResult<CString> {
    if converted.is_empty() {
        return Err(BridgeError::InvalidClassName(original.to_string()));
    }
    CString::new(converted).map_err(|_| BridgeError::InvalidClassName(original.to_string()))
}

fn c_string(value: &str) -> BridgeResult<CString> {
    CString::new(value).map_err(|_| BridgeError::Jni("NUL byte in member name or signature"))
}

impl<R: JavaRuntime> Bridge<R> {
    /// Resolve a class by name.
    ///
    /// The result is a local reference in the calling thread's current frame.
    pub fn load_class(&self, name: &str) -> BridgeResult<ClassRef> {
        let env = self.env()?;
        self.resolve_class(env, name)
    }

    /// Resolve `name` into `slot` unless the slot is already filled.
    ///
    /// The stored class is a global reference and outlives the calling frame.
    /// When threads race on an empty slot, the first store wins and the
    /// others release their reference and return the winner.
    pub fn load_class_into(&self, slot: &ClassSlot, name: &str) -> BridgeResult<ClassRef> {
        if let Some(class) = slot.get() {
            return Ok(class);
        }

        let env = self.env()?;
        let local = self.resolve_class(env, name)?;
        let global = self.runtime().new_global_ref(env, local);
        self.runtime().delete_local_ref(env, local);
        let global = global.ok_or(BridgeError::Jni("NewGlobalRef(class)"))?;

        match slot.fill(global) {
            Ok(class) => Ok(class),
            Err(winner) => {
                self.runtime().delete_global_ref(env, global);
                Ok(winner)
            }
        }
    }

    /// Resolve an instance method ID into `slot` unless already filled
    pub fn load_method(
        &self,
        class: ClassRef,
        slot: &MethodSlot,
        name: &str,
        signature: &str,
    ) -> BridgeResult<MethodId> {
        self.fill_method(class, slot, name, signature, false)
    }

    /// Resolve a static method ID into `slot` unless already filled
    pub fn load_static_method(
        &self,
        class: ClassRef,
        slot: &MethodSlot,
        name: &str,
        signature: &str,
    ) -> BridgeResult<MethodId> {
        self.fill_method(class, slot, name, signature, true)
    }

    /// The calling thread's pending Java exception, as a new local reference
    pub fn pending_fault(&self) -> Option<ObjectRef> {
        let env = self.env().ok()?;
        self.runtime().exception_occurred(env)
    }

    /// Clear the calling thread's pending Java exception
    pub fn clear_fault(&self) {
        if let Ok(env) = self.env() {
            self.runtime().exception_clear(env);
        }
    }

    fn resolve_class(&self, env: EnvHandle, name: &str) -> BridgeResult<ClassRef> {
        let class = match self.strategy() {
            ResolutionStrategy::ClassLoader(ctx) => self.load_through_class_loader(env, ctx, name)?,
            ResolutionStrategy::DirectLookup => {
                let internal = internal_name(name)?;
                self.runtime().find_class(env, &internal)
            }
        };

        class.ok_or_else(|| {
            jvm_error!("Could not load class {}", name);
            self.surface_fault(env);
            BridgeError::ClassNotFound(name.to_string())
        })
    }

    fn load_through_class_loader(
        &self,
        env: EnvHandle,
        ctx: EmbeddingContext,
        name: &str,
    ) -> BridgeResult<Option<ClassRef>> {
        let load_class = self.load_class_method(env, ctx.class_loader)?;
        let binary = binary_name(name)?;
        let jname = self
            .runtime()
            .new_string_utf(env, &binary)
            .ok_or(BridgeError::Jni("NewStringUTF"))?;

        let class = self
            .runtime()
            .call_object_method(env, ctx.class_loader, load_class, &[jname]);
        self.runtime().delete_local_ref(env, jname);
        Ok(class)
    }

    /// `ClassLoader.loadClass`, resolved on first use and memoized.
    fn load_class_method(&self, env: EnvHandle, loader: ObjectRef) -> BridgeResult<MethodId> {
        if let Some(method) = self.registry().load_class_method() {
            return Ok(method);
        }

        let loader_class = self
            .runtime()
            .object_class(env, loader)
            .ok_or(BridgeError::Jni("GetObjectClass(classLoader)"))?;
        let method = self.runtime().method_id(
            env,
            loader_class,
            &c_string(LOAD_CLASS)?,
            &c_string(LOAD_CLASS_SIG)?,
        );
        self.runtime().delete_local_ref(env, loader_class);

        match method {
            Some(method) => Ok(self.registry().store_load_class_method(method)),
            None => {
                self.surface_fault(env);
                Err(BridgeError::MethodNotFound {
                    name: LOAD_CLASS.to_string(),
                    signature: LOAD_CLASS_SIG.to_string(),
                })
            }
        }
    }

    fn fill_method(
        &self,
        class: ClassRef,
        slot: &MethodSlot,
        name: &str,
        signature: &str,
        is_static: bool,
    ) -> BridgeResult<MethodId> {
        if let Some(method) = slot.get() {
            return Ok(method);
        }

        let env = self.env()?;
        let c_name = c_string(name)?;
        let c_sig = c_string(signature)?;
        let method = if is_static {
            self.runtime().static_method_id(env, class, &c_name, &c_sig)
        } else {
            self.runtime().method_id(env, class, &c_name, &c_sig)
        };

        match method {
            Some(method) => Ok(slot.fill(method)),
            None => {
                jvm_error!("Could not find method {}{}", name, signature);
                self.surface_fault(env);
                Err(BridgeError::MethodNotFound {
                    name: name.to_string(),
                    signature: signature.to_string(),
                })
            }
        }
    }

    /// Describe the pending exception and leave it pending.
    ///
    /// `ExceptionDescribe` clears the exception, so it is thrown again.
    fn surface_fault(&self, env: EnvHandle) {
        let Some(throwable) = self.runtime().exception_occurred(env) else {
            return;
        };
        self.runtime().exception_describe(env);
        if !self.runtime().throw(env, throwable) {
            jvm_warn!("Could not restore the pending exception after describing it");
        }
        self.runtime().delete_local_ref(env, throwable);
    }
}
