//! Linear ownership of module-side resources.
//!
//! A [`Handle`] is an opaque integer the module hands out (an address or an
//! id). The host never interprets it, it only passes it back into exports.
//! [`OwnedHandle`] pairs a handle with the action that destroys the resource
//! and makes sure that action runs at most once: on an explicit [`drop`], or
//! as a last resort when the wrapper itself goes out of scope while still
//! owned.
//!
//! [`drop`]: OwnedHandle::drop

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::BridgeError;

/// Opaque reference to a resource living inside the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Reinterprets a wasm32 `i32` return value.
    pub const fn from_abi(raw: i32) -> Self {
        Self(raw as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Representation passed back into wasm32 exports.
    pub const fn to_abi(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Owned,
    Moved,
    Dropped,
}

/// Destructor for a module-side resource.
pub type Release = Box<dyn FnOnce(Handle) -> Result<(), BridgeError> + Send>;

struct Ownership {
    state: HandleState,
    // Present only while `Owned`. Taking it out is what makes release single-shot.
    release: Option<Release>,
}

/// A [`Handle`] plus its release action, enforcing borrow / move / drop rules.
///
/// All operations take `&self` so the wrapper can be shared with the bridge
/// that polls it; misuse is reported as an error instead of being prevented
/// statically, because the handle's lifetime is decided by the module.
pub struct OwnedHandle {
    handle: Handle,
    inner: Mutex<Ownership>,
}

impl OwnedHandle {
    pub fn new<F>(handle: Handle, release: F) -> Self
    where
        F: FnOnce(Handle) -> Result<(), BridgeError> + Send + 'static,
    {
        Self {
            handle,
            inner: Mutex::new(Ownership {
                state: HandleState::Owned,
                release: Some(Box::new(release)),
            }),
        }
    }

    pub fn state(&self) -> HandleState {
        self.lock().state
    }

    /// Returns the handle for the duration of a call, leaving ownership intact.
    pub fn borrow(&self) -> Result<Handle, BridgeError> {
        match self.lock().state {
            HandleState::Owned => Ok(self.handle),
            HandleState::Moved => Err(BridgeError::UseAfterMove),
            HandleState::Dropped => Err(BridgeError::UseAfterFree),
        }
    }

    /// Gives the handle away. The receiver (usually an export that consumes
    /// its argument) becomes responsible for destroying it.
    pub fn move_out(&self) -> Result<Handle, BridgeError> {
        let release = {
            let mut inner = self.lock();
            match inner.state {
                HandleState::Owned => {}
                HandleState::Moved => return Err(BridgeError::UseAfterMove),
                HandleState::Dropped => return Err(BridgeError::UseAfterFree),
            }
            inner.state = HandleState::Moved;
            inner.release.take()
        };
        // Discarded without running.
        drop(release);
        Ok(self.handle)
    }

    /// Moves ownership, release action included, into a fresh wrapper.
    pub fn transfer(&self) -> Result<OwnedHandle, BridgeError> {
        let mut inner = self.lock();
        match inner.state {
            HandleState::Owned => {}
            HandleState::Moved => return Err(BridgeError::UseAfterMove),
            HandleState::Dropped => return Err(BridgeError::UseAfterFree),
        }
        inner.state = HandleState::Moved;
        let release = inner.release.take();
        Ok(OwnedHandle {
            handle: self.handle,
            inner: Mutex::new(Ownership {
                state: HandleState::Owned,
                release,
            }),
        })
    }

    /// Destroys the resource. The state flips to `Dropped` before the release
    /// action runs, so a failing release still counts as the one drop.
    pub fn drop(&self) -> Result<(), BridgeError> {
        let release = {
            let mut inner = self.lock();
            match inner.state {
                HandleState::Owned => {}
                HandleState::Moved => return Err(BridgeError::DropAfterMove),
                HandleState::Dropped => return Err(BridgeError::DoubleFree),
            }
            inner.state = HandleState::Dropped;
            inner.release.take()
        };
        match release {
            Some(release) => release(self.handle),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ownership> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state != HandleState::Owned {
            return;
        }
        inner.state = HandleState::Dropped;
        let Some(release) = inner.release.take() else {
            return;
        };
        tracing::debug!(handle = %self.handle, "releasing handle that was never dropped explicitly");
        if let Err(error) = release(self.handle) {
            tracing::error!(handle = %self.handle, %error, "implicit handle release failed");
        }
    }
}
