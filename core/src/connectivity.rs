use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Answers "can we reach the backend right now". Repositories consult this on
/// every call; connectivity flips between calls on mobile, so implementations
/// must not memoize beyond what the platform connectivity feed itself does.
pub trait NetworkOracle: Send + Sync {
    fn is_online(&self) -> bool;
}

/// For platforms without a connectivity feed, and for tests of the online
/// paths.
#[derive(Debug, Default)]
pub struct AlwaysOnline;

impl NetworkOracle for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Shared flag flipped by the platform's connectivity callback.
#[derive(Debug)]
pub struct OnlineFlag {
    online: AtomicBool,
}

impl OnlineFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl NetworkOracle for OnlineFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}
