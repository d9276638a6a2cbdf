//! Lazy, single-flight installation of a connection's bindings.

use async_lock::OnceCell;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    binding::Bindings,
    config::BindingMode,
    detect::{SdkDetector, SdkStyle},
    sdk::StoreHandle,
};

/// Lifecycle of a [`LazyBinder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
    Unbound,
    Binding,
    Bound,
}

/// Binds a store handle to one of the SDK conventions on first use.
///
/// The bindings are written once and never replaced. Concurrent callers that
/// arrive while binding is in progress wait for the same initialization.
#[derive(Debug)]
pub struct LazyBinder {
    handle: Arc<dyn StoreHandle>,
    mode: BindingMode,
    started: AtomicBool,
    bindings: OnceCell<Bindings>,
}

impl LazyBinder {
    pub fn new(handle: Arc<dyn StoreHandle>, mode: BindingMode) -> Self {
        Self {
            handle,
            mode,
            started: AtomicBool::new(false),
            bindings: OnceCell::new(),
        }
    }

    pub fn handle(&self) -> &Arc<dyn StoreHandle> {
        &self.handle
    }

    pub fn state(&self) -> BinderState {
        if self.bindings.is_initialized() {
            BinderState::Bound
        } else if self.started.load(Ordering::Acquire) {
            BinderState::Binding
        } else {
            BinderState::Unbound
        }
    }

    /// The installed bindings, if binding has completed.
    pub fn bindings(&self) -> Option<&Bindings> {
        self.bindings.get()
    }

    /// Returns the bindings, binding first if necessary. Never fails: when no
    /// convention can be bound, degraded bindings are installed.
    pub async fn ensure_bound(&self) -> &Bindings {
        self.bindings
            .get_or_init(|| async {
                self.started.store(true, Ordering::Release);
                let bindings = self.bind().await;
                log::debug!("installed {} bindings ({:?} mode)", bindings.name(), self.mode);
                bindings
            })
            .await
    }

    async fn bind(&self) -> Bindings {
        match self.mode {
            BindingMode::Detect => {
                if let Some(server) = self.probe_server() {
                    return server;
                }
                self.load_client_or_fallback().await
            }
            BindingMode::PreferClient => self.load_client_or_fallback().await,
            BindingMode::ForceServer => match self.handle.chained() {
                Some(sdk) => Bindings::Server(sdk),
                None => {
                    log::warn!("server-style binding forced but the handle has no chained surface");
                    Bindings::Degraded(None)
                }
            },
        }
    }

    fn probe_server(&self) -> Option<Bindings> {
        match SdkDetector::detect(self.handle.as_ref()) {
            SdkStyle::Server => self.handle.chained().map(Bindings::Server),
            SdkStyle::Client => None,
        }
    }

    async fn load_client_or_fallback(&self) -> Bindings {
        match self.handle.load_client().await {
            Ok(sdk) => Bindings::Client(sdk),
            Err(error) => {
                log::warn!("failed to load the client SDK: {error}");
                if let Some(server) = self.probe_server() {
                    return server;
                }
                log::warn!("no SDK convention matched the store handle; installing degraded bindings");
                Bindings::Degraded(self.handle.chained())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{OrmError, OrmResult},
        sdk::{ClientSdk, HandleCapabilities, ServerSdk},
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct FailingHandle {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl StoreHandle for FailingHandle {
        fn capabilities(&self) -> HandleCapabilities {
            HandleCapabilities::default()
        }

        fn chained(&self) -> Option<Arc<dyn ServerSdk>> {
            None
        }

        async fn load_client(&self) -> OrmResult<Arc<dyn ClientSdk>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Err(OrmError::Initialization("module not found".into()))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_load_installs_degraded_once() {
        let handle = Arc::new(FailingHandle::default());
        let binder = LazyBinder::new(handle.clone(), BindingMode::Detect);
        assert_eq!(binder.state(), BinderState::Unbound);

        assert!(binder.ensure_bound().await.is_degraded());
        assert!(binder.ensure_bound().await.is_degraded());
        assert_eq!(binder.state(), BinderState::Bound);
        assert_eq!(handle.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn force_server_skips_the_client_load() {
        let handle = Arc::new(FailingHandle::default());
        let binder = LazyBinder::new(handle.clone(), BindingMode::ForceServer);

        assert!(matches!(binder.ensure_bound().await, Bindings::Degraded(None)));
        assert_eq!(handle.loads.load(Ordering::SeqCst), 0);
    }
}
