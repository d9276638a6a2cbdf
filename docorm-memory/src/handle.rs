//! Database handles over an [`InMemoryStore`].
//!
//! A handle's [`HandleFlavour`] decides which surfaces it reports, which is
//! enough to drive every binding outcome without a real SDK.

use async_trait::async_trait;
use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use docorm_core::{
    error::{OrmError, OrmResult},
    sdk::{ClientSdk, HandleCapabilities, ServerSdk, StoreHandle},
};

use crate::{client::InMemoryClient, server::InMemoryServer, store::InMemoryStore};

/// Which SDK surfaces an [`InMemoryHandle`] pretends to have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandleFlavour {
    /// A client-style handle: no chained accessors, the client SDK loads.
    #[default]
    Client,
    /// A server-style handle with chained accessors and settings.
    Server,
    /// Chained accessors only, and the client SDK fails to load.
    Bare,
    /// Nothing works.
    Broken,
}

#[derive(Debug, Clone)]
pub struct InMemoryHandle {
    store: InMemoryStore,
    flavour: HandleFlavour,
    client_loads: Arc<AtomicUsize>,
}

impl InMemoryHandle {
    pub fn new(store: InMemoryStore, flavour: HandleFlavour) -> Self {
        Self { store, flavour, client_loads: Arc::default() }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn flavour(&self) -> HandleFlavour {
        self.flavour
    }

    /// How many times the client SDK was loaded through this handle.
    pub fn client_loads(&self) -> usize {
        self.client_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreHandle for InMemoryHandle {
    fn capabilities(&self) -> HandleCapabilities {
        match self.flavour {
            HandleFlavour::Server => HandleCapabilities { collection: true, document: true, settings: true, serializer: true },
            HandleFlavour::Bare => HandleCapabilities { collection: true, document: true, ..Default::default() },
            HandleFlavour::Client | HandleFlavour::Broken => HandleCapabilities::default(),
        }
    }

    fn chained(&self) -> Option<Arc<dyn ServerSdk>> {
        match self.flavour {
            HandleFlavour::Server | HandleFlavour::Bare => Some(Arc::new(InMemoryServer::new(self.store.clone()))),
            HandleFlavour::Client | HandleFlavour::Broken => None,
        }
    }

    async fn load_client(&self) -> OrmResult<Arc<dyn ClientSdk>> {
        self.client_loads.fetch_add(1, Ordering::SeqCst);
        // Loading is asynchronous in real SDKs; suspend once so concurrent
        // callers overlap.
        YieldNow(false).await;

        match self.flavour {
            HandleFlavour::Client | HandleFlavour::Server => Ok(Arc::new(InMemoryClient::new(self.store.clone()))),
            HandleFlavour::Bare | HandleFlavour::Broken => {
                Err(OrmError::Initialization(format!("client SDK unavailable for {:?} handle", self.flavour)))
            }
        }
    }
}

struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docorm_core::detect::{SdkDetector, SdkStyle};

    #[test]
    fn flavours_classify_as_expected() {
        let store = InMemoryStore::new();
        assert_eq!(SdkDetector::detect(&store.handle(HandleFlavour::Server)), SdkStyle::Server);
        assert_eq!(SdkDetector::detect(&store.handle(HandleFlavour::Bare)), SdkStyle::Client);
        assert_eq!(SdkDetector::detect(&store.handle(HandleFlavour::Client)), SdkStyle::Client);
        assert!(store.handle(HandleFlavour::Bare).chained().is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn broken_handle_counts_failed_loads() {
        let handle = InMemoryStore::new().handle(HandleFlavour::Broken);
        assert!(handle.load_client().await.is_err());
        assert_eq!(handle.client_loads(), 1);
    }
}
