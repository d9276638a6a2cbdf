//! Classification of store handles into the two SDK conventions.

use crate::sdk::{HandleCapabilities, StoreHandle};

/// The calling convention a handle follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkStyle {
    Client,
    Server,
}

/// Classifies handles from their capability descriptor.
///
/// This is a heuristic. A handle classified wrongly is not rejected here; it
/// surfaces later as `Unsupported` errors from degraded bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkDetector;

impl SdkDetector {
    /// Server-style handles expose chained collection and document accessors
    /// plus a settings or serializer surface. Everything else is client-style.
    pub fn classify(capabilities: HandleCapabilities) -> SdkStyle {
        let chained = capabilities.collection && capabilities.document;
        if chained && (capabilities.settings || capabilities.serializer) {
            SdkStyle::Server
        } else {
            SdkStyle::Client
        }
    }

    /// Probes a handle. Never fails and performs no I/O.
    pub fn detect(handle: &dyn StoreHandle) -> SdkStyle {
        let capabilities = handle.capabilities();
        let style = Self::classify(capabilities);
        log::debug!("classified store handle as {style:?} from {capabilities:?}");
        style
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(collection: bool, document: bool, settings: bool, serializer: bool) -> HandleCapabilities {
        HandleCapabilities { collection, document, settings, serializer }
    }

    #[test]
    fn needs_chained_accessors_and_a_server_surface() {
        assert_eq!(SdkDetector::classify(caps(true, true, true, false)), SdkStyle::Server);
        assert_eq!(SdkDetector::classify(caps(true, true, false, true)), SdkStyle::Server);
        assert_eq!(SdkDetector::classify(caps(true, true, false, false)), SdkStyle::Client);
        assert_eq!(SdkDetector::classify(caps(false, true, true, true)), SdkStyle::Client);
        assert_eq!(SdkDetector::classify(HandleCapabilities::default()), SdkStyle::Client);
    }
}
