//! Object URLs for captured photo previews

use std::collections::HashMap;
use tracing::debug;

/// Live `blob:` URLs. Every URL handed out must eventually be revoked.
#[derive(Debug, Default)]
pub struct PreviewUrls {
    live: HashMap<String, Vec<u8>>,
}

impl PreviewUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, data: &[u8]) -> String {
        let url = format!("blob:{}", uuid::Uuid::new_v4());
        self.live.insert(url.clone(), data.to_vec());
        debug!("Created preview {}", url);
        url
    }

    pub fn resolve(&self, url: &str) -> Option<&[u8]> {
        self.live.get(url).map(Vec::as_slice)
    }

    /// Returns whether `url` was live. Non-blob URLs are ignored.
    pub fn revoke(&mut self, url: &str) -> bool {
        if !url.starts_with("blob:") {
            return false;
        }
        let revoked = self.live.remove(url).is_some();
        if revoked {
            debug!("Revoked preview {}", url);
        }
        revoked
    }

    pub fn revoke_all(&mut self) {
        self.live.clear();
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
