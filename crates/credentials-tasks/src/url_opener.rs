//! Opening deep links in external applications.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait UrlOpener: Send + Sync {
    /// Try to open `url`. With `universal_links_only` the URL is opened only
    /// when an installed app claims it. Returns whether anything opened.
    async fn open(&self, url: &Url, universal_links_only: bool) -> bool;
}

/// Opens URLs with the platform handler.
///
/// Desktop platforms have no universal-link registry, so a
/// universal-links-only request never opens anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUrlOpener;

#[async_trait]
impl UrlOpener for SystemUrlOpener {
    async fn open(&self, url: &Url, universal_links_only: bool) -> bool {
        if universal_links_only {
            return false;
        }

        let target = url.to_string();
        match tokio::task::spawn_blocking(move || open::that(target)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                debug!(url = %url, error = %err, "no handler opened url");
                false
            }
            Err(err) => {
                debug!(url = %url, error = %err, "url open task failed");
                false
            }
        }
    }
}
