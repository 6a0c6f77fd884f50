//! Messaging with content scripts

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use cookieward_content::{ContentError, ContentRequest, ContentResponse};
use cookieward_tabs::TabId;

use crate::error::CoreError;
use crate::Result;

/// Delivers a request to the content script of one tab
#[async_trait]
pub trait ContentScript: Send + Sync {
    async fn send(
        &self,
        tab_id: TabId,
        request: ContentRequest,
    ) -> std::result::Result<ContentResponse, ContentError>;
}

/// [`ContentScript`] with a bounded readiness probe in front of every
/// request. A script that is still loading gets a few chances; a page
/// that never runs one (privileged pages) fails fast with
/// [`CoreError::ContentScriptUnavailable`].
#[derive(Clone)]
pub struct ContentScriptClient {
    script: Arc<dyn ContentScript>,
    attempts: u32,
    retry_delay: Duration,
}

impl ContentScriptClient {
    pub fn new(script: Arc<dyn ContentScript>, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            script,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub async fn ensure_ready(&self, tab_id: TabId) -> Result<()> {
        for attempt in 1..=self.attempts {
            match self.script.send(tab_id, ContentRequest::Ping).await {
                Ok(ContentResponse::Pong) => return Ok(()),
                Ok(other) => {
                    tracing::debug!(tab_id = %tab_id, attempt, response = ?other, "Unexpected ping response");
                }
                Err(e) => {
                    tracing::debug!(tab_id = %tab_id, attempt, error = %e, "Content script not ready");
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        tracing::warn!(
            tab_id = %tab_id,
            attempts = self.attempts,
            "Content script unavailable"
        );
        Err(CoreError::ContentScriptUnavailable {
            tab_id,
            attempts: self.attempts,
        })
    }

    pub async fn request(&self, tab_id: TabId, request: ContentRequest) -> Result<ContentResponse> {
        self.ensure_ready(tab_id).await?;
        Ok(self.script.send(tab_id, request).await?)
    }
}

pub(crate) fn unexpected(request: &str, response: &ContentResponse) -> CoreError {
    CoreError::Content(ContentError::UnexpectedResponse {
        request: request.to_string(),
        response: format!("{:?}", response),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentScript for Flaky {
        async fn send(
            &self,
            _tab_id: TabId,
            request: ContentRequest,
        ) -> std::result::Result<ContentResponse, ContentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ContentError::Unreachable("not injected".to_string()));
            }
            match request {
                ContentRequest::Ping => Ok(ContentResponse::Pong),
                _ => Ok(ContentResponse::Done),
            }
        }
    }

    #[tokio::test]
    async fn test_retries_until_ready() {
        let script = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let client = ContentScriptClient::new(script.clone(), 5, Duration::from_millis(1));

        let response = client
            .request(TabId(1), ContentRequest::ClearUnwantedStorage)
            .await
            .unwrap();
        assert_eq!(response, ContentResponse::Done);
        assert_eq!(script.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let script = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let client = ContentScriptClient::new(script.clone(), 3, Duration::from_millis(1));

        let result = client.ensure_ready(TabId(7)).await;
        assert!(matches!(
            result,
            Err(CoreError::ContentScriptUnavailable { attempts: 3, .. })
        ));
        assert_eq!(script.calls.load(Ordering::SeqCst), 3);
    }
}
