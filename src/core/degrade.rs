//! Degrade-on-failure policy for non-critical sub-fetches.
//!
//! Wraps a fallible fetch and substitutes a fallback value when it fails.
//! Authorization and transport failures take the same path but are logged
//! with different wording.

use crate::errors::{Error, Result};
use std::future::Future;
use tracing::warn;

/// Awaits `fetch`, returning `fallback` if it fails.
pub async fn degrade<T, Fut>(what: &str, fetch: Fut, fallback: T) -> T
where
    Fut: Future<Output = Result<T>>,
{
    match fetch.await {
        Ok(value) => value,
        Err(err) => {
            log_degraded(what, &err);
            fallback
        }
    }
}

/// Awaits `fetch`, returning `T::default()` if it fails.
pub async fn degrade_to_default<T, Fut>(what: &str, fetch: Fut) -> T
where
    T: Default,
    Fut: Future<Output = Result<T>>,
{
    degrade(what, fetch, T::default()).await
}

fn log_degraded(what: &str, err: &Error) {
    if err.is_authorization() {
        warn!("Permission denied fetching {what}; continuing with empty data: {err}");
    } else if err.is_transport() {
        warn!("CRM unreachable fetching {what}; continuing with empty data: {err}");
    } else {
        warn!("Failed to fetch {what}; continuing with empty data: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_success_passes_through() {
        let value = degrade("donations", async { Ok(vec![1, 2, 3]) }, Vec::new()).await;
        assert_eq!(value, vec![1, 2, 3]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_transport_error_falls_back() {
        let value: Vec<u32> = degrade_to_default("donations", async {
            Err(Error::Transport {
                message: "connection refused".to_string(),
            })
        })
        .await;
        assert!(value.is_empty());
        assert!(logs_contain("CRM unreachable fetching donations"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_authorization_error_logged_distinctly() {
        let value = degrade(
            "campaigns",
            async {
                Err(Error::Authorization {
                    message: "403: missing scope".to_string(),
                })
            },
            7_u32,
        )
        .await;
        assert_eq!(value, 7);
        assert!(logs_contain("Permission denied fetching campaigns"));
        assert!(!logs_contain("CRM unreachable"));
    }
}
