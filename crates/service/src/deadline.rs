use std::future::Future;
use std::time::Duration;

use crate::errors::ServiceError;

/// Run a storage or cache call under `limit`. Elapsed calls become
/// `ServiceError::Timeout`; inner errors get `what` as context.
pub async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(|e| e.context(what)),
        Err(_) => Err(ServiceError::Timeout(what.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_call_is_a_timeout() {
        let res: Result<(), _> = bounded(Duration::from_millis(10), "slow lookup", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(ServiceError::Timeout(ref w)) if w == "slow lookup"));
    }

    #[tokio::test]
    async fn inner_error_gets_context() {
        let res: Result<(), _> = bounded(Duration::from_secs(1), "lookup tenant by id", async {
            Err(ServiceError::Db("boom".into()))
        })
        .await;
        assert_eq!(res.unwrap_err().to_string(), "database error: lookup tenant by id: boom");
    }
}
