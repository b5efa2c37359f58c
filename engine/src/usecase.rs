//! Uniform logging around desk usecases.

use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use tracing::{error, info, info_span, Instrument};

/// Run one usecase inside a span, logging its start, outcome and duration.
///
/// `user` is the username the action runs for, when known.
pub async fn run_usecase<T, E, Fut>(action: &'static str, user: Option<&str>, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let span = info_span!("usecase", action, user = user.unwrap_or("-"));

    async move {
        let started = Instant::now();
        info!("Usecase started");

        let result = fut.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(elapsed_ms, outcome = "OK", "Usecase finished"),
            Err(e) => error!(elapsed_ms, outcome = "ERROR", error = %e, "Usecase finished"),
        }
        result
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_result_through() {
        let ok: Result<u32, String> =
            tokio_test::block_on(run_usecase("ok", Some("alice"), async { Ok(7) }));
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> =
            tokio_test::block_on(run_usecase("fail", None, async { Err("boom".to_string()) }));
        assert_eq!(err, Err("boom".to_string()));
    }
}
