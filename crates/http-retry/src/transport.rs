//! The retrying transport.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::error::TransportResult;
use crate::events::EventReporter;
use crate::events::TracingReporter;
use crate::events::TransportEvent;
use crate::rate_limit::RateLimitState;
use crate::types::HttpRequest;
use crate::types::HttpResponse;
use crate::types::RequestExecutor;
use crate::TransportConfig;

const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
    StatusCode::TOO_MANY_REQUESTS,
];

/// Whether an outcome is worth another attempt.
pub fn is_retryable(outcome: &TransportResult<HttpResponse>) -> bool {
    match outcome {
        Ok(response) => RETRYABLE_STATUSES.contains(&response.status()),
        Err(_) => true,
    }
}

/// Wraps a [`RequestExecutor`] with backoff retries and rate-limit pauses.
///
/// The final outcome is returned as-is after the retry ceiling, including
/// non-2xx responses.
pub struct RetryingTransport<E> {
    executor: E,
    config: TransportConfig,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn EventReporter>,
}

impl<E> RetryingTransport<E>
where E: RequestExecutor
{
    pub fn new(executor: E, config: &TransportConfig) -> Self {
        Self {
            executor,
            config: config.clone(),
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn EventReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The clock pauses are taken on, shared with callers that pace themselves.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Execute `request`, retrying transient failures.
    ///
    /// Returns the last outcome once it is no longer retryable or once
    /// `max_retries` retries have been spent.
    pub fn execute(&self, request: &HttpRequest) -> TransportResult<HttpResponse> {
        let mut outcome = self.attempt(request);
        let mut retries = 0;

        while is_retryable(&outcome) && retries < self.config.max_retries {
            let backoff = self.config.backoff(retries);
            let (status, error) = match &outcome {
                Ok(response) => (Some(response.status()), None),
                Err(report) => (None, Some(report.current_context().to_string())),
            };
            self.reporter.report(&TransportEvent::RetryScheduled {
                url: &request.url,
                retry: retries,
                backoff,
                status,
                error,
            });

            // the previous response body is dropped here, before waiting
            drop(outcome);
            self.clock.sleep(backoff);

            outcome = self.attempt(request);
            retries += 1;
        }

        if is_retryable(&outcome) {
            self.reporter.report(&TransportEvent::RetriesExhausted {
                url: &request.url,
                attempts: retries + 1,
            });
        }

        outcome
    }

    fn attempt(&self, request: &HttpRequest) -> TransportResult<HttpResponse> {
        let outcome = self.executor.execute(request);
        if let Ok(response) = &outcome {
            self.honor_rate_limit(request, response);
        }
        outcome
    }

    fn honor_rate_limit(&self, request: &HttpRequest, response: &HttpResponse) {
        let state = match RateLimitState::from_headers(response.headers()) {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(reason) => {
                self.reporter
                    .report(&TransportEvent::InvalidRateLimitHeader {
                        url: &request.url,
                        reason,
                    });
                return;
            }
        };

        if let Some(wait) = state.pause(self.clock.now()) {
            self.reporter.report(&TransportEvent::RateLimitPause {
                url: &request.url,
                remaining: state.remaining,
                wait,
            });
            self.clock.sleep(round_up_to_second(wait));
        }
    }
}

// reset epochs have one second resolution
fn round_up_to_second(wait: Duration) -> Duration {
    if wait.subsec_nanos() == 0 {
        wait
    } else {
        Duration::from_secs(wait.as_secs() + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chrono::DateTime;
    use chrono::Utc;
    use error_stack::Report;
    use reqwest::header::HeaderMap;
    use reqwest::header::HeaderValue;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TransportError;
    use crate::rate_limit::REMAINING_HEADER;
    use crate::rate_limit::RESET_HEADER;

    enum Scripted {
        Status(u16),
        RateLimited { status: u16, remaining: i64, reset: i64 },
        QuotaWithoutReset,
        NetworkError,
    }

    /// Replays a script of outcomes and records what it saw.
    struct ScriptedExecutor {
        script: Mutex<VecDeque<Scripted>>,
        clock: Arc<ManualClock>,
        calls: Mutex<Vec<(DateTime<Utc>, Option<Vec<u8>>)>>,
    }

    impl ScriptedExecutor {
        fn new(clock: Arc<ManualClock>, script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                clock,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<i64> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(at, _)| at.timestamp())
                .collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl RequestExecutor for ScriptedExecutor {
        fn execute(&self, request: &HttpRequest) -> TransportResult<HttpResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((self.clock.now(), request.body.clone()));
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Status(200));
            match step {
                Scripted::Status(code) => Ok(HttpResponse::new(
                    StatusCode::from_u16(code).unwrap(),
                    HeaderMap::new(),
                    b"body".to_vec(),
                )),
                Scripted::RateLimited {
                    status,
                    remaining,
                    reset,
                } => {
                    let mut headers = HeaderMap::new();
                    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
                    headers.insert(RESET_HEADER, HeaderValue::from(reset));
                    Ok(HttpResponse::new(
                        StatusCode::from_u16(status).unwrap(),
                        headers,
                        Vec::new(),
                    ))
                }
                Scripted::QuotaWithoutReset => {
                    let mut headers = HeaderMap::new();
                    headers.insert(REMAINING_HEADER, HeaderValue::from(0));
                    Ok(HttpResponse::new(StatusCode::OK, headers, Vec::new()))
                }
                Scripted::NetworkError => Err(Report::new(TransportError::Network {
                    message: "connection reset".into(),
                })),
            }
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<String>>,
    }

    impl EventReporter for RecordingReporter {
        fn report(&self, event: &TransportEvent<'_>) {
            let name = match event {
                TransportEvent::RetryScheduled { .. } => "retry",
                TransportEvent::RateLimitPause { .. } => "pause",
                TransportEvent::InvalidRateLimitHeader { .. } => "invalid-header",
                TransportEvent::RetriesExhausted { .. } => "exhausted",
            };
            self.events.lock().unwrap().push(name.to_string());
        }
    }

    const START: i64 = 1_700_000_000;

    fn setup(
        script: Vec<Scripted>,
    ) -> (
        Arc<ManualClock>,
        Arc<ScriptedExecutor>,
        Arc<RecordingReporter>,
        RetryingTransport<Arc<ScriptedExecutor>>,
    ) {
        let clock = Arc::new(ManualClock::starting_at(
            DateTime::from_timestamp(START, 0).unwrap(),
        ));
        let executor = Arc::new(ScriptedExecutor::new(clock.clone(), script));
        let reporter = Arc::new(RecordingReporter::default());
        let transport = RetryingTransport::new(executor.clone(), &TransportConfig::new())
            .with_clock(clock.clone())
            .with_reporter(reporter.clone());
        (clock, executor, reporter, transport)
    }

    #[test]
    fn success_is_returned_without_retry() {
        let (clock, executor, reporter, transport) = setup(vec![Scripted::Status(200)]);

        let response = transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(executor.call_count(), 1);
        assert!(clock.sleeps().is_empty());
        assert!(reporter.events.lock().unwrap().is_empty());
    }

    #[test]
    fn every_retryable_status_uses_the_full_ceiling() {
        for code in [500, 502, 503, 504, 429] {
            let script = (0..10).map(|_| Scripted::Status(code)).collect();
            let (clock, executor, _, transport) = setup(script);

            let response = transport
                .execute(&HttpRequest::get("http://api/items"))
                .expect("final response");

            assert_eq!(response.status().as_u16(), code);
            assert_eq!(executor.call_count(), 4, "status {code}");
            assert_eq!(clock.sleeps(), vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]);
        }
    }

    #[test]
    fn network_errors_are_retried_then_returned() {
        let script = (0..10).map(|_| Scripted::NetworkError).collect();
        let (clock, executor, reporter, transport) = setup(script);

        let err = transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect_err("should fail");

        assert!(matches!(
            err.current_context(),
            TransportError::Network { .. }
        ));
        assert_eq!(executor.call_count(), 4);
        assert_eq!(clock.total_slept(), Duration::from_secs(7));
        assert_eq!(*reporter.events.lock().unwrap(), vec![
            "retry",
            "retry",
            "retry",
            "exhausted"
        ]);
    }

    #[test]
    fn recovers_after_transient_failures() {
        let (_, executor, _, transport) = setup(vec![
            Scripted::Status(503),
            Scripted::NetworkError,
            Scripted::Status(200),
        ]);

        let response = transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(executor.call_count(), 3);
    }

    #[test]
    fn terminal_statuses_are_not_retried() {
        for code in [400, 401, 403, 404, 501] {
            let (clock, executor, _, transport) = setup(vec![Scripted::Status(code)]);

            let response = transport
                .execute(&HttpRequest::get("http://api/items"))
                .expect("response");

            assert_eq!(response.status().as_u16(), code);
            assert_eq!(executor.call_count(), 1);
            assert!(clock.sleeps().is_empty());
        }
    }

    #[test]
    fn body_is_replayed_on_every_attempt() {
        let (_, executor, _, transport) = setup(vec![
            Scripted::Status(502),
            Scripted::Status(502),
            Scripted::Status(204),
        ]);

        let request = HttpRequest::post("http://sink/write").body(b"payload".to_vec());
        transport.execute(&request).expect("response");

        let bodies: Vec<_> = executor
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect();
        assert_eq!(bodies, vec![Some(b"payload".to_vec()); 3]);
    }

    #[test]
    fn exhausted_quota_pauses_even_after_success() {
        let (clock, _, reporter, transport) = setup(vec![Scripted::RateLimited {
            status: 200,
            remaining: 0,
            reset: START + 30,
        }]);

        let response = transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
        assert!(clock.now().timestamp() >= START + 30);
        assert_eq!(*reporter.events.lock().unwrap(), vec!["pause"]);
    }

    #[test]
    fn no_call_escapes_the_pause_window() {
        let (_, executor, _, transport) = setup(vec![
            Scripted::RateLimited {
                status: 429,
                remaining: 0,
                reset: START + 60,
            },
            Scripted::Status(200),
        ]);

        transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect("response");

        let times = executor.call_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[0], START);
        assert!(times[1] >= START + 60, "second call at {}", times[1]);
    }

    #[test]
    fn remaining_quota_does_not_pause() {
        let (clock, _, _, transport) = setup(vec![Scripted::RateLimited {
            status: 200,
            remaining: 5,
            reset: START + 30,
        }]);

        transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect("response");

        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn exhausted_quota_without_reset_is_reported() {
        let (clock, _, reporter, transport) = setup(vec![Scripted::QuotaWithoutReset]);

        let response = transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(clock.sleeps().is_empty());
        assert_eq!(*reporter.events.lock().unwrap(), vec!["invalid-header"]);
    }

    #[test]
    fn pause_is_independent_of_retry_ceiling() {
        let script = (0..10)
            .map(|_| Scripted::RateLimited {
                status: 429,
                remaining: 0,
                reset: START + 100,
            })
            .collect();
        let (clock, executor, _, transport) = setup(script);

        transport
            .execute(&HttpRequest::get("http://api/items"))
            .expect("response");

        assert_eq!(executor.call_count(), 4);
        // one pause before the first retry, the later resets are already in the past
        assert_eq!(clock.sleeps(), vec![
            Duration::from_secs(100),
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ]);
    }

    #[test]
    fn round_up_keeps_whole_seconds() {
        assert_eq!(round_up_to_second(Duration::from_secs(3)), Duration::from_secs(3));
        assert_eq!(
            round_up_to_second(Duration::from_millis(2100)),
            Duration::from_secs(3)
        );
    }
}
