//! Tests for verified, bounded-retry fetching.

use ironsift::fetch::{FetchOutcome, Fetcher, HttpResponse, RetryPolicy};
use ironsift::testing::{FakeTransport, ok_response, status_response, truncated_response};
use ironsift::Manifest;
use std::sync::Arc;

const URL: &str = "https://bulk.test/2014/ipa140102.zip";

fn fetcher(transport: &Arc<FakeTransport>, attempts: u32) -> Fetcher {
    Fetcher::new(transport.clone(), RetryPolicy::immediate(attempts))
}

fn body(outcome: FetchOutcome) -> Vec<u8> {
    match outcome {
        FetchOutcome::Fetched(bytes) => bytes,
        FetchOutcome::Exhausted { attempts, last_error } => {
            panic!("exhausted after {attempts}: {last_error}")
        }
    }
}

#[test]
fn test_default_policy_is_seven_attempts() {
    assert_eq!(RetryPolicy::default().max_attempts, 7);
}

#[test]
fn test_retry_bound_is_exact() {
    let transport = Arc::new(FakeTransport::new());
    transport.fail_always(URL, "connection reset");

    let outcome = fetcher(&transport, 7).fetch(URL, None);
    match outcome {
        FetchOutcome::Exhausted { attempts, last_error } => {
            assert_eq!(attempts, 7);
            assert!(last_error.contains("connection reset"));
        }
        FetchOutcome::Fetched(_) => panic!("should not fetch"),
    }
    assert_eq!(transport.attempts(URL), 7);
}

#[test]
fn test_short_body_is_retried() {
    let transport = Arc::new(FakeTransport::new());
    transport.script(URL, [Ok(truncated_response(b"abc".to_vec(), 10))]);
    transport.serve(URL, b"abcdefghij".to_vec());

    let bytes = body(fetcher(&transport, 3).fetch(URL, None));
    assert_eq!(bytes, b"abcdefghij");
    assert_eq!(transport.attempts(URL), 2);
}

#[test]
fn test_error_status_is_retried() {
    let transport = Arc::new(FakeTransport::new());
    transport.script(URL, [Ok(status_response(503)), Err("timed out".to_string())]);
    transport.serve(URL, b"payload".to_vec());

    let bytes = body(fetcher(&transport, 7).fetch(URL, None));
    assert_eq!(bytes, b"payload");
    assert_eq!(transport.attempts(URL), 3);
}

#[test]
fn test_missing_content_length() {
    let transport = Arc::new(FakeTransport::new());
    transport.respond(
        URL,
        HttpResponse {
            status: 200,
            content_length: None,
            body: b"payload".to_vec(),
        },
    );

    let strict = fetcher(&transport, 3).fetch(URL, None);
    assert!(matches!(strict, FetchOutcome::Exhausted { attempts: 3, .. }));

    let relaxed = fetcher(&transport, 3).require_content_length(false).fetch(URL, None);
    assert_eq!(body(relaxed), b"payload");
}

#[test]
fn test_manifest_size_is_enforced() {
    let transport = Arc::new(FakeTransport::new());
    // Headers agree with the short body; only the manifest knows better.
    transport.serve(URL, b"1234".to_vec());
    let manifest = Manifest::new([("ipa140102.zip".to_string(), 5)]);

    let outcome = fetcher(&transport, 2).with_manifest(manifest).fetch(URL, None);
    match outcome {
        FetchOutcome::Exhausted { attempts, last_error } => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("expected 5"), "{last_error}");
        }
        FetchOutcome::Fetched(_) => panic!("truncated archive accepted"),
    }
}

#[test]
fn test_partition_length_overrides_manifest() {
    let transport = Arc::new(FakeTransport::new());
    transport.serve(URL, b"1234".to_vec());
    let manifest = Manifest::new([("ipa140102.zip".to_string(), 5)]);

    let bytes = body(fetcher(&transport, 1).with_manifest(manifest).fetch(URL, Some(4)));
    assert_eq!(bytes.len(), 4);
}

#[test]
fn test_manifest_lookup_ignores_query_string() {
    let manifest = Manifest::new([("ipa140102.zip".to_string(), 5)]);
    assert_eq!(manifest.size_for("https://bulk.test/a/ipa140102.zip?sig=abc"), Some(5));
    assert_eq!(manifest.size_for("https://bulk.test/a/ipa150102.zip"), None);
}

#[test]
fn test_ok_response_sets_length() {
    let r = ok_response(b"xyz".to_vec());
    assert_eq!(r.content_length, Some(3));
    assert!(r.is_success());
    assert!(!status_response(404).is_success());
}
