// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end pipeline behavior: batching, ordering, deduplication.

use flagkit_config::EventsConfig;
use flagkit_core::{Context, Value};
use flagkit_events::{CustomEvent, EvalEvent, EventProcessor, IdentifyEvent, InputEvent, now_millis};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn processor(server_uri: &str, config: EventsConfig) -> EventProcessor {
    EventProcessor::start(
        config,
        format!("{server_uri}/bulk"),
        reqwest::Client::new(),
        &tokio::runtime::Handle::current(),
        None,
        None,
    )
}

fn eval_event(flag_key: &str, context: &Context, track: bool) -> InputEvent {
    InputEvent::Eval(EvalEvent {
        creation_date: now_millis(),
        flag_key: flag_key.into(),
        version: Some(3),
        context: context.clone(),
        variation: Some(0),
        value: Value::Bool(true),
        default_value: Value::Bool(false),
        reason: None,
        prereq_of: None,
        track_events: track,
        debug_events_until_date: None,
    })
}

async fn received_bodies(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..200 {
        if server.received_requests().await.unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} requests");
}

#[tokio::test]
async fn flush_sends_one_batch_with_summary_last() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .and(header("Content-Type", "application/json"))
        .and(header("X-LaunchDarkly-Event-Schema", "4"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let context = Context::builder().kind("user", "bob").build();
    let processor = processor(&server.uri(), EventsConfig::default());

    processor.send(eval_event("tracked-flag", &context, true));
    processor.send(InputEvent::Custom(CustomEvent {
        creation_date: now_millis(),
        key: "conversion".into(),
        context: context.clone(),
        data: None,
        metric_value: Some(1.0),
    }));
    processor.flush();

    wait_for_requests(&server, 1).await;
    let bodies = received_bodies(&server).await;
    let events = bodies[0].as_array().unwrap();

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    // One index for the new context, the tracked feature event, the
    // custom event, and the summary terminating the batch.
    assert_eq!(kinds, vec!["index", "feature", "custom", "summary"]);
    assert!(
        server.received_requests().await.unwrap()[0]
            .headers
            .get("X-LaunchDarkly-Payload-Id")
            .is_some()
    );

    processor.close().await;
}

#[tokio::test]
async fn untracked_evaluations_only_feed_the_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let context = Context::builder().kind("user", "carol").build();
    let processor = processor(&server.uri(), EventsConfig::default());

    processor.send(eval_event("quiet-flag", &context, false));
    processor.send(eval_event("quiet-flag", &context, false));
    processor.flush();

    wait_for_requests(&server, 1).await;
    let bodies = received_bodies(&server).await;
    let events = bodies[0].as_array().unwrap();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["index", "summary"]);

    let counters = events[1]["features"]["quiet-flag"]["counters"]
        .as_array()
        .unwrap();
    assert_eq!(counters[0]["count"], 2);

    processor.close().await;
}

#[tokio::test]
async fn index_events_deduplicate_contexts_within_a_window() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let context = Context::builder().kind("user", "dave").build();
    let processor = processor(&server.uri(), EventsConfig::default());

    processor.send(eval_event("f1", &context, true));
    processor.send(eval_event("f2", &context, true));
    processor.flush();

    wait_for_requests(&server, 1).await;
    let bodies = received_bodies(&server).await;
    let index_count = bodies[0]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["kind"] == "index")
        .count();
    assert_eq!(index_count, 1);

    processor.close().await;
}

#[tokio::test]
async fn identify_events_carry_the_full_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let processor = processor(&server.uri(), EventsConfig::default());
    let context = Context::builder()
        .kind("user", "erin")
        .set("email", "erin@example.com")
        .build();
    processor.send(InputEvent::Identify(IdentifyEvent {
        creation_date: now_millis(),
        context,
    }));
    processor.flush();

    wait_for_requests(&server, 1).await;
    let bodies = received_bodies(&server).await;
    let events = bodies[0].as_array().unwrap();
    assert_eq!(events[0]["kind"], "identify");
    assert_eq!(events[0]["context"]["key"], "erin");
    assert_eq!(events[0]["context"]["email"], "erin@example.com");

    processor.close().await;
}

#[tokio::test]
async fn close_performs_a_final_flush() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let context = Context::builder().kind("user", "frank").build();
    let processor = processor(&server.uri(), EventsConfig::default());
    processor.send(eval_event("f", &context, true));
    processor.close().await;

    // No explicit flush was requested; close drained the outbox.
    wait_for_requests(&server, 1).await;
}

#[tokio::test]
async fn debug_window_produces_debug_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let context = Context::builder().kind("user", "gina").build();
    let processor = processor(&server.uri(), EventsConfig::default());
    let mut event = match eval_event("debuggable", &context, false) {
        InputEvent::Eval(event) => event,
        _ => unreachable!(),
    };
    event.debug_events_until_date = Some((now_millis() + 60_000) as u64);
    processor.send(InputEvent::Eval(event));
    processor.flush();

    wait_for_requests(&server, 1).await;
    let bodies = received_bodies(&server).await;
    let kinds: Vec<&str> = bodies[0]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["index", "debug", "summary"]);

    processor.close().await;
}
