//! End-to-end tests against the event socket simulator: handshake, event
//! delivery, and the supervisor's reconnect cycle.
//!
//! Run with: cargo test --test reconnect_test -- --nocapture


use esl_call_logger::config::FreeSwitchServer;
use esl_call_logger::esl::{Connector, EslConnector, EventFormat};
use esl_call_logger::{EslError, EventProcessor, CallTracker, Supervisor, SupervisorConfig};
use esl_simulator::{
    command_reply, disconnect_notice, heartbeat_event, FakeFreeSwitch, Session, SimulatedCall,
    PASSWORD,
};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn connector(fake: &FakeFreeSwitch, password: &str) -> EslConnector {
    EslConnector::new(
        FreeSwitchServer {
            host: fake.addr.ip().to_string(),
            port: fake.addr.port(),
            password: password.to_string(),
        },
        Duration::from_secs(2),
    )
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        reconnect_delay: Duration::from_millis(50),
        liveness_poll_interval: Duration::from_millis(10),
        ..SupervisorConfig::default()
    }
}

#[tokio::test]
async fn test_handshake_and_event_delivery() {
    let call = SimulatedCall::new("1001", "5551234");
    let fake = FakeFreeSwitch::start(vec![Session::holding(vec![
        command_reply("+OK"),
        call.channel_create_event(),
        call.channel_answer_event(),
    ])])
    .await;

    let mut source = connector(&fake, PASSWORD).connect().await.unwrap();
    assert!(source.is_connected());
    source.subscribe(EventFormat::Plain, "all").await.unwrap();

    // Stray command reply is not an event
    assert!(source.recv_event().await.unwrap().is_none());

    let created = source.recv_event().await.unwrap().unwrap();
    assert_eq!(created.event_name(), Some("CHANNEL_CREATE"));
    assert_eq!(created.channel_unique_id(), Some(call.uuid.as_str()));
    assert_eq!(created.destination_number(), Some("5551234"));
    assert_eq!(created.get_header("Event-Date-Local"), Some("2024-05-01 10:00:00"));

    let answered = source.recv_event().await.unwrap().unwrap();
    assert_eq!(answered.event_name(), Some("CHANNEL_ANSWER"));

    source.close().await;
    assert!(!source.is_connected());

    assert_eq!(
        fake.commands(0)[..2],
        ["auth ClueCon".to_string(), "event plain all".to_string()]
    );
}

#[tokio::test]
async fn test_json_subscription_delivers_events() {
    let call = SimulatedCall::new("1001", "5551234");
    let fake = FakeFreeSwitch::start(vec![Session::holding(vec![
        call.channel_create_json_event(),
    ])])
    .await;

    let mut source = connector(&fake, PASSWORD).connect().await.unwrap();
    source.subscribe(EventFormat::Json, "all").await.unwrap();

    let created = source.recv_event().await.unwrap().unwrap();
    assert_eq!(created.event_name(), Some("CHANNEL_CREATE"));
    assert_eq!(created.channel_unique_id(), Some(call.uuid.as_str()));
    assert_eq!(created.caller_number(), Some("1001"));
    assert_eq!(created.destination_number(), Some("5551234"));

    source.close().await;
    assert_eq!(fake.commands(0)[1], "event json all");
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let fake = FakeFreeSwitch::start(vec![]).await;

    let result = connector(&fake, "wrong").connect().await;

    assert!(matches!(result, Err(EslError::AuthFailed(ref text)) if text == "-ERR invalid"));
}

#[tokio::test]
async fn test_unexpected_greeting_is_rejected() {
    let fake = FakeFreeSwitch::start_with(vec![], "Content-Type: text/rude-rejection\n\n").await;

    let result = connector(&fake, PASSWORD).connect().await;

    assert!(matches!(result, Err(EslError::InvalidGreeting(_))));
}

#[tokio::test]
async fn test_disconnect_notice_ends_processor() {
    let call = SimulatedCall::new("1001", "5551234");
    let fake = FakeFreeSwitch::start(vec![Session::holding(vec![
        call.channel_create_event(),
        heartbeat_event(),
        disconnect_notice(),
        call.channel_hangup_event(),
    ])])
    .await;

    let mut source = connector(&fake, PASSWORD).connect().await.unwrap();
    let mut processor = EventProcessor::new("fake", CallTracker::new());

    let exit = timeout(WAIT, processor.run(source.as_mut(), &CancellationToken::new()))
        .await
        .unwrap();

    assert!(matches!(
        exit,
        esl_call_logger::processor::ProcessorExit::ConnectionLost(EslError::NotConnected)
    ));
    assert!(!source.is_connected());
    // The hangup after the notice was never consumed
    assert!(processor.tracker().contains(&call.uuid));
}

#[tokio::test]
async fn test_supervisor_reconnects_and_keeps_call_state() {
    let first = SimulatedCall::new("1001", "5551234");
    let second = SimulatedCall::new("1002", "5550000");

    let mut fake = FakeFreeSwitch::start(vec![
        Session::closing(vec![
            first.channel_create_event(),
            first.channel_answer_event(),
            second.channel_create_event(),
        ]),
        Session::closing(vec![first.channel_hangup_event()]),
        Session::holding(vec![]),
    ])
    .await;

    let shutdown = CancellationToken::new();
    let supervisor = Supervisor::new(connector(&fake, PASSWORD), fast_config());
    let running = tokio::spawn(supervisor.run(shutdown.clone()));

    // The third subscription only happens once the second connection has
    // been fully drained and released.
    for expected in 0..3 {
        let index = timeout(WAIT, fake.subscribed.recv()).await.unwrap().unwrap();
        assert_eq!(index, expected);
    }

    shutdown.cancel();
    let tracker = timeout(WAIT, running).await.unwrap().unwrap();

    assert!(!tracker.contains(&first.uuid));
    assert!(tracker.contains(&second.uuid));
    assert_eq!(tracker.len(), 1);
    assert_eq!(fake.connections(), 3);
}

#[tokio::test]
async fn test_supervisor_retries_after_auth_failure() {
    let fake = FakeFreeSwitch::start(vec![]).await;

    let shutdown = CancellationToken::new();
    let supervisor = Supervisor::new(connector(&fake, "wrong"), fast_config());
    let running = tokio::spawn(supervisor.run(shutdown.clone()));

    timeout(WAIT, async {
        while fake.connections() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    let tracker = timeout(WAIT, running).await.unwrap().unwrap();
    assert!(tracker.is_empty());
}
