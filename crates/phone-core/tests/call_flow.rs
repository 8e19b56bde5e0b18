//! Integration tests for call flows driven through the transport event loop
//!
//! Every test builds a phone with `PhoneBuilder`, binds a transport event
//! channel and plays the notifications a signaling stack would deliver.

use std::sync::Arc;
use std::time::Duration;

use softphone_core::testing::{FakeSession, FakeTransport};
use softphone_core::{
    PhoneBuilder, PhoneEvent, PhoneEventKind, SessionState, SipSession, TransportEvent,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("softphone_core=debug")
        .with_test_writer()
        .try_init();
}

/// Wait for the next event of `kind` on the broadcast side of the phone
async fn next_event(rx: &mut broadcast::Receiver<PhoneEvent>, kind: PhoneEventKind) -> PhoneEvent {
    use softphone_core::Event;

    timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event stream open");
            if event.kind() == kind {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"))
}

fn state_changed(session: &Arc<FakeSession>, state: SessionState) -> TransportEvent {
    session.set_state(state);
    TransportEvent::StateChanged {
        session: session.clone(),
        state,
    }
}

/// Test an outbound call from dialing to remote hang-up
#[tokio::test]
async fn test_outbound_call_lifecycle() {
    init_tracing();

    let transport = Arc::new(FakeTransport::registered());
    let phone = PhoneBuilder::new()
        .transport(transport.clone())
        .build()
        .expect("Failed to build phone");
    let (tx, rx) = mpsc::unbounded_channel();
    phone.bind_transport_events(rx);
    let mut events = phone.subscribe_events();

    let session = FakeSession::outgoing("dialog-1", "1000").into_arc();
    transport.prepare_outgoing(session.clone());

    let call = phone.make_call("1000", false, false).await.expect("Failed to dial");
    assert_eq!(call.sip_status, SessionState::Establishing);

    tx.send(state_changed(&session, SessionState::Establishing)).unwrap();
    let PhoneEvent::Progress(progress) = next_event(&mut events, PhoneEventKind::Progress).await else {
        unreachable!()
    };
    assert_eq!(progress.call_id, call.call_id);

    tx.send(state_changed(&session, SessionState::Established)).unwrap();
    let PhoneEvent::Accepted(accepted) = next_event(&mut events, PhoneEventKind::Accepted).await else {
        unreachable!()
    };
    assert!(accepted.answered);
    assert!(phone.is_current_call(&accepted));

    tx.send(state_changed(&session, SessionState::Terminated)).unwrap();
    let PhoneEvent::CallEnded(ended) = next_event(&mut events, PhoneEventKind::CallEnded).await else {
        unreachable!()
    };
    assert_eq!(ended.call_id, call.call_id);
    assert_eq!(phone.call_count(), 0);
    assert!(!phone.has_active_call());
}

/// Test call waiting: a second inbound call holds the first, then takes over
#[tokio::test]
async fn test_call_waiting() {
    init_tracing();

    let transport = Arc::new(FakeTransport::registered());
    let phone = PhoneBuilder::new()
        .transport(transport.clone())
        .build()
        .expect("Failed to build phone");
    let (tx, rx) = mpsc::unbounded_channel();
    phone.bind_transport_events(rx);
    let mut events = phone.subscribe_events();

    let first = FakeSession::incoming("dialog-a", "2000").into_arc();
    tx.send(TransportEvent::Invite {
        session: first.clone(),
        wants_video: false,
    })
    .unwrap();
    let PhoneEvent::Incoming(a) = next_event(&mut events, PhoneEventKind::Incoming).await else {
        unreachable!()
    };
    phone.accept(&a, false).await.expect("Failed to accept first call");
    tx.send(TransportEvent::Accepted {
        session: first.clone(),
    })
    .unwrap();
    next_event(&mut events, PhoneEventKind::Accepted).await;

    let second = FakeSession::incoming("dialog-b", "3000")
        .with_display_name("Bob")
        .into_arc();
    tx.send(TransportEvent::Invite {
        session: second.clone(),
        wants_video: false,
    })
    .unwrap();
    let PhoneEvent::Incoming(b) = next_event(&mut events, PhoneEventKind::Incoming).await else {
        unreachable!()
    };
    assert_eq!(b.display_name, "Bob");
    assert!(first.is_held());
    assert_eq!(phone.incoming_call_session().map(|c| c.call_id), Some(b.call_id));

    phone.accept(&b, false).await.expect("Failed to accept second call");
    assert!(phone.is_current_call(&b));
    assert!(first.is_held());
    assert_eq!(first.count("hold"), 1);
    assert!(!phone.has_incoming_call_session());

    phone.close().await;
    assert_eq!(phone.call_count(), 0);
    assert!(transport.ops().contains(&"close".to_string()));
}

/// Test that the event loop stops when the phone goes away
#[tokio::test]
async fn test_event_loop_releases_phone() {
    init_tracing();

    let transport = Arc::new(FakeTransport::registered());
    let phone = PhoneBuilder::new()
        .transport(transport.clone())
        .build()
        .expect("Failed to build phone");
    let (tx, rx) = mpsc::unbounded_channel();
    phone.bind_transport_events(rx);

    let weak = Arc::downgrade(&phone);
    drop(phone);
    assert!(weak.upgrade().is_none());

    // The loop notices on the next event and exits
    let session: Arc<dyn SipSession> = FakeSession::incoming("dialog-z", "4000").into_arc();
    let _ = tx.send(TransportEvent::Invite {
        session,
        wants_video: false,
    });
    timeout(Duration::from_secs(1), tx.closed())
        .await
        .expect("event loop should exit");
}
