use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use watchlink::core::bluetooth::constants::*;
use watchlink::core::bluetooth::simulated::{SimulatedWatch, TransportCall};
use watchlink::core::bluetooth::transport::{TransportError, WriteMode};
use watchlink::core::codec::CodecError;
use watchlink::{
    CapabilityId, ConnectionState, ExternalAppMessage, ForecastEntry, MediaCommand, Notification,
    SessionConfig, SessionError, Vibration, WatchSession,
};

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

fn session_for(watch: &Arc<SimulatedWatch>) -> WatchSession {
    WatchSession::new(ADDRESS, "Asteroid", watch.clone(), SessionConfig::default())
}

async fn connected() -> (Arc<SimulatedWatch>, WatchSession) {
    let watch = Arc::new(SimulatedWatch::asteroid());
    let session = session_for(&watch);
    session.connect().await.unwrap();
    watch.clear_calls();
    (watch, session)
}

fn screenshot_header(total: u32) -> Vec<u8> {
    total.to_le_bytes().to_vec()
}

#[tokio::test]
async fn test_connect_negotiates_every_capability() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    watch.set_value(UUID_BATTERY_LEVEL, vec![87]);
    let session = session_for(&watch);
    assert_eq!(session.state(), ConnectionState::Disconnected);

    session.connect().await.unwrap();

    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.battery_level(), Some(87));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.address, ADDRESS);
    assert_eq!(snapshot.name, "Asteroid");
    assert_eq!(snapshot.capabilities.len(), 7);
    assert!(snapshot.capabilities.values().all(|status| status.ready));
    assert!(snapshot.capabilities[&CapabilityId::Media]
        .handle(UUID_MEDIA_COMMANDS)
        .is_some());

    let calls = watch.calls();
    assert_eq!(
        &calls[..3],
        &[
            TransportCall::Connect(ADDRESS.to_string()),
            TransportCall::Bond(ADDRESS.to_string()),
            TransportCall::DiscoverServices,
        ]
    );
    // Stale subscriptions are cleared before subscribing
    let unsubscribe = calls
        .iter()
        .position(|c| *c == TransportCall::Unsubscribe(UUID_BATTERY_LEVEL))
        .unwrap();
    let subscribe = calls
        .iter()
        .position(|c| *c == TransportCall::Subscribe(UUID_BATTERY_LEVEL))
        .unwrap();
    assert!(unsubscribe < subscribe);
    assert!(calls.contains(&TransportCall::Read(UUID_BATTERY_LEVEL)));
}

#[tokio::test]
async fn test_connect_twice_is_a_state_error() {
    let (watch, session) = connected().await;
    assert_eq!(
        session.connect().await,
        Err(SessionError::State {
            operation: "connect",
            state: ConnectionState::Connected
        })
    );
    assert!(watch.calls().is_empty());
}

#[tokio::test]
async fn test_disconnect_releases_everything() {
    let (watch, session) = connected().await;
    watch.notify(UUID_BATTERY_LEVEL, vec![50]).await;

    session.disconnect().await.unwrap();

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(watch.calls(), vec![TransportCall::Disconnect(ADDRESS.to_string())]);
    assert_eq!(session.battery_level(), None);
    assert_eq!(watch.subscription_count(), 0);
    for status in session.snapshot().capabilities.values() {
        assert!(!status.ready);
        assert!(status.bindings.iter().all(|b| b.handle.is_none()));
    }

    // Already disconnected: nothing to do
    watch.clear_calls();
    session.disconnect().await.unwrap();
    assert!(watch.calls().is_empty());
}

#[tokio::test]
async fn test_disconnect_error_is_swallowed() {
    let (watch, session) = connected().await;
    watch.fail_disconnect(Some(TransportError::Io("link lost".to_string())));
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let (watch, session) = connected().await;
    session.disconnect().await.unwrap();
    session.connect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.is_ready(CapabilityId::Media));

    watch.notify(UUID_BATTERY_LEVEL, vec![42]).await;
    let mut battery = session.subscribe_battery();
    battery.wait_for(|level| *level == Some(42)).await.unwrap();
}

#[tokio::test]
async fn test_failed_connect_enters_error_state() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    watch.fail_connect(Some(TransportError::Timeout));
    let session = session_for(&watch);

    let result = session.connect().await;
    assert!(matches!(result, Err(SessionError::ConnectionSetup(_))));
    assert_eq!(session.state(), ConnectionState::Error);

    // Only disconnect leaves the error state
    assert!(matches!(
        session.connect().await,
        Err(SessionError::State { state: ConnectionState::Error, .. })
    ));
    assert!(matches!(
        session.sync_time().await,
        Err(SessionError::State { state: ConnectionState::Error, .. })
    ));

    watch.clear_calls();
    session.disconnect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(watch.calls().is_empty());

    watch.fail_connect(None);
    session.connect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_missing_essential_capability_fails_connect() {
    let watch = Arc::new(SimulatedWatch::asteroid().without_service(UUID_TIME_SERVICE));
    let session = session_for(&watch);

    assert!(matches!(
        session.connect().await,
        Err(SessionError::ConnectionSetup(_))
    ));
    assert_eq!(session.state(), ConnectionState::Error);
    for (id, status) in session.snapshot().capabilities {
        assert!(!status.ready, "{} left ready", id);
    }
    assert_eq!(watch.subscription_count(), 0);
}

#[tokio::test]
async fn test_battery_without_notify_is_unsupported() {
    let watch = Arc::new(
        SimulatedWatch::asteroid()
            .without_service(UUID_BATTERY_SERVICE)
            .with_service(UUID_BATTERY_SERVICE, &[(UUID_BATTERY_LEVEL, false)]),
    );
    let session = session_for(&watch);

    assert!(matches!(
        session.connect().await,
        Err(SessionError::ConnectionSetup(_))
    ));
    assert!(!session.is_ready(CapabilityId::Battery));
    assert!(!session.is_ready(CapabilityId::Time));
}

#[tokio::test]
async fn test_missing_optional_capability_is_tolerated() {
    let watch = Arc::new(SimulatedWatch::asteroid().without_service(UUID_WEATHER_SERVICE));
    let session = session_for(&watch);

    session.connect().await.unwrap();
    assert!(!session.is_ready(CapabilityId::Weather));
    assert!(session.is_ready(CapabilityId::Media));

    watch.clear_calls();
    assert_eq!(
        session.set_city("Helsinki").await,
        Err(SessionError::CapabilityUnavailable(CapabilityId::Weather))
    );
    assert!(watch.calls().is_empty());
}

#[tokio::test]
async fn test_missing_outbound_characteristic_is_tolerated() {
    let watch = Arc::new(SimulatedWatch::asteroid().without_characteristic(UUID_MEDIA_ALBUM));
    let session = session_for(&watch);

    session.connect().await.unwrap();
    assert!(session.is_ready(CapabilityId::Media));
    assert_eq!(
        session.set_album("Blue Train").await,
        Err(SessionError::CapabilityUnavailable(CapabilityId::Media))
    );
    session.set_title("Moment's Notice").await.unwrap();
}

#[tokio::test]
async fn test_missing_inbound_characteristic_leaves_capability_unready() {
    let watch = Arc::new(SimulatedWatch::asteroid().without_characteristic(UUID_SCREENSHOT_CONTENT));
    let session = session_for(&watch);

    session.connect().await.unwrap();
    assert!(!session.is_ready(CapabilityId::Screenshot));
    assert!(session.is_ready(CapabilityId::Media));

    watch.clear_calls();
    assert_eq!(
        session.request_screenshot().await,
        Err(SessionError::CapabilityUnavailable(CapabilityId::Screenshot))
    );
    assert!(watch.calls().is_empty());
}

#[tokio::test]
async fn test_missing_essential_inbound_characteristic_fails_connect() {
    let watch = Arc::new(SimulatedWatch::asteroid().without_characteristic(UUID_BATTERY_LEVEL));
    let session = session_for(&watch);

    assert!(matches!(
        session.connect().await,
        Err(SessionError::ConnectionSetup(_))
    ));
    assert!(!session.is_ready(CapabilityId::Battery));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_negotiation_rolls_back() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    watch.set_read_delay(Duration::from_secs(5));
    let session = session_for(&watch);
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(session.connect_with_cancel(&cancel), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    assert_eq!(result, Err(SessionError::Cancelled));
    assert!(watch.calls().contains(&TransportCall::DiscoverServices));
    assert!(watch.calls().contains(&TransportCall::Read(UUID_BATTERY_LEVEL)));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    for (id, status) in session.snapshot().capabilities {
        assert!(!status.ready, "{} left ready", id);
    }
    assert_eq!(watch.subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_connect_rolls_back() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    watch.set_connect_delay(Duration::from_secs(5));
    let session = session_for(&watch);
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(session.connect_with_cancel(&cancel), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    assert_eq!(result, Err(SessionError::Cancelled));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(watch
        .calls()
        .contains(&TransportCall::Disconnect(ADDRESS.to_string())));
}

#[tokio::test]
async fn test_cancel_before_connect_rolls_back() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    let session = session_for(&watch);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(
        session.connect_with_cancel(&cancel).await,
        Err(SessionError::Cancelled)
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(!session.is_ready(CapabilityId::Battery));

    // The session is usable again afterwards
    session.connect().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connect_rolls_back() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    watch.set_connect_delay(Duration::from_secs(5));
    let session = session_for(&watch);

    let timed_out = tokio::time::timeout(Duration::from_secs(1), session.connect()).await;
    assert!(timed_out.is_err());
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let disconnect = TransportCall::Disconnect(ADDRESS.to_string());
    for _ in 0..10 {
        if watch.calls().contains(&disconnect) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(watch.calls().contains(&disconnect));
}

#[tokio::test]
async fn test_state_changes_are_observable() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    let session = session_for(&watch);
    let mut state = session.subscribe_state();
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);

    session.connect().await.unwrap();
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);

    session.disconnect().await.unwrap();
    assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_commands_require_connection() {
    let watch = Arc::new(SimulatedWatch::asteroid());
    let session = session_for(&watch);
    let time = NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();
    let message = ExternalAppMessage::new("org.example", "weather", "1", "hello");

    let results = [
        session.set_time(&time).await,
        session.sync_time().await,
        session.set_city("Oslo").await,
        session.set_forecast(&[]).await,
        session.post_notification(&Notification::default()).await,
        session.dismiss_notification(1).await,
        session.set_title("t").await,
        session.set_album("a").await,
        session.set_artist("a").await,
        session.set_playing(true).await,
        session.set_volume(10).await,
        session.send_app_message(&message).await,
        session.request_screenshot().await.map(|_| ()),
    ];

    for result in results {
        assert!(matches!(
            result,
            Err(SessionError::State {
                state: ConnectionState::Disconnected,
                ..
            })
        ));
    }
    assert!(watch.calls().is_empty());
}

#[tokio::test]
async fn test_set_time_writes_encoded_date() {
    let (watch, session) = connected().await;
    let time = NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(8, 30, 15)
        .unwrap();

    session.set_time(&time).await.unwrap();

    assert_eq!(
        watch.writes(),
        vec![(UUID_TIME_SET, vec![124, 5, 17, 8, 30, 15], WriteMode::WithResponse)]
    );
}

#[tokio::test]
async fn test_forecast_writes_three_characteristics() {
    let (watch, session) = connected().await;

    session
        .set_forecast(&[
            ForecastEntry::from_celsius(800u16, 0, 25),
            ForecastEntry::from_fahrenheit(500u16, 32.0, 98.0),
        ])
        .await
        .unwrap();

    let mut ids = 800u16.to_be_bytes().to_vec();
    ids.extend_from_slice(&500u16.to_be_bytes());
    let mut mins = 273i16.to_be_bytes().to_vec();
    mins.extend_from_slice(&273i16.to_be_bytes());
    let mut maxs = 298i16.to_be_bytes().to_vec();
    maxs.extend_from_slice(&310i16.to_be_bytes());

    assert_eq!(
        watch.writes(),
        vec![
            (UUID_WEATHER_IDS, ids, WriteMode::WithResponse),
            (UUID_WEATHER_MIN_TEMPS, mins, WriteMode::WithResponse),
            (UUID_WEATHER_MAX_TEMPS, maxs, WriteMode::WithResponse),
        ]
    );
}

#[tokio::test]
async fn test_oversized_forecast_writes_nothing() {
    let (watch, session) = connected().await;
    let entries = vec![ForecastEntry::from_celsius(800u16, 10, 20); 6];

    assert_eq!(
        session.set_forecast(&entries).await,
        Err(SessionError::Validation(CodecError::TooManyForecastEntries {
            len: 6,
            max: 5
        }))
    );
    assert!(watch.calls().is_empty());
}

#[tokio::test]
async fn test_notifications_and_app_messages() {
    let (watch, session) = connected().await;
    let notification = Notification {
        package_name: "org.example.chat".to_string(),
        id: 12,
        application_name: "Chat".to_string(),
        summary: "Alice".to_string(),
        body: "Lunch?".to_string(),
        vibration: Vibration::Strong,
        ..Default::default()
    };
    let message = ExternalAppMessage::new("org.example", "timer", "7", "start");

    session.post_notification(&notification).await.unwrap();
    session.dismiss_notification(12).await.unwrap();
    session.send_app_message(&message).await.unwrap();

    let writes = watch.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[0].0, UUID_NOTIFICATION_UPDATE);
    assert_eq!(writes[0].1, notification.encode());
    assert_eq!(
        String::from_utf8(writes[1].1.clone()).unwrap(),
        "<removed><id>12</id></removed>"
    );
    assert_eq!(writes[2].0, UUID_APP_MESSAGE);
    assert_eq!(writes[2].1, b"org.example\ntimer\n7\nstart".to_vec());
}

#[tokio::test]
async fn test_media_metadata_writes() {
    let (watch, session) = connected().await;

    session.set_title("Giant Steps").await.unwrap();
    session.set_artist("John Coltrane").await.unwrap();
    session.set_playing(true).await.unwrap();
    session.set_volume(70).await.unwrap();

    let writes: Vec<_> = watch.writes().into_iter().map(|(uuid, data, _)| (uuid, data)).collect();
    assert_eq!(
        writes,
        vec![
            (UUID_MEDIA_TITLE, b"Giant Steps".to_vec()),
            (UUID_MEDIA_ARTIST, b"John Coltrane".to_vec()),
            (UUID_MEDIA_PLAYING, vec![1]),
            (UUID_MEDIA_VOLUME, vec![70]),
        ]
    );
}

#[tokio::test]
async fn test_write_failure_is_reported() {
    let (watch, session) = connected().await;
    watch.fail_writes(Some(TransportError::Disconnected));
    assert_eq!(
        session.set_title("x").await,
        Err(SessionError::DeviceDisconnected)
    );
    watch.fail_writes(Some(TransportError::Timeout));
    assert!(matches!(session.set_title("x").await, Err(SessionError::Io(_))));
}

#[tokio::test]
async fn test_media_commands_reach_subscribers() {
    let (watch, session) = connected().await;
    let mut first = session.subscribe_media_commands();
    let mut second = session.subscribe_media_commands();

    assert!(watch.notify(UUID_MEDIA_COMMANDS, vec![0x04]).await);
    assert!(watch.notify(UUID_MEDIA_COMMANDS, vec![0x04, 0x32]).await);
    assert!(watch.notify(UUID_MEDIA_COMMANDS, vec![0x09]).await);
    assert!(watch.notify(UUID_MEDIA_COMMANDS, vec![0x02]).await);

    for rx in [&mut first, &mut second] {
        assert_eq!(rx.recv().await, Some(MediaCommand::Volume(50)));
        assert_eq!(rx.recv().await, Some(MediaCommand::Play));
    }
}

#[tokio::test]
async fn test_screenshot_is_reassembled() {
    let (watch, session) = connected().await;
    watch.respond_to_write(
        UUID_SCREENSHOT_REQUEST,
        UUID_SCREENSHOT_CONTENT,
        vec![screenshot_header(6), vec![1, 2], vec![3, 4, 5], vec![6]],
    );

    let mut progress = session.subscribe_screenshot_progress();
    let observer = tokio::spawn(async move {
        let mut seen = vec![*progress.borrow_and_update()];
        while progress.changed().await.is_ok() {
            let value = *progress.borrow_and_update();
            seen.push(value);
            if value == 100 {
                break;
            }
        }
        seen
    });

    let image = session.request_screenshot().await.unwrap();
    assert_eq!(image, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(
        watch.writes(),
        vec![(UUID_SCREENSHOT_REQUEST, SCREENSHOT_TRIGGER.to_vec(), WriteMode::WithoutResponse)]
    );

    let seen = observer.await.unwrap();
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", seen);
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn test_bad_screenshot_header_allows_retry() {
    let (watch, session) = connected().await;
    watch.respond_to_write(UUID_SCREENSHOT_REQUEST, UUID_SCREENSHOT_CONTENT, vec![vec![1, 2]]);

    assert!(matches!(
        session.request_screenshot().await,
        Err(SessionError::ProtocolViolation(_))
    ));

    watch.respond_to_write(
        UUID_SCREENSHOT_REQUEST,
        UUID_SCREENSHOT_CONTENT,
        vec![screenshot_header(2), vec![7, 7]],
    );
    assert_eq!(session.request_screenshot().await, Ok(vec![7, 7]));
}

#[tokio::test]
async fn test_screenshot_overflow_is_fatal_for_the_transfer() {
    let (watch, session) = connected().await;
    watch.respond_to_write(
        UUID_SCREENSHOT_REQUEST,
        UUID_SCREENSHOT_CONTENT,
        vec![screenshot_header(2), vec![1, 2, 3]],
    );

    assert!(matches!(
        session.request_screenshot().await,
        Err(SessionError::ProtocolViolation(_))
    ));

    watch.respond_to_write(
        UUID_SCREENSHOT_REQUEST,
        UUID_SCREENSHOT_CONTENT,
        vec![screenshot_header(0)],
    );
    assert_eq!(session.request_screenshot().await, Ok(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn test_one_screenshot_at_a_time() {
    let (watch, session) = connected().await;
    // The watch never sends anything back
    let first = tokio::time::timeout(Duration::from_secs(1), session.request_screenshot());

    let (first, second) = tokio::join!(first, session.request_screenshot());
    assert!(first.is_err());
    assert_eq!(second, Err(SessionError::TransferInProgress));

    // Dropping the first request freed the reassembler
    watch.respond_to_write(
        UUID_SCREENSHOT_REQUEST,
        UUID_SCREENSHOT_CONTENT,
        vec![screenshot_header(1), vec![9]],
    );
    assert_eq!(session.request_screenshot().await, Ok(vec![9]));
}

#[tokio::test]
async fn test_disconnect_fails_pending_screenshot() {
    let (_watch, session) = connected().await;

    let (result, disconnected) = tokio::join!(session.request_screenshot(), async {
        tokio::task::yield_now().await;
        session.disconnect().await
    });

    assert_eq!(result, Err(SessionError::DeviceDisconnected));
    assert!(disconnected.is_ok());
}

#[tokio::test]
async fn test_trigger_write_failure_frees_reassembler() {
    let (watch, session) = connected().await;
    watch.fail_writes(Some(TransportError::Io("busy".to_string())));
    assert!(matches!(
        session.request_screenshot().await,
        Err(SessionError::Io(_))
    ));

    watch.fail_writes(None);
    watch.respond_to_write(
        UUID_SCREENSHOT_REQUEST,
        UUID_SCREENSHOT_CONTENT,
        vec![screenshot_header(1), vec![5]],
    );
    assert_eq!(session.request_screenshot().await, Ok(vec![5]));
}
