//! End-to-end tests: host requests in, transport pushes in, host messages out.

use chanmux::{
    CacheConfig, Engine, EngineHandle, HostMessage, LoopbackTransport, Sample, SeriesBatch,
    TransportCall,
};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Engine with the ticker off; ticks are driven with `tick_now`.
fn start(transport: &LoopbackTransport, config: CacheConfig) -> EngineHandle {
    init_tracing();
    let config = config.with_tick_interval(Duration::ZERO);
    Engine::start(config, Box::new(transport.clone())).unwrap()
}

fn subscribe(engine: &EngineHandle, monitor: &str, channel: &str) {
    engine
        .subscribe_with_reply(monitor, channel)
        .unwrap()
        .recv_timeout(WAIT)
        .unwrap()
        .unwrap();
}

/// Wait until the worker has handled everything queued before this call.
fn settle(engine: &EngineHandle) {
    engine.inspect(|_| ()).unwrap();
}

fn drain(engine: &EngineHandle) -> Vec<HostMessage> {
    engine.outbox().try_iter().collect()
}

// --- Realtime ---

#[test]
fn test_realtime_fan_out_to_all_monitors() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport, CacheConfig::default());

    subscribe(&engine, "m1", "OPC1:channelA");
    subscribe(&engine, "m2", "OPC1:channelA");
    assert_eq!(
        transport.calls(),
        vec![TransportCall::Subscribe("realtime.data_OPC1:channelA".into())]
    );

    transport.publish(
        "realtime.data_OPC1:channelA",
        vec![Sample::new(1000.0, 1.0), Sample::new(1001.0, 2.0)],
    );
    settle(&engine);
    settle(&engine);

    let messages = drain(&engine);
    assert_eq!(messages.len(), 4);
    assert_eq!(
        messages[0].to_wire(),
        json!([4, "m1", "OPC1:channelA", [[1000.0], [1.0]]])
    );
    assert_eq!(messages[1].monitor(), "m2");
    assert_eq!(
        messages[3].to_wire(),
        json!([4, "m2", "OPC1:channelA", [[1001.0], [2.0]]])
    );
}

#[test]
fn test_wire_requests_drive_the_engine() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport, CacheConfig::default());

    engine.request_wire(&json!([1, "m1", "c1"])).unwrap();
    engine.request_wire(&json!([3, "m1", 100, 200, 500])).unwrap();
    settle(&engine);
    assert!(transport.is_subscribed("realtime.data_c1"));

    transport.publish("realtime.data_c1", vec![Sample::new(150.0, 1.0)]);
    transport.publish("realtime.data_c1", vec![Sample::new(250.0, 2.0)]);
    settle(&engine);
    drain(&engine);

    engine.tick_now().unwrap();
    assert_eq!(
        drain(&engine)
            .into_iter()
            .map(|m| m.to_wire())
            .collect::<Vec<_>>(),
        vec![json!([5, "m1", "c1", [[150.0], [1.0]]])]
    );

    engine.request_wire(&json!([2, "m1", "c1"])).unwrap();
    settle(&engine);
    assert!(!transport.is_subscribed("realtime.data_c1"));
}

// --- Delivery ---

#[test]
fn test_tick_resends_full_window_every_time() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport, CacheConfig::default());

    subscribe(&engine, "m1", "c1");
    engine.set_range_of_interest("m1", 100.0, 200.0, 500).unwrap();
    engine
        .ingest_history(
            "c1",
            100.0,
            200.0,
            vec![Sample::new(120.0, 1.0), Sample::new(150.0, 2.0)],
        )
        .unwrap();

    for _ in 0..2 {
        let report = engine.tick_now().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.samples, 2);
    }

    let messages = drain(&engine);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], messages[1]);

    engine.set_range_of_interest("m1", 140.0, 300.0, 500).unwrap();
    engine.tick_now().unwrap();
    match &drain(&engine)[0] {
        HostMessage::HistoricalData { data, .. } => assert_eq!(
            data,
            &SeriesBatch {
                timestamps: vec![150.0],
                values: vec![2.0],
            }
        ),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unsubscribed_monitor_gets_nothing() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport, CacheConfig::default());

    subscribe(&engine, "m1", "c1");
    engine.set_range_of_interest("m1", 0.0, 10.0, 10).unwrap();
    engine.unsubscribe("m1", "c1").unwrap();

    let report = engine.tick_now().unwrap();
    assert_eq!(report.pairs, 0);
    assert!(drain(&engine).is_empty());
}

// --- Subscriptions ---

#[test]
fn test_double_unsubscribe_keeps_other_monitor() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport, CacheConfig::default());

    subscribe(&engine, "m1", "X");
    subscribe(&engine, "m2", "X");
    engine.unsubscribe("m1", "X").unwrap();
    engine.unsubscribe("m1", "X").unwrap();
    settle(&engine);

    assert_eq!(engine.inspect(|dm| dm.refcount("X")).unwrap(), 1);
    assert!(transport.is_subscribed("realtime.data_X"));
    assert_eq!(transport.unsubscribe_count("realtime.data_X"), 0);
}

#[test]
fn test_reconnect_resubscribes_referenced_channels() {
    let transport = LoopbackTransport::new();
    let engine = start(&transport, CacheConfig::default());

    subscribe(&engine, "m1", "a");
    subscribe(&engine, "m2", "a");
    subscribe(&engine, "m2", "b");
    subscribe(&engine, "m3", "c");
    engine.unsubscribe("m3", "c").unwrap();

    transport.disconnect();
    engine.reconnected().unwrap();
    settle(&engine);

    assert!(transport.is_subscribed("realtime.data_a"));
    assert!(transport.is_subscribed("realtime.data_b"));
    assert!(!transport.is_subscribed("realtime.data_c"));
    assert_eq!(transport.subscribe_count("realtime.data_a"), 2);
    assert_eq!(engine.inspect(|dm| dm.refcount("a")).unwrap(), 2);

    transport.publish("realtime.data_b", vec![Sample::new(1.0, 1.0)]);
    settle(&engine);
    assert_eq!(drain(&engine).len(), 1);
}

// --- Persistence ---

#[test]
fn test_samples_and_coverage_survive_restart() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig::default().with_path(dir.path().join("cache"));
    let transport = LoopbackTransport::new();

    {
        let engine = start(&transport, config.clone());
        subscribe(&engine, "m1", "OPC2:channelB");
        transport.publish("realtime.data_OPC2:channelB", vec![Sample::new(50.0, 5.0)]);
        engine
            .ingest_history("OPC2:channelB", 0.0, 40.0, vec![Sample::new(10.0, 1.0)])
            .unwrap();
        settle(&engine);
        engine.shutdown().unwrap();
    }

    let transport = LoopbackTransport::new();
    let engine = start(&transport, config);

    let channels = engine.inspect(|dm| dm.channels().unwrap()).unwrap();
    assert_eq!(channels, vec!["OPC2:channelB".to_string()]);

    let gaps = engine
        .inspect(|dm| dm.unloaded_ranges("OPC2:channelB", 0.0, 100.0).unwrap())
        .unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!((gaps[0].start, gaps[0].end), (40.0, 100.0));

    // Monitors are process state; the host subscribes again.
    assert_eq!(engine.tick_now().unwrap().pairs, 0);
    subscribe(&engine, "m1", "OPC2:channelB");
    engine.set_range_of_interest("m1", 0.0, 100.0, 10).unwrap();
    engine.tick_now().unwrap();
    assert_eq!(
        drain(&engine)[0].to_wire(),
        json!([5, "m1", "OPC2:channelB", [[10.0, 50.0], [1.0, 5.0]]])
    );
}

#[test]
fn test_custom_topic_prefix() {
    let transport = LoopbackTransport::new();
    let engine = start(
        &transport,
        CacheConfig::default().with_topic_prefix("plant/"),
    );

    subscribe(&engine, "m1", "pump1");
    assert!(transport.is_subscribed("plant/pump1"));
    assert!(!transport.is_subscribed("realtime.data_pump1"));
}
