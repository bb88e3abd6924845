use chrono::Utc;
use std::sync::{Arc, Mutex};
use wristband_protocol::{
    checksum, BandCommunicator, Characteristic, EngineConfig, Record, RecordKind, SampleTime,
    SensorContact, SessionManager, SportFraming, SportRecord, Transport, UtcClock,
};

const WIRE_TS: u32 = 1_700_000_000;
const TS_MS: i64 = 1_700_000_000_000;

struct RecordingTransport {
    written: Mutex<Vec<Vec<u8>>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            written: Mutex::new(Vec::new()),
        })
    }

    fn opcodes(&self) -> Vec<u8> {
        self.written.lock().unwrap().iter().map(|f| f[2]).collect()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send_frame(&self, frame: &[u8]) -> wristband_protocol::Result<()> {
        self.written.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

fn band(transport: Arc<RecordingTransport>) -> BandCommunicator<Utc> {
    BandCommunicator::with_config(
        transport,
        UtcClock::with_zone(Utc),
        EngineConfig::default(),
        SportFraming::Terminated,
    )
}

fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut raw = vec![0xFF, (body.len() + 4) as u8, tag];
    raw.extend_from_slice(body);
    raw.push(checksum::compute(&raw));
    raw
}

fn sport_chunk(wire_ts: u32, steps: u32, calorie_tenths: u32) -> Vec<u8> {
    let mut chunk = wire_ts.to_be_bytes().to_vec();
    chunk.extend_from_slice(&steps.to_be_bytes()[1..]);
    chunk.extend_from_slice(&calorie_tenths.to_be_bytes()[1..]);
    chunk
}

fn expected_sport() -> Vec<SportRecord> {
    vec![
        SportRecord {
            timestamp_ms: TS_MS,
            steps: 1234,
            calorie_tenths: 567,
        },
        SportRecord {
            timestamp_ms: TS_MS + 3_600_000,
            steps: 4321,
            calorie_tenths: 765,
        },
    ]
}

#[tokio::test]
async fn sport_history_across_two_frames() {
    let transport = RecordingTransport::new();
    let mut band = band(transport.clone());
    let sport = Arc::new(Mutex::new(Vec::new()));
    let sink = sport.clone();
    band.subscribe(
        RecordKind::Sport,
        Arc::new(move |r: &Record| sink.lock().unwrap().push(r.clone())),
    );

    band.fetch_sport_history().await.unwrap();
    assert_eq!(transport.opcodes(), vec![0x16]);

    let first = sport_chunk(WIRE_TS, 1234, 567);
    let mut second = sport_chunk(WIRE_TS + 3600, 4321, 765);
    second.extend_from_slice(&[0xFF; 4]);

    assert!(band.on_frame_received(&frame(0x16, &first)).is_none());
    let record = band.on_frame_received(&frame(0x16, &second));

    assert_eq!(record, Some(Record::Sport(expected_sport())));
    assert_eq!(sport.lock().unwrap().len(), 1);
    assert_eq!(band.stats().records_emitted, 1);
}

#[tokio::test]
async fn compact_sport_history_is_returned_oldest_first() {
    let mut band = band(RecordingTransport::new());
    band.set_sport_framing(SportFraming::Compact);

    let mut body = sport_chunk(WIRE_TS + 3600, 4321, 765);
    body.extend_from_slice(&sport_chunk(WIRE_TS, 1234, 567));

    let record = band.on_frame_received(&frame(0x16, &body));
    assert_eq!(record, Some(Record::Sport(expected_sport())));
}

#[tokio::test]
async fn step_series_is_spaced_five_minutes_apart() {
    let transport = RecordingTransport::new();
    let mut band = band(transport.clone());

    band.fetch_step_series().await.unwrap();

    let mut body = WIRE_TS.to_be_bytes().to_vec();
    body.extend_from_slice(&[0x01, 0x00, 0x00, 0x20]);
    assert!(band.on_frame_received(&frame(0x91, &body)).is_none());

    match band.on_frame_received(&frame(0x11, &[])) {
        Some(Record::StepSeries(steps)) => {
            assert_eq!(steps.len(), 2);
            assert_eq!(steps[0].timestamp_ms, TS_MS);
            assert_eq!(steps[0].value, 256);
            assert_eq!(steps[1].timestamp_ms, TS_MS + 300_000);
            assert_eq!(steps[1].value, 32);
        }
        other => panic!("Expected StepSeries, got {:?}", other),
    }
    assert_eq!(transport.opcodes(), vec![0x91]);
}

#[tokio::test]
async fn six_axis_stream_without_timestamp() {
    let transport = RecordingTransport::new();
    let mut band = band(transport.clone());
    band.set_six_axis_frequency(25).await.unwrap();

    let mut body = 0xFFu32.to_be_bytes().to_vec();
    for v in [1i16, -1, 2, -2, 3, -3] {
        body.extend_from_slice(&v.to_be_bytes());
    }

    match band.on_frame_received(&frame(0x63, &body)) {
        Some(Record::Motion6dStream(samples)) => {
            assert_eq!(samples.len(), 1);
            assert_eq!(samples[0].time, SampleTime::Unknown);
            assert_eq!(samples[0].accel, [1, -1, 2]);
            assert_eq!(samples[0].gyro, [-2, 3, -3]);
        }
        other => panic!("Expected Motion6dStream, got {:?}", other),
    }
    assert_eq!(transport.opcodes(), vec![0x62]);
}

#[tokio::test]
async fn standard_heart_rate_characteristic() {
    let mut band = band(RecordingTransport::new());

    // u8 heart rate, contact detected, one RR interval of 1024/1024 s
    let data = [0x16, 72, 0x00, 0x04];
    match band.on_characteristic(Characteristic::HeartRateMeasurement, &data) {
        Some(Record::HeartRateMeasurement(m)) => {
            assert_eq!(m.bpm, 72);
            assert_eq!(m.contact, SensorContact::Detected);
            assert_eq!(m.rr_intervals_ms, vec![1000]);
        }
        other => panic!("Expected HeartRateMeasurement, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_and_unknown_frames_are_counted() {
    let mut band = band(RecordingTransport::new());

    assert!(band.on_frame_received(&[0xFF]).is_none());
    assert!(band.on_frame_received(&frame(0x99, &[1, 2])).is_none());
    // heart-rate alarm needs three status bytes
    assert!(band.on_frame_received(&frame(0x5B, &[1])).is_none());

    let stats = band.stats();
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.unknown_tags, 1);
    assert_eq!(stats.decode_failures, 2);
    assert_eq!(stats.records_emitted, 0);
}

#[test]
fn records_serialize_with_kind_tag() {
    let json = serde_json::to_string(&Record::Sport(expected_sport())).unwrap();
    assert!(json.contains("\"kind\":\"Sport\""));
    let back: Record = serde_json::from_str(&json).unwrap();
    assert_eq!(back, Record::Sport(expected_sport()));
}

#[test]
fn session_manager_routes_by_address() {
    let config = EngineConfig::from_json_str(r#"{ "compact_sport_models": ["B5 Lite"] }"#).unwrap();
    let mut sessions = SessionManager::with_clock(UtcClock::with_zone(Utc), config);
    sessions.connect("11:22", RecordingTransport::new(), Some("b5 lite"));
    sessions.connect("33:44", RecordingTransport::new(), Some("B7"));

    let mut body = sport_chunk(WIRE_TS + 3600, 4321, 765);
    body.extend_from_slice(&sport_chunk(WIRE_TS, 1234, 567));
    let compact = frame(0x16, &body);

    assert_eq!(
        sessions.on_frame_received("11:22", &compact).unwrap(),
        Some(Record::Sport(expected_sport()))
    );
    // terminated framing buffers the same frame until a terminator arrives
    assert_eq!(sessions.on_frame_received("33:44", &compact).unwrap(), None);
}
