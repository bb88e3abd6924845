//! Band communicator
//!
//! [`BandCommunicator`] is the per-connection entry point: one request method
//! per device command, inbound notification handling, and record listeners.
//! The platform supplies a [`Transport`] that writes frames to the band's
//! command characteristic and forwards every notification to
//! [`BandCommunicator::on_frame_received`] (vendor characteristic) or
//! [`BandCommunicator::on_characteristic`] (standard heart-rate
//! characteristics).
//!
//! Sends are fire-and-forget: delivery, acknowledgement and retries belong
//! to the transport. Every fetch resets its family's reassembly session
//! before the command goes out.

use crate::clock::UtcClock;
use crate::command::{CommandEncoder, Opcode, SettingId};
use crate::config::{EngineConfig, SportFraming};
use crate::dispatcher::{DispatchStats, FrameDispatcher};
use crate::heart_rate;
use crate::records::{Record, RecordKind, UserInfo};
use crate::types::{hex_dump, Characteristic, RecordFamily, Result};
use chrono::{Local, TimeZone, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for the BLE link that must be implemented by the platform
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Write one command frame to the band
    async fn send_frame(&self, frame: &[u8]) -> Result<()>;
}

/// Callback for decoded records
pub trait RecordListener: Send + Sync {
    fn on_record(&self, record: &Record);
}

impl<F> RecordListener for F
where
    F: Fn(&Record) + Send + Sync,
{
    fn on_record(&self, record: &Record) {
        self(record)
    }
}

/// Protocol engine for one connected band
pub struct BandCommunicator<Tz: TimeZone = Local> {
    transport: Arc<dyn Transport>,
    dispatcher: FrameDispatcher<Tz>,
    config: EngineConfig,
    listeners: HashMap<RecordKind, Vec<Arc<dyn RecordListener>>>,
    catch_all: Vec<Arc<dyn RecordListener>>,
    connected: bool,
}

impl BandCommunicator<Local> {
    /// Communicator using the host time zone and default configuration
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(
            transport,
            UtcClock::local(),
            EngineConfig::default(),
            SportFraming::default(),
        )
    }
}

impl<Tz: TimeZone> BandCommunicator<Tz> {
    pub fn with_config(
        transport: Arc<dyn Transport>,
        clock: UtcClock<Tz>,
        config: EngineConfig,
        sport_framing: SportFraming,
    ) -> Self {
        Self {
            transport,
            dispatcher: FrameDispatcher::new(clock, &config, sport_framing),
            config,
            listeners: HashMap::new(),
            catch_all: Vec::new(),
            connected: false,
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a listener for one kind of record
    pub fn subscribe(&mut self, kind: RecordKind, listener: Arc<dyn RecordListener>) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Register a listener for every record
    pub fn subscribe_all(&mut self, listener: Arc<dyn RecordListener>) {
        self.catch_all.push(listener);
    }

    /// Remove every listener registered for `kind`
    pub fn unsubscribe(&mut self, kind: RecordKind) {
        self.listeners.remove(&kind);
    }

    fn notify(&self, record: &Record) {
        if let Some(listeners) = self.listeners.get(&record.kind()) {
            for listener in listeners {
                listener.on_record(record);
            }
        }
        for listener in &self.catch_all {
            listener.on_record(record);
        }
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    pub fn on_connected(&mut self) {
        info!("Band connected");
        self.connected = true;
    }

    /// Drops every partially reassembled fetch
    pub fn on_disconnected(&mut self) {
        let pending = self.dispatcher.sessions().active_families();
        if !pending.is_empty() {
            warn!("Band disconnected with incomplete fetches: {:?}", pending);
        } else {
            info!("Band disconnected");
        }
        self.dispatcher.reset_all();
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handle a notification from the vendor characteristic
    pub fn on_frame_received(&mut self, raw: &[u8]) -> Option<Record> {
        debug!("RX {}", hex_dump(raw, self.config.log_frame_bytes));
        let record = self.dispatcher.on_frame_received(raw)?;
        self.notify(&record);
        Some(record)
    }

    /// Handle a notification from any subscribed characteristic
    pub fn on_characteristic(
        &mut self,
        characteristic: Characteristic,
        data: &[u8],
    ) -> Option<Record> {
        let decoded = match characteristic {
            Characteristic::Vendor => return self.on_frame_received(data),
            Characteristic::HeartRateMeasurement => {
                heart_rate::parse_measurement(data).map(Record::HeartRateMeasurement)
            }
            Characteristic::BodySensorLocation => {
                heart_rate::parse_body_sensor_location(data).map(Record::BodySensorLocation)
            }
        };

        match decoded {
            Ok(record) => {
                self.notify(&record);
                Some(record)
            }
            Err(e) => {
                warn!("Dropping {:?} notification: {}", characteristic, e);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sport_framing(&self) -> SportFraming {
        self.dispatcher.sport_framing()
    }

    pub fn set_sport_framing(&mut self, framing: SportFraming) {
        self.dispatcher.set_sport_framing(framing);
    }

    /// Pick sport framing from the model name reported by the band
    pub fn set_model_name(&mut self, model_name: &str) {
        let framing = self.config.sport_framing_for(model_name);
        info!("Model '{}' uses {:?} sport framing", model_name, framing);
        self.set_sport_framing(framing);
    }

    /// Drop a family's partial fetch
    pub fn reset_family(&mut self, family: RecordFamily) -> bool {
        self.dispatcher.reset_family(family)
    }

    pub fn dispatcher(&self) -> &FrameDispatcher<Tz> {
        &self.dispatcher
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        let opcode = frame
            .get(2)
            .and_then(|&b| Opcode::from_u8(b))
            .map(|op| op.to_string())
            .unwrap_or_else(|| "raw".to_string());
        debug!(
            "TX {}: {}",
            opcode,
            hex_dump(&frame, self.config.log_frame_bytes)
        );
        self.transport.send_frame(&frame).await
    }

    async fn fetch(&mut self, family: RecordFamily, frame: Vec<u8>) -> Result<()> {
        self.dispatcher.reset_family(family);
        self.send(frame).await
    }

    /// Send an arbitrary opcode with byte arguments
    pub async fn send_command(&self, opcode: u8, args: Option<&[i32]>) -> Result<()> {
        self.send(CommandEncoder::encode(opcode, args)).await
    }

    // ------------------------------------------------------------------
    // Device control
    // ------------------------------------------------------------------

    pub async fn set_utc_time(&self, utc_millis: i64) -> Result<()> {
        let frame = CommandEncoder::set_utc_time(self.dispatcher.clock(), utc_millis);
        self.send(frame).await
    }

    /// Set the band clock to the current host time
    pub async fn sync_time(&self) -> Result<()> {
        self.set_utc_time(Utc::now().timestamp_millis()).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(CommandEncoder::simple(Opcode::Shutdown)).await
    }

    pub async fn restore_defaults(&self) -> Result<()> {
        self.send(CommandEncoder::simple(Opcode::RestoreDefaults)).await
    }

    pub async fn disable_radio(&self) -> Result<()> {
        self.send(CommandEncoder::simple(Opcode::DisableRadio)).await
    }

    pub async fn enter_firmware_update(&self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::EnterFirmwareUpdate);
        self.send(frame).await
    }

    // ------------------------------------------------------------------
    // History fetches
    // ------------------------------------------------------------------

    pub async fn fetch_sport_history(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchSportHistory);
        self.fetch(RecordFamily::Sport, frame).await
    }

    pub async fn fetch_heart_rate_records(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchHeartRateRecords);
        self.fetch(RecordFamily::HeartRateRecords, frame).await
    }

    pub async fn fetch_heart_rate_series(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchHeartRateSeries);
        self.fetch(RecordFamily::HeartRateSeries, frame).await
    }

    pub async fn fetch_respiratory_records(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchRespiratoryRecords);
        self.fetch(RecordFamily::RespiratoryRecords, frame).await
    }

    pub async fn fetch_respiratory_series(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchRespiratorySeries);
        self.fetch(RecordFamily::RespiratorySeries, frame).await
    }

    pub async fn fetch_step_records(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchStepRecords);
        self.fetch(RecordFamily::StepRecords, frame).await
    }

    pub async fn fetch_step_series(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchStepSeries);
        self.fetch(RecordFamily::StepSeries, frame).await
    }

    pub async fn fetch_interval_steps(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchIntervalSteps);
        self.fetch(RecordFamily::IntervalSteps, frame).await
    }

    pub async fn fetch_single_tap_records(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchSingleTapRecords);
        self.fetch(RecordFamily::SingleTap, frame).await
    }

    pub async fn fetch_sleep(&mut self) -> Result<()> {
        let frame = CommandEncoder::fetch_sleep();
        self.fetch(RecordFamily::Sleep, frame).await
    }

    pub async fn fetch_history_record(&mut self, index: u8) -> Result<()> {
        let frame = CommandEncoder::fetch_history_record(index);
        self.fetch(RecordFamily::HistoryRecord, frame).await
    }

    pub async fn fetch_accel_history(&mut self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::FetchAccelHistory);
        self.fetch(RecordFamily::Motion3dHistory, frame).await
    }

    // ------------------------------------------------------------------
    // Profile and settings
    // ------------------------------------------------------------------

    pub async fn get_user_profile(&self) -> Result<()> {
        self.send(CommandEncoder::simple(Opcode::GetUserProfile)).await
    }

    pub async fn set_user_profile(&self, profile: &UserInfo) -> Result<()> {
        self.send(CommandEncoder::set_user_profile(profile)).await
    }

    pub async fn get_heart_rate_status(&self) -> Result<()> {
        self.send(CommandEncoder::simple(Opcode::HeartRateStatus)).await
    }

    pub async fn set_heart_rate_status(&self, enabled: bool) -> Result<()> {
        self.send(CommandEncoder::set_heart_rate_status(enabled)).await
    }

    pub async fn get_heart_rate_max(&self) -> Result<()> {
        let frame = CommandEncoder::get_setting(SettingId::HeartRateMax);
        self.send(frame).await
    }

    pub async fn set_heart_rate_max(&self, bpm: u8) -> Result<()> {
        let frame = CommandEncoder::set_setting(SettingId::HeartRateMax, bpm);
        self.send(frame).await
    }

    pub async fn get_accel_frequency(&self) -> Result<()> {
        let frame = CommandEncoder::get_setting(SettingId::AccelFrequency);
        self.send(frame).await
    }

    pub async fn set_accel_frequency(&self, hz: u8) -> Result<()> {
        let frame = CommandEncoder::set_setting(SettingId::AccelFrequency, hz);
        self.send(frame).await
    }

    pub async fn get_accel_streaming(&self) -> Result<()> {
        let frame = CommandEncoder::get_setting(SettingId::AccelStreaming);
        self.send(frame).await
    }

    pub async fn set_accel_streaming(&self, enabled: bool) -> Result<()> {
        let frame = CommandEncoder::set_setting(SettingId::AccelStreaming, enabled as u8);
        self.send(frame).await
    }

    pub async fn get_blood_oxygen_mode(&self) -> Result<()> {
        self.send(CommandEncoder::simple(Opcode::BloodOxygenMode)).await
    }

    pub async fn set_blood_oxygen_mode(&self, mode: u8) -> Result<()> {
        self.send(CommandEncoder::set_blood_oxygen_mode(mode)).await
    }

    pub async fn get_heart_rate_alarm(&self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::GetHeartRateAlarm);
        self.send(frame).await
    }

    pub async fn set_heart_rate_alarm(&self, enabled: bool, low: u8, high: u8) -> Result<()> {
        let frame = CommandEncoder::set_heart_rate_alarm(enabled, low, high);
        self.send(frame).await
    }

    pub async fn get_six_axis_frequency(&self) -> Result<()> {
        let frame = CommandEncoder::simple(Opcode::GetSixAxisFrequency);
        self.send(frame).await
    }

    /// Setting a non-zero frequency starts 6-axis streaming
    pub async fn set_six_axis_frequency(&self, hz: u8) -> Result<()> {
        self.send(CommandEncoder::set_six_axis_frequency(hz)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;
    use crate::records::{HistoryRecord, SleepStage};
    use crate::types::BandError;
    use chrono::FixedOffset;
    use std::sync::Mutex;

    /// Mock transport that records written frames
    struct MockTransport {
        written: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                written: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                written: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send_frame(&self, frame: &[u8]) -> Result<()> {
            if self.fail {
                return Err(BandError::Transport("link down".to_string()));
            }
            self.written.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    /// Listener that collects every record it sees
    #[derive(Default)]
    struct Collector {
        records: Mutex<Vec<Record>>,
    }

    impl RecordListener for Collector {
        fn on_record(&self, record: &Record) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    const OFFSET_S: i32 = -7200;

    fn communicator(transport: Arc<MockTransport>) -> BandCommunicator<FixedOffset> {
        BandCommunicator::with_config(
            transport,
            UtcClock::with_zone(FixedOffset::east_opt(OFFSET_S).unwrap()),
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

    #[tokio::test]
    async fn test_heart_rate_series_end_to_end() {
        let transport = Arc::new(MockTransport::new());
        let mut comm = communicator(transport.clone());
        let collector = Arc::new(Collector::default());
        comm.subscribe(RecordKind::HeartRateSeries, collector.clone());

        comm.fetch_heart_rate_series().await.unwrap();
        assert_eq!(transport.get_written_data(), vec![vec![0xFF, 0x04, 0x22, 0xE1]]);

        let wire: u32 = 1_700_000_000;
        let mut body = wire.to_be_bytes().to_vec();
        body.extend_from_slice(&[64, 66]);

        assert_eq!(comm.on_frame_received(&frame(0x22, &body)), None);
        assert!(comm.on_frame_received(&frame(0xA2, &[])).is_some());

        let anchor = (wire as i64 - OFFSET_S as i64) * 1000;
        let records = collector.records.lock().unwrap();
        assert_eq!(
            *records,
            vec![Record::HeartRateSeries(vec![
                HistoryRecord {
                    timestamp_ms: anchor,
                    value: 64
                },
                HistoryRecord {
                    timestamp_ms: anchor + 60_000,
                    value: 66
                },
            ])]
        );
    }

    #[tokio::test]
    async fn test_fetch_resets_stale_session() {
        let transport = Arc::new(MockTransport::new());
        let mut comm = communicator(transport);

        let mut stale = 1_000u32.to_be_bytes().to_vec();
        stale.push(99);
        comm.on_frame_received(&frame(0x21, &stale));
        assert_eq!(
            comm.dispatcher()
                .sessions()
                .pending_frames(RecordFamily::HeartRateRecords),
            1
        );

        comm.fetch_heart_rate_records().await.unwrap();
        assert_eq!(
            comm.dispatcher()
                .sessions()
                .pending_frames(RecordFamily::HeartRateRecords),
            0
        );
    }

    #[tokio::test]
    async fn test_listeners_are_filtered_by_kind() {
        let mut comm = communicator(Arc::new(MockTransport::new()));
        let sleep = Arc::new(Collector::default());
        let everything = Arc::new(Collector::default());
        comm.subscribe(RecordKind::Sleep, sleep.clone());
        comm.subscribe_all(everything.clone());

        comm.on_frame_received(&frame(0x46, &[0]));

        let mut body = 100_000u32.to_be_bytes().to_vec();
        body.extend_from_slice(&[5, 5, 5, 0]);
        comm.on_frame_received(&frame(0x05, &body));

        assert_eq!(sleep.records.lock().unwrap().len(), 1);
        assert_eq!(everything.records.lock().unwrap().len(), 2);

        match &sleep.records.lock().unwrap()[0] {
            Record::Sleep(records) => {
                assert_eq!(records.len(), 4);
                assert_eq!(records[2].stage, SleepStage::Deep);
                assert_eq!(records[3].stage, SleepStage::Awake);
            }
            other => panic!("Expected Sleep, got {:?}", other),
        }

        comm.unsubscribe(RecordKind::Sleep);
        comm.on_frame_received(&frame(0x05, &body));
        assert_eq!(sleep.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closure_listener() {
        let mut comm = communicator(Arc::new(MockTransport::new()));
        let seen = Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        comm.subscribe(
            RecordKind::HeartRateMeasurement,
            Arc::new(move |_: &Record| *counter.lock().unwrap() += 1),
        );

        let record = comm.on_characteristic(Characteristic::HeartRateMeasurement, &[0x00, 70]);
        assert!(matches!(record, Some(Record::HeartRateMeasurement(ref m)) if m.bpm == 70));
        assert!(comm
            .on_characteristic(Characteristic::HeartRateMeasurement, &[])
            .is_none());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_clears_sessions() {
        let mut comm = communicator(Arc::new(MockTransport::new()));
        comm.on_connected();
        assert!(comm.is_connected());

        let mut body = 1_000u32.to_be_bytes().to_vec();
        body.push(70);
        comm.on_frame_received(&frame(0x22, &body));
        comm.on_frame_received(&frame(0x24, &body));
        assert_eq!(comm.dispatcher().sessions().active_families().len(), 2);

        comm.on_disconnected();
        assert!(!comm.is_connected());
        assert!(comm.dispatcher().sessions().active_families().is_empty());
    }

    #[tokio::test]
    async fn test_command_frames() {
        let transport = Arc::new(MockTransport::new());
        let mut comm = communicator(transport.clone());

        comm.fetch_sleep().await.unwrap();
        comm.set_heart_rate_max(185).await.unwrap();
        comm.get_accel_streaming().await.unwrap();
        comm.set_heart_rate_alarm(true, 40, 170).await.unwrap();
        comm.set_six_axis_frequency(50).await.unwrap();
        comm.set_utc_time(1_700_000_000_000).await.unwrap();

        let written = transport.get_written_data();
        assert_eq!(written.len(), 6);
        assert_eq!(&written[0][..4], &[0xFF, 0x05, 0x05, 0x02]);
        assert_eq!(&written[1][..5], &[0xFF, 0x06, 0x75, 6, 185]);
        assert_eq!(&written[2][..4], &[0xFF, 0x05, 0x74, 12]);
        assert_eq!(&written[3][..6], &[0xFF, 0x07, 0x57, 1, 40, 170]);
        assert_eq!(&written[4][..4], &[0xFF, 0x05, 0x62, 50]);

        let time = &written[5];
        assert_eq!(time.len(), 8);
        let wire = u32::from_be_bytes([time[3], time[4], time[5], time[6]]);
        assert_eq!(wire as i64, 1_700_000_000 + OFFSET_S as i64);

        for frame in &written {
            assert!(checksum::verify(frame));
        }
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let comm = communicator(Arc::new(MockTransport::failing()));
        assert!(matches!(
            comm.shutdown().await,
            Err(BandError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_model_name_selects_sport_framing() {
        let config = EngineConfig {
            compact_sport_models: vec!["B5 Lite".to_string()],
            ..Default::default()
        };
        let mut comm = BandCommunicator::with_config(
            Arc::new(MockTransport::new()),
            UtcClock::with_zone(Utc),
            config,
            SportFraming::Terminated,
        );

        comm.set_model_name("B5 Lite");
        assert_eq!(comm.sport_framing(), SportFraming::Compact);
        comm.set_model_name("B7");
        assert_eq!(comm.sport_framing(), SportFraming::Terminated);
    }
}
