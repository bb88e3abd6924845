//! Communicators for several connected bands, keyed by device address

use crate::clock::UtcClock;
use crate::communicator::{BandCommunicator, Transport};
use crate::config::EngineConfig;
use crate::records::Record;
use crate::types::{BandError, Result};
use chrono::{Local, TimeZone};
use log::info;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SessionManager<Tz: TimeZone = Local> {
    clock: UtcClock<Tz>,
    config: EngineConfig,
    bands: HashMap<String, BandCommunicator<Tz>>,
}

impl SessionManager<Local> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(UtcClock::local(), config)
    }
}

impl<Tz: TimeZone> SessionManager<Tz> {
    pub fn with_clock(clock: UtcClock<Tz>, config: EngineConfig) -> Self {
        Self {
            clock,
            config,
            bands: HashMap::new(),
        }
    }

    /// Create the communicator for a newly connected band
    ///
    /// Sport framing is picked from `model_name` when one is known. A band
    /// already registered under `address` is replaced and its partial
    /// fetches are dropped.
    pub fn connect(
        &mut self,
        address: &str,
        transport: Arc<dyn Transport>,
        model_name: Option<&str>,
    ) -> &mut BandCommunicator<Tz> {
        let framing = model_name
            .map(|m| self.config.sport_framing_for(m))
            .unwrap_or_default();

        let mut band = BandCommunicator::with_config(
            transport,
            self.clock.clone(),
            self.config.clone(),
            framing,
        );
        band.on_connected();
        info!("Registered band {} ({:?} sport framing)", address, framing);

        match self.bands.entry(address.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().on_disconnected();
                slot.insert(band);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(band),
        }
    }

    /// Remove a band, discarding its partial fetches
    pub fn disconnect(&mut self, address: &str) -> Result<()> {
        let mut band = self
            .bands
            .remove(address)
            .ok_or_else(|| BandError::UnknownDevice(address.to_string()))?;
        band.on_disconnected();
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&BandCommunicator<Tz>> {
        self.bands.get(address)
    }

    pub fn get_mut(&mut self, address: &str) -> Option<&mut BandCommunicator<Tz>> {
        self.bands.get_mut(address)
    }

    /// Route a vendor notification to the band it came from
    pub fn on_frame_received(&mut self, address: &str, raw: &[u8]) -> Result<Option<Record>> {
        let band = self
            .get_mut(address)
            .ok_or_else(|| BandError::UnknownDevice(address.to_string()))?;
        Ok(band.on_frame_received(raw))
    }

    pub fn addresses(&self) -> Vec<&str> {
        let mut addresses: Vec<&str> = self.bands.keys().map(String::as_str).collect();
        addresses.sort_unstable();
        addresses
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}
