//! Standard Heart Rate Service characteristics
//!
//! Heart Rate Measurement (0x2A37) and Body Sensor Location (0x2A38) use the
//! published GATT layout, little-endian, independent of the vendor framing.

use crate::records::{BodySensorLocation, HeartRateMeasurement, SensorContact};
use crate::types::{BandError, Result};

const FLAG_HR_U16: u8 = 0x01;
const FLAG_CONTACT_DETECTED: u8 = 0x02;
const FLAG_CONTACT_SUPPORTED: u8 = 0x04;
const FLAG_ENERGY_EXPENDED: u8 = 0x08;
const FLAG_RR_INTERVALS: u8 = 0x10;

/// Convert an R-R interval from 1/1024 s units to milliseconds
pub fn rr_to_millis(units: u16) -> u32 {
    units as u32 * 1000 / 1024
}

/// Parse a Heart Rate Measurement value
pub fn parse_measurement(data: &[u8]) -> Result<HeartRateMeasurement> {
    let flags = *data
        .first()
        .ok_or_else(|| BandError::DecodingError("Heart rate measurement empty".to_string()))?;
    let mut offset = 1;

    let bpm = if flags & FLAG_HR_U16 != 0 {
        let value = read_u16_le(data, offset)?;
        offset += 2;
        value
    } else {
        let value = *data.get(offset).ok_or_else(|| {
            BandError::DecodingError("Heart rate measurement missing value".to_string())
        })?;
        offset += 1;
        value as u16
    };

    let contact = if flags & FLAG_CONTACT_SUPPORTED == 0 {
        SensorContact::NotSupported
    } else if flags & FLAG_CONTACT_DETECTED != 0 {
        SensorContact::Detected
    } else {
        SensorContact::NotDetected
    };

    let energy_expended_kj = if flags & FLAG_ENERGY_EXPENDED != 0 {
        let value = read_u16_le(data, offset)?;
        offset += 2;
        Some(value)
    } else {
        None
    };

    let mut rr_intervals_ms = Vec::new();
    if flags & FLAG_RR_INTERVALS != 0 {
        // A dangling odd byte is ignored
        while offset + 2 <= data.len() {
            rr_intervals_ms.push(rr_to_millis(read_u16_le(data, offset)?));
            offset += 2;
        }
    }

    Ok(HeartRateMeasurement {
        bpm,
        contact,
        energy_expended_kj,
        rr_intervals_ms,
    })
}

/// Parse a Body Sensor Location value
pub fn parse_body_sensor_location(data: &[u8]) -> Result<BodySensorLocation> {
    data.first()
        .map(|&b| BodySensorLocation::from_u8(b))
        .ok_or_else(|| BandError::DecodingError("Body sensor location empty".to_string()))
}

fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    match data.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(BandError::DecodingError(format!(
            "Heart rate measurement truncated at offset {} ({} bytes)",
            offset,
            data.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_heart_rate() {
        let hrm = parse_measurement(&[0x00, 72]).unwrap();
        assert_eq!(hrm.bpm, 72);
        assert_eq!(hrm.contact, SensorContact::NotSupported);
        assert_eq!(hrm.energy_expended_kj, None);
        assert!(hrm.rr_intervals_ms.is_empty());
    }

    #[test]
    fn test_u16_heart_rate_with_contact() {
        let hrm = parse_measurement(&[0x07, 0x2C, 0x01]).unwrap();
        assert_eq!(hrm.bpm, 300);
        assert_eq!(hrm.contact, SensorContact::Detected);

        let hrm = parse_measurement(&[0x04, 60]).unwrap();
        assert_eq!(hrm.contact, SensorContact::NotDetected);
    }

    #[test]
    fn test_energy_and_rr_intervals() {
        // flags: energy + RR, bpm 80, energy 0x0102, RR 1024 and 512
        let data = [0x18, 80, 0x02, 0x01, 0x00, 0x04, 0x00, 0x02];
        let hrm = parse_measurement(&data).unwrap();
        assert_eq!(hrm.bpm, 80);
        assert_eq!(hrm.energy_expended_kj, Some(0x0102));
        assert_eq!(hrm.rr_intervals_ms, vec![1000, 500]);
    }

    #[test]
    fn test_rr_conversion_truncates() {
        assert_eq!(rr_to_millis(1), 0);
        assert_eq!(rr_to_millis(820), 800);
    }

    #[test]
    fn test_truncated_measurement() {
        assert!(parse_measurement(&[]).is_err());
        assert!(parse_measurement(&[0x00]).is_err());
        assert!(parse_measurement(&[0x01, 0x50]).is_err());
        assert!(parse_measurement(&[0x08, 0x50, 0x01]).is_err());
    }

    #[test]
    fn test_body_sensor_location() {
        assert_eq!(
            parse_body_sensor_location(&[1]).unwrap(),
            BodySensorLocation::Chest
        );
        assert!(parse_body_sensor_location(&[]).is_err());
    }
}
