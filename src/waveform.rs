use crate::error::ScopeError;
use crate::types::CalibrationState;
use byteorder::{BigEndian, ByteOrder};

/// One decoded capture: parallel time (seconds) and voltage (volts) series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibratedWaveform {
    pub time: Vec<f64>,
    pub volts: Vec<f64>,
}

impl CalibratedWaveform {
    pub fn len(&self) -> usize {
        self.volts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volts.is_empty()
    }

    /// Iterate over `(time, volts)` pairs.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time.iter().copied().zip(self.volts.iter().copied())
    }
}

/// Decode a raw capture payload into calibrated samples.
///
/// The wire format is 16-bit signed samples, most significant byte first,
/// regardless of host order. Times are `time_start + i * time_scale` for
/// exactly `len / 2` evenly spaced points (open upper bound); voltages are
/// `(sample - volt_position) * volt_scale + volt_offset`.
///
/// Pure conversion, no protocol I/O. An odd payload length means the capture
/// was truncated mid-sample and fails with [`ScopeError::Format`] rather than
/// decoding a best-effort prefix.
pub fn decode(raw: &[u8], cal: &CalibrationState) -> Result<CalibratedWaveform, ScopeError> {
    if raw.len() % 2 != 0 {
        return Err(ScopeError::Format(format!(
            "waveform payload has odd length {}",
            raw.len()
        )));
    }

    let count = raw.len() / 2;
    let mut time = Vec::with_capacity(count);
    let mut volts = Vec::with_capacity(count);
    for (i, pair) in raw.chunks_exact(2).enumerate() {
        let sample = BigEndian::read_i16(pair) as f64;
        time.push(cal.time_start + i as f64 * cal.time_scale);
        volts.push((sample - cal.volt_position) * cal.volt_scale + cal.volt_offset);
    }

    Ok(CalibratedWaveform { time, volts })
}
