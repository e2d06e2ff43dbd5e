use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical input source on the instrument, selected before a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
}

impl Channel {
    /// Protocol spelling as it appears in `data:source` commands.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ch1 => "Ch1",
            Channel::Ch2 => "Ch2",
            Channel::Ch3 => "Ch3",
            Channel::Ch4 => "Ch4",
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Ch1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-acquisition scale factors retrieved from the instrument.
///
/// All five values come from one `wfmoutpre?` response and are always
/// refreshed together; the positional indices that produce them are
/// interdependent, so a partial update would silently miscalibrate decoding.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CalibrationState {
    /// Time increment in seconds per sample (`xincr`).
    pub time_scale: f64,
    /// Time of the first sample in seconds (`xzero`).
    pub time_start: f64,
    /// Volts per digitizer level (`ymult`).
    pub volt_scale: f64,
    /// Reference position in level units (`yoff`).
    pub volt_position: f64,
    /// Reference offset in volts (`yzero`).
    pub volt_offset: f64,
}

/// Waveform transfer parameters sent during `init_data`.
///
/// Word width and encoding are fixed by the transfer format this client
/// decodes (16-bit big-endian binary); only the point count varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub num_points: u32,
}

impl AcquisitionConfig {
    /// Bytes per sample on the wire (`wfmoutpre:byt_n`).
    pub const BYTE_WIDTH: u8 = 2;
    /// Transfer encoding (`data:encdg`).
    pub const ENCODING: &'static str = "FASTEST";
    /// First sample index (`data:start`).
    pub const START: u32 = 1;
    pub const DEFAULT_NUM_POINTS: u32 = 100_000;

    pub fn new(num_points: u32) -> Self {
        Self { num_points }
    }

    /// Last sample index (`data:stop`).
    pub fn stop(&self) -> u32 {
        self.num_points
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            num_points: Self::DEFAULT_NUM_POINTS,
        }
    }
}
