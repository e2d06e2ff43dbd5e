pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod pacing;
pub mod transport;
pub mod types;
pub mod waveform;

pub use client::{parse_scale_factors, ScopeClient, ScopeClientBuilder, SCALE_FIELD_COUNT};
pub use config::{load_config, load_config_or_default, ScopeConfig};
pub use error::ScopeError;
pub use framing::parse_definite_block;
pub use pacing::{FixedDelay, NoDelay, Pacing};
pub use transport::{Link, LinkConfig, TcpLink};
pub use types::{AcquisitionConfig, CalibrationState, Channel};
pub use waveform::{decode, CalibratedWaveform};
