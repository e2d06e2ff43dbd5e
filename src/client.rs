use crate::error::ScopeError;
use crate::framing::parse_definite_block;
use crate::pacing::{FixedDelay, Pacing};
use crate::transport::{Link, LinkConfig, TcpLink};
use crate::types::{AcquisitionConfig, CalibrationState, Channel};
use crate::waveform::{decode, CalibratedWaveform};
use log::{debug, info};
use std::thread;
use std::time::Duration;

/// Minimum number of semicolon-delimited fields a `wfmoutpre?` response must
/// carry for the positional scale-factor extraction to be valid.
pub const SCALE_FIELD_COUNT: usize = 17;

/// Positional field offsets into the `wfmoutpre?` response. These are a
/// contract with the instrument firmware's response ordering: if a firmware
/// revision reorders the fields, decoding breaks, which is why the field
/// count is validated before extraction.
const XINCR_FIELD: usize = 10;
const XZERO_FIELD: usize = 11;
const YMULT_FIELD: usize = 14;
const YOFF_FIELD: usize = 15;
const YZERO_FIELD: usize = 16;

const DEFAULT_RESET_SETTLE: Duration = Duration::from_secs(2);

/// Extract the five scale factors from a `wfmoutpre?` response line.
///
/// One combined query split into fields is one round trip instead of five
/// separate `wfmoutpre:*?` queries. Fails with [`ScopeError::Format`] if the
/// response carries fewer than [`SCALE_FIELD_COUNT`] fields or a field does
/// not parse as a number; a short response must never produce a partially
/// updated calibration.
pub fn parse_scale_factors(response: &str) -> Result<CalibrationState, ScopeError> {
    let fields: Vec<&str> = response.trim_end().split(';').collect();
    if fields.len() < SCALE_FIELD_COUNT {
        return Err(ScopeError::Format(format!(
            "wfmoutpre? returned {} fields, need at least {SCALE_FIELD_COUNT}",
            fields.len()
        )));
    }

    let field = |index: usize, name: &str| -> Result<f64, ScopeError> {
        fields[index].trim().parse::<f64>().map_err(|_| {
            ScopeError::Format(format!(
                "wfmoutpre? field {index} ({name}) is not a number: {:?}",
                fields[index]
            ))
        })
    };

    Ok(CalibrationState {
        time_scale: field(XINCR_FIELD, "xincr")?,
        time_start: field(XZERO_FIELD, "xzero")?,
        volt_scale: field(YMULT_FIELD, "ymult")?,
        volt_position: field(YOFF_FIELD, "yoff")?,
        volt_offset: field(YZERO_FIELD, "yzero")?,
    })
}

fn text_response(raw: Vec<u8>) -> Result<String, ScopeError> {
    let text = String::from_utf8(raw)
        .map_err(|_| ScopeError::Format("response is not valid UTF-8".to_string()))?;
    Ok(text.trim_end().to_string())
}

/// Where the session stands in the acquisition workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquisitionState {
    /// Connected, waveform transfer not yet configured.
    Uninitialized,
    /// Transfer configured; `channel` is the current `data:source`.
    Initialized { channel: Channel },
}

/// Builder for [`ScopeClient`] instances.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use tekscope::ScopeClient;
///
/// let mut scope = ScopeClient::builder()
///     .host("192.168.2.164")
///     .port(4000)
///     .read_timeout(Duration::from_secs(2))
///     .num_points(10_000)
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct ScopeClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    config: LinkConfig,
    pacing: Option<Box<dyn Pacing>>,
    num_points: Option<u32>,
    reset_settle: Option<Duration>,
}

impl ScopeClientBuilder {
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the full link configuration.
    pub fn link_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Replace the default fixed-delay pacing policy.
    pub fn pacing(mut self, pacing: Box<dyn Pacing>) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Number of sample points requested per capture.
    pub fn num_points(mut self, num_points: u32) -> Self {
        self.num_points = Some(num_points);
        self
    }

    /// Settle time after `*rst` before further commands are valid.
    pub fn reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = Some(settle);
        self
    }

    /// Connect and run the session handshake.
    pub fn build(self) -> Result<ScopeClient, ScopeError> {
        let host = self
            .host
            .ok_or_else(|| ScopeError::Config("host must be specified".to_string()))?;
        let port = self
            .port
            .ok_or_else(|| ScopeError::Config("port must be specified".to_string()))?;

        let pacing = self
            .pacing
            .unwrap_or_else(|| Box::new(FixedDelay::default()));
        let link = TcpLink::connect(&host, port, self.config, pacing)?;

        let num_points = self.num_points.unwrap_or(AcquisitionConfig::DEFAULT_NUM_POINTS);
        ScopeClient::over(
            Box::new(link),
            AcquisitionConfig::new(num_points),
            self.reset_settle.unwrap_or(DEFAULT_RESET_SETTLE),
        )
    }
}

/// Synchronous acquisition session with one oscilloscope.
///
/// Owns the TCP connection exclusively and sequences the strictly serial
/// command/response protocol: handshake on connect, lazy waveform transfer
/// setup, per-capture `curve?` queries and calibrated decoding. The protocol
/// carries no request identifiers, so the session must not be shared between
/// threads without external serialization; every method takes `&mut self`.
///
/// # Examples
///
/// ```no_run
/// use tekscope::{Channel, ScopeClient};
///
/// let mut scope = ScopeClient::new("192.168.2.164", 4000)?;
/// let waveform = scope.get_waveform(Channel::Ch1)?;
/// for (time, volts) in waveform.samples() {
///     println!("{time} {volts}");
/// }
/// scope.shutdown();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ScopeClient {
    /// `None` after shutdown; every operation then fails with `Closed`.
    link: Option<Box<dyn Link>>,
    identity: String,
    acquisition: AcquisitionConfig,
    state: AcquisitionState,
    calibration: Option<CalibrationState>,
    reset_settle: Duration,
}

impl ScopeClient {
    /// Connect with default configuration.
    pub fn new(host: &str, port: u16) -> Result<Self, ScopeError> {
        Self::builder().host(host).port(port).build()
    }

    pub fn builder() -> ScopeClientBuilder {
        ScopeClientBuilder::default()
    }

    /// Run the connect handshake over an established link.
    pub(crate) fn over(
        mut link: Box<dyn Link>,
        acquisition: AcquisitionConfig,
        reset_settle: Duration,
    ) -> Result<Self, ScopeError> {
        link.command("*cls")?;
        let identity = text_response(link.query("*idn?")?)?;
        info!("connected to {identity}");
        // *opc? is only a barrier here; any response counts as synchronized
        link.query("*opc?")?;
        link.command("header 0")?;

        Ok(Self {
            link: Some(link),
            identity,
            acquisition,
            state: AcquisitionState::Uninitialized,
            calibration: None,
            reset_settle,
        })
    }

    fn link(&mut self) -> Result<&mut (dyn Link + 'static), ScopeError> {
        self.link.as_deref_mut().ok_or(ScopeError::Closed)
    }

    /// Instrument identity string from `*idn?`.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Scale factors from the most recent `wfmoutpre?`, if any.
    pub fn calibration(&self) -> Option<&CalibrationState> {
        self.calibration.as_ref()
    }

    pub fn num_points(&self) -> u32 {
        self.acquisition.num_points
    }

    /// Change the requested point count. The transfer stop index must be
    /// re-issued, so the next capture re-runs `init_data`.
    pub fn set_num_points(&mut self, num_points: u32) {
        self.acquisition.num_points = num_points;
        self.state = AcquisitionState::Uninitialized;
    }

    /// Block until the instrument has finished its pending operations.
    pub fn sync(&mut self) -> Result<(), ScopeError> {
        self.link()?.query("*opc?")?;
        Ok(())
    }

    /// Configure waveform transfer for `channel` and refresh scale factors.
    pub fn init_data(&mut self, channel: Channel) -> Result<(), ScopeError> {
        debug!("initializing waveform transfer for {channel}");
        self.sync()?;

        let stop = self.acquisition.stop();
        let link = self.link()?;
        link.command("header 0")?;
        link.command(&format!("data:encdg {}", AcquisitionConfig::ENCODING))?;
        link.command(&format!("data:source {channel}"))?;
        link.command(&format!("wfmoutpre:byt_n {}", AcquisitionConfig::BYTE_WIDTH))?;
        link.command(&format!("data:start {}", AcquisitionConfig::START))?;
        link.command(&format!("data:stop {stop}"))?;

        self.refresh_scale_factors()?;
        self.state = AcquisitionState::Initialized { channel };
        Ok(())
    }

    fn refresh_scale_factors(&mut self) -> Result<(), ScopeError> {
        let raw = self.link()?.query("wfmoutpre?")?;
        let cal = parse_scale_factors(&text_response(raw)?)?;
        debug!("scale factors: {cal:?}");
        self.calibration = Some(cal);
        Ok(())
    }

    /// Capture one waveform from `channel` and return the raw sample payload
    /// with the block framing stripped.
    ///
    /// Runs `init_data` first if the session is uninitialized. Switching
    /// channels on an initialized session re-issues only `data:source`; the
    /// rest of the transfer setup is not channel-specific and survives.
    pub fn get_data(&mut self, channel: Channel) -> Result<Vec<u8>, ScopeError> {
        match self.state {
            AcquisitionState::Uninitialized => self.init_data(channel)?,
            AcquisitionState::Initialized { channel: current } if current != channel => {
                self.link()?.command(&format!("data:source {channel}"))?;
                self.state = AcquisitionState::Initialized { channel };
            }
            AcquisitionState::Initialized { .. } => {}
        }

        let raw = self.link()?.query("curve?")?;
        let payload = parse_definite_block(&raw)?;
        debug!("captured {} payload bytes from {channel}", payload.len());
        Ok(payload.to_vec())
    }

    /// Capture one waveform from `channel` and decode it with the cached
    /// scale factors.
    pub fn get_waveform(&mut self, channel: Channel) -> Result<CalibratedWaveform, ScopeError> {
        let raw = self.get_data(channel)?;
        let cal = self
            .calibration
            .ok_or_else(|| ScopeError::Format("no calibration state cached".to_string()))?;
        decode(&raw, &cal)
    }

    /// Factory-reset the instrument with `*rst` and wait out its settle time.
    ///
    /// Invalidates the cached calibration; run `init_data` (or just capture,
    /// which re-initializes lazily) before decoding again.
    pub fn reset(&mut self) -> Result<(), ScopeError> {
        self.link()?.command("*rst")?;
        // the scope behaves like it just powered on
        thread::sleep(self.reset_settle);
        self.calibration = None;
        self.state = AcquisitionState::Uninitialized;
        Ok(())
    }

    /// Close the connection. Idempotent; every later operation fails with
    /// [`ScopeError::Closed`].
    pub fn shutdown(&mut self) {
        if self.link.take().is_some() {
            debug!("connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory link that records every line and answers queries by text.
    struct ScriptedLink {
        sent: Rc<RefCell<Vec<String>>>,
        scale_response: Vec<u8>,
        curve_response: Vec<u8>,
        curve_times_out: bool,
    }

    impl ScriptedLink {
        fn new(sent: Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                sent,
                scale_response: scale_response(),
                curve_response: curve_response(&[0, 1]),
                curve_times_out: false,
            }
        }
    }

    impl Link for ScriptedLink {
        fn command(&mut self, text: &str) -> Result<(), ScopeError> {
            self.sent.borrow_mut().push(text.to_string());
            Ok(())
        }

        fn query(&mut self, text: &str) -> Result<Vec<u8>, ScopeError> {
            self.sent.borrow_mut().push(text.to_string());
            match text {
                "*idn?" => Ok(b"TEKTRONIX,DPO3014,C012345,CF:91.1CT\n".to_vec()),
                "*opc?" => Ok(b"1\n".to_vec()),
                "wfmoutpre?" => Ok(self.scale_response.clone()),
                "curve?" => {
                    if self.curve_times_out {
                        Err(ScopeError::Timeout {
                            command: text.to_string(),
                        })
                    } else {
                        Ok(self.curve_response.clone())
                    }
                }
                other => Err(ScopeError::Format(format!("unexpected query {other:?}"))),
            }
        }
    }

    fn scale_response() -> Vec<u8> {
        let mut fields = vec!["0".to_string(); SCALE_FIELD_COUNT];
        fields[10] = "1e-06".to_string(); // xincr
        fields[11] = "-0.005".to_string(); // xzero
        fields[14] = "0.002".to_string(); // ymult
        fields[15] = "128".to_string(); // yoff
        fields[16] = "0.001".to_string(); // yzero
        let mut line = fields.join(";").into_bytes();
        line.push(b'\n');
        line
    }

    fn curve_response(samples: &[i16]) -> Vec<u8> {
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        let count = payload.len().to_string();
        let mut raw = format!("#{}{}", count.len(), count).into_bytes();
        raw.extend_from_slice(&payload);
        raw.push(b'\n');
        raw
    }

    fn scripted_client() -> (ScopeClient, Rc<RefCell<Vec<String>>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let link = ScriptedLink::new(sent.clone());
        let client = ScopeClient::over(
            Box::new(link),
            AcquisitionConfig::new(1000),
            Duration::ZERO,
        )
        .unwrap();
        (client, sent)
    }

    fn count_sent(sent: &Rc<RefCell<Vec<String>>>, line: &str) -> usize {
        sent.borrow().iter().filter(|s| *s == line).count()
    }

    #[test]
    fn connect_handshake_sequence() {
        let (client, sent) = scripted_client();
        assert_eq!(
            *sent.borrow(),
            vec!["*cls", "*idn?", "*opc?", "header 0"]
        );
        assert_eq!(client.identity(), "TEKTRONIX,DPO3014,C012345,CF:91.1CT");
        assert!(client.calibration().is_none());
    }

    #[test]
    fn init_data_configures_transfer_and_caches_calibration() {
        let (mut client, sent) = scripted_client();
        client.init_data(Channel::Ch1).unwrap();

        let sent = sent.borrow();
        let tail: Vec<&str> = sent.iter().skip(4).map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "*opc?",
                "header 0",
                "data:encdg FASTEST",
                "data:source Ch1",
                "wfmoutpre:byt_n 2",
                "data:start 1",
                "data:stop 1000",
                "wfmoutpre?",
            ]
        );
        drop(sent);

        let cal = client.calibration().unwrap();
        assert_eq!(cal.time_scale, 1e-6);
        assert_eq!(cal.time_start, -0.005);
        assert_eq!(cal.volt_scale, 0.002);
        assert_eq!(cal.volt_position, 128.0);
        assert_eq!(cal.volt_offset, 0.001);
    }

    #[test]
    fn scale_parse_rejects_short_response() {
        let line = vec!["0"; SCALE_FIELD_COUNT - 1].join(";");
        assert!(matches!(
            parse_scale_factors(&line),
            Err(ScopeError::Format(_))
        ));
    }

    #[test]
    fn scale_parse_rejects_non_numeric_field() {
        let mut fields = vec!["0"; SCALE_FIELD_COUNT];
        fields[14] = "WFMOUTPRE:YMULT 2.0";
        assert!(matches!(
            parse_scale_factors(&fields.join(";")),
            Err(ScopeError::Format(_))
        ));
    }

    #[test]
    fn scale_parse_accepts_extra_fields() {
        let mut fields = vec!["0".to_string(); SCALE_FIELD_COUNT + 5];
        fields[10] = "2.5e-9".to_string();
        let cal = parse_scale_factors(&fields.join(";")).unwrap();
        assert_eq!(cal.time_scale, 2.5e-9);
    }

    #[test]
    fn get_data_initializes_lazily() {
        let (mut client, sent) = scripted_client();
        let payload = client.get_data(Channel::Ch1).unwrap();
        assert_eq!(payload, vec![0, 0, 0, 1]);
        assert_eq!(count_sent(&sent, "data:source Ch1"), 1);
        assert_eq!(count_sent(&sent, "curve?"), 1);
    }

    #[test]
    fn same_channel_capture_sends_no_redundant_source() {
        let (mut client, sent) = scripted_client();
        client.init_data(Channel::Ch1).unwrap();
        client.get_data(Channel::Ch1).unwrap();
        client.get_data(Channel::Ch1).unwrap();
        assert_eq!(count_sent(&sent, "data:source Ch1"), 1);
    }

    #[test]
    fn channel_switch_sends_exactly_one_source_before_curve() {
        let (mut client, sent) = scripted_client();
        client.init_data(Channel::Ch1).unwrap();
        client.get_data(Channel::Ch2).unwrap();

        assert_eq!(count_sent(&sent, "data:source Ch2"), 1);
        let lines = sent.borrow();
        let source_at = lines.iter().position(|s| s == "data:source Ch2").unwrap();
        let curve_at = lines.iter().rposition(|s| s == "curve?").unwrap();
        assert!(source_at < curve_at);
        drop(lines);

        // a second capture on the switched channel is quiet again
        client.get_data(Channel::Ch2).unwrap();
        assert_eq!(count_sent(&sent, "data:source Ch2"), 1);
    }

    #[test]
    fn get_waveform_decodes_with_cached_calibration() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut link = ScriptedLink::new(sent.clone());
        link.curve_response = curve_response(&[128, 129]);
        let mut client =
            ScopeClient::over(Box::new(link), AcquisitionConfig::new(2), Duration::ZERO).unwrap();

        let wf = client.get_waveform(Channel::Ch1).unwrap();
        assert_eq!(wf.len(), 2);
        // (128 - 128) * 0.002 + 0.001
        assert_eq!(wf.volts[0], 0.001);
        assert!((wf.volts[1] - 0.003).abs() < 1e-12);
        assert_eq!(wf.time[0], -0.005);
        assert_eq!(wf.time[1], -0.005 + 1e-6);
    }

    #[test]
    fn timeout_mid_capture_keeps_prior_calibration() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut link = ScriptedLink::new(sent.clone());
        link.curve_times_out = true;
        let mut client =
            ScopeClient::over(Box::new(link), AcquisitionConfig::new(1000), Duration::ZERO)
                .unwrap();

        client.init_data(Channel::Ch1).unwrap();
        let cal_before = *client.calibration().unwrap();

        let err = client.get_data(Channel::Ch1).unwrap_err();
        assert!(matches!(err, ScopeError::Timeout { ref command } if command == "curve?"));
        assert_eq!(client.calibration(), Some(&cal_before));
    }

    #[test]
    fn reset_invalidates_calibration_and_forces_reinit() {
        let (mut client, sent) = scripted_client();
        client.init_data(Channel::Ch1).unwrap();
        client.reset().unwrap();

        assert_eq!(count_sent(&sent, "*rst"), 1);
        assert!(client.calibration().is_none());

        // next capture re-runs the full setup
        client.get_data(Channel::Ch1).unwrap();
        assert_eq!(count_sent(&sent, "data:stop 1000"), 2);
    }

    #[test]
    fn set_num_points_reissues_stop_index() {
        let (mut client, sent) = scripted_client();
        client.init_data(Channel::Ch1).unwrap();
        client.set_num_points(500);
        client.get_data(Channel::Ch1).unwrap();
        assert_eq!(count_sent(&sent, "data:stop 500"), 1);
    }

    #[test]
    fn operations_after_shutdown_fail_closed() {
        let (mut client, _sent) = scripted_client();
        client.shutdown();
        client.shutdown(); // idempotent

        assert!(matches!(client.sync(), Err(ScopeError::Closed)));
        assert!(matches!(
            client.init_data(Channel::Ch1),
            Err(ScopeError::Closed)
        ));
        assert!(matches!(
            client.get_data(Channel::Ch1),
            Err(ScopeError::Closed)
        ));
        assert!(matches!(client.reset(), Err(ScopeError::Closed)));
    }

    #[test]
    fn malformed_curve_block_fails_loudly() {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let mut link = ScriptedLink::new(sent.clone());
        link.curve_response = b"#4oops\n".to_vec();
        let mut client =
            ScopeClient::over(Box::new(link), AcquisitionConfig::new(10), Duration::ZERO).unwrap();

        assert!(matches!(
            client.get_data(Channel::Ch1),
            Err(ScopeError::Format(_))
        ));
    }
}
