use log::info;
use std::io::Write;
use std::time::Duration;
use tekscope::{load_config_or_default, ScopeClient};

/// Capture one waveform and write calibrated samples as CSV to stdout.
///
/// Configuration comes from `scope.toml` (or `TEKSCOPE__*` environment
/// overrides); there are no command-line arguments.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_config_or_default(None);
    env_logger::Builder::new()
        .parse_filters(&cfg.logging.log_level)
        .init();

    info!("connecting to {}:{}", cfg.scope.host, cfg.scope.port);
    let mut scope = ScopeClient::builder()
        .host(&cfg.scope.host)
        .port(cfg.scope.port)
        .read_timeout(Duration::from_millis(cfg.scope.read_timeout_ms))
        .num_points(cfg.acquisition.num_points)
        .build()?;

    let waveform = scope.get_waveform(cfg.acquisition.channel)?;
    info!(
        "captured {} samples from {} on {}",
        waveform.len(),
        cfg.acquisition.channel,
        scope.identity()
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "time_s,volts")?;
    for (time, volts) in waveform.samples() {
        writeln!(out, "{time},{volts}")?;
    }

    scope.shutdown();
    Ok(())
}
