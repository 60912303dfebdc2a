use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use retrobus::{BusService, Config, Error, Port, Result, TimeDevice, TransportMode, TransportSelector};

/// Serve the APETIME clock device on a serial line or a Becker port
#[derive(Debug, Parser)]
#[command(name = "retrobus", version)]
struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport to start on (serial or becker)
    #[arg(short, long)]
    mode: Option<TransportMode>,

    /// Serial device path
    #[arg(short, long)]
    device: Option<String>,

    /// Becker listen address
    #[arg(long)]
    becker_host: Option<String>,

    /// Becker listen port
    #[arg(long)]
    becker_port: Option<u16>,

    /// Initial line speed
    #[arg(short, long)]
    baud: Option<u32>,

    /// Payload timeout in milliseconds
    #[arg(long)]
    payload_timeout_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(device) = self.device {
            config.serial_device = Some(device);
        }
        if let Some(host) = self.becker_host {
            config.becker_host = host;
        }
        if let Some(port) = self.becker_port {
            config.becker_port = port;
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(ms) = self.payload_timeout_ms {
            config.payload_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }
}

fn serve(config: Config) -> Result<()> {
    let mut selector = TransportSelector::from_config(&config)?;
    selector.begin(config.baud_rate)?;
    info!("serving APETIME on {} at {} baud", config.mode, selector.baud_rate());

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("shutdown requested");
        flag.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::invalid_state(format!("Cannot install signal handler: {}", e)))?;

    let mut bus = BusService::new(TimeDevice::new(), selector, &config);
    bus.run(&running)?;
    bus.transport_mut().end();
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = Args::parse().into_config().and_then(serve);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
