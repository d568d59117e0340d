//! usbip - USB/IP client
//!
//! Attaches USB devices exported by remote hosts to the local virtual host
//! controller, and re-establishes dropped sessions from their records.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::ClientConfig;
use common::setup_logging;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "usbip")]
#[command(author, version, about = "USB/IP client - attach remote USB devices")]
#[command(long_about = "
Attach a USB device exported by a remote USB/IP host so it appears as a
local device, or reattach a vhci port whose connection dropped.

EXAMPLES:
    # Attach bus id 1-2 from 192.168.1.5
    usbip attach --remote 192.168.1.5 --busid 1-2

    # Reattach vhci port 0 from its connection record
    usbip reattach --port 0

    # Use a non-default exporter port
    usbip --tcp-port 3241 attach -r host.lan -b 2-1

CONFIGURATION:
    The client looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usbip/client.toml
    3. /etc/usbip/client.toml
    4. Built-in defaults

REQUIREMENTS:
    The vhci-hcd kernel module must be loaded (modprobe vhci-hcd), and
    attaching usually requires root.
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// TCP port or service name of the remote exporter
    #[arg(short, long, value_name = "PORT")]
    tcp_port: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach a remote USB device
    Attach {
        /// Host exporting the device
        #[arg(short, long, value_name = "HOST")]
        remote: String,

        /// Bus id of the device on the remote host
        #[arg(short, long, value_name = "BUSID", alias = "device", short_alias = 'd')]
        busid: String,
    },
    /// Reattach a vhci port from its connection record
    Reattach {
        /// vhci port number
        #[arg(short, long, value_name = "PORT")]
        port: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ClientConfig::default();
        let path = ClientConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        ClientConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ClientConfig::load_or_default()
    };

    if let Some(tcp_port) = args.tcp_port {
        config.network.tcp_port = tcp_port;
    }

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.client.log_level.clone());
    setup_logging(&log_level).context("Failed to setup logging")?;

    debug!("usbip client v{}", env!("CARGO_PKG_VERSION"));
    debug!("State directory: {}", config.state_dir().display());

    let Some(command) = args.command else {
        use clap::CommandFactory;
        Args::command().print_help()?;
        return Ok(());
    };

    run(&config, command).await
}

#[cfg(target_os = "linux")]
async fn run(config: &ClientConfig, command: Command) -> Result<()> {
    use client::virtual_usb::linux::SysfsVhci;
    use client::{AttachContext, ConnectionRecorder, ReattachOutcome};
    use tracing::info;

    let ctx = AttachContext::new(
        SysfsVhci::new(config.sysfs_root()),
        ConnectionRecorder::new(config.state_dir()),
    )
    .with_max_busy_retries(config.vhci.max_busy_retries);

    match command {
        Command::Attach { remote, busid } => {
            let port = client::attach_device(&ctx, &remote, &config.network.tcp_port, &busid)
                .await
                .with_context(|| format!("Failed to attach {} from {}", busid, remote))?;
            info!("Device {} attached to port {}", busid, port);
        }
        Command::Reattach { port } => {
            let outcome = client::reattach_port(&ctx, &port)
                .await
                .with_context(|| format!("Failed to reattach port {}", port))?;
            match outcome {
                ReattachOutcome::AlreadyAttached { port } => {
                    info!("Port {} is already attached", port)
                }
                ReattachOutcome::Reattached {
                    port,
                    attached_port,
                } => info!("Port {} reattached (now port {})", port, attached_port),
            }
        }
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: &ClientConfig, _command: Command) -> Result<()> {
    anyhow::bail!("USB/IP attach requires the Linux vhci_hcd driver")
}
