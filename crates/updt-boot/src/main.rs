use std::{path::PathBuf, thread::sleep, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_num::{maybe_hex, number_range};
use colored::Colorize;
use derive_more::IsVariant;
use log::LevelFilter;
use serialport::{SerialPortInfo, SerialPortType, available_ports};
use updt_port::Port;
use updt_protocol::{
    ProtocolConfig, SessionResult,
    config::{DEFAULT_PAYLOAD_SIZE, DEFAULT_SEND_RETRIES},
};

use crate::{
    boot::{MAX_PAYLOAD_SIZE, loopback::run_loopback, master::run_master, slave::run_slave},
    err::Error,
    image::Image,
};

mod boot;
mod err;
mod image;
mod logging;

type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, ValueEnum, IsVariant)]
#[clap(rename_all = "kebab_case")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Parser)]
#[command(version, about = "Stream firmware images to a device over a byte channel")]
struct Cli {
    /// Log level for protocol diagnostics
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream binaries to a device running the update service
    Send(SendArgs),
    /// Run the update service, committing the received image to a file or block device
    Receive(ReceiveArgs),
    /// Run both sides in-process over a loopback pair and verify the result
    Loopback(LoopbackArgs),
    /// List serial ports
    List,
}

#[derive(Args)]
struct PortArgs {
    /// Serial port, waits for a single USB serial device if not set
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, default_value_t = 921600)]
    baud: u32,

    /// Read and write timeout in milliseconds, `receive` waits for the first byte regardless
    #[arg(short, long, default_value_t = 5000)]
    timeout: u64,
}

#[derive(Args)]
struct SessionArgs {
    /// Largest payload body, both sides must agree on it
    #[arg(short = 's', long, default_value_t = DEFAULT_PAYLOAD_SIZE, value_parser = payload_size)]
    payload_size: u16,

    /// Sends allowed to make no progress before a payload is given up
    #[arg(short, long, default_value_t = DEFAULT_SEND_RETRIES)]
    retries: u8,
}

impl SessionArgs {
    fn config(&self) -> ProtocolConfig {
        ProtocolConfig::new(self.payload_size, self.retries)
    }
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    port: PortArgs,

    #[command(flatten)]
    session: SessionArgs,

    /// Binaries to upload
    #[arg(short, long, value_delimiter = ' ', num_args = 1.., required = true)]
    input: Vec<PathBuf>,

    /// Addresses for binaries
    #[arg(short, long, value_delimiter = ' ', num_args = 1.., required = true, value_parser = maybe_hex::<u32>)]
    upload_address: Vec<u32>,
}

#[derive(Args)]
struct ReceiveArgs {
    #[command(flatten)]
    port: PortArgs,

    #[command(flatten)]
    session: SessionArgs,

    /// Image file or block device to commit into
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args)]
struct LoopbackArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Binaries to stream instead of the built-in seven segment image
    #[arg(short, long, value_delimiter = ' ', num_args = 1..)]
    input: Vec<PathBuf>,

    /// Addresses for binaries
    #[arg(short, long, value_delimiter = ' ', num_args = 1.., value_parser = maybe_hex::<u32>)]
    upload_address: Vec<u32>,

    /// Save the committed image as a flat file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn payload_size(s: &str) -> core::result::Result<u16, String> {
    number_range(s, 1, MAX_PAYLOAD_SIZE)
}

fn get_ports() -> Result<Vec<SerialPortInfo>> {
    Ok(available_ports()?
        .into_iter()
        .filter(|s| matches!(s.port_type, SerialPortType::UsbPort(_)))
        .collect())
}

fn open_port(args: &PortArgs) -> Result<Port> {
    let name = match &args.port {
        Some(name) => name.clone(),
        None => {
            step!("Waiting for the device");
            let port = loop {
                let ports = get_ports()?;

                if ports.len() > 1 {
                    return Err(Error::MoreThanOneDevice);
                } else if let Some(port) = ports.into_iter().next() {
                    println!();
                    break port;
                }

                step!(".");
                sleep(Duration::from_millis(500));
            };
            port.port_name
        }
    };

    println!("Using {name} at {} baud", args.baud);
    Ok(serialport::new(name, args.baud)
        .timeout(Duration::from_millis(args.timeout))
        .open()?)
}

fn list_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
    }

    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "{} {:04x}:{:04x} {}",
                port.port_name.green(),
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }

    Ok(())
}

fn summary(result: &SessionResult) {
    println!(
        "{} payloads, {} image bytes, {} bytes on the wire",
        result.payloads, result.image_bytes, result.wire_bytes
    );
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Send(args) => {
            let image = Image::load(&args.input, &args.upload_address)?;
            let port = open_port(&args.port)?;
            summary(&run_master(port, &image, args.session.config())?);
        }
        Command::Receive(args) => {
            let port = open_port(&args.port)?;
            summary(&run_slave(port, &args.output, args.session.config())?);
        }
        Command::Loopback(args) => {
            let image = if args.input.is_empty() && args.upload_address.is_empty() {
                Image::fixture()
            } else {
                Image::load(&args.input, &args.upload_address)?
            };
            summary(&run_loopback(
                &image,
                args.session.config(),
                args.output.as_deref(),
            )?);
        }
        Command::List => list_ports()?,
    }

    Ok(())
}

fn main() -> core::result::Result<(), String> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level.into())
        .format_timestamp_millis()
        .init();

    run(cli).map_err(|e| e.to_string())
}
