// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// GHL point-of-sale simulator
mod codec;
mod config;
mod connection;
mod decode;
mod exchange;
mod invoice;
mod protocol;
mod response;
mod serial;
mod terminal;

use std::fmt::Display;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use serialport::{DataBits, Parity, StopBits};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use config::Settings;
use connection::{Connection, ConnectionState};
use decode::FrameKind;
use invoice::InvoiceRegister;
use protocol::{Command, TransactionRequest};
use response::Outcome;
use serial::{PortSettings, SerialOpener};
use terminal::Terminal;

#[derive(Parser)]
#[command(name = "ghl-sim")]
#[command(about = "POS simulator for GHL payment terminals over RS-232", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1); defaults to the last one used
    #[arg(short, long)]
    port: Option<String>,

    /// Line speed; GHL terminals run at 9600, other values are for bench rigs
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8); GHL framing is 8N1
    #[arg(long, default_value = "8", value_name="BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even); override only when bench testing
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2); override only when bench testing
    #[arg(long, default_value = "1", value_name="BITS")]
    stop_bits: u8,

    /// Cashier id, up to 4 characters; defaults to the saved one
    #[arg(short, long)]
    cashier: Option<String>,

    /// Settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep the invoice number unchanged after an approval
    #[arg(long)]
    no_auto_increment: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a SALE (020)
    Sale {
        /// Amount, e.g. 12.34
        #[arg(value_parser = parse_amount)]
        amount: f64,
    },
    /// Send a VOID (022)
    Void {
        /// Invoice to void; defaults to the saved invoice number
        #[arg(short, long)]
        invoice: Option<String>,
    },
    /// Send a SETTLEMENT (050)
    Settlement,
    /// Send a REFUND (026)
    Refund {
        /// Amount, e.g. 12.34
        #[arg(value_parser = parse_amount)]
        amount: f64,

        /// Invoice to refund; defaults to the saved invoice number
        #[arg(short, long)]
        invoice: Option<String>,
    },
    /// List available serial ports
    Ports,
    /// Decode a frame copied from the communication log
    Decode {
        /// Hex bytes, optionally with the log timestamp and TX/RX marker
        #[arg(required = true, num_args = 1..)]
        hex: Vec<String>,
    },
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity: {}. Must be 'none', 'odd', or 'even'", parity)),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn parse_amount(s: &str) -> Result<f64, String> {
    let amount: f64 = s.trim().parse().map_err(|_| format!("Invalid amount: {}", s))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("Invalid amount: {}. Must be zero or more", s));
    }
    Ok(amount)
}

fn port_settings(cli: &Cli) -> Result<PortSettings, String> {
    Ok(PortSettings {
        baud_rate: cli.baud,
        data_bits: parse_data_bits(cli.data_bits)?,
        parity: parse_parity(&cli.parity)?,
        stop_bits: parse_stop_bits(cli.stop_bits)?,
        ..PortSettings::default()
    })
}

/// One line of the communication log
fn log(msg: impl Display) {
    println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), msg);
}

fn fail(msg: impl Display) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

fn save_settings(settings: &Settings, path: &Path) {
    if let Err(e) = settings.save(path) {
        warn!(path = %path.display(), error = %e, "could not save settings");
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match &cli.command {
        Commands::Ports => {
            list_ports();
            return;
        }
        Commands::Decode { hex } => {
            decode_hex(&hex.join(" "));
            return;
        }
        _ => {}
    }

    let port_settings = port_settings(&cli).unwrap_or_else(|e| fail(e));
    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    let mut settings = Settings::load(&config_path);

    let port = match cli.port.clone().or_else(|| settings.port.clone()) {
        Some(port) => port,
        None => fail("No serial port given and none saved. Use --port (see `ghl-sim ports`)"),
    };
    let cashier = cli.cashier.clone().unwrap_or_else(|| settings.cashier.clone());
    let auto_increment = settings.auto_increment && !cli.no_auto_increment;

    let mut register: InvoiceRegister = settings.invoice.parse().unwrap_or_else(|e| {
        warn!(error = %e, "saved invoice unusable, starting from 000001");
        InvoiceRegister::default()
    });

    let request = match &cli.command {
        Commands::Sale { amount } => TransactionRequest::new(Command::Sale, *amount, register.value(), cashier.as_str()),
        Commands::Void { invoice } => {
            let invoice = invoice_arg(invoice.as_deref(), register);
            TransactionRequest::new(Command::Void, 0.0, invoice.value(), cashier.as_str())
        }
        Commands::Settlement => TransactionRequest::new(Command::Settlement, 0.0, 0, cashier.as_str()),
        Commands::Refund { amount, invoice } => {
            let invoice = invoice_arg(invoice.as_deref(), register);
            TransactionRequest::new(Command::Refund, *amount, invoice.value(), cashier.as_str())
        }
        Commands::Ports | Commands::Decode { .. } => return,
    }
    .normalized();

    println!("Opening serial port: {}", port);
    println!("Settings: {} baud, {:?}, {:?}, {:?}", port_settings.baud_rate, port_settings.data_bits, port_settings.parity, port_settings.stop_bits);

    let terminal = Terminal::new(Connection::new(SerialOpener, port_settings));
    if let Err(e) = terminal.connect(&port) {
        fail(format!("Failed to open serial port: {}", e));
    }
    if let ConnectionState::Connected(name) = terminal.state() {
        log(format!("Connected to {}", name));
    }

    settings.port = Some(port);
    settings.cashier = cashier;
    save_settings(&settings, &config_path);

    let code = run_transaction(&terminal, &request);

    if code == 0 && auto_increment {
        register.increment();
        settings.invoice = register.to_string();
        save_settings(&settings, &config_path);
        log(format!("Next invoice: {}", register));
    }

    terminal.disconnect();
    log("Disconnected");
    std::process::exit(code);
}

fn invoice_arg(arg: Option<&str>, register: InvoiceRegister) -> InvoiceRegister {
    match arg {
        Some(s) => s.parse().unwrap_or_else(|e| fail(e)),
        None => register,
    }
}

/// True once a line is entered; end of input or a read error never counts
fn wait_for_enter(mut input: impl BufRead) -> bool {
    let mut line = String::new();
    matches!(input.read_line(&mut line), Ok(n) if n > 0)
}

/// Exit status: 0 approved, 2 declined, 1 anything else
fn run_transaction(terminal: &Terminal<SerialOpener>, request: &TransactionRequest) -> i32 {
    let packet = match terminal.build_packet(request) {
        Ok(packet) => packet,
        Err(e) => {
            log(format!("Error: {}", e));
            return 1;
        }
    };

    log(format!("Sending Command: {} ({})...", request.command.code(), request.command));
    println!("(press Enter to stop waiting)");

    // Enter on stdin stops the wait; the reader is left behind once the
    // exchange is over
    let canceller = terminal.cancel_handle();
    std::thread::spawn(move || {
        if wait_for_enter(std::io::stdin().lock()) {
            log(">>> STOP SIGNAL SENT <<<");
            canceller.cancel();
        }
    });

    let handle = terminal.exchange(packet);
    for event in handle.events() {
        log(event);
    }
    let result = handle.wait();
    log(&result);

    let Some(frame) = result.response() else {
        return 1;
    };

    let code = match response::interpret(frame) {
        Some(outcome @ Outcome::Approved) => {
            log(outcome);
            0
        }
        Some(outcome @ Outcome::Declined(_)) => {
            log(outcome);
            2
        }
        None => {
            log("Response too short to read a result code");
            1
        }
    };

    if let Ok(decoded) = decode::decode_frame(frame) {
        if let FrameKind::Response(fields) = decoded.decoded {
            for line in fields.receipt_lines() {
                println!("    {}", line);
            }
        }
    }

    code
}

fn list_ports() {
    let ports = serial::list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        match port.product {
            Some(product) => println!("{}  ({})", port.name, product),
            None => println!("{}", port.name),
        }
    }
}

fn decode_hex(input: &str) {
    let decoded = decode::decode_hex(input).unwrap_or_else(|e| fail(e));
    match serde_json::to_string_pretty(&decoded) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(e),
    }
}
