use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show general BMS status: cell count, temperature sensors, charger/load status, IO states, cycles
    Status,
    /// Show total voltage, gather voltage, current, and State of Charge (SOC)
    Soc,
    /// Show MOSFET status: mode, charge/discharge state, heartbeat and remaining capacity
    Mosfet,
    /// Show highest/lowest cell voltage and corresponding cell number
    VoltageLimits,
    /// Show highest/lowest temperature and corresponding sensor number
    TemperatureLimits,
    /// Show individual cell voltages (fetches the BMS status first)
    CellVoltages,
    /// Show individual temperature sensor readings (fetches the BMS status first)
    CellTemperatures,
    /// Show cell balancing status (fetches the BMS status first)
    Balancing,
    /// Show active failure flags and the fault code
    Failures,
    /// Show all available BMS information by running every read command
    All,
}

const fn about_text() -> &'static str {
    "daly bms command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows)
    #[arg(short, long, default_value_t = default_device_name())]
    pub device: String,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Address the BMS answers with (e.g., 1 or 0x01)
    #[arg(short, long, value_parser = maybe_hex::<u8>, default_value = "0x01")]
    pub address: u8,

    /// Connection class sent in every request: 0x20 GPRS, 0x40 host (UART), 0x80 Bluetooth
    #[arg(long, value_parser = maybe_hex::<u8>, default_value = "0x40")]
    pub connection_class: u8,

    /// Timeout for a complete BMS response (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "1s")]
    pub timeout: Duration,

    // Some USB - RS485 dongles requires at least 10ms to switch between TX and RX, so use a save delay between frames
    /// Delay between sending multiple commands to the BMS (e.g., "50ms", "100ms")
    /// (useful for some serial adapters that need time to switch between TX/RX)
    #[arg(value_parser = humantime::parse_duration, long, default_value = "15ms")]
    pub delay: Duration,

    /// Print responses as JSON instead of debug output
    #[arg(long)]
    pub json: bool,
}
