use anyhow::{Context, Result};
use clap::Parser;
use dalylink::protocol::ConnectionClass;
use dalylink::tokio_serial_async::SerialTransport;
use dalylink::{ClientConfig, DalyClient};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::{ops::Deref, panic};

mod commandline;

use commandline::{CliArgs, CliCommands};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn print_value<T: std::fmt::Debug + serde::Serialize>(
    label: &str,
    value: &T,
    json: bool,
) -> Result<()> {
    if json {
        let mut object = serde_json::Map::new();
        object.insert(label.to_string(), serde_json::to_value(value)?);
        println!("{}", serde_json::Value::Object(object));
    } else {
        println!("{label}: {value:?}");
    }
    Ok(())
}

macro_rules! print_response {
    ($bms:expr, $json:expr, $label:literal, $method:ident, $context:literal) => {
        print_value(
            $label,
            &$bms.$method().await.with_context(|| $context)?,
            $json,
        )?
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let mut transport = SerialTransport::open(&args.device)
        .with_context(|| format!("Cannot open serial port '{}'", args.device))?;
    transport.set_delay(args.delay);
    transport.set_timeout(args.timeout);

    let config = ClientConfig::default()
        .with_device_address(args.address)
        .with_connection(ConnectionClass::from(args.connection_class))
        .with_timeout(args.timeout);
    let mut bms = DalyClient::new(transport, config);
    let json = args.json;

    match args.command {
        CliCommands::Status => {
            print_response!(bms, json, "Status", get_status, "Cannot get status")
        }
        CliCommands::Soc => print_response!(bms, json, "SOC", get_soc, "Cannot get SOC"),
        CliCommands::Mosfet => print_response!(
            bms,
            json,
            "Mosfet",
            get_mosfet_status,
            "Cannot get mosfet status"
        ),
        CliCommands::VoltageLimits => print_response!(
            bms,
            json,
            "Voltage limits",
            get_cell_voltage_limits,
            "Cannot get voltage limits"
        ),
        CliCommands::TemperatureLimits => print_response!(
            bms,
            json,
            "Temperature limits",
            get_cell_temperature_limits,
            "Cannot get temperature limits"
        ),
        CliCommands::CellVoltages => print_response!(
            bms,
            json,
            "Cell voltages",
            get_cell_voltages,
            "Cannot get cell voltages"
        ),
        CliCommands::CellTemperatures => print_response!(
            bms,
            json,
            "Cell temperatures",
            get_cell_temperatures,
            "Cannot get cell temperatures"
        ),
        CliCommands::Balancing => print_response!(
            bms,
            json,
            "Balancing status",
            get_balancing_status,
            "Cannot get balancing status"
        ),
        CliCommands::Failures => {
            print_response!(bms, json, "Failures", get_failures, "Cannot get failures")
        }
        CliCommands::All => {
            print_response!(bms, json, "Status", get_status, "Cannot get status");
            print_response!(bms, json, "SOC", get_soc, "Cannot get SOC");
            print_response!(
                bms,
                json,
                "Voltage limits",
                get_cell_voltage_limits,
                "Cannot get voltage limits"
            );
            print_response!(
                bms,
                json,
                "Temperature limits",
                get_cell_temperature_limits,
                "Cannot get temperature limits"
            );
            print_response!(
                bms,
                json,
                "Mosfet",
                get_mosfet_status,
                "Cannot get mosfet status"
            );
            print_response!(
                bms,
                json,
                "Cell voltages",
                get_cell_voltages,
                "Cannot get cell voltages"
            );
            print_response!(
                bms,
                json,
                "Cell temperatures",
                get_cell_temperatures,
                "Cannot get cell temperatures"
            );
            print_response!(
                bms,
                json,
                "Balancing status",
                get_balancing_status,
                "Cannot get balancing status"
            );
            print_response!(bms, json, "Failures", get_failures, "Cannot get failures");
        }
    }

    Ok(())
}
