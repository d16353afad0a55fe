//! Bluemod command line interface.

use std::process;
use std::sync::atomic::Ordering;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
    ArgMatches,
};
use console::style;
use log::{debug, trace, LevelFilter};
use simplelog::*;

use bluemod::{self as bm, DataBits, FlowControl, Parity, StopBits};

fn main() {
    println!("[BM] bluemod v{}", crate_version!());

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Bluemod drives a Bluemod+SR radio module attached to a serial \
            port. The module is reset through the DTR line, configured and \
            switched to MUX mode. Incoming Bluetooth calls are then accepted \
            and the framed requests of connected peers are answered.\n\
            \n\
            Bluemod can be started before or after the serial adapter is \
            plugged in, and survives unplugging and re-plugging it.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the USB tty device to use")
                .long_help(
                    "the USB tty device the radio module is attached to; when \
                     not set, the port is selected interactively.",
                )
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("115200")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DATA_BITS")
                .help("number of bits per character")
                .short("-d")
                .long("--data-bits")
                .takes_value(true)
                .possible_values(&["5", "6", "7", "8"])
                .default_value("8")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("STOP_BITS")
                .help("number of stop bits")
                .short("-s")
                .long("--stop-bits")
                .takes_value(true)
                .possible_values(&["1", "2"])
                .default_value("1")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("PARITY")
                .help("parity checking mode")
                .short("-p")
                .long("--parity")
                .takes_value(true)
                .possible_values(&["none", "odd", "even"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FLOW_CONTROL")
                .help("flow control mode")
                .short("-f")
                .long("--flow-control")
                .takes_value(true)
                .possible_values(&["none", "soft", "hard"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("NAME")
                .help("Bluetooth name advertised by the module")
                .short("-n")
                .long("--name")
                .takes_value(true)
                .default_value("Bluemod")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("RETRY_LIMIT")
                .help("times a module command is sent before giving up")
                .short("-r")
                .long("--retry-limit")
                .takes_value(true)
                .default_value("5")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("CONNECTION_TIMEOUT")
                .help("milliseconds of silence after which a peer is dropped")
                .long_help(
                    "milliseconds without an is-alive frame after which a \
                     peer is disconnected; peers are never dropped when not \
                     set.",
                )
                .short("-c")
                .long("--connection-timeout")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let logger = TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    if logger.is_err() {
        eprintln!("{}: could not set up the logger", style("warning").yellow());
    }

    trace!("{:#?}", matches);

    // Arguments with default values ===========================================

    // Arguments with a default value are always present.

    let baud_rate = numeric::<u32>(&matches, "BAUD_RATE", "baud-rate");
    let retry_limit = numeric::<u8>(&matches, "RETRY_LIMIT", "retry-limit");

    let data_bits = match matches.value_of("DATA_BITS").unwrap_or("8") {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        _ => DataBits::Eight,
    };

    let stop_bits = match matches.value_of("STOP_BITS").unwrap_or("1") {
        "2" => StopBits::Two,
        _ => StopBits::One,
    };

    let parity = match matches.value_of("PARITY").unwrap_or("none") {
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => Parity::None,
    };

    let flow_control = match matches.value_of("FLOW_CONTROL").unwrap_or("none") {
        "soft" => FlowControl::Software,
        "hard" => FlowControl::Hardware,
        _ => FlowControl::None,
    };

    let mut builder = bm::SettingsBuilder::default()
        .baud_rate(baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .device_name(matches.value_of("NAME").unwrap_or("Bluemod"))
        .retry_limit(retry_limit);

    // START - Arguments with NO default values ================================

    if let Some(path) = matches.value_of("DEVICE_TTY") {
        builder = builder.path(path);
    }

    if matches.is_present("CONNECTION_TIMEOUT") {
        let timeout = numeric::<u32>(&matches, "CONNECTION_TIMEOUT", "connection-timeout");
        builder = builder.connection_timeout(timeout);
    }

    // END - Arguments =========================================================

    // Run the state machine ===================================================

    let mut dm = bm::factory(builder.finalize());

    let running = dm.running();
    let installed = ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        if !running.swap(false, Ordering::SeqCst) {
            // Second Ctrl+C while the service loop winds down
            process::exit(0);
        }
    });
    if let Err(err) = installed {
        eprintln!("{}: no Ctrl+C handler: {}", style("warning").yellow(), err);
    }

    let exit_code = dm.run();
    debug!("exit code: {}", exit_code);
    process::exit(exit_code.into());
}

/// Parses a numeric argument, exiting with a styled error when it is not one.
fn numeric<T: std::str::FromStr>(matches: &ArgMatches, name: &str, flag: &str) -> T {
    value_t!(matches.value_of(name), T).unwrap_or_else(|_| {
        println!(
            "{}: `{}` needs to be a numeric value",
            style("error").red(),
            style(flag).cyan()
        );
        println!(
            "   {} `{}` is not a valid value",
            style("-->").cyan(),
            style(matches.value_of(name).unwrap_or_default()).on_red()
        );
        process::exit(-1);
    })
}
