use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use harvbus::agent::{BusTelemetry, HarvesterAgent};
use harvbus::config::{bus_map, SubsystemAddress};
use harvbus::master::DispatchOutcome;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("harvbus")
        .version("0.1.0")
        .author("Field Systems Engineering Team")
        .about("🚜 Harvester Command Bus - subsystem command dispatch over a shared two-wire bus")
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("map")
                .about("🗺️  Show the bus address and command tables")
                .long_about("Lists every subsystem unit on the bus with its 7-bit address and accepted commands"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("▶️  Run dispatch ticks against the simulated machine")
                .arg(
                    Arg::with_name("ticks")
                        .short("t")
                        .long("ticks")
                        .value_name("N")
                        .help("Number of dispatch ticks to run")
                        .takes_value(true)
                        .default_value("5")
                        .validator(validate_number),
                )
                .arg(
                    Arg::with_name("period-ms")
                        .long("period-ms")
                        .value_name("MS")
                        .help("Delay between ticks in milliseconds")
                        .takes_value(true)
                        .default_value("0")
                        .validator(validate_number),
                )
                .arg(
                    Arg::with_name("detach")
                        .long("detach")
                        .value_name("UNIT")
                        .help("Run with this unit powered off")
                        .takes_value(true)
                        .possible_values(&["extraction", "traction", "mixing"]),
                )
                .arg(
                    Arg::with_name("wedge-tick")
                        .long("wedge-tick")
                        .value_name("K")
                        .help("Wedge the bus just before tick K, release it afterwards")
                        .takes_value(true)
                        .validator(validate_number),
                ),
        )
        .subcommand(
            SubCommand::with_name("trace")
                .about("🔍 Dump the wire event trace for a run")
                .arg(
                    Arg::with_name("ticks")
                        .short("t")
                        .long("ticks")
                        .value_name("N")
                        .help("Number of dispatch ticks to capture")
                        .takes_value(true)
                        .default_value("2")
                        .validator(validate_number),
                ),
        )
        .get_matches();

    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("map", _) => {
            handle_map(format)?;
        }
        ("run", Some(sub_matches)) => {
            handle_run(sub_matches, format)?;
        }
        ("trace", Some(sub_matches)) => {
            handle_trace(sub_matches)?;
        }
        _ => {
            println!(
                "{}",
                "No command specified. Use --help for usage information.".yellow()
            );
            println!("{}", "Quick start:".bright_green());
            println!("  {} Show the bus map", "harvbus map".bright_cyan());
            println!("  {} Run five dispatch ticks", "harvbus run".bright_cyan());
            println!(
                "  {} Watch the wire framing",
                "harvbus trace".bright_cyan()
            );
        }
    }

    Ok(())
}

fn validate_number(v: String) -> Result<(), String> {
    match v.parse::<u64>() {
        Ok(_) => Ok(()),
        Err(_) => Err("must be a number".into()),
    }
}

fn handle_map(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let map = bus_map();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&map)?),
        _ => {
            println!("{}", "🗺️  Bus Map".bright_blue().bold());
            println!("{}", "══════════".bright_blue());
            println!(
                "{} {} kHz",
                "Bus clock:".bright_white(),
                harvbus::config::BUS_CLOCK_HZ / 1000
            );
            println!(
                "{} {}",
                "control".bright_white(),
                "(bus master, no slave address)".dimmed()
            );
            for unit in &map {
                println!(
                    "{} {}",
                    unit.id.name().bright_white(),
                    format!("0x{:02X}", unit.address.raw()).bright_cyan()
                );
                if unit.commands.is_empty() {
                    println!("  {}", "no commands defined".dimmed());
                }
                for spec in unit.commands {
                    println!(
                        "  {} {}",
                        format!("0x{:02X}", spec.opcode).bright_cyan(),
                        spec.label
                    );
                }
            }
        }
    }

    Ok(())
}

fn handle_run(
    matches: &ArgMatches<'_>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ticks: u32 = matches.value_of("ticks").unwrap().parse()?;
    let period_ms: u64 = matches.value_of("period-ms").unwrap().parse()?;
    let wedge_tick: Option<u32> = match matches.value_of("wedge-tick") {
        Some(v) => Some(v.parse()?),
        None => None,
    };

    let mut agent = HarvesterAgent::new();

    if let Some(unit_name) = matches.value_of("detach") {
        if let Some(address) = address_of(unit_name) {
            agent.wire_mut().set_online(address, false);
            if format != "json" {
                println!(
                    "{} {} powered off",
                    "🔌".yellow(),
                    unit_name.bright_white()
                );
            }
        }
    }

    let mut last_telemetry = None;
    for tick in 1..=ticks {
        if wedge_tick == Some(tick) {
            agent.wire_mut().wedge();
        }

        let telemetry = agent.tick();
        if format != "json" {
            print_tick(&telemetry, format);
        }
        last_telemetry = Some(telemetry);

        if agent.wire().is_wedged() {
            agent.wire_mut().release();
            if format != "json" {
                println!("{} bus released", "🔧".yellow());
            }
        }

        if period_ms > 0 && tick < ticks {
            std::thread::sleep(std::time::Duration::from_millis(period_ms));
        }
    }

    match (format, last_telemetry) {
        ("json", Some(telemetry)) => println!("{}", serde_json::to_string_pretty(&telemetry)?),
        (_, Some(telemetry)) => print_summary(&telemetry),
        _ => {}
    }

    Ok(())
}

fn handle_trace(matches: &ArgMatches<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let ticks: u32 = matches.value_of("ticks").unwrap().parse()?;

    let mut agent = HarvesterAgent::new();
    for _ in 0..ticks {
        agent.tick();
    }

    println!("{}", "🔍 Wire Trace".bright_blue().bold());
    println!("{}", "═════════════".bright_blue());
    for event in agent.wire().trace() {
        match event {
            harvbus::bus::WireEvent::Start => println!("{}", "START".bright_green()),
            harvbus::bus::WireEvent::Byte { value, ack } => {
                let ack_str = if ack.is_ack() {
                    "ACK".bright_green()
                } else {
                    "NACK".bright_red()
                };
                println!("  0x{:02X} {}", value, ack_str);
            }
            harvbus::bus::WireEvent::Stop => println!("{}", "STOP".bright_white()),
        }
    }

    Ok(())
}

fn print_tick(telemetry: &BusTelemetry, format: &str) {
    let label = match telemetry.outcome {
        DispatchOutcome::Delivered { target, command } => format!(
            "{} 0x{:02X} → 0x{:02X}",
            "DELIVERED".bright_green(),
            command,
            target.raw()
        ),
        DispatchOutcome::AddressNotAcknowledged { target } => format!(
            "{} from 0x{:02X}",
            "NO ACK".bright_red(),
            target.raw()
        ),
        DispatchOutcome::CommandNotAcknowledged { target, command } => format!(
            "{} for 0x{:02X} at 0x{:02X}",
            "NO ACK".bright_red(),
            command,
            target.raw()
        ),
        DispatchOutcome::BusStuck => "BUS STUCK".bright_yellow().to_string(),
        DispatchOutcome::Idle => "IDLE".dimmed().to_string(),
    };

    match format {
        "compact" => println!("tick {}: {}", telemetry.tick, label),
        _ => {
            let completion = match telemetry.completion {
                Some(status) => format!("completion 0x{:02X}", status),
                None => "no completion".dimmed().to_string(),
            };
            println!("tick {:>3} │ {} │ {}", telemetry.tick, label, completion);
        }
    }
}

fn print_summary(telemetry: &BusTelemetry) {
    println!();
    println!("{}", "📊 Run Summary".bright_blue().bold());
    println!("{}", "══════════════".bright_blue());
    println!(
        "Ticks: {}  Delivered: {}  Address NACKs: {}  Command NACKs: {}  Timeouts: {}",
        telemetry.dispatch.ticks.to_string().bright_white(),
        telemetry.dispatch.delivered.to_string().bright_green(),
        telemetry.dispatch.address_nacks.to_string().bright_yellow(),
        telemetry.dispatch.command_nacks.to_string().bright_yellow(),
        telemetry.dispatch.bus_timeouts.to_string().bright_red(),
    );
    println!(
        "Faults: {} timeouts, {} no-acks, {} unknown commands, {} partial transactions",
        telemetry.fault_counters.bus_timeouts,
        telemetry.fault_counters.no_acknowledges,
        telemetry.fault_counters.unknown_commands,
        telemetry.fault_counters.partial_transactions,
    );
    for unit in &telemetry.units {
        println!(
            "{} 0x{:02X}: {} transactions, {} applied, {} unknown",
            unit.unit.name().bright_white(),
            unit.address,
            unit.diagnostics.transactions,
            unit.diagnostics.commands_applied,
            unit.diagnostics.unknown_commands,
        );
    }
}

fn address_of(unit_name: &str) -> Option<SubsystemAddress> {
    bus_map()
        .iter()
        .find(|unit| unit.id.name() == unit_name)
        .map(|unit| unit.address)
}
