//! SimpleLink console
//!
//! Connects to a KISS TNC over TCP or a serial port (or the echo loopback),
//! sends each line typed on stdin as a reliable message and prints link
//! events as they happen.

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam::channel::{self, Receiver, TryRecvError};
use simplelink_cli::console::HELP;
use simplelink_cli::{compact_stats, display_stats, Command, Config, TncTransport};
use simplelink::io::{KissSerial, KissTcp, Loopback, Ticker, DEFAULT_TICK_MS};
use simplelink::protocol::kiss::encode_command;
use simplelink::protocol::{ByteSink, ByteSource};
use simplelink::{LinkEngine, LinkEvent};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Consecutive failing ticks before the TNC is considered gone
const MAX_FAILING_TICKS: u32 = 30;

/// Time allowed for startup KISS parameters to be written
const KISS_SETUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "simplelink")]
#[command(about = "Reliable messaging over a KISS TNC", long_about = None)]
struct Args {
    /// Station callsign
    #[arg(short, long)]
    callsign: Option<String>,

    /// KISS-over-TCP TNC endpoint
    #[arg(
        short,
        long,
        value_name = "HOST:PORT",
        conflicts_with_all = ["loopback", "serial"]
    )]
    tnc: Option<String>,

    /// Serial device of a hardware KISS TNC
    #[arg(short, long, value_name = "PATH", conflicts_with = "loopback")]
    serial: Option<String>,

    /// Serial line rate (default 9600)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Use the echo loopback instead of a TNC
    #[arg(long)]
    loopback: bool,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// KISS parameter sent at startup (repeatable), e.g. txdelay=30
    #[arg(short, long, value_name = "NAME=VALUE")]
    kiss: Vec<String>,

    /// Do not forward packets for other stations
    #[arg(long)]
    no_relay: bool,

    /// Tick period in milliseconds
    #[arg(long, default_value_t = DEFAULT_TICK_MS)]
    tick_ms: u64,

    /// Print a one-line summary every N seconds (0 disables)
    #[arg(long, default_value = "0")]
    stats: u64,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(callsign) = &args.callsign {
        config.station.callsign = Some(callsign.clone());
    }
    if let Some(tnc) = &args.tnc {
        config.tnc.address = Some(tnc.clone());
        config.tnc.serial = None;
        config.tnc.loopback = false;
    }
    if let Some(serial) = &args.serial {
        config.tnc.address = None;
        config.tnc.serial = Some(serial.clone());
        config.tnc.loopback = false;
    }
    if let Some(baud) = args.baud {
        config.tnc.baud = baud;
    }
    if args.loopback {
        config.tnc.address = None;
        config.tnc.serial = None;
        config.tnc.loopback = true;
    }
    if args.no_relay {
        config.link.relay = false;
    }
    config.tnc.kiss.extend(args.kiss.iter().cloned());

    config.validate()?;
    Ok(config)
}

fn open_transport(config: &Config) -> anyhow::Result<(Box<dyn ByteSource>, Box<dyn ByteSink>)> {
    match config.tnc.transport()? {
        TncTransport::Tcp(address) => {
            let tcp = KissTcp::connect(&address, config.tnc.connect_timeout())
                .with_context(|| format!("connecting to TNC at {}", address))?;
            Ok(tcp.split()?)
        }
        TncTransport::Serial { path, baud } => {
            let serial = KissSerial::open(&path, baud)?;
            Ok(serial.split()?)
        }
        TncTransport::Loopback => {
            info!("using echo loopback");
            Ok(Loopback::new().split())
        }
    }
}

/// Write all of `bytes` to a non-blocking sink
fn write_fully(sink: &mut dyn ByteSink, mut bytes: &[u8], deadline: Instant) -> anyhow::Result<()> {
    while !bytes.is_empty() {
        match sink.write(bytes) {
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }
        if bytes.is_empty() {
            break;
        }
        if Instant::now() >= deadline {
            bail!("timed out writing to TNC");
        }
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

fn configure_tnc(config: &Config, sink: &mut dyn ByteSink) -> anyhow::Result<()> {
    let deadline = Instant::now() + KISS_SETUP_TIMEOUT;
    for (command, value) in config.kiss_settings()? {
        info!(%command, value, "setting KISS parameter");
        let frame = encode_command(command, value, config.link.kiss_port);
        write_fully(sink, &frame, deadline)?;
    }
    Ok(())
}

fn spawn_stdin_reader() -> anyhow::Result<Receiver<String>> {
    let (tx, rx) = channel::unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

fn print_event(event: &LinkEvent) {
    match event {
        LinkEvent::Recv { .. } | LinkEvent::Observe { .. } => println!("<< {}", event),
        LinkEvent::Send { .. } => println!(">> {}", event),
        _ => println!("-- {}", event),
    }
}

/// Handle one console line, returning false on quit
fn handle_line(engine: &mut LinkEngine, line: &str, started: Instant) -> bool {
    match line.parse::<Command>() {
        Ok(Command::Send { hops, payload }) => {
            if let Err(e) = engine.send(&hops, &payload) {
                eprintln!("send failed: {}", e);
            }
        }
        Ok(Command::Cancel(prn)) => {
            if !engine.cancel(prn) {
                eprintln!("no outstanding message #{}", prn);
            }
        }
        Ok(Command::Stats) => display_stats(engine.stats(), started.elapsed()),
        Ok(Command::Help) => println!("{}", HELP),
        Ok(Command::Quit) => return false,
        Ok(Command::Empty) => {}
        Err(e) => eprintln!("{}", e),
    }
    true
}

fn run(
    engine: &mut LinkEngine,
    events: &Receiver<LinkEvent>,
    lines: &Receiver<String>,
    args: &Args,
    started: Instant,
) -> anyhow::Result<()> {
    let mut ticker = Ticker::with_millis(args.tick_ms.max(1));
    let stats_interval = Duration::from_secs(args.stats);
    let mut last_stats = Instant::now();
    let mut input_closed = false;
    let mut failing_ticks = 0u32;

    loop {
        let elapsed = ticker.wait();

        while !input_closed {
            match lines.try_recv() {
                Ok(line) => {
                    if !handle_line(engine, &line, started) {
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("input closed, waiting for outstanding messages");
                    input_closed = true;
                }
            }
        }

        let report = engine.tick(elapsed);
        for event in events.try_iter() {
            print_event(&event);
        }

        if report.transport_errors > 0 {
            failing_ticks += 1;
            if failing_ticks >= MAX_FAILING_TICKS {
                bail!("TNC connection lost");
            }
        } else {
            failing_ticks = 0;
        }

        if !stats_interval.is_zero() && last_stats.elapsed() >= stats_interval {
            println!("{}", compact_stats(engine.stats(), engine.outstanding()));
            last_stats = Instant::now();
        }

        if input_closed && report.outstanding == 0 && report.pending_tx_bytes == 0 {
            return Ok(());
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.example_config {
        print!("{}", toml::to_string_pretty(&Config::example())?);
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&args.log_level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&args)?;
    let station = config.station()?;
    info!(%station, "SimpleLink starting");

    let mut engine = LinkEngine::new(config.link_config());
    engine.set_congestion_control(config.link.congestion.build());
    engine.initialize(station)?;

    let (events_tx, events_rx) = channel::unbounded();
    engine.set_event_sink(Box::new(events_tx));

    let (source, mut sink) = open_transport(&config)?;
    configure_tnc(&config, sink.as_mut())?;
    engine.attach(source, sink);

    let lines = spawn_stdin_reader()?;
    let started = Instant::now();
    println!("{} ready, /help for commands", station);

    let result = run(&mut engine, &events_rx, &lines, &args, started);

    display_stats(engine.stats(), started.elapsed());
    result
}
