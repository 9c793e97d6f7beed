use anyhow::{Context, Result};
use can_sequence::{
    engine, shutdown, CanId, Console, IdFilter, LogSink, LoopCount, RunConfig, Shutdown,
    MAX_DLC,
};
use can_sequence_socketcan::SocketCanEndpoint;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "cansequence",
    author,
    version,
    about = "Send CAN frames with a rising sequence number, or verify them with --receive",
    long_about = "cansequence sends CAN frames carrying a rising one-byte sequence number as \
payload. With --receive it expects to receive these frames and reports every wrong sequence \
number together with the socket overflow counter. Its purpose is to test the reliability of \
CAN links."
)]
struct Cli {
    /// SocketCAN interface name.
    #[arg(default_value = "can0")]
    interface: String,

    /// Use 29-bit extended identifiers.
    #[arg(short, long)]
    extended: bool,

    /// CAN identifier, decimal, 0x-prefixed hex or 0-prefixed octal.
    #[arg(short, long, value_name = "ID", default_value = "2", value_parser = parse_id)]
    identifier: u32,

    /// Work as receiver.
    #[arg(short, long)]
    receive: bool,

    /// Send or receive COUNT frames, then stop (default: run until interrupted).
    #[arg(long = "loop", value_name = "COUNT", value_parser = parse_count)]
    loop_count: Option<u64>,

    /// Wait for buffer space instead of failing when the transmit queue is full.
    #[arg(short, long)]
    poll: bool,

    /// Quit after NUM wrong sequences (0 = never).
    #[arg(short = 'q', value_name = "NUM", value_parser = parse_threshold)]
    quit_after: Option<u32>,

    /// Quit after NUM wrong sequences; without a value, quit on the first one.
    #[arg(
        long = "quit",
        value_name = "NUM",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1",
        conflicts_with = "quit_after",
        value_parser = parse_threshold
    )]
    quit: Option<u32>,

    /// Be verbose; repeat to be even more verbose.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Payload bytes per frame, clamped to 8.
    #[arg(short, long, value_name = "LEN", default_value = "1", value_parser = parse_datalen)]
    datalen: usize,

    /// File to append received frames and reports to.
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,
}

impl Cli {
    /// Drop threshold from `-q NUM` or `--quit[=NUM]`; 0 never triggers.
    fn drop_threshold(&self) -> Option<u32> {
        self.quit_after.or(self.quit).filter(|n| *n != 0)
    }

    fn run_config(&self) -> RunConfig {
        RunConfig {
            id: CanId::new(self.identifier, self.extended),
            len: self.datalen,
            loop_count: LoopCount::from_option(self.loop_count),
            poll: self.poll,
            drop_until_quit: self.drop_threshold(),
            verbose: self.verbose,
            log_file: self.file.clone(),
            ..RunConfig::default()
        }
    }
}

/// `strtoul(.., 0)`-style parse: `0x` hex, leading `0` octal, decimal otherwise.
fn parse_number(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    let parsed = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if raw.len() > 1 && raw.starts_with('0') {
        u64::from_str_radix(&raw[1..], 8)
    } else {
        raw.parse::<u64>()
    };
    parsed.map_err(|_| format!("invalid number '{raw}'"))
}

fn parse_id(raw: &str) -> Result<u32, String> {
    let value = parse_number(raw)?;
    u32::try_from(value).map_err(|_| "identifier must fit in 32 bits".to_string())
}

fn parse_count(raw: &str) -> Result<u64, String> {
    parse_number(raw)
}

fn parse_threshold(raw: &str) -> Result<u32, String> {
    let value = parse_number(raw)?;
    u32::try_from(value).map_err(|_| "threshold too large".to_string())
}

fn parse_datalen(raw: &str) -> Result<usize, String> {
    let value = parse_number(raw)?;
    Ok(value.min(MAX_DLC as u64) as usize)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let flag = shutdown::install_signal_handlers().context("install signal handlers")?;

    let cfg = cli.run_config();
    cfg.validate().context("invalid configuration")?;

    log::info!(
        "interface = {}, id = {:#x}{}, receive = {}",
        cli.interface,
        cfg.id.raw(),
        if cfg.id.is_extended() { " (extended)" } else { "" },
        cli.receive
    );

    let mut endpoint = SocketCanEndpoint::open(&cli.interface)
        .with_context(|| format!("open socketcan interface {}", cli.interface))?;
    let mut console = Console::stdio();

    let outcome = if cli.receive {
        if let Some(path) = &cfg.log_file {
            let sink = LogSink::open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            if let Some(opened) = sink.path() {
                println!("open {} to dump received frames.", opened.display());
            }
            console.attach_sink(sink);
        }
        endpoint.enable_rx_metadata();
        if !endpoint.has_overflow_metadata() {
            log::info!("socket overflow counters unavailable; reporting 0");
        }
        endpoint
            .install_filter(&IdFilter::exact(cfg.id))
            .context("install receive filter")?;
        engine::run_receive(&mut endpoint, &cfg, flag, &mut console)?
    } else {
        if cfg.log_file.is_some() {
            log::warn!("--file only applies to --receive; ignoring");
        }
        engine::run_transmit(&mut endpoint, &cfg, flag, &mut console)?
    };

    let termination = Shutdown::new(flag)
        .finalize(&mut console, &outcome)
        .context("write summary")?;
    Ok(ExitCode::from(termination.exit_code()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
