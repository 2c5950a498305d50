use clap::Parser;

/// Tonearm: keeps a pool of audio node connections alive and reports on them.
#[derive(Parser, Debug)]
#[command(name = "tonearm", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Seconds between node status reports.
    #[arg(long, default_value_t = 60)]
    pub stats_interval: u64,

    /// Validate the config file and exit.
    #[arg(long)]
    pub check: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
