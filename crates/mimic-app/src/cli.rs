//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use mimic_core::Mode;

/// Record-and-replay HTTP(S) proxy for service virtualization.
#[derive(Parser, Debug)]
#[command(name = "mimic")]
#[command(about = "Record-and-replay HTTP(S) proxy for service virtualization")]
#[command(version)]
pub struct Cli {
    /// Log every proxied request at debug level
    #[arg(short, long)]
    pub verbose: bool,

    /// Capture traffic: forward upstream and persist each exchange
    #[arg(long, conflicts_with_all = ["synthesize", "modify"])]
    pub capture: bool,

    /// Synthesize responses entirely from middleware
    #[arg(long, conflicts_with = "modify")]
    pub synthesize: bool,

    /// Transform live traffic through middleware
    #[arg(long)]
    pub modify: bool,

    /// Regex of destination hosts to intercept
    #[arg(long, default_value = ".")]
    pub destination: String,

    /// Middleware executable applied to payloads
    #[arg(long)]
    pub middleware: Option<String>,

    /// Forward all requests to this upstream host:port
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Proxy listen port
    #[arg(long = "proxy-port", short = 'p')]
    pub proxy_port: Option<u16>,

    /// Admin API listen port
    #[arg(long = "admin-port", short = 'a')]
    pub admin_port: Option<u16>,

    /// Capture database path
    #[arg(long)]
    pub database: Option<PathBuf>,
}

impl Cli {
    /// Resolves the processing mode; no mode flag means virtualize.
    pub fn mode(&self) -> Mode {
        if self.capture {
            Mode::Capture
        } else if self.synthesize {
            Mode::Synthesize
        } else if self.modify {
            Mode::Modify
        } else {
            Mode::Virtualize
        }
    }
}
