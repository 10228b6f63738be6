//! Hospital card simulator
//!
//! Opens one card from the storage directory, powers it on, selects its
//! applet, and runs hex-encoded command APDUs against it. Each response is
//! printed as hex (data followed by SW1 SW2), one line per command.
//!
//! ```text
//! medcard-sim --kind account A0E60000
//! echo "80200000 04 32353830" | medcard-sim --kind identity
//! ```

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use log::{debug, error, LevelFilter};
use simplelog::WriteLogger;

use medcard::config::{CardConfig, DEFAULT_RSA_BITS, STORAGE_DIR_ENV};
use medcard::crypto::KDF_ITERATIONS;
use medcard::host::commands;
use medcard::{CardKind, VirtualCard};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Identity,
    Account,
}

impl From<Kind> for CardKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Identity => CardKind::Identity,
            Kind::Account => CardKind::Account,
        }
    }
}

/// Run command APDUs against a virtual hospital card
#[derive(Clone, Debug, Parser)]
#[clap(version)]
struct Args {
    /// Card personality to load
    #[clap(long, value_enum, default_value = "account")]
    kind: Kind,

    /// Directory holding the card state files
    #[clap(long, env = STORAGE_DIR_ENV)]
    storage_dir: Option<PathBuf>,

    /// PIN key-derivation iterations
    #[clap(long, default_value_t = KDF_ITERATIONS)]
    kdf_iterations: u32,

    /// RSA modulus size for newly generated key pairs
    #[clap(long, default_value_t = DEFAULT_RSA_BITS)]
    rsa_bits: usize,

    /// Leave the applet unselected after power-on
    #[clap(long)]
    no_select: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Command APDUs in hex; read one per line from stdin when absent
    apdus: Vec<String>,
}

impl Args {
    fn config(&self) -> CardConfig {
        let mut config = match &self.storage_dir {
            Some(dir) => CardConfig::with_storage_dir(dir),
            None => CardConfig::default(),
        };
        config.kdf_iterations = self.kdf_iterations;
        config.rsa_bits = self.rsa_bits;
        config
    }

    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Responses go to stdout, logs to stderr
    let _ = WriteLogger::init(args.log_level(), simplelog::Config::default(), io::stderr());

    let kind = CardKind::from(args.kind);
    let mut card = match VirtualCard::open(kind, args.config()) {
        Ok(card) => card,
        Err(e) => {
            error!("Failed to open {} card: {}", kind, e);
            return ExitCode::FAILURE;
        }
    };

    let atr = card.power_on();
    debug!("ATR: {}", hex::encode_upper(&atr));
    if !args.no_select {
        let response = card.transmit(&commands::select(kind).to_bytes());
        debug!("SELECT: {}", hex::encode_upper(&response));
    }

    let mut failed = false;
    if args.apdus.is_empty() {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => failed |= !run_line(&mut card, &line),
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    } else {
        for apdu in &args.apdus {
            failed |= !run_line(&mut card, apdu);
        }
    }

    card.power_off();
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Send one hex line to the card; blank lines and `#` comments are skipped
fn run_line(card: &mut VirtualCard, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return true;
    }

    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    match hex::decode(&compact) {
        Ok(apdu) => {
            println!("{}", hex::encode_upper(card.transmit(&apdu)));
            true
        }
        Err(e) => {
            error!("Not a hex APDU ({}): {}", e, line);
            false
        }
    }
}
