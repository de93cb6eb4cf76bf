//! Content Analytics - inspect and drain the durable event pipeline.

mod commands;
mod sink;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use featurization_worker::Consent;
use pipeline_config_and_utils::{init_logging, parse_level, Config, Paths};

/// Content analytics command-line interface.
#[derive(Parser)]
#[command(name = "content-analytics")]
#[command(about = "Inspect, replay and drain the content analytics queues")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for queues, logs and config. Defaults to ~/.content-analytics
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how many records each durable queue holds
    Status,
    /// Replay persisted events and flush them as metrics
    Replay,
    /// Discard every pending interaction event
    Clear,
    /// Run the featurization queue until it is empty or backing off
    Featurize {
        /// Data collection consent to apply first
        #[arg(long, value_enum, default_value_t = ConsentArg::Granted)]
        consent: ConsentArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConsentArg {
    Granted,
    Pending,
    Denied,
}

impl From<ConsentArg> for Consent {
    fn from(arg: ConsentArg) -> Self {
        match arg {
            ConsentArg::Granted => Consent::Granted,
            ConsentArg::Pending => Consent::Pending,
            ConsentArg::Denied => Consent::Denied,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Unknown level names fall back to info.
    let level = parse_level(&cli.log_level).to_string().to_lowercase();
    init_logging(&level, None);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    match cli.command {
        Commands::Status => {
            commands::status(&paths)?;
        }
        Commands::Replay => {
            commands::replay(&config, &paths).await?;
        }
        Commands::Clear => {
            commands::clear(&config, &paths).await?;
        }
        Commands::Featurize { consent } => {
            commands::featurize(&config, &paths, consent.into()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["content-analytics", "status", "--base-dir", "/tmp/ca", "-l", "debug"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/ca")));
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn featurize_consent_defaults_to_granted() {
        let cli = Cli::try_parse_from(["content-analytics", "featurize"]).unwrap();
        match cli.command {
            Commands::Featurize { consent } => assert_eq!(Consent::from(consent), Consent::Granted),
            _ => panic!("expected featurize"),
        }

        let cli =
            Cli::try_parse_from(["content-analytics", "featurize", "--consent", "pending"]).unwrap();
        match cli.command {
            Commands::Featurize { consent } => assert_eq!(Consent::from(consent), Consent::Pending),
            _ => panic!("expected featurize"),
        }
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["content-analytics"]).is_err());
    }
}
