use clap::{Parser, Subcommand};

/// CLI entry point so operators can control the harvester from the command line.
/// Exit codes: 0=success, 2=invalid arguments, 1=runtime error
#[derive(Parser, Debug)]
#[command(name = "argos_harvest")]
#[command(about = "Resolves EAN codes and model numbers to Argos product pages and scrapes product data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve and scrape every identifier in the input CSV. Resumable:
    /// already-settled identifiers are skipped on later runs.
    Run {
        #[arg(
            short,
            long,
            default_value = "input.csv",
            help = "Input CSV with 'EAN' and 'Model' columns"
        )]
        input: String,

        #[arg(
            short,
            long,
            default_value = "./data",
            help = "Directory holding persisted resolution state"
        )]
        data_dir: String,

        #[arg(
            short,
            long,
            default_value = "scraped_products",
            help = "Directory for per-product JSON records"
        )]
        output_dir: String,

        #[arg(long, help = "Re-scrape identifiers that already resolved successfully")]
        rescrape: bool,
    },

    /// Flatten saved product JSON records into a single CSV report.
    Report {
        #[arg(
            short,
            long,
            default_value = "scraped_products",
            help = "Directory of per-product JSON records"
        )]
        input_dir: String,

        #[arg(short, long, default_value = "output.csv", help = "Output CSV file")]
        output: String,
    },

    /// Show per-channel block status from the persisted snapshot.
    Status {
        #[arg(
            short,
            long,
            default_value = "./data",
            help = "Directory holding persisted resolution state"
        )]
        data_dir: String,
    },
}

impl Cli {
    /// Parse CLI arguments so the rest of the program can rely on structured
    /// options. On error, clap prints help and exits with code 2.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::try_parse_from(["argos_harvest", "run"]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Run {
                input,
                data_dir,
                output_dir,
                rescrape,
            } => {
                assert_eq!(input, "input.csv");
                assert_eq!(data_dir, "./data");
                assert_eq!(output_dir, "scraped_products");
                assert!(!rescrape);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_command_with_options() {
        let cli = Cli::try_parse_from([
            "argos_harvest",
            "run",
            "--input",
            "products.csv",
            "--data-dir",
            "/tmp/state",
            "--rescrape",
        ]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Run {
                input,
                data_dir,
                rescrape,
                ..
            } => {
                assert_eq!(input, "products.csv");
                assert_eq!(data_dir, "/tmp/state");
                assert!(rescrape);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_report_command() {
        let cli = Cli::try_parse_from([
            "argos_harvest",
            "report",
            "--input-dir",
            "./records",
            "--output",
            "report.csv",
        ]);
        assert!(cli.is_ok());
        match cli.unwrap().command {
            Commands::Report { input_dir, output } => {
                assert_eq!(input_dir, "./records");
                assert_eq!(output, "report.csv");
            }
            _ => panic!("Expected Report command"),
        }
    }

    #[test]
    fn test_status_command() {
        let cli = Cli::try_parse_from(["argos_harvest", "status"]);
        assert!(cli.is_ok());
        assert!(matches!(
            cli.unwrap().command,
            Commands::Status { .. }
        ));
    }

    #[test]
    fn test_invalid_command() {
        let cli = Cli::try_parse_from(["argos_harvest", "explode"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_help_does_not_panic() {
        let cli = Cli::try_parse_from(["argos_harvest", "--help"]);
        assert!(cli.is_err());
        assert_eq!(
            cli.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }
}
