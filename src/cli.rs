//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// company-kb - knowledge base for company-analysis runs
///
/// Summarize an analysis directory, archive its raw inputs, and query
/// the global company index.
///
/// Examples:
///   company-kb summarize company_analysis_09992.HK_20260126
///   company-kb summarize company_analysis_09992.HK_20260126 --no-keep-original
///   company-kb list
///   company-kb load 09992.HK
///   company-kb compare 09992.HK 00700.HK
///   company-kb summary 09992.HK
///   company-kb search popmart
///   company-kb restore 09992.HK
///   company-kb --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the global company index
    ///
    /// Defaults to company_index.json in the current directory, or the
    /// index_path from .company-kb.toml.
    #[arg(long, global = true, value_name = "FILE", env = "COMPANY_KB_INDEX")]
    pub index: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .company-kb.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .company-kb.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Summarize an analysis directory, archive raw data, and update the index
    Summarize {
        /// Analysis directory (company_analysis_<code>_<YYYYMMDD>)
        #[arg(value_name = "ANALYSIS_DIR")]
        analysis_dir: PathBuf,

        /// Delete the raw data directory once the archive is verified
        #[arg(long)]
        no_keep_original: bool,

        /// Do not create an archive
        #[arg(long, conflicts_with = "no_keep_original")]
        skip_archive: bool,
    },

    /// List all indexed companies
    List,

    /// Show the stored knowledge for one company
    Load {
        #[arg(value_name = "CODE")]
        company_code: String,
    },

    /// Compare key metrics across two or more companies
    Compare {
        #[arg(value_name = "CODE", required = true, num_args = 2..)]
        company_codes: Vec<String>,
    },

    /// Write LEARNING_SUMMARY.md into the company's analysis directory
    Summary {
        #[arg(value_name = "CODE")]
        company_code: String,
    },

    /// Search indexed companies by code or name
    Search {
        #[arg(value_name = "KEYWORD")]
        keyword: String,
    },

    /// Unpack a company's raw data archive back into its analysis directory
    Restore {
        #[arg(value_name = "CODE")]
        company_code: String,
    },
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match &self.command {
            None => Err("No command given. Run with --help for usage.".to_string()),
            Some(Command::Summarize { analysis_dir, .. }) => {
                if !analysis_dir.exists() {
                    return Err(format!(
                        "Analysis directory does not exist: {}",
                        analysis_dir.display()
                    ));
                }
                if !analysis_dir.is_dir() {
                    return Err(format!(
                        "Analysis path is not a directory: {}",
                        analysis_dir.display()
                    ));
                }
                Ok(())
            }
            Some(Command::Compare { company_codes }) if company_codes.len() < 2 => {
                Err("compare needs at least 2 company codes".to_string())
            }
            Some(Command::Load { company_code })
            | Some(Command::Summary { company_code })
            | Some(Command::Restore { company_code })
                if company_code.trim().is_empty() =>
            {
                Err("Company code must not be empty".to_string())
            }
            Some(_) => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `general.verbose` from the config file; `--quiet`
    /// overrides it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            command: Some(command),
            index: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_summarize_flags() {
        let args = Args::try_parse_from([
            "company-kb",
            "summarize",
            "company_analysis_09992.HK_20260126",
            "--no-keep-original",
        ])
        .unwrap();

        match args.command {
            Some(Command::Summarize {
                analysis_dir,
                no_keep_original,
                skip_archive,
            }) => {
                assert_eq!(
                    analysis_dir,
                    PathBuf::from("company_analysis_09992.HK_20260126")
                );
                assert!(no_keep_original);
                assert!(!skip_archive);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_compare_requires_two_codes() {
        assert!(Args::try_parse_from(["company-kb", "compare", "09992.HK"]).is_err());

        let args =
            Args::try_parse_from(["company-kb", "compare", "09992.HK", "00700.HK"]).unwrap();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["company-kb", "list", "--index", "kb.json", "-v"]).unwrap();
        assert_eq!(args.index, Some(PathBuf::from("kb.json")));
        assert!(args.verbose);
    }

    #[test]
    fn test_validation_missing_analysis_dir() {
        let args = make_args(Command::Summarize {
            analysis_dir: PathBuf::from("/definitely/not/here"),
            no_keep_original: false,
            skip_archive: false,
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::List);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_requires_command() {
        let mut args = make_args(Command::List);
        args.command = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::List);
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
