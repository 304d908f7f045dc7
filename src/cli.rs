//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CampusAccess - accessibility reviews for university campuses
///
/// Search schools, read accessibility ratings for recreation centers,
/// dining halls and student centers, and share your own review.
///
/// Examples:
///   campusaccess search "texas at"
///   campusaccess show "University of North Texas"
///   campusaccess signin --email me@unt.edu
///   campusaccess review 7 --recreation 4 --dining 2 --main-area 3 --comment "Ramps everywhere"
///   campusaccess init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Backend project URL
    #[arg(long, global = true, value_name = "URL", env = "CAMPUSACCESS_URL")]
    pub backend_url: Option<String>,

    /// Public (anon) API key for the backend
    #[arg(long, global = true, value_name = "KEY", env = "CAMPUSACCESS_ANON_KEY", hide_env_values = true)]
    pub anon_key: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .campusaccess.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Where to keep the signed-in session
    #[arg(long, global = true, value_name = "FILE")]
    pub session_file: Option<PathBuf>,

    /// Request timeout in seconds
    ///
    /// Unset by default: the backend's own network timeouts apply.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Ask the backend to compute averages instead of computing them locally
    #[arg(long, global = true)]
    pub server_averages: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search schools by (part of) their name
    Search {
        /// Case-insensitive text to look for
        query: String,
    },

    /// List every school
    Schools,

    /// Show ratings and reviews for a school
    Show {
        /// School id or exact name
        school: String,
    },

    /// Submit (or replace) your review of a school
    Review {
        /// School id or exact name
        school: String,

        /// Recreation center rating (1-5)
        #[arg(long, value_name = "1-5", allow_negative_numbers = true)]
        recreation: i64,

        /// Dining hall rating (1-5)
        #[arg(long, value_name = "1-5", allow_negative_numbers = true)]
        dining: i64,

        /// Student center / main area rating (1-5)
        #[arg(long, value_name = "1-5", allow_negative_numbers = true)]
        main_area: i64,

        /// Your experience
        #[arg(long)]
        comment: String,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        email: String,

        /// Name shown next to your reviews
        #[arg(long)]
        display_name: String,

        #[arg(long, env = "CAMPUSACCESS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign in with email and password
    Signin {
        #[arg(long)]
        email: String,

        #[arg(long, env = "CAMPUSACCESS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the stored session
    Signout,

    /// Show who is signed in
    Whoami,

    /// Permanently delete your account
    DeleteAccount {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Generate a default .campusaccess.toml configuration file
    InitConfig,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.backend_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Backend URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match &self.command {
            Command::Signup {
                email,
                display_name,
                ..
            } => {
                if !email.contains('@') {
                    return Err(format!("Not an email address: {}", email));
                }
                if display_name.trim().is_empty() {
                    return Err("Display name cannot be empty".to_string());
                }
            }
            Command::Signin { email, .. } => {
                if !email.contains('@') {
                    return Err(format!("Not an email address: {}", email));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` comes from the config file; `--quiet` still wins.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["campusaccess"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_review_arguments() {
        let args = parse(&[
            "review",
            "7",
            "--recreation",
            "5",
            "--dining",
            "4",
            "--main-area",
            "3",
            "--comment",
            "Smooth paths",
        ]);
        match args.command {
            Command::Review {
                school,
                recreation,
                dining,
                main_area,
                comment,
            } => {
                assert_eq!(school, "7");
                assert_eq!((recreation, dining, main_area), (5, 4, 3));
                assert_eq!(comment, "Smooth paths");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_rating_is_left_to_validation() {
        let args = parse(&[
            "review", "7", "--recreation", "9", "--dining", "-1", "--main-area", "3",
            "--comment", "x",
        ]);
        assert!(matches!(args.command, Command::Review { recreation: 9, dining: -1, .. }));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let args = parse(&["--backend-url", "ftp://nope", "schools"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["-v", "-q", "schools"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_signin_email() {
        let args = parse(&["signin", "--email", "nobody", "--password", "pw"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["schools"]);
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_format_flag() {
        let args = parse(&["search", "baylor", "--format", "json"]);
        assert_eq!(args.format, OutputFormat::Json);
    }
}
