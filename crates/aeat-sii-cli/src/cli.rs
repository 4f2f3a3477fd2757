use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface for managing AEAT SII client credentials.
#[derive(Parser, Debug)]
#[command(
    name = "aeat-sii",
    about = "Manage AEAT SII client certificates and keys",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Check that the symmetric key is configured and the data directory is readable.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print a new random symmetric key for the `[cryptography]` section.
    Keygen,
    /// Manage company records.
    #[command(subcommand)]
    Company(CompanyCommand),
    /// Load a PKCS12 (.pfx/.p12) bundle into a company.
    Import {
        company: u64,
        pfx: PathBuf,
        /// Bundle password; falls back to AEAT_SII_PFX_PASSWORD.
        #[arg(long)]
        password: Option<String>,
    },
    /// Remove the stored private key of a company.
    ClearKey { company: u64 },
    /// Run a program with the company's credentials written to temporary
    /// files, exposed as AEAT_SII_CERT_FILE and AEAT_SII_KEY_FILE.
    Exec {
        company: u64,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CompanyCommand {
    /// Register a company.
    Add { id: u64, name: String },
    /// Show credential status of a company.
    Show { id: u64 },
    /// List registered companies.
    List,
}
