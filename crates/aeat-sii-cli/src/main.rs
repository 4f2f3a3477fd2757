mod cli;
mod commands;
mod config;
mod storage;

use aeat_sii_core::storage::SecretCipher;
use aeat_sii_storage::key_provider::{encode_key, generate_key};
use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{CompanyCommand, ConfigCommand};

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config)?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Keygen => println!("{}", encode_key(&generate_key())),
        cli::Command::Company(cmd) => run_company(cmd, &config)?,
        cli::Command::Import {
            company,
            pfx,
            password,
        } => {
            let store = storage::store_from_config(&config)?;
            commands::import(&store, company, &pfx, password)?;
            println!("Credentials loaded for company {company}");
        }
        cli::Command::ClearKey { company } => {
            let store = storage::store_from_config(&config)?;
            commands::clear_key(&store, company)?;
        }
        cli::Command::Exec { company, command } => {
            let store = storage::store_from_config(&config)?;
            let status = commands::exec(&store, company, config.tmp_dir.clone(), &command)?;
            if !status.success() {
                std::process::exit(status.code().unwrap_or(1));
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("aeat-sii {}", env!("CARGO_PKG_VERSION"));
}

/// Checks the key configuration and the data directory.
fn run_health_check(config: &config::Config) -> Result<()> {
    let cipher = storage::cipher_from_config(config);
    run_cipher_health(&cipher)?;
    println!("Cipher: ok");

    let store = storage::store_from_config(config)?;
    let companies = commands::list_companies(&store)?;
    println!("Storage: ok ({} companies)", companies.len());
    Ok(())
}

fn run_cipher_health<C: SecretCipher>(cipher: &C) -> Result<()> {
    let payload = b"ok";
    let token = cipher.encrypt(payload)?;
    if cipher.decrypt(&token)? != payload {
        color_eyre::eyre::bail!("cipher round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn run_company(cmd: CompanyCommand, config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    match cmd {
        CompanyCommand::Add { id, name } => {
            commands::add_company(&store, id, name)?;
            println!("Company {id} registered");
        }
        CompanyCommand::Show { id } => println!("{}", commands::describe_company(&store, id)?),
        CompanyCommand::List => {
            let companies = commands::list_companies(&store)?;
            if companies.is_empty() {
                println!("No companies yet. Add one with `aeat-sii company add <id> <name>`.");
            }
            for line in companies {
                println!("{line}");
            }
        }
    }
    Ok(())
}
