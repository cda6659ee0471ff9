//! keysweep: recover message-database keys from a desktop client's memory
//! and decrypt its page-encrypted databases.
//!
//! The `key` command streams a memory image of the client process through
//! the search pipeline and prints the confirmed data/image keys; the
//! `decrypt` command turns the account's `db_storage/` tree back into plain
//! SQLite files using a supplied or previously extracted key.

mod cancel;
mod config;
mod decrypt;
mod errors;
mod extract;
mod imgkey;
mod memory;
mod model;
mod platform;
mod search;
#[cfg(test)]
mod testfix;
mod validator;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagecipher::CipherProfile;

use config::Config;
use decrypt::decrypt_db_tree;
use errors::ExtractError;
use extract::Extractor;
use memory::dump::DumpFileSource;
use model::{DataKey, Platform, ProcessTarget};
use validator::Validator;

#[derive(Debug, Parser)]
#[command(name = "keysweep")]
#[command(
    version,
    about = "Recover message-database keys from client memory and decrypt the databases"
)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Account data directory (the one containing db_storage/)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Client platform: darwin or windows
    #[arg(long, global = true, value_name = "NAME")]
    platform: Option<String>,

    /// Client major version (3 or 4)
    #[arg(long, global = true, value_name = "N")]
    client_version: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search a memory image of the client process for the account's keys
    Key {
        /// Memory dump of the running client process
        #[arg(long, value_name = "FILE")]
        dump: PathBuf,

        /// PID the image was taken from (informational)
        #[arg(long, default_value_t = 0)]
        pid: u32,

        /// Also print the SQLCipher raw-key form for the primary database
        /// (raw keys only)
        #[arg(long, default_value_t = false)]
        sqlcipher: bool,
    },

    /// Decrypt the account's databases into an output directory
    Decrypt {
        /// Data key (hex, or "derived:<hex>,<hex>,...")
        #[arg(long, value_name = "KEY")]
        key: Option<String>,

        /// Output directory for the decrypted tree
        #[arg(long, value_name = "DIR")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let overrides = Config {
        data_dir: cli.data_dir.clone(),
        platform: cli
            .platform
            .as_deref()
            .map(|s| s.parse::<Platform>())
            .transpose()?,
        version: cli.client_version,
        ..Config::default()
    };
    let cfg = Config::load(cli.config.as_deref())?.merge(overrides);

    match cli.command {
        Commands::Key {
            dump,
            pid,
            sqlcipher,
        } => run_key(&cfg, &dump, pid, sqlcipher),
        Commands::Decrypt { key, output } => run_decrypt(&cfg, key, &output),
    }
}

fn run_key(cfg: &Config, dump: &Path, pid: u32, sqlcipher: bool) -> anyhow::Result<()> {
    // A pre-supplied key makes extraction a no-op.
    if let Some(key) = &cfg.data_key {
        println!("Data Key: [{key}]");
        println!("Image Key: [{}]", cfg.img_key.as_deref().unwrap_or(""));
        return Ok(());
    }

    let platform = cfg.platform();
    let version = cfg.version();
    let data_dir = cfg.data_dir()?;

    info!(%platform, version, data_dir = %data_dir.display(), "building validator");
    let validator = Arc::new(Validator::new(platform, version, data_dir)?);

    let mut extractor = Extractor::new(platform, version);
    extractor.set_validator(Arc::clone(&validator));

    let source = DumpFileSource::open(dump)?;
    let (data_key, img_key) =
        extractor.extract(&ProcessTarget::online(pid), Box::new(source))?;

    println!("Data Key: [{data_key}]");
    println!(
        "Image Key: [{}]",
        img_key.map(hex::encode).unwrap_or_default()
    );
    if let Some(xor) = validator.img_xor_key() {
        println!("Xor Key: [{xor:#04X}]");
    }

    if sqlcipher {
        if let DataKey::Raw(_) = &data_key {
            let primary = data_dir.join(validator::primary_db_rel(platform, version));
            let raw_form =
                decrypt::sqlcipher_raw_key(validator.profile(), &data_key.to_string(), &primary)?;
            println!("SQLCipher Key: [{raw_form}]");
        }
    }
    Ok(())
}

fn run_decrypt(cfg: &Config, key_arg: Option<String>, output: &Path) -> anyhow::Result<()> {
    let data_dir = cfg.data_dir()?;
    let key_str = key_arg
        .or_else(|| cfg.data_key.clone())
        .ok_or(ExtractError::MissingConfig("data_key"))?;
    let key: DataKey = key_str.parse()?;

    let version = cfg.version();
    let profile =
        CipherProfile::for_version(version).ok_or(ExtractError::UnsupportedProfile(version))?;

    let db_root = data_dir.join(db_root_rel(cfg.platform(), version));
    let count = decrypt_db_tree(&profile, &db_root, output, &key)?;
    info!(count, output = %output.display(), "decryption finished");
    println!("decrypted {count} database(s) into {}", output.display());
    Ok(())
}

/// Where the account keeps its databases, relative to the data directory.
fn db_root_rel(platform: Platform, version: u8) -> PathBuf {
    match (platform, version) {
        (Platform::Windows, 3) => PathBuf::from("Msg"),
        (Platform::Darwin, 3) => PathBuf::from("Message"),
        _ => PathBuf::from("db_storage"),
    }
}
