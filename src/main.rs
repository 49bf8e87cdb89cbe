mod backup;
mod clipboard;
mod config;
mod crypto;
mod entry;
mod otp;
mod prompt;
mod qr;
mod session;
mod store;

use crate::backup::backup_create;
use crate::clipboard::copy_to_clipboard;
use crate::config::Config;
use crate::crypto::generate_new_config;
use crate::entry::{OtpEntry, OtpKind, ValidationError};
use crate::prompt::{prompt_counter, prompt_password_hidden, prompt_string};
use crate::session::get_master_key_with_cache;
use crate::store::{EntryStore, VaultStore, store_root};
use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;
use url::Url;

/// Issuer по умолчанию для provisioning URI.
const DEFAULT_ISSUER: &str = "otpm";

#[derive(Parser, Debug)]
#[command(name = "otpm", version, about = "Minimal TOTP/HOTP manager in Rust")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the OTP vault
    Init,

    /// Add or replace an entry
    ///
    /// Примеры:
    ///   otpm add github
    ///   otpm add work/gitlab
    Add {
        /// Label like github or work/gitlab
        label: String,
    },

    /// List entries with their current codes
    ///
    /// Примеры:
    ///   otpm ls
    ///   otpm ls work
    Ls {
        /// Optional prefix (folder), e.g. "work"
        prefix: Option<String>,
    },

    /// Show entry details
    Show {
        label: String,
        /// Show as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the current one-time code
    Code { label: String },

    /// Copy the current one-time code to clipboard
    Clip { label: String },

    /// Advance the counter of a counter-based entry
    ///
    /// Примеры:
    ///   otpm advance github
    Advance { label: String },

    /// Remove an entry
    Rm { label: String },

    /// Print the otpauth:// provisioning URI
    Uri {
        label: String,
        #[arg(long, default_value = DEFAULT_ISSUER)]
        issuer: String,
    },

    /// Render the provisioning URI as an SVG QR code
    ///
    /// Примеры:
    ///   otpm qr github
    ///   otpm qr github --out github.svg
    Qr {
        label: String,
        #[arg(long, default_value = DEFAULT_ISSUER)]
        issuer: String,
        /// Output file (default: qr_<label>.svg)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Generate a fresh base32 secret
    Secret,

    /// Backup the whole vault
    Backup {
        #[command(subcommand)]
        cmd: BackupCommands,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommands {
    /// Create backup archive
    ///
    /// Примеры:
    ///   otpm backup create
    ///   otpm backup create my_backup.zip
    Create {
        /// Optional backup filename
        file: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init()?,
        Commands::Add { label } => cmd_add(&label)?,
        Commands::Ls { prefix } => cmd_ls(prefix.as_deref())?,
        Commands::Show { label, json } => cmd_show(&label, json)?,
        Commands::Code { label } => cmd_code(&label)?,
        Commands::Clip { label } => cmd_clip(&label)?,
        Commands::Advance { label } => cmd_advance(&label)?,
        Commands::Rm { label } => cmd_rm(&label)?,
        Commands::Uri { label, issuer } => cmd_uri(&label, &issuer)?,
        Commands::Qr { label, issuer, out } => cmd_qr(&label, &issuer, out)?,
        Commands::Secret => println!("{}", otp::generate_secret()),
        Commands::Backup { cmd } => match cmd {
            BackupCommands::Create { file } => backup_create(file)?,
        },
    }

    Ok(())
}

/// Открывает долговременный каталог, распечатав master key.
fn open_store() -> anyhow::Result<VaultStore> {
    let config = Config::load()?;
    let mk = get_master_key_with_cache(&config)?;
    Ok(VaultStore::new(store_root()?.join("store"), mk))
}

fn cmd_init() -> anyhow::Result<()> {
    let root = store_root()?;
    if root.exists() {
        println!("Vault already exists at: {}", root.display());
        return Ok(());
    }

    std::fs::create_dir_all(&root)?;
    let master_password = prompt_password_hidden("New master password: ")?;
    let confirm = prompt_password_hidden("Confirm master password: ")?;
    if master_password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let config = generate_new_config(&master_password)?;
    let config_path = crate::config::config_path()?;
    crate::config::save_config(&config, &config_path)?;

    println!("Initialized vault at {}", root.display());
    Ok(())
}

fn cmd_add(label: &str) -> anyhow::Result<()> {
    let label = label.trim();
    if label.is_empty() {
        anyhow::bail!("label cannot be empty");
    }

    let mut store = open_store()?;

    let raw = prompt_string("Secret (base32), otpauth:// URI, or empty to generate: ")?;
    let raw = raw.trim();

    let entry = if raw.is_empty() {
        let secret = otp::generate_secret();
        println!("Generated secret: {secret}");
        build_entry_interactive(secret)?
    } else if raw.starts_with("otpauth://") {
        parse_otpauth_input(raw)?
    } else {
        build_entry_interactive(raw.to_string())?
    };

    store.put(label, entry)?;
    println!("Saved entry {label}");
    Ok(())
}

/// Дособирает запись по введённому секрету: тип и, для hotp, счётчик.
fn build_entry_interactive(secret: String) -> anyhow::Result<OtpEntry> {
    let kind = prompt_kind()?;
    let counter = match kind {
        OtpKind::Hotp => Some(prompt_counter("Initial counter [0]: ")?),
        OtpKind::Totp => None,
    };
    Ok(OtpEntry::new(secret, kind, counter)?)
}

fn prompt_kind() -> anyhow::Result<OtpKind> {
    let s = prompt_string("Type, totp or hotp [totp]: ")?;
    let s = s.trim();
    if s.is_empty() {
        return Ok(OtpKind::Totp);
    }
    Ok(OtpKind::from_str(s)?)
}

/// Разбирает otpauth:// URI: тип из host, секрет и счётчик из query.
/// Всё прочее (digits, period, algorithm) не настраивается — генератор
/// работает со стандартными 6/30/SHA-1.
fn parse_otpauth_input(input: &str) -> anyhow::Result<OtpEntry> {
    let url = Url::parse(input).map_err(|e| anyhow!("Invalid otpauth URI: {e}"))?;

    if url.scheme() != "otpauth" {
        anyhow::bail!("Invalid otpauth URI scheme: {}", url.scheme());
    }

    let kind = OtpKind::from_str(url.host_str().unwrap_or(""))?;

    let mut secret: Option<String> = None;
    let mut counter: Option<u64> = None;

    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "secret" => secret = Some(v.to_string()),
            "counter" => {
                counter = Some(
                    v.parse::<u64>()
                        .map_err(|_| ValidationError::InvalidCounter)?,
                )
            }
            _ => {}
        }
    }

    let secret = secret.ok_or_else(|| anyhow!("otpauth URI missing 'secret' param"))?;
    if kind == OtpKind::Hotp && counter.is_none() {
        anyhow::bail!("otpauth URI missing 'counter' param for hotp");
    }

    Ok(OtpEntry::new(secret, kind, counter)?)
}

fn load_entry(store: &VaultStore, label: &str) -> anyhow::Result<OtpEntry> {
    store
        .get(label)?
        .ok_or_else(|| anyhow!("No entry for label '{label}'"))
}

fn cmd_ls(prefix: Option<&str>) -> anyhow::Result<()> {
    let store = open_store()?;
    let entries = store.list_all()?;

    if entries.is_empty() {
        return Ok(());
    }

    let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
    let remaining = otp::STEP_SECONDS - now % otp::STEP_SECONDS;

    for (label, entry) in entries {
        if let Some(pref) = prefix {
            let pref_slash = format!("{pref}/");
            if label != pref && !label.starts_with(&pref_slash) {
                continue;
            }
        }

        // Испорченная запись не должна ронять вывод остальных
        match otp::current_code(&entry) {
            Ok(code) => match entry.kind() {
                OtpKind::Totp => println!("{label}  {code}  (expires in {remaining}s)"),
                OtpKind::Hotp => {
                    println!("{label}  {code}  (counter {})", entry.counter().unwrap_or(0))
                }
            },
            Err(e) => eprintln!("{label}: {e}"),
        }
    }

    Ok(())
}

fn cmd_show(label: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store()?;
    let entry = load_entry(&store, label)?;

    if json {
        let s = serde_json::to_string_pretty(&entry)?;
        println!("{s}");
        return Ok(());
    }

    println!("Label:   {label}");
    println!("Type:    {}", entry.kind());
    println!("Secret:  {}", entry.secret());
    if let Some(counter) = entry.counter() {
        println!("Counter: {counter}");
    }

    Ok(())
}

fn cmd_code(label: &str) -> anyhow::Result<()> {
    let store = open_store()?;
    let entry = load_entry(&store, label)?;
    let code = otp::current_code(&entry)?;
    println!("{code}");
    Ok(())
}

fn cmd_clip(label: &str) -> anyhow::Result<()> {
    let store = open_store()?;
    let entry = load_entry(&store, label)?;
    let code = otp::current_code(&entry)?;
    copy_to_clipboard(&code)?;
    println!("OTP code copied to clipboard.");
    Ok(())
}

fn cmd_advance(label: &str) -> anyhow::Result<()> {
    let mut store = open_store()?;
    let next = store.advance_counter(label)?;
    println!("Counter for {label} advanced to {next}");
    Ok(())
}

fn cmd_rm(label: &str) -> anyhow::Result<()> {
    let mut store = open_store()?;
    if store.get(label)?.is_none() {
        println!("No entry for label '{label}'");
        return Ok(());
    }
    store.delete(label)?;
    println!("Removed {label}");
    Ok(())
}

fn cmd_uri(label: &str, issuer: &str) -> anyhow::Result<()> {
    let store = open_store()?;
    let entry = load_entry(&store, label)?;
    let uri = otp::provisioning_uri(&entry, label, issuer)?;
    println!("{uri}");
    Ok(())
}

fn cmd_qr(label: &str, issuer: &str, out: Option<PathBuf>) -> anyhow::Result<()> {
    let store = open_store()?;
    let entry = load_entry(&store, label)?;
    let uri = otp::provisioning_uri(&entry, label, issuer)?;

    let out = out.unwrap_or_else(|| PathBuf::from(format!("qr_{}.svg", label.replace('/', "_"))));
    qr::write_svg(&uri, &out)?;
    println!("QR code written to {}", out.display());
    Ok(())
}
