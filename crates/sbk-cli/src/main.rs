//! sbk: encrypt and decrypt streams in the `openssl enc -salt` format
//!
//! Commands:
//!   encrypt       - encipher stdin (or -i FILE) to stdout (or -o FILE)
//!   decrypt       - decipher stdin (or -i FILE) to stdout (or -o FILE)
//!   ciphers       - list supported cipher and digest names
//!   config show   - display current configuration
//!
//! Logs go to stderr; stdout carries only stream data.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use sbk_core::SbkConfig;
use sbk_crypto::{backend, cipher_copy, CipherBlock, CipherError, CipherMode, CopyStats};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sbk",
    version,
    about = "Salted block cipher streams",
    long_about = "sbk: encrypt and decrypt streams readable by `openssl enc -d -salt`"
)]
struct Cli {
    /// Path to sbk configuration file
    #[arg(
        long,
        short = 'c',
        env = "SBK_CONFIG",
        default_value = "/etc/sbk/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "SBK_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides [log] format
    #[arg(long, env = "SBK_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a stream into the salted openssl format
    Encrypt(StreamArgs),

    /// Decrypt a salted openssl stream
    Decrypt(StreamArgs),

    /// List supported cipher and digest names
    Ciphers,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Cipher name, e.g. aes-256-cbc (overrides cipher.cipher_type)
    #[arg(long)]
    cipher: Option<String>,

    /// Key derivation digest, e.g. sha256 (overrides cipher.digest)
    #[arg(long)]
    digest: Option<String>,

    /// Environment variable holding the passphrase
    #[arg(long, default_value = "SBK_CIPHER_PASS")]
    pass_env: String,

    /// Input file (default: stdin)
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Show a progress bar on stderr
    #[arg(long)]
    progress: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SbkConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = match cli.log_format {
        Some(format) => format,
        None => <LogFormat as ValueEnum>::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("invalid log.format '{}': {e}", config.log.format))?,
    };
    init_logging(level, &format);

    if !cli.config.exists() {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Encrypt(args) => cmd_stream(&config, CipherMode::Encipher, &args),
        Commands::Decrypt(args) => cmd_stream(&config, CipherMode::Decipher, &args),
        Commands::Ciphers => cmd_ciphers(),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── Passphrase ────────────────────────────────────────────────────────────────

/// Resolve the passphrase: environment variable > config pass_file > prompt
fn resolve_passphrase(config: &SbkConfig, pass_env: &str, confirm: bool) -> Result<SecretString> {
    let pass = match std::env::var(pass_env) {
        Ok(pass) => {
            debug!(var = pass_env, "passphrase from environment");
            SecretString::from(pass)
        }
        Err(_) => match config
            .read_pass_file()
            .context("reading cipher.pass_file")?
        {
            Some(pass) => {
                debug!("passphrase from pass_file");
                SecretString::from(pass)
            }
            None => prompt_passphrase(confirm)?,
        },
    };

    if pass.expose_secret().is_empty() {
        anyhow::bail!("passphrase must not be empty");
    }
    Ok(pass)
}

fn prompt_passphrase(confirm: bool) -> Result<SecretString> {
    let pass = SecretString::from(
        rpassword::prompt_password("passphrase: ").context("reading passphrase")?,
    );
    if confirm {
        let again = SecretString::from(
            rpassword::prompt_password("confirm passphrase: ").context("reading passphrase")?,
        );
        if again.expose_secret() != pass.expose_secret() {
            anyhow::bail!("passphrases do not match");
        }
    }
    Ok(pass)
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress(total: Option<u64>, prefix: &str) -> Result<ProgressBar> {
    let pb = match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template(
                    "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec}",
                )
                .context("progress template")?
                .progress_chars("=>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{prefix:.bold} {spinner} {bytes} {bytes_per_sec}")
                    .context("progress template")?,
            );
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        }
    };
    pb.set_prefix(prefix.to_string());
    Ok(pb)
}

// ── `sbk encrypt` / `sbk decrypt` ─────────────────────────────────────────────

fn cmd_stream(config: &SbkConfig, mode: CipherMode, args: &StreamArgs) -> Result<()> {
    if let (Some(input), Some(output)) = (&args.input, &args.output) {
        if input == output {
            anyhow::bail!("input and output are the same file: {}", input.display());
        }
    }

    let cipher = args.cipher.as_deref().unwrap_or(&config.cipher.cipher_type);
    let digest = args.digest.as_deref().or(config.cipher.digest.as_deref());

    // Name errors surface before any passphrase prompt
    check_names(cipher, digest)?;

    let pass = resolve_passphrase(config, &args.pass_env, mode == CipherMode::Encipher)?;
    let codec = CipherBlock::new(mode, cipher, pass.expose_secret().as_bytes(), digest)?;
    drop(pass);

    let (cipher, digest) = (codec.cipher_name(), codec.digest_name());
    let label = match mode {
        CipherMode::Encipher => "encrypt",
        CipherMode::Decipher => "decrypt",
    };

    let stats = run_stream(codec, args, config.io.buffer_size, label)?;

    info!(
        cipher,
        digest,
        bytes_in = stats.bytes_in,
        bytes_out = stats.bytes_out,
        "{label} complete"
    );
    Ok(())
}

fn check_names(cipher: &str, digest: Option<&str>) -> Result<()> {
    if backend().cipher(cipher).is_none() {
        return Err(CipherError::UnknownCipher(cipher.to_string()).into());
    }
    if let Some(digest) = digest {
        if backend().digest(digest).is_none() {
            return Err(CipherError::UnknownDigest(digest.to_string()).into());
        }
    }
    Ok(())
}

fn run_stream(
    codec: CipherBlock,
    args: &StreamArgs,
    buffer_size: usize,
    label: &str,
) -> Result<CopyStats> {
    let (reader, total): (Box<dyn Read>, Option<u64>) = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening input: {}", path.display()))?;
            let total = file.metadata().ok().map(|m| m.len());
            (Box::new(BufReader::new(file)), total)
        }
        None => (Box::new(io::stdin().lock()), None),
    };

    let progress = if args.progress {
        Some(make_progress(total, label)?)
    } else {
        None
    };
    let mut reader: Box<dyn Read> = match &progress {
        Some(pb) => Box::new(pb.wrap_read(reader)),
        None => reader,
    };

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating output: {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let result = cipher_copy(&mut reader, &mut writer, codec, buffer_size);
    drop(writer);

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    if result.is_err() {
        if let Some(path) = &args.output {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "could not remove partial output");
            }
        }
    }

    result.with_context(|| format!("{label} failed"))
}

// ── `sbk ciphers` ─────────────────────────────────────────────────────────────

fn cmd_ciphers() -> Result<()> {
    println!("ciphers:");
    for name in backend().cipher_names() {
        println!("  {name}");
    }
    println!("digests:");
    for name in backend().digest_names() {
        println!("  {name}");
    }
    Ok(())
}

// ── `sbk config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &SbkConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
