//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use spool_core::CipherKind;

/// Spool - inspect and maintain on-disk log directories.
#[derive(Parser, Debug, Clone)]
#[command(name = "spool")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable output.
    #[default]
    #[value(alias = "text")]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Decode a log file into readable records.
    Decode(DecodeArgs),

    /// List a logger's files for a date, ordered by sequence.
    Files(FilesArgs),

    /// Delete a logger's files older than a retention window.
    Trim(TrimArgs),
}

/// Cipher choices for decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CipherArg {
    /// Unencrypted file.
    #[default]
    None,
    /// AES-128-GCM, 16-byte key.
    Aes128Gcm,
    /// AES-256-GCM, 32-byte key.
    Aes256Gcm,
    /// ChaCha20-Poly1305, 32-byte key.
    #[value(name = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl From<CipherArg> for CipherKind {
    fn from(arg: CipherArg) -> Self {
        match arg {
            CipherArg::None => Self::None,
            CipherArg::Aes128Gcm => Self::Aes128Gcm,
            CipherArg::Aes256Gcm => Self::Aes256Gcm,
            CipherArg::ChaCha20Poly1305 => Self::ChaCha20Poly1305,
        }
    }
}

/// Arguments for `decode`.
#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Log file to decode.
    pub file: PathBuf,

    /// Cipher the file was written with.
    #[arg(long, value_enum, default_value_t = CipherArg::None)]
    pub cipher: CipherArg,

    /// Cipher key as hex.
    #[arg(long, env = "SPOOL_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Cipher nonce as hex (12 bytes).
    #[arg(long, env = "SPOOL_NONCE")]
    pub nonce: Option<String>,

    /// TOML file with `cipher`, `key` and `nonce`, instead of the flags.
    #[arg(long, conflicts_with_all = ["cipher", "key", "nonce"])]
    pub config: Option<PathBuf>,

    /// Write decoded records here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `files`.
#[derive(Args, Debug, Clone)]
pub struct FilesArgs {
    /// Logger directory.
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Logger name.
    #[arg(short, long)]
    pub name: String,

    /// Date as YYYY_MM_DD or YYYY-MM-DD.
    #[arg(long)]
    pub date: String,
}

/// Arguments for `trim`.
#[derive(Args, Debug, Clone)]
pub struct TrimArgs {
    /// Logger directory.
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Logger name.
    #[arg(short, long)]
    pub name: String,

    /// Files older than this many days are deleted.
    #[arg(short, long)]
    pub keep_days: u32,

    /// Only report what would be deleted.
    #[arg(long)]
    pub dry_run: bool,

    /// Reference date for the window, defaults to the local date.
    #[arg(long)]
    pub today: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_decode_with_cipher() {
        let cli = Cli::try_parse_from([
            "spool",
            "decode",
            "app_2024_06_01.0.log",
            "--cipher",
            "aes-256-gcm",
            "--key",
            "00",
            "--nonce",
            "11",
        ])
        .expect("parse");
        let Commands::Decode(args) = cli.command else {
            unreachable!("decode subcommand");
        };
        assert_eq!(CipherKind::from(args.cipher), CipherKind::Aes256Gcm);
        assert_eq!(args.key.as_deref(), Some("00"));
    }

    #[test]
    fn parse_trim_with_json() {
        let cli = Cli::try_parse_from([
            "spool", "trim", "--dir", "/tmp/logs", "--name", "app", "--keep-days", "3",
            "--dry-run", "--format", "json",
        ])
        .expect("parse");
        assert_eq!(cli.format, Format::Json);
        assert!(matches!(cli.command, Commands::Trim(TrimArgs { keep_days: 3, dry_run: true, .. })));
    }

    #[test]
    fn config_conflicts_with_flags() {
        let result = Cli::try_parse_from([
            "spool", "decode", "f.log", "--config", "k.toml", "--cipher", "aes-128-gcm",
        ]);
        assert!(result.is_err());
    }
}
