//! Decode command implementation.
//!
//! Reads a log file, skips damaged blocks, and prints the surviving records.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Deserialize;
use spool_core::reader::decode_blocks;
use spool_core::{Cipher, CipherKind, Compression, RecordCodec};
use tracing::{debug, warn};

use crate::cli::DecodeArgs;
use crate::error::CliError;
use crate::output::{DecodedFile, OutputFormat};

/// Cipher parameters read from a `--config` TOML file.
#[derive(Debug, Deserialize)]
struct KeyFile {
    cipher: CipherKind,
    #[serde(default)]
    key: String,
    #[serde(default)]
    nonce: String,
}

/// Command for decoding log files.
#[derive(Debug, Default)]
pub struct DecodeCommand;

impl DecodeCommand {
    /// Create a new decode command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the decode command.
    ///
    /// Records go to `out`, or to `--output` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher parameters are invalid, the file cannot
    /// be read, or no encrypted block can be decrypted with the given key.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &DecodeArgs,
    ) -> Result<(), CliError> {
        let cipher = resolve_cipher(args)?;
        let codec = RecordCodec::new(Compression::None, &cipher)?;

        let bytes = fs::read(&args.file)?;
        debug!(file = %args.file.display(), len = bytes.len(), cipher = %cipher.kind(), "decoding");
        let contents = decode_blocks(&bytes, &codec)?;
        if !contents.is_clean() {
            warn!(
                damaged = contents.damaged_blocks,
                truncated = contents.truncated_tail,
                "file is not clean"
            );
        }

        let decoded = DecodedFile {
            file: args.file.clone(),
            records: contents.records,
            damaged_blocks: contents.damaged_blocks,
            truncated_tail: contents.truncated_tail,
        };

        match &args.output {
            Some(path) => {
                let mut writer = BufWriter::new(File::create(path)?);
                format.write(&mut writer, &decoded)?;
                writer.flush()?;
            }
            None => format.write(out, &decoded)?,
        }
        Ok(())
    }
}

fn resolve_cipher(args: &DecodeArgs) -> Result<Cipher, CliError> {
    if let Some(path) = &args.config {
        return cipher_from_key_file(path);
    }
    let kind = CipherKind::from(args.cipher);
    if kind == CipherKind::None {
        return Ok(Cipher::None);
    }
    let key = args
        .key
        .as_deref()
        .ok_or_else(|| CliError::InvalidArgument(format!("--key is required for {kind}")))?;
    let nonce = args
        .nonce
        .as_deref()
        .ok_or_else(|| CliError::InvalidArgument(format!("--nonce is required for {kind}")))?;
    build_cipher(kind, key, nonce)
}

fn cipher_from_key_file(path: &Path) -> Result<Cipher, CliError> {
    let content = fs::read_to_string(path)?;
    let file: KeyFile = toml::from_str(&content)
        .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
    if file.cipher == CipherKind::None {
        return Ok(Cipher::None);
    }
    build_cipher(file.cipher, &file.key, &file.nonce)
}

fn build_cipher(kind: CipherKind, key: &str, nonce: &str) -> Result<Cipher, CliError> {
    let key = hex::decode(key.trim())
        .map_err(|e| CliError::InvalidArgument(format!("key is not valid hex: {e}")))?;
    let nonce = hex::decode(nonce.trim())
        .map_err(|e| CliError::InvalidArgument(format!("nonce is not valid hex: {e}")))?;
    Ok(Cipher::from_parts(kind, &key, &nonce)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{CipherArg, Format};
    use chrono::{TimeZone, Utc};
    use spool_core::{CompressLevel, LogLevel, LogRecord};
    use std::path::PathBuf;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f000102030405060708090a0b0c0d0e0f";
    const NONCE: &str = "a0a1a2a3a4a5a6a7a8a9aaab";

    fn args(file: PathBuf) -> DecodeArgs {
        DecodeArgs {
            file,
            cipher: CipherArg::None,
            key: None,
            nonce: None,
            config: None,
            output: None,
        }
    }

    fn write_file(path: &Path, cipher: &Cipher, contents: &[&str]) {
        let codec = RecordCodec::new(Compression::Zlib(CompressLevel::Fast), cipher).expect("codec");
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("time");
        let mut bytes = Vec::new();
        for content in contents {
            let record = LogRecord::new(LogLevel::Info, "test", *content, at);
            bytes.extend(codec.encode(&record).expect("encode"));
        }
        fs::write(path, bytes).expect("write");
    }

    fn aes256() -> Cipher {
        let key = hex::decode(KEY).expect("hex");
        let nonce = hex::decode(NONCE).expect("hex");
        Cipher::from_parts(CipherKind::Aes256Gcm, &key, &nonce).expect("cipher")
    }

    #[test]
    fn decode_plain_file_to_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app_2024_06_01.0.log");
        write_file(&path, &Cipher::None, &["one", "two"]);

        let mut out = Vec::new();
        DecodeCommand::new()
            .execute(&mut out, &OutputFormat::new(Format::Table), &args(path))
            .expect("decode");
        let text = String::from_utf8(out).expect("utf-8");
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("INFO test one"));
    }

    #[test]
    fn decode_encrypted_with_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sec_2024_06_01.0.log");
        write_file(&path, &aes256(), &["secret"]);

        let mut a = args(path);
        a.cipher = CipherArg::Aes256Gcm;
        a.key = Some(KEY.to_string());
        a.nonce = Some(NONCE.to_string());

        let mut out = Vec::new();
        DecodeCommand::new()
            .execute(&mut out, &OutputFormat::new(Format::Json), &a)
            .expect("decode");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["records"][0]["content"], "secret");
    }

    #[test]
    fn decode_encrypted_with_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sec_2024_06_01.0.log");
        write_file(&path, &aes256(), &["from key file"]);
        let key_file = dir.path().join("key.toml");
        fs::write(
            &key_file,
            format!("cipher = \"aes-256-gcm\"\nkey = \"{KEY}\"\nnonce = \"{NONCE}\"\n"),
        )
        .expect("write key file");

        let mut a = args(path);
        a.config = Some(key_file);
        let mut out = Vec::new();
        DecodeCommand::new()
            .execute(&mut out, &OutputFormat::default(), &a)
            .expect("decode");
        assert!(String::from_utf8_lossy(&out).contains("from key file"));
    }

    #[test]
    fn decode_without_key_is_rejected() {
        let mut a = args(PathBuf::from("unused.log"));
        a.cipher = CipherArg::Aes128Gcm;
        let result = DecodeCommand::new().execute(&mut Vec::new(), &OutputFormat::default(), &a);
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn decode_with_wrong_key_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sec_2024_06_01.0.log");
        write_file(&path, &aes256(), &["secret"]);

        let mut a = args(path);
        a.cipher = CipherArg::Aes256Gcm;
        a.key = Some("ff".repeat(32));
        a.nonce = Some(NONCE.to_string());
        let result = DecodeCommand::new().execute(&mut Vec::new(), &OutputFormat::default(), &a);
        assert!(matches!(result, Err(CliError::Spool(spool_core::SpoolError::Cipher(_)))));
    }

    #[test]
    fn decode_writes_output_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app_2024_06_01.0.log");
        write_file(&path, &Cipher::None, &["to disk"]);
        let output = dir.path().join("decoded.txt");

        let mut a = args(path);
        a.output = Some(output.clone());
        let mut out = Vec::new();
        DecodeCommand::new()
            .execute(&mut out, &OutputFormat::default(), &a)
            .expect("decode");
        assert!(out.is_empty());
        let written = fs::read_to_string(output).expect("read output");
        assert!(written.contains("to disk"));
    }

    #[test]
    fn bad_hex_is_rejected() {
        let result = build_cipher(CipherKind::Aes128Gcm, "zz", NONCE);
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }
}
