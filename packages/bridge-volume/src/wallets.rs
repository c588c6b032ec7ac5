//! Wallet records
//!
//! A record pairs an EVM key, a hub key and a custodial deposit address.
//! Records come either from one `evm_key,hub_key,deposit_address` file or
//! from three files paired by physical line number. A completed record is
//! blanked in place so line numbers stay stable across restarts.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::BotError;
use crate::redact::Redacted;

/// Where wallet records are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletSource {
    /// One `evm_key,hub_key,deposit_address` record per line
    Combined(PathBuf),
    /// Three line-aligned files
    Split {
        evm_keys: PathBuf,
        hub_keys: PathBuf,
        deposit_addresses: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRecord {
    pub evm_key: Redacted<String>,
    pub hub_key: Redacted<String>,
    pub deposit_address: String,
    /// Zero-based physical line in the backing file(s)
    pub line: usize,
}

pub struct WalletStore {
    source: WalletSource,
}

fn is_skipped(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

fn read_lines(path: &Path) -> Result<Vec<String>, BotError> {
    let content = fs::read_to_string(path).map_err(|e| {
        BotError::Configuration(format!("failed to read {}: {}", path.display(), e))
    })?;
    Ok(content.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect())
}

fn parse_combined(line: &str, line_no: usize) -> Result<(String, String, String), BotError> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [evm, hub, deposit] if !evm.is_empty() && !hub.is_empty() && !deposit.is_empty() => {
            Ok((evm.to_string(), hub.to_string(), deposit.to_string()))
        }
        _ => Err(BotError::Configuration(format!(
            "wallet record on line {} must be 'evm_key,hub_key,deposit_address'",
            line_no + 1
        ))),
    }
}

impl WalletStore {
    pub fn new(source: WalletSource) -> Self {
        Self { source }
    }

    /// Read every pending record, in file order.
    pub fn load(&self) -> Result<Vec<WalletRecord>, BotError> {
        let records = match &self.source {
            WalletSource::Combined(path) => Self::load_combined(path)?,
            WalletSource::Split {
                evm_keys,
                hub_keys,
                deposit_addresses,
            } => Self::load_split(evm_keys, hub_keys, deposit_addresses)?,
        };
        info!(count = records.len(), source = ?self.source, "Loaded wallet records");
        Ok(records)
    }

    fn load_combined(path: &Path) -> Result<Vec<WalletRecord>, BotError> {
        read_lines(path)?
            .iter()
            .enumerate()
            .filter(|(_, line)| !is_skipped(line))
            .map(|(idx, line)| {
                let (evm, hub, deposit) = parse_combined(line, idx)?;
                Ok(WalletRecord {
                    evm_key: evm.into(),
                    hub_key: hub.into(),
                    deposit_address: deposit,
                    line: idx,
                })
            })
            .collect()
    }

    fn load_split(evm: &Path, hub: &Path, deposit: &Path) -> Result<Vec<WalletRecord>, BotError> {
        let evm_lines = read_lines(evm)?;
        let hub_lines = read_lines(hub)?;
        let deposit_lines = read_lines(deposit)?;
        let total = evm_lines.len().max(hub_lines.len()).max(deposit_lines.len());

        let mut records = Vec::new();
        for idx in 0..total {
            let fields = [
                evm_lines.get(idx).map(String::as_str).unwrap_or(""),
                hub_lines.get(idx).map(String::as_str).unwrap_or(""),
                deposit_lines.get(idx).map(String::as_str).unwrap_or(""),
            ];
            let skipped = fields.iter().filter(|f| is_skipped(f)).count();
            match skipped {
                3 => continue,
                0 => records.push(WalletRecord {
                    evm_key: fields[0].trim().to_string().into(),
                    hub_key: fields[1].trim().to_string().into(),
                    deposit_address: fields[2].trim().to_string(),
                    line: idx,
                }),
                _ => {
                    return Err(BotError::Configuration(format!(
                        "wallet files are misaligned at line {}: a line must be filled in all three files or blank in all three",
                        idx + 1
                    )))
                }
            }
        }
        Ok(records)
    }

    /// Blank the record's line in every backing file.
    pub fn mark_completed(&self, record: &WalletRecord) -> Result<(), BotError> {
        match &self.source {
            WalletSource::Combined(path) => blank_line(path, record.line, |line| {
                parse_combined(line, record.line)
                    .map(|(_, _, deposit)| deposit == record.deposit_address)
                    .unwrap_or(false)
            }),
            WalletSource::Split {
                evm_keys,
                hub_keys,
                deposit_addresses,
            } => {
                blank_line(evm_keys, record.line, |l| l.trim() == record.evm_key.expose())?;
                blank_line(hub_keys, record.line, |l| l.trim() == record.hub_key.expose())?;
                blank_line(deposit_addresses, record.line, |l| {
                    l.trim() == record.deposit_address
                })
            }
        }?;
        debug!(line = record.line + 1, deposit = %record.deposit_address, "Wallet record marked completed");
        Ok(())
    }
}

/// Empty line `idx` of `path` if `expected` accepts its current content.
fn blank_line<F>(path: &Path, idx: usize, expected: F) -> Result<(), BotError>
where
    F: Fn(&str) -> bool,
{
    let mut lines = read_lines(path)?;
    match lines.get_mut(idx) {
        Some(line) if expected(line) => line.clear(),
        _ => {
            return Err(BotError::Configuration(format!(
                "{} changed on disk, line {} no longer holds the completed wallet",
                path.display(),
                idx + 1
            )))
        }
    }
    fs::write(path, lines.join("\n")).map_err(|e| {
        BotError::Configuration(format!("failed to write {}: {}", path.display(), e))
    })
}
