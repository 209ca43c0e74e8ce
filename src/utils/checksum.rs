use anyhow::{anyhow, bail, Context, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha256,
    Sha512,
}

impl Algorithm {
    fn hex_len(self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha512 => 128,
        }
    }
}

/// Expected digest of a disk image, written as `algorithm:hex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: Algorithm,
    pub value: String,
}

impl FromStr for Checksum {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, value) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid checksum '{}'. Expected 'algorithm:value'", s))?;

        let algorithm = match algorithm.to_lowercase().as_str() {
            "sha256" => Algorithm::Sha256,
            "sha512" => Algorithm::Sha512,
            other => bail!("Unsupported checksum algorithm: {}", other),
        };

        let value = value.trim().to_lowercase();
        if value.len() != algorithm.hex_len() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!(
                "Checksum value must be {} hex characters for {:?}",
                algorithm.hex_len(),
                algorithm
            );
        }

        Ok(Self { algorithm, value })
    }
}

impl Checksum {
    pub fn verify_file(&self, file_path: &Path) -> Result<()> {
        info!("Verifying checksum for: {}", file_path.display());
        debug!("Algorithm: {:?}, Expected: {}", self.algorithm, self.value);

        let calculated = calculate(file_path, self.algorithm)?;
        if calculated == self.value {
            info!("✓ Checksum verification passed");
            Ok(())
        } else {
            Err(anyhow!(
                "Checksum mismatch for {}\nExpected: {}\nCalculated: {}",
                file_path.display(),
                self.value,
                calculated
            ))
        }
    }
}

pub fn calculate(file_path: &Path, algorithm: Algorithm) -> Result<String> {
    let file = File::open(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
    let reader = BufReader::new(file);

    match algorithm {
        Algorithm::Sha256 => digest::<Sha256, _>(reader),
        Algorithm::Sha512 => digest::<Sha512, _>(reader),
    }
}

fn digest<D: Digest, R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0; 8192];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .context("Failed to read file data")?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect())
}
