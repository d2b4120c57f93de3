// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! File-backed persistence for keypairs and aggregate records.
//!
//! Every item lives in its own pretty-printed JSON file named after its
//! storable type and identifier, so records can be inspected and handed to
//! other tools.

use crate::{
    bls::{AggregateRecord, KeypairFile, Signer},
    errors::{InternalError, Result},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/////////////////////////
// Record Storage API  //
/////////////////////////

/// Kinds of records kept in a [`RecordStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorableType {
    /// A participant's signing keypair.
    Keypair,
    /// A group's aggregate public key and signature.
    AggregateRecord,
}

impl StorableType {
    fn prefix(self) -> &'static str {
        match self {
            StorableType::Keypair => "keypair",
            StorableType::AggregateRecord => "aggregate",
        }
    }
}

/// A directory of JSON records.
#[derive(Clone, Debug)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open `dir`, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the aggregate record of `group`.
    #[instrument(skip(self, record), err(Debug))]
    pub fn save_aggregate(&self, group: u64, record: &AggregateRecord) -> Result<PathBuf> {
        self.store(StorableType::AggregateRecord, &group.to_string(), record)
    }

    /// Load the aggregate record of `group`.
    pub fn load_aggregate(&self, group: u64) -> Result<AggregateRecord> {
        self.retrieve(StorableType::AggregateRecord, &group.to_string())
    }

    /// Persist a keypair under `name`.
    pub fn save_keypair(&self, name: &str, signer: &Signer) -> Result<PathBuf> {
        self.store(StorableType::Keypair, name, &signer.to_keypair_file()?)
    }

    /// Load the keypair stored under `name`.
    pub fn load_keypair(&self, name: &str) -> Result<Signer> {
        let file: KeypairFile = self.retrieve(StorableType::Keypair, name)?;
        Signer::from_keypair_file(&file)
    }

    /// Whether a record exists.
    pub fn contains(&self, storable_type: StorableType, identifier: &str) -> bool {
        self.path_of(storable_type, identifier).is_file()
    }

    /// Remove a record.
    pub fn delete(&self, storable_type: StorableType, identifier: &str) -> Result<()> {
        fs::remove_file(self.path_of(storable_type, identifier)).map_err(not_found)
    }

    // Inner functions

    fn path_of(&self, storable_type: StorableType, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", storable_type.prefix(), identifier))
    }

    fn store<S: Serialize>(
        &self,
        storable_type: StorableType,
        identifier: &str,
        val: &S,
    ) -> Result<PathBuf> {
        let path = self.path_of(storable_type, identifier);
        let json = serde_json::to_vec_pretty(val).or(Err(InternalError::Serialization))?;
        write_file(&path, &json)?;
        debug!(path = %path.display(), "Stored record.");
        Ok(path)
    }

    fn retrieve<D: DeserializeOwned>(
        &self,
        storable_type: StorableType,
        identifier: &str,
    ) -> Result<D> {
        let bytes = fs::read(self.path_of(storable_type, identifier)).map_err(not_found)?;
        serde_json::from_slice(&bytes).map_err(|e| InternalError::Deserialization(e.to_string()))
    }
}

/// Write a standalone keypair file.
pub fn save_keypair_file(path: impl AsRef<Path>, signer: &Signer) -> Result<()> {
    let json =
        serde_json::to_vec_pretty(&signer.to_keypair_file()?).or(Err(InternalError::Serialization))?;
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    write_file(path.as_ref(), &json)
}

/// Read a standalone keypair file.
pub fn load_keypair_file(path: impl AsRef<Path>) -> Result<Signer> {
    let bytes = fs::read(path).map_err(not_found)?;
    let file: KeypairFile =
        serde_json::from_slice(&bytes).map_err(|e| InternalError::Deserialization(e.to_string()))?;
    Signer::from_keypair_file(&file)
}

/// Load the keypair at `path`, or draw a new one and store it there.
pub fn load_or_create_keypair(path: impl AsRef<Path>) -> Result<Signer> {
    match load_keypair_file(path.as_ref()) {
        Ok(signer) => Ok(signer),
        Err(InternalError::StorageItemNotFound) => {
            let signer = Signer::random(&mut rand::rngs::OsRng);
            save_keypair_file(path, &signer)?;
            Ok(signer)
        }
        Err(e) => Err(e),
    }
}

/// Readers never observe a partially written record.
fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn not_found(err: std::io::Error) -> InternalError {
    if err.kind() == ErrorKind::NotFound {
        InternalError::StorageItemNotFound
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::aggregate;
    use rand::rngs::OsRng;

    #[test]
    fn test_keypairs_persist() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = RecordStore::open(dir.path().join("nested"))?;
        let signer = Signer::random(&mut OsRng);

        assert!(!store.contains(StorableType::Keypair, "alice"));
        assert_eq!(
            store.load_keypair("alice"),
            Err(InternalError::StorageItemNotFound)
        );
        store.save_keypair("alice", &signer)?;
        assert!(store.contains(StorableType::Keypair, "alice"));
        assert_eq!(store.load_keypair("alice")?, signer);

        store.delete(StorableType::Keypair, "alice")?;
        assert_eq!(
            store.delete(StorableType::Keypair, "alice"),
            Err(InternalError::StorageItemNotFound)
        );
        Ok(())
    }

    #[test]
    fn test_aggregate_record_file_layout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = RecordStore::open(dir.path())?;
        let signers: Vec<_> = (0..2).map(|_| Signer::random(&mut OsRng)).collect();
        let pks: Vec<_> = signers.iter().map(|s| *s.public_key()).collect();
        let sigs = signers
            .iter()
            .map(|s| s.sign(b"root"))
            .collect::<Result<Vec<_>>>()?;
        let (public_key, signature) = aggregate(&pks, &sigs)?;
        let record = AggregateRecord {
            public_key,
            signature,
        };

        let path = store.save_aggregate(42, &record)?;
        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path)?).unwrap();
        assert!(raw.get("publicKey").is_some());
        assert!(raw.get("signature").is_some());
        assert_eq!(store.load_aggregate(42)?, record);
        assert_eq!(
            store.load_aggregate(43),
            Err(InternalError::StorageItemNotFound)
        );
        Ok(())
    }

    #[test]
    fn test_load_or_create_keypair() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("certs").join("client_keypair.json");
        let created = load_or_create_keypair(&path)?;
        assert!(path.is_file());
        assert_eq!(load_or_create_keypair(&path)?, created);

        fs::write(&path, b"{ not json")?;
        assert!(matches!(
            load_keypair_file(&path),
            Err(InternalError::Deserialization(_))
        ));
        Ok(())
    }
}
