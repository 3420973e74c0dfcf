//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Maildepot.
//
// Maildepot is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Maildepot is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Maildepot. If not, see <http://www.gnu.org/licenses/>.

//! Storage for large part bodies, addressed by opaque relative path.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

use crate::model::message::BlobRef;
use crate::support::{context::Context, error::Error};

pub trait BlobStore: Send + Sync {
    /// Starts writing a new blob at `blob`.
    ///
    /// Nothing is visible at `blob` until the writer is finished. Fails with
    /// `BlobExists` if the blob already exists, either now or when the
    /// writer is finished.
    fn create(
        &self,
        ctx: &Context,
        blob: &BlobRef,
    ) -> Result<Box<dyn BlobWriter>, Error>;

    /// Opens an existing blob, failing with `NxBlob` if there is none.
    fn open(
        &self,
        ctx: &Context,
        blob: &BlobRef,
    ) -> Result<Box<dyn Read + Send>, Error>;
}

pub trait BlobWriter: Write + Send {
    /// Makes the written data visible. Dropping the writer without calling
    /// this discards it.
    fn finish(self: Box<Self>) -> Result<(), Error>;
}

/// Blobs stored as files under a root directory.
///
/// Writes go to a temporary file under `.tmp` (a name no `BlobRef` can
/// produce) and are moved into place atomically on `finish()`.
pub struct FsBlobStore {
    root: PathBuf,
    tmp: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Result<Self, Error> {
        let tmp = root.join(".tmp");
        fs::create_dir_all(&tmp)?;
        Ok(Self { root, tmp })
    }

    fn path_of(&self, blob: &BlobRef) -> PathBuf {
        self.root.join(blob.as_str())
    }
}

impl BlobStore for FsBlobStore {
    fn create(
        &self,
        ctx: &Context,
        blob: &BlobRef,
    ) -> Result<Box<dyn BlobWriter>, Error> {
        ctx.check()?;
        let dst = self.path_of(blob);
        if dst.exists() {
            return Err(Error::BlobExists);
        }

        Ok(Box::new(FsBlobWriter {
            file: NamedTempFile::new_in(&self.tmp)?,
            dst,
        }))
    }

    fn open(
        &self,
        ctx: &Context,
        blob: &BlobRef,
    ) -> Result<Box<dyn Read + Send>, Error> {
        ctx.check()?;
        match fs::File::open(self.path_of(blob)) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Err(Error::NxBlob),
            Err(e) => Err(e.into()),
        }
    }
}

struct FsBlobWriter {
    file: NamedTempFile,
    dst: PathBuf,
}

impl Write for FsBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl BlobWriter for FsBlobWriter {
    fn finish(self: Box<Self>) -> Result<(), Error> {
        let FsBlobWriter { file, dst } = *self;
        file.as_file().sync_all()?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }

        match file.persist_noclobber(&dst) {
            Ok(_) => Ok(()),
            Err(e) if io::ErrorKind::AlreadyExists == e.error.kind() => {
                Err(Error::BlobExists)
            },
            Err(e) => Err(e.error.into()),
        }
    }
}

/// Blobs held in memory, for tests and the in-memory backend.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<BlobRef, Arc<[u8]>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn create(
        &self,
        ctx: &Context,
        blob: &BlobRef,
    ) -> Result<Box<dyn BlobWriter>, Error> {
        ctx.check()?;
        if self
            .blobs
            .lock()
            .map_err(|_| Error::Poisoned)?
            .contains_key(blob)
        {
            return Err(Error::BlobExists);
        }

        Ok(Box::new(MemoryBlobWriter {
            blobs: Arc::clone(&self.blobs),
            blob: blob.clone(),
            data: Vec::new(),
        }))
    }

    fn open(
        &self,
        ctx: &Context,
        blob: &BlobRef,
    ) -> Result<Box<dyn Read + Send>, Error> {
        ctx.check()?;
        let data = self
            .blobs
            .lock()
            .map_err(|_| Error::Poisoned)?
            .get(blob)
            .cloned()
            .ok_or(Error::NxBlob)?;
        Ok(Box::new(io::Cursor::new(data)))
    }
}

struct MemoryBlobWriter {
    blobs: Arc<Mutex<HashMap<BlobRef, Arc<[u8]>>>>,
    blob: BlobRef,
    data: Vec<u8>,
}

impl Write for MemoryBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobWriter for MemoryBlobWriter {
    fn finish(self: Box<Self>) -> Result<(), Error> {
        let MemoryBlobWriter { blobs, blob, data } = *self;
        let mut blobs = blobs.lock().map_err(|_| Error::Poisoned)?;
        if blobs.contains_key(&blob) {
            return Err(Error::BlobExists);
        }

        blobs.insert(blob, data.into());
        Ok(())
    }
}
