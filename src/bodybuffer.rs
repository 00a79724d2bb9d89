//! Spillable request/response body buffers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Limits and spill location for a [`BodyBuffer`].
#[derive(Debug, Clone)]
pub struct BodyBufferOptions {
    /// Bytes kept in memory before spilling to disk.
    pub memory_limit: usize,
    /// Hard cap on total buffered bytes.
    pub limit: u64,
    /// Directory for spill files. `None` disables filesystem use, making
    /// the memory limit a hard limit.
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug)]
struct BufferInner {
    memory: Vec<u8>,
    file: Option<NamedTempFile>,
    length: u64,
    generation: u64,
}

/// An append-only body buffer that spills from memory to a temporary file
/// once the in-memory threshold is crossed.
///
/// Readers are independent and always start at offset zero. Resetting the
/// buffer releases the spill file and makes every outstanding reader return
/// end-of-stream.
#[derive(Debug)]
pub struct BodyBuffer {
    options: BodyBufferOptions,
    inner: Arc<Mutex<BufferInner>>,
}

fn lock(inner: &Arc<Mutex<BufferInner>>) -> MutexGuard<'_, BufferInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BodyBuffer {
    /// Create an empty buffer.
    pub fn new(options: BodyBufferOptions) -> Self {
        Self {
            options,
            inner: Arc::new(Mutex::new(BufferInner {
                memory: Vec::new(),
                file: None,
                length: 0,
                generation: 0,
            })),
        }
    }

    /// Append bytes.
    ///
    /// Fails without writing when the result would exceed the hard limit,
    /// overflow the length counter, or cross the memory threshold with no
    /// spill directory configured.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = lock(&self.inner);
        let new_length = inner
            .length
            .checked_add(data.len() as u64)
            .ok_or(Error::BodySizeOverflow)?;
        if new_length > self.options.limit {
            return Err(Error::BodyLimitReached {
                limit: self.options.limit,
            });
        }

        if inner.file.is_some() {
            if let Some(file) = inner.file.as_mut() {
                file.write_all(data)?;
            }
        } else if inner.memory.len() + data.len() > self.options.memory_limit {
            let Some(dir) = self.options.temp_dir.as_ref() else {
                return Err(Error::BodyMemoryLimitReached {
                    limit: self.options.memory_limit as u64,
                });
            };
            let mut file = tempfile::Builder::new().prefix("body").tempfile_in(dir)?;
            file.write_all(&inner.memory)?;
            file.write_all(data)?;
            inner.memory.clear();
            inner.file = Some(file);
        } else {
            inner.memory.extend_from_slice(data);
        }

        inner.length = new_length;
        Ok(data.len())
    }

    /// Total bytes buffered.
    pub fn size(&self) -> u64 {
        lock(&self.inner).length
    }

    /// Whether the buffer has spilled to disk.
    pub fn is_spilled(&self) -> bool {
        lock(&self.inner).file.is_some()
    }

    /// A new independent reader positioned at offset zero.
    pub fn reader(&self) -> BodyReader {
        let generation = lock(&self.inner).generation;
        BodyReader {
            inner: Arc::clone(&self.inner),
            generation,
            file: None,
            pos: 0,
        }
    }

    /// Read the whole buffer into a lossily-decoded string.
    pub fn read_to_string(&self) -> Result<String> {
        let mut bytes = Vec::new();
        self.reader().read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Discard all buffered data and release the spill file.
    ///
    /// Every resource is released as far as possible; failures are
    /// collected and returned together. Outstanding readers see
    /// end-of-stream afterwards.
    pub fn reset(&mut self) -> Result<()> {
        let mut inner = lock(&self.inner);
        let mut messages = Vec::new();
        inner.memory.clear();
        if let Some(file) = inner.file.take() {
            if let Err(err) = file.close() {
                messages.push(format!("spill file removal failed: {err}"));
            }
        }
        inner.length = 0;
        inner.generation += 1;
        drop(inner);
        if messages.is_empty() {
            Ok(())
        } else {
            Err(Error::BufferRelease { messages })
        }
    }
}

/// Sequential reader over a [`BodyBuffer`].
#[derive(Debug)]
pub struct BodyReader {
    inner: Arc<Mutex<BufferInner>>,
    generation: u64,
    file: Option<File>,
    pos: u64,
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let inner = lock(&self.inner);
        if inner.generation != self.generation {
            return Ok(0);
        }
        if let Some(spill) = inner.file.as_ref() {
            if self.file.is_none() {
                let mut file = File::open(spill.path())?;
                file.seek(SeekFrom::Start(self.pos))?;
                self.file = Some(file);
            }
            drop(inner);
            let Some(file) = self.file.as_mut() else {
                return Ok(0);
            };
            let n = file.read(buf)?;
            self.pos += n as u64;
            Ok(n)
        } else {
            let start = self.pos as usize;
            if start >= inner.memory.len() {
                return Ok(0);
            }
            let n = (inner.memory.len() - start).min(buf.len());
            buf[..n].copy_from_slice(&inner.memory[start..start + n]);
            self.pos += n as u64;
            Ok(n)
        }
    }
}
