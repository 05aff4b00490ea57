use std::io::{self, Read, Seek, SeekFrom, Write};

/// Minimal interface of a `FileSystemSyncAccessHandle`: positioned reads and writes plus size
/// management.
///
/// Public so platforms (and tests) can supply their own handle.
pub trait SyncAccessHandle {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize>;
    fn get_size(&mut self) -> io::Result<u64>;
    fn truncate(&mut self, size: u64) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

#[cfg(not(target_arch = "wasm32"))]
mod native_handle {
    use super::SyncAccessHandle;
    use std::fs::File;
    use std::io::{self, Read, Seek, SeekFrom, Write};

    impl SyncAccessHandle for File {
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            self.seek(SeekFrom::Start(offset))?;
            self.read(buf)
        }

        fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
            self.seek(SeekFrom::Start(offset))?;
            self.write(buf)
        }

        fn get_size(&mut self) -> io::Result<u64> {
            Ok(self.metadata()?.len())
        }

        fn truncate(&mut self, size: u64) -> io::Result<()> {
            self.set_len(size)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.sync_data()
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

/// `std::io::{Read, Write, Seek}` cursor over a [`SyncAccessHandle`].
///
/// The handle is closed (after a final flush) by [`SyncFile::close`] or on drop, which releases
/// the browser's exclusive lock on the file.
#[derive(Debug)]
pub struct SyncFile<H: SyncAccessHandle> {
    handle: Option<H>,
    pos: u64,
}

impl<H: SyncAccessHandle> SyncFile<H> {
    pub fn from_handle(handle: H) -> Self {
        Self {
            handle: Some(handle),
            pos: 0,
        }
    }

    fn handle_mut(&mut self) -> io::Result<&mut H> {
        self.handle
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "file is closed"))
    }

    pub fn len(&mut self) -> io::Result<u64> {
        self.handle_mut()?.get_size()
    }

    pub fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read the whole file as UTF-8, sized by an explicit size query.
    pub fn read_text(&mut self) -> io::Result<String> {
        let size: usize = self
            .len()?
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file too large"))?;
        let mut buf = vec![0u8; size];
        self.seek(SeekFrom::Start(0))?;
        self.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Replace the file's contents with `data` and flush.
    pub fn replace_contents(&mut self, data: &[u8]) -> io::Result<()> {
        self.handle_mut()?.truncate(0)?;
        self.pos = 0;
        self.write_all(data)?;
        self.handle_mut()?.flush()
    }

    pub fn close(&mut self) -> io::Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        let flush_res = handle.flush();
        let close_res = handle.close();
        flush_res.and(close_res)
    }

    pub fn into_inner(mut self) -> Option<H> {
        self.handle.take()
    }
}

impl<H: SyncAccessHandle> Drop for SyncFile<H> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            let _ = handle.flush();
            let _ = handle.close();
        }
    }
}

impl<H: SyncAccessHandle> Read for SyncFile<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.pos;
        let read = self.handle_mut()?.read_at(pos, buf)?;
        self.pos = self.pos.checked_add(read as u64).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "stream position overflow")
        })?;
        Ok(read)
    }
}

impl<H: SyncAccessHandle> Write for SyncFile<H> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pos = self.pos;
        let wrote = self.handle_mut()?.write_at(pos, buf)?;
        self.pos = self.pos.checked_add(wrote as u64).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "stream position overflow")
        })?;
        Ok(wrote)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle_mut()?.flush()
    }
}

impl<H: SyncAccessHandle> Seek for SyncFile<H> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.handle_mut()?;
                self.pos = offset;
                return Ok(offset);
            }
            SeekFrom::Current(delta) => (i128::from(self.pos), delta),
            SeekFrom::End(delta) => (i128::from(self.handle_mut()?.get_size()?), delta),
        };

        let next = base + i128::from(delta);
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            ));
        }
        self.pos = u64::try_from(next)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek position overflow"))?;
        Ok(self.pos)
    }
}
