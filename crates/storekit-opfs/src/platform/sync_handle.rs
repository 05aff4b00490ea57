use std::io;

use wasm_bindgen::JsValue;
use web_sys::{FileSystemReadWriteOptions, FileSystemSyncAccessHandle};

use super::backend_error_from_js;
use crate::sync_file::SyncAccessHandle;

const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991; // 2^53 - 1

fn offset_to_f64(value: u64) -> io::Result<f64> {
    if value > MAX_SAFE_INTEGER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("offset {value} exceeds JS MAX_SAFE_INTEGER; sync access handles use f64 offsets"),
        ));
    }
    Ok(value as f64)
}

fn f64_to_u64(value: f64) -> io::Result<u64> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > MAX_SAFE_INTEGER as f64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid OPFS numeric value {value}"),
        ));
    }
    Ok(value as u64)
}

fn js_error_to_io(err: JsValue) -> io::Error {
    let err = backend_error_from_js(err);
    let kind = if err.is_quota_exceeded() {
        io::ErrorKind::StorageFull
    } else if err.is_not_found() {
        io::ErrorKind::NotFound
    } else {
        match err.name.as_str() {
            "NoModificationAllowedError" => io::ErrorKind::ResourceBusy,
            "InvalidStateError" => io::ErrorKind::BrokenPipe,
            "NotAllowedError" => io::ErrorKind::PermissionDenied,
            _ => io::ErrorKind::Other,
        }
    };
    io::Error::new(kind, err)
}

/// `FileSystemSyncAccessHandle` with a reusable `{ at }` options object.
pub struct BrowserSyncHandle {
    handle: FileSystemSyncAccessHandle,
    options: FileSystemReadWriteOptions,
}

impl std::fmt::Debug for BrowserSyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSyncHandle").finish_non_exhaustive()
    }
}

impl BrowserSyncHandle {
    pub fn new(handle: FileSystemSyncAccessHandle) -> Self {
        Self {
            handle,
            options: FileSystemReadWriteOptions::new(),
        }
    }
}

impl SyncAccessHandle for BrowserSyncHandle {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.options.set_at(offset_to_f64(offset)?);
        let read = self
            .handle
            .read_with_u8_array_and_options(buf, &self.options)
            .map_err(js_error_to_io)?;
        Ok(f64_to_u64(read)? as usize)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
        offset_to_f64(end)?;
        self.options.set_at(offset as f64);
        let wrote = self
            .handle
            .write_with_u8_array_and_options(buf, &self.options)
            .map_err(js_error_to_io)?;
        Ok(f64_to_u64(wrote)? as usize)
    }

    fn get_size(&mut self) -> io::Result<u64> {
        f64_to_u64(self.handle.get_size().map_err(js_error_to_io)?)
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.handle
            .truncate_with_f64(offset_to_f64(size)?)
            .map_err(js_error_to_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle.flush().map_err(js_error_to_io)
    }

    fn close(&mut self) -> io::Result<()> {
        self.handle.close();
        Ok(())
    }
}
