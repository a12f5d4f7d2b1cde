//! Win32 implementation of the device traits.

use std::ffi::c_void;
use std::mem::size_of;

use log::warn;
use windows::{
    core::*, Win32::Foundation::*, Win32::Security::*, Win32::Storage::FileSystem::*,
    Win32::System::Threading::*, Win32::System::IO::*,
};

use crate::device::{Access, DeviceOpener};
use crate::error::Error as TopologyError;
use crate::ioctl::DeviceIo;

/// Win32 status code behind an error, unwrapping HRESULT_FROM_WIN32.
fn win32_code(err: &Error) -> u32 {
    let hr = err.code().0 as u32;
    if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    }
}

/// An open device handle, closed on drop.
#[derive(Debug)]
pub struct Win32Device {
    handle: HANDLE,
    path: String,
}

impl Drop for Win32Device {
    fn drop(&mut self) {
        if let Err(err) = unsafe { CloseHandle(self.handle) } {
            warn!("Failed to close handle for {}: {err:?}", self.path);
        }
    }
}

impl DeviceIo for Win32Device {
    fn control(
        &self,
        control_code: u32,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> std::result::Result<usize, u32> {
        let mut bytes_returned = 0u32;
        let result = unsafe {
            DeviceIoControl(
                self.handle,
                control_code,
                input.map(|i| i.as_ptr() as *const c_void),
                input.map_or(0, |i| i.len() as u32),
                Some(output.as_mut_ptr() as *mut c_void),
                output.len() as u32,
                Some(&mut bytes_returned),
                None,
            )
        };
        match result {
            Ok(()) => Ok(bytes_returned as usize),
            Err(err) => Err(win32_code(&err)),
        }
    }
}

/// Opens devices with `CreateFileW`.
///
/// Keeps the default `bus_reported_description`, so adapters resolved through
/// it carry an empty description.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Opener;

impl DeviceOpener for Win32Opener {
    type Device = Win32Device;

    fn open(&self, local_device_path: &str, access: Access) -> crate::Result<Win32Device> {
        let wpath: Vec<u16> = local_device_path.encode_utf16().chain(Some(0)).collect();
        let desired_access = match access {
            Access::Read => FILE_GENERIC_READ.0,
            Access::Any => 0,
        };

        let handle = unsafe {
            CreateFileW(
                PCWSTR(wpath.as_ptr()),
                desired_access,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                None,
            )
        }
        .map_err(|err| TopologyError::Os {
            operation: "CreateFileW",
            code: win32_code(&err),
            path: local_device_path.to_owned(),
        })?;

        Ok(Win32Device {
            handle,
            path: local_device_path.to_owned(),
        })
    }

    fn is_elevated(&self) -> bool {
        is_elevated()
    }
}

/// Whether the current process token is elevated.
pub fn is_elevated() -> bool {
    unsafe {
        let mut token = HANDLE::default();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
            return false;
        }

        let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
        let mut return_length = 0u32;
        let result = GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut c_void),
            size_of::<TOKEN_ELEVATION>() as u32,
            &mut return_length,
        );

        if let Err(err) = CloseHandle(token) {
            warn!("Failed to close process token: {err:?}");
        }

        result.is_ok() && elevation.TokenIsElevated != 0
    }
}
