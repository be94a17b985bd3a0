//! The narrow OS capability surface the materializer relies on.
//!
//! Windows container layers carry identity the host has to restore natively:
//! hard links, directory junctions, the file attribute bitmask, creation
//! time, and binary security descriptors. Each capability is a single free
//! function here; on platforms without an equivalent the call reports
//! `ErrorKind::Unsupported`, which the advisory passes record as warnings
//! rather than failures.

use std::io;
use std::path::Path;

use filetime::FileTime;

#[cfg(windows)]
use std::os::windows::ffi::OsStrExt;

/// Difference between the Unix epoch (1970-01-01) and the Windows epoch
/// (1601-01-01) in 100-nanosecond intervals.
#[cfg(windows)]
const UNIX_TO_WINDOWS_EPOCH_DIFF: i64 = 116_444_736_000_000_000;

fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{what} is not supported on this platform"),
    )
}

#[cfg(windows)]
fn to_wide(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(Some(0)).collect()
}

#[cfg(windows)]
fn win_to_io(error: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(error.code().0 & 0xffff)
}

/// Create a hard link at `link` pointing to the existing `target`.
pub fn create_hard_link(link: &Path, target: &Path) -> io::Result<()> {
    std::fs::hard_link(target, link)
}

/// Create a directory-level link at `link` pointing to `target`.
///
/// On Windows this is a directory reparse link (the junction analog used
/// for directory-level hard links in layer archives); on Unix a symlink
/// serves the same role.
pub fn create_directory_junction(link: &Path, target: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (link, target);
        Err(unsupported("directory junction"))
    }
}

/// Restore the platform file attribute bitmask.
pub fn set_file_attributes(path: &Path, attributes: u32) -> io::Result<()> {
    #[cfg(windows)]
    {
        use windows::core::PCWSTR;
        use windows::Win32::Storage::FileSystem::{
            SetFileAttributesW, FILE_FLAGS_AND_ATTRIBUTES,
        };

        let wide = to_wide(path);
        unsafe { SetFileAttributesW(PCWSTR(wide.as_ptr()), FILE_FLAGS_AND_ATTRIBUTES(attributes)) }
            .map_err(win_to_io)
    }
    #[cfg(not(windows))]
    {
        let _ = (path, attributes);
        Err(unsupported("file attribute bitmask"))
    }
}

/// Restore the creation time of a file or directory.
pub fn set_creation_time(path: &Path, time: FileTime) -> io::Result<()> {
    #[cfg(windows)]
    {
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::{CloseHandle, FILETIME, HANDLE};
        use windows::Win32::Storage::FileSystem::{
            CreateFileW, SetFileTime, FILE_FLAG_BACKUP_SEMANTICS, FILE_SHARE_DELETE,
            FILE_SHARE_READ, FILE_SHARE_WRITE, FILE_WRITE_ATTRIBUTES, OPEN_EXISTING,
        };

        let intervals = time.unix_seconds() * 10_000_000
            + i64::from(time.nanoseconds() / 100)
            + UNIX_TO_WINDOWS_EPOCH_DIFF;
        let filetime = FILETIME {
            dwLowDateTime: intervals as u32,
            dwHighDateTime: (intervals >> 32) as u32,
        };

        let wide = to_wide(path);
        unsafe {
            // FILE_FLAG_BACKUP_SEMANTICS is required to open directories.
            let handle = CreateFileW(
                PCWSTR(wide.as_ptr()),
                FILE_WRITE_ATTRIBUTES.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                None,
                OPEN_EXISTING,
                FILE_FLAG_BACKUP_SEMANTICS,
                HANDLE::default(),
            )
            .map_err(win_to_io)?;

            let result =
                SetFileTime(handle, Some(&filetime as *const _), None, None).map_err(win_to_io);
            let _ = CloseHandle(handle);
            result
        }
    }
    #[cfg(not(windows))]
    {
        let _ = (path, time);
        Err(unsupported("creation time"))
    }
}

/// Apply a binary security descriptor (owner, group, and DACL sections) to
/// a file or directory.
pub fn set_security_descriptor(path: &Path, is_directory: bool, descriptor: &[u8]) -> io::Result<()> {
    let _ = is_directory;
    #[cfg(windows)]
    {
        use windows::core::PCWSTR;
        use windows::Win32::Security::{
            SetFileSecurityW, DACL_SECURITY_INFORMATION, GROUP_SECURITY_INFORMATION,
            OWNER_SECURITY_INFORMATION, PSECURITY_DESCRIPTOR,
        };

        let wide = to_wide(path);
        unsafe {
            SetFileSecurityW(
                PCWSTR(wide.as_ptr()),
                OWNER_SECURITY_INFORMATION | GROUP_SECURITY_INFORMATION | DACL_SECURITY_INFORMATION,
                PSECURITY_DESCRIPTOR(descriptor.as_ptr() as *mut _),
            )
        }
        .map_err(win_to_io)
    }
    #[cfg(not(windows))]
    {
        let _ = (path, descriptor);
        Err(unsupported("security descriptor restoration"))
    }
}

/// Request that the restore and take-ownership privileges be enabled on the
/// current process token, so security descriptors with arbitrary owners can
/// be applied. Actually holding these privileges is the caller's
/// responsibility.
pub fn enable_restore_privileges() -> io::Result<()> {
    #[cfg(windows)]
    {
        use windows::Win32::Security::{SE_RESTORE_NAME, SE_TAKE_OWNERSHIP_NAME};

        enable_privilege(SE_RESTORE_NAME)?;
        enable_privilege(SE_TAKE_OWNERSHIP_NAME)
    }
    #[cfg(not(windows))]
    {
        Err(unsupported("restore privilege enablement"))
    }
}

#[cfg(windows)]
fn enable_privilege(name: windows::core::PCWSTR) -> io::Result<()> {
    use windows::Win32::Foundation::{CloseHandle, HANDLE, LUID};
    use windows::Win32::Security::{
        AdjustTokenPrivileges, LookupPrivilegeValueW, OpenProcessToken, LUID_AND_ATTRIBUTES,
        SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
    };
    use windows::Win32::System::Threading::GetCurrentProcess;

    unsafe {
        let mut token = HANDLE::default();
        OpenProcessToken(
            GetCurrentProcess(),
            TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
            &mut token,
        )
        .map_err(win_to_io)?;

        let result = (|| {
            let mut luid = LUID::default();
            LookupPrivilegeValueW(windows::core::PCWSTR::null(), name, &mut luid)
                .map_err(win_to_io)?;

            let privileges = TOKEN_PRIVILEGES {
                PrivilegeCount: 1,
                Privileges: [LUID_AND_ATTRIBUTES {
                    Luid: luid,
                    Attributes: SE_PRIVILEGE_ENABLED,
                }],
            };
            AdjustTokenPrivileges(token, false.into(), Some(&privileges as *const _), 0, None, None)
                .map_err(win_to_io)
        })();

        let _ = CloseHandle(token);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_link_shares_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link.txt");
        std::fs::write(&target, b"shared").unwrap();

        create_hard_link(&link, &target).unwrap();
        assert_eq!(std::fs::read(&link).unwrap(), b"shared");
    }

    #[test]
    fn test_directory_junction_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real");
        let link = dir.path().join("alias");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("inside.txt"), b"x").unwrap();

        create_directory_junction(&link, &target).unwrap();
        assert!(link.join("inside.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_windows_only_calls_report_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"").unwrap();

        let attr = set_file_attributes(&file, 0x20).unwrap_err();
        assert_eq!(attr.kind(), io::ErrorKind::Unsupported);

        let ctime = set_creation_time(&file, FileTime::from_unix_time(0, 0)).unwrap_err();
        assert_eq!(ctime.kind(), io::ErrorKind::Unsupported);

        let sd = set_security_descriptor(&file, false, &[1, 2, 3]).unwrap_err();
        assert_eq!(sd.kind(), io::ErrorKind::Unsupported);

        assert_eq!(
            enable_restore_privileges().unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }
}
