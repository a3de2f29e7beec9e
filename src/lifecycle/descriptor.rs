//! Anonymous, inheritable descriptor carrying the bootstrap document.
//!
//! On Linux the bytes live in a `memfd`; elsewhere in an unlinked temporary
//! file. Neither has a name another process could open, and both are
//! created close-on-exec so unrelated children never inherit them.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};

/// Prefix of the path that addresses an open descriptor by number.
pub const FD_PATH_PREFIX: &str = "/dev/fd/";

/// Open descriptor holding a complete bootstrap document, rewound to the start.
#[derive(Debug)]
pub struct BootstrapFd {
    file: File,
}

impl BootstrapFd {
    /// Write `data` into a fresh anonymous descriptor.
    pub fn new(data: &[u8]) -> io::Result<Self> {
        let mut file = anonymous_file()?;
        file.write_all(data)?;
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file })
    }

    /// Descriptor number.
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Path the child uses to read the descriptor, e.g. `/dev/fd/5`.
    pub fn path(&self) -> String {
        format!("{}{}", FD_PATH_PREFIX, self.raw_fd())
    }

    /// Set or clear close-on-exec.
    pub fn set_inheritable(&self, inheritable: bool) -> io::Result<()> {
        let flags = if inheritable {
            FdFlag::empty()
        } else {
            FdFlag::FD_CLOEXEC
        };
        fcntl(self.raw_fd(), FcntlArg::F_SETFD(flags))?;
        Ok(())
    }

    /// Whether the descriptor survives exec.
    pub fn is_inheritable(&self) -> io::Result<bool> {
        let bits = fcntl(self.raw_fd(), FcntlArg::F_GETFD)?;
        Ok(!FdFlag::from_bits_truncate(bits).contains(FdFlag::FD_CLOEXEC))
    }
}

#[cfg(target_os = "linux")]
fn anonymous_file() -> io::Result<File> {
    use nix::sys::memfd::{memfd_create, MemFdCreateFlag};

    let fd = memfd_create(c"mesh-sidecar-bootstrap", MemFdCreateFlag::MFD_CLOEXEC)?;
    Ok(File::from(fd))
}

#[cfg(not(target_os = "linux"))]
fn anonymous_file() -> io::Result<File> {
    tempfile::tempfile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_fd_path() {
        let fd = BootstrapFd::new(b"D").unwrap();
        assert_eq!(std::fs::read(fd.path()).unwrap(), b"D");
    }

    #[test]
    fn test_path_format() {
        let fd = BootstrapFd::new(b"{}").unwrap();
        let path = fd.path();
        let number = path.strip_prefix("/dev/fd/").expect("fd path prefix");
        assert!(!number.is_empty() && number.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(number.parse::<RawFd>().unwrap(), fd.raw_fd());
    }

    #[test]
    fn test_large_document_round_trip() {
        // Larger than a pipe buffer, so a pipe-based handoff would block.
        let data: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        let fd = BootstrapFd::new(&data).unwrap();
        assert_eq!(std::fs::read(fd.path()).unwrap(), data);
    }

    #[test]
    fn test_close_on_exec_until_marked() {
        let fd = BootstrapFd::new(b"secret").unwrap();
        assert!(!fd.is_inheritable().unwrap());

        fd.set_inheritable(true).unwrap();
        assert!(fd.is_inheritable().unwrap());

        fd.set_inheritable(false).unwrap();
        assert!(!fd.is_inheritable().unwrap());
    }
}
