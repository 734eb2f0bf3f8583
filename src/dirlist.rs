//! Directory lister (L1).
//!
//! Reads a directory's immediate children into a caller-supplied byte
//! [`Arena`] and an index vector, one pass, no per-entry allocation.
//! Each entry is `[type tag][name bytes][NUL][NUL]`; the index vector
//! records the offset of each entry's name so callers can walk entries
//! without re-scanning for the tag byte.
//!
//! On Linux the raw `getdents64` syscall is used directly against a
//! file descriptor opened read-only, directory-only, close-on-exec,
//! no-follow-symlink, and (best-effort) no-atime-update — this is the
//! fast path the spec calls for. Everywhere else we fall back to
//! `std::fs::read_dir`, which is the only portable option and is fast
//! enough off the hot path on those platforms.

use std::io;
use std::path::Path;

use crate::arena::{Arena, StrView};

pub const READ_BUF_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

impl FileKind {
    fn tag_byte(self) -> u8 {
        match self {
            FileKind::File => b'f',
            FileKind::Directory => b'd',
            FileKind::Symlink => b'l',
            FileKind::Unknown => b'?',
        }
    }
}

/// One directory entry: its kind and a view of its name in the arena
/// that produced this listing.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub kind: FileKind,
    pub name: StrView,
}

/// The result of listing one directory: the packed arena plus an index
/// of the entries within it, in readdir order (unsorted — callers that
/// need sorted order, like the diff engine's untracked-file check, sort
/// the index vector themselves).
pub struct Listing {
    pub arena: Arena,
    pub entries: Vec<Entry>,
}

impl Listing {
    pub fn name_bytes<'a>(&'a self, entry: &Entry) -> &'a [u8] {
        self.arena.resolve(entry.name)
    }
}

/// Lists the immediate children of `dir`, filtering `.` and `..`.
pub fn list_dir(dir: &Path) -> io::Result<Listing> {
    #[cfg(target_os = "linux")]
    {
        list_dir_linux(dir)
    }
    #[cfg(not(target_os = "linux"))]
    {
        list_dir_fallback(dir)
    }
}

fn push_entry(arena: &mut Arena, entries: &mut Vec<Entry>, kind: FileKind, name: &[u8]) {
    if name == b"." || name == b".." {
        return;
    }
    let start = arena.len();
    arena.push_byte(kind.tag_byte());
    let name_view = arena.push(name);
    arena.push_byte(0);
    arena.push_byte(0);
    let _ = start;
    entries.push(Entry {
        kind,
        name: name_view,
    });
}

fn list_dir_fallback(dir: &Path) -> io::Result<Listing> {
    let mut arena = Arena::with_capacity(4096);
    let mut entries = Vec::new();
    for dirent in std::fs::read_dir(dir)? {
        let dirent = dirent?;
        let kind = match dirent.file_type() {
            Ok(ft) if ft.is_dir() => FileKind::Directory,
            Ok(ft) if ft.is_symlink() => FileKind::Symlink,
            Ok(ft) if ft.is_file() => FileKind::File,
            Ok(_) => FileKind::Unknown,
            Err(_) => FileKind::Unknown,
        };
        push_entry(
            &mut arena,
            &mut entries,
            kind,
            dirent.file_name().as_encoded_bytes(),
        );
    }
    Ok(Listing { arena, entries })
}

#[cfg(target_os = "linux")]
fn list_dir_linux(dir: &Path) -> io::Result<Listing> {
    use crate::scope::Guard;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::RawFd;

    let path_c = CString::new(dir.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut flags = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC | libc::O_NOFOLLOW;
    #[cfg(target_os = "linux")]
    {
        flags |= libc::O_NOATIME;
    }

    let raw_fd = unsafe { libc::open(path_c.as_ptr(), flags) };
    let raw_fd = if raw_fd < 0 {
        // O_NOATIME can fail with EPERM for files we don't own; retry
        // without it before giving up.
        let retry = unsafe {
            libc::open(
                path_c.as_ptr(),
                libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC | libc::O_NOFOLLOW,
            )
        };
        if retry < 0 {
            return Err(io::Error::last_os_error());
        }
        retry
    } else {
        raw_fd
    };

    let fd_guard: Guard<RawFd, _> = Guard::new(raw_fd, |fd| {
        unsafe { libc::close(fd) };
    });

    let mut arena = Arena::with_capacity(4096);
    let mut entries = Vec::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        let nread = unsafe {
            libc::syscall(
                libc::SYS_getdents64,
                *fd_guard.get(),
                buf.as_mut_ptr(),
                buf.len(),
            )
        };
        if nread < 0 {
            return Err(io::Error::last_os_error());
        }
        if nread == 0 {
            break;
        }
        let nread = nread as usize;
        let mut offset = 0usize;
        while offset < nread {
            // struct linux_dirent64 { u64 d_ino; i64 d_off; u16 d_reclen;
            //                          u8 d_type; char d_name[]; }
            let reclen = u16::from_ne_bytes([buf[offset + 16], buf[offset + 17]]) as usize;
            let d_type = buf[offset + 18];
            let name_start = offset + 19;
            let name_end = buf[name_start..offset + reclen]
                .iter()
                .position(|&b| b == 0)
                .map(|p| name_start + p)
                .unwrap_or(offset + reclen);
            let name = &buf[name_start..name_end];

            let kind = match d_type {
                libc::DT_REG => FileKind::File,
                libc::DT_DIR => FileKind::Directory,
                libc::DT_LNK => FileKind::Symlink,
                _ => FileKind::Unknown,
            };
            push_entry(&mut arena, &mut entries, kind, name);

            offset += reclen;
        }
    }

    fd_guard.release();
    Ok(Listing { arena, entries })
}
