//! End-to-end tests over a built archive image and a RAM store.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;

use crate::archive::testing::{build, dir, file};
use crate::error::{FsError, StoreError};
use crate::handle::Mode;
use crate::memory::MemoryStore;
use crate::mount::Mount;
use crate::store::{LogStore, StoreStats};
use crate::types::{EntryInfo, Metadata, OpenMode, Whence};

fn rom_image() -> Vec<u8> {
    build(vec![
        ("startup.lua", file(b"print('hi')\n")),
        (
            "programs",
            dir(vec![
                ("shell.lua", file(b"-- shell")),
                ("edit.lua", file(b"-- editor")),
                ("sub", dir(vec![("inner.txt", file(b"nested"))])),
            ]),
        ),
        ("motd.txt", file(b"line one\nline two\n\ntail")),
    ])
}

fn new_mount(image: &[u8]) -> Mount<'_, MemoryStore> {
    Mount::new(image, MemoryStore::new()).unwrap()
}

fn put(fs: &Mount<'_, MemoryStore>, path: &str, data: &[u8]) {
    let mode = Mode::parse("w").unwrap();
    let mut h = fs.open(path, &mode).unwrap();
    h.write(fs, data).unwrap();
    h.close(fs).unwrap();
}

fn get(fs: &Mount<'_, MemoryStore>, path: &str) -> Vec<u8> {
    let mode = Mode::parse("r").unwrap();
    let mut h = fs.open(path, &mode).unwrap();
    let data = h.read_all(fs).unwrap().unwrap_or_default();
    h.close(fs).unwrap();
    data
}

// ========== Mounting ==========

#[test]
fn test_new_formats_store_on_first_mount_failure() {
    let image = rom_image();
    let store = MemoryStore::new();
    store.fail_next_mount();
    let fs = Mount::new(&image, store).unwrap();
    fs.make_dir("data").unwrap();
    assert!(fs.is_dir("data"));
}

#[test]
fn test_new_rejects_corrupt_archive() {
    let mut image = rom_image();
    image[0] ^= 0xFF;
    assert!(matches!(
        Mount::new(&image, MemoryStore::new()),
        Err(FsError::Corrupt)
    ));
}

// ========== Routing and queries ==========

#[test]
fn test_root_listing_merges_virtual_rom() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "zebra.txt", b"z");
    put(&fs, "alpha.txt", b"a");

    let names = fs.list("/").unwrap();
    assert_eq!(names, vec!["alpha.txt", "rom", "zebra.txt"]);
}

#[test]
fn test_list_routes_to_archive() {
    let image = rom_image();
    let fs = new_mount(&image);
    assert_eq!(
        fs.list("rom").unwrap(),
        vec!["motd.txt", "programs", "startup.lua"]
    );
    assert_eq!(
        fs.list("/rom/programs").unwrap(),
        vec!["edit.lua", "shell.lua", "sub"]
    );
}

#[test]
fn test_list_failures_are_not_a_directory() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "plain.txt", b"x");
    assert_eq!(fs.list("plain.txt"), Err(FsError::NotADirectory));
    assert_eq!(fs.list("missing"), Err(FsError::NotADirectory));
    assert_eq!(fs.list("rom/startup.lua"), Err(FsError::NotADirectory));
    assert_eq!(fs.list("rom/missing"), Err(FsError::NotADirectory));
}

#[test]
fn test_exists_and_is_dir() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f.txt", b"x");
    fs.make_dir("d").unwrap();

    assert!(fs.exists("/"));
    assert!(fs.exists("/rom"));
    assert!(fs.exists("rom/programs/shell.lua"));
    assert!(fs.exists("f.txt"));
    assert!(!fs.exists("rom/nope"));
    assert!(!fs.exists("nope"));

    assert!(fs.is_dir("/rom"));
    assert!(fs.is_dir("rom/programs"));
    assert!(fs.is_dir("d"));
    assert!(!fs.is_dir("f.txt"));
    assert!(!fs.is_dir("rom/startup.lua"));
    assert!(!fs.is_dir("nope"));
}

#[test]
fn test_is_read_only_is_the_archive_subtree() {
    let image = rom_image();
    let fs = new_mount(&image);
    assert!(fs.is_read_only("/rom"));
    assert!(fs.is_read_only("rom/programs/shell.lua"));
    // true even for paths that do not exist under the archive
    assert!(fs.is_read_only("rom/not/a/real/path"));
    assert!(!fs.is_read_only("/"));
    assert!(!fs.is_read_only("somewhere/deep/and/missing"));
    // ".." resolves before the prefix check
    assert!(!fs.is_read_only("rom/../data"));
}

#[test]
fn test_get_name_and_get_dir() {
    let image = rom_image();
    let fs = new_mount(&image);
    assert_eq!(fs.get_name("/rom/startup.lua"), "startup.lua");
    assert_eq!(fs.get_name("a/b/"), "b");
    assert_eq!(fs.get_name("/"), "root");
    assert_eq!(fs.get_dir("a/b/c"), "a/b");
    assert_eq!(fs.get_dir("bare"), "");
    assert_eq!(fs.get_dir("/"), "");
}

#[test]
fn test_get_drive() {
    let image = rom_image();
    let fs = new_mount(&image);
    assert_eq!(fs.get_drive("rom/startup.lua"), "rom");
    assert_eq!(fs.get_drive("/rom"), "rom");
    assert_eq!(fs.get_drive("/"), "hdd");
    assert_eq!(fs.get_drive("data/f"), "hdd");
}

#[test]
fn test_get_size() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f", b"12345");
    assert_eq!(fs.get_size("rom/startup.lua").unwrap(), 12);
    assert_eq!(fs.get_size("f").unwrap(), 5);
    assert_eq!(fs.get_size("rom/programs").unwrap(), 0);
    assert_eq!(fs.get_size("nope"), Err(FsError::NoSuchFile));
}

#[test]
fn test_attributes() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f", b"123");

    let a = fs.attributes("rom/startup.lua").unwrap();
    assert_eq!(a.size, 12);
    assert!(!a.is_dir);
    assert!(a.is_read_only);
    assert_eq!((a.modification, a.modified, a.created), (0, 0, 0));

    let b = fs.attributes("f").unwrap();
    assert_eq!(b.size, 3);
    assert!(!b.is_read_only);

    assert!(fs.attributes("nope").is_none());
}

// ========== Free-space cache ==========

/// MemoryStore wrapper that counts `stats` calls, so memoization is
/// observable.
struct CountingStore {
    inner: MemoryStore,
    stats_calls: Cell<u32>,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            stats_calls: Cell::new(0),
        }
    }
}

impl LogStore for CountingStore {
    type File = <MemoryStore as LogStore>::File;
    type Dir = <MemoryStore as LogStore>::Dir;

    fn mount(&self) -> Result<(), StoreError> {
        self.inner.mount()
    }
    fn format(&self) -> Result<(), StoreError> {
        self.inner.format()
    }
    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File, StoreError> {
        self.inner.open(path, mode)
    }
    fn read(&self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, StoreError> {
        self.inner.read(file, buf)
    }
    fn write(&self, file: &mut Self::File, data: &[u8]) -> Result<usize, StoreError> {
        self.inner.write(file, data)
    }
    fn seek(&self, file: &mut Self::File, whence: Whence, off: i64) -> Result<u64, StoreError> {
        self.inner.seek(file, whence, off)
    }
    fn tell(&self, file: &mut Self::File) -> Result<u64, StoreError> {
        self.inner.tell(file)
    }
    fn size(&self, file: &mut Self::File) -> Result<u64, StoreError> {
        self.inner.size(file)
    }
    fn sync(&self, file: &mut Self::File) -> Result<(), StoreError> {
        self.inner.sync(file)
    }
    fn close(&self, file: Self::File) -> Result<(), StoreError> {
        self.inner.close(file)
    }
    fn open_dir(&self, path: &str) -> Result<Self::Dir, StoreError> {
        self.inner.open_dir(path)
    }
    fn read_dir(&self, dirp: &mut Self::Dir) -> Result<Option<EntryInfo>, StoreError> {
        self.inner.read_dir(dirp)
    }
    fn close_dir(&self, dirp: Self::Dir) -> Result<(), StoreError> {
        self.inner.close_dir(dirp)
    }
    fn stat(&self, path: &str) -> Result<Metadata, StoreError> {
        self.inner.stat(path)
    }
    fn mkdir(&self, path: &str) -> Result<(), StoreError> {
        self.inner.mkdir(path)
    }
    fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.inner.remove(path)
    }
    fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.inner.rename(from, to)
    }
    fn stats(&self) -> Result<StoreStats, StoreError> {
        self.stats_calls.set(self.stats_calls.get() + 1);
        self.inner.stats()
    }
}

#[test]
fn test_free_space_is_memoized_until_mutation() {
    let image = rom_image();
    let fs = Mount::new(&image, CountingStore::new()).unwrap();

    let free = fs.get_free_space("/").unwrap();
    assert_eq!(free, 4096 * 256);
    fs.get_free_space("data").unwrap();
    fs.get_capacity("data").unwrap();
    assert_eq!(fs.store().stats_calls.get(), 1);

    fs.make_dir("d").unwrap();
    assert!(fs.get_free_space("/").unwrap() < free);
    assert_eq!(fs.store().stats_calls.get(), 2);
}

#[test]
fn test_handle_write_and_close_invalidate_space() {
    let image = rom_image();
    let fs = Mount::new(&image, CountingStore::new()).unwrap();
    fs.get_free_space("/").unwrap();
    assert_eq!(fs.store().stats_calls.get(), 1);

    let mode = Mode::parse("w").unwrap();
    let mut h = fs.open("f", &mode).unwrap();
    h.write(&fs, b"grow").unwrap();
    fs.get_free_space("/").unwrap();
    assert_eq!(fs.store().stats_calls.get(), 2);

    // close drops the figures again, even for a read handle
    h.close(&fs).unwrap();
    let mode = Mode::parse("r").unwrap();
    let mut r = fs.open("rom/startup.lua", &mode).unwrap();
    fs.get_free_space("/").unwrap();
    assert_eq!(fs.store().stats_calls.get(), 3);
    r.close(&fs).unwrap();
    fs.get_free_space("/").unwrap();
    assert_eq!(fs.store().stats_calls.get(), 4);
}

#[test]
fn test_rom_reports_no_space() {
    let image = rom_image();
    let fs = new_mount(&image);
    assert_eq!(fs.get_free_space("rom").unwrap(), 0);
    assert_eq!(fs.get_capacity("/rom/programs").unwrap(), 0);
}

// ========== Mutations ==========

#[test]
fn test_make_dir_is_recursive_and_idempotent() {
    let image = rom_image();
    let fs = new_mount(&image);
    fs.make_dir("a/b/c").unwrap();
    assert!(fs.is_dir("a"));
    assert!(fs.is_dir("a/b"));
    assert!(fs.is_dir("a/b/c"));
    fs.make_dir("a/b/c").unwrap();
    fs.make_dir("a").unwrap();
}

#[test]
fn test_make_dir_over_file_fails() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f", b"x");
    assert_eq!(
        fs.make_dir("f"),
        Err(FsError::Io(String::from("File exists")))
    );
}

#[test]
fn test_archive_mutations_are_permission_denied() {
    let image = rom_image();
    let fs = new_mount(&image);
    assert_eq!(fs.make_dir("rom/new"), Err(FsError::PermissionDenied));
    assert_eq!(fs.delete("/rom"), Err(FsError::PermissionDenied));
    assert_eq!(
        fs.move_("rom/startup.lua", "startup.lua"),
        Err(FsError::PermissionDenied)
    );
    assert_eq!(
        fs.move_("startup.lua", "rom/startup.lua"),
        Err(FsError::PermissionDenied)
    );
    assert_eq!(fs.copy("f", "rom/f"), Err(FsError::PermissionDenied));
    let mode = Mode::parse("w").unwrap();
    assert!(matches!(
        fs.open("rom/x", &mode),
        Err(FsError::PermissionDenied)
    ));
    let mode = Mode::parse("a").unwrap();
    assert!(matches!(
        fs.open("rom/startup.lua", &mode),
        Err(FsError::PermissionDenied)
    ));
}

#[test]
fn test_move_renames_and_creates_parents() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "src.txt", b"payload");
    fs.move_("src.txt", "deep/nest/dst.txt").unwrap();
    assert!(!fs.exists("src.txt"));
    assert_eq!(get(&fs, "deep/nest/dst.txt"), b"payload");
}

#[test]
fn test_move_errors() {
    let image = rom_image();
    let fs = new_mount(&image);
    assert_eq!(fs.move_("gone", "x"), Err(FsError::NoSuchFile));
    put(&fs, "a", b"1");
    put(&fs, "b", b"2");
    assert_eq!(
        fs.move_("a", "b"),
        Err(FsError::Io(String::from("File exists")))
    );
}

#[test]
fn test_copy_file_within_store() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "orig", b"copy me");
    fs.copy("orig", "dup/inner").unwrap();
    assert_eq!(get(&fs, "dup/inner"), b"copy me");
    assert_eq!(get(&fs, "orig"), b"copy me");
}

#[test]
fn test_copy_archive_tree_into_store() {
    let image = rom_image();
    let fs = new_mount(&image);
    fs.copy("rom/programs", "programs").unwrap();
    assert_eq!(get(&fs, "programs/shell.lua"), b"-- shell");
    assert_eq!(get(&fs, "programs/edit.lua"), b"-- editor");
    assert_eq!(get(&fs, "programs/sub/inner.txt"), b"nested");
    assert!(fs.is_dir("programs/sub"));
    // the copies are writable
    assert!(!fs.is_read_only("programs/shell.lua"));
}

#[test]
fn test_copy_large_file_streams() {
    let image = rom_image();
    let fs = new_mount(&image);
    // larger than the 1 KiB streaming buffer
    let big: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    put(&fs, "big", &big);
    fs.copy("big", "big2").unwrap();
    assert_eq!(get(&fs, "big2"), big);
}

#[test]
fn test_copy_errors() {
    let image = rom_image();
    let fs = new_mount(&image);
    // a missing source is a copy failure, not a lookup failure
    assert_eq!(fs.copy("gone", "x"), Err(FsError::CopyFailed));
    assert_eq!(fs.copy("rom/absent", "x"), Err(FsError::CopyFailed));
    fs.make_dir("d").unwrap();
    assert_eq!(fs.copy("d", "d/child"), Err(FsError::CopyFailed));
}

#[test]
fn test_delete_file_and_tree() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "t/a", b"1");
    put(&fs, "t/sub/b", b"2");
    put(&fs, "keep", b"3");

    fs.delete("t").unwrap();
    assert!(!fs.exists("t"));
    assert!(!fs.exists("t/sub/b"));
    assert!(fs.exists("keep"));

    fs.delete("keep").unwrap();
    assert!(!fs.exists("keep"));
    assert_eq!(fs.delete("keep"), Err(FsError::NoSuchFile));
}

// ========== Handles ==========

#[test]
fn test_open_read_errors() {
    let image = rom_image();
    let fs = new_mount(&image);
    fs.make_dir("d").unwrap();
    let r = Mode::parse("r").unwrap();
    assert!(matches!(fs.open("missing", &r), Err(FsError::NoSuchFile)));
    assert!(matches!(fs.open("d", &r), Err(FsError::NoSuchFile)));
    assert!(matches!(fs.open("rom/programs", &r), Err(FsError::NoSuchFile)));
    let w = Mode::parse("w").unwrap();
    assert!(matches!(
        fs.open("d", &w),
        Err(FsError::CannotWriteToDirectory)
    ));
}

#[test]
fn test_write_creates_parents() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "a/b/c.txt", b"deep");
    assert!(fs.is_dir("a/b"));
    assert_eq!(get(&fs, "a/b/c.txt"), b"deep");
}

#[test]
fn test_write_truncates_append_extends() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f", b"0123456789");
    put(&fs, "f", b"short");
    assert_eq!(get(&fs, "f"), b"short");

    let a = Mode::parse("a").unwrap();
    let mut h = fs.open("f", &a).unwrap();
    h.write(&fs, b"+more").unwrap();
    h.close(&fs).unwrap();
    assert_eq!(get(&fs, "f"), b"short+more");
}

#[test]
fn test_read_all_then_none() {
    let image = rom_image();
    let fs = new_mount(&image);
    let r = Mode::parse("r").unwrap();
    let mut h = fs.open("rom/motd.txt", &r).unwrap();
    assert_eq!(
        h.read_all(&fs).unwrap().unwrap(),
        b"line one\nline two\n\ntail"
    );
    assert_eq!(h.read_all(&fs).unwrap(), None);
    h.close(&fs).unwrap();
}

#[test]
fn test_read_line_splits_and_terminates() {
    let image = rom_image();
    let fs = new_mount(&image);
    let r = Mode::parse("r").unwrap();
    let mut h = fs.open("rom/motd.txt", &r).unwrap();
    assert_eq!(h.read_line(&fs, false).unwrap().unwrap(), b"line one");
    assert_eq!(h.read_line(&fs, false).unwrap().unwrap(), b"line two");
    // empty line between the two newlines
    assert_eq!(h.read_line(&fs, false).unwrap().unwrap(), b"");
    // trailing unterminated data comes out once
    assert_eq!(h.read_line(&fs, false).unwrap().unwrap(), b"tail");
    assert_eq!(h.read_line(&fs, false).unwrap(), None);
    h.close(&fs).unwrap();
}

#[test]
fn test_read_line_with_newline() {
    let image = rom_image();
    let fs = new_mount(&image);
    let r = Mode::parse("r").unwrap();
    let mut h = fs.open("rom/motd.txt", &r).unwrap();
    assert_eq!(h.read_line(&fs, true).unwrap().unwrap(), b"line one\n");
    assert_eq!(h.read_line(&fs, true).unwrap().unwrap(), b"line two\n");
    assert_eq!(h.read_line(&fs, true).unwrap().unwrap(), b"\n");
    assert_eq!(h.read_line(&fs, true).unwrap().unwrap(), b"tail");
    h.close(&fs).unwrap();
}

#[test]
fn test_read_line_newline_on_chunk_boundary() {
    let image = rom_image();
    let fs = new_mount(&image);
    // 256 bytes of 'x', then a newline as the first byte of the next chunk
    let mut data = vec![b'x'; 256];
    data.push(b'\n');
    data.extend_from_slice(b"after");
    put(&fs, "edge", &data);

    let r = Mode::parse("r").unwrap();
    let mut h = fs.open("edge", &r).unwrap();
    assert_eq!(h.read_line(&fs, false).unwrap().unwrap(), vec![b'x'; 256]);
    assert_eq!(h.read_line(&fs, false).unwrap().unwrap(), b"after");
    h.close(&fs).unwrap();
}

#[test]
fn test_read_counts_and_bytes() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f", b"abcdef");
    let r = Mode::parse("rb").unwrap();
    let mut h = fs.open("f", &r).unwrap();
    assert_eq!(h.read_byte(&fs).unwrap(), Some(b'a'));
    assert_eq!(h.read(&fs, 3).unwrap().unwrap(), b"bcd");
    // short read at the end
    assert_eq!(h.read(&fs, 10).unwrap().unwrap(), b"ef");
    assert_eq!(h.read(&fs, 10).unwrap(), None);
    assert_eq!(h.read_byte(&fs).unwrap(), None);
    h.close(&fs).unwrap();
}

#[test]
fn test_seek_semantics_differ_per_backend() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f", b"0123456789");

    // store: End is size + off
    let r = Mode::parse("rb").unwrap();
    let mut h = fs.open("f", &r).unwrap();
    assert_eq!(h.seek(&fs, Whence::End, -2).unwrap(), 8);
    assert_eq!(h.read_byte(&fs).unwrap(), Some(b'8'));
    assert_eq!(h.seek(&fs, Whence::Start, 4).unwrap(), 4);
    assert_eq!(h.seek(&fs, Whence::Current, 1).unwrap(), 5);
    h.close(&fs).unwrap();

    // archive: End measures backwards from the end
    let mut h = fs.open("rom/startup.lua", &r).unwrap();
    assert_eq!(h.seek(&fs, Whence::End, 2).unwrap(), 10);
    h.close(&fs).unwrap();
}

#[test]
fn test_write_line_and_write_byte() {
    let image = rom_image();
    let fs = new_mount(&image);
    let w = Mode::parse("wb").unwrap();
    let mut h = fs.open("log", &w).unwrap();
    h.write_line(&fs, b"first").unwrap();
    h.write_byte(&fs, 0x21).unwrap();
    h.flush(&fs).unwrap();
    h.close(&fs).unwrap();
    assert_eq!(get(&fs, "log"), b"first\n!");
}

#[test]
fn test_closed_handle_rejects_everything() {
    let image = rom_image();
    let fs = new_mount(&image);
    put(&fs, "f", b"x");
    let r = Mode::parse("r").unwrap();
    let mut h = fs.open("f", &r).unwrap();
    h.close(&fs).unwrap();
    assert!(h.is_closed());

    let mut buf_err = h.read_all(&fs);
    assert_eq!(buf_err, Err(FsError::BadHandle));
    buf_err = h.read(&fs, 1);
    assert_eq!(buf_err, Err(FsError::BadHandle));
    assert_eq!(h.write(&fs, b"x"), Err(FsError::BadHandle));
    assert_eq!(h.flush(&fs), Err(FsError::BadHandle));
    assert_eq!(h.seek(&fs, Whence::Start, 0), Err(FsError::BadHandle));
    assert_eq!(h.close(&fs), Err(FsError::BadHandle));
}

#[test]
fn test_archive_handle_pool_frees_on_close() {
    let image = rom_image();
    let fs = new_mount(&image);
    let r = Mode::parse("r").unwrap();
    let mut handles = Vec::new();
    for _ in 0..crate::archive::MAX_FDS {
        handles.push(fs.open("rom/startup.lua", &r).unwrap());
    }
    assert!(matches!(
        fs.open("rom/startup.lua", &r),
        Err(FsError::TooManyOpenFiles)
    ));
    let mut freed = handles.pop().unwrap();
    freed.close(&fs).unwrap();
    let mut again = fs.open("rom/startup.lua", &r).unwrap();
    again.close(&fs).unwrap();
    for mut h in handles {
        h.close(&fs).unwrap();
    }
}
