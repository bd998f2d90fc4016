pub mod mmap;

/// Largest file size `FileMapper::map` accepts. Note that match offsets are 32-bit on the
/// wire, so occurrences past the 4 GiB mark in a file under this cap are counted but their
/// offsets are not representable in the captured positions
pub const FILE_SIZE_CAP: u64 = 50 * 1024 * 1024 * 1024;
