//! Archive format sniffing
//!
//! Formats are detected from leading magic bytes only; file names are never
//! trusted.

/// Offset of the `ustar` magic inside a tar header block
const TAR_MAGIC_OFFSET: usize = 257;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// gzip stream, expected to wrap a tar archive
    Gzip,
    /// uncompressed tar
    Tar,
    Zip,
    /// Recognized, but not something CPAN distributions ship as
    Other(&'static str),
}

impl ArchiveFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Other(name) => *name,
        }
    }
}

const SIGNATURES: &[(&[u8], ArchiveFormat)] = &[
    (&[0x1f, 0x8b], ArchiveFormat::Gzip),
    (b"PK\x03\x04", ArchiveFormat::Zip),
    (b"PK\x05\x06", ArchiveFormat::Zip),
    (b"BZh", ArchiveFormat::Other("bzip2")),
    (&[0xfd, b'7', b'z', b'X', b'Z', 0x00], ArchiveFormat::Other("xz")),
    (&[b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c], ArchiveFormat::Other("7z")),
    (&[0x28, 0xb5, 0x2f, 0xfd], ArchiveFormat::Other("zstd")),
    (b"Rar!\x1a\x07", ArchiveFormat::Other("rar")),
    (b"%PDF", ArchiveFormat::Other("pdf")),
];

/// Detect the archive format of `bytes`, `None` if nothing matches
pub fn detect(bytes: &[u8]) -> Option<ArchiveFormat> {
    for (magic, format) in SIGNATURES {
        if bytes.starts_with(magic) {
            return Some(*format);
        }
    }
    match bytes.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5) {
        Some(b"ustar") => Some(ArchiveFormat::Tar),
        _ => None,
    }
}
