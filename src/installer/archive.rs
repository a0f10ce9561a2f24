//! Package archive reader
//!
//! Registry archives are gzip-compressed ustar streams: a run of 512-byte
//! header blocks, each followed by its payload padded to the block size, and
//! terminated by a zero block. Text fields are NUL-padded ASCII and numeric
//! fields are octal text.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::core::{KilnError, KilnResult};

pub const BLOCK_SIZE: usize = 512;

/// Top-level directory npm wraps every archive in
const WRAPPER_DIR: &str = "package";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// Header field layout (offset, length)
const NAME: (usize, usize) = (0, 100);
const MODE: (usize, usize) = (100, 8);
const SIZE: (usize, usize) = (124, 12);
const MTIME: (usize, usize) = (136, 12);
const CHECKSUM: (usize, usize) = (148, 8);
const TYPEFLAG: usize = 156;
const LINKNAME: (usize, usize) = (157, 100);
const MAGIC: (usize, usize) = (257, 6);
const PREFIX: (usize, usize) = (345, 155);

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One file, directory or symlink record
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path with the wrapper directory removed
    pub path: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    pub mtime: u64,
    /// File contents; `None` for directories and symlinks
    pub payload: Option<Vec<u8>>,
    pub link_target: Option<String>,
}

/// Inflate a gzip stream completely
pub fn decompress(package: &str, data: &[u8]) -> KilnResult<Vec<u8>> {
    if data.len() < GZIP_MAGIC.len() || data[..2] != GZIP_MAGIC {
        return Err(KilnError::archive(package, "not a gzip stream"));
    }

    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| KilnError::archive(package, format!("invalid gzip stream: {}", e)))?;

    tracing::trace!("{}: inflated {} -> {} bytes", package, data.len(), out.len());
    Ok(out)
}

/// Decompress and parse in one step
pub fn read_archive(package: &str, compressed: &[u8]) -> KilnResult<Vec<ArchiveEntry>> {
    let tar = decompress(package, compressed)?;
    parse_archive(package, &tar)
}

/// Overrides carried by PAX and GNU long-name records into the next header
#[derive(Default)]
struct PendingMeta {
    path: Option<String>,
    link_target: Option<String>,
    size: Option<u64>,
}

impl PendingMeta {
    fn apply_pax(&mut self, package: &str, records: &[u8]) -> KilnResult<()> {
        let mut rest = records;

        while !rest.is_empty() {
            let malformed = || KilnError::archive(package, "malformed PAX record");

            let space = rest.iter().position(|&b| b == b' ').ok_or_else(malformed)?;
            let len: usize = std::str::from_utf8(&rest[..space])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(malformed)?;
            if len <= space + 1 || len > rest.len() || rest[len - 1] != b'\n' {
                return Err(malformed());
            }

            let record = String::from_utf8_lossy(&rest[space + 1..len - 1]);
            if let Some((key, value)) = record.split_once('=') {
                match key {
                    "path" => self.path = Some(value.to_string()),
                    "linkpath" => self.link_target = Some(value.to_string()),
                    "size" => self.size = Some(value.parse().map_err(|_| malformed())?),
                    _ => {}
                }
            }
            rest = &rest[len..];
        }

        Ok(())
    }
}

/// Parse a decompressed archive into its entries, in archive order
pub fn parse_archive(package: &str, data: &[u8]) -> KilnResult<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    let mut pending = PendingMeta::default();
    let mut offset = 0;

    while offset < data.len() {
        if data.len() - offset < BLOCK_SIZE {
            return Err(KilnError::archive(package, "truncated header block"));
        }
        let block = &data[offset..offset + BLOCK_SIZE];

        if block.iter().all(|&b| b == 0) {
            break;
        }

        verify_checksum(package, block)?;

        let size = match pending.size.take() {
            Some(size) => size,
            None => parse_numeric(package, field(block, SIZE), "size")?,
        };
        let size_usize = usize::try_from(size)
            .map_err(|_| KilnError::archive(package, "entry size out of range"))?;

        let data_start = offset + BLOCK_SIZE;
        let data_end = data_start
            .checked_add(size_usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                KilnError::archive(package, format!("truncated payload for {}", header_path(block)))
            })?;
        let payload = &data[data_start..data_end];
        offset = data_start + padded(size_usize);

        let type_flag = block[TYPEFLAG];
        match type_flag {
            b'x' => {
                pending.apply_pax(package, payload)?;
                continue;
            }
            b'g' => continue,
            b'L' => {
                pending.path = Some(c_string(payload));
                continue;
            }
            b'K' => {
                pending.link_target = Some(c_string(payload));
                continue;
            }
            _ => {}
        }

        let raw_path = pending.path.take().unwrap_or_else(|| header_path(block));
        let link_target = pending.link_target.take();

        let path = strip_wrapper(&raw_path);
        if path.is_empty() {
            continue;
        }

        let kind = match type_flag {
            b'5' => EntryKind::Directory,
            b'2' => EntryKind::Symlink,
            b'1' | b'3' | b'4' | b'6' => {
                tracing::warn!(
                    "Skipping {} in {}: unsupported entry type '{}'",
                    path,
                    package,
                    type_flag as char
                );
                continue;
            }
            _ => EntryKind::File,
        };

        entries.push(ArchiveEntry {
            path: path.to_string(),
            kind,
            mode: parse_numeric(package, field(block, MODE), "mode")? as u32,
            size,
            mtime: parse_numeric(package, field(block, MTIME), "mtime")?,
            payload: (kind == EntryKind::File).then(|| payload.to_vec()),
            link_target: match kind {
                EntryKind::Symlink => {
                    Some(link_target.unwrap_or_else(|| c_string(field(block, LINKNAME))))
                }
                _ => None,
            },
        });
    }

    Ok(entries)
}

fn field(block: &[u8], (offset, len): (usize, usize)) -> &[u8] {
    &block[offset..offset + len]
}

/// Bytes up to the first NUL
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// `prefix/name` for POSIX ustar headers, otherwise just `name`
fn header_path(block: &[u8]) -> String {
    let name = c_string(field(block, NAME));
    if field(block, MAGIC) == b"ustar\0" {
        let prefix = c_string(field(block, PREFIX));
        if !prefix.is_empty() {
            return format!("{}/{}", prefix, name);
        }
    }
    name
}

fn strip_wrapper(path: &str) -> &str {
    let path = path.trim_start_matches("./");
    match path.strip_prefix(WRAPPER_DIR) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => path,
    }
}

fn padded(size: usize) -> usize {
    size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Octal text, or GNU base-256 when the high bit of the first byte is set
fn parse_numeric(package: &str, bytes: &[u8], what: &str) -> KilnResult<u64> {
    let invalid = || KilnError::archive(package, format!("invalid {} field", what));

    if bytes.first().is_some_and(|&b| b & 0x80 != 0) {
        return bytes[1..]
            .iter()
            .try_fold(u64::from(bytes[0] & 0x7f), |acc, &b| {
                acc.checked_mul(256).map(|acc| acc | u64::from(b))
            })
            .ok_or_else(invalid);
    }

    let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
    let text = text.trim_matches(|c| c == ' ' || c == '\0');
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, 8).map_err(|_| invalid())
}

/// Compare the stored header checksum with the byte sum of the header,
/// counting the checksum field itself as spaces. Both the unsigned and the
/// historic signed sum are accepted.
fn verify_checksum(package: &str, block: &[u8]) -> KilnResult<()> {
    let stored = field(block, CHECKSUM);
    let text = std::str::from_utf8(stored)
        .ok()
        .map(|s| s.trim_matches(|c| c == ' ' || c == '\0'))
        .filter(|s| !s.is_empty())
        .and_then(|s| u64::from_str_radix(s, 8).ok())
        .ok_or_else(|| {
            KilnError::archive(package, format!("unreadable header checksum for {}", header_path(block)))
        })?;

    let (start, len) = CHECKSUM;
    let in_checksum = |i: usize| (start..start + len).contains(&i);

    let unsigned: u64 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if in_checksum(i) { u64::from(b' ') } else { u64::from(b) })
        .sum();
    let signed: i64 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if in_checksum(i) { i64::from(b' ') } else { i64::from(b as i8) })
        .sum();

    if text == unsigned || i64::try_from(text).is_ok_and(|t| t == signed) {
        Ok(())
    } else {
        Err(KilnError::archive(
            package,
            format!(
                "header checksum mismatch for {} (stored {:o}, computed {:o})",
                header_path(block),
                text,
                unsigned
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::{gzip, tarball};

    fn ustar(entries: &[(&str, tar::EntryType, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, kind, data) in entries {
            let mut header = tar::Header::new_ustar();
            header.set_entry_type(*kind);
            header.set_size(data.len() as u64);
            header.set_mode(if *kind == tar::EntryType::Directory { 0o755 } else { 0o644 });
            header.set_mtime(1_700_000_000);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_parse_files_and_directories() {
        let data = ustar(&[
            ("package/lib", tar::EntryType::Directory, b""),
            ("package/lib/index.js", tar::EntryType::Regular, b"module.exports = 42;\n"),
            ("package/package.json", tar::EntryType::Regular, b"{}"),
        ]);

        let entries = parse_archive("demo", &data).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].path, "lib");
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert!(entries[0].payload.is_none());

        assert_eq!(entries[1].path, "lib/index.js");
        assert_eq!(entries[1].kind, EntryKind::File);
        assert_eq!(entries[1].mode, 0o644);
        assert_eq!(entries[1].mtime, 1_700_000_000);
        assert_eq!(entries[1].size, 21);
        assert_eq!(entries[1].payload.as_deref(), Some(&b"module.exports = 42;\n"[..]));
    }

    #[test]
    fn test_payload_padding_spans_blocks() {
        let big = vec![b'z'; BLOCK_SIZE * 2 + 7];
        let data = ustar(&[
            ("package/big.bin", tar::EntryType::Regular, &big),
            ("package/after.txt", tar::EntryType::Regular, b"after"),
        ]);

        let entries = parse_archive("demo", &data).unwrap();
        assert_eq!(entries[0].payload.as_ref().unwrap().len(), big.len());
        assert_eq!(entries[1].path, "after.txt");
        assert_eq!(entries[1].payload.as_deref(), Some(&b"after"[..]));
    }

    #[test]
    fn test_symlink_entry() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        builder
            .append_link(&mut header, "package/bin/cli", "../lib/cli.js")
            .unwrap();
        let data = builder.into_inner().unwrap();

        let entries = parse_archive("demo", &data).unwrap();
        assert_eq!(entries[0].kind, EntryKind::Symlink);
        assert_eq!(entries[0].path, "bin/cli");
        assert_eq!(entries[0].link_target.as_deref(), Some("../lib/cli.js"));
    }

    #[test]
    fn test_hard_links_and_special_files_are_skipped() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut link = tar::Header::new_ustar();
        link.set_entry_type(tar::EntryType::Link);
        link.set_size(0);
        builder.append_link(&mut link, "package/copy.js", "package/index.js").unwrap();
        for (name, kind) in [
            ("package/tty", tar::EntryType::Char),
            ("package/disk", tar::EntryType::Block),
            ("package/pipe", tar::EntryType::Fifo),
        ] {
            let mut header = tar::Header::new_ustar();
            header.set_entry_type(kind);
            header.set_size(0);
            builder.append_data(&mut header, name, &b""[..]).unwrap();
        }
        let mut file = tar::Header::new_ustar();
        file.set_size(2);
        builder.append_data(&mut file, "package/index.js", &b"ok"[..]).unwrap();
        let data = builder.into_inner().unwrap();

        let entries = parse_archive("demo", &data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "index.js");
        assert_eq!(entries[0].kind, EntryKind::File);
    }

    #[test]
    fn test_long_names_use_prefix_or_extension() {
        let deep = format!("package/{}/{}.js", "d".repeat(120), "f".repeat(40));
        let data = ustar(&[(deep.as_str(), tar::EntryType::Regular, b"x")]);

        let entries = parse_archive("demo", &data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, deep.trim_start_matches("package/"));
    }

    #[test]
    fn test_pax_path_override() {
        let mut archive = Vec::new();
        let record = "30 path=package/from-pax.json\n";
        assert_eq!(record.len(), 30);
        archive.extend(ustar(&[("PaxHeader/x", tar::EntryType::XHeader, record.as_bytes())]));
        archive.truncate(archive.len() - BLOCK_SIZE * 2);
        archive.extend(ustar(&[("package/short.txt", tar::EntryType::Regular, b"pax")]));

        let entries = parse_archive("demo", &archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "from-pax.json");
    }

    #[test]
    fn test_checksum_mismatch_is_rejected() {
        let mut data = ustar(&[("package/index.js", tar::EntryType::Regular, b"ok")]);
        // Flip a byte inside the name field without touching the checksum
        data[10] ^= 0x01;

        let err = parse_archive("demo", &data).unwrap_err();
        assert!(matches!(err, KilnError::MalformedArchive { .. }));
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let data = ustar(&[("package/index.js", tar::EntryType::Regular, &[7u8; 600])]);
        let truncated = &data[..BLOCK_SIZE + 100];

        let err = parse_archive("demo", truncated).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_zero_block_terminates() {
        let mut data = ustar(&[("package/a.txt", tar::EntryType::Regular, b"a")]);
        // Trailing garbage after the terminator is never read
        data.extend_from_slice(&[0xff; BLOCK_SIZE]);

        let entries = parse_archive("demo", &data).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(parse_archive("demo", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_decompress_roundtrip_and_errors() {
        let compressed = tarball(&[("package/readme.md", b"# hi")]);
        let entries = read_archive("demo", &compressed).unwrap();
        assert_eq!(entries[0].path, "readme.md");

        let err = decompress("demo", b"plain text, not gzip").unwrap_err();
        assert!(matches!(err, KilnError::MalformedArchive { .. }));

        let mut corrupt = gzip(b"some payload that is long enough to matter");
        let last = corrupt.len() - 5;
        corrupt[last] ^= 0xff;
        assert!(decompress("demo", &corrupt).is_err());
    }

    #[test]
    fn test_numeric_fields() {
        assert_eq!(parse_numeric("p", b"0000644\0", "mode").unwrap(), 0o644);
        assert_eq!(parse_numeric("p", b"     17 ", "size").unwrap(), 0o17);
        assert_eq!(parse_numeric("p", b"\0\0\0\0", "size").unwrap(), 0);
        assert_eq!(
            parse_numeric("p", &[0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x00], "size").unwrap(),
            256
        );
        assert!(parse_numeric("p", b"0009\0", "size").is_err());
    }

    #[test]
    fn test_strip_wrapper() {
        assert_eq!(strip_wrapper("package/a/b.js"), "a/b.js");
        assert_eq!(strip_wrapper("./package/a.js"), "a.js");
        assert_eq!(strip_wrapper("package/"), "");
        assert_eq!(strip_wrapper("package"), "");
        assert_eq!(strip_wrapper("packages/a.js"), "packages/a.js");
        assert_eq!(strip_wrapper("other/a.js"), "other/a.js");
    }
}
