use std::fmt;
use std::str;

use log::trace;
use thiserror::Error;

/// The kernel boot argument prefix that introduces the partition table
/// descriptor inside the image.
const DESCRIPTOR_PREFIX: &[u8] = b"mtdparts=spi0.0:";

/// Marker that distinguishes the parent partition table from child-only
/// tables that can appear elsewhere in the same image.
const PARENT_TABLE_MARKER: &str = "KERNEL2";

/// Partition table parsing errors
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("The image does not contain a recognizable partition table descriptor")]
    DescriptorNotFound,

    #[error("Cannot parse partition entry: {:?}", _0)]
    MalformedEntry(String),

    #[error(
        "Partition {:?} ({:#x} + {:#x}) exceeds the image size of {:#x} bytes",
        name,
        offset,
        size,
        image_size
    )]
    EntryOutOfBounds {
        name: String,
        offset: usize,
        size: usize,
        image_size: usize,
    },
}

/// A single partition, with its content copied out of the image
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Partition {
    /// The partition name as it appears in the descriptor
    pub name: String,
    /// Absolute byte offset into the image
    pub offset: usize,
    /// Size of the partition in bytes
    pub size: usize,
    /// The partition content, `size` bytes starting at `offset`
    pub data: Vec<u8>,
}

/// The partition layout described by the image's boot arguments, in
/// descriptor order
#[derive(Debug, Clone)]
pub struct PartitionTable {
    partitions: Vec<Partition>,
}

impl PartitionTable {
    /// Locates the partition table descriptor in `image`, parses it and
    /// extracts the content of every partition it describes.
    pub fn from_image(image: &[u8]) -> Result<PartitionTable, ParseError> {
        let descriptor = find_descriptor(image)?;

        trace!("Found partition table descriptor: {:?}", descriptor);

        let mut partitions = Vec::new();

        for entry in descriptor.split(',') {
            let (name, offset, size) = parse_entry(entry)?;

            // A range that runs past the end of the image means the table is
            // inconsistent with the image, not that the partition is shorter
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= image.len())
                .ok_or_else(|| ParseError::EntryOutOfBounds {
                    name: name.clone(),
                    offset,
                    size,
                    image_size: image.len(),
                })?;

            partitions.push(Partition {
                name,
                offset,
                size,
                data: image[offset..end].to_vec(),
            });
        }

        Ok(PartitionTable { partitions })
    }

    /// Returns the partitions in descriptor order.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Returns the number of partitions in the table.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

impl fmt::Display for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Partition    Offset   Size ")?;
        write!(f, "---------------------------")?;

        for partition in &self.partitions {
            write!(
                f,
                "\n{:<10}   {:06X}   {:>4}K",
                partition.name,
                partition.offset,
                partition.size / 1024
            )?;
        }

        Ok(())
    }
}

/// Scans `image` for the partition table descriptor and returns its text
/// without the prefix and the terminating null byte.
///
/// An image can carry several descriptor strings; only the one that contains
/// the parent table marker is accepted, the rest are skipped.
fn find_descriptor(image: &[u8]) -> Result<&str, ParseError> {
    let mut start = 0;

    while let Some(pos) = find(&image[start..], DESCRIPTOR_PREFIX) {
        let text_start = start + pos + DESCRIPTOR_PREFIX.len();

        // The descriptor runs up to the first null byte
        if let Some(len) = image[text_start..].iter().position(|&b| b == 0) {
            if let Ok(text) = str::from_utf8(&image[text_start..text_start + len]) {
                if text.contains(PARENT_TABLE_MARKER) {
                    return Ok(text);
                }
            }
        }

        start = text_start;
    }

    Err(ParseError::DescriptorNotFound)
}

/// Returns the position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parses a single `<sizeKiB>K@0x<offset>(<name>)` descriptor entry into its
/// name, byte offset and byte size.
fn parse_entry(entry: &str) -> Result<(String, usize, usize), ParseError> {
    let malformed = || ParseError::MalformedEntry(entry.to_string());

    let (size_kib, rest) = entry.split_once("K@0x").ok_or_else(malformed)?;
    let (offset_hex, rest) = rest.split_once('(').ok_or_else(malformed)?;
    let name = rest.strip_suffix(')').ok_or_else(malformed)?;

    if name.is_empty() || name.contains('(') || name.contains(')') {
        return Err(malformed());
    }

    // The descriptor gives the size as a decimal number of KiB
    let size = size_kib
        .parse::<usize>()
        .ok()
        .and_then(|kib| kib.checked_mul(1024))
        .ok_or_else(malformed)?;

    let offset = usize::from_str_radix(offset_hex, 16).map_err(|_| malformed())?;

    Ok((name.to_string(), offset, size))
}

#[cfg(test)]
mod tests {
    use assert_hex::*;
    use hex_literal::hex;

    use super::*;

    const DESCRIPTOR: &[u8] =
        b"mtdparts=spi0.0:256K@0x00020000(BOOT),2048K@0x00060000(KERNEL2),64K@0x00260000(ENV)\0";

    /// Returns a blank 2.5 MiB image with `descriptor` spliced in at `at`
    fn image_with_descriptor(descriptor: &[u8], at: usize) -> Vec<u8> {
        let mut image = vec![0u8; 0x280000];

        image[at..at + descriptor.len()].copy_from_slice(descriptor);

        image
    }

    #[test]
    fn it_should_parse_partition_table() {
        let image = image_with_descriptor(DESCRIPTOR, 0x1000);
        let table = PartitionTable::from_image(&image).unwrap();

        let summary: Vec<(&str, usize, usize)> = table
            .partitions()
            .iter()
            .map(|p| (p.name.as_str(), p.offset, p.size))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("BOOT", 0x20000, 256 * 1024),
                ("KERNEL2", 0x60000, 2048 * 1024),
                ("ENV", 0x260000, 64 * 1024),
            ]
        );
    }

    #[test]
    fn it_should_extract_partition_data() {
        let mut image = image_with_descriptor(DESCRIPTOR, 0x1000);
        image[0x20000..0x20004].copy_from_slice(&hex!("DE AD BE EF"));

        let table = PartitionTable::from_image(&image).unwrap();
        let boot = &table.partitions()[0];

        assert_eq!(boot.data.len(), boot.size);
        assert_eq_hex!(&boot.data[..4], &hex!("DE AD BE EF"));
        assert_eq!(&boot.data[..], &image[0x20000..0x60000]);
    }

    #[test]
    fn it_should_reject_image_without_descriptor() {
        let image = vec![0u8; 0x1000];
        let err = PartitionTable::from_image(&image).unwrap_err();

        assert!(matches!(err, ParseError::DescriptorNotFound));
    }

    #[test]
    fn it_should_reject_descriptor_without_parent_marker() {
        let image =
            image_with_descriptor(b"mtdparts=spi0.0:256K@0x00020000(BOOT)\0", 0x1000);
        let err = PartitionTable::from_image(&image).unwrap_err();

        assert!(matches!(err, ParseError::DescriptorNotFound));
    }

    #[test]
    fn it_should_skip_child_tables_without_parent_marker() {
        // A child-only table precedes the parent table in the image
        let mut image = image_with_descriptor(DESCRIPTOR, 0x1000);
        let child = b"mtdparts=spi0.0:64K@0x00000000(BOOTA)\0";
        image[0x100..0x100 + child.len()].copy_from_slice(child);

        let table = PartitionTable::from_image(&image).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.partitions()[1].name, "KERNEL2");
    }

    #[test]
    fn it_should_reject_malformed_entry() {
        let descriptor =
            b"mtdparts=spi0.0:256K@0x00020000(BOOT),bogus,64K@0x00260000(KERNEL2)\0";
        let image = image_with_descriptor(descriptor, 0x1000);
        let err = PartitionTable::from_image(&image).unwrap_err();

        assert!(matches!(err, ParseError::MalformedEntry(ref entry) if entry == "bogus"));
    }

    #[test]
    fn it_should_reject_entry_exceeding_image_bounds() {
        // 0x260000 + 2 MiB runs past the end of the 2.5 MiB image
        let descriptor =
            b"mtdparts=spi0.0:256K@0x00020000(KERNEL2),2048K@0x00260000(DATA)\0";
        let image = image_with_descriptor(descriptor, 0x1000);
        let err = PartitionTable::from_image(&image).unwrap_err();

        assert!(matches!(err, ParseError::EntryOutOfBounds { ref name, .. } if name == "DATA"));
    }

    #[test]
    fn it_should_render_partition_table_report() {
        let image = image_with_descriptor(DESCRIPTOR, 0x1000);
        let table = PartitionTable::from_image(&image).unwrap();

        let expected = "Partition    Offset   Size \n\
                        ---------------------------\n\
                        BOOT         020000    256K\n\
                        KERNEL2      060000   2048K\n\
                        ENV          260000     64K";

        assert_eq!(table.to_string(), expected);
    }

    #[test]
    fn it_should_parse_entry_fields() {
        let (name, offset, size) = parse_entry("2048K@0x00060000(KERNEL2)").unwrap();

        assert_eq!(name, "KERNEL2");
        assert_eq!(offset, 0x60000);
        assert_eq!(size, 2048 * 1024);
    }

    #[test]
    fn it_should_reject_entry_with_empty_name() {
        let err = parse_entry("64K@0x00260000()").unwrap_err();

        assert!(matches!(err, ParseError::MalformedEntry(_)));
    }

    #[test]
    fn it_should_reject_entry_with_decimal_size_offset_swapped() {
        let err = parse_entry("0x60000K@256(ENV)").unwrap_err();

        assert!(matches!(err, ParseError::MalformedEntry(_)));
    }
}
