// Minimal NumPy `.npy` reader and writer.
//
// Reference spectrograms are stored as `.npy` arrays, and the generator can
// save its winning matrix in the same format. Supported subset:
// - format versions 1.0, 2.0 and 3.0
// - little-endian `<f4` and `<f8` dtypes (read), `<f4` (write)
// - C (row-major) order only
//
// Layout: 6-byte magic `\x93NUMPY`, major/minor version bytes, a
// little-endian header length (u16 for v1, u32 for v2+), an ASCII Python
// dict literal padded with spaces and terminated by `\n`, then raw data.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{ErrorKind, Read, Write};
use thiserror::Error;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Longest header dict accepted. Real headers are well under a kilobyte.
const MAX_HEADER_LEN: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an .npy file (bad magic)")]
    BadMagic,
    #[error("unsupported .npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("malformed .npy header: {0}")]
    Header(String),
    #[error("unsupported dtype '{0}'")]
    UnsupportedDtype(String),
    #[error("Fortran-ordered arrays are not supported")]
    FortranOrder,
}

/// A decoded array, values widened or narrowed to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Value following `'key':` in the header dict, up to the next top-level
/// comma or closing brace.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let needle = format!("'{key}':");
    let start = header
        .find(&needle)
        .ok_or_else(|| NpyError::Header(format!("missing key '{key}'")))?
        + needle.len();
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find([',', '}'])
    }
    .ok_or_else(|| NpyError::Header(format!("unterminated value for '{key}'")))?;
    Ok(rest[..end].trim())
}

fn parse_header(text: &str) -> Result<Header, NpyError> {
    let descr = dict_value(text, "descr")?
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string();
    let fortran_order = match dict_value(text, "fortran_order")? {
        "True" => true,
        "False" => false,
        other => return Err(NpyError::Header(format!("bad fortran_order '{other}'"))),
    };
    let shape_text = dict_value(text, "shape")?;
    let inner = shape_text
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| NpyError::Header(format!("bad shape '{shape_text}'")))?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| NpyError::Header(format!("bad dimension '{s}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Header {
        descr,
        fortran_order,
        shape,
    })
}

/// Exactly `len` bytes from `reader`, or `UnexpectedEof` if it runs short.
fn read_exactly<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, NpyError> {
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(NpyError::Io(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, found {}", buf.len()),
        )));
    }
    Ok(buf)
}

/// Read an array from `reader`.
pub fn read_npy<R: Read>(reader: &mut R) -> Result<NpyArray, NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(NpyError::BadMagic);
    }
    let major = reader.read_u8()?;
    let minor = reader.read_u8()?;
    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };
    if header_len > MAX_HEADER_LEN {
        return Err(NpyError::Header(format!("header length {header_len} too large")));
    }
    let header_bytes = read_exactly(reader, header_len)?;
    let text = String::from_utf8(header_bytes)
        .map_err(|_| NpyError::Header("header is not valid text".to_string()))?;
    let header = parse_header(&text)?;
    if header.fortran_order {
        return Err(NpyError::FortranOrder);
    }

    let width = match header.descr.as_str() {
        "<f4" => 4,
        "<f8" => 8,
        other => return Err(NpyError::UnsupportedDtype(other.to_string())),
    };
    let too_large = || NpyError::Header(format!("shape {:?} too large", header.shape));
    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(too_large)?;
    let byte_len = count.checked_mul(width).ok_or_else(too_large)?;
    // Buffers grow with the bytes actually present, never with the header's claim.
    let payload = read_exactly(reader, byte_len)?;
    let data = if width == 4 {
        let mut data = vec![0f32; count];
        LittleEndian::read_f32_into(&payload, &mut data);
        data
    } else {
        let mut wide = vec![0f64; count];
        LittleEndian::read_f64_into(&payload, &mut wide);
        wide.into_iter().map(|v| v as f32).collect()
    };
    Ok(NpyArray {
        shape: header.shape,
        data,
    })
}

/// Write a C-ordered `<f4` array (format version 1.0).
pub fn write_npy<W: Write>(writer: &mut W, shape: &[usize], data: &[f32]) -> Result<(), NpyError> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(NpyError::Header(format!(
            "shape {shape:?} needs {expected} values, got {}",
            data.len()
        )));
    }
    let dims = match shape {
        [single] => format!("({single},)"),
        _ => {
            let parts: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    };
    let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {dims}, }}");
    // Magic + version + length prefix + header + '\n' is padded to 64 bytes.
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    writer.write_all(MAGIC)?;
    writer.write_u8(1)?;
    writer.write_u8(0)?;
    writer.write_u16::<LittleEndian>(header.len() as u16)?;
    writer.write_all(header.as_bytes())?;
    for &v in data {
        writer.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(descr: &str, fortran_order: &str, shape: &str) -> String {
        format!("{{'descr': '{descr}', 'fortran_order': {fortran_order}, 'shape': {shape}, }}\n")
    }

    fn v1_bytes(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.write_u16::<LittleEndian>(header.len() as u16).unwrap();
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn read(bytes: Vec<u8>) -> Result<NpyArray, NpyError> {
        read_npy(&mut Cursor::new(bytes))
    }

    #[test]
    fn test_write_then_read() {
        let data: Vec<f32> = (0..6).map(|i| i as f32 * 0.5).collect();
        let mut buf = Vec::new();
        write_npy(&mut buf, &[2, 3], &data).unwrap();
        // Header block is 64-byte aligned.
        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        let arr = read(buf).unwrap();
        assert_eq!(arr.shape, vec![2, 3]);
        assert_eq!(arr.data, data);
    }

    #[test]
    fn test_reads_f8() {
        let mut payload = Vec::new();
        for v in [1.5f64, -2.25] {
            payload.write_f64::<LittleEndian>(v).unwrap();
        }
        let arr = read(v1_bytes(&header("<f8", "False", "(2,)"), &payload)).unwrap();
        assert_eq!(arr.shape, vec![2]);
        assert_eq!(arr.data, vec![1.5, -2.25]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let err = read(b"NOTNPY00".to_vec()).unwrap_err();
        assert!(matches!(err, NpyError::BadMagic));

        let err = read(v1_bytes(&header("<i8", "False", "(1,)"), &[0; 8])).unwrap_err();
        assert!(matches!(err, NpyError::UnsupportedDtype(d) if d == "<i8"));

        let err = read(v1_bytes(&header("<f4", "True", "(1, 1)"), &[0; 4])).unwrap_err();
        assert!(matches!(err, NpyError::FortranOrder));

        // Truncated payload.
        let err = read(v1_bytes(&header("<f4", "False", "(4,)"), &[0; 4])).unwrap_err();
        assert!(matches!(err, NpyError::Io(_)));
    }

    #[test]
    fn test_oversized_shape_is_rejected_without_allocating() {
        // Element count overflows usize.
        let huge = header("<f4", "False", "(4611686018427387904, 8)");
        let err = read(v1_bytes(&huge, &[0; 16])).unwrap_err();
        assert!(matches!(err, NpyError::Header(_)));

        // Representable but far larger than the payload.
        let large = header("<f4", "False", "(1000000000000, 8)");
        let err = read(v1_bytes(&large, &[0; 16])).unwrap_err();
        assert!(matches!(err, NpyError::Io(_)));
    }

    #[test]
    fn test_oversized_header_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[2, 0]);
        bytes.write_u32::<LittleEndian>(u32::MAX).unwrap();
        assert!(matches!(read(bytes).unwrap_err(), NpyError::Header(_)));
    }

    #[test]
    fn test_shape_mismatch_on_write() {
        let mut buf = Vec::new();
        assert!(write_npy(&mut buf, &[2, 2], &[1.0]).is_err());
    }
}
