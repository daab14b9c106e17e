//! Minimal NPZ / NPY reader for cached prompt bundles.
//!
//! Supports the subset of the NumPy array format the prompt exporter emits:
//!   - NPY format version 1.0 and 2.0
//!   - `float32` conditioning tensors (`<f4`, `=f4`)
//!   - `int64` bookkeeping arrays (`<i8`, `=i8`) — prefilled lengths, token counts
//!   - C-contiguous (row-major) layout
//!   - Arbitrary number of dimensions
//!
//! NPZ files are simply ZIP archives whose members are `.npy` files.
//! Each member name without its `.npy` extension is the array name.

use anyhow::{bail, Context, Result};
use std::{collections::HashMap, io::Read, path::Path};
use zip::ZipArchive;

/// Element storage of one array: float tensors hold model conditioning data,
/// int arrays hold generation bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub enum NpyData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

impl NpyData {
    pub fn len(&self) -> usize {
        match self {
            NpyData::F32(v) => v.len(),
            NpyData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A loaded NPZ entry: shape + flat data in row-major (C) order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: NpyData,
}

impl NpyArray {
    /// Flat f32 view, or an error when the array holds integers.
    pub fn as_f32(&self) -> Result<&[f32]> {
        match &self.data {
            NpyData::F32(v) => Ok(v),
            NpyData::I64(_) => bail!("expected a float32 array, found int64"),
        }
    }

    /// Flat i64 view, or an error when the array holds floats.
    pub fn as_i64(&self) -> Result<&[i64]> {
        match &self.data {
            NpyData::I64(v) => Ok(v),
            NpyData::F32(_) => bail!("expected an int64 array, found float32"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NPY header parser
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a raw `.npy` byte buffer into shape + typed flat data.
pub fn parse_npy(data: &[u8]) -> Result<NpyArray> {
    // Magic: 6 bytes "\x93NUMPY"
    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        bail!("Not a valid NPY file (bad magic)");
    }

    let major = data[6];
    let minor = data[7];

    // Header length: 2 bytes (v1) or 4 bytes (v2), little-endian.
    let (header_len, header_start) = match (major, minor) {
        (1, _) => {
            let len = u16::from_le_bytes([data[8], data[9]]) as usize;
            (len, 10)
        }
        (2, _) => {
            if data.len() < 12 {
                bail!("NPY v2 file too short");
            }
            let len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
            (len, 12)
        }
        _ => bail!("Unsupported NPY version {}.{}", major, minor),
    };

    let header_end = header_start + header_len;
    if data.len() < header_end {
        bail!("NPY file truncated in header");
    }
    let header = std::str::from_utf8(&data[header_start..header_end])
        .context("NPY header is not valid UTF-8")?;

    // Parse dtype
    let dtype = extract_header_field(header, "descr").context("NPY header missing 'descr'")?;
    let dtype = dtype.trim().trim_matches('\'').trim_matches('"');

    #[derive(Clone, Copy)]
    enum Elem {
        F32,
        I64,
    }
    let (elem, elem_size, big_endian) = match dtype {
        "<f4" | "=f4" | "|f4" => (Elem::F32, 4, false),
        ">f4" => (Elem::F32, 4, true),
        "<i8" | "=i8" | "|i8" => (Elem::I64, 8, false),
        ">i8" => (Elem::I64, 8, true),
        other => bail!(
            "Unsupported dtype '{}' — only float32 and int64 are supported",
            other
        ),
    };

    // Parse fortran_order
    let fortran = extract_header_field(header, "fortran_order")
        .unwrap_or("False")
        .trim()
        .to_ascii_lowercase();
    if fortran == "true" {
        bail!("Fortran-order arrays are not supported");
    }

    // Parse shape — e.g. "(256, 512, )" or "(100,)"
    let shape_str = extract_header_field(header, "shape").context("NPY header missing 'shape'")?;
    let shape = parse_shape(shape_str.trim())?;

    // Total number of elements
    let n_elements: usize = shape.iter().product();

    // Raw bytes start right after the header
    let data_bytes = &data[header_end..];
    if data_bytes.len() < n_elements * elem_size {
        bail!(
            "NPY data section too short: expected {} bytes, got {}",
            n_elements * elem_size,
            data_bytes.len()
        );
    }

    let payload = match elem {
        Elem::F32 => NpyData::F32(
            data_bytes[..n_elements * 4]
                .chunks_exact(4)
                .map(|b| {
                    let arr = [b[0], b[1], b[2], b[3]];
                    if big_endian {
                        f32::from_be_bytes(arr)
                    } else {
                        f32::from_le_bytes(arr)
                    }
                })
                .collect(),
        ),
        Elem::I64 => NpyData::I64(
            data_bytes[..n_elements * 8]
                .chunks_exact(8)
                .map(|b| {
                    let arr = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
                    if big_endian {
                        i64::from_be_bytes(arr)
                    } else {
                        i64::from_le_bytes(arr)
                    }
                })
                .collect(),
        ),
    };

    Ok(NpyArray {
        shape,
        data: payload,
    })
}

/// Extract the value of a field from a Python-literal dict header string.
///
/// e.g. `extract_header_field("{'descr': '<f4', 'shape': (3,)}", "descr")`
/// returns `Some("<f4")`.
fn extract_header_field<'a>(header: &'a str, field: &str) -> Option<&'a str> {
    // Look for `'field':` or `"field":`.
    let key_sq = format!("'{}':", field);
    let key_dq = format!("\"{}\":", field);

    let start = header
        .find(key_sq.as_str())
        .map(|p| p + key_sq.len())
        .or_else(|| header.find(key_dq.as_str()).map(|p| p + key_dq.len()))?;

    let rest = header[start..].trim_start();

    // Value is either a Python string (quoted), tuple (parentheses), or a bare word.
    if rest.starts_with('(') {
        // Tuple — find the matching closing paren
        let end = rest.find(')')?;
        Some(&rest[..end + 1])
    } else if rest.starts_with('\'') || rest.starts_with('"') {
        let quote = rest.chars().next()?;
        let inner = &rest[1..];
        let end = inner.find(quote)?;
        Some(&inner[..end])
    } else {
        // Bare value (True, False, or a number) — read until comma or }
        let end = rest.find([',', '}']).unwrap_or(rest.len());
        Some(rest[..end].trim())
    }
}

/// Parse a Python-style shape tuple like `(256, 512, )` or `(100,)` or `()`.
fn parse_shape(s: &str) -> Result<Vec<usize>> {
    let inner = s.trim_start_matches('(').trim_end_matches(')');
    if inner.trim().is_empty() {
        return Ok(vec![]);
    }
    inner
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<usize>()
                .with_context(|| format!("Bad shape dim: '{}'", t))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// NPZ loader — returns typed arrays per name
// ─────────────────────────────────────────────────────────────────────────────

/// Load an NPZ file and return all arrays indexed by name (`.npy` extension stripped).
pub fn load_npz(path: &Path) -> Result<HashMap<String, NpyArray>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open NPZ file: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Cannot open ZIP archive: {}", path.display()))?;

    let mut arrays = HashMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("Failed to read ZIP entry")?;
        let name = entry.name().trim_end_matches(".npy").to_string();

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .context("Failed to read NPY entry")?;

        let array =
            parse_npy(&buf).with_context(|| format!("Failed to parse NPY entry '{}'", name))?;

        arrays.insert(name, array);
    }

    Ok(arrays)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
