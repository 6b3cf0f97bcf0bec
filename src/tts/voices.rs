//! Voice bank loader.
//!
//! `voices-v1.0.bin` is a NumPy NPZ archive: a ZIP whose members are `.npy`
//! files, one per voice. Each array is float32 with shape `(510, 1, 256)`,
//! one style vector per possible token count.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

use ndarray::{Array2, ArrayView1};
use zip::ZipArchive;

use super::EngineError;

#[derive(Debug)]
pub struct VoiceBank {
    styles: HashMap<String, Array2<f32>>,
}

impl VoiceBank {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, EngineError> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| EngineError::Load(format!("Voice bank is not a valid archive: {}", e)))?;

        let mut styles = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| EngineError::Load(format!("Failed to read voice entry: {}", e)))?;
            let name = entry.name().trim_end_matches(".npy").to_string();

            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;

            let (shape, data) = parse_npy(&buf)
                .map_err(|e| EngineError::Load(format!("Voice '{}': {}", name, e)))?;

            // Collapse (rows, 1, dim) and similar into rows x dim
            let rows = shape.first().copied().unwrap_or(0);
            let dim = shape
                .iter()
                .skip(1)
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .ok_or_else(|| EngineError::Load(format!("Voice '{}': shape too large", name)))?;
            let matrix = Array2::from_shape_vec((rows, dim), data)
                .map_err(|e| EngineError::Load(format!("Voice '{}': {}", name, e)))?;

            styles.insert(name, matrix);
        }

        if styles.is_empty() {
            return Err(EngineError::Load("Voice bank contains no voices".into()));
        }

        Ok(Self { styles })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.styles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.styles.contains_key(voice)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Style vector for an utterance of `token_count` tokens, clamped to the
    /// last row.
    pub fn style(&self, voice: &str, token_count: usize) -> Option<ArrayView1<'_, f32>> {
        let matrix = self.styles.get(voice)?;
        let rows = matrix.nrows();
        if rows == 0 {
            return None;
        }
        Some(matrix.row(token_count.min(rows - 1)))
    }
}

/// Parse a raw `.npy` buffer holding C-ordered float32 data.
pub fn parse_npy(data: &[u8]) -> Result<(Vec<usize>, Vec<f32>), String> {
    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        return Err("not a valid NPY file (bad magic)".into());
    }

    let (header_len, header_start) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        2 | 3 => {
            if data.len() < 12 {
                return Err("NPY header truncated".into());
            }
            (
                u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
                12,
            )
        }
        v => return Err(format!("unsupported NPY version {}", v)),
    };

    let header_end = header_start + header_len;
    if data.len() < header_end {
        return Err("NPY header truncated".into());
    }
    let header = std::str::from_utf8(&data[header_start..header_end])
        .map_err(|_| "NPY header is not valid UTF-8".to_string())?;

    let descr = header_field(header, "descr").ok_or("NPY header missing 'descr'")?;
    let big_endian = match descr {
        "<f4" | "=f4" | "|f4" => false,
        ">f4" => true,
        other => return Err(format!("unsupported dtype '{}'", other)),
    };

    if header_field(header, "fortran_order") == Some("True") {
        return Err("Fortran-order arrays are not supported".into());
    }

    let shape_str = header_field(header, "shape").ok_or("NPY header missing 'shape'")?;
    let shape = shape_str
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().map_err(|_| format!("bad shape dim '{}'", t)))
        .collect::<Result<Vec<_>, _>>()?;

    let byte_len = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .and_then(|count| count.checked_mul(4))
        .ok_or_else(|| format!("NPY shape {:?} is too large", shape))?;
    let body = &data[header_end..];
    if body.len() < byte_len {
        return Err(format!(
            "NPY data too short: expected {} bytes, got {}",
            byte_len,
            body.len()
        ));
    }

    let values = body[..byte_len]
        .chunks_exact(4)
        .map(|b| {
            let bytes = [b[0], b[1], b[2], b[3]];
            if big_endian {
                f32::from_be_bytes(bytes)
            } else {
                f32::from_le_bytes(bytes)
            }
        })
        .collect();

    Ok((shape, values))
}

/// Pull one value out of the Python dict literal in an NPY header.
fn header_field<'a>(header: &'a str, field: &str) -> Option<&'a str> {
    let key = format!("'{}':", field);
    let start = header.find(&key)? + key.len();
    let rest = header[start..].trim_start();

    if rest.starts_with('(') {
        let end = rest.find(')')?;
        Some(&rest[..=end])
    } else if let Some(quoted) = rest.strip_prefix('\'') {
        let end = quoted.find('\'')?;
        Some(&quoted[..end])
    } else {
        let end = rest.find([',', '}']).unwrap_or(rest.len());
        Some(rest[..end].trim())
    }
}
