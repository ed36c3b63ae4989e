//! Voice bank for the KittenTTS model.
//!
//! `voices.npz` is a ZIP of `.npy` members, one float32 style matrix per
//! voice (`[rows, style_dim]`, C order).  Only what those files use is
//! supported: NPY v1/v2 headers, `f4` dtype, C order.

use std::{collections::BTreeMap, io::Read, path::Path};

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipArchive;

static RE_DESCR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"]descr['"]\s*:\s*['"]([^'"]+)['"]"#).unwrap());
static RE_FORTRAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]fortran_order['"]\s*:\s*(True|False)"#).unwrap());
static RE_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"]shape['"]\s*:\s*\(([^)]*)\)"#).unwrap());

/// One voice: a row-major `[rows, cols]` matrix of style vectors.
#[derive(Debug, Clone)]
pub struct StyleMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl StyleMatrix {
    pub fn from_shape(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let (rows, cols) = match shape {
            [n] => (1, *n),
            [r, c] => (*r, *c),
            [r, 1, c] => (*r, *c),
            other => bail!("unsupported style matrix shape {:?}", other),
        };
        if rows * cols != data.len() || rows == 0 {
            bail!("style matrix {rows}x{cols} does not match {} values", data.len());
        }
        Ok(Self { rows, cols, data })
    }

    /// Style row for a text of `len` bytes, clamped to the last row.
    pub fn row_for(&self, len: usize) -> &[f32] {
        let i = len.min(self.rows - 1);
        &self.data[i * self.cols..(i + 1) * self.cols]
    }
}

/// All voices of a model, by NPZ member name.
#[derive(Debug, Clone, Default)]
pub struct VoiceBank {
    voices: BTreeMap<String, StyleMatrix>,
}

impl VoiceBank {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open NPZ file: {}", path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("Cannot open ZIP archive: {}", path.display()))?;

        let mut voices = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).context("Failed to read ZIP entry")?;
            let name = entry.name().trim_end_matches(".npy").to_string();
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf).context("Failed to read NPY entry")?;

            let (shape, data) =
                parse_npy(&buf).with_context(|| format!("Bad NPY entry '{}'", name))?;
            let matrix = StyleMatrix::from_shape(&shape, data)
                .with_context(|| format!("Bad voice '{}'", name))?;
            voices.insert(name, matrix);
        }
        tracing::debug!(count = voices.len(), "voice bank loaded");
        Ok(Self { voices })
    }

    pub fn get(&self, name: &str) -> Option<&StyleMatrix> {
        self.voices.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.voices.keys().map(String::as_str)
    }
}

/// Decode a float32 `.npy` buffer into `(shape, values)`.
pub fn parse_npy(bytes: &[u8]) -> Result<(Vec<usize>, Vec<f32>)> {
    if bytes.len() < 10 || &bytes[..6] != b"\x93NUMPY" {
        bail!("Not a valid NPY file (bad magic)");
    }
    let (header_len, start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => {
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        v => bail!("Unsupported NPY version {}", v),
    };
    let end = start + header_len;
    let header = bytes
        .get(start..end)
        .context("NPY file truncated in header")
        .and_then(|h| std::str::from_utf8(h).context("NPY header is not valid UTF-8"))?;

    let descr = RE_DESCR
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .context("NPY header missing 'descr'")?;
    let big_endian = match descr {
        "<f4" | "=f4" | "|f4" => false,
        ">f4" => true,
        other => bail!("Unsupported dtype '{}'; only float32 is supported", other),
    };
    if RE_FORTRAN.captures(header).is_some_and(|c| &c[1] == "True") {
        bail!("Fortran-order arrays are not supported");
    }
    let shape: Vec<usize> = RE_SHAPE
        .captures(header)
        .context("NPY header missing 'shape'")?[1]
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().with_context(|| format!("Bad shape dim '{}'", t)))
        .collect::<Result<_>>()?;

    let count: usize = shape.iter().product();
    let body = bytes
        .get(end..end + count * 4)
        .with_context(|| format!("NPY data section shorter than {} floats", count))?;
    let values = body
        .chunks_exact(4)
        .map(|b| {
            let b = [b[0], b[1], b[2], b[3]];
            if big_endian { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }
        })
        .collect();
    Ok((shape, values))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn npy(shape: &str, values: &[f32]) -> Vec<u8> {
        let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {shape}, }}");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut buf = b"\x93NUMPY\x01\x00".to_vec();
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    #[test]
    fn test_parse_2d() {
        let values: Vec<f32> = (0..6).map(|x| x as f32).collect();
        let (shape, data) = parse_npy(&npy("(2, 3)", &values)).unwrap();
        assert_eq!(shape, vec![2, 3]);
        assert_eq!(data, values);
    }

    #[test]
    fn test_rejects_other_dtypes() {
        let mut buf = npy("(1,)", &[1.0]);
        let pos = buf.windows(3).position(|w| w == b"<f4").unwrap();
        buf[pos + 1] = b'i';
        assert!(parse_npy(&buf).is_err());
        assert!(parse_npy(b"NOTANPY").is_err());
    }

    #[test]
    fn test_style_row_clamped() {
        let m = StyleMatrix::from_shape(&[2, 3], (0..6).map(|x| x as f32).collect()).unwrap();
        assert_eq!(m.row_for(0), &[0.0, 1.0, 2.0]);
        assert_eq!(m.row_for(1), &[3.0, 4.0, 5.0]);
        assert_eq!(m.row_for(500), &[3.0, 4.0, 5.0]);
        assert!(StyleMatrix::from_shape(&[2, 3], vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_open_npz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voices.npz");
        {
            let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
            let opts = zip::write::SimpleFileOptions::default();
            zip.start_file("expr-voice-2-f.npy", opts).unwrap();
            zip.write_all(&npy("(2, 2)", &[0.1, 0.2, 0.3, 0.4])).unwrap();
            zip.finish().unwrap();
        }
        let bank = VoiceBank::open(&path).unwrap();
        assert_eq!(bank.names().collect::<Vec<_>>(), vec!["expr-voice-2-f"]);
        assert_eq!(bank.get("expr-voice-2-f").unwrap().row_for(1), &[0.3, 0.4]);
    }
}
