//! Cross-platform reader for iRacing .ibt telemetry files
//!
//! An .ibt file is a fixed header, a table of variable headers, the session
//! info YAML and then one fixed-size record per tick. Records are read one at
//! a time; variables are decoded on demand from the raw record bytes.

use anyhow::{bail, Context, Result};
use lapfuel_core::units::Kilometers;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const HEADER_LEN: usize = 48;
const VAR_BUF_OFFSET: u64 = 48;
const DISK_HEADER_OFFSET: u64 = 112;
const VAR_HEADER_LEN: usize = 144;

// ============================================================================
// Binary format types
// ============================================================================

/// Variable data types in .ibt files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Char = 0,
    Bool = 1,
    Int = 2,
    BitField = 3,
    Float = 4,
    Double = 5,
}

impl VarType {
    fn from_i32(val: i32) -> Result<Self> {
        Ok(match val {
            0 => VarType::Char,
            1 => VarType::Bool,
            2 => VarType::Int,
            3 => VarType::BitField,
            4 => VarType::Float,
            5 => VarType::Double,
            _ => bail!("Unknown variable type: {}", val),
        })
    }

    /// Size in bytes for a single element of this type
    fn element_size(self) -> usize {
        match self {
            VarType::Char | VarType::Bool => 1,
            VarType::Int | VarType::BitField | VarType::Float => 4,
            VarType::Double => 8,
        }
    }
}

/// A decoded variable value
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Int(i32),
    Float(f32),
    Double(f64),
    Bool(bool),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
}

impl VarValue {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            VarValue::Int(v) => Some(*v),
            VarValue::Bool(v) => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VarValue::Float(v) => Some(*v as f64),
            VarValue::Double(v) => Some(*v),
            VarValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Element `index` of an integer array
    pub fn int_at(&self, index: usize) -> Option<i32> {
        match self {
            VarValue::IntArray(values) => values.get(index).copied(),
            _ => None,
        }
    }
}

/// Main .ibt file header (48 bytes at offset 0)
#[derive(Debug, Clone)]
pub struct IbtHeader {
    pub ver: i32,
    pub tick_rate: i32,
    pub session_info_len: i32,
    pub session_info_offset: i32,
    pub num_vars: i32,
    pub var_header_offset: i32,
    pub buf_len: i32,
}

/// A single variable header (144 bytes each)
#[derive(Debug, Clone)]
pub struct VarHeader {
    pub var_type: VarType,
    pub offset: usize,
    pub count: usize,
    pub name: String,
    pub unit: String,
}

impl VarHeader {
    fn decode(&self, record: &[u8]) -> Option<VarValue> {
        let size = self.var_type.element_size();
        let bytes = record.get(self.offset..self.offset + size * self.count)?;
        let word = |i: usize| -> Option<[u8; 4]> { bytes.get(i * 4..i * 4 + 4)?.try_into().ok() };

        if self.count > 1 {
            return match self.var_type {
                VarType::Int | VarType::BitField => (0..self.count)
                    .map(|i| word(i).map(i32::from_le_bytes))
                    .collect::<Option<Vec<_>>>()
                    .map(VarValue::IntArray),
                VarType::Float => (0..self.count)
                    .map(|i| word(i).map(f32::from_le_bytes))
                    .collect::<Option<Vec<_>>>()
                    .map(VarValue::FloatArray),
                _ => None,
            };
        }

        match self.var_type {
            VarType::Char | VarType::Bool => Some(VarValue::Bool(bytes[0] != 0)),
            VarType::Int | VarType::BitField => word(0).map(|w| VarValue::Int(i32::from_le_bytes(w))),
            VarType::Float => word(0).map(|w| VarValue::Float(f32::from_le_bytes(w))),
            VarType::Double => bytes
                .get(0..8)?
                .try_into()
                .ok()
                .map(|w| VarValue::Double(f64::from_le_bytes(w))),
        }
    }
}

// ============================================================================
// Session info parsed from YAML
// ============================================================================

/// Static session values pulled from the session info YAML
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IbtSessionInfo {
    pub track_name: String,
    pub track_length: Option<Kilometers>,
    pub track_id: Option<i64>,
    pub driver_car_idx: Option<usize>,
    /// `CarIdx` -> `CarID` for every driver entry
    pub car_ids: HashMap<usize, i64>,
}

impl IbtSessionInfo {
    /// Line-based extraction of the few keys the fuel engine needs
    pub fn from_yaml(yaml: &str) -> Self {
        let mut info = IbtSessionInfo::default();
        let mut entry_idx: Option<usize> = None;

        for line in yaml.lines() {
            let trimmed = line.trim().trim_start_matches("- ");

            if let Some(val) = yaml_value(trimmed, "TrackName:") {
                info.track_name = val.to_string();
            } else if let Some(val) = yaml_value(trimmed, "TrackLength:") {
                info.track_length = Kilometers::parse(val);
            } else if let Some(val) = yaml_value(trimmed, "TrackID:") {
                info.track_id = val.parse().ok();
            } else if let Some(val) = yaml_value(trimmed, "DriverCarIdx:") {
                info.driver_car_idx = val.parse().ok();
            } else if let Some(val) = yaml_value(trimmed, "CarIdx:") {
                entry_idx = val.parse().ok();
            } else if let Some(val) = yaml_value(trimmed, "CarID:") {
                if let (Some(idx), Ok(id)) = (entry_idx, val.parse()) {
                    info.car_ids.entry(idx).or_insert(id);
                }
            }
        }

        info
    }
}

fn yaml_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key).map(str::trim)
}

// ============================================================================
// IbtFile
// ============================================================================

/// Parsed .ibt file handle for reading telemetry records
pub struct IbtFile<R> {
    reader: R,
    header: IbtHeader,
    vars: Vec<VarHeader>,
    session_info: IbtSessionInfo,
    sample_data_offset: u64,
    record_count: usize,
}

impl IbtFile<BufReader<File>> {
    /// Open and parse an .ibt file from disk.
    /// Reads headers and session info, but does NOT load records into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open .ibt file: {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> IbtFile<R> {
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;

        reader.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_LEN];
        reader.read_exact(&mut buf).context("Truncated .ibt header")?;
        let header = IbtHeader {
            ver: le_i32(&buf, 0)?,
            tick_rate: le_i32(&buf, 8)?,
            session_info_len: le_i32(&buf, 16)?,
            session_info_offset: le_i32(&buf, 20)?,
            num_vars: le_i32(&buf, 24)?,
            var_header_offset: le_i32(&buf, 28)?,
            buf_len: le_i32(&buf, 36)?,
        };
        if header.buf_len <= 0 || header.num_vars < 0 {
            bail!(
                "Invalid .ibt header (buf_len {}, num_vars {})",
                header.buf_len,
                header.num_vars
            );
        }

        reader.seek(SeekFrom::Start(VAR_BUF_OFFSET))?;
        let mut var_buf = [0u8; 16];
        reader.read_exact(&mut var_buf)?;
        let sample_data_offset = le_i32(&var_buf, 4)? as u64;

        reader.seek(SeekFrom::Start(DISK_HEADER_OFFSET))?;
        let mut disk = [0u8; 32];
        reader.read_exact(&mut disk)?;
        let declared_records = le_i32(&disk, 28)?.max(0) as usize;
        let available_records =
            (file_size.saturating_sub(sample_data_offset) / header.buf_len as u64) as usize;
        // Files from an interrupted session carry a zero record count
        let record_count = if declared_records == 0 {
            available_records
        } else {
            declared_records.min(available_records)
        };

        reader.seek(SeekFrom::Start(header.var_header_offset as u64))?;
        let vars = (0..header.num_vars as usize)
            .map(|i| {
                read_var_header(&mut reader)
                    .with_context(|| format!("Failed to read variable header {}", i))
            })
            .collect::<Result<Vec<_>>>()?;

        reader.seek(SeekFrom::Start(header.session_info_offset as u64))?;
        let mut yaml = vec![0u8; header.session_info_len.max(0) as usize];
        reader.read_exact(&mut yaml).context("Truncated session info")?;
        let session_info = IbtSessionInfo::from_yaml(&null_terminated(&yaml));

        Ok(IbtFile {
            reader,
            header,
            vars,
            session_info,
            sample_data_offset,
            record_count,
        })
    }

    pub fn header(&self) -> &IbtHeader {
        &self.header
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn tick_rate(&self) -> u32 {
        self.header.tick_rate.max(0) as u32
    }

    pub fn session_info(&self) -> &IbtSessionInfo {
        &self.session_info
    }

    pub fn var(&self, name: &str) -> Option<&VarHeader> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Read the raw bytes of record `index`
    pub fn read_record(&mut self, index: usize) -> Result<Record> {
        if index >= self.record_count {
            bail!(
                "Record index {} out of range (0..{})",
                index,
                self.record_count
            );
        }
        let buf_len = self.header.buf_len as u64;
        self.reader
            .seek(SeekFrom::Start(self.sample_data_offset + index as u64 * buf_len))?;
        let mut data = vec![0u8; buf_len as usize];
        self.reader.read_exact(&mut data)?;
        Ok(Record { data })
    }
}

/// One tick of raw telemetry
#[derive(Debug, Clone)]
pub struct Record {
    data: Vec<u8>,
}

impl Record {
    pub fn get(&self, var: &VarHeader) -> Option<VarValue> {
        var.decode(&self.data)
    }
}

// ============================================================================
// Binary reading helpers
// ============================================================================

fn le_i32(buf: &[u8], offset: usize) -> Result<i32> {
    Ok(i32::from_le_bytes(buf[offset..offset + 4].try_into()?))
}

fn null_terminated(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).to_string()
}

fn read_var_header<R: Read>(reader: &mut R) -> Result<VarHeader> {
    let mut buf = [0u8; VAR_HEADER_LEN];
    reader.read_exact(&mut buf)?;
    Ok(VarHeader {
        var_type: VarType::from_i32(le_i32(&buf, 0)?)?,
        offset: le_i32(&buf, 4)?.max(0) as usize,
        count: le_i32(&buf, 8)?.max(1) as usize,
        name: null_terminated(&buf[16..48]),
        unit: null_terminated(&buf[112..144]),
    })
}

/// Builder for small synthetic .ibt files used in tests
#[cfg(test)]
pub(crate) mod fixture {
    use super::*;

    pub struct Var {
        pub name: &'static str,
        pub var_type: VarType,
        pub count: usize,
    }

    pub fn var(name: &'static str, var_type: VarType, count: usize) -> Var {
        Var {
            name,
            var_type,
            count,
        }
    }

    /// Lay out `vars` back to back and write one record per entry of `records`.
    /// Each record supplies raw little-endian bytes per variable, in order.
    pub fn build(vars: &[Var], yaml: &str, records: &[Vec<Vec<u8>>], declared_records: i32) -> Vec<u8> {
        let var_header_offset = 144usize;
        let session_info_offset = var_header_offset + vars.len() * VAR_HEADER_LEN;
        let session_info_len = yaml.len() + 1;
        let buf_offset = session_info_offset + session_info_len;
        let buf_len: usize = vars.iter().map(|v| v.var_type.element_size() * v.count).sum();

        let mut out = vec![0u8; buf_offset];
        let put = |out: &mut Vec<u8>, at: usize, v: i32| out[at..at + 4].copy_from_slice(&v.to_le_bytes());

        put(&mut out, 0, 2);
        put(&mut out, 8, 60);
        put(&mut out, 16, session_info_len as i32);
        put(&mut out, 20, session_info_offset as i32);
        put(&mut out, 24, vars.len() as i32);
        put(&mut out, 28, var_header_offset as i32);
        put(&mut out, 32, 1);
        put(&mut out, 36, buf_len as i32);
        put(&mut out, 52, buf_offset as i32);
        put(&mut out, 112 + 28, declared_records);

        let mut offset = 0usize;
        for (i, v) in vars.iter().enumerate() {
            let at = var_header_offset + i * VAR_HEADER_LEN;
            put(&mut out, at, v.var_type as i32);
            put(&mut out, at + 4, offset as i32);
            put(&mut out, at + 8, v.count as i32);
            out[at + 16..at + 16 + v.name.len()].copy_from_slice(v.name.as_bytes());
            offset += v.var_type.element_size() * v.count;
        }

        out[session_info_offset..session_info_offset + yaml.len()].copy_from_slice(yaml.as_bytes());

        for record in records {
            for bytes in record {
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    pub fn int(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    pub fn float(v: f32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    pub fn ints(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}
