use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};
use vclink_utils::truncate_utf8;

/// Version History:
/// 1: Initial layout, position only
/// 2: Add front vector and visibility token cell
pub const PROTOCOL_VERSION: u32 = 2;

pub static LINK_MAGIC: &[u8; 4] = b"VCLK";

/// Fixed widths of the string cells inside a record, in bytes.
pub const NAME_CELL: usize = 32;
pub const WORLD_CELL: usize = 32;
pub const TOKEN_CELL: usize = 40;

/// Encoded size of one identity record. The encoded fields occupy 147 bytes;
/// the rest is zero padding so that the trailing stamp stays 8-aligned.
pub const RECORD_SIZE: usize = 152;

const ENCODED_FIELDS_SIZE: usize = 16 + (1 + NAME_CELL) + 12 + 12 + (1 + WORLD_CELL) + (1 + TOKEN_CELL);

pub type DecodeResult<T> = io::Result<T>;

/// One identity as it appears in the link region: who, where, and the
/// visibility token the voice client partitions audio by.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub id: u128,
    pub name: String,
    pub pos: [f32; 3],
    pub front: [f32; 3],
    pub world: String,
    pub token: String,
}

pub trait RecordEncoderExt {
    fn write_uuid(&mut self, uuid: u128);
    fn write_vec3(&mut self, val: [f32; 3]);
    fn write_str_cell(&mut self, cell: usize, val: &str);
}

impl RecordEncoderExt for Vec<u8> {
    fn write_uuid(&mut self, uuid: u128) {
        self.extend_from_slice(&uuid.to_le_bytes());
    }

    fn write_vec3(&mut self, val: [f32; 3]) {
        for component in val {
            self.extend_from_slice(&component.to_le_bytes());
        }
    }

    /// Writes a length byte followed by a fixed-width, zero-padded UTF-8
    /// cell. Values longer than the cell are truncated on a char boundary.
    fn write_str_cell(&mut self, cell: usize, val: &str) {
        let bytes = truncate_utf8(val, cell).as_bytes();
        self.push(bytes.len() as u8);
        self.extend_from_slice(bytes);
        self.resize(self.len() + cell - bytes.len(), 0);
    }
}

pub trait RecordDecoderExt: Read {
    fn read_uuid(&mut self) -> DecodeResult<u128> {
        self.read_u128::<LittleEndian>()
    }

    fn read_vec3(&mut self) -> DecodeResult<[f32; 3]> {
        let mut val = [0.0; 3];
        for component in &mut val {
            *component = self.read_f32::<LittleEndian>()?;
        }
        Ok(val)
    }

    fn read_str_cell(&mut self, cell: usize) -> DecodeResult<String> {
        let len = self.read_u8()? as usize;
        let mut buf = vec![0; cell];
        self.read_exact(&mut buf)?;
        if len > cell {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "string cell length exceeds cell width",
            ));
        }
        buf.truncate(len);
        String::from_utf8(buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "string cell is not UTF-8"))
    }
}

impl<R: Read> RecordDecoderExt for R {}

impl LinkRecord {
    /// Appends exactly `RECORD_SIZE` bytes to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.write_uuid(self.id);
        buf.write_str_cell(NAME_CELL, &self.name);
        buf.write_vec3(self.pos);
        buf.write_vec3(self.front);
        buf.write_str_cell(WORLD_CELL, &self.world);
        buf.write_str_cell(TOKEN_CELL, &self.token);
        buf.resize(start + RECORD_SIZE, 0);
    }

    pub fn decode<R: Read>(reader: &mut R) -> DecodeResult<LinkRecord> {
        let record = LinkRecord {
            id: reader.read_uuid()?,
            name: reader.read_str_cell(NAME_CELL)?,
            pos: reader.read_vec3()?,
            front: reader.read_vec3()?,
            world: reader.read_str_cell(WORLD_CELL)?,
            token: reader.read_str_cell(TOKEN_CELL)?,
        };
        let mut padding = [0; RECORD_SIZE - ENCODED_FIELDS_SIZE];
        reader.read_exact(&mut padding)?;
        Ok(record)
    }
}
