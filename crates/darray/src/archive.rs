// Archive — Save and load named arrays
//
// Binary archive format (.darr):
//
//   Header:
//     magic:   [u8; 4]  = b"DARR"
//     version: u32 LE   = 1
//     count:   u32 LE   = number of arrays
//
//   For each array:
//     key_len: u32 LE
//     key:     [u8; key_len]  (UTF-8)
//     order:   u8             (0=C, 1=F)
//     ndim:    u32 LE
//     dims:    [u32 LE; ndim]
//     storage: storage record (tag, element count, raw LE elements)
//
// Arrays are written as a dense copy in their own fast order (C for general
// strided views), so views are stored without the elements they do not
// reach. The element kind travels in the storage tag.
//
// Usage:
//   archive::save_arrays("arrays.darr", &named)?;
//   let named = archive::load_arrays("arrays.darr", &manager)?;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use darray_core::{AnyArray, AnyStorage, Error, Manager, Order, Result, Shape, StrideLayout};

// Constants

const MAGIC: &[u8; 4] = b"DARR";
const VERSION: u32 = 1;

// Order <-> u8 encoding

fn order_to_u8(order: Order) -> u8 {
    match order {
        Order::F => 1,
        _ => 0,
    }
}

fn u8_to_order(v: u8) -> Result<Order> {
    match v {
        0 => Ok(Order::C),
        1 => Ok(Order::F),
        _ => Err(Error::invalid(format!("unknown order tag: {v}"))),
    }
}

// Low-level IO helpers

fn write_u8(w: &mut impl Write, v: u8) -> std::io::Result<()> {
    w.write_all(&[v])
}

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u8(r: &mut impl Read) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(r: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bytes(r: &mut impl Read, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

fn to_u32(v: usize, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| Error::invalid(format!("{what} {v} does not fit the archive's u32 field")))
}

// Write archive

/// Write named arrays to a writer in the archive format.
pub fn write_archive(writer: &mut impl Write, arrays: &[(String, AnyArray)]) -> Result<()> {
    writer.write_all(MAGIC)?;
    write_u32(writer, VERSION)?;
    write_u32(writer, to_u32(arrays.len(), "array count")?)?;

    for (key, array) in arrays {
        let dense = array.copy(Order::Natural)?;
        let order = dense.layout().storage_fast_order().unwrap_or_default();

        write_u32(writer, to_u32(key.len(), "key length")?)?;
        writer.write_all(key.as_bytes())?;
        write_u8(writer, order_to_u8(order))?;

        let dims = dense.shape().dims();
        write_u32(writer, to_u32(dims.len(), "rank")?)?;
        for &d in dims {
            write_u32(writer, to_u32(d, "dimension")?)?;
        }
        dense.storage().write_to(writer)?;
        log::debug!("archived {:?}: {} {}", key, dense.dtype(), dense.shape());
    }
    Ok(())
}

/// Read named arrays from a reader in the archive format.
pub fn read_archive(reader: &mut impl Read, manager: &Manager) -> Result<Vec<(String, AnyArray)>> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::invalid(format!(
            "invalid archive: expected magic {:?}, got {:?}",
            MAGIC, magic
        )));
    }

    let version = read_u32(reader)?;
    if version != VERSION {
        return Err(Error::invalid(format!(
            "unsupported archive version: {} (expected {})",
            version, VERSION
        )));
    }

    // counts come from the stream, so nothing is pre-sized from them
    let count = read_u32(reader)?;
    let mut arrays = Vec::new();
    for _ in 0..count {
        let key_len = read_u32(reader)? as usize;
        let key = String::from_utf8(read_bytes(reader, key_len)?)
            .map_err(|e| Error::invalid(format!("invalid UTF-8 key: {e}")))?;
        let order = u8_to_order(read_u8(reader)?)?;

        let ndim = read_u32(reader)?;
        let mut dims = Vec::new();
        for _ in 0..ndim {
            dims.push(read_u32(reader)? as usize);
        }
        let shape = Shape::new(dims)?;

        let storage = AnyStorage::read_from(reader, manager.config().simd)?;
        if storage.len() != shape.size() {
            return Err(Error::invalid(format!(
                "array {:?}: storage holds {} elements, shape {} needs {}",
                key,
                storage.len(),
                shape,
                shape.size()
            )));
        }
        let array = AnyArray::from_storage(StrideLayout::dense(shape, 0, order), storage)?;
        arrays.push((key, array));
    }
    Ok(arrays)
}

// High-level API — save/load named arrays

/// Save named arrays to a file.
pub fn save_arrays(path: impl AsRef<Path>, arrays: &[(String, AnyArray)]) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_archive(&mut writer, arrays)?;
    writer.flush()?;
    Ok(())
}

/// Load named arrays from a file.
pub fn load_arrays(path: impl AsRef<Path>, manager: &Manager) -> Result<Vec<(String, AnyArray)>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    read_archive(&mut reader, manager)
}
