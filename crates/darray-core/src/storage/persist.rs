// Storage persistence
//
// A storage is written as a self-describing record:
//
//   tag_len: u32 LE
//   tag:     [u8; tag_len]  (UTF-8, e.g. "DoubleArrayStorage")
//   count:   u64 LE         (number of elements)
//   data:    [u8; count * byte_count]  (raw little-endian elements)
//
// The tag selects the element kind on the way back in, so a reader does not
// need to know in advance what it is about to load. Unknown tags fail with
// `Error::UnknownStorageTag`; short input fails with `Error::Io`. Lengths
// read from the stream never size an allocation up front: the payload grows
// only as bytes actually arrive.

use std::io::{Read, Write};

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::simd::SimdConfig;

use super::{AnyStorage, Storage};

// Low-level IO helpers

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

// Longest tag any kind uses is well under this.
const MAX_TAG_LEN: usize = 64;

fn read_bytes(r: &mut impl Read, len: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

fn write_tag(w: &mut impl Write, tag: &str) -> std::io::Result<()> {
    write_u32(w, tag.len() as u32)?;
    w.write_all(tag.as_bytes())
}

fn read_tag(r: &mut impl Read) -> Result<String> {
    let len = read_u32(r)? as usize;
    if len > MAX_TAG_LEN {
        return Err(Error::UnknownStorageTag(format!("<{len}-byte tag>")));
    }
    let raw = read_bytes(r, len as u64)?;
    String::from_utf8(raw).map_err(|e| Error::UnknownStorageTag(format!("{:?}", e.as_bytes())))
}

impl<T: Element> Storage<T> {
    /// Serialize tag, length and elements.
    pub fn write_to(&self, w: &mut impl Write) -> Result<()> {
        let buf = self.read()?;
        let mut data = Vec::new();
        T::write_le(&buf, &mut data);

        write_tag(w, T::DTYPE.storage_tag())?;
        write_u64(w, buf.len() as u64)?;
        w.write_all(&data)?;
        log::debug!(
            "wrote {} storage of {} elements ({} bytes)",
            T::DTYPE,
            buf.len(),
            data.len()
        );
        Ok(())
    }

    /// Read a storage that must be of this element kind.
    pub fn read_from(r: &mut impl Read, simd: SimdConfig) -> Result<Storage<T>> {
        AnyStorage::read_from(r, simd)?.typed::<T>()
    }
}

impl AnyStorage {
    /// Serialize whichever kind this is.
    pub fn write_to(&self, w: &mut impl Write) -> Result<()> {
        match self {
            AnyStorage::Byte(s) => s.write_to(w),
            AnyStorage::Int(s) => s.write_to(w),
            AnyStorage::Float(s) => s.write_to(w),
            AnyStorage::Double(s) => s.write_to(w),
        }
    }

    /// Read a storage record, dispatching on its tag.
    pub fn read_from(r: &mut impl Read, simd: SimdConfig) -> Result<AnyStorage> {
        let tag = read_tag(r)?;
        let dtype = DType::from_storage_tag(&tag)?;
        let count = read_u64(r)?;
        let len = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(dtype.byte_count()))
            .ok_or_else(|| {
                Error::Malformed(format!("{} storage of {} elements is not addressable", dtype, count))
            })?;
        let bytes = read_bytes(r, len as u64)?;
        log::debug!("read {} storage of {} elements", dtype, count);

        Ok(match dtype {
            DType::Byte => decode::<i8>(&bytes, simd),
            DType::Int => decode::<i32>(&bytes, simd),
            DType::Float => decode::<f32>(&bytes, simd),
            DType::Double => decode::<f64>(&bytes, simd),
        })
    }
}

fn decode<T: Element>(bytes: &[u8], simd: SimdConfig) -> AnyStorage {
    Storage::from_vec(T::read_le(bytes), simd).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn simd() -> SimdConfig {
        SimdConfig::with_vector_bytes(16)
    }

    #[test]
    fn test_record_layout() {
        let s = Storage::<i8>::from_vec(vec![1, -1], simd());
        let mut out = Vec::new();
        s.write_to(&mut out).unwrap();

        let tag = b"ByteArrayStorage";
        assert_eq!(&out[..4], &(tag.len() as u32).to_le_bytes());
        assert_eq!(&out[4..4 + tag.len()], tag);
        assert_eq!(&out[4 + tag.len()..12 + tag.len()], &2u64.to_le_bytes());
        assert_eq!(&out[12 + tag.len()..], &[1u8, 0xff]);
    }

    #[test]
    fn test_every_kind_reads_back() {
        let mut out = Vec::new();
        Storage::<i8>::from_vec(vec![-3, 4], simd()).write_to(&mut out).unwrap();
        Storage::<i32>::from_vec(vec![i32::MIN, 7], simd()).write_to(&mut out).unwrap();
        Storage::<f32>::from_vec(vec![0.5, -1.25], simd()).write_to(&mut out).unwrap();
        Storage::<f64>::from_vec(vec![f64::MAX, 1e-300], simd()).write_to(&mut out).unwrap();

        let mut r = Cursor::new(out);
        assert_eq!(Storage::<i8>::read_from(&mut r, simd()).unwrap().to_vec().unwrap(), vec![-3, 4]);
        assert_eq!(
            Storage::<i32>::read_from(&mut r, simd()).unwrap().to_vec().unwrap(),
            vec![i32::MIN, 7]
        );
        assert_eq!(
            Storage::<f32>::read_from(&mut r, simd()).unwrap().to_vec().unwrap(),
            vec![0.5, -1.25]
        );
        let any = AnyStorage::read_from(&mut r, simd()).unwrap();
        assert_eq!(any.dtype(), DType::Double);
        assert_eq!(any.typed::<f64>().unwrap().to_vec().unwrap(), vec![f64::MAX, 1e-300]);
    }

    #[test]
    fn test_unknown_tag() {
        let mut out = Vec::new();
        write_tag(&mut out, "LongArrayStorage").unwrap();
        write_u64(&mut out, 0).unwrap();
        let err = AnyStorage::read_from(&mut Cursor::new(out), simd()).unwrap_err();
        assert!(matches!(err, Error::UnknownStorageTag(t) if t == "LongArrayStorage"));
    }

    #[test]
    fn test_kind_mismatch() {
        let mut out = Vec::new();
        Storage::<f32>::zeros(1, simd()).write_to(&mut out).unwrap();
        let err = Storage::<f64>::read_from(&mut Cursor::new(out), simd()).unwrap_err();
        assert!(matches!(
            err,
            Error::DTypeMismatch {
                expected: DType::Double,
                got: DType::Float
            }
        ));
    }

    #[test]
    fn test_unaddressable_count() {
        let mut out = Vec::new();
        write_tag(&mut out, DType::Double.storage_tag()).unwrap();
        write_u64(&mut out, u64::MAX / 4).unwrap();
        out.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            AnyStorage::read_from(&mut Cursor::new(out), simd()),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_count_beyond_input() {
        // a large claimed count with little data behind it fails on the data
        let mut out = Vec::new();
        write_tag(&mut out, DType::Int.storage_tag()).unwrap();
        write_u64(&mut out, 1 << 40).unwrap();
        out.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            AnyStorage::read_from(&mut Cursor::new(out), simd()),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn test_overlong_tag() {
        let mut out = Vec::new();
        write_u32(&mut out, u32::MAX).unwrap();
        out.extend_from_slice(b"DoubleArrayStorage");
        assert!(matches!(
            AnyStorage::read_from(&mut Cursor::new(out), simd()),
            Err(Error::UnknownStorageTag(_))
        ));
    }

    #[test]
    fn test_truncated_input() {
        let mut out = Vec::new();
        Storage::<f64>::from_vec(vec![1.0, 2.0], simd()).write_to(&mut out).unwrap();
        out.truncate(out.len() - 3);
        assert!(matches!(
            AnyStorage::read_from(&mut Cursor::new(out), simd()),
            Err(Error::Io(_))
        ));
    }
}
