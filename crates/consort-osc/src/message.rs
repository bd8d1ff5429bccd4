//! OSC 1.0 wire codec.
//!
//! Messages carry a path, a type-tag string and positionally typed
//! arguments. Everything is big-endian and padded to four bytes. Over TCP
//! each packet is preceded by its length as a big-endian `u32`.

use crate::{OscError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest packet accepted from a stream.
pub const MAX_PACKET_SIZE: usize = 1 << 20;

const BUNDLE_TAG: &[u8] = b"#bundle\0";

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Blob(Vec<u8>),
    /// Port id, status, data1, data2.
    Midi([u8; 4]),
}

impl OscArg {
    pub fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Long(_) => 'h',
            OscArg::Float(_) => 'f',
            OscArg::Double(_) => 'd',
            OscArg::Str(_) => 's',
            OscArg::Blob(_) => 'b',
            OscArg::Midi(_) => 'm',
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<i64> for OscArg {
    fn from(v: i64) -> Self {
        OscArg::Long(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<f64> for OscArg {
    fn from(v: f64) -> Self {
        OscArg::Double(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        OscArg::Str(v)
    }
}

impl From<Vec<u8>> for OscArg {
    fn from(v: Vec<u8>) -> Self {
        OscArg::Blob(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub path: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OscArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The type-tag string without the leading comma.
    pub fn types(&self) -> String {
        self.args.iter().map(OscArg::tag).collect()
    }

    /// Reject the message unless its arguments match `expected`. Single and
    /// double floats are accepted for each other.
    pub fn expect(&self, expected: &str) -> Result<()> {
        let matches = self.args.len() == expected.len()
            && self
                .args
                .iter()
                .zip(expected.chars())
                .all(|(arg, want)| match (arg.tag(), want) {
                    ('f', 'd') | ('d', 'f') => true,
                    (got, want) => got == want,
                });
        if matches {
            Ok(())
        } else {
            Err(OscError::ArgumentMismatch {
                path: self.path.clone(),
                expected: expected.to_string(),
                got: self.types(),
            })
        }
    }

    fn mismatch(&self, index: usize, want: char) -> OscError {
        OscError::ArgumentMismatch {
            path: self.path.clone(),
            expected: format!("'{}' at {}", want, index),
            got: self.types(),
        }
    }

    pub fn int(&self, index: usize) -> Result<i32> {
        match self.args.get(index) {
            Some(OscArg::Int(v)) => Ok(*v),
            _ => Err(self.mismatch(index, 'i')),
        }
    }

    pub fn long(&self, index: usize) -> Result<i64> {
        match self.args.get(index) {
            Some(OscArg::Long(v)) => Ok(*v),
            Some(OscArg::Int(v)) => Ok(*v as i64),
            _ => Err(self.mismatch(index, 'h')),
        }
    }

    pub fn float(&self, index: usize) -> Result<f32> {
        self.double(index).map(|v| v as f32)
    }

    pub fn double(&self, index: usize) -> Result<f64> {
        match self.args.get(index) {
            Some(OscArg::Double(v)) => Ok(*v),
            Some(OscArg::Float(v)) => Ok(*v as f64),
            _ => Err(self.mismatch(index, 'd')),
        }
    }

    pub fn str(&self, index: usize) -> Result<&str> {
        match self.args.get(index) {
            Some(OscArg::Str(v)) => Ok(v),
            _ => Err(self.mismatch(index, 's')),
        }
    }

    pub fn blob(&self, index: usize) -> Result<&[u8]> {
        match self.args.get(index) {
            Some(OscArg::Blob(v)) => Ok(v),
            _ => Err(self.mismatch(index, 'b')),
        }
    }

    pub fn midi(&self, index: usize) -> Result<[u8; 4]> {
        match self.args.get(index) {
            Some(OscArg::Midi(v)) => Ok(*v),
            _ => Err(self.mismatch(index, 'm')),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.path.len() + 8 + self.args.len() * 8);
        write_string(&mut out, &self.path);
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::tag));
        write_string(&mut out, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Str(v) => write_string(&mut out, v),
                OscArg::Blob(v) => {
                    out.extend_from_slice(&(v.len() as i32).to_be_bytes());
                    out.extend_from_slice(v);
                    pad(&mut out);
                }
                OscArg::Midi(v) => out.extend_from_slice(v),
            }
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader { data, pos: 0 };
        let path = reader.string()?;
        if !path.starts_with('/') {
            return Err(OscError::Decode(format!("path '{}' must start with '/'", path)));
        }
        // Old implementations omit the type tags of argument-less messages.
        if reader.is_empty() {
            return Ok(Self::new(path));
        }
        let tags = reader.string()?;
        let tags = tags
            .strip_prefix(',')
            .ok_or_else(|| OscError::Decode(format!("type tags '{}' must start with ','", tags)))?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => OscArg::Int(i32::from_be_bytes(reader.array()?)),
                'h' => OscArg::Long(i64::from_be_bytes(reader.array()?)),
                'f' => OscArg::Float(f32::from_be_bytes(reader.array()?)),
                'd' => OscArg::Double(f64::from_be_bytes(reader.array()?)),
                's' => OscArg::Str(reader.string()?),
                'b' => {
                    let len = i32::from_be_bytes(reader.array()?);
                    let len = usize::try_from(len)
                        .map_err(|_| OscError::Decode(format!("negative blob size {}", len)))?;
                    let blob = reader.take(len)?.to_vec();
                    reader.align()?;
                    OscArg::Blob(blob)
                }
                'm' => OscArg::Midi(reader.array()?),
                other => {
                    return Err(OscError::Decode(format!("unsupported type tag '{}'", other)));
                }
            };
            args.push(arg);
        }
        Ok(Self { path, args })
    }
}

/// Decode a datagram: a single message or a (possibly nested) bundle.
/// Time tags are ignored; bundled messages are delivered immediately.
pub fn decode_packet(data: &[u8]) -> Result<Vec<OscMessage>> {
    let mut messages = Vec::new();
    decode_into(data, &mut messages, 0)?;
    Ok(messages)
}

fn decode_into(data: &[u8], out: &mut Vec<OscMessage>, depth: usize) -> Result<()> {
    if !data.starts_with(BUNDLE_TAG) {
        out.push(OscMessage::decode(data)?);
        return Ok(());
    }
    if depth > 8 {
        return Err(OscError::Decode("bundles nested too deeply".into()));
    }
    let mut reader = Reader { data, pos: 0 };
    reader.take(BUNDLE_TAG.len() + 8)?;
    while !reader.is_empty() {
        let len = i32::from_be_bytes(reader.array()?);
        let len = usize::try_from(len)
            .map_err(|_| OscError::Decode(format!("negative bundle element size {}", len)))?;
        decode_into(reader.take(len)?, out, depth + 1)?;
    }
    Ok(())
}

/// Wrap messages into one bundle with the "immediately" time tag.
pub fn encode_bundle(messages: &[OscMessage]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(BUNDLE_TAG);
    out.extend_from_slice(&1u64.to_be_bytes());
    for message in messages {
        let data = message.encode();
        out.extend_from_slice(&(data.len() as i32).to_be_bytes());
        out.extend_from_slice(&data);
    }
    out
}

/// Write one length-prefixed packet.
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, packet: &[u8]) -> Result<()> {
    stream.write_u32(packet.len() as u32).await?;
    stream.write_all(packet).await?;
    Ok(())
}

/// Read one length-prefixed packet.
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>> {
    let len = stream.read_u32().await? as usize;
    if len > MAX_PACKET_SIZE {
        return Err(OscError::Decode(format!("frame of {} bytes exceeds limit", len)));
    }
    let mut data = vec![0u8; len];
    stream.read_exact(&mut data).await?;
    Ok(data)
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    pad(out);
}

fn pad(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| OscError::Decode(format!("truncated packet at byte {}", self.pos)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn align(&mut self) -> Result<()> {
        let rem = self.pos % 4;
        if rem != 0 {
            self.take(4 - rem)?;
        }
        Ok(())
    }

    fn string(&mut self) -> Result<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| OscError::Decode("unterminated string".into()))?;
        let s = std::str::from_utf8(&rest[..len])
            .map_err(|e| OscError::Decode(format!("invalid UTF-8: {}", e)))?
            .to_string();
        self.take(len + 1)?;
        self.align()?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        // "/a" + NUL + pad, ",i" + NUL + pad, 1
        let encoded = OscMessage::new("/a").arg(1).encode();
        assert_eq!(
            encoded,
            [b'/', b'a', 0, 0, b',', b'i', 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(encoded.len() % 4, 0);
    }

    #[test]
    fn test_all_types_decode() {
        let message = OscMessage::new("/Consort/03/set_custom_data")
            .arg(7)
            .arg(-2i64)
            .arg(0.5f32)
            .arg(0.25f64)
            .arg("key")
            .arg(vec![1u8, 2, 3])
            .arg(OscArg::Midi([0, 0x90, 60, 100]));
        let decoded = OscMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.types(), "ihfdsbm");
    }

    #[test]
    fn test_expect_and_accessors() {
        let message = OscMessage::new("/x").arg(3).arg(0.5f32);
        assert!(message.expect("id").is_ok());
        assert!(message.expect("if").is_ok());
        assert!(message.expect("i").is_err());
        assert!(message.expect("sd").is_err());
        assert_eq!(message.double(1).unwrap(), 0.5);
        assert!(message.str(0).is_err());
        assert!(message.int(5).is_err());
    }

    #[test]
    fn test_malformed_input() {
        assert!(OscMessage::decode(b"").is_err());
        assert!(OscMessage::decode(b"noslash\0").is_err());
        assert!(OscMessage::decode(b"/a\0\0,i\0\0\0\0").is_err());
        assert!(OscMessage::decode(b"/a\0\0,X\0\0").is_err());
        // Blob claims more bytes than present.
        assert!(OscMessage::decode(b"/a\0\0,b\0\0\0\0\0\x10ab").is_err());
    }

    #[test]
    fn test_missing_type_tags() {
        let decoded = OscMessage::decode(b"/exit\0\0\0").unwrap();
        assert_eq!(decoded.path, "/exit");
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn test_bundle() {
        let a = OscMessage::new("/a").arg(1);
        let b = OscMessage::new("/b").arg("x");
        let packet = encode_bundle(&[a.clone(), b.clone()]);
        assert_eq!(decode_packet(&packet).unwrap(), vec![a.clone(), b]);
        assert_eq!(decode_packet(&a.encode()).unwrap(), vec![a]);
    }

    #[test]
    fn test_frame_round_trip() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let packet = OscMessage::new("/a").arg(1).encode();
            let mut wire = Vec::new();
            write_frame(&mut wire, &packet).await.unwrap();
            assert_eq!(&wire[..4], &(packet.len() as u32).to_be_bytes());
            let read = read_frame(&mut wire.as_slice()).await.unwrap();
            assert_eq!(read, packet);
        });
    }
}
