// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

/// Largest number of arguments accepted in a single request.
pub const MAX_ARGS: usize = 1024 * 1024;

/// A length line (`*<n>` or `$<n>`) may not grow past this without a CRLF.
const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("Protocol error: expected '{expected}', got '{actual}'")]
    UnexpectedByte { expected: char, actual: char },
    #[error("Protocol error: invalid multibulk length")]
    InvalidMultibulkLength,
    #[error("Protocol error: invalid bulk length")]
    InvalidBulkLength,
    #[error("Protocol error: expected CRLF after bulk data")]
    MissingCrlf,
    #[error("Protocol error: too big count string")]
    LineTooLong,
    #[error("Protocol error: frame exceeds {0} bytes")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors raised by the socket rather than by the bytes the client sent.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

/// Incremental parser for client requests. Clients send commands as an array of bulk strings:
///
/// `*<argc>\r\n` followed by `argc` times `$<len>\r\n<bytes>\r\n`.
///
/// Every argument is split off the read buffer as soon as it is complete and kept here until the
/// rest of the request arrives. A request trickling in over many reads is therefore scanned once.
#[derive(Debug, Clone)]
pub struct RequestParser {
    max_frame_size: usize,
    pending: Option<PendingRequest>,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    argc: usize,
    args: Vec<Frame>,
    /// Length of the argument whose header was read but whose data is still arriving.
    bulk_len: Option<usize>,
    /// Bytes of this request already taken off the read buffer.
    consumed: usize,
}

impl RequestParser {
    /// Requests, and single arguments, larger than `max_frame_size` bytes are rejected.
    pub fn new(max_frame_size: usize) -> RequestParser {
        RequestParser {
            max_frame_size,
            pending: None,
        }
    }

    /// Whether part of a request was consumed and the rest is still missing.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the next request off the front of `src`. `Ok(None)` means more bytes are needed.
    pub fn parse(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let mut pending = match self.pending.take() {
            Some(pending) => pending,
            None => match take_length(
                src,
                DataType::Array,
                MAX_ARGS,
                Error::InvalidMultibulkLength,
            )? {
                Some((argc, header_len)) => PendingRequest {
                    argc,
                    // Do not trust `argc` for the allocation, the arguments may never arrive.
                    args: Vec::with_capacity(argc.min(16)),
                    bulk_len: None,
                    consumed: header_len,
                },
                None => return self.incomplete(None, src),
            },
        };

        while pending.args.len() < pending.argc {
            let len = match pending.bulk_len {
                Some(len) => len,
                None => match take_length(
                    src,
                    DataType::BulkString,
                    self.max_frame_size,
                    Error::InvalidBulkLength,
                )? {
                    Some((len, header_len)) => {
                        pending.consumed += header_len;
                        pending.bulk_len = Some(len);
                        len
                    }
                    None => return self.incomplete(Some(pending), src),
                },
            };

            let needed = len
                .checked_add(CRLF.len())
                .ok_or(Error::InvalidBulkLength)?;
            if src.len() < needed {
                return self.incomplete(Some(pending), src);
            }
            if &src[len..needed] != CRLF {
                return Err(Error::MissingCrlf);
            }

            let data = src.split_to(len).freeze();
            src.advance(CRLF.len());

            pending.consumed += needed;
            pending.bulk_len = None;
            pending.args.push(Frame::Bulk(data));
        }

        Ok(Some(Frame::Array(pending.args)))
    }

    /// Keeps the partial request for the next call, unless the client already sent more than a
    /// frame may hold.
    fn incomplete(
        &mut self,
        pending: Option<PendingRequest>,
        src: &BytesMut,
    ) -> Result<Option<Frame>, Error> {
        let consumed = pending.as_ref().map_or(0, |pending| pending.consumed);
        if consumed.saturating_add(src.len()) > self.max_frame_size {
            return Err(Error::FrameTooLarge(self.max_frame_size));
        }

        self.pending = pending;
        Ok(None)
    }
}

impl Frame {
    /// Appends the RESP2 encoding of the frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(u8::from(DataType::SimpleString));
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Error(s) => {
                dst.put_u8(u8::from(DataType::SimpleError));
                dst.put_slice(s.as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Integer(i) => {
                dst.put_u8(u8::from(DataType::Integer));
                dst.put_slice(i.to_string().as_bytes());
                dst.put_slice(CRLF);
            }
            Frame::Bulk(bytes) => {
                dst.reserve(bytes.len() + 16);
                dst.put_u8(u8::from(DataType::BulkString));
                dst.put_slice(bytes.len().to_string().as_bytes());
                dst.put_slice(CRLF);
                dst.put_slice(bytes);
                dst.put_slice(CRLF);
            }
            // RESP2 null bulk string.
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(arr) => {
                dst.put_u8(u8::from(DataType::Array));
                dst.put_slice(arr.len().to_string().as_bytes());
                dst.put_slice(CRLF);
                for frame in arr {
                    frame.write_to(dst);
                }
            }
        }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

/// Returns the bytes up to the next CRLF and moves the cursor past it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();
    let rest = &buf[start..];

    let line_len = match rest.windows(2).position(|window| window == CRLF) {
        Some(len) => len,
        None if rest.len() > MAX_LINE_LENGTH => return Err(Error::LineTooLong),
        None => return Err(Error::Incomplete),
    };

    if line_len > MAX_LINE_LENGTH {
        return Err(Error::LineTooLong);
    }

    src.set_position((start + line_len + CRLF.len()) as u64);

    Ok(&rest[..line_len])
}

/// Removes a `<type><n>\r\n` header from the front of `src`. Returns `n` and the header size, or
/// `None` while the line is incomplete. Values above `max` are rejected with `invalid`.
fn take_length(
    src: &mut BytesMut,
    data_type: DataType,
    max: usize,
    invalid: Error,
) -> Result<Option<(usize, usize)>, Error> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };
    expect_data_type(first, data_type)?;

    let mut cursor = Cursor::new(&src[1..]);
    let len = match get_line(&mut cursor) {
        Ok(line) => parse_length(line).filter(|len| *len <= max).ok_or(invalid)?,
        Err(Error::Incomplete) => return Ok(None),
        Err(err) => return Err(err),
    };

    let header_len = 1 + cursor.position() as usize;
    src.advance(header_len);

    Ok(Some((len, header_len)))
}

/// Lengths are non-negative decimal integers. Anything else, `-1` included, is rejected.
fn parse_length(line: &[u8]) -> Option<usize> {
    std::str::from_utf8(line).ok()?.parse::<usize>().ok()
}

fn expect_data_type(byte: u8, expected: DataType) -> Result<(), Error> {
    let expected = u8::from(expected);
    if byte != expected {
        return Err(Error::UnexpectedByte {
            expected: expected as char,
            actual: byte as char,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_BULK: usize = 512 * 1024 * 1024;

    fn parse(data: &[u8]) -> Result<Frame, Error> {
        let mut buf = BytesMut::from(data);
        RequestParser::new(MAX_BULK)
            .parse(&mut buf)?
            .ok_or(Error::Incomplete)
    }

    #[test]
    fn parse_array_frame() {
        let mut buf = BytesMut::from(&b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n"[..]);

        let frame = RequestParser::new(MAX_BULK).parse(&mut buf).unwrap();

        assert_eq!(
            frame,
            Some(Frame::Array(vec![
                Frame::Bulk(Bytes::from("hello")),
                Frame::Bulk(Bytes::from("world")),
            ]))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn parse_array_frame_empty() {
        let frame = parse(b"*0\r\n");

        assert!(matches!(frame, Ok(Frame::Array(ref a)) if a.is_empty()));
    }

    #[test]
    fn parse_bulk_string_frame_empty() {
        let frame = parse(b"*2\r\n$3\r\nGET\r\n$0\r\n\r\n").unwrap();

        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("GET")),
                Frame::Bulk(Bytes::new()),
            ])
        );
    }

    #[test]
    fn parse_bulk_string_is_binary_safe() {
        let frame = parse(b"*1\r\n$6\r\na\r\nb\0c\r\n").unwrap();

        assert_eq!(
            frame,
            Frame::Array(vec![Frame::Bulk(Bytes::from_static(b"a\r\nb\0c"))])
        );
    }

    #[test]
    fn parse_leaves_trailing_frames_in_place() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n"[..]);

        RequestParser::new(MAX_BULK).parse(&mut buf).unwrap();

        assert_eq!(&buf[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn parse_incomplete_frames() {
        let data = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";

        for end in 0..data.len() {
            let result = parse(&data[..end]);
            assert!(
                matches!(result, Err(Error::Incomplete)),
                "prefix of length {} should be incomplete, got {:?}",
                end,
                result
            );
        }
    }

    #[test]
    fn parse_negative_bulk_length() {
        let result = parse(b"*2\r\n$3\r\nGET\r\n$-1\r\n");

        assert!(matches!(result, Err(Error::InvalidBulkLength)));
    }

    #[test]
    fn parse_negative_multibulk_length() {
        assert!(matches!(
            parse(b"*-1\r\n"),
            Err(Error::InvalidMultibulkLength)
        ));
        assert!(matches!(
            parse(b"*-5\r\n$3\r\nGET\r\n"),
            Err(Error::InvalidMultibulkLength)
        ));
    }

    #[test]
    fn parse_malformed_lengths() {
        assert!(matches!(
            parse(b"*two\r\n"),
            Err(Error::InvalidMultibulkLength)
        ));
        assert!(matches!(
            parse(b"*1\r\n$3x\r\nfoo\r\n"),
            Err(Error::InvalidBulkLength)
        ));
        assert!(matches!(parse(b"*\r\n"), Err(Error::InvalidMultibulkLength)));
    }

    #[test]
    fn parse_multibulk_length_above_limit() {
        let data = format!("*{}\r\n", MAX_ARGS + 1);

        assert!(matches!(
            parse(data.as_bytes()),
            Err(Error::InvalidMultibulkLength)
        ));
    }

    #[test]
    fn parse_bulk_length_above_limit() {
        let mut buf = BytesMut::from(&b"*1\r\n$11\r\nhello world\r\n"[..]);

        let result = RequestParser::new(10).parse(&mut buf);

        assert!(matches!(result, Err(Error::InvalidBulkLength)));
    }

    #[test]
    fn parse_unexpected_data_type() {
        let result = parse(b"+OK\r\n");
        assert!(matches!(
            result,
            Err(Error::UnexpectedByte {
                expected: '*',
                actual: '+'
            })
        ));

        let result = parse(b"*1\r\n:1\r\n");
        assert!(matches!(
            result,
            Err(Error::UnexpectedByte {
                expected: '$',
                actual: ':'
            })
        ));
    }

    #[test]
    fn parse_missing_crlf_after_bulk() {
        let result = parse(b"*1\r\n$3\r\nfooXY");

        assert!(matches!(result, Err(Error::MissingCrlf)));
    }

    #[test]
    fn parse_line_too_long() {
        let mut data = b"*1\r\n$".to_vec();
        data.extend(std::iter::repeat(b'1').take(MAX_LINE_LENGTH + 1));

        assert!(matches!(parse(&data), Err(Error::LineTooLong)));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::InvalidBulkLength.to_string(),
            "Protocol error: invalid bulk length"
        );
        assert_eq!(
            Error::UnexpectedByte {
                expected: '$',
                actual: ':'
            }
            .to_string(),
            "Protocol error: expected '$', got ':'"
        );
    }

    #[test]
    fn parse_resumes_where_it_stopped() {
        let mut parser = RequestParser::new(MAX_BULK);
        let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$3\r\nfo"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert!(parser.is_pending());
        // Complete arguments and headers are taken off the buffer.
        assert_eq!(&buf[..], b"fo");

        buf.extend_from_slice(b"o\r\n$3\r\nbar\r\n");
        let frame = parser.parse(&mut buf).unwrap();

        assert_eq!(
            frame,
            Some(Frame::Array(vec![
                Frame::Bulk(Bytes::from("SET")),
                Frame::Bulk(Bytes::from("foo")),
                Frame::Bulk(Bytes::from("bar")),
            ]))
        );
        assert!(!parser.is_pending());
        assert!(buf.is_empty());
    }

    #[test]
    fn parse_waits_for_whole_bulk() {
        let mut parser = RequestParser::new(MAX_BULK);
        let mut buf = BytesMut::from(&b"*1\r\n$10\r\n0123"[..]);

        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        // Partial bulk data stays in the buffer until all of it arrived.
        assert_eq!(&buf[..], b"0123");

        buf.extend_from_slice(b"456789\r\n");

        assert_eq!(
            parser.parse(&mut buf).unwrap(),
            Some(Frame::Array(vec![Frame::Bulk(Bytes::from("0123456789"))]))
        );
    }

    #[test]
    fn parse_many_arguments_in_small_chunks() {
        let args = (0..10_000)
            .map(|i| Frame::Bulk(Bytes::from(format!("key:{}", i))))
            .collect::<Vec<_>>();
        let wire = Frame::Array(args.clone()).serialize();

        let mut parser = RequestParser::new(MAX_BULK);
        let mut buf = BytesMut::new();
        let mut frames = vec![];
        for chunk in wire.chunks(64) {
            buf.extend_from_slice(chunk);
            // Nothing but the unfinished tail of a header or argument is ever left behind.
            if let Some(frame) = parser.parse(&mut buf).unwrap() {
                frames.push(frame);
            }
            assert!(buf.len() < 64 + 16);
        }

        assert_eq!(frames, vec![Frame::Array(args)]);
    }

    #[test]
    fn parse_frame_too_large() {
        let mut parser = RequestParser::new(24);
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$10\r\nab"[..]);

        // 20 bytes so far, the argument alone fits.
        assert_eq!(parser.parse(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"cdefgh");
        let result = parser.parse(&mut buf);

        assert!(matches!(result, Err(Error::FrameTooLarge(24))));
    }

    #[test]
    fn parse_bulk_length_overflow() {
        let mut parser = RequestParser::new(usize::MAX);
        let mut buf = BytesMut::from(format!("*1\r\n${}\r\nabc", usize::MAX).as_bytes());

        let result = parser.parse(&mut buf);

        assert!(matches!(result, Err(Error::InvalidBulkLength)));
    }

    #[test]
    fn serialize_frames() {
        assert_eq!(Frame::Simple("OK".to_string()).serialize(), "+OK\r\n");
        assert_eq!(
            Frame::Error("ERR unknown command 'foo'".to_string()).serialize(),
            "-ERR unknown command 'foo'\r\n"
        );
        assert_eq!(Frame::Integer(3).serialize(), ":3\r\n");
        assert_eq!(Frame::Integer(-7).serialize(), ":-7\r\n");
        assert_eq!(Frame::Bulk(Bytes::from("bar")).serialize(), "$3\r\nbar\r\n");
        assert_eq!(Frame::Bulk(Bytes::new()).serialize(), "$0\r\n\r\n");
        assert_eq!(Frame::Null.serialize(), "$-1\r\n");
        assert_eq!(Frame::Array(vec![]).serialize(), "*0\r\n");
        assert_eq!(
            Frame::Array(vec![Frame::Integer(1), Frame::Null]).serialize(),
            "*2\r\n:1\r\n$-1\r\n"
        );
    }

    #[test]
    fn parse_serialized_request() {
        let request = Frame::Array(vec![
            Frame::Bulk(Bytes::from("SET")),
            Frame::Bulk(Bytes::from("foo")),
            Frame::Bulk(Bytes::from("bar")),
        ]);
        let bytes = request.serialize();

        assert_eq!(parse(&bytes).unwrap(), request);
    }
}
