use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint, Limit},
    decode_from_slice, encode_to_vec,
};
use thiserror::Error;

use super::{Request, Response};

/// Largest payload accepted in a single frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const HEADER_LEN: usize = size_of::<u32>();

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("frame carried {trailing} unread bytes after the message")]
    TrailingBytes { trailing: usize },
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the peer sent something unintelligible while the stream itself
    /// is still usable.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            TransportError::Deserialize(_)
                | TransportError::FrameTooLarge(_)
                | TransportError::TrailingBytes { .. }
        )
    }
}

/// Unit exchanged on the wire; either side may send either kind, so a
/// misdirected message still decodes and can be rejected by type.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// Bidirectional stream that can be split into independently owned halves.
pub trait Connection: Read + Write + Send + Sized + 'static {
    fn try_clone(&self) -> io::Result<Self>;

    fn shutdown(&self, how: Shutdown) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }
}

pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: Configuration<BigEndian, Fixint, Limit<MAX_FRAME_LEN>>,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding()
            .with_limit::<MAX_FRAME_LEN>();
        Self { stream, config }
    }

    pub fn stream(&self) -> &T {
        &self.stream
    }

    pub fn write_request(&mut self, req: Request) -> Result<(), TransportError> {
        self.write_message(&Message::Request(req))
    }

    pub fn write_response(&mut self, resp: Response) -> Result<(), TransportError> {
        self.write_message(&Message::Response(resp))
    }

    pub fn write_message(&mut self, message: &Message) -> Result<(), TransportError> {
        let payload = encode_to_vec(message, self.config)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(payload.len()));
        }

        // Length fits: MAX_FRAME_LEN is well below u32::MAX.
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);

        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Reads one frame. Oversized frames are skipped in full so the next read
    /// starts on a frame boundary.
    pub fn read_message(&mut self) -> Result<Message, TransportError> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header) as usize;

        if len > MAX_FRAME_LEN {
            let skipped = io::copy(
                &mut Read::by_ref(&mut self.stream).take(len as u64),
                &mut io::sink(),
            )?;
            if (skipped as usize) < len {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            return Err(TransportError::FrameTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;

        let (message, read): (Message, usize) = decode_from_slice(&payload, self.config)?;
        if read != len {
            return Err(TransportError::TrailingBytes {
                trailing: len - read,
            });
        }
        Ok(message)
    }

    /// Consumes and discards everything the peer sends until it closes its end.
    pub fn drain_until_closed(&mut self) -> Result<u64, TransportError> {
        Ok(io::copy(&mut self.stream, &mut io::sink())?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use super::*;
    use crate::protocol::{CalculationRequest, ResponseCode};

    fn rewound(transport: &mut ProtocolTransport<Cursor<Vec<u8>>>) {
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
    }

    #[test]
    fn read_write_request() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport
            .write_request(Request::Calculation(CalculationRequest::new("2+2")))
            .unwrap();
        rewound(&mut transport);
        let req = transport.read_message().unwrap();
        assert_eq!(
            req,
            Message::Request(Request::Calculation(CalculationRequest::new("2+2")))
        );
    }

    #[test]
    fn nan_result_survives_the_wire() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport
            .write_response(Response::Calculation(crate::protocol::CalculationResponse {
                code: ResponseCode::Ok,
                result: f64::NAN,
                error: String::from("unexpected end of expression"),
            }))
            .unwrap();
        rewound(&mut transport);

        match transport.read_message().unwrap() {
            Message::Response(Response::Calculation(resp)) => {
                assert!(resp.result.is_nan());
                assert_eq!(resp.error, "unexpected end of expression");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn frames_are_length_prefixed() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport.write_request(Request::ConnectionTerminate).unwrap();
        let bytes = transport.stream.get_ref();
        let len = u32::from_be_bytes(bytes[..HEADER_LEN].try_into().unwrap()) as usize;
        assert_eq!(len, bytes.len() - HEADER_LEN);
    }

    #[test]
    fn garbage_payload_keeps_stream_in_sync() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);

        let mut valid = ProtocolTransport::new(Cursor::new(Vec::new()));
        valid.write_request(Request::ConnectionTerminate).unwrap();
        bytes.extend_from_slice(valid.stream.get_ref());

        let mut transport = ProtocolTransport::new(Cursor::new(bytes));
        let err = transport.read_message().unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(
            transport.read_message().unwrap(),
            Message::Request(Request::ConnectionTerminate)
        );
    }

    #[test]
    fn inflated_length_prefix_is_malformed() {
        // Establish request whose username claims 2^40 bytes.
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&(1u64 << 40).to_be_bytes());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&payload);

        let mut valid = ProtocolTransport::new(Cursor::new(Vec::new()));
        valid.write_request(Request::ConnectionTerminate).unwrap();
        bytes.extend_from_slice(valid.stream.get_ref());

        let mut transport = ProtocolTransport::new(Cursor::new(bytes));
        let err = transport.read_message().unwrap_err();
        assert!(matches!(err, TransportError::Deserialize(_)));
        assert!(err.is_malformed());
        assert_eq!(
            transport.read_message().unwrap(),
            Message::Request(Request::ConnectionTerminate)
        );
    }

    #[test]
    fn oversized_frame_is_skipped() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((MAX_FRAME_LEN + 1) as u32).to_be_bytes());
        bytes.extend(std::iter::repeat_n(0u8, MAX_FRAME_LEN + 1));

        let mut valid = ProtocolTransport::new(Cursor::new(Vec::new()));
        valid.write_request(Request::ConnectionTerminate).unwrap();
        bytes.extend_from_slice(valid.stream.get_ref());

        let mut transport = ProtocolTransport::new(Cursor::new(bytes));
        assert!(matches!(
            transport.read_message(),
            Err(TransportError::FrameTooLarge(_))
        ));
        assert_eq!(
            transport.read_message().unwrap(),
            Message::Request(Request::ConnectionTerminate)
        );
    }

    #[test]
    fn closed_stream_is_not_malformed() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()));
        let err = transport.read_message().unwrap_err();

        assert!(matches!(err, TransportError::Io(_)));
        assert!(!err.is_malformed());
    }
}
