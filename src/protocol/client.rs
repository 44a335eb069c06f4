use std::{
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
};

use thiserror::Error;

use crate::Command;

use super::{
    CalculationRequest, CalculationResponse, Message, ProtocolTransport, Request, Response,
    ResponseCode, transport::TransportError,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server rejected the request")]
    BadRequest,

    #[error("unexpected reply from server: {0:?}")]
    Unexpected(Message),
}

/// Blocking client issuing one request at a time.
pub struct Client<T: Read + Write = TcpStream> {
    transport: ProtocolTransport<T>,
}

impl Client<TcpStream> {
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(address).map_err(TransportError::from)?;
        Ok(Self::new(stream))
    }
}

impl<T: Read + Write> Client<T> {
    pub fn new(stream: T) -> Self {
        Self {
            transport: ProtocolTransport::new(stream),
        }
    }

    pub fn establish(&mut self, username: &str) -> Result<ResponseCode, ClientError> {
        match self.exchange(Request::ConnectionEstablish {
            username: username.to_string(),
        })? {
            Response::ConnectionEstablish { code } => Ok(code),
            other => Err(ClientError::Unexpected(Message::Response(other))),
        }
    }

    pub fn calculate(&mut self, expression: &str) -> Result<CalculationResponse, ClientError> {
        match self.exchange(Request::Calculation(CalculationRequest::new(expression)))? {
            Response::Calculation(resp) => Ok(resp),
            Response::Generic {
                code: ResponseCode::BadRequest,
            } => Err(ClientError::BadRequest),
            other => Err(ClientError::Unexpected(Message::Response(other))),
        }
    }

    pub fn terminate(&mut self) -> Result<ResponseCode, ClientError> {
        match self.exchange(Request::ConnectionTerminate)? {
            Response::ConnectionTerminate { code } => Ok(code),
            other => Err(ClientError::Unexpected(Message::Response(other))),
        }
    }

    /// Sends whatever request `command` maps to and returns the raw reply.
    pub fn submit(&mut self, command: Command) -> Result<Response, ClientError> {
        self.exchange(command.into())
    }

    fn exchange(&mut self, request: Request) -> Result<Response, ClientError> {
        self.transport.write_request(request)?;
        match self.transport.read_message()? {
            Message::Response(response) => Ok(response),
            other => Err(ClientError::Unexpected(other)),
        }
    }
}
