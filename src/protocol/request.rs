use bincode::{Decode, Encode};

use crate::Command;

/// Expression a client wants evaluated.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct CalculationRequest {
    pub expression: String,
}

impl CalculationRequest {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum Request {
    ConnectionEstablish { username: String },
    Calculation(CalculationRequest),
    ConnectionTerminate,
}

impl From<Command> for Request {
    fn from(value: Command) -> Self {
        match value {
            Command::Expression(expression) => {
                Request::Calculation(CalculationRequest { expression })
            }
            Command::Exit => Request::ConnectionTerminate,
        }
    }
}
