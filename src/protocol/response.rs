use bincode::{Decode, Encode};

use crate::eval::Evaluation;

#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    BadRequest,
}

/// Outcome of a single calculation.
///
/// `result` is NaN if and only if the expression could not be evaluated, in
/// which case `error` holds the diagnostic to show the user. Clients must tell
/// failures apart by the NaN, not by `code`.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct CalculationResponse {
    pub code: ResponseCode,
    pub result: f64,
    pub error: String,
}

impl CalculationResponse {
    pub fn is_failure(&self) -> bool {
        self.result.is_nan()
    }
}

impl From<Evaluation> for CalculationResponse {
    fn from(value: Evaluation) -> Self {
        Self {
            code: ResponseCode::Ok,
            result: value.value,
            error: value.error,
        }
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum Response {
    ConnectionEstablish { code: ResponseCode },
    Calculation(CalculationResponse),
    ConnectionTerminate { code: ResponseCode },
    /// Acknowledges input that could not be decoded or was not expected.
    Generic { code: ResponseCode },
}

impl Response {
    pub fn code(&self) -> ResponseCode {
        match self {
            Response::ConnectionEstablish { code }
            | Response::ConnectionTerminate { code }
            | Response::Generic { code } => *code,
            Response::Calculation(calculation) => calculation.code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_evaluation_is_ok_coded() {
        let response: CalculationResponse = Evaluation::failed("unexpected end").into();

        assert_eq!(response.code, ResponseCode::Ok);
        assert!(response.is_failure());
        assert_eq!(response.error, "unexpected end");
    }

    #[test]
    fn response_code_of_each_variant() {
        let calculation = Response::Calculation(Evaluation::succeeded(4.0).into());

        assert_eq!(calculation.code(), ResponseCode::Ok);
        assert_eq!(
            Response::Generic {
                code: ResponseCode::BadRequest
            }
            .code(),
            ResponseCode::BadRequest
        );
    }
}
