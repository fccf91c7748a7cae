//! PostgreSQL backend (server → client) messages.

pub mod auth;
pub mod error;
pub mod extended;
pub mod query;

pub use auth::{AuthenticationMessage, BackendKeyData, ParameterStatus, ReadyForQuery};
pub use extended::ParameterDescription;
pub use query::{CommandComplete, DataRow, FieldDescription, RowDescription};

use crate::error::{Error, Result, ServerError};

/// Backend message type bytes.
pub mod msg_type {
    /// Authentication message
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// ParseComplete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// BindComplete
    pub const BIND_COMPLETE: u8 = b'2';
    /// ParameterDescription
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    /// NoData
    pub const NO_DATA: u8 = b'n';
    /// PortalSuspended
    pub const PORTAL_SUSPENDED: u8 = b's';
}

/// A fully decoded backend message.
///
/// The message set is a closed variant: the protocol engine matches on it
/// exhaustively, phase by phase. An unknown type byte is a protocol error,
/// not a silently skipped frame.
#[derive(Debug, Clone)]
pub enum BackendMessage {
    Authentication(AuthenticationMessage),
    BackendKeyData(BackendKeyData),
    BindComplete,
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    EmptyQueryResponse,
    ErrorResponse(ServerError),
    NoData,
    NoticeResponse(ServerError),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete,
    PortalSuspended,
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

impl BackendMessage {
    /// Decode a framed message from its type byte and payload.
    pub fn decode(type_byte: u8, payload: &[u8]) -> Result<Self> {
        let msg = match type_byte {
            msg_type::AUTHENTICATION => {
                Self::Authentication(AuthenticationMessage::parse(payload)?)
            }
            msg_type::BACKEND_KEY_DATA => Self::BackendKeyData(BackendKeyData::parse(payload)?),
            msg_type::BIND_COMPLETE => Self::BindComplete,
            msg_type::COMMAND_COMPLETE => Self::CommandComplete(CommandComplete::parse(payload)?),
            msg_type::DATA_ROW => Self::DataRow(DataRow::parse(payload)?),
            msg_type::EMPTY_QUERY_RESPONSE => Self::EmptyQueryResponse,
            msg_type::ERROR_RESPONSE => Self::ErrorResponse(error::parse_fields(payload)?),
            msg_type::NO_DATA => Self::NoData,
            msg_type::NOTICE_RESPONSE => Self::NoticeResponse(error::parse_fields(payload)?),
            msg_type::PARAMETER_DESCRIPTION => {
                Self::ParameterDescription(ParameterDescription::parse(payload)?)
            }
            msg_type::PARAMETER_STATUS => Self::ParameterStatus(ParameterStatus::parse(payload)?),
            msg_type::PARSE_COMPLETE => Self::ParseComplete,
            msg_type::PORTAL_SUSPENDED => Self::PortalSuspended,
            msg_type::READY_FOR_QUERY => Self::ReadyForQuery(ReadyForQuery::parse(payload)?),
            msg_type::ROW_DESCRIPTION => Self::RowDescription(RowDescription::parse(payload)?),
            _ => {
                return Err(Error::Protocol(format!(
                    "unknown backend message type: '{}'",
                    type_byte as char
                )))
            }
        };
        Ok(msg)
    }

    /// Short message name, used for unexpected-message errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Authentication",
            Self::BackendKeyData(_) => "BackendKeyData",
            Self::BindComplete => "BindComplete",
            Self::CommandComplete(_) => "CommandComplete",
            Self::DataRow(_) => "DataRow",
            Self::EmptyQueryResponse => "EmptyQueryResponse",
            Self::ErrorResponse(_) => "ErrorResponse",
            Self::NoData => "NoData",
            Self::NoticeResponse(_) => "NoticeResponse",
            Self::ParameterDescription(_) => "ParameterDescription",
            Self::ParameterStatus(_) => "ParameterStatus",
            Self::ParseComplete => "ParseComplete",
            Self::PortalSuspended => "PortalSuspended",
            Self::ReadyForQuery(_) => "ReadyForQuery",
            Self::RowDescription(_) => "RowDescription",
        }
    }
}
