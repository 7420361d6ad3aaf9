//! Reply codes carried by `connection.close` and `channel.close`

use std::fmt;

/// AMQP 0-9-1 reply code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyCode {
    /// 200
    Success,

    /// 311, soft error
    ContentTooLarge,

    /// 312, soft error
    NoRoute,

    /// 313, soft error
    NoConsumers,

    /// 320, hard error
    ConnectionForced,

    /// 402, hard error
    InvalidPath,

    /// 403, soft error
    AccessRefused,

    /// 404, soft error
    NotFound,

    /// 405, soft error
    ResourceLocked,

    /// 406, soft error
    PreconditionFailed,

    /// 501, hard error
    FrameError,

    /// 502, hard error
    SyntaxError,

    /// 503, hard error
    CommandInvalid,

    /// 504, hard error
    ChannelError,

    /// 505, hard error
    UnexpectedFrame,

    /// 506, hard error
    ResourceError,

    /// 530, hard error
    NotAllowed,

    /// 540, hard error
    NotImplemented,

    /// 541, hard error
    InternalError,

    /// Any code not defined by the protocol
    Unrecognized(u16),
}

impl ReplyCode {
    /// Numeric value on the wire
    pub fn code(&self) -> u16 {
        match self {
            ReplyCode::Success => 200,
            ReplyCode::ContentTooLarge => 311,
            ReplyCode::NoRoute => 312,
            ReplyCode::NoConsumers => 313,
            ReplyCode::ConnectionForced => 320,
            ReplyCode::InvalidPath => 402,
            ReplyCode::AccessRefused => 403,
            ReplyCode::NotFound => 404,
            ReplyCode::ResourceLocked => 405,
            ReplyCode::PreconditionFailed => 406,
            ReplyCode::FrameError => 501,
            ReplyCode::SyntaxError => 502,
            ReplyCode::CommandInvalid => 503,
            ReplyCode::ChannelError => 504,
            ReplyCode::UnexpectedFrame => 505,
            ReplyCode::ResourceError => 506,
            ReplyCode::NotAllowed => 530,
            ReplyCode::NotImplemented => 540,
            ReplyCode::InternalError => 541,
            ReplyCode::Unrecognized(code) => *code,
        }
    }

    /// Name used by the protocol definition, e.g. `ACCESS_REFUSED`
    pub fn name(&self) -> &'static str {
        match self {
            ReplyCode::Success => "REPLY_SUCCESS",
            ReplyCode::ContentTooLarge => "CONTENT_TOO_LARGE",
            ReplyCode::NoRoute => "NO_ROUTE",
            ReplyCode::NoConsumers => "NO_CONSUMERS",
            ReplyCode::ConnectionForced => "CONNECTION_FORCED",
            ReplyCode::InvalidPath => "INVALID_PATH",
            ReplyCode::AccessRefused => "ACCESS_REFUSED",
            ReplyCode::NotFound => "NOT_FOUND",
            ReplyCode::ResourceLocked => "RESOURCE_LOCKED",
            ReplyCode::PreconditionFailed => "PRECONDITION_FAILED",
            ReplyCode::FrameError => "FRAME_ERROR",
            ReplyCode::SyntaxError => "SYNTAX_ERROR",
            ReplyCode::CommandInvalid => "COMMAND_INVALID",
            ReplyCode::ChannelError => "CHANNEL_ERROR",
            ReplyCode::UnexpectedFrame => "UNEXPECTED_FRAME",
            ReplyCode::ResourceError => "RESOURCE_ERROR",
            ReplyCode::NotAllowed => "NOT_ALLOWED",
            ReplyCode::NotImplemented => "NOT_IMPLEMENTED",
            ReplyCode::InternalError => "INTERNAL_ERROR",
            ReplyCode::Unrecognized(_) => "UNRECOGNIZED",
        }
    }

    /// Hard errors close the whole connection, soft errors only the channel
    pub fn is_hard_error(&self) -> bool {
        matches!(
            self,
            ReplyCode::ConnectionForced
                | ReplyCode::InvalidPath
                | ReplyCode::FrameError
                | ReplyCode::SyntaxError
                | ReplyCode::CommandInvalid
                | ReplyCode::ChannelError
                | ReplyCode::UnexpectedFrame
                | ReplyCode::ResourceError
                | ReplyCode::NotAllowed
                | ReplyCode::NotImplemented
                | ReplyCode::InternalError
        )
    }
}

impl From<u16> for ReplyCode {
    fn from(value: u16) -> Self {
        match value {
            200 => ReplyCode::Success,
            311 => ReplyCode::ContentTooLarge,
            312 => ReplyCode::NoRoute,
            313 => ReplyCode::NoConsumers,
            320 => ReplyCode::ConnectionForced,
            402 => ReplyCode::InvalidPath,
            403 => ReplyCode::AccessRefused,
            404 => ReplyCode::NotFound,
            405 => ReplyCode::ResourceLocked,
            406 => ReplyCode::PreconditionFailed,
            501 => ReplyCode::FrameError,
            502 => ReplyCode::SyntaxError,
            503 => ReplyCode::CommandInvalid,
            504 => ReplyCode::ChannelError,
            505 => ReplyCode::UnexpectedFrame,
            506 => ReplyCode::ResourceError,
            530 => ReplyCode::NotAllowed,
            540 => ReplyCode::NotImplemented,
            541 => ReplyCode::InternalError,
            other => ReplyCode::Unrecognized(other),
        }
    }
}

impl From<ReplyCode> for u16 {
    fn from(value: ReplyCode) -> Self {
        value.code()
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
