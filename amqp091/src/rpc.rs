//! Replies of protocol exchanges and their classification

use std::{
    convert::TryFrom,
    io::{Read, Write},
};

use amqp091_types::{methods::CloseOk, Method};

use crate::{
    error::{BrokerError, Error, LibraryError, LibraryStatus},
    frames::{Frame, FrameBody},
    transport::Transport,
};

/// Outcome of a single protocol exchange
///
/// Consumed right away with [`RpcReply::check`], which turns it into a `Result`.
#[derive(Debug)]
pub enum RpcReply<T> {
    /// The exchange succeeded
    Normal(T),

    /// The library detected a local problem, often because the peer is gone
    LibraryException(LibraryError),

    /// The broker raised an exception with `connection.close` or `channel.close`
    ServerException {
        /// Channel that carried the method
        channel: u16,
        /// The method sent by the broker
        method: Method,
    },
}

impl<T> RpcReply<T> {
    /// Classifies the reply
    pub fn check(self) -> Result<T, Error> {
        match self {
            RpcReply::Normal(value) => Ok(value),
            RpcReply::LibraryException(err) => Err(Error::Library(err)),
            RpcReply::ServerException { channel, method } => {
                Err(Error::Broker(BrokerError::from_method(channel, method)))
            }
        }
    }

    /// Maps the normal value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RpcReply<U> {
        match self {
            RpcReply::Normal(value) => RpcReply::Normal(f(value)),
            RpcReply::LibraryException(err) => RpcReply::LibraryException(err),
            RpcReply::ServerException { channel, method } => {
                RpcReply::ServerException { channel, method }
            }
        }
    }

    /// Returns true for [`RpcReply::Normal`]
    pub fn is_normal(&self) -> bool {
        matches!(self, RpcReply::Normal(_))
    }
}

impl RpcReply<Method> {
    /// Narrows a normal reply to the expected method
    ///
    /// Any other method becomes a [`LibraryStatus::WrongMethod`] fault.
    pub fn expecting<U>(self) -> RpcReply<U>
    where
        U: TryFrom<Method, Error = Method>,
    {
        match self {
            RpcReply::Normal(method) => match U::try_from(method) {
                Ok(value) => RpcReply::Normal(value),
                Err(method) => {
                    let (class_id, method_id) = method.id();
                    RpcReply::LibraryException(
                        LibraryError::new(LibraryStatus::WrongMethod).with_description(format!(
                            "Received method {}.{}",
                            class_id, method_id
                        )),
                    )
                }
            },
            RpcReply::LibraryException(err) => RpcReply::LibraryException(err),
            RpcReply::ServerException { channel, method } => {
                RpcReply::ServerException { channel, method }
            }
        }
    }
}

impl<T> From<Result<T, LibraryError>> for RpcReply<T> {
    fn from(result: Result<T, LibraryError>) -> Self {
        match result {
            Ok(value) => RpcReply::Normal(value),
            Err(err) => RpcReply::LibraryException(err),
        }
    }
}

/// Unwraps a normal reply or returns the exception from the enclosing function
macro_rules! rpc_try {
    ($reply:expr) => {
        match $crate::rpc::RpcReply::from($reply) {
            $crate::rpc::RpcReply::Normal(value) => value,
            $crate::rpc::RpcReply::LibraryException(err) => {
                return $crate::rpc::RpcReply::LibraryException(err)
            }
            $crate::rpc::RpcReply::ServerException { channel, method } => {
                return $crate::rpc::RpcReply::ServerException { channel, method }
            }
        }
    };
}

pub(crate) use rpc_try;

/// Sends a method frame
pub fn send_method<Io>(
    transport: &mut Transport<Io>,
    channel: u16,
    method: Method,
) -> Result<(), LibraryError>
where
    Io: Read + Write,
{
    transport
        .send_frame(Frame::method(channel, method))
        .map_err(Into::into)
}

/// Blocks until a method arrives on `channel`
///
/// Heartbeats and frames of other channels are skipped. A `connection.close` from the broker
/// is answered with `connection.close-ok` and reported as a server exception, as is a
/// `channel.close` on `channel`.
pub fn recv_method<Io>(transport: &mut Transport<Io>, channel: u16) -> RpcReply<Method>
where
    Io: Read + Write,
{
    loop {
        let frame = match transport.recv_frame() {
            Ok(frame) => frame,
            Err(err) => return RpcReply::LibraryException(err.into()),
        };

        match frame.body {
            FrameBody::Heartbeat => continue,
            FrameBody::Method(method @ Method::ConnectionClose(_)) => {
                // The broker closes the socket after close-ok, a failure here changes nothing
                let _ = send_method(transport, 0, Method::ConnectionCloseOk);
                return RpcReply::ServerException {
                    channel: frame.channel,
                    method,
                };
            }
            FrameBody::Method(method @ Method::ChannelClose(_)) if frame.channel == channel => {
                return RpcReply::ServerException {
                    channel: frame.channel,
                    method,
                }
            }
            _ if frame.channel != channel => continue,
            FrameBody::Method(method) => return RpcReply::Normal(method),
            FrameBody::Header(_) | FrameBody::Body(_) => {
                return RpcReply::LibraryException(
                    LibraryError::new(LibraryStatus::UnexpectedState)
                        .with_description("Received content while waiting for a method"),
                )
            }
        }
    }
}

/// Sends `request` and waits for the reply on the same channel
pub fn simple_rpc<Io>(
    transport: &mut Transport<Io>,
    channel: u16,
    request: Method,
) -> RpcReply<Method>
where
    Io: Read + Write,
{
    rpc_try!(send_method(transport, channel, request));
    recv_method(transport, channel)
}

/// Sends `connection.close` and waits for `connection.close-ok`
///
/// A `connection.close` crossing ours also ends the exchange.
pub fn close_connection<Io>(
    transport: &mut Transport<Io>,
    request: Method,
) -> RpcReply<()>
where
    Io: Read + Write,
{
    match simple_rpc(transport, 0, request) {
        RpcReply::ServerException {
            method: Method::ConnectionClose(_),
            ..
        } => RpcReply::Normal(()),
        reply => reply.expecting::<CloseOk>().map(|_| ()),
    }
}
