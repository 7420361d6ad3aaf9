//! Protocol session bound to a socket
//!
//! A [`Session`] owns the transport and the state negotiated at login. It performs the wire
//! exchanges of the handshake and of the graceful close, reporting their outcome as an
//! [`RpcReply`]. Dropping a session releases the socket.

use amqp091_types::{
    constants::{MAJOR, MINOR},
    methods::{Close, Open, OpenOk, Start, StartOk, Tune},
    FieldTable, FieldValue, Method, ReplyCode,
};

use crate::{
    error::{LibraryError, LibraryStatus},
    login::{LoginParams, Tuning, CAPABILITIES_KEY, LOCALE},
    rpc::{self, rpc_try, RpcReply},
    transport::{ProtocolHeader, Socket, Stream, Transport},
};

/// Frame size limit until `connection.tune` has been negotiated
pub const INITIAL_FRAME_MAX: usize = 131072;

/// Value of the `product` client property
pub const PRODUCT: &str = "amqp091";

/// Value of the `platform` client property
pub const PLATFORM: &str = "Rust";

/// Value of the `information` client property
pub const INFORMATION: &str = "Licensed under the MIT or Apache-2.0 license";

/// Protocol session
#[derive(Debug)]
pub struct Session<S: Stream = Socket> {
    transport: Option<Transport<S>>,
    tuning: Tuning,
    server_properties: FieldTable,
}

impl<S: Stream> Default for Session<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Stream> Session<S> {
    /// Creates a session with no socket attached
    pub fn new() -> Self {
        Self {
            transport: None,
            tuning: Tuning::default(),
            server_properties: FieldTable::new(),
        }
    }

    /// Binds the session to a connected stream
    pub fn attach(&mut self, stream: S) {
        self.transport = Some(Transport::bind(stream, INITIAL_FRAME_MAX));
    }

    /// Returns true if a stream is attached and not yet released
    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    /// Tuning negotiated at login
    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    /// Properties sent by the broker in `connection.start`
    pub fn server_properties(&self) -> &FieldTable {
        &self.server_properties
    }

    /// The transport, for channel level collaborators
    pub fn transport_mut(&mut self) -> Option<&mut Transport<S>> {
        self.transport.as_mut()
    }

    /// Runs the connection handshake
    ///
    /// The library properties are merged into `params.client_properties` before sending, the
    /// caller's entries win.
    pub fn login(&mut self, params: &LoginParams<'_>) -> RpcReply<()> {
        let transport = rpc_try!(self.transport.as_mut().ok_or_else(socket_closed));

        rpc_try!(transport
            .send_protocol_header(ProtocolHeader::amqp())
            .map_err(LibraryError::from));

        let start: Start = rpc_try!(rpc::recv_method(transport, 0).expecting());
        if (start.version_major, start.version_minor) != (MAJOR, MINOR) {
            return RpcReply::LibraryException(
                LibraryError::new(LibraryStatus::IncompatibleAmqpVersion).with_description(
                    format!(
                        "Broker speaks {}-{}",
                        start.version_major, start.version_minor
                    ),
                ),
            );
        }
        if !start.supports_mechanism(params.sasl.mechanism()) {
            return RpcReply::LibraryException(
                LibraryError::new(LibraryStatus::BrokerUnsupportedSaslMethod)
                    .with_description(format!("{} is not offered", params.sasl.mechanism())),
            );
        }

        let mut client_properties = params.client_properties.clone();
        merge_library_properties(&mut client_properties);
        let start_ok = StartOk {
            client_properties,
            mechanism: params.sasl.mechanism().to_string(),
            response: params.sasl.initial_response(),
            locale: LOCALE.to_string(),
        };
        rpc_try!(rpc::send_method(transport, 0, Method::ConnectionStartOk(start_ok)));

        let tune: Tune = rpc_try!(rpc::recv_method(transport, 0).expecting());
        let tuning = Tuning::negotiate(params.tuning, &tune);
        rpc_try!(rpc::send_method(
            transport,
            0,
            Method::ConnectionTuneOk(tuning.into())
        ));
        transport.set_max_frame_size(tuning.frame_max as usize);

        let open = Method::ConnectionOpen(Open::new(params.vhost));
        let _open_ok: OpenOk = rpc_try!(rpc::simple_rpc(transport, 0, open).expecting());

        self.tuning = tuning;
        self.server_properties = start.server_properties;
        RpcReply::Normal(())
    }

    /// Sends `connection.close` and waits for the broker to acknowledge it
    ///
    /// The socket stays attached, [`Session::destroy`] releases it.
    pub fn close(&mut self, reply_code: ReplyCode) -> RpcReply<()> {
        let transport = rpc_try!(self.transport.as_mut().ok_or_else(socket_closed));
        let close = Close::new(reply_code, reply_code.code().to_string());
        rpc::close_connection(transport, Method::ConnectionClose(close))
    }

    /// Releases the socket, does nothing if it was already released
    pub fn destroy(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            // Dropping the stream closes it even if the shutdown fails
            let _ = transport.get_mut().shutdown();

            #[cfg(feature = "tracing")]
            tracing::trace!("Session destroyed");
            #[cfg(feature = "log")]
            log::trace!("Session destroyed");
        }
    }
}

impl<S: Stream> Drop for Session<S> {
    fn drop(&mut self) {
        self.destroy()
    }
}

fn socket_closed() -> LibraryError {
    LibraryError::new(LibraryStatus::SocketClosed)
}

/// Adds the properties identifying this library, keeping any entry already present
///
/// `authentication_failure_close` asks the broker to report bad credentials with
/// `connection.close` instead of dropping the socket.
pub fn merge_library_properties(properties: &mut FieldTable) {
    properties.insert_if_absent("product", PRODUCT);
    properties.insert_if_absent("version", env!("CARGO_PKG_VERSION"));
    properties.insert_if_absent("platform", PLATFORM);
    properties.insert_if_absent("information", INFORMATION);

    if !properties.contains_key(CAPABILITIES_KEY) {
        properties.insert(CAPABILITIES_KEY, FieldTable::new());
    }
    // A `capabilities` entry that is not a table is left alone
    if let Some(capabilities) = properties
        .get_mut(CAPABILITIES_KEY)
        .and_then(FieldValue::as_table_mut)
    {
        capabilities.insert_if_absent("authentication_failure_close", true);
    }
}
