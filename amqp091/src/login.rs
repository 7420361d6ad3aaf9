//! Login and capability negotiation
//!
//! [`login`] builds the client properties, runs the handshake on a [`Session`] and classifies
//! the reply. The wire exchange itself is [`Session::login`].

use amqp091_types::{constants::FRAME_MIN_SIZE, methods::Tune, FieldTable, FieldValue};

use crate::{
    error::{ConfigError, Error},
    sasl_profile::SaslProfile,
    session::Session,
    transport::Stream,
};

/// Heartbeats are not supported, the client always requests them disabled
pub const BROKER_HEARTBEAT: u16 = 0;

/// Requested channel max, zero defers to the broker
pub const CHANNEL_MAX: u16 = 0;

/// Locale sent in `connection.start-ok`
pub const LOCALE: &str = "en_US";

/// Key of the nested capabilities table in the client properties
pub const CAPABILITIES_KEY: &str = "capabilities";

/// Capabilities announced to the broker at login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCapabilities {
    /// The client handles `basic.cancel` sent by the broker
    pub consumer_cancel_notify: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            consumer_cancel_notify: true,
        }
    }
}

impl ClientCapabilities {
    /// The capabilities as a field table
    pub fn to_table(&self) -> FieldTable {
        [("consumer_cancel_notify", self.consumer_cancel_notify)]
            .into_iter()
            .collect()
    }
}

/// Builds the client properties sent at login
///
/// `extra` entries are kept. The capabilities are written into the nested `capabilities`
/// table, which is created if `extra` has none.
pub fn client_properties(extra: &FieldTable, capabilities: &ClientCapabilities) -> FieldTable {
    let mut properties = extra.clone();
    let announced = capabilities.to_table();
    match properties
        .get_mut(CAPABILITIES_KEY)
        .and_then(FieldValue::as_table_mut)
    {
        Some(table) => {
            for (key, value) in &announced {
                table.insert(key.clone(), value.clone());
            }
        }
        None => {
            properties.insert(CAPABILITIES_KEY, announced);
        }
    }
    properties
}

/// Negotiated connection tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tuning {
    /// Highest usable channel number, zero means no limit
    pub channel_max: u16,

    /// Largest frame size, zero means no limit
    pub frame_max: u32,

    /// Heartbeat delay in seconds, zero means disabled
    pub heartbeat: u16,
}

impl Tuning {
    /// Combines the client's request with the broker's `connection.tune`
    pub fn negotiate(requested: Tuning, server: &Tune) -> Self {
        let channel_max = match server.channel_max {
            0 => requested.channel_max,
            server_max if requested.channel_max == 0 || server_max < requested.channel_max => {
                server_max
            }
            _ => requested.channel_max,
        };
        let frame_max = match server.frame_max {
            server_max if server_max != 0 && server_max < requested.frame_max => server_max,
            _ => requested.frame_max,
        };
        let heartbeat = match server.heartbeat {
            server_hb if server_hb != 0 && server_hb < requested.heartbeat => server_hb,
            _ => requested.heartbeat,
        };
        Self {
            channel_max,
            frame_max,
            heartbeat,
        }
    }
}

impl From<Tuning> for Tune {
    fn from(value: Tuning) -> Self {
        Tune {
            channel_max: value.channel_max,
            frame_max: value.frame_max,
            heartbeat: value.heartbeat,
        }
    }
}

/// Arguments of the login exchange
#[derive(Debug, Clone)]
pub struct LoginParams<'a> {
    /// Virtual host to open
    pub vhost: &'a str,

    /// Requested tuning
    pub tuning: Tuning,

    /// Credentials
    pub sasl: &'a SaslProfile,

    /// Client properties, before the library properties are merged in
    pub client_properties: &'a FieldTable,
}

/// Checks that `frame_max` is zero or at least the protocol minimum
pub fn validate_frame_max(frame_max: u32) -> Result<(), ConfigError> {
    match frame_max {
        0 => Ok(()),
        n if n < FRAME_MIN_SIZE => Err(ConfigError::FrameMaxTooSmall(n)),
        _ => Ok(()),
    }
}

/// Performs the login handshake on an attached session
///
/// On success the server properties are returned. On failure the session is left as is, the
/// caller destroys it.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(session, sasl, extra_properties)))]
pub fn login<'s, S>(
    session: &'s mut Session<S>,
    vhost: &str,
    frame_max: u32,
    sasl: &SaslProfile,
    extra_properties: &FieldTable,
) -> Result<&'s FieldTable, Error>
where
    S: Stream,
{
    let properties = client_properties(extra_properties, &ClientCapabilities::default());
    let params = LoginParams {
        vhost,
        tuning: Tuning {
            channel_max: CHANNEL_MAX,
            frame_max,
            heartbeat: BROKER_HEARTBEAT,
        },
        sasl,
        client_properties: &properties,
    };

    session.login(&params).check()?;

    #[cfg(feature = "tracing")]
    tracing::debug!(tuning = ?session.tuning(), "Logged in");
    #[cfg(feature = "log")]
    log::debug!("Logged in, tuning: {:?}", session.tuning());

    Ok(session.server_properties())
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor, Read, Write};

    use amqp091_types::{
        methods::{Close, OpenOk, Start, StartOk, Tune},
        FieldTable, FieldValue, Method, ReplyCode,
    };
    use bytes::{Bytes, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    use crate::{
        error::{Error, LibraryStatus},
        frames::{Frame, FrameBody, FrameCodec},
        sasl_profile::SaslProfile,
        session::Session,
        transport::Stream,
    };

    use super::{client_properties, login, validate_frame_max, ClientCapabilities, Tuning};

    /// Replays a scripted broker and records what the client sends
    #[derive(Debug)]
    struct ScriptedBroker {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for ScriptedBroker {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedBroker {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Stream for ScriptedBroker {}

    fn script(methods: Vec<Method>) -> ScriptedBroker {
        let mut codec = FrameCodec::new(0);
        let mut input = BytesMut::new();
        for method in methods {
            codec.encode(Frame::method(0, method), &mut input).unwrap();
        }
        ScriptedBroker {
            input: Cursor::new(input.to_vec()),
            output: Vec::new(),
        }
    }

    fn start(version: &str, mechanisms: &'static [u8]) -> Method {
        Method::ConnectionStart(Start {
            version_major: 0,
            version_minor: 9,
            server_properties: [("product", "RabbitMQ"), ("version", version)]
                .into_iter()
                .collect(),
            mechanisms: Bytes::from_static(mechanisms),
            locales: Bytes::from_static(b"en_US"),
        })
    }

    fn tune() -> Method {
        Method::ConnectionTune(Tune {
            channel_max: 2047,
            frame_max: 131072,
            heartbeat: 60,
        })
    }

    /// Decodes everything the client wrote after its protocol header
    fn sent_methods(output: &[u8]) -> Vec<Method> {
        assert_eq!(&output[..8], b"AMQP\x00\x00\x09\x01");
        let mut src = BytesMut::from(&output[8..]);
        let mut codec = FrameCodec::new(0);
        let mut methods = Vec::new();
        while let Some(frame) = codec.decode(&mut src).unwrap() {
            match frame.body {
                FrameBody::Method(method) => methods.push(method),
                other => panic!("unexpected frame {:?}", other),
            }
        }
        methods
    }

    fn run(broker: ScriptedBroker) -> (Session<ScriptedBroker>, Result<FieldTable, Error>) {
        let mut session = Session::new();
        session.attach(broker);
        let sasl = SaslProfile::plain("guest", "guest");
        let result = login(&mut session, "/", 131072, &sasl, &FieldTable::new()).cloned();
        (session, result)
    }

    #[test]
    fn successful_login() {
        let broker = script(vec![
            start("3.11.5", b"AMQPLAIN PLAIN"),
            tune(),
            Method::ConnectionOpenOk(OpenOk::default()),
        ]);
        let (mut session, result) = run(broker);
        let server_properties = result.unwrap();
        assert!(server_properties.contains_key("version"));
        assert_eq!(
            session.tuning(),
            Tuning {
                channel_max: 2047,
                frame_max: 131072,
                heartbeat: 0
            }
        );

        let output = session.transport_mut().unwrap().get_ref().output.clone();
        let sent = sent_methods(&output);
        assert_eq!(sent.len(), 3);

        let start_ok = match &sent[0] {
            Method::ConnectionStartOk(start_ok) => start_ok.clone(),
            other => panic!("unexpected {:?}", other),
        };
        let StartOk {
            client_properties,
            mechanism,
            response,
            locale,
        } = start_ok;
        assert_eq!(mechanism, "PLAIN");
        assert_eq!(&response[..], b"\0guest\0guest");
        assert_eq!(locale, "en_US");
        let capabilities = client_properties
            .get("capabilities")
            .and_then(FieldValue::as_table)
            .unwrap();
        assert_eq!(
            capabilities
                .get("consumer_cancel_notify")
                .and_then(FieldValue::as_bool),
            Some(true)
        );
        assert_eq!(
            capabilities
                .get("authentication_failure_close")
                .and_then(FieldValue::as_bool),
            Some(true)
        );
        assert!(client_properties.contains_key("product"));

        assert_eq!(
            sent[1],
            Method::ConnectionTuneOk(Tune {
                channel_max: 2047,
                frame_max: 131072,
                heartbeat: 0
            })
        );
        match &sent[2] {
            Method::ConnectionOpen(open) => assert_eq!(open.virtual_host, "/"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn refused_credentials_are_a_broker_fault() {
        let broker = script(vec![
            start("3.11.5", b"PLAIN"),
            Method::ConnectionClose(Close {
                reply_code: 403,
                reply_text: "ACCESS_REFUSED - Login was refused using authentication mechanism PLAIN".into(),
                class_id: 0,
                method_id: 0,
            }),
        ]);
        let (_session, result) = run(broker);
        match result {
            Err(Error::Broker(err)) => assert_eq!(err.reply_code, ReplyCode::AccessRefused),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_plain_mechanism() {
        let broker = script(vec![start("3.11.5", b"AMQPLAIN EXTERNAL")]);
        let (_session, result) = run(broker);
        match result {
            Err(Error::Library(err)) => {
                assert_eq!(err.status(), LibraryStatus::BrokerUnsupportedSaslMethod)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wrong_protocol_version() {
        let broker = script(vec![Method::ConnectionStart(Start {
            version_major: 0,
            version_minor: 8,
            server_properties: FieldTable::new(),
            mechanisms: Bytes::from_static(b"PLAIN"),
            locales: Bytes::from_static(b"en_US"),
        })]);
        let (_session, result) = run(broker);
        match result {
            Err(Error::Library(err)) => {
                assert_eq!(err.status(), LibraryStatus::IncompatibleAmqpVersion)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn peer_closing_mid_handshake() {
        let broker = script(vec![start("3.11.5", b"PLAIN")]);
        let (_session, result) = run(broker);
        match result {
            Err(Error::Library(err)) => assert_eq!(err.status(), LibraryStatus::ConnectionClosed),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tuning_negotiation() {
        let requested = Tuning {
            channel_max: 0,
            frame_max: 131072,
            heartbeat: 0,
        };

        let server = Tune {
            channel_max: 2047,
            frame_max: 4096,
            heartbeat: 60,
        };
        assert_eq!(
            Tuning::negotiate(requested, &server),
            Tuning {
                channel_max: 2047,
                frame_max: 4096,
                heartbeat: 0
            }
        );

        let server = Tune {
            channel_max: 0,
            frame_max: 0,
            heartbeat: 0,
        };
        assert_eq!(Tuning::negotiate(requested, &server), requested);

        let requested = Tuning {
            channel_max: 10,
            frame_max: 0,
            heartbeat: 30,
        };
        let server = Tune {
            channel_max: 100,
            frame_max: 8192,
            heartbeat: 10,
        };
        assert_eq!(
            Tuning::negotiate(requested, &server),
            Tuning {
                channel_max: 10,
                frame_max: 0,
                heartbeat: 10
            }
        );
    }

    #[test]
    fn frame_max_bounds() {
        assert!(validate_frame_max(0).is_ok());
        assert!(validate_frame_max(4096).is_ok());
        assert!(validate_frame_max(4095).is_err());
    }

    #[test]
    fn caller_capabilities_are_kept() {
        let mut caller_capabilities = FieldTable::new();
        caller_capabilities.insert("publisher_confirms", true);
        let mut extra = FieldTable::new();
        extra.insert("connection_name", "orders");
        extra.insert("capabilities", caller_capabilities);

        let properties = client_properties(&extra, &ClientCapabilities::default());
        let capabilities = properties
            .get("capabilities")
            .and_then(FieldValue::as_table)
            .unwrap();
        assert_eq!(capabilities.len(), 2);
        assert!(properties.contains_key("connection_name"));

        let properties = client_properties(&FieldTable::new(), &ClientCapabilities::default());
        assert_eq!(properties.len(), 1);
        assert_eq!(
            properties.get("capabilities").and_then(FieldValue::as_table),
            Some(&ClientCapabilities::default().to_table())
        );
    }
}
