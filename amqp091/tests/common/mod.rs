#![allow(dead_code)]

use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    sync::OnceLock,
    thread::{self, JoinHandle},
};

use amqp091::{
    frames::{Frame, FrameBody},
    transport::Transport,
    types::{
        methods::{Close, Open, OpenOk, Start, StartOk, Tune},
        FieldTable, Method, ReplyCode,
    },
};
use bytes::Bytes;
use testcontainers::{
    clients::Cli,
    core::WaitFor,
    GenericImage,
    Container,
};

static DOCKER: OnceLock<Cli> = OnceLock::new();

pub fn setup_rabbitmq(username: Option<&str>, password: Option<&str>) -> (Container<'static, GenericImage>, u16) {
    let docker = DOCKER.get_or_init(Cli::default);
    let image = match (username, password) {
        (Some(username), Some(password)) => GenericImage::new("docker.io/library/rabbitmq", "3-management")
            .with_env_var("RABBITMQ_DEFAULT_USER", username)
            .with_env_var("RABBITMQ_DEFAULT_PASS", password)
            .with_exposed_port(5672)
            .with_wait_for(WaitFor::message_on_stdout("Server startup complete")),
        _ => GenericImage::new("docker.io/library/rabbitmq", "3-management")
            .with_exposed_port(5672)
            .with_wait_for(WaitFor::message_on_stdout("Server startup complete")),
    };
    let node = docker.run(image);
    let port = node.get_host_port_ipv4(5672);
    (node, port)
}

/// How the mock broker plays the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Completes the handshake and acknowledges the client's close
    Accept,

    /// Rejects the credentials with `connection.close 403`
    RefuseLogin,

    /// Rejects the vhost with `connection.close 530`
    RefuseVhost,

    /// Answers the client's protocol header with its own
    ProtocolHeader,

    /// Closes the socket right after `connection.start`
    HangUp,
}

/// What the mock broker received
#[derive(Debug, Default)]
pub struct Recorded {
    pub start_ok: Option<StartOk>,
    pub tune_ok: Option<Tune>,
    pub open: Option<Open>,
    pub close: Option<Close>,
    pub close_ok_received: bool,
}

pub struct MockBroker {
    pub port: u16,
    handle: JoinHandle<Recorded>,
}

impl MockBroker {
    pub fn spawn(behavior: Behavior, server_properties: FieldTable) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve(stream, behavior, server_properties)
        });
        Self { port, handle }
    }

    pub fn rabbitmq(behavior: Behavior, version: &str) -> Self {
        let properties = [
            ("product", "RabbitMQ"),
            ("version", version),
            ("platform", "Erlang/OTP 25.3"),
        ]
        .into_iter()
        .collect();
        Self::spawn(behavior, properties)
    }

    pub fn join(self) -> Recorded {
        self.handle.join().unwrap()
    }
}

pub const TUNE: Tune = Tune {
    channel_max: 2047,
    frame_max: 131072,
    heartbeat: 60,
};

fn serve(stream: TcpStream, behavior: Behavior, server_properties: FieldTable) -> Recorded {
    let mut recorded = Recorded::default();
    let mut transport = Transport::bind(stream, 0);
    let mut header = [0u8; 8];
    transport.get_mut().read_exact(&mut header).unwrap();
    assert_eq!(&header, b"AMQP\x00\x00\x09\x01");

    if behavior == Behavior::ProtocolHeader {
        transport.get_mut().write_all(b"AMQP\x00\x00\x09\x01").unwrap();
        return recorded;
    }

    send(
        &mut transport,
        Method::ConnectionStart(Start {
            version_major: 0,
            version_minor: 9,
            server_properties,
            mechanisms: Bytes::from_static(b"AMQPLAIN PLAIN"),
            locales: Bytes::from_static(b"en_US"),
        }),
    );
    if behavior == Behavior::HangUp {
        return recorded;
    }

    let Some(Method::ConnectionStartOk(start_ok)) = recv(&mut transport) else {
        return recorded;
    };
    let authenticated = start_ok.response[..] == b"\x00guest\x00guest"[..];
    recorded.start_ok = Some(start_ok);
    if behavior == Behavior::RefuseLogin || !authenticated {
        let close = Close::new(
            ReplyCode::AccessRefused,
            "ACCESS_REFUSED - Login was refused using authentication mechanism PLAIN",
        );
        refuse(&mut transport, close, &mut recorded);
        return recorded;
    }

    send(&mut transport, Method::ConnectionTune(TUNE));
    if let Some(Method::ConnectionTuneOk(tune_ok)) = recv(&mut transport) {
        recorded.tune_ok = Some(tune_ok);
    }

    let Some(Method::ConnectionOpen(open)) = recv(&mut transport) else {
        return recorded;
    };
    recorded.open = Some(open);
    if behavior == Behavior::RefuseVhost {
        let mut close = Close::new(
            ReplyCode::NotAllowed,
            "NOT_ALLOWED - access to vhost refused for user 'guest'",
        );
        close.class_id = 10;
        close.method_id = 40;
        refuse(&mut transport, close, &mut recorded);
        return recorded;
    }
    send(&mut transport, Method::ConnectionOpenOk(OpenOk::default()));

    while let Some(method) = recv(&mut transport) {
        if let Method::ConnectionClose(close) = method {
            recorded.close = Some(close);
            send(&mut transport, Method::ConnectionCloseOk);
            break;
        }
    }
    recorded
}

fn refuse(transport: &mut Transport<TcpStream>, close: Close, recorded: &mut Recorded) {
    send(transport, Method::ConnectionClose(close));
    recorded.close_ok_received = matches!(recv(transport), Some(Method::ConnectionCloseOk));
}

fn send(transport: &mut Transport<TcpStream>, method: Method) {
    transport.send_frame(Frame::method(0, method)).unwrap();
}

fn recv(transport: &mut Transport<TcpStream>) -> Option<Method> {
    loop {
        match transport.recv_frame().ok()?.into_body() {
            FrameBody::Method(method) => return Some(method),
            _ => continue,
        }
    }
}
