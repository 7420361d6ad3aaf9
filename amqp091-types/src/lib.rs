#![deny(missing_docs, missing_debug_implementations)]

//! Implements the AMQP 0-9-1 data types needed to establish, negotiate and close a
//! connection, as defined in the
//! [specification](https://www.rabbitmq.com/resources/specs/amqp0-9-1.pdf) and the
//! RabbitMQ errata for field table value types.

pub mod constants;
pub mod error;
pub mod methods;
pub mod primitives;
pub mod reply_code;
pub mod table;

pub use error::{DecodeError, EncodeError};
pub use methods::Method;
pub use reply_code::ReplyCode;
pub use table::{FieldTable, FieldValue};
