//! Wire protocol of the three-axis controller: newline-terminated text,
//! JSON objects inbound, a terse command grammar outbound.

pub mod catalog;
pub mod codes;
pub mod command;
pub mod framer;
pub mod message;

pub use catalog::{InputKind, ToolCommand, ToolDescriptor};
pub use command::{parse_command, Action, Command, CommandKind, CommandParseError, Target};
pub use framer::{LineFramer, Utf8Decoder};
pub use message::{classify, Message, MotorUpdate, Noise, ToolPayloadError};
