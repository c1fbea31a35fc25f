//! Screen-reader engine: watches the accessibility tree of the frontmost
//! application, interprets captured keyboard chords, and speaks a semantic
//! description of the focused element.
//!
//! The engine is generic over the [`gateway::Gateway`] facade; the real OS
//! backing lives in the cfg-gated platform modules, and
//! [`gateway::mock::MockGateway`] serves a synthetic tree for tests.

pub mod agent;
pub mod config;
pub mod dump;
pub mod error;
pub mod events;
pub mod gateway;
pub mod input;
pub mod navigator;
pub mod reader;
pub mod role;
pub mod speech;
pub mod tokens;
pub mod value;

pub use agent::{Agent, Command};
pub use config::EngineConfig;
pub use error::{AxError, AxResult};
pub use events::{AxEvent, EventKind};
pub use gateway::{Attr, Gateway, GatewayExt, Observer, Query};
pub use navigator::{Entity, Navigator};
pub use reader::Reader;
pub use role::Role;
pub use speech::Scheduler;
pub use tokens::OutputToken;
pub use value::{AxValue, Point, Rect, Size, TextRange};
