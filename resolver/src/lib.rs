//! An asynchronous, event-loop-agnostic DNS stub resolver. The caller drives an
//! [`runtime::event_loop::EventLoop`] of its own choosing; this crate only ever reacts to timer
//! and socket-readiness notifications routed through it.

mod context;
mod fake;
mod lookup;
mod scheduler;
mod transport;

pub mod config;
pub mod error;
pub mod wire;

pub use config::{Config, ConfigBuilder, HostsTable};
pub use context::{Context, Handler, QueryFlags};
pub use error::{Error, Result};
pub use scheduler::Operation;
pub use wire::{Edns, Name, Question, Record, Response};
pub use wire::{CLASS_IN, TYPE_A, TYPE_AAAA, TYPE_CAA, TYPE_CNAME, TYPE_DNSKEY, TYPE_MX, TYPE_NS, TYPE_PTR, TYPE_RRSIG, TYPE_SOA, TYPE_TLSA, TYPE_TXT};
pub use wire::{RCODE_NOERROR, RCODE_NXDOMAIN, RCODE_SERVFAIL};
