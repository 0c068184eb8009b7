//! Multi-WAN credential rotation for an OpenWrt router running `mwan3`.
//!
//! A [`monitor::FailoverMonitor`] probes connectivity; when it is lost the
//! [`pipeline::LoginPipeline`] picks a fresh account, logs it in on the NIC
//! bound to each WAN interface and re-weights the interface through `uci`.

pub mod channel;
pub mod entities;
pub mod error;
pub mod hub;
pub mod login;
pub mod monitor;
pub mod mwan;
pub mod pipeline;
pub mod selector;
pub mod uci;
pub mod weights;

pub use channel::{CommandChannel, SshAuth, SshTarget, SshTransport, Transport};
pub use entities::SqliteStore;
pub use error::{ChannelError, LoginError, UciError, WeightError};
pub use hub::{LogHub, LogSubscription};
pub use login::{LoginRunner, PortalOptions, ProcessLoginRunner};
pub use monitor::{FailoverMonitor, HttpProbe, MonitorConfig, Probe, Trigger};
pub use mwan::WeightController;
pub use pipeline::{LoginOutcome, LoginPipeline};
pub use selector::{Claim, CredentialSelector};
pub use uci::{ConfigClient, UciClient};
