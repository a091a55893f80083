pub mod link;
pub mod loopback;
pub mod message;
pub mod receiver;
pub mod transport;

pub use link::{Link, LinkError, LinkState, Reachability};
pub use loopback::LoopbackLink;
pub use message::{decode_payload, encode_payload, Payload, SessionPatch, SettingsPatch, SyncMessage};
pub use receiver::{ConnectivityState, FileState, IncomingFile, SyncReceiver};
pub use transport::{Delivery, SyncTransport, TransferStatus};
