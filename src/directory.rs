//! Local address directory
//!
//! The collector asks a [`Directory`] for the endpoints the node is reachable
//! at. The transport's [`Node`](crate::transport::Node) is the production
//! implementation; [`StaticDirectory`] serves fixed addresses for embedding.

pub trait Directory: Send + Sync {
    /// Every locally bound endpoint, multiaddress-like (`/ip4/127.0.0.1/tcp/4001`)
    fn local_addresses(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    addresses: Vec<String>,
}

impl StaticDirectory {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

impl Directory for StaticDirectory {
    fn local_addresses(&self) -> Vec<String> {
        self.addresses.clone()
    }
}
