//! Which destination addresses a fetch may connect to.

use std::net::IpAddr;

use lightning_core::net::is_public_ip;

/// Address policy applied to every resolved address of every hop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressPolicy {
    /// Only globally routable addresses.
    #[default]
    PublicOnly,
    /// Public addresses plus an explicit allow-list, for internal mirrors.
    PublicOr(Vec<IpAddr>),
    /// No address checks. Only for trusted inputs and tests.
    AllowAll,
}

impl AddressPolicy {
    pub fn permits(&self, ip: IpAddr) -> bool {
        match self {
            Self::PublicOnly => is_public_ip(ip),
            Self::PublicOr(extra) => is_public_ip(ip) || extra.contains(&ip),
            Self::AllowAll => true,
        }
    }
}
