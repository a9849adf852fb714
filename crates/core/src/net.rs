//! IP address classification for outbound request guarding.
//!
//! [`is_public_ip`] decides whether an address may be contacted on behalf
//! of a caller-supplied URL. Anything private, loopback, link-local,
//! multicast, reserved, unspecified, documentation or otherwise
//! special-purpose is treated as restricted.
//!
//! IPv4-mapped (`::ffff:a.b.c.d`) and 6to4 (`2002::/16`) IPv6 addresses
//! are judged by the IPv4 address they embed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IPv4 special-purpose ranges not covered by the stable `Ipv4Addr`
/// predicates used in [`is_restricted_v4`].
const RESTRICTED_V4: &[([u8; 4], u32)] = &[
    ([0, 0, 0, 0], 8),      // "this network"
    ([100, 64, 0, 0], 10),  // shared address space (CGNAT)
    ([192, 0, 0, 0], 24),   // IETF protocol assignments
    ([198, 18, 0, 0], 15),  // benchmarking
    ([240, 0, 0, 0], 4),    // reserved for future use
];

/// IPv6 special-purpose ranges inside global unicast `2000::/3`.
const RESTRICTED_V6_GLOBAL: &[(u128, u32)] = &[
    (0x2001_0db8 << 96, 32), // documentation
    (0x2001 << 112, 23),     // IETF protocol assignments (Teredo, ORCHID, ...)
];

/// Returns `true` when `ip` is safe to contact from a caller-supplied URL.
pub fn is_public_ip(ip: IpAddr) -> bool {
    !is_restricted_ip(ip)
}

/// Returns `true` when `ip` is private, loopback, link-local, multicast,
/// reserved, unspecified or otherwise special-purpose.
pub fn is_restricted_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_restricted_v4(v4),
        IpAddr::V6(v6) => is_restricted_v6(v6),
    }
}

fn is_restricted_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || RESTRICTED_V4
            .iter()
            .any(|(net, prefix)| v4_in(ip, Ipv4Addr::from(*net), *prefix))
}

fn is_restricted_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_restricted_v4(v4);
    }

    let bits = u128::from(ip);

    // 6to4 carries an IPv4 address in bits 16..48.
    if v6_in(bits, 0x2002 << 112, 16) {
        let embedded = Ipv4Addr::from(((bits >> 80) & 0xffff_ffff) as u32);
        return is_restricted_v4(embedded);
    }

    // Only global unicast is routable; everything outside 2000::/3 is
    // loopback, unspecified, link-local, unique-local, multicast, NAT64,
    // discard or unassigned.
    if !v6_in(bits, 0x2000 << 112, 3) {
        return true;
    }

    RESTRICTED_V6_GLOBAL
        .iter()
        .any(|(net, prefix)| v6_in(bits, *net, *prefix))
}

fn v4_in(ip: Ipv4Addr, net: Ipv4Addr, prefix: u32) -> bool {
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    (u32::from(ip) & mask) == (u32::from(net) & mask)
}

fn v6_in(bits: u128, net: u128, prefix: u32) -> bool {
    let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
    (bits & mask) == (net & mask)
}
