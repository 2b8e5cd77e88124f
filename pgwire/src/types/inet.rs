//! `inet`/`cidr` binary codec.
//!
//! Wire shape: `[family, prefix_bits, is_cidr, addr_len, addr_bytes...]`.
//! `family` is `2` for IPv4, `3` for IPv6 (postgres's own constants, not
//! `AF_INET`/`AF_INET6`).
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{ArrayElement, Oid, PgType},
    row::Column,
    text::{DecodeText, EncodeText},
};

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

impl PgType for IpAddr {
    /// inet, IP address/netmask
    const OID: Oid = 869;
}

impl ArrayElement for IpAddr {
    const ARRAY_OID: Oid = 1041;
}

impl ArrayElement for Cidr {
    const ARRAY_OID: Oid = 651;
}

/// A `cidr` value: an [`IpAddr`] network with an explicit prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub address: IpAddr,
    pub prefix: u8,
}

impl PgType for Cidr {
    /// cidr, network IP address/netmask
    const OID: Oid = 650;
}

fn decode_body(value: &[u8]) -> Result<(IpAddr, u8, bool), DecodeError> {
    let &[family, prefix, is_cidr, addr_len, ref rest @ ..] = value else {
        return Err(DecodeError::Malformed("inet/cidr header"));
    };
    let is_cidr = is_cidr != 0;

    let address = match family {
        PGSQL_AF_INET => {
            let octets: [u8; 4] = rest.try_into().map_err(|_| DecodeError::Malformed("inet v4 length"))?;
            if addr_len != 4 {
                return Err(DecodeError::Malformed("inet v4 length field"));
            }
            IpAddr::V4(Ipv4Addr::from(octets))
        },
        PGSQL_AF_INET6 => {
            let octets: [u8; 16] = rest.try_into().map_err(|_| DecodeError::Malformed("inet v6 length"))?;
            if addr_len != 16 {
                return Err(DecodeError::Malformed("inet v6 length field"));
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        },
        _ => return Err(DecodeError::Malformed("inet address family")),
    };

    Ok((address, prefix, is_cidr))
}

fn encode_body(address: IpAddr, prefix: u8, is_cidr: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(20);
    match address {
        IpAddr::V4(v4) => {
            out.push(PGSQL_AF_INET);
            out.push(prefix);
            out.push(is_cidr as u8);
            out.push(4);
            out.extend_from_slice(&v4.octets());
        },
        IpAddr::V6(v6) => {
            out.push(PGSQL_AF_INET6);
            out.push(prefix);
            out.push(is_cidr as u8);
            out.push(16);
            out.extend_from_slice(&v6.octets());
        },
    }
    out
}

impl Decode for IpAddr {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let (address, _prefix, _is_cidr) = decode_body(&column.try_into_value()?)?;
        Ok(address)
    }
}

impl Encode<'static> for IpAddr {
    fn encode(self) -> Encoded<'static> {
        let full_prefix = match self {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Encoded::owned(encode_body(self, full_prefix, false), Self::OID)
    }
}

impl Decode for Cidr {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let (address, prefix, _is_cidr) = decode_body(&column.try_into_value()?)?;
        Ok(Cidr { address, prefix })
    }
}

impl Encode<'static> for Cidr {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(encode_body(self.address, self.prefix, true), Self::OID)
    }
}

impl DecodeText for IpAddr {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let text = std::str::from_utf8(&value).map_err(|_| DecodeError::Malformed("inet text"))?;
        // `inet` text may carry a `/prefix` suffix; a bare address implies the full-width prefix.
        let addr = text.split('/').next().unwrap_or(text);
        addr.parse().map_err(|_| DecodeError::Malformed("inet text"))
    }
}

impl EncodeText for IpAddr {
    fn encode_text(self) -> Option<String> {
        Some(self.to_string())
    }
}

impl DecodeText for Cidr {
    fn decode_text(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        let text = std::str::from_utf8(&value).map_err(|_| DecodeError::Malformed("cidr text"))?;
        let (addr, prefix) = text.split_once('/').ok_or(DecodeError::Malformed("cidr text"))?;
        Ok(Cidr {
            address: addr.parse().map_err(|_| DecodeError::Malformed("cidr text"))?,
            prefix: prefix.parse().map_err(|_| DecodeError::Malformed("cidr text"))?,
        })
    }
}

impl EncodeText for Cidr {
    fn encode_text(self) -> Option<String> {
        Some(format!("{}/{}", self.address, self.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inet_roundtrips_through_text() {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        let text = addr.encode_text().unwrap();
        let col = Column::from_parts(IpAddr::OID, Some(text.into_bytes().into()), "a");
        assert_eq!(IpAddr::decode_text(col).unwrap(), addr);
    }

    #[test]
    fn cidr_roundtrips_through_text() {
        let cidr = Cidr { address: "192.168.1.0".parse().unwrap(), prefix: 24 };
        let text = cidr.encode_text().unwrap();
        assert_eq!(text, "192.168.1.0/24");
        let col = Column::from_parts(Cidr::OID, Some(text.into_bytes().into()), "a");
        assert_eq!(Cidr::decode_text(col).unwrap(), cidr);
    }

    #[test]
    fn roundtrips_v4() {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        let col = Column::from_parts(869, Some(bytes::Bytes::from(encode_body(addr, 32, false))), "a");
        assert_eq!(IpAddr::decode(col).unwrap(), addr);
    }

    #[test]
    fn rejects_short_header() {
        let col = Column::from_parts(869, Some(bytes::Bytes::from_static(&[2, 32])), "a");
        assert!(matches!(IpAddr::decode(col), Err(DecodeError::Malformed(_))));
    }
}
