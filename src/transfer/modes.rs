//! FTP Transfer modes
//!
//! Wire formats of the data-channel negotiation: parsing the PORT and EPRT
//! arguments and formatting the PASV and EPSV replies.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::NegotiationError;

/// FTP transfer modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    None,
    Active,
    Passive,
}

/// Where the server connects to in active mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMode {
    pub client_ip: String,
    pub client_port: u16,
}

/// Where the server listens in passive mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveMode {
    pub server_ip: Ipv4Addr,
    pub server_port: u16,
}

/// Parses the PORT argument `h1,h2,h3,h4,p1,p2`.
pub fn parse_port_argument(arg: &str) -> Result<ActiveMode, NegotiationError> {
    let invalid = || NegotiationError::InvalidAddress(arg.to_string());
    let fields: Vec<u8> = arg
        .trim()
        .split(',')
        .map(|field| field.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    match fields.as_slice() {
        [h1, h2, h3, h4, p1, p2] => Ok(ActiveMode {
            client_ip: Ipv4Addr::new(*h1, *h2, *h3, *h4).to_string(),
            client_port: u16::from_be_bytes([*p1, *p2]),
        }),
        _ => Err(invalid()),
    }
}

/// Parses the EPRT argument `<d>family<d>address<d>port<d>`, where `<d>` is
/// the delimiter chosen by the client (usually `|`).
pub fn parse_eprt_argument(arg: &str) -> Result<ActiveMode, NegotiationError> {
    let invalid = || NegotiationError::InvalidAddress(arg.to_string());
    let arg = arg.trim();
    let delimiter = arg.chars().next().ok_or_else(invalid)?;
    let fields: Vec<&str> = arg.split(delimiter).collect();
    // leading and trailing delimiters produce empty fields at both ends
    let [_, family, address, port, _] = fields.as_slice() else {
        return Err(invalid());
    };
    let address: IpAddr = address.parse().map_err(|_| invalid())?;
    match (*family, address) {
        ("1", IpAddr::V4(_)) | ("2", IpAddr::V6(_)) => {}
        _ => return Err(invalid()),
    }
    let client_port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok(ActiveMode {
        client_ip: address.to_string(),
        client_port,
    })
}

/// `227 entering passive mode (h1,h2,h3,h4,p1,p2)`
pub fn passive_reply(mode: &PassiveMode) -> String {
    let [h1, h2, h3, h4] = mode.server_ip.octets();
    let [p1, p2] = mode.server_port.to_be_bytes();
    format!(
        "227 entering passive mode ({},{},{},{},{},{})\r\n",
        h1, h2, h3, h4, p1, p2
    )
}

/// `229 entering passive mode (|||port|)`
pub fn extended_passive_reply(port: u16) -> String {
    format!("229 entering passive mode (|||{}|)\r\n", port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_argument() {
        let mode = parse_port_argument("192,168,1,20,4,1").unwrap();
        assert_eq!(mode.client_ip, "192.168.1.20");
        assert_eq!(mode.client_port, 1025);

        assert!(parse_port_argument("192,168,1,20,4").is_err());
        assert!(parse_port_argument("192,168,1,300,4,1").is_err());
        assert!(parse_port_argument("").is_err());
    }

    #[test]
    fn test_parse_eprt_argument() {
        let mode = parse_eprt_argument("|1|132.235.1.2|6275|").unwrap();
        assert_eq!(mode.client_ip, "132.235.1.2");
        assert_eq!(mode.client_port, 6275);

        let mode = parse_eprt_argument("|2|1080::8:800:200C:417A|5282|").unwrap();
        assert_eq!(mode.client_ip, "1080::8:800:200c:417a");
        assert_eq!(mode.client_port, 5282);

        assert!(parse_eprt_argument("|1|1080::1|5282|").is_err());
        assert!(parse_eprt_argument("|3|10.0.0.1|5282|").is_err());
        assert!(parse_eprt_argument("|1|10.0.0.1|99999|").is_err());
        assert!(parse_eprt_argument("|1|10.0.0.1|").is_err());
    }

    #[test]
    fn test_passive_reply() {
        let mode = PassiveMode {
            server_ip: Ipv4Addr::new(10, 0, 0, 5),
            server_port: 1025,
        };
        assert_eq!(
            passive_reply(&mode),
            "227 entering passive mode (10,0,0,5,4,1)\r\n"
        );
    }

    #[test]
    fn test_extended_passive_reply() {
        assert_eq!(
            extended_passive_reply(1030),
            "229 entering passive mode (|||1030|)\r\n"
        );
    }
}
